use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use studio_contracts::mode::Mode;
use studio_contracts::request::StudioRequest;
use studio_contracts::stream::{EventStream, StreamEvent};
use studio_contracts::transcript::{ThinkingSplit, Transcript};

use crate::api::{error_chain_text, StudioApi};

pub const STREAM_ENDED_EARLY: &str = "stream ended without a terminal record";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKind {
    Generate,
    Analyze,
}

impl SessionKind {
    pub fn for_mode(mode: Mode) -> Self {
        if mode.is_analysis() {
            SessionKind::Analyze
        } else {
            SessionKind::Generate
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Running,
    Completed,
    Failed,
    Aborted,
}

impl SessionState {
    pub fn is_finished(self) -> bool {
        matches!(
            self,
            SessionState::Completed | SessionState::Failed | SessionState::Aborted
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Running => "running",
            SessionState::Completed => "completed",
            SessionState::Failed => "failed",
            SessionState::Aborted => "aborted",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared stop flag. Clones observe the same flag, so another thread can
/// request cancellation of a running session.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Returned by the per-event callback of [`run_session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionControl {
    Continue,
    Stop,
}

/// State of one generate/analyze request while its stream is consumed.
#[derive(Debug, Clone)]
pub struct GenerationSession {
    kind: SessionKind,
    mode: Mode,
    state: SessionState,
    last_image: Option<String>,
    transcript: Transcript,
    split: ThinkingSplit,
    message: Option<String>,
    stop_requested: bool,
    notes: Vec<String>,
}

impl GenerationSession {
    pub fn new(mode: Mode) -> Self {
        Self {
            kind: SessionKind::for_mode(mode),
            mode,
            state: SessionState::Idle,
            last_image: None,
            transcript: Transcript::new(),
            split: ThinkingSplit::default(),
            message: None,
            stop_requested: false,
            notes: Vec::new(),
        }
    }

    pub fn kind(&self) -> SessionKind {
        self.kind
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn last_image(&self) -> Option<&str> {
        self.last_image.as_deref()
    }

    pub fn split(&self) -> &ThinkingSplit {
        &self.split
    }

    pub fn stop_requested(&self) -> bool {
        self.stop_requested
    }

    pub fn start(&mut self) {
        if self.state == SessionState::Idle {
            self.state = SessionState::Running;
        }
    }

    /// Folds one event into the session. Events after a terminal state are
    /// ignored.
    pub fn apply(&mut self, event: &StreamEvent) {
        if self.state != SessionState::Running {
            return;
        }
        match event {
            StreamEvent::Log(_) => {}
            StreamEvent::ImageReady(path) => {
                if !path.is_empty() {
                    self.last_image = Some(path.clone());
                }
            }
            StreamEvent::TextDelta(delta) => {
                self.split = self.transcript.push_delta(delta);
            }
            StreamEvent::Done(message) => {
                self.state = SessionState::Completed;
                self.message = Some(message.clone());
            }
            StreamEvent::Error(message) => {
                self.finish_unsuccessfully(message.clone());
            }
        }
    }

    /// Marks the stop as requested; true only the first time.
    pub fn request_stop(&mut self) -> bool {
        if self.stop_requested {
            return false;
        }
        self.stop_requested = true;
        true
    }

    pub fn end_of_stream(&mut self) {
        if self.state == SessionState::Running {
            self.finish_unsuccessfully(STREAM_ENDED_EARLY.to_string());
        }
    }

    pub fn transport_failed(&mut self, message: String) {
        if matches!(self.state, SessionState::Idle | SessionState::Running) {
            self.state = SessionState::Running;
            self.finish_unsuccessfully(message);
        }
    }

    fn finish_unsuccessfully(&mut self, message: String) {
        self.state = if self.stop_requested {
            SessionState::Aborted
        } else {
            SessionState::Failed
        };
        self.message = Some(message);
    }

    pub fn into_outcome(self) -> SessionOutcome {
        SessionOutcome {
            kind: self.kind,
            mode: self.mode,
            state: self.state,
            message: self.message,
            last_image: self.last_image,
            transcript: self.transcript,
            split: self.split,
            notes: self.notes,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub kind: SessionKind,
    /// Mode the session was started in.
    pub mode: Mode,
    pub state: SessionState,
    /// `DONE`/`ERR` payload or the transport failure text.
    pub message: Option<String>,
    pub last_image: Option<String>,
    pub transcript: Transcript,
    pub split: ThinkingSplit,
    /// Side remarks such as a failed stop call.
    pub notes: Vec<String>,
}

/// Runs one request to completion.
///
/// Every event is folded into the session before `on_event` sees it. A
/// cancelled token or a `SessionControl::Stop` sends the out-of-band stop
/// once; reading continues until the server ends the stream. Failures are
/// reported through the outcome, never as an error.
pub fn run_session<A, F>(
    api: &A,
    request: &StudioRequest,
    cancel: &CancelToken,
    mut on_event: F,
) -> SessionOutcome
where
    A: StudioApi + ?Sized,
    F: FnMut(&StreamEvent, &GenerationSession) -> SessionControl,
{
    let mut session = GenerationSession::new(request.mode());
    session.start();

    let opened = match request {
        StudioRequest::Generate(body) => api.generate(body),
        StudioRequest::Analyze(body) => api.analyze(body),
    };
    let reader = match opened {
        Ok(reader) => reader,
        Err(err) => {
            session.transport_failed(error_chain_text(&err, 512));
            return session.into_outcome();
        }
    };

    if cancel.is_cancelled() {
        send_stop(api, &mut session);
    }

    for item in EventStream::new(reader) {
        match item {
            Ok(event) => {
                session.apply(&event);
                let control = on_event(&event, &session);
                if control == SessionControl::Stop || cancel.is_cancelled() {
                    send_stop(api, &mut session);
                }
                if event.is_terminal() {
                    break;
                }
            }
            Err(err) => {
                session.transport_failed(error_chain_text(&err, 512));
                break;
            }
        }
    }

    session.end_of_stream();
    session.into_outcome()
}

fn send_stop<A: StudioApi + ?Sized>(api: &A, session: &mut GenerationSession) {
    if !session.request_stop() || session.state.is_finished() {
        return;
    }
    if let Err(err) = api.stop() {
        session
            .notes
            .push(format!("stop request failed: {}", error_chain_text(&err, 256)));
    }
}
