use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context};
use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};
use uuid::Uuid;

pub type EventPayload = Map<String, Value>;

/// Record kinds written by a studio console.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    ModeSwitched,
    SessionStarted,
    SessionEvent,
    SessionFinished,
    HistoryDeleted,
    AppLog,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::ModeSwitched => "mode_switched",
            EventKind::SessionStarted => "session_started",
            EventKind::SessionEvent => "session_event",
            EventKind::SessionFinished => "session_finished",
            EventKind::HistoryDeleted => "history_deleted",
            EventKind::AppLog => "app_log",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const RESERVED_KEYS: [&str; 4] = ["type", "session_id", "seq", "ts"];

/// Append-only JSONL log of what a studio console session did.
///
/// Every record starts with `type`, `session_id`, `seq` and `ts`; payload
/// keys with those names are dropped. The file is opened on the first
/// record and kept open. `seq` counts records per writer, from 0.
#[derive(Debug, Clone)]
pub struct EventWriter {
    inner: Arc<EventWriterInner>,
}

#[derive(Debug)]
struct EventWriterInner {
    path: PathBuf,
    session_id: String,
    state: Mutex<WriterState>,
}

#[derive(Debug, Default)]
struct WriterState {
    file: Option<File>,
    seq: u64,
}

impl EventWriter {
    pub fn new(path: impl Into<PathBuf>, session_id: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(EventWriterInner {
                path: path.into(),
                session_id: session_id.into(),
                state: Mutex::new(WriterState::default()),
            }),
        }
    }

    /// Writer tagged with a fresh random session id.
    pub fn with_new_session(path: impl Into<PathBuf>) -> Self {
        Self::new(path, format!("studio-{}", Uuid::new_v4()))
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn session_id(&self) -> &str {
        &self.inner.session_id
    }

    pub fn emit(&self, kind: EventKind, payload: EventPayload) -> anyhow::Result<Value> {
        let mut state = self
            .inner
            .state
            .lock()
            .map_err(|_| anyhow!("event writer lock poisoned"))?;
        if state.file.is_none() {
            state.file = Some(self.open()?);
        }

        let mut event = Map::new();
        event.insert("type".to_string(), Value::from(kind.as_str()));
        event.insert(
            "session_id".to_string(),
            Value::from(self.inner.session_id.as_str()),
        );
        event.insert("seq".to_string(), Value::from(state.seq));
        event.insert("ts".to_string(), Value::from(now_utc_iso()));
        for (key, value) in payload {
            if !RESERVED_KEYS.contains(&key.as_str()) {
                event.insert(key, value);
            }
        }

        let mut line = serde_json::to_string(&event)?;
        line.push('\n');
        if let Some(file) = state.file.as_mut() {
            file.write_all(line.as_bytes())
                .with_context(|| format!("writing {}", self.inner.path.display()))?;
        }
        state.seq += 1;
        Ok(Value::Object(event))
    }

    fn open(&self) -> anyhow::Result<File> {
        let path = &self.inner.path;
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("opening {}", path.display()))
    }
}

pub fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}
