use std::fmt;

use serde_json::{json, Value};
use studio_contracts::events::{EventKind, EventPayload, EventWriter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Success,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Info => "info",
            LogLevel::Success => "success",
            LogLevel::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub level: LogLevel,
    pub text: String,
}

impl fmt::Display for LogLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.level {
            LogLevel::Info => write!(f, "  {}", self.text),
            LogLevel::Success => write!(f, "✓ {}", self.text),
            LogLevel::Error => write!(f, "✗ {}", self.text),
        }
    }
}

pub type LogSink = Box<dyn FnMut(&LogLine)>;

/// The visible console plus the optional JSONL event log.
///
/// Every console line is forwarded to the sink as it is written and
/// recorded as an `app_log` event. A failing event log is reported once on
/// the console and then switched off.
#[derive(Default)]
pub struct Journal {
    lines: Vec<LogLine>,
    sink: Option<LogSink>,
    events: Option<EventWriter>,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_sink(&mut self, sink: Option<LogSink>) {
        self.sink = sink;
    }

    pub fn set_event_writer(&mut self, writer: Option<EventWriter>) {
        self.events = writer;
    }

    pub fn event_writer(&self) -> Option<&EventWriter> {
        self.events.as_ref()
    }

    pub fn lines(&self) -> &[LogLine] {
        &self.lines
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    pub fn info(&mut self, text: impl Into<String>) {
        self.push(LogLevel::Info, text.into());
    }

    pub fn success(&mut self, text: impl Into<String>) {
        self.push(LogLevel::Success, text.into());
    }

    pub fn error(&mut self, text: impl Into<String>) {
        self.push(LogLevel::Error, text.into());
    }

    fn push(&mut self, level: LogLevel, text: String) {
        let line = LogLine { level, text };
        if let Some(sink) = self.sink.as_mut() {
            sink(&line);
        }
        self.emit(
            EventKind::AppLog,
            json!({ "level": level.as_str(), "text": line.text }),
        );
        self.lines.push(line);
    }

    pub fn emit(&mut self, kind: EventKind, payload: Value) {
        let Some(writer) = self.events.as_ref() else {
            return;
        };
        if let Err(err) = writer.emit(kind, map_object(payload)) {
            let path = writer.path().display().to_string();
            self.events = None;
            self.error(format!("event log disabled ({path}): {err:#}"));
        }
    }
}

fn map_object(value: Value) -> EventPayload {
    match value {
        Value::Object(map) => map,
        _ => EventPayload::new(),
    }
}
