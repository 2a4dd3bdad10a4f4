//! Scripted stand-ins for the remote service and the user.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::io::Cursor;
use std::path::Path;
use std::rc::Rc;

use anyhow::{anyhow, Result};
use serde_json::json;
use studio_contracts::history::HistoryItem;
use studio_contracts::mode::Mode;
use studio_contracts::request::{AnalyzeRequest, GenerateRequest, StudioRequest};

use crate::api::{ByteStream, DeleteOutcome, HistoryListing, StudioApi};
use crate::app::Prompter;

pub fn sse(records: &[&str]) -> Vec<u8> {
    records
        .iter()
        .map(|record| format!("data: {record}\n\n"))
        .collect::<String>()
        .into_bytes()
}

pub fn history_item(filename: &str, ts: f64, params: serde_json::Value) -> HistoryItem {
    HistoryItem {
        filename: filename.to_string(),
        timestamp: ts,
        image: format!("/outputs/{filename}"),
        params: params.as_object().cloned(),
        output: None,
    }
}

pub fn generate_request(mode: Mode) -> StudioRequest {
    StudioRequest::Generate(GenerateRequest {
        mode,
        prompt: "a lighthouse".to_string(),
        width: 1024,
        height: 1024,
        steps: 30,
        guidance: 3.0,
        seed: 42,
        randomize: false,
        init_image: None,
        init_image_2: None,
        loras: Vec::new(),
        top_k: 1.0,
        temperature: 0.6,
        strength: 0.75,
        mix_ratio: 0.5,
    })
}

pub fn analyze_request(image: &str) -> StudioRequest {
    StudioRequest::Analyze(AnalyzeRequest {
        image_path: image.to_string(),
        image_path_2: None,
        prompt: "What is this?".to_string(),
        top_k: 1,
        temperature: 0.6,
        strength: 0.75,
        mix_ratio: 0.5,
    })
}

#[derive(Default)]
pub struct FakeApi {
    streams: RefCell<VecDeque<Vec<u8>>>,
    stream_error: Option<String>,
    stop_error: Option<String>,
    history_error: RefCell<Option<String>>,
    history: RefCell<Vec<HistoryItem>>,
    loras: Vec<String>,
    pub generate_requests: RefCell<Vec<GenerateRequest>>,
    pub analyze_requests: RefCell<Vec<AnalyzeRequest>>,
    pub deleted: RefCell<Vec<String>>,
    history_calls: Cell<usize>,
    stop_calls: Cell<usize>,
    exit_calls: Cell<usize>,
}

impl FakeApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stream(self, bytes: Vec<u8>) -> Self {
        self.streams.borrow_mut().push_back(bytes);
        self
    }

    pub fn failing_streams(mut self, message: &str) -> Self {
        self.stream_error = Some(message.to_string());
        self
    }

    pub fn failing_stop(mut self, message: &str) -> Self {
        self.stop_error = Some(message.to_string());
        self
    }

    pub fn with_history(self, items: Vec<HistoryItem>) -> Self {
        *self.history.borrow_mut() = items;
        self
    }

    pub fn with_loras(mut self, files: &[&str]) -> Self {
        self.loras = files.iter().map(|file| file.to_string()).collect();
        self
    }

    pub fn push_stream(&self, bytes: Vec<u8>) {
        self.streams.borrow_mut().push_back(bytes);
    }

    pub fn push_history(&self, item: HistoryItem) {
        self.history.borrow_mut().push(item);
    }

    pub fn set_history_error(&self, message: Option<&str>) {
        *self.history_error.borrow_mut() = message.map(str::to_string);
    }

    pub fn history_calls(&self) -> usize {
        self.history_calls.get()
    }

    pub fn stop_calls(&self) -> usize {
        self.stop_calls.get()
    }

    pub fn exit_calls(&self) -> usize {
        self.exit_calls.get()
    }

    fn next_stream(&self) -> Result<ByteStream> {
        if let Some(message) = &self.stream_error {
            return Err(anyhow!(message.clone()));
        }
        let bytes = self.streams.borrow_mut().pop_front().unwrap_or_default();
        Ok(Box::new(Cursor::new(bytes)))
    }
}

impl StudioApi for FakeApi {
    fn scan_loras(&self, _folder: &str) -> Result<Vec<String>> {
        Ok(self.loras.clone())
    }

    fn upload_image(&self, path: &Path) -> Result<String> {
        if !path.exists() {
            return Err(anyhow!("failed reading {}", path.display()));
        }
        let name = path
            .file_name()
            .and_then(|value| value.to_str())
            .unwrap_or("image.png");
        Ok(format!("/app/uploads/{name}"))
    }

    fn generate(&self, request: &GenerateRequest) -> Result<ByteStream> {
        self.generate_requests.borrow_mut().push(request.clone());
        self.next_stream()
    }

    fn analyze(&self, request: &AnalyzeRequest) -> Result<ByteStream> {
        self.analyze_requests.borrow_mut().push(request.clone());
        self.next_stream()
    }

    fn stop(&self) -> Result<()> {
        self.stop_calls.set(self.stop_calls.get() + 1);
        match &self.stop_error {
            Some(message) => Err(anyhow!(message.clone())),
            None => Ok(()),
        }
    }

    fn history(&self) -> Result<HistoryListing> {
        self.history_calls.set(self.history_calls.get() + 1);
        if let Some(message) = self.history_error.borrow().as_ref() {
            return Err(anyhow!(message.clone()));
        }
        Ok(HistoryListing {
            items: self.history.borrow().clone(),
            skipped: Vec::new(),
        })
    }

    fn delete_history(&self, filename: &str) -> Result<DeleteOutcome> {
        let mut history = self.history.borrow_mut();
        let before = history.len();
        history.retain(|item| item.filename != filename);
        if history.len() == before {
            return Ok(DeleteOutcome::Rejected("file not found".to_string()));
        }
        self.deleted.borrow_mut().push(filename.to_string());
        Ok(DeleteOutcome::Deleted)
    }

    fn exit(&self) -> Result<()> {
        self.exit_calls.set(self.exit_calls.get() + 1);
        Err(anyhow!("connection closed before message completed"))
    }
}

/// Answers confirmations with a fixed reply and records every message.
#[derive(Clone)]
pub struct ScriptedPrompter {
    pub answer: bool,
    pub confirms: Rc<RefCell<Vec<String>>>,
    pub alerts: Rc<RefCell<Vec<String>>>,
}

impl ScriptedPrompter {
    pub fn new(answer: bool) -> Self {
        Self {
            answer,
            confirms: Rc::default(),
            alerts: Rc::default(),
        }
    }
}

impl Prompter for ScriptedPrompter {
    fn confirm(&mut self, message: &str) -> bool {
        self.confirms.borrow_mut().push(message.to_string());
        self.answer
    }

    fn alert(&mut self, message: &str) {
        self.alerts.borrow_mut().push(message.to_string());
    }
}

pub fn sample_history() -> Vec<HistoryItem> {
    vec![
        history_item(
            "t2i_0001.png",
            100.0,
            json!({ "mode": "t2i", "prompt": "a castle", "width": 768, "height": 1344,
                    "steps": 28, "guidance": 3.5, "seed": 1234 }),
        ),
        history_item(
            "i2i_0002.png",
            200.0,
            json!({ "mode": "i2i", "prompt": "make it blue",
                    "source_image_1": "/outputs/t2i_0001.png",
                    "source_image_2": "/app/uploads/style.png", "guidance_scale": 2.5 }),
        ),
        history_item(
            "i2t_0003.png",
            300.0,
            json!({ "mode": "i2t", "prompt": "What is this?", "top_k": 3, "temperature": 0.2,
                    "source_image_1": "/app/uploads/cat.png" }),
        ),
    ]
}
