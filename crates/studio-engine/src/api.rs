use std::fs;
use std::io::Read;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{bail, Context, Result};
use reqwest::blocking::multipart::{Form as MultipartForm, Part as MultipartPart};
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use serde_json::{json, Value};
use studio_contracts::history::{parse_history_payload, HistoryItem};
use studio_contracts::request::{AnalyzeRequest, GenerateRequest};

use crate::config::StudioConfig;

/// Raw body of a generate/analyze response.
pub type ByteStream = Box<dyn Read + Send>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    Rejected(String),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryListing {
    pub items: Vec<HistoryItem>,
    /// Rows that could not be decoded.
    pub skipped: Vec<String>,
}

/// The remote studio service.
pub trait StudioApi {
    fn scan_loras(&self, folder: &str) -> Result<Vec<String>>;
    /// Stores a local image on the server and returns its server path.
    fn upload_image(&self, path: &Path) -> Result<String>;
    fn generate(&self, request: &GenerateRequest) -> Result<ByteStream>;
    fn analyze(&self, request: &AnalyzeRequest) -> Result<ByteStream>;
    /// Out-of-band cancellation of whatever job is running.
    fn stop(&self) -> Result<()>;
    fn history(&self) -> Result<HistoryListing>;
    fn delete_history(&self, filename: &str) -> Result<DeleteOutcome>;
    fn exit(&self) -> Result<()>;
}

pub struct HttpStudioClient {
    config: StudioConfig,
    http: HttpClient,
}

impl HttpStudioClient {
    pub fn new(config: StudioConfig) -> Result<Self> {
        let http = HttpClient::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.stream_timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { config, http })
    }

    pub fn config(&self) -> &StudioConfig {
        &self.config
    }

    fn post_json(&self, label: &str, path: &str, body: &Value) -> Result<Value> {
        let response = self
            .http
            .post(self.config.endpoint(path))
            .timeout(self.config.request_timeout)
            .json(body)
            .send()
            .with_context(|| format!("{label} request failed"))?;
        response_json_or_error(label, response)
    }

    fn open_stream(&self, label: &str, path: &str, body: Value) -> Result<ByteStream> {
        let response = self
            .http
            .post(self.config.endpoint(path))
            .json(&body)
            .send()
            .with_context(|| format!("{label} request failed"))?;
        let response = ensure_success(label, response)?;
        Ok(Box::new(response))
    }
}

impl StudioApi for HttpStudioClient {
    fn scan_loras(&self, folder: &str) -> Result<Vec<String>> {
        let payload = self.post_json("scan_loras", "/api/scan_loras", &json!({ "folder": folder }))?;
        Ok(payload
            .get("files")
            .and_then(Value::as_array)
            .map(|files| {
                files
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default())
    }

    fn upload_image(&self, path: &Path) -> Result<String> {
        let bytes = fs::read(path).with_context(|| format!("failed reading {}", path.display()))?;
        let file_name = path
            .file_name()
            .and_then(|value| value.to_str())
            .unwrap_or("image.png")
            .to_string();
        let mut part = MultipartPart::bytes(bytes).file_name(file_name);
        if let Some(mime) = mime_for_path(path) {
            part = part
                .mime_str(mime)
                .with_context(|| format!("invalid mime '{mime}' for {}", path.display()))?;
        }
        let form = MultipartForm::new().part("file", part);
        let response = self
            .http
            .post(self.config.endpoint("/api/upload_image"))
            .timeout(self.config.request_timeout)
            .multipart(form)
            .send()
            .context("upload_image request failed")?;
        let payload = response_json_or_error("upload_image", response)?;
        if let Some(error) = payload.get("error").and_then(Value::as_str) {
            bail!("upload_image rejected: {error}");
        }
        payload
            .get("path")
            .and_then(Value::as_str)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
            .context("upload_image response has no path")
    }

    fn generate(&self, request: &GenerateRequest) -> Result<ByteStream> {
        let body = serde_json::to_value(request).context("failed encoding generate request")?;
        self.open_stream("generate", "/api/generate", body)
    }

    fn analyze(&self, request: &AnalyzeRequest) -> Result<ByteStream> {
        let body = serde_json::to_value(request).context("failed encoding analyze request")?;
        self.open_stream("analyze", "/api/analyze", body)
    }

    fn stop(&self) -> Result<()> {
        self.post_json("stop", "/api/stop", &Value::Null).map(|_| ())
    }

    fn history(&self) -> Result<HistoryListing> {
        let response = self
            .http
            .get(self.config.endpoint("/api/history"))
            .query(&[("t", timestamp_millis().to_string())])
            .timeout(self.config.request_timeout)
            .send()
            .context("history request failed")?;
        let payload = response_json_or_error("history", response)?;
        let (items, skipped) = parse_history_payload(&payload);
        Ok(HistoryListing { items, skipped })
    }

    fn delete_history(&self, filename: &str) -> Result<DeleteOutcome> {
        let response = self
            .http
            .post(self.config.endpoint("/api/delete_history"))
            .timeout(self.config.request_timeout)
            .json(&json!({ "filename": filename }))
            .send()
            .context("delete_history request failed")?;
        let status = response.status();
        let body = response
            .text()
            .context("delete_history response body read failed")?;
        Ok(delete_outcome_from_body(status.as_u16(), &body))
    }

    fn exit(&self) -> Result<()> {
        self.post_json("exit", "/api/exit", &Value::Null).map(|_| ())
    }
}

pub(crate) fn delete_outcome_from_body(status: u16, body: &str) -> DeleteOutcome {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    if let Some(payload) = parsed.as_ref() {
        if payload.get("status").and_then(Value::as_str) == Some("deleted") {
            return DeleteOutcome::Deleted;
        }
        if let Some(error) = payload.get("error").and_then(Value::as_str) {
            return DeleteOutcome::Rejected(error.to_string());
        }
    }
    DeleteOutcome::Rejected(format!(
        "unexpected response ({status}): {}",
        truncate_text(body, 256)
    ))
}

fn ensure_success(label: &str, response: HttpResponse) -> Result<HttpResponse> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    bail!(
        "{label} request failed ({}): {}",
        status.as_u16(),
        error_message_from_body(&body)
    );
}

fn response_json_or_error(label: &str, response: HttpResponse) -> Result<Value> {
    let status = response.status();
    let code = status.as_u16();
    let body = response
        .text()
        .with_context(|| format!("{label} response body read failed"))?;
    if !status.is_success() {
        bail!(
            "{label} request failed ({code}): {}",
            error_message_from_body(&body)
        );
    }
    if body.trim().is_empty() {
        return Ok(Value::Null);
    }
    let parsed: Value = serde_json::from_str(&body)
        .with_context(|| format!("{label} returned invalid JSON payload"))?;
    Ok(parsed)
}

/// Prefers the server's `{"error": ...}` text over the raw body.
fn error_message_from_body(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|payload| {
            payload
                .get("error")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| truncate_text(body, 512))
}

pub fn error_chain_text(err: &anyhow::Error, max_chars: usize) -> String {
    let mut parts = Vec::new();
    for cause in err.chain() {
        let text = cause.to_string();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            continue;
        }
        if parts
            .last()
            .map(|existing| existing == trimmed)
            .unwrap_or(false)
        {
            continue;
        }
        parts.push(trimmed.to_string());
    }
    if parts.is_empty() {
        return truncate_text(&err.to_string(), max_chars);
    }
    truncate_text(&parts.join(" | caused by: "), max_chars)
}

fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

fn mime_for_path(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        "bmp" => Some("image/bmp"),
        _ => None,
    }
}

fn timestamp_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use anyhow::Context;

    use super::{
        delete_outcome_from_body, error_chain_text, error_message_from_body, mime_for_path,
        DeleteOutcome,
    };

    #[test]
    fn delete_outcomes_follow_server_payload() {
        assert_eq!(
            delete_outcome_from_body(200, r#"{"status":"deleted"}"#),
            DeleteOutcome::Deleted
        );
        assert_eq!(
            delete_outcome_from_body(500, r#"{"error":"file not found"}"#),
            DeleteOutcome::Rejected("file not found".to_string())
        );
        match delete_outcome_from_body(502, "<html>bad gateway</html>") {
            DeleteOutcome::Rejected(message) => assert!(message.contains("502")),
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn error_body_prefers_error_field() {
        assert_eq!(
            error_message_from_body(r#"{"error":"Init image required"}"#),
            "Init image required"
        );
        assert_eq!(error_message_from_body("plain failure"), "plain failure");
    }

    #[test]
    fn error_chain_skips_duplicates() {
        let err = Err::<(), _>(anyhow::anyhow!("connection refused"))
            .context("generate request failed")
            .unwrap_err();
        assert_eq!(
            error_chain_text(&err, 200),
            "generate request failed | caused by: connection refused"
        );
        assert!(error_chain_text(&err, 8).ends_with('…'));
    }

    #[test]
    fn mime_guess_by_extension() {
        assert_eq!(mime_for_path(Path::new("a.PNG")), Some("image/png"));
        assert_eq!(mime_for_path(Path::new("a.jpeg")), Some("image/jpeg"));
        assert_eq!(mime_for_path(Path::new("a.tiff")), None);
    }
}
