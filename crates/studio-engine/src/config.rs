use std::env;
use std::time::Duration;

pub const DEFAULT_API_BASE: &str = "http://127.0.0.1:7860";
pub const DEFAULT_LORA_FOLDER: &str = "/app/loras";
pub const DEFAULT_SERVER_ROOT: &str = "/app";

/// Connection and path settings for one studio server.
///
/// Values come from explicit overrides (CLI flags), then `STUDIO_*`
/// environment variables, then the defaults above:
///
/// | variable | meaning | default |
/// |---|---|---|
/// | `STUDIO_API_BASE` | server base URL | `http://127.0.0.1:7860` |
/// | `STUDIO_LORA_FOLDER` | folder scanned for LoRA files | `/app/loras` |
/// | `STUDIO_SERVER_ROOT` | prefix turning `/outputs/..` web paths into server paths | `/app` |
/// | `STUDIO_REQUEST_TIMEOUT` | seconds allowed for JSON calls (1-600) | 30 |
/// | `STUDIO_STREAM_TIMEOUT` | seconds allowed for a whole generate/analyze stream | unset: no limit |
/// | `STUDIO_CONNECT_TIMEOUT` | seconds allowed to establish a connection (1-120) | 10 |
#[derive(Debug, Clone, PartialEq)]
pub struct StudioConfig {
    pub api_base: String,
    pub lora_folder: String,
    pub server_root: String,
    pub request_timeout: Duration,
    pub stream_timeout: Option<Duration>,
    pub connect_timeout: Duration,
}

impl Default for StudioConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            lora_folder: DEFAULT_LORA_FOLDER.to_string(),
            server_root: DEFAULT_SERVER_ROOT.to_string(),
            request_timeout: Duration::from_secs(30),
            stream_timeout: None,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl StudioConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let defaults = Self::default();
        Self {
            api_base: non_empty("STUDIO_API_BASE")
                .map(|value| normalize_api_base(&value))
                .unwrap_or(defaults.api_base),
            lora_folder: non_empty("STUDIO_LORA_FOLDER").unwrap_or(defaults.lora_folder),
            server_root: non_empty("STUDIO_SERVER_ROOT")
                .map(|value| value.trim_end_matches('/').to_string())
                .unwrap_or(defaults.server_root),
            request_timeout: non_empty("STUDIO_REQUEST_TIMEOUT")
                .and_then(|value| parse_seconds(&value, 1.0, 600.0))
                .unwrap_or(defaults.request_timeout),
            stream_timeout: non_empty("STUDIO_STREAM_TIMEOUT")
                .and_then(|value| parse_seconds(&value, 1.0, 86_400.0)),
            connect_timeout: non_empty("STUDIO_CONNECT_TIMEOUT")
                .and_then(|value| parse_seconds(&value, 1.0, 120.0))
                .unwrap_or(defaults.connect_timeout),
        }
    }

    pub fn with_api_base(mut self, api_base: Option<&str>) -> Self {
        if let Some(value) = api_base.map(str::trim).filter(|value| !value.is_empty()) {
            self.api_base = normalize_api_base(value);
        }
        self
    }

    pub fn with_request_timeout(mut self, seconds: Option<f64>) -> Self {
        if let Some(seconds) = seconds.filter(|value| value.is_finite()) {
            self.request_timeout = Duration::from_secs_f64(seconds.clamp(1.0, 600.0));
        }
        self
    }

    /// Zero or less disables the stream limit. NaN and infinities are ignored.
    pub fn with_stream_timeout(mut self, seconds: Option<f64>) -> Self {
        if let Some(seconds) = seconds.filter(|value| value.is_finite()) {
            self.stream_timeout = if seconds <= 0.0 {
                None
            } else {
                Some(Duration::from_secs_f64(seconds.clamp(1.0, 86_400.0)))
            };
        }
        self
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.api_base, path.trim_start_matches('/'))
    }
}

fn normalize_api_base(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    }
}

fn parse_seconds(raw: &str, min: f64, max: f64) -> Option<Duration> {
    let value = raw.trim().parse::<f64>().ok()?;
    if !value.is_finite() || value <= 0.0 {
        return None;
    }
    Some(Duration::from_secs_f64(value.clamp(min, max)))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use super::StudioConfig;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_without_environment() {
        let config = StudioConfig::from_lookup(lookup(&[]));
        assert_eq!(config, StudioConfig::default());
        assert_eq!(config.stream_timeout, None);
        assert_eq!(
            config.endpoint("/api/history"),
            "http://127.0.0.1:7860/api/history"
        );
    }

    #[test]
    fn environment_values_are_normalized_and_clamped() {
        let config = StudioConfig::from_lookup(lookup(&[
            ("STUDIO_API_BASE", " gpu-box:7860/ "),
            ("STUDIO_SERVER_ROOT", "/srv/studio/"),
            ("STUDIO_REQUEST_TIMEOUT", "5000"),
            ("STUDIO_STREAM_TIMEOUT", "900"),
            ("STUDIO_CONNECT_TIMEOUT", "nope"),
        ]));
        assert_eq!(config.api_base, "http://gpu-box:7860");
        assert_eq!(config.server_root, "/srv/studio");
        assert_eq!(config.request_timeout, Duration::from_secs(600));
        assert_eq!(config.stream_timeout, Some(Duration::from_secs(900)));
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
    }

    #[test]
    fn flag_overrides_win() {
        let config = StudioConfig::from_lookup(lookup(&[("STUDIO_STREAM_TIMEOUT", "60")]))
            .with_api_base(Some("https://studio.example/"))
            .with_stream_timeout(Some(0.0))
            .with_request_timeout(Some(12.0));
        assert_eq!(config.api_base, "https://studio.example");
        assert_eq!(config.stream_timeout, None);
        assert_eq!(config.request_timeout, Duration::from_secs(12));
    }

    #[test]
    fn non_finite_flag_timeouts_keep_previous_values() {
        let base = StudioConfig::from_lookup(lookup(&[("STUDIO_STREAM_TIMEOUT", "60")]));
        let config = base
            .clone()
            .with_request_timeout(Some(f64::NAN))
            .with_stream_timeout(Some(f64::NAN))
            .with_request_timeout(Some(f64::INFINITY))
            .with_stream_timeout(Some(f64::NEG_INFINITY));
        assert_eq!(config.request_timeout, base.request_timeout);
        assert_eq!(config.stream_timeout, Some(Duration::from_secs(60)));
    }
}
