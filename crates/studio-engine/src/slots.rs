use std::fmt;
use std::str::FromStr;

use anyhow::{bail, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    First,
    Second,
}

impl Slot {
    pub fn number(self) -> u8 {
        match self {
            Slot::First => 1,
            Slot::Second => 2,
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.number())
    }
}

impl FromStr for Slot {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim() {
            "1" => Ok(Slot::First),
            "2" => Ok(Slot::Second),
            other => bail!("unknown slot '{other}' (expected 1 or 2)"),
        }
    }
}

/// The two input-image slots, holding server-side paths.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputSlots {
    first: Option<String>,
    second: Option<String>,
}

impl InputSlots {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, slot: Slot) -> Option<&str> {
        match slot {
            Slot::First => self.first.as_deref(),
            Slot::Second => self.second.as_deref(),
        }
    }

    pub fn set(&mut self, slot: Slot, path: impl Into<String>) {
        let path = Some(path.into()).filter(|value| !value.is_empty());
        match slot {
            Slot::First => self.first = path,
            Slot::Second => self.second = path,
        }
    }

    pub fn swap(&mut self) {
        std::mem::swap(&mut self.first, &mut self.second);
    }

    /// Clearing slot 1 moves slot 2 up.
    pub fn delete(&mut self, slot: Slot) {
        match slot {
            Slot::First => self.first = self.second.take(),
            Slot::Second => self.second = None,
        }
    }

    pub fn any(&self) -> bool {
        self.first.is_some() || self.second.is_some()
    }

    pub fn primary(&self) -> Option<&str> {
        self.first.as_deref().or(self.second.as_deref())
    }

    pub fn secondary(&self) -> Option<&str> {
        match (&self.first, &self.second) {
            (Some(_), Some(second)) => Some(second),
            _ => None,
        }
    }
}

fn is_external(path: &str) -> bool {
    let lowered = path.trim().to_ascii_lowercase();
    lowered.starts_with("http:") || lowered.starts_with("https:") || lowered.starts_with("//")
}

/// `/outputs/x.png` becomes `<server_root>/outputs/x.png`. Paths already
/// under the root are kept.
pub fn to_server_path(web_path: &str, server_root: &str) -> Result<String> {
    let web_path = web_path.trim();
    if web_path.is_empty() {
        bail!("empty image path");
    }
    if is_external(web_path) {
        bail!("external image paths are not supported: {web_path}");
    }
    let root = server_root.trim_end_matches('/');
    if !root.is_empty() && (web_path == root || web_path.starts_with(&format!("{root}/"))) {
        return Ok(web_path.to_string());
    }
    if web_path.starts_with('/') {
        Ok(format!("{root}{web_path}"))
    } else {
        Ok(format!("{root}/{web_path}"))
    }
}

/// Inverse of [`to_server_path`] for display.
pub fn to_web_path(server_path: &str, server_root: &str) -> String {
    let root = server_root.trim_end_matches('/');
    if root.is_empty() {
        return server_path.to_string();
    }
    match server_path.strip_prefix(root) {
        Some(rest) if rest.starts_with('/') => rest.to_string(),
        _ => server_path.to_string(),
    }
}

pub fn file_name_of(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}
