use anyhow::{bail, Context, Result};
use studio_contracts::request::LoraAdapter;

pub const MIN_RATIO_HEIGHT: u32 = 512;
pub const MAX_RATIO_HEIGHT: u32 = 2048;

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationParams {
    pub width: u32,
    pub height: u32,
    pub steps: u32,
    pub guidance: f64,
    pub seed: i64,
    pub randomize: bool,
    pub strength: f64,
    pub mix_ratio: f64,
    pub top_k: u32,
    pub temperature: f64,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            width: 1024,
            height: 1024,
            steps: 30,
            guidance: 3.0,
            seed: 42,
            randomize: false,
            strength: 0.75,
            mix_ratio: 0.5,
            top_k: 1,
            temperature: 0.6,
        }
    }
}

impl GenerationParams {
    /// Sets one field by its console name.
    pub fn set(&mut self, name: &str, raw: &str) -> Result<()> {
        let raw = raw.trim();
        match name {
            "width" => self.width = parse_dimension(name, raw)?,
            "height" => self.height = parse_dimension(name, raw)?,
            "steps" => {
                self.steps = raw
                    .parse::<u32>()
                    .ok()
                    .filter(|value| *value > 0)
                    .with_context(|| format!("steps must be a positive integer, got '{raw}'"))?
            }
            "guidance" => self.guidance = parse_float(name, raw)?,
            "seed" => {
                self.seed = raw
                    .parse::<i64>()
                    .with_context(|| format!("seed must be an integer, got '{raw}'"))?
            }
            "randomize" => self.randomize = parse_flag(raw)?,
            "strength" => self.strength = parse_unit(name, raw)?,
            "mix" | "mix_ratio" => self.mix_ratio = parse_unit(name, raw)?,
            "top_k" => {
                self.top_k = raw
                    .parse::<u32>()
                    .ok()
                    .filter(|value| *value > 0)
                    .with_context(|| format!("top_k must be a positive integer, got '{raw}'"))?
            }
            "temperature" => self.temperature = parse_float(name, raw)?,
            other => bail!("unknown parameter '{other}'"),
        }
        Ok(())
    }

    /// Keeps the width and derives the height from a `w:h` ratio.
    pub fn set_ratio(&mut self, ratio_w: u32, ratio_h: u32) -> Result<()> {
        if ratio_w == 0 || ratio_h == 0 {
            bail!("ratio parts must be positive");
        }
        let height = (f64::from(self.width) * f64::from(ratio_h) / f64::from(ratio_w)).round();
        self.height = (height as u32).clamp(MIN_RATIO_HEIGHT, MAX_RATIO_HEIGHT);
        Ok(())
    }

    pub fn summary(&self) -> String {
        format!(
            "{}x{} steps={} guidance={} seed={}{} strength={} mix={} top_k={} temp={}",
            self.width,
            self.height,
            self.steps,
            self.guidance,
            self.seed,
            if self.randomize { " (random)" } else { "" },
            self.strength,
            self.mix_ratio,
            self.top_k,
            self.temperature
        )
    }
}

/// Parses `16:9`, `16x9` or `16 9`.
pub fn parse_ratio(raw: &str) -> Result<(u32, u32)> {
    let parts: Vec<&str> = raw
        .split([':', 'x', 'X', ' '])
        .filter(|part| !part.is_empty())
        .collect();
    let [w, h] = parts.as_slice() else {
        bail!("ratio must look like 16:9, got '{raw}'");
    };
    let w = w
        .parse::<u32>()
        .with_context(|| format!("bad ratio width '{w}'"))?;
    let h = h
        .parse::<u32>()
        .with_context(|| format!("bad ratio height '{h}'"))?;
    Ok((w, h))
}

fn parse_dimension(name: &str, raw: &str) -> Result<u32> {
    raw.parse::<u32>()
        .ok()
        .filter(|value| *value > 0)
        .with_context(|| format!("{name} must be a positive integer, got '{raw}'"))
}

fn parse_float(name: &str, raw: &str) -> Result<f64> {
    raw.parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .with_context(|| format!("{name} must be a number, got '{raw}'"))
}

fn parse_unit(name: &str, raw: &str) -> Result<f64> {
    let value = parse_float(name, raw)?;
    if !(0.0..=1.0).contains(&value) {
        bail!("{name} must be between 0 and 1, got {value}");
    }
    Ok(value)
}

fn parse_flag(raw: &str) -> Result<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "" | "on" | "true" | "yes" | "1" => Ok(true),
        "off" | "false" | "no" | "0" => Ok(false),
        other => bail!("expected on/off, got '{other}'"),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoraSlot {
    pub filename: Option<String>,
    pub strength: f64,
}

impl Default for LoraSlot {
    fn default() -> Self {
        Self {
            filename: None,
            strength: 1.0,
        }
    }
}

/// LoRA folder, the files found in it, and the chosen adapters.
#[derive(Debug, Clone, PartialEq)]
pub struct LoraSelection {
    pub folder: String,
    available: Vec<String>,
    slots: Vec<LoraSlot>,
}

impl LoraSelection {
    pub fn new(folder: impl Into<String>) -> Self {
        Self {
            folder: folder.into(),
            available: Vec::new(),
            slots: vec![LoraSlot::default(), LoraSlot::default()],
        }
    }

    pub fn available(&self) -> &[String] {
        &self.available
    }

    pub fn set_available(&mut self, files: Vec<String>) {
        self.available = files;
    }

    pub fn slots(&self) -> &[LoraSlot] {
        &self.slots
    }

    pub fn add_slot(&mut self) -> usize {
        self.slots.push(LoraSlot::default());
        self.slots.len()
    }

    /// `index` is 1-based.
    pub fn set(&mut self, index: usize, filename: &str, strength: Option<f64>) -> Result<()> {
        let slot = index
            .checked_sub(1)
            .and_then(|idx| self.slots.get_mut(idx))
            .with_context(|| format!("no LoRA slot {index}"))?;
        let filename = filename.trim();
        slot.filename = if filename.is_empty() || filename == "-" {
            None
        } else {
            Some(filename.to_string())
        };
        if let Some(strength) = strength {
            if !strength.is_finite() {
                bail!("LoRA strength must be a number");
            }
            slot.strength = strength;
        }
        Ok(())
    }

    pub fn remove_slot(&mut self, index: usize) -> Result<()> {
        if index == 0 || index > self.slots.len() {
            bail!("no LoRA slot {index}");
        }
        self.slots.remove(index - 1);
        Ok(())
    }

    /// Adapters for every slot with a file, in slot order.
    pub fn adapters(&self) -> Vec<LoraAdapter> {
        self.slots
            .iter()
            .filter_map(|slot| {
                slot.filename.as_ref().map(|filename| LoraAdapter {
                    folder: self.folder.clone(),
                    filename: filename.clone(),
                    strength: slot.strength,
                })
            })
            .collect()
    }
}
