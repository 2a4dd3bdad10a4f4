use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// One of the three studio workflows. Exactly one is active at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Mode {
    #[serde(rename = "t2i")]
    TextToImage,
    #[serde(rename = "i2i")]
    ImageToImage,
    #[serde(rename = "i2t")]
    ImageToText,
}

impl Mode {
    pub const ALL: [Mode; 3] = [Mode::TextToImage, Mode::ImageToImage, Mode::ImageToText];

    pub fn tag(self) -> &'static str {
        match self {
            Mode::TextToImage => "t2i",
            Mode::ImageToImage => "i2i",
            Mode::ImageToText => "i2t",
        }
    }

    /// Case-insensitive lookup; `"unk"` and anything else yields `None`.
    pub fn from_tag(raw: &str) -> Option<Mode> {
        let lowered = raw.trim().to_ascii_lowercase();
        Mode::ALL.into_iter().find(|mode| mode.tag() == lowered)
    }

    pub fn needs_source_image(self) -> bool {
        !matches!(self, Mode::TextToImage)
    }

    pub fn is_analysis(self) -> bool {
        matches!(self, Mode::ImageToText)
    }

    pub fn affordances(self) -> &'static ModeAffordances {
        match self {
            Mode::TextToImage => &TEXT_TO_IMAGE_AFFORDANCES,
            Mode::ImageToImage => &IMAGE_TO_IMAGE_AFFORDANCES,
            Mode::ImageToText => &IMAGE_TO_TEXT_AFFORDANCES,
        }
    }

    fn index(self) -> usize {
        match self {
            Mode::TextToImage => 0,
            Mode::ImageToImage => 1,
            Mode::ImageToText => 2,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for Mode {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Mode::from_tag(raw)
            .ok_or_else(|| anyhow::anyhow!("unknown mode '{raw}' (expected t2i, i2i or i2t)"))
    }
}

/// Static, per-mode description of which controls are offered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeAffordances {
    pub generate_label: &'static str,
    pub prompt_placeholder: &'static str,
    pub invalid_hint: &'static str,
    pub upload_panel: bool,
    pub second_slot: bool,
    pub blend_params: bool,
    pub text_result: bool,
    pub image_params: bool,
    pub lora_section: bool,
    pub original_ratio: bool,
}

const TEXT_TO_IMAGE_AFFORDANCES: ModeAffordances = ModeAffordances {
    generate_label: "GENERATE IMAGE",
    prompt_placeholder: "Describe your imagination here...",
    invalid_hint: "Please enter a prompt",
    upload_panel: false,
    second_slot: false,
    blend_params: false,
    text_result: false,
    image_params: true,
    lora_section: true,
    original_ratio: false,
};

const IMAGE_TO_IMAGE_AFFORDANCES: ModeAffordances = ModeAffordances {
    generate_label: "RESTYLE IMAGE",
    prompt_placeholder: "Describe how to modify the image...",
    invalid_hint: "Please upload an image",
    upload_panel: true,
    second_slot: true,
    blend_params: true,
    text_result: false,
    image_params: true,
    lora_section: true,
    original_ratio: true,
};

const IMAGE_TO_TEXT_AFFORDANCES: ModeAffordances = ModeAffordances {
    generate_label: "ANALYZE IMAGE(S)",
    prompt_placeholder: "Ask a question about the image(s)...",
    invalid_hint: "Please upload an image",
    upload_panel: true,
    second_slot: true,
    blend_params: true,
    text_result: true,
    image_params: false,
    lora_section: false,
    original_ratio: true,
};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModeBuffer {
    pub prompt: String,
    pub image: Option<String>,
}

/// Work-in-progress prompt and last produced image, one entry per mode.
/// Entries are only ever overwritten.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModeBuffers {
    entries: [ModeBuffer; 3],
}

impl ModeBuffers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, mode: Mode) -> &ModeBuffer {
        &self.entries[mode.index()]
    }

    pub fn save(&mut self, mode: Mode, prompt: &str, image: Option<&str>) {
        let entry = &mut self.entries[mode.index()];
        entry.prompt = prompt.to_string();
        entry.image = image.filter(|value| !value.is_empty()).map(str::to_string);
    }

    pub fn set_prompt(&mut self, mode: Mode, prompt: impl Into<String>) {
        self.entries[mode.index()].prompt = prompt.into();
    }

    pub fn set_image(&mut self, mode: Mode, image: Option<String>) {
        self.entries[mode.index()].image = image.filter(|value| !value.is_empty());
    }
}

#[cfg(test)]
mod tests {
    use super::{Mode, ModeBuffers};

    #[test]
    fn mode_tags_parse_case_insensitively() {
        assert_eq!(Mode::from_tag("T2I"), Some(Mode::TextToImage));
        assert_eq!(Mode::from_tag(" i2i "), Some(Mode::ImageToImage));
        assert_eq!(Mode::from_tag("i2t"), Some(Mode::ImageToText));
        assert_eq!(Mode::from_tag("unk"), None);
        assert!("video".parse::<Mode>().is_err());
    }

    #[test]
    fn mode_serializes_as_short_tag() -> anyhow::Result<()> {
        assert_eq!(serde_json::to_string(&Mode::ImageToText)?, "\"i2t\"");
        let parsed: Mode = serde_json::from_str("\"i2i\"")?;
        assert_eq!(parsed, Mode::ImageToImage);
        Ok(())
    }

    #[test]
    fn buffers_keep_one_entry_per_mode() {
        let mut buffers = ModeBuffers::new();
        buffers.save(Mode::TextToImage, "a castle", Some("/outputs/a.png"));
        buffers.save(Mode::ImageToImage, "make it blue", None);

        assert_eq!(buffers.get(Mode::TextToImage).prompt, "a castle");
        assert_eq!(
            buffers.get(Mode::TextToImage).image.as_deref(),
            Some("/outputs/a.png")
        );
        assert_eq!(buffers.get(Mode::ImageToImage).image, None);
        assert_eq!(buffers.get(Mode::ImageToText).prompt, "");

        buffers.save(Mode::TextToImage, "a tower", Some(""));
        assert_eq!(buffers.get(Mode::TextToImage).prompt, "a tower");
        assert_eq!(buffers.get(Mode::TextToImage).image, None);
    }

    #[test]
    fn analysis_mode_disables_image_params() {
        let table = Mode::ImageToText.affordances();
        assert!(!table.image_params);
        assert!(!table.lora_section);
        assert!(table.text_result);
        assert!(!Mode::TextToImage.affordances().original_ratio);
        assert!(Mode::ImageToImage.affordances().second_slot);
    }
}
