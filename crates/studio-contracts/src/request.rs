use serde::{Deserialize, Serialize};

use crate::mode::Mode;

/// A LoRA weight overlay applied at `strength` during generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoraAdapter {
    pub folder: String,
    pub filename: String,
    pub strength: f64,
}

/// Body of `POST /api/generate` (text-to-image and image-to-image).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub mode: Mode,
    pub prompt: String,
    pub width: u32,
    pub height: u32,
    pub steps: u32,
    pub guidance: f64,
    pub seed: i64,
    pub randomize: bool,
    pub init_image: Option<String>,
    pub init_image_2: Option<String>,
    pub loras: Vec<LoraAdapter>,
    pub top_k: f64,
    pub temperature: f64,
    pub strength: f64,
    pub mix_ratio: f64,
}

/// Body of `POST /api/analyze` (image-to-text).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzeRequest {
    pub image_path: String,
    pub image_path_2: Option<String>,
    pub prompt: String,
    pub top_k: u32,
    pub temperature: f64,
    pub strength: f64,
    pub mix_ratio: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StudioRequest {
    Generate(GenerateRequest),
    Analyze(AnalyzeRequest),
}

impl StudioRequest {
    pub fn mode(&self) -> Mode {
        match self {
            StudioRequest::Generate(request) => request.mode,
            StudioRequest::Analyze(_) => Mode::ImageToText,
        }
    }

    pub fn prompt(&self) -> &str {
        match self {
            StudioRequest::Generate(request) => &request.prompt,
            StudioRequest::Analyze(request) => &request.prompt,
        }
    }
}
