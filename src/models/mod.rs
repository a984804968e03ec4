//! ONNX model loading and capability resolution.
//!
//! All models are optional. Each file is resolved exactly once at load time;
//! anything missing or unloadable downgrades the corresponding capability
//! with a logged warning instead of failing the run. Analyses gated on a
//! missing capability are skipped, never silently faked.

pub mod detector;
pub mod embedder;

use crate::core::season::PromptBank;
use detector::Detector;
use embedder::{ClipEmbedder, ReidEmbedder};
use serde::Serialize;
use std::path::Path;
use thiserror::Error;

const DETECTOR_FILE: &str = "yolov8n.onnx";
const REID_FILE: &str = "osnet_reid.onnx";
const CLIP_FILE: &str = "clip_visual.onnx";
const PROMPT_BANK_FILE: &str = "prompt_bank.json";

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model runtime failed: {0}")]
    Runtime(#[from] ort::Error),

    #[error("model file not found: {}", .0.display())]
    FileNotFound(Box<Path>),

    #[error("image decode failed: {0}")]
    ImageDecode(#[from] image::ImageError),

    #[error("unexpected model output shape: {0}")]
    OutputShape(#[from] ndarray::ShapeError),
}

/// Which analyses the loaded models can support. Resolved once per service.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct Capabilities {
    pub detection: bool,
    pub clip_embedding: bool,
    pub reid_embedding: bool,
    pub season: bool,
}

pub struct ModelService {
    detector: Option<Detector>,
    clip: Option<ClipEmbedder>,
    reid: Option<ReidEmbedder>,
    prompts: Option<PromptBank>,
}

impl ModelService {
    /// A service with every capability off. Hash, blur, border and suspicion
    /// analyses run unchanged against it.
    pub fn disabled() -> Self {
        Self {
            detector: None,
            clip: None,
            reid: None,
            prompts: None,
        }
    }

    /// Load whatever models exist under `dir`. Missing or broken files only
    /// cost their own capability.
    pub fn load(dir: &Path) -> Self {
        let detector = match Detector::load(&dir.join(DETECTOR_FILE)) {
            Ok(d) => Some(d),
            Err(e) => {
                log::warn!("object detector unavailable: {e}");
                None
            }
        };
        let clip = match ClipEmbedder::load(&dir.join(CLIP_FILE)) {
            Ok(m) => Some(m),
            Err(e) => {
                log::warn!("visual embedder unavailable: {e}");
                None
            }
        };
        let reid = match ReidEmbedder::load(&dir.join(REID_FILE)) {
            Ok(m) => Some(m),
            Err(e) => {
                log::warn!("person re-id embedder unavailable: {e}");
                None
            }
        };
        let prompts = match PromptBank::load(&dir.join(PROMPT_BANK_FILE)) {
            Ok(b) => Some(b),
            Err(e) => {
                log::warn!("season prompt bank unavailable: {e:#}");
                None
            }
        };
        Self {
            detector,
            clip,
            reid,
            prompts,
        }
    }

    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            detection: self.detector.is_some(),
            clip_embedding: self.clip.is_some(),
            reid_embedding: self.reid.is_some(),
            season: self.clip.is_some() && self.prompts.is_some(),
        }
    }

    pub fn detector(&self) -> Option<&Detector> {
        self.detector.as_ref()
    }

    pub fn clip(&self) -> Option<&ClipEmbedder> {
        self.clip.as_ref()
    }

    pub fn reid(&self) -> Option<&ReidEmbedder> {
        self.reid.as_ref()
    }

    pub fn prompt_bank(&self) -> Option<&PromptBank> {
        self.prompts.as_ref()
    }

    /// Drop every session so the runtime can release its memory.
    pub fn release(&mut self) {
        self.detector = None;
        self.clip = None;
        self.reid = None;
        self.prompts = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_service_has_no_capabilities() {
        let service = ModelService::disabled();
        let caps = service.capabilities();
        assert!(!caps.detection);
        assert!(!caps.clip_embedding);
        assert!(!caps.reid_embedding);
        assert!(!caps.season);
    }

    #[test]
    fn loading_from_empty_dir_degrades_everything() {
        let dir = tempfile::TempDir::new().unwrap();
        let service = ModelService::load(dir.path());
        let caps = service.capabilities();
        assert!(!caps.detection);
        assert!(!caps.season);
    }
}
