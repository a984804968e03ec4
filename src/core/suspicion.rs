//! Additive forensic suspicion score over independent weak signals.

use crate::config::SuspicionConfig;
use crate::core::border::BorderResult;
use serde::{Deserialize, Serialize};
use std::io::Cursor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SuspicionBand {
    Clean,
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuspicionResult {
    pub score: f64,
    pub band: SuspicionBand,
    /// Human-readable names of the signals that fired.
    pub signals: Vec<String>,
}

/// Score one photo. Each signal is weak on its own; the additive total maps
/// into four bands.
pub fn assess_suspicion(
    encoded: &[u8],
    width: u32,
    height: u32,
    border: &BorderResult,
    cfg: &SuspicionConfig,
) -> SuspicionResult {
    let mut score = 0.0;
    let mut signals = Vec::new();

    if (width as u64) * (height as u64) < cfg.min_pixels {
        score += cfg.weight_low_resolution;
        signals.push("low resolution".to_string());
    }

    if !has_capture_metadata(encoded) {
        score += cfg.weight_missing_metadata;
        signals.push("missing capture metadata".to_string());
    }

    let long = width.max(height) as f64;
    let short = width.min(height).max(1) as f64;
    if long / short > cfg.max_aspect {
        score += cfg.weight_extreme_aspect;
        signals.push("extreme aspect ratio".to_string());
    }

    if border.has_border() {
        score += cfg.weight_border;
        signals.push("border present".to_string());
    }

    let megapixels = (width as f64 * height as f64 / 1_000_000.0).max(1e-6);
    let bytes_per_mp = encoded.len() as f64 / megapixels;
    if bytes_per_mp < cfg.min_bytes_per_megapixel || bytes_per_mp > cfg.max_bytes_per_megapixel {
        score += cfg.weight_abnormal_compression;
        signals.push("abnormal compression".to_string());
    }

    let band = if score <= 0.0 {
        SuspicionBand::Clean
    } else if score <= cfg.band_low {
        SuspicionBand::Low
    } else if score <= cfg.band_medium {
        SuspicionBand::Medium
    } else {
        SuspicionBand::High
    };

    SuspicionResult {
        score,
        band,
        signals,
    }
}

/// True when the encoded bytes carry EXIF with a capture timestamp or camera
/// identity. Unreadable or absent EXIF counts as missing, not as an error.
fn has_capture_metadata(encoded: &[u8]) -> bool {
    let mut cursor = Cursor::new(encoded);
    let reader = match exif::Reader::new().read_from_container(&mut cursor) {
        Ok(reader) => reader,
        Err(_) => return false,
    };
    reader
        .get_field(exif::Tag::DateTimeOriginal, exif::In::PRIMARY)
        .or_else(|| reader.get_field(exif::Tag::DateTime, exif::In::PRIMARY))
        .or_else(|| reader.get_field(exif::Tag::Make, exif::In::PRIMARY))
        .is_some()
}
