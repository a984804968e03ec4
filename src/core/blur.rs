//! Laplacian-variance sharpness scoring.

use crate::config::BlurConfig;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, GrayImage};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BlurResult {
    /// 0-100; higher is sharper.
    pub sharpness: f64,
    pub is_blurry: bool,
}

/// Assess sharpness: downsample so the short side is at most
/// `max_short_side`, grayscale, 3x3 Laplacian skipping border pixels, then
/// variance of the responses scaled into 0-100.
pub fn assess_blur(img: &DynamicImage, cfg: &BlurConfig) -> BlurResult {
    let (width, height) = (img.width(), img.height());
    let short = width.min(height);
    let gray = if short > cfg.max_short_side {
        let scale = cfg.max_short_side as f64 / short as f64;
        img.resize(
            (width as f64 * scale).round() as u32,
            (height as f64 * scale).round() as u32,
            FilterType::Triangle,
        )
        .to_luma8()
    } else {
        img.to_luma8()
    };

    let variance = laplacian_variance(&gray);
    let sharpness = (variance / 10.0).clamp(0.0, 100.0);
    BlurResult {
        sharpness,
        is_blurry: sharpness < cfg.sharpness_cutoff,
    }
}

fn laplacian_variance(image: &GrayImage) -> f64 {
    let (width, height) = image.dimensions();
    if width < 3 || height < 3 {
        return 0.0;
    }

    let mut sum = 0.0;
    let mut sum_sq = 0.0;
    let mut count = 0u64;

    for y in 1..height - 1 {
        for x in 1..width - 1 {
            let center = image.get_pixel(x, y)[0] as f64;
            let response = 4.0 * center
                - image.get_pixel(x, y - 1)[0] as f64
                - image.get_pixel(x, y + 1)[0] as f64
                - image.get_pixel(x - 1, y)[0] as f64
                - image.get_pixel(x + 1, y)[0] as f64;
            sum += response;
            sum_sq += response * response;
            count += 1;
        }
    }

    if count == 0 {
        return 0.0;
    }
    let mean = sum / count as f64;
    sum_sq / count as f64 - mean * mean
}
