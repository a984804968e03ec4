//! Framed-photo detection: scan inward from each edge looking for a run of
//! solid lines that ends in a brightness discontinuity.

use crate::config::BorderConfig;
use image::{DynamicImage, RgbImage};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Top,
    Bottom,
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BorderSide {
    pub side: Side,
    /// Depth in pixels of the solid run.
    pub width: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BorderResult {
    pub sides: Vec<BorderSide>,
}

impl BorderResult {
    pub fn has_border(&self) -> bool {
        !self.sides.is_empty()
    }
}

pub fn detect_border(img: &DynamicImage, cfg: &BorderConfig) -> BorderResult {
    let rgb = img.to_rgb8();
    let mut sides = Vec::new();
    for side in [Side::Top, Side::Bottom, Side::Left, Side::Right] {
        if let Some(width) = scan_edge(&rgb, side, cfg) {
            sides.push(BorderSide { side, width });
        }
    }
    BorderResult { sides }
}

struct LineStats {
    solid: bool,
    brightness: f64,
}

/// Walk lines inward from `side`. A line is solid when at least
/// `solid_ratio` of its pixels sit within `color_tolerance` of the line
/// mean. The run ends at the first non-solid line; that depth is the border
/// width, but only when the brightness step against the last solid line
/// clears `min_contrast` — otherwise the "frame" is just a uniform interior.
/// Running out of scan depth while still solid also means no border.
fn scan_edge(rgb: &RgbImage, side: Side, cfg: &BorderConfig) -> Option<u32> {
    let (width, height) = rgb.dimensions();
    let edge_len = match side {
        Side::Top | Side::Bottom => height,
        Side::Left | Side::Right => width,
    };
    let max_depth = cfg.max_depth.min(edge_len / 2);
    if max_depth == 0 {
        return None;
    }

    let mut last_solid_brightness: Option<f64> = None;
    for depth in 0..max_depth {
        let stats = line_stats(rgb, side, depth, cfg);
        if stats.solid {
            last_solid_brightness = Some(stats.brightness);
            continue;
        }
        let previous = last_solid_brightness?;
        if depth > 0 && (stats.brightness - previous).abs() >= cfg.min_contrast {
            return Some(depth);
        }
        return None;
    }
    None
}

fn line_stats(rgb: &RgbImage, side: Side, depth: u32, cfg: &BorderConfig) -> LineStats {
    let (width, height) = rgb.dimensions();
    let pixels: Vec<[u8; 3]> = match side {
        Side::Top => (0..width).map(|x| rgb.get_pixel(x, depth).0).collect(),
        Side::Bottom => (0..width)
            .map(|x| rgb.get_pixel(x, height - 1 - depth).0)
            .collect(),
        Side::Left => (0..height).map(|y| rgb.get_pixel(depth, y).0).collect(),
        Side::Right => (0..height)
            .map(|y| rgb.get_pixel(width - 1 - depth, y).0)
            .collect(),
    };

    let n = pixels.len() as f64;
    let mut mean = [0.0f64; 3];
    for px in &pixels {
        for c in 0..3 {
            mean[c] += px[c] as f64;
        }
    }
    for c in &mut mean {
        *c /= n;
    }

    let near = pixels
        .iter()
        .filter(|px| {
            (0..3).all(|c| (px[c] as f64 - mean[c]).abs() <= cfg.color_tolerance)
        })
        .count();

    LineStats {
        solid: near as f64 / n >= cfg.solid_ratio,
        brightness: (mean[0] + mean[1] + mean[2]) / 3.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};

    /// White frame of `frame` pixels around a noisy interior.
    fn framed(size: u32, frame: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(ImageBuffer::from_fn(size, size, |x, y| {
            let inside = x >= frame && x < size - frame && y >= frame && y < size - frame;
            if inside {
                let v = ((x * 31 + y * 17) % 200) as u8;
                Rgb([v, v / 2, 255 - v])
            } else {
                Rgb([255, 255, 255])
            }
        }))
    }

    #[test]
    fn detects_frame_on_all_sides() {
        let result = detect_border(&framed(200, 15), &BorderConfig::default());
        assert!(result.has_border());
        assert_eq!(result.sides.len(), 4);
        for side in &result.sides {
            assert_eq!(side.width, 15);
        }
    }

    #[test]
    fn uniform_image_has_no_border() {
        let flat = DynamicImage::ImageRgb8(ImageBuffer::from_fn(120, 120, |_, _| {
            Rgb([200, 200, 200])
        }));
        assert!(!detect_border(&flat, &BorderConfig::default()).has_border());
    }

    #[test]
    fn noisy_image_without_frame_has_no_border() {
        let noisy = DynamicImage::ImageRgb8(ImageBuffer::from_fn(120, 120, |x, y| {
            let v = ((x * 31 + y * 17) % 200) as u8;
            Rgb([v, v / 2, 255 - v])
        }));
        assert!(!detect_border(&noisy, &BorderConfig::default()).has_border());
    }

    #[test]
    fn frame_deeper_than_scan_limit_is_not_reported() {
        // 60px frame on a 200px image: the scan gives up at depth 50 while
        // still inside solid lines.
        let result = detect_border(&framed(200, 60), &BorderConfig::default());
        assert!(!result.has_border());
    }

    #[test]
    fn low_contrast_frame_is_treated_as_interior() {
        // Interior is non-solid but its mean brightness sits within
        // min_contrast of the frame, so no discontinuity exists.
        let subtle = DynamicImage::ImageRgb8(ImageBuffer::from_fn(120, 120, |x, y| {
            let inside = x >= 10 && x < 110 && y >= 10 && y < 110;
            if inside {
                let v = if (x + y) % 2 == 0 { 255 } else { 100 };
                Rgb([v, v, v])
            } else {
                Rgb([180, 180, 180])
            }
        }));
        assert!(!detect_border(&subtle, &BorderConfig::default()).has_border());
    }
}
