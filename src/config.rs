use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Block-mean perceptual hash parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HashConfig {
    /// Grid edge length; the hash carries `bits * bits` bits.
    pub bits: u32,
    /// Hamming distance at or below which two hashes count as duplicates.
    pub duplicate_threshold: u32,
}

impl Default for HashConfig {
    fn default() -> Self {
        Self {
            bits: 12,
            duplicate_threshold: 12,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlurConfig {
    /// Short side is downsampled to at most this before convolution.
    pub max_short_side: u32,
    /// Sharpness below this is reported as blurry.
    pub sharpness_cutoff: f64,
}

impl Default for BlurConfig {
    fn default() -> Self {
        Self {
            max_short_side: 256,
            sharpness_cutoff: 60.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BorderConfig {
    /// How many rows/columns to scan inward from each edge.
    pub max_depth: u32,
    /// Fraction of a line's pixels that must sit near the line mean for the
    /// line to count as solid.
    pub solid_ratio: f64,
    /// Per-channel distance from the line mean still considered "near".
    pub color_tolerance: f64,
    /// Minimum brightness discontinuity between the last solid line and the
    /// first non-solid one; anything flatter is a uniform interior, not a
    /// frame.
    pub min_contrast: f64,
}

impl Default for BorderConfig {
    fn default() -> Self {
        Self {
            max_depth: 50,
            solid_ratio: 0.85,
            color_tolerance: 24.0,
            min_contrast: 20.0,
        }
    }
}

/// Weights for the additive suspicion score. These are empirically tuned,
/// not derived; override rather than editing call sites.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuspicionConfig {
    pub weight_low_resolution: f64,
    pub weight_missing_metadata: f64,
    pub weight_extreme_aspect: f64,
    pub weight_border: f64,
    pub weight_abnormal_compression: f64,
    /// Pixel count below which an image counts as low resolution.
    pub min_pixels: u64,
    /// Aspect ratio (long/short) beyond which the shape is suspicious.
    pub max_aspect: f64,
    /// Encoded bytes per megapixel outside this range are abnormal.
    pub min_bytes_per_megapixel: f64,
    pub max_bytes_per_megapixel: f64,
    /// Band cutoffs: score 0 is Clean, up to `band_low` is Low, up to
    /// `band_medium` is Medium, above is High.
    pub band_low: f64,
    pub band_medium: f64,
}

impl Default for SuspicionConfig {
    fn default() -> Self {
        Self {
            weight_low_resolution: 1.5,
            weight_missing_metadata: 1.0,
            weight_extreme_aspect: 1.0,
            weight_border: 2.0,
            weight_abnormal_compression: 1.5,
            min_pixels: 640 * 480,
            max_aspect: 3.0,
            min_bytes_per_megapixel: 30_000.0,
            max_bytes_per_megapixel: 4_000_000.0,
            band_low: 1.5,
            band_medium: 3.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeasonConfig {
    /// Relative best/second ratio a channel must clear before its top season
    /// counts as a call rather than "uncertain".
    pub min_ratio: f32,
    /// Ratio at which channel confidence saturates at 1.0.
    pub strong_ratio: f32,
    /// Month (1-12) to compare detected seasons against. `None` means the
    /// run date.
    pub reference_month: Option<u32>,
}

impl Default for SeasonConfig {
    fn default() -> Self {
        Self {
            min_ratio: 1.05,
            strong_ratio: 1.25,
            reference_month: None,
        }
    }
}

/// Cross-photo object reuse detection parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReuseConfig {
    /// Photos embedded per batch; bounds peak pixel memory.
    pub batch_size: usize,
    /// Detections kept per photo after confidence ranking.
    pub max_objects_per_photo: usize,
    /// Detections smaller than this fraction of the frame are noise.
    pub min_area_fraction: f64,
    /// Detections larger than this fraction are the scene, not a prop.
    pub max_area_fraction: f64,
    /// Margin added around a bounding box before cropping for embedding.
    pub crop_margin: f64,
    /// Cosine similarity threshold applied when no per-class entry exists.
    pub default_threshold: f32,
    /// Per-class similarity thresholds; vehicles read stricter than
    /// incidental furniture.
    pub class_thresholds: HashMap<String, f32>,
    /// Added to the person threshold when the ReID model is unavailable and
    /// the general embedder stands in; fallback embeddings are noisier, so
    /// require more similarity.
    pub reid_fallback_penalty: f32,
}

impl Default for ReuseConfig {
    fn default() -> Self {
        let mut class_thresholds = HashMap::new();
        class_thresholds.insert("person".to_string(), 0.78);
        for vehicle in ["car", "truck", "bus", "motorcycle", "bicycle"] {
            class_thresholds.insert(vehicle.to_string(), 0.92);
        }
        for furniture in ["chair", "couch", "bench", "potted plant"] {
            class_thresholds.insert(furniture.to_string(), 0.84);
        }
        Self {
            batch_size: 5,
            max_objects_per_photo: 8,
            min_area_fraction: 0.002,
            max_area_fraction: 0.8,
            crop_margin: 0.12,
            default_threshold: 0.86,
            class_thresholds,
            reid_fallback_penalty: 0.04,
        }
    }
}

impl ReuseConfig {
    pub fn threshold_for(&self, class: &str, reid_available: bool) -> f32 {
        let base = self
            .class_thresholds
            .get(class)
            .copied()
            .unwrap_or(self.default_threshold);
        if class == "person" && !reid_available {
            base + self.reid_fallback_penalty
        } else {
            base
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionConfig {
    /// Grid edge length per photo.
    pub grid: u32,
    /// A cell pair at or above this similarity counts toward "static".
    pub static_threshold: f32,
    /// Fraction of pairs that must clear `static_threshold` for a cell to be
    /// excluded as fixed background.
    pub static_pair_ratio: f64,
    /// Non-static cell pairs at or above this similarity are flagged.
    pub duplicate_threshold: f32,
}

impl Default for RegionConfig {
    fn default() -> Self {
        Self {
            grid: 3,
            static_threshold: 0.93,
            static_pair_ratio: 0.7,
            duplicate_threshold: 0.9,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Lower clamp on the analysis pool size.
    pub min_workers: usize,
    /// Upper clamp on the analysis pool size.
    pub max_workers: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            min_workers: 4,
            max_workers: 12,
        }
    }
}

impl WorkerConfig {
    pub fn pool_size(&self) -> usize {
        num_cpus::get().clamp(self.min_workers, self.max_workers)
    }
}

/// Top-level configuration, all parts overridable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditConfig {
    pub hash: HashConfig,
    pub blur: BlurConfig,
    pub border: BorderConfig,
    pub suspicion: SuspicionConfig,
    pub season: SeasonConfig,
    pub reuse: ReuseConfig,
    pub regions: RegionConfig,
    pub workers: WorkerConfig,
}
