//! Cross-photo object reuse detection.
//!
//! Each unique photo is detected, cropped, and embedded once; photos are
//! processed in fixed-size batches so pixel memory is bounded by the batch
//! while matching still sees every earlier object through the retained
//! record list. Matching is strictly ordered (later object against earlier
//! objects only), which makes the result set independent of the batch size.

use crate::config::ReuseConfig;
use crate::core::container::EmbeddedImage;
use crate::models::detector::{BBox, Detection};
use crate::models::embedder::cosine_similarity;
use crate::models::ModelService;
use crate::progress::{AuditPhase, CancelToken, ProgressSink};
use crate::services::pipeline::ImageDiagnostic;
use image::{DynamicImage, GenericImageView};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReuseError {
    #[error("operation cancelled")]
    Cancelled,
}

/// What survives a batch: class, position, vector. Never pixels.
#[derive(Debug, Clone)]
pub struct ObjectRecord {
    /// Index into the extraction's image list of the photo's first record.
    pub image_index: usize,
    /// Ordinal of the unique photo the object came from.
    pub photo_ordinal: usize,
    pub class: String,
    pub confidence: f32,
    pub bbox: BBox,
    pub vector: Vec<f32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DuplicateMatch {
    pub earlier_image: usize,
    pub later_image: usize,
    pub class: String,
    pub similarity: f32,
}

pub struct ReuseEngine {
    config: ReuseConfig,
}

impl ReuseEngine {
    pub fn new(config: ReuseConfig) -> Self {
        Self { config }
    }

    /// Detect and match reused objects across every decodable unique photo.
    /// Records from cells sharing one blob count as a single photo.
    pub fn run(
        &self,
        images: &[EmbeddedImage],
        diagnostics: &[ImageDiagnostic],
        models: &ModelService,
        cancel: &CancelToken,
        progress: &ProgressSink,
    ) -> Result<Vec<DuplicateMatch>, ReuseError> {
        let caps = models.capabilities();
        if !caps.detection || !caps.clip_embedding {
            log::info!("object reuse skipped: detection or embedding capability missing");
            return Ok(Vec::new());
        }

        let photos = unique_photos(images, diagnostics);
        let total = photos.len();
        let mut prior: Vec<ObjectRecord> = Vec::new();
        let mut matches = Vec::new();

        for (batch_number, batch) in photos.chunks(self.config.batch_size.max(1)).enumerate() {
            if cancel.is_cancelled() {
                return Err(ReuseError::Cancelled);
            }
            let mut batch_records = Vec::new();
            for &(ordinal, image_index) in batch {
                let image = &images[image_index];
                let decoded = match image::load_from_memory(&image.data) {
                    Ok(d) => d,
                    Err(e) => {
                        log::warn!("photo {} skipped by reuse engine: {e}", image.id);
                        continue;
                    }
                };
                batch_records.extend(self.embed_photo(
                    &decoded,
                    ordinal,
                    image_index,
                    models,
                ));
            }

            matches.extend(match_batch(
                &batch_records,
                &prior,
                &self.config,
                caps.reid_embedding,
            ));
            prior.extend(batch_records);

            let done = ((batch_number + 1) * self.config.batch_size.max(1)).min(total);
            progress.send(
                AuditPhase::ObjectReuse,
                (done * 100 / total.max(1)) as u8,
                format!("Compared objects in {done} of {total} photos"),
            );
        }
        Ok(matches)
    }

    /// Detect, filter, crop and embed one photo's objects.
    fn embed_photo(
        &self,
        decoded: &DynamicImage,
        photo_ordinal: usize,
        image_index: usize,
        models: &ModelService,
    ) -> Vec<ObjectRecord> {
        let Some(detector) = models.detector() else {
            return Vec::new();
        };
        let detections = match detector.detect(decoded, 0.25, 64) {
            Ok(d) => d,
            Err(e) => {
                log::warn!("detection failed on photo {photo_ordinal}: {e}");
                return Vec::new();
            }
        };
        let (width, height) = decoded.dimensions();
        let kept = filter_detections(detections, width as f64 * height as f64, &self.config);

        let mut records = Vec::new();
        for detection in kept {
            let crop = crop_with_margin(decoded, &detection.bbox, self.config.crop_margin);
            let embedded = if detection.label == "person" {
                match models.reid() {
                    Some(reid) => reid.embed(&crop),
                    None => match models.clip() {
                        Some(clip) => clip.embed(&crop),
                        None => continue,
                    },
                }
            } else {
                match models.clip() {
                    Some(clip) => clip.embed(&crop),
                    None => continue,
                }
            };
            match embedded {
                Ok(vector) => records.push(ObjectRecord {
                    image_index,
                    photo_ordinal,
                    class: detection.label.to_string(),
                    confidence: detection.confidence,
                    bbox: detection.bbox,
                    vector,
                }),
                Err(e) => log::warn!("embedding failed for a {} crop: {e}", detection.label),
            }
        }
        records
    }
}

/// First record per content hash, in document order, excluding skipped
/// images. Returns (photo ordinal, image index) pairs.
fn unique_photos(
    images: &[EmbeddedImage],
    diagnostics: &[ImageDiagnostic],
) -> Vec<(usize, usize)> {
    let mut seen = std::collections::HashSet::new();
    let mut photos = Vec::new();
    for (i, image) in images.iter().enumerate() {
        if diagnostics
            .get(i)
            .is_some_and(|d| d.skipped_reason.is_some())
        {
            continue;
        }
        if seen.insert(image.content_hash.clone()) {
            photos.push((photos.len(), i));
        }
    }
    photos
}

/// Drop boxes that are noise (too small) or the scene itself (too large),
/// then keep the top detections by confidence.
fn filter_detections(detections: Vec<Detection>, frame_area: f64, cfg: &ReuseConfig) -> Vec<Detection> {
    let mut kept: Vec<Detection> = detections
        .into_iter()
        .filter(|d| {
            let fraction = d.bbox.area() as f64 / frame_area.max(1.0);
            fraction >= cfg.min_area_fraction && fraction <= cfg.max_area_fraction
        })
        .collect();
    kept.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    kept.truncate(cfg.max_objects_per_photo);
    kept
}

/// Expand a box by `margin` of its own size on every side, clamped to the
/// frame, and crop.
fn crop_with_margin(img: &DynamicImage, bbox: &BBox, margin: f64) -> DynamicImage {
    let (width, height) = img.dimensions();
    let dx = bbox.width as f64 * margin;
    let dy = bbox.height as f64 * margin;
    let x0 = ((bbox.x as f64 - dx).max(0.0)) as u32;
    let y0 = ((bbox.y as f64 - dy).max(0.0)) as u32;
    let x1 = ((bbox.x as f64 + bbox.width as f64 + dx).min(width as f64)) as u32;
    let y1 = ((bbox.y as f64 + bbox.height as f64 + dy).min(height as f64)) as u32;
    img.crop_imm(x0, y0, (x1 - x0).max(1), (y1 - y0).max(1))
}

/// Match each batch record against every strictly earlier object: retained
/// records from prior batches plus earlier records within this batch from a
/// different photo. Ordering makes the union over batches equal to the full
/// pairwise comparison, whatever the batch size.
fn match_batch(
    batch: &[ObjectRecord],
    prior: &[ObjectRecord],
    cfg: &ReuseConfig,
    reid_available: bool,
) -> Vec<DuplicateMatch> {
    let mut matches = Vec::new();
    for (i, later) in batch.iter().enumerate() {
        let threshold = cfg.threshold_for(&later.class, reid_available);
        let earlier_records = prior
            .iter()
            .chain(batch[..i].iter())
            .filter(|e| e.photo_ordinal != later.photo_ordinal && e.class == later.class);
        for earlier in earlier_records {
            let similarity = cosine_similarity(&earlier.vector, &later.vector);
            if similarity >= threshold {
                matches.push(DuplicateMatch {
                    earlier_image: earlier.image_index,
                    later_image: later.image_index,
                    class: later.class.clone(),
                    similarity,
                });
            }
        }
    }
    matches
}
