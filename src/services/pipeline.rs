//! Two-phase per-image diagnostics.
//!
//! Phase 1 runs strictly sequentially in document order so duplicate
//! attribution is deterministic: decode, block hash, duplicate lookup.
//! Phase 2 fans the independent analyses (blur, border, suspicion, season)
//! out over a bounded worker pool, one whole photo per task. A photo that
//! fails to decode is skipped with a recorded reason and excluded from both
//! duplicate engines; the run continues.

use crate::config::AuditConfig;
use crate::core::blur::assess_blur;
use crate::core::border::{detect_border, BorderResult};
use crate::core::container::EmbeddedImage;
use crate::core::phash::{block_mean_hash, HashIndex};
use crate::core::season::{self, ChannelCall, SeasonResult};
use crate::core::suspicion::{assess_suspicion, SuspicionResult};
use crate::models::ModelService;
use crate::progress::{AuditPhase, CancelToken, ProgressSink};
use image::{DynamicImage, GenericImageView};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("operation cancelled")]
    Cancelled,
}

/// All per-image findings; immutable once the pipeline returns.
#[derive(Debug, Clone, Serialize)]
pub struct ImageDiagnostic {
    /// Index into the extraction's image list.
    pub image_index: usize,
    pub id: String,
    pub image_id: String,
    pub sheet: String,
    pub row: u32,
    pub column: u32,
    pub content_hash: String,
    pub width: u32,
    pub height: u32,
    pub block_hash: Option<String>,
    /// Index of the earliest image this one duplicates, if any.
    pub duplicate_of: Option<usize>,
    pub sharpness: Option<f64>,
    pub is_blurry: bool,
    pub border: Option<BorderResult>,
    pub suspicion: Option<SuspicionResult>,
    pub season: Option<SeasonResult>,
    /// Set when the image was excluded from analysis, and why.
    pub skipped_reason: Option<String>,
}

impl ImageDiagnostic {
    fn skipped(index: usize, image: &EmbeddedImage, reason: String) -> Self {
        Self {
            image_index: index,
            id: image.id.clone(),
            image_id: image.image_id.clone(),
            sheet: image.sheet.clone(),
            row: image.row,
            column: image.column,
            content_hash: image.content_hash.clone(),
            width: 0,
            height: 0,
            block_hash: None,
            duplicate_of: None,
            sharpness: None,
            is_blurry: false,
            border: None,
            suspicion: None,
            season: None,
            skipped_reason: Some(reason),
        }
    }
}

pub struct DiagnosticPipeline {
    config: AuditConfig,
}

impl DiagnosticPipeline {
    pub fn new(config: AuditConfig) -> Self {
        Self { config }
    }

    /// Run both phases. When `validate_all` is false, phase 2 only analyzes
    /// images implicated by the duplicate pass (a duplicate or its source).
    pub fn run(
        &self,
        images: &[EmbeddedImage],
        models: &ModelService,
        validate_all: bool,
        cancel: &CancelToken,
        progress: &ProgressSink,
    ) -> Result<Vec<ImageDiagnostic>, PipelineError> {
        let hash_progress = progress.scoped(0, 45);
        let analysis_progress = progress.scoped(45, 55);

        let mut diagnostics = self.hash_phase(images, cancel, &hash_progress)?;
        self.analysis_phase(
            images,
            &mut diagnostics,
            models,
            validate_all,
            cancel,
            &analysis_progress,
        )?;
        Ok(diagnostics)
    }

    /// Phase 1: sequential decode + hash + duplicate lookup in document
    /// order. Records sharing a blob reuse the already computed hash.
    fn hash_phase(
        &self,
        images: &[EmbeddedImage],
        cancel: &CancelToken,
        progress: &ProgressSink,
    ) -> Result<Vec<ImageDiagnostic>, PipelineError> {
        let mut index = HashIndex::new(self.config.hash.duplicate_threshold);
        let mut hash_cache: HashMap<String, Option<(String, u32, u32)>> = HashMap::new();
        let mut diagnostics = Vec::with_capacity(images.len());

        for (i, image) in images.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }

            let cached = hash_cache.entry(image.content_hash.clone()).or_insert_with(|| {
                match image::load_from_memory(&image.data) {
                    Ok(decoded) => {
                        let hash = block_mean_hash(&decoded, self.config.hash.bits);
                        Some((hash, decoded.width(), decoded.height()))
                    }
                    Err(e) => {
                        log::warn!("image {} failed to decode: {e}", image.id);
                        None
                    }
                }
            });

            let diagnostic = match cached {
                Some((hash, width, height)) => {
                    let duplicate_of = index.insert_and_find(hash);
                    ImageDiagnostic {
                        image_index: i,
                        id: image.id.clone(),
                        image_id: image.image_id.clone(),
                        sheet: image.sheet.clone(),
                        row: image.row,
                        column: image.column,
                        content_hash: image.content_hash.clone(),
                        width: *width,
                        height: *height,
                        block_hash: Some(hash.clone()),
                        duplicate_of,
                        sharpness: None,
                        is_blurry: false,
                        border: None,
                        suspicion: None,
                        season: None,
                        skipped_reason: None,
                    }
                }
                None => {
                    index.insert_placeholder();
                    ImageDiagnostic::skipped(i, image, "decode failed".to_string())
                }
            };
            diagnostics.push(diagnostic);

            let percent = ((i + 1) * 100 / images.len().max(1)) as u8;
            progress.send(
                AuditPhase::Hashing,
                percent,
                format!("Hashed {} of {} images", i + 1, images.len()),
            );
        }
        Ok(diagnostics)
    }

    /// Phase 2: independent analyses on a bounded pool. Tasks re-decode from
    /// the shared encoded buffer, so peak pixel memory stays proportional to
    /// the pool size.
    fn analysis_phase(
        &self,
        images: &[EmbeddedImage],
        diagnostics: &mut [ImageDiagnostic],
        models: &ModelService,
        validate_all: bool,
        cancel: &CancelToken,
        progress: &ProgressSink,
    ) -> Result<(), PipelineError> {
        let implicated: Vec<bool> = if validate_all {
            vec![true; diagnostics.len()]
        } else {
            let mut wanted = vec![false; diagnostics.len()];
            for diagnostic in diagnostics.iter() {
                if let Some(source) = diagnostic.duplicate_of {
                    wanted[diagnostic.image_index] = true;
                    wanted[source] = true;
                }
            }
            wanted
        };

        let total = diagnostics.len();
        let completed = AtomicUsize::new(0);
        let analyze = |diagnostic: &mut ImageDiagnostic| {
            let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
            if cancel.is_cancelled() {
                return;
            }
            if diagnostic.skipped_reason.is_none() && implicated[diagnostic.image_index] {
                self.analyze_one(&images[diagnostic.image_index], diagnostic, models);
            }
            progress.send(
                AuditPhase::Analysis,
                (done * 100 / total.max(1)) as u8,
                format!("Analyzed {done} of {total} images"),
            );
        };

        match rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.workers.pool_size())
            .build()
        {
            Ok(pool) => pool.install(|| diagnostics.par_iter_mut().for_each(analyze)),
            Err(e) => {
                log::warn!("dedicated analysis pool unavailable ({e}); using global pool");
                diagnostics.par_iter_mut().for_each(analyze);
            }
        }

        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        Ok(())
    }

    fn analyze_one(
        &self,
        image: &EmbeddedImage,
        diagnostic: &mut ImageDiagnostic,
        models: &ModelService,
    ) {
        let decoded = match image::load_from_memory(&image.data) {
            Ok(d) => d,
            Err(e) => {
                log::warn!("image {} failed to decode for analysis: {e}", image.id);
                diagnostic.skipped_reason = Some("decode failed".to_string());
                return;
            }
        };

        let blur = assess_blur(&decoded, &self.config.blur);
        diagnostic.sharpness = Some(blur.sharpness);
        diagnostic.is_blurry = blur.is_blurry;

        let border = detect_border(&decoded, &self.config.border);
        diagnostic.suspicion = Some(assess_suspicion(
            &image.data,
            decoded.width(),
            decoded.height(),
            &border,
            &self.config.suspicion,
        ));
        diagnostic.border = Some(border);

        if models.capabilities().season {
            diagnostic.season = self.assess_season(&decoded, models);
        }
    }

    /// Season read of one photo: only attempted when the detector confirms
    /// seasonal subject matter (a person or plant), then voted separately
    /// over the clothing and scenery prompt banks and combined.
    fn assess_season(&self, decoded: &DynamicImage, models: &ModelService) -> Option<SeasonResult> {
        let clip = models.clip()?;
        let bank = models.prompt_bank()?;

        if let Some(detector) = models.detector() {
            let subjects = match detector.detect(decoded, 0.4, 16) {
                Ok(detections) => detections
                    .iter()
                    .any(|d| d.label == "person" || d.label == "potted plant"),
                Err(e) => {
                    log::warn!("season subject detection failed: {e}");
                    false
                }
            };
            if !subjects {
                return None;
            }
        }

        let embedding = match clip.embed(decoded) {
            Ok(v) => v,
            Err(e) => {
                log::warn!("season embedding failed: {e}");
                return None;
            }
        };
        let clothing: ChannelCall = season::vote(&embedding, &bank.clothing, &self.config.season);
        let scenery: ChannelCall = season::vote(&embedding, &bank.scenery, &self.config.season);
        Some(season::combine(clothing, scenery, &self.config.season))
    }
}
