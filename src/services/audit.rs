//! Top-level audit facade: extraction, diagnostics, and the model-backed
//! duplicate engines behind one call with a single progress stream and
//! cooperative cancellation.

use crate::config::AuditConfig;
use crate::core::container::{ExtractError, ExtractorService};
use crate::models::{Capabilities, ModelService};
use crate::progress::{AuditPhase, CancelToken, ProgressSink};
use crate::services::pipeline::{DiagnosticPipeline, ImageDiagnostic, PipelineError};
use crate::services::regions::{RegionError, RegionFilter, RegionGrouping, RegionMatch};
use crate::services::reuse::{DuplicateMatch, ReuseEngine, ReuseError};
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct AuditRequest {
    pub source: PathBuf,
    /// Restrict extraction to one worksheet by name.
    pub worksheet: Option<String>,
    /// When false, quality analyses only run on images implicated by the
    /// duplicate hash pass.
    pub validate_all_images: bool,
    /// Gate on the model-backed analyses, independent of what is loaded.
    pub enable_models: bool,
    pub grouping: RegionGrouping,
}

impl AuditRequest {
    pub fn new(source: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            worksheet: None,
            validate_all_images: true,
            enable_models: true,
            grouping: RegionGrouping::default(),
        }
    }
}

/// Only a failure to open or stream the container itself is fatal; every
/// scoped failure degrades inside the report instead.
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("extraction failed: {0}")]
    Extract(#[from] ExtractError),
}

/// Positional metadata for one embedded image reference, without pixels.
#[derive(Debug, Clone, Serialize)]
pub struct ImageRecord {
    pub id: String,
    pub image_id: String,
    pub sheet: String,
    pub row: u32,
    pub column: u32,
    pub content_hash: String,
}

#[derive(Debug, Serialize)]
pub struct AuditReport {
    pub images: Vec<ImageRecord>,
    pub diagnostics: Vec<ImageDiagnostic>,
    pub object_matches: Vec<DuplicateMatch>,
    pub region_matches: Vec<RegionMatch>,
    pub capabilities: Capabilities,
    pub notes: Vec<String>,
}

#[derive(Debug)]
pub enum AuditOutcome {
    Completed(Box<AuditReport>),
    Cancelled,
}

pub struct AuditService {
    extractor: ExtractorService,
    pipeline: DiagnosticPipeline,
    reuse: ReuseEngine,
    regions: RegionFilter,
}

impl AuditService {
    pub fn new(config: AuditConfig) -> Self {
        Self {
            extractor: ExtractorService::new(),
            reuse: ReuseEngine::new(config.reuse.clone()),
            regions: RegionFilter::new(config.regions.clone()),
            pipeline: DiagnosticPipeline::new(config),
        }
    }

    pub fn run(
        &self,
        request: &AuditRequest,
        models: &ModelService,
        cancel: &CancelToken,
        progress: &ProgressSink,
    ) -> Result<AuditOutcome, AuditError> {
        let disabled;
        let models = if request.enable_models {
            models
        } else {
            disabled = ModelService::disabled();
            &disabled
        };
        let capabilities = models.capabilities();

        let extraction = match self.extractor.extract(
            &request.source,
            request.worksheet.as_deref(),
            cancel,
            &progress.scoped(0, 20),
        ) {
            Ok(outcome) => outcome,
            Err(ExtractError::Cancelled) => return Ok(AuditOutcome::Cancelled),
            Err(e) => return Err(e.into()),
        };

        let mut notes = extraction.notes.clone();
        if !extraction.format_supported {
            progress.send(AuditPhase::Complete, 100, "Audit finished");
            return Ok(AuditOutcome::Completed(Box::new(AuditReport {
                images: Vec::new(),
                diagnostics: Vec::new(),
                object_matches: Vec::new(),
                region_matches: Vec::new(),
                capabilities,
                notes,
            })));
        }

        let diagnostics = match self.pipeline.run(
            &extraction.images,
            models,
            request.validate_all_images,
            cancel,
            &progress.scoped(20, 55),
        ) {
            Ok(d) => d,
            Err(PipelineError::Cancelled) => return Ok(AuditOutcome::Cancelled),
        };

        let object_matches = if capabilities.detection && capabilities.clip_embedding {
            match self.reuse.run(
                &extraction.images,
                &diagnostics,
                models,
                cancel,
                &progress.scoped(75, 15),
            ) {
                Ok(m) => m,
                Err(ReuseError::Cancelled) => return Ok(AuditOutcome::Cancelled),
            }
        } else {
            notes.push("object reuse skipped: required models unavailable".to_string());
            Vec::new()
        };

        let region_matches = if capabilities.clip_embedding {
            match self.regions.run(
                &extraction.images,
                &diagnostics,
                request.grouping,
                models,
                cancel,
                &progress.scoped(90, 8),
            ) {
                Ok(m) => m,
                Err(RegionError::Cancelled) => return Ok(AuditOutcome::Cancelled),
            }
        } else {
            notes.push("region scan skipped: required models unavailable".to_string());
            Vec::new()
        };

        let images = extraction
            .images
            .iter()
            .map(|image| ImageRecord {
                id: image.id.clone(),
                image_id: image.image_id.clone(),
                sheet: image.sheet.clone(),
                row: image.row,
                column: image.column,
                content_hash: image.content_hash.clone(),
            })
            .collect();

        progress.send(AuditPhase::Complete, 100, "Audit finished");
        Ok(AuditOutcome::Completed(Box::new(AuditReport {
            images,
            diagnostics,
            object_matches,
            region_matches,
            capabilities,
            notes,
        })))
    }
}
