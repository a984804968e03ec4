//! Forensic auditing of photos embedded in OOXML spreadsheet containers.
//!
//! The crate streams embedded images out of a (possibly multi-gigabyte)
//! workbook without loading the archive into memory, fingerprints every photo
//! with a block-mean perceptual hash, runs per-photo diagnostics (blur,
//! border, suspicion score, season plausibility) on a bounded worker pool,
//! and detects staged-prop reuse across photos with object detection plus
//! embedding similarity. The row-level rule engine and any UI live outside
//! this crate; they share only the progress/cancellation contract exposed
//! here.

pub mod config;
pub mod core;
pub mod models;
pub mod progress;
pub mod services;

pub use crate::config::AuditConfig;
pub use crate::core::container::{EmbeddedImage, ExtractError, ExtractionOutcome, ExtractorService};
pub use crate::core::phash::{block_mean_hash, hamming_hex, HashIndex};
pub use crate::core::season::Season;
pub use crate::core::suspicion::SuspicionBand;
pub use crate::models::{Capabilities, ModelService};
pub use crate::progress::{AuditPhase, AuditProgress, CancelToken, ProgressSink};
pub use crate::services::audit::{AuditError, AuditOutcome, AuditReport, AuditRequest, AuditService};
pub use crate::services::pipeline::ImageDiagnostic;
pub use crate::services::regions::{RegionGrouping, RegionMatch};
pub use crate::services::reuse::DuplicateMatch;
