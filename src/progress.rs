use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Cooperative cancellation flag, polled at the top of every per-image and
/// per-batch loop. In-flight work finishes; no new work starts.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuditPhase {
    Extraction,
    Hashing,
    Analysis,
    ObjectReuse,
    RegionScan,
    Complete,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditProgress {
    /// 0-100, monotonically non-decreasing across the run.
    pub percent: u8,
    pub message: String,
    pub phase: AuditPhase,
}

/// Progress fan-out. Percentages are clamped so consumers never observe a
/// decrease, regardless of worker completion order.
#[derive(Clone)]
pub struct ProgressSink {
    sender: Option<mpsc::UnboundedSender<AuditProgress>>,
    high_water: Arc<AtomicU8>,
    base: u8,
    span: u8,
}

impl ProgressSink {
    pub fn new(sender: Option<mpsc::UnboundedSender<AuditProgress>>) -> Self {
        Self {
            sender,
            high_water: Arc::new(AtomicU8::new(0)),
            base: 0,
            span: 100,
        }
    }

    pub fn disabled() -> Self {
        Self::new(None)
    }

    /// A view of this sink mapping local 0-100 onto `base..=base + span` of
    /// this sink's own range, so scopes nest. The monotonic high-water mark
    /// is shared with the parent.
    pub fn scoped(&self, base: u8, span: u8) -> Self {
        let abs_base = self.base as u32 + self.span as u32 * base.min(100) as u32 / 100;
        let abs_span = self.span as u32 * span.min(100) as u32 / 100;
        Self {
            sender: self.sender.clone(),
            high_water: self.high_water.clone(),
            base: abs_base.min(100) as u8,
            span: abs_span.min(100) as u8,
        }
    }

    pub fn send(&self, phase: AuditPhase, local_percent: u8, message: impl Into<String>) {
        let Some(sender) = &self.sender else {
            return;
        };
        let mapped = self.base as u32 + (self.span as u32 * local_percent.min(100) as u32) / 100;
        let mapped = mapped.min(100) as u8;
        let previous = self.high_water.fetch_max(mapped, Ordering::Relaxed);
        let percent = mapped.max(previous);
        let _ = sender.send(AuditProgress {
            percent,
            message: message.into(),
            phase,
        });
    }
}
