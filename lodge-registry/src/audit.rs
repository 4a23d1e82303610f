//! Fire-and-forget audit trail.
//!
//! Recording is best effort: a failing sink is logged and ignored, and never
//! aborts the operation that produced the event.

use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

pub const EVENT_REGISTRY_LOADED: &str = "registry.loaded";
pub const EVENT_REGISTRY_SAVED: &str = "registry.saved";
pub const EVENT_DOWNGRADED_READ: &str = "registry.downgraded_read";
pub const EVENT_PLAINTEXT_SAVED: &str = "registry.plaintext_saved";
pub const EVENT_KEYS_ROTATED: &str = "keys.rotated";
pub const EVENT_ENVELOPE_SAVED: &str = "keys.envelope_saved";

#[derive(Debug, Error)]
#[error("audit sink failed: {0}")]
pub struct AuditError(pub String);

pub trait AuditSink: Send + Sync {
    fn record(&self, event: &str, metadata: Value) -> Result<(), AuditError>;
}

/// Writes audit events to the `lodge::audit` tracing target.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: &str, metadata: Value) -> Result<(), AuditError> {
        info!(target: "lodge::audit", event, %metadata, "audit");
        Ok(())
    }
}

/// Records `event`, swallowing any sink failure.
pub fn emit(sink: &Arc<dyn AuditSink>, event: &str, metadata: Value) {
    if let Err(e) = sink.record(event, metadata) {
        warn!("dropping audit event {event}: {e}");
    }
}
