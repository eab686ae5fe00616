use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::{Map, Value};
use tracing::warn;
use vaultline_core::TenantId;
use vaultline_domain::{AuditAction, AuditRecord};

use crate::audit_ports::{AUDIT_QUEUE_NAME, AuditQueue};

/// Producer-facing audit interface used by every mutation and login handler.
///
/// Recording is best-effort from the caller's perspective: a failed queue
/// push is logged and counted but never propagated, so the triggering
/// business operation still completes. Durability starts once a push has
/// succeeded; from there it is the queue's and the offload worker's job.
pub struct AuditRecorder {
    queue: Arc<dyn AuditQueue>,
    queue_name: String,
    failed_pushes: AtomicU64,
}

impl AuditRecorder {
    /// Creates a recorder targeting the shared audit queue.
    #[must_use]
    pub fn new(queue: Arc<dyn AuditQueue>) -> Self {
        Self {
            queue,
            queue_name: AUDIT_QUEUE_NAME.to_owned(),
            failed_pushes: AtomicU64::new(0),
        }
    }

    /// Records one audit event stamped with the current wall-clock time.
    pub async fn record(
        &self,
        action: AuditAction,
        tenant_id: TenantId,
        attributes: Map<String, Value>,
    ) {
        let record = AuditRecord::new(action, tenant_id, attributes);

        if let Err(error) = self.queue.push(self.queue_name.as_str(), &record).await {
            self.failed_pushes.fetch_add(1, Ordering::Relaxed);
            warn!(
                action = record.action.as_str(),
                tenant_id = %record.tenant_id,
                error = %error,
                "failed to queue audit record"
            );
        }
    }

    /// Number of records that could not be queued since startup.
    #[must_use]
    pub fn failed_pushes(&self) -> u64 {
        self.failed_pushes.load(Ordering::Relaxed)
    }
}
