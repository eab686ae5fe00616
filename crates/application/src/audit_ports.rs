use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;
use vaultline_core::{AppResult, TenantId};
use vaultline_domain::AuditRecord;

/// Logical name of the shared audit queue in the backing store.
///
/// All tenants multiplex onto this single durable list; partitioning by
/// tenant happens at batching time, not at queue time.
pub const AUDIT_QUEUE_NAME: &str = "logs:audit";

/// Port for the durable, ordered audit queue.
///
/// Push appends to one end, drain pops from the other, so the queue is FIFO
/// across its whole lifetime. Concurrency correctness is delegated to the
/// store's atomic single-key list operations; implementations must tolerate
/// pushes arriving while a drain is in progress (such records land in the
/// current or the next cycle, never nowhere).
#[async_trait]
pub trait AuditQueue: Send + Sync {
    /// Appends one record; once this returns `Ok` the record is durable.
    async fn push(&self, queue_name: &str, record: &AuditRecord) -> AppResult<()>;

    /// Appends a batch of records, oldest first, and returns how many were
    /// appended. Implementations should reuse a single store handle for the
    /// whole batch rather than acquiring one per record. If the store fails
    /// mid-batch the records appended so far stay queued and the achieved
    /// count is returned; `Err` means nothing was appended.
    async fn push_many(&self, queue_name: &str, records: &[AuditRecord]) -> AppResult<usize> {
        let mut appended = 0_usize;
        for record in records {
            match self.push(queue_name, record).await {
                Ok(()) => appended += 1,
                Err(error) => {
                    if appended == 0 {
                        return Err(error);
                    }
                    warn!(
                        queue_name,
                        appended,
                        remaining = records.len() - appended,
                        error = %error,
                        "batch push interrupted"
                    );
                    break;
                }
            }
        }

        Ok(appended)
    }

    /// Removes and returns every queued record, oldest-pushed first.
    ///
    /// Entries that fail to deserialize are logged and skipped; a corrupt
    /// entry never blocks draining the remainder.
    async fn drain_all(&self, queue_name: &str) -> AppResult<Vec<AuditRecord>>;

    /// Returns the number of currently queued entries.
    async fn depth(&self, queue_name: &str) -> AppResult<usize>;
}

/// Labels attached to every stream shipped to the ingestion backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamLabels {
    /// Fixed job label identifying this pipeline.
    pub job: String,
    /// Tenant the stream belongs to.
    pub tenant_id: String,
    /// Audit action of the records in this stream.
    pub action: String,
}

/// One labeled stream with its `[nanosecond_timestamp, log_line]` values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamEntry {
    /// Stream labels.
    pub stream: StreamLabels,
    /// Value tuples, each `(timestamp as decimal string, serialized record)`.
    pub values: Vec<(String, String)>,
}

/// JSON document accepted by the ingestion backend's push endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamPush {
    /// The stream sets carried by this push.
    pub streams: Vec<StreamEntry>,
}

/// Outcome of one push to the ingestion backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    /// The backend acknowledged the push (2xx); records are durable there.
    Accepted,
    /// The backend reported its insufficient-replica condition; the batch
    /// may still succeed record by record.
    ReplicasUnavailable,
    /// Any other non-2xx response or a transport-level failure; retryable.
    Rejected {
        /// Status and body context for diagnostics.
        detail: String,
    },
}

/// Port for the multi-tenant log ingestion backend.
#[async_trait]
pub trait LogIngestor: Send + Sync {
    /// Pushes one stream document scoped to `tenant_id`.
    ///
    /// Delivery failures are reported through [`PushOutcome`], not through
    /// `Err`; an `Err` means the request could not even be constructed.
    async fn push(&self, tenant_id: &TenantId, push: &StreamPush) -> AppResult<PushOutcome>;
}
