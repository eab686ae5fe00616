use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;
use vaultline_core::{AppResult, TenantId};
use vaultline_domain::AuditRecord;

use crate::audit_ports::{AUDIT_QUEUE_NAME, AuditQueue, LogIngestor, PushOutcome};
use crate::log_batcher;


/// Tuning knobs for the offload worker.
#[derive(Debug, Clone)]
pub struct OffloadConfig {
    /// Logical queue name drained each cycle.
    pub queue_name: String,
    /// Maximum bulk delivery attempts per tenant before re-queueing.
    pub max_attempts: u32,
    /// First backoff delay; doubles after every failed attempt.
    pub backoff_base: Duration,
}

impl Default for OffloadConfig {
    fn default() -> Self {
        Self {
            queue_name: AUDIT_QUEUE_NAME.to_owned(),
            max_attempts: 5,
            backoff_base: Duration::from_secs(1),
        }
    }
}

/// Terminal per-tenant state of one offload cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TenantOutcome {
    /// The whole batch was acknowledged by the ingestion backend.
    Delivered {
        /// Number of records delivered.
        records: usize,
    },
    /// The degraded per-record path delivered a subset; the remainder was
    /// re-queued for the next cycle.
    PartiallyDelivered {
        /// Number of records delivered individually.
        delivered: usize,
        /// Number of records pushed back onto the queue.
        requeued: usize,
    },
    /// Every attempt failed; the whole batch was pushed back onto the queue.
    Failed {
        /// Number of records pushed back onto the queue.
        requeued: usize,
    },
}

/// Per-tenant result line of an [`OffloadReport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantReport {
    /// Tenant the batch belonged to.
    pub tenant_id: TenantId,
    /// Terminal state the batch reached.
    pub outcome: TenantOutcome,
}

/// Observability summary of one offload cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OffloadReport {
    /// Opaque identifier of this cycle.
    pub cycle_id: Uuid,
    /// Records drained from the queue at cycle start.
    pub drained: usize,
    /// Records confirmed delivered across all tenants.
    pub delivered: usize,
    /// Records pushed back onto the queue for a future cycle.
    pub requeued: usize,
    /// Terminal state per tenant, in batch-processing order.
    pub tenants: Vec<TenantReport>,
}

impl OffloadReport {
    fn empty(cycle_id: Uuid) -> Self {
        Self {
            cycle_id,
            drained: 0,
            delivered: 0,
            requeued: 0,
            tenants: Vec::new(),
        }
    }
}

/// Periodic drain-group-deliver worker for the audit queue.
///
/// One cycle: drain the queue, group records by tenant, deliver each
/// tenant's batch with retry/backoff, and re-queue whatever could not be
/// delivered. A record is never discarded on failure; the only observable
/// effect of total backend outage is delayed audit visibility and growing
/// queue depth. At most one cycle runs at a time; a manual trigger that
/// overlaps a scheduled cycle waits for it instead of running concurrently.
pub struct OffloadService {
    queue: Arc<dyn AuditQueue>,
    ingestor: Arc<dyn LogIngestor>,
    config: OffloadConfig,
    cycle_lock: Mutex<()>,
}

impl OffloadService {
    /// Creates an offload service over the queue and ingestion ports.
    #[must_use]
    pub fn new(
        queue: Arc<dyn AuditQueue>,
        ingestor: Arc<dyn LogIngestor>,
        config: OffloadConfig,
    ) -> Self {
        Self {
            queue,
            ingestor,
            config,
            cycle_lock: Mutex::new(()),
        }
    }

    /// Runs one complete offload cycle and returns its report.
    ///
    /// Errors are returned only when the queue cannot be drained at all;
    /// delivery failures are absorbed into per-tenant outcomes so one
    /// tenant's trouble never aborts another's delivery.
    pub async fn run_cycle(&self) -> AppResult<OffloadReport> {
        let _cycle_guard = self.cycle_lock.lock().await;
        let cycle_id = Uuid::new_v4();

        match self.queue.depth(self.config.queue_name.as_str()).await {
            Ok(depth) => {
                info!(cycle_id = %cycle_id, queue_depth = depth, "starting audit offload cycle");
            }
            Err(error) => {
                warn!(cycle_id = %cycle_id, error = %error, "failed to read audit queue depth");
            }
        }

        let records = self.queue.drain_all(self.config.queue_name.as_str()).await?;
        if records.is_empty() {
            info!(cycle_id = %cycle_id, "audit queue empty, nothing to offload");
            return Ok(OffloadReport::empty(cycle_id));
        }

        let drained = records.len();
        let grouped = log_batcher::group_by_tenant(records);

        let mut delivered = 0_usize;
        let mut requeued = 0_usize;
        let mut tenants = Vec::with_capacity(grouped.len());
        for (tenant_id, batch) in grouped {
            let outcome = self.deliver_tenant_batch(&tenant_id, &batch).await;
            match &outcome {
                TenantOutcome::Delivered { records } => delivered += records,
                TenantOutcome::PartiallyDelivered {
                    delivered: sent,
                    requeued: returned,
                } => {
                    delivered += sent;
                    requeued += returned;
                }
                TenantOutcome::Failed { requeued: returned } => requeued += returned,
            }
            tenants.push(TenantReport { tenant_id, outcome });
        }

        info!(
            cycle_id = %cycle_id,
            drained,
            delivered,
            requeued,
            "audit offload cycle finished"
        );

        Ok(OffloadReport {
            cycle_id,
            drained,
            delivered,
            requeued,
            tenants,
        })
    }

    /// Runs cycles on a fixed schedule: one immediately, then one every
    /// `period`. A failed cycle is logged and the schedule keeps going.
    pub async fn run_scheduled(&self, period: Duration) {
        loop {
            if let Err(error) = self.run_cycle().await {
                warn!(error = %error, "audit offload cycle failed");
            }
            tokio::time::sleep(period).await;
        }
    }

    async fn deliver_tenant_batch(
        &self,
        tenant_id: &TenantId,
        batch: &[AuditRecord],
    ) -> TenantOutcome {
        let push = match log_batcher::build_stream_push(batch, Utc::now()) {
            Ok(push) => push,
            Err(error) => {
                warn!(tenant_id = %tenant_id, error = %error, "failed to render tenant batch");
                let requeued = self.requeue(batch).await;
                return TenantOutcome::Failed { requeued };
            }
        };

        for attempt in 1..=self.config.max_attempts {
            match self.ingestor.push(tenant_id, &push).await {
                Ok(PushOutcome::Accepted) => {
                    info!(
                        tenant_id = %tenant_id,
                        records = batch.len(),
                        attempt,
                        "delivered tenant batch"
                    );
                    return TenantOutcome::Delivered {
                        records: batch.len(),
                    };
                }
                Ok(PushOutcome::ReplicasUnavailable) => {
                    warn!(
                        tenant_id = %tenant_id,
                        attempt,
                        "replica shortage reported, switching to per-record delivery"
                    );
                    let (sent, failed) = self.deliver_individually(tenant_id, batch).await;
                    if sent > 0 {
                        // Policy choice: the undelivered remainder waits for
                        // the next cycle rather than re-entering this one.
                        let requeued = self.requeue(&failed).await;
                        info!(
                            tenant_id = %tenant_id,
                            delivered = sent,
                            requeued,
                            "tenant batch delivered partially"
                        );
                        return TenantOutcome::PartiallyDelivered {
                            delivered: sent,
                            requeued,
                        };
                    }
                    warn!(
                        tenant_id = %tenant_id,
                        attempt,
                        "per-record delivery sent nothing, retrying bulk"
                    );
                }
                Ok(PushOutcome::Rejected { detail }) => {
                    warn!(
                        tenant_id = %tenant_id,
                        attempt,
                        max_attempts = self.config.max_attempts,
                        detail,
                        "tenant batch delivery attempt failed"
                    );
                }
                Err(error) => {
                    warn!(
                        tenant_id = %tenant_id,
                        attempt,
                        max_attempts = self.config.max_attempts,
                        error = %error,
                        "tenant batch delivery attempt failed"
                    );
                }
            }

            let factor = 2_u32.saturating_pow(attempt.saturating_sub(1));
            tokio::time::sleep(self.config.backoff_base.saturating_mul(factor)).await;
        }

        warn!(
            tenant_id = %tenant_id,
            attempts = self.config.max_attempts,
            "exhausted delivery attempts, re-queueing tenant batch"
        );
        let requeued = self.requeue(batch).await;
        TenantOutcome::Failed { requeued }
    }

    /// Degraded mode for the backend's replica-shortage condition: each
    /// record is sent as its own single-entry push.
    async fn deliver_individually(
        &self,
        tenant_id: &TenantId,
        batch: &[AuditRecord],
    ) -> (usize, Vec<AuditRecord>) {
        let mut sent = 0_usize;
        let mut failed = Vec::new();

        for record in batch {
            let push = match log_batcher::build_single_record_push(record, Utc::now()) {
                Ok(push) => push,
                Err(error) => {
                    warn!(tenant_id = %tenant_id, error = %error, "failed to render single record");
                    failed.push(record.clone());
                    continue;
                }
            };

            match self.ingestor.push(tenant_id, &push).await {
                Ok(PushOutcome::Accepted) => sent += 1,
                Ok(PushOutcome::ReplicasUnavailable | PushOutcome::Rejected { .. }) | Err(_) => {
                    failed.push(record.clone());
                }
            }
        }

        (sent, failed)
    }

    /// Pushes undeliverable records back onto the queue as one batch,
    /// oldest first, so the next cycle drains them in their original order.
    async fn requeue(&self, records: &[AuditRecord]) -> usize {
        match self
            .queue
            .push_many(self.config.queue_name.as_str(), records)
            .await
        {
            Ok(requeued) => {
                if requeued < records.len() {
                    error!(
                        requeued,
                        lost = records.len() - requeued,
                        "re-queue of undelivered audit records stopped short"
                    );
                }
                requeued
            }
            Err(error) => {
                error!(
                    records = records.len(),
                    error = %error,
                    "failed to re-queue undelivered audit records"
                );
                0
            }
        }
    }
}
