//! Redis-backed implementation of the durable audit queue.

use std::sync::Arc;

use async_trait::async_trait;
use redis::AsyncCommands;
use tracing::{error, warn};
use vaultline_application::AuditQueue;
use vaultline_core::{AppError, AppResult};
use vaultline_domain::AuditRecord;

use crate::redis_endpoint_resolver::WritableEndpointResolver;

/// Audit queue stored as a single Redis list per logical queue name.
///
/// `push` is `LPUSH`, `drain_all` is `RPOP` until empty, which together
/// make the list FIFO across its lifetime. Because the primary can move,
/// every operation resolves a writable endpoint fresh instead of holding a
/// long-lived handle.
pub struct RedisAuditQueue {
    resolver: Arc<WritableEndpointResolver>,
}

impl RedisAuditQueue {
    /// Creates a queue adapter over the endpoint resolver.
    #[must_use]
    pub fn new(resolver: Arc<WritableEndpointResolver>) -> Self {
        Self { resolver }
    }
}

#[async_trait]
impl AuditQueue for RedisAuditQueue {
    async fn push(&self, queue_name: &str, record: &AuditRecord) -> AppResult<()> {
        let line = serde_json::to_string(record).map_err(|error| {
            AppError::Internal(format!("failed to serialize audit record: {error}"))
        })?;

        let mut store = self.resolver.resolve().await?;
        store
            .connection
            .lpush::<_, _, ()>(queue_name, line)
            .await
            .map_err(|error| {
                AppError::Unavailable(format!(
                    "failed to push audit record onto '{queue_name}': {error}"
                ))
            })?;

        Ok(())
    }

    async fn push_many(&self, queue_name: &str, records: &[AuditRecord]) -> AppResult<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        // One resolved endpoint serves the whole batch so requeueing N
        // records costs one canary probe instead of N.
        let mut store = self.resolver.resolve().await?;

        let mut appended = 0_usize;
        for record in records {
            let line = match serde_json::to_string(record) {
                Ok(line) => line,
                Err(error) => {
                    error!(
                        queue_name,
                        error = %error,
                        "dropping unserializable audit record from batch push"
                    );
                    continue;
                }
            };

            match store.connection.lpush::<_, _, ()>(queue_name, line).await {
                Ok(()) => appended += 1,
                Err(error) => {
                    if appended == 0 {
                        return Err(AppError::Unavailable(format!(
                            "failed to push audit batch onto '{queue_name}': {error}"
                        )));
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

    async fn drain_all(&self, queue_name: &str) -> AppResult<Vec<AuditRecord>> {
        let mut store = self.resolver.resolve().await?;

        let mut lines = Vec::new();
        loop {
            let entry: Option<String> =
                match store.connection.rpop(queue_name, None).await {
                    Ok(entry) => entry,
                    Err(error) => {
                        if lines.is_empty() {
                            return Err(AppError::Unavailable(format!(
                                "failed to drain '{queue_name}': {error}"
                            )));
                        }
                        // Entries popped so far are only in memory now;
                        // deliver them rather than abandoning the cycle.
                        warn!(
                            queue_name,
                            drained = lines.len(),
                            error = %error,
                            "drain interrupted, delivering entries drained so far"
                        );
                        break;
                    }
                };

            match entry {
                Some(line) => lines.push(line),
                None => break,
            }
        }

        Ok(parse_entries(queue_name, lines))
    }

    async fn depth(&self, queue_name: &str) -> AppResult<usize> {
        let mut store = self.resolver.resolve().await?;
        store
            .connection
            .llen::<_, usize>(queue_name)
            .await
            .map_err(|error| {
                AppError::Unavailable(format!(
                    "failed to read depth of '{queue_name}': {error}"
                ))
            })
    }
}

/// Deserializes drained entries, oldest first. An unparseable entry is
/// logged and skipped; it never blocks the remainder of the drain.
fn parse_entries(queue_name: &str, lines: Vec<String>) -> Vec<AuditRecord> {
    let mut records = Vec::with_capacity(lines.len());
    for line in lines {
        match serde_json::from_str::<AuditRecord>(&line) {
            Ok(record) => records.push(record),
            Err(error) => {
                warn!(
                    queue_name,
                    entry = line.as_str(),
                    error = %error,
                    "skipping unparseable audit queue entry"
                );
            }
        }
    }

    records
}
