//! HTTP adapter for the multi-tenant Loki push endpoint.

use async_trait::async_trait;
use vaultline_application::{LogIngestor, PushOutcome, StreamPush};
use vaultline_core::{AppResult, TenantId};

/// Path of Loki's push endpoint, appended to the configured base URL.
const PUSH_PATH: &str = "/loki/api/v1/push";

/// Header Loki uses for backend-side multi-tenant routing.
const TENANT_SCOPE_HEADER: &str = "X-Scope-OrgID";

/// Fixed substring Loki returns when too few ingester replicas are live;
/// triggers the degraded per-record delivery path.
const REPLICA_SHORTAGE_MARKER: &str = "at least 2 live replicas required";

/// Loki implementation of the log ingestion port.
pub struct LokiLogIngestor {
    http_client: reqwest::Client,
    push_url: String,
}

impl LokiLogIngestor {
    /// Creates an ingestor pushing to `base_url` (scheme, host, port).
    #[must_use]
    pub fn new(http_client: reqwest::Client, base_url: &str) -> Self {
        Self {
            http_client,
            push_url: format!("{}{PUSH_PATH}", base_url.trim_end_matches('/')),
        }
    }
}

#[async_trait]
impl LogIngestor for LokiLogIngestor {
    async fn push(&self, tenant_id: &TenantId, push: &StreamPush) -> AppResult<PushOutcome> {
        let response = self
            .http_client
            .post(self.push_url.as_str())
            .header(TENANT_SCOPE_HEADER, tenant_id.as_str())
            .json(push)
            .send()
            .await;

        match response {
            Ok(response) if response.status().is_success() => Ok(PushOutcome::Accepted),
            Ok(response) => {
                let status = response.status().as_u16();
                let body = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "<body unavailable>".to_owned());
                Ok(classify_failure(status, body.as_str()))
            }
            Err(error) => Ok(PushOutcome::Rejected {
                detail: format!("transport error: {error}"),
            }),
        }
    }
}

fn classify_failure(status: u16, body: &str) -> PushOutcome {
    if body.contains(REPLICA_SHORTAGE_MARKER) {
        return PushOutcome::ReplicasUnavailable;
    }

    PushOutcome::Rejected {
        detail: format!("status {status}: {body}"),
    }
}
