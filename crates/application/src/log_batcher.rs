//! Groups drained audit records by tenant and renders them into the
//! ingestion backend's stream-push document shape.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use vaultline_core::{AppError, AppResult, TenantId};
use vaultline_domain::AuditRecord;

use crate::audit_ports::{StreamEntry, StreamLabels, StreamPush};

/// Fixed job label attached to every audit stream.
pub const AUDIT_JOB_LABEL: &str = "audit_logs";

/// Partitions records by tenant, preserving each tenant's relative order
/// from the input sequence. Only tenants present in the input appear in the
/// result, so no tenant ever maps to an empty batch.
#[must_use]
pub fn group_by_tenant(records: Vec<AuditRecord>) -> BTreeMap<TenantId, Vec<AuditRecord>> {
    let mut grouped: BTreeMap<TenantId, Vec<AuditRecord>> = BTreeMap::new();
    for record in records {
        grouped
            .entry(record.tenant_id.clone())
            .or_default()
            .push(record);
    }

    grouped
}

/// Renders one tenant's records into a stream-push document, one stream
/// entry per record.
///
/// Timestamps are normalized to integer nanoseconds; a textual timestamp
/// that fails to parse is substituted with `fallback` rather than failing
/// the batch.
pub fn build_stream_push(
    records: &[AuditRecord],
    fallback: DateTime<Utc>,
) -> AppResult<StreamPush> {
    let mut streams = Vec::with_capacity(records.len());
    for record in records {
        streams.push(build_stream_entry(record, fallback)?);
    }

    Ok(StreamPush { streams })
}

/// Renders a single record into a one-entry stream-push document, used by
/// the degraded per-record delivery path.
pub fn build_single_record_push(
    record: &AuditRecord,
    fallback: DateTime<Utc>,
) -> AppResult<StreamPush> {
    Ok(StreamPush {
        streams: vec![build_stream_entry(record, fallback)?],
    })
}

fn build_stream_entry(record: &AuditRecord, fallback: DateTime<Utc>) -> AppResult<StreamEntry> {
    let line = serde_json::to_string(record).map_err(|error| {
        AppError::Internal(format!("failed to serialize audit record: {error}"))
    })?;

    Ok(StreamEntry {
        stream: StreamLabels {
            job: AUDIT_JOB_LABEL.to_owned(),
            tenant_id: record.tenant_id.as_str().to_owned(),
            action: record.action.as_str().to_owned(),
        },
        values: vec![(record.timestamp.to_nanos(fallback).to_string(), line)],
    })
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use serde_json::{Map, json};
    use vaultline_core::TenantId;
    use vaultline_domain::{AuditAction, AuditRecord, AuditTimestamp};

    use super::{AUDIT_JOB_LABEL, build_stream_push, group_by_tenant};
    use crate::audit_ports::StreamPush;

    fn tenant(name: &str) -> TenantId {
        match TenantId::new(name) {
            Ok(tenant_id) => tenant_id,
            Err(error) => panic!("tenant id '{name}' should be valid: {error}"),
        }
    }

    fn record(tenant_name: &str, action: AuditAction, nanos: i64) -> AuditRecord {
        AuditRecord {
            timestamp: AuditTimestamp::Nanos(nanos),
            action,
            tenant_id: tenant(tenant_name),
            attributes: Map::new(),
        }
    }

    fn fallback_instant() -> chrono::DateTime<Utc> {
        match Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0) {
            chrono::LocalResult::Single(instant) => instant,
            other => panic!("fallback instant should be unambiguous, got {other:?}"),
        }
    }

    fn rendered(records: &[AuditRecord]) -> StreamPush {
        match build_stream_push(records, fallback_instant()) {
            Ok(push) => push,
            Err(error) => panic!("records should render: {error}"),
        }
    }

    #[test]
    fn grouping_preserves_per_tenant_order() {
        let records = vec![
            record("acme", AuditAction::CreateKey, 1),
            record("globex", AuditAction::GetKey, 2),
            record("acme", AuditAction::DeleteKey, 3),
            record("unknown", AuditAction::LoginFailed, 4),
            record("acme", AuditAction::GetKey, 5),
        ];

        let grouped = group_by_tenant(records);
        assert_eq!(grouped.len(), 3);

        let acme = &grouped[&tenant("acme")];
        let nanos: Vec<i64> = acme
            .iter()
            .map(|record| record.timestamp.to_nanos(Utc::now()))
            .collect();
        assert_eq!(nanos, vec![1, 3, 5]);

        let unknown = &grouped[&TenantId::unknown()];
        assert_eq!(unknown.len(), 1);
    }

    #[test]
    fn stream_push_carries_labels_and_values() {
        let records = vec![
            record("acme", AuditAction::CreateKey, 11),
            record("acme", AuditAction::DeleteKey, 22),
        ];

        let push = rendered(&records);
        assert_eq!(push.streams.len(), 2);

        let first = &push.streams[0];
        assert_eq!(first.stream.job, AUDIT_JOB_LABEL);
        assert_eq!(first.stream.tenant_id, "acme");
        assert_eq!(first.stream.action, "create_key");
        assert_eq!(first.values.len(), 1);
        assert_eq!(first.values[0].0, "11");

        let line: serde_json::Value = match serde_json::from_str(&first.values[0].1) {
            Ok(line) => line,
            Err(error) => panic!("stream value should hold a json line: {error}"),
        };
        assert_eq!(line["action"], json!("create_key"));
        assert_eq!(line["tenant_id"], json!("acme"));
    }

    #[test]
    fn unparseable_timestamp_substitutes_fallback() {
        let fallback = fallback_instant();
        let records = vec![AuditRecord {
            timestamp: AuditTimestamp::Text("garbage".to_owned()),
            action: AuditAction::GetKey,
            tenant_id: tenant("acme"),
            attributes: Map::new(),
        }];

        let push = rendered(&records);
        assert_eq!(
            push.streams[0].values[0].0,
            fallback
                .timestamp_nanos_opt()
                .unwrap_or(i64::MAX)
                .to_string()
        );
    }

    #[test]
    fn push_document_serializes_to_backend_shape() {
        let records = vec![record("acme", AuditAction::LoginSuccess, 7)];

        let push = rendered(&records);
        let value = match serde_json::to_value(&push) {
            Ok(value) => value,
            Err(error) => panic!("push document should serialize: {error}"),
        };
        let entry = &value["streams"][0];
        assert_eq!(entry["stream"]["job"], json!("audit_logs"));
        assert!(entry["values"][0].is_array());
        assert_eq!(entry["values"][0][0], json!("7"));
    }
}
