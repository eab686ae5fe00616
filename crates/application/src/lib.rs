//! Application services and ports for the Vaultline audit pipeline.

#![forbid(unsafe_code)]

mod audit_ports;
mod audit_recorder;
pub mod log_batcher;
mod offload_service;

pub use audit_ports::{
    AUDIT_QUEUE_NAME, AuditQueue, LogIngestor, PushOutcome, StreamEntry, StreamLabels, StreamPush,
};
pub use audit_recorder::AuditRecorder;
pub use offload_service::{
    OffloadConfig, OffloadReport, OffloadService, TenantOutcome, TenantReport,
};
