//! Domain types for the Vaultline audit pipeline.

#![forbid(unsafe_code)]

mod audit;

pub use audit::{AuditAction, AuditRecord, AuditTimestamp};
