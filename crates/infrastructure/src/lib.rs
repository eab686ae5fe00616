//! Infrastructure adapters for the Vaultline application ports.

#![forbid(unsafe_code)]

mod loki_log_ingestor;
mod redis_audit_queue;
mod redis_endpoint_resolver;

pub use loki_log_ingestor::LokiLogIngestor;
pub use redis_audit_queue::RedisAuditQueue;
pub use redis_endpoint_resolver::{
    ResolvedStore, StoreTopologyConfig, WritableEndpoint, WritableEndpointResolver,
};
