//! Shared primitives for all Rust crates in Vaultline.

#![forbid(unsafe_code)]

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type used across Vaultline crates.
pub type AppResult<T> = Result<T, AppError>;

/// Sentinel tenant value for events whose tenant attribution is not yet
/// known, e.g. a failed login before identity resolution.
pub const UNKNOWN_TENANT: &str = "unknown";

/// Tenant identifier used as the partition key for every audit stream.
///
/// Tenant ids arrive from external callers as opaque strings; the only
/// structural requirement is that they are non-empty. The `"unknown"`
/// sentinel is a valid tenant id and is batched and delivered like any
/// other tenant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(String);

impl TenantId {
    /// Creates a validated tenant identifier.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(AppError::Validation(
                "tenant id must not be empty or whitespace".to_owned(),
            ));
        }

        Ok(Self(value))
    }

    /// Returns the sentinel tenant for events without tenant attribution.
    #[must_use]
    pub fn unknown() -> Self {
        Self(UNKNOWN_TENANT.to_owned())
    }

    /// Returns the underlying string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Display for TenantId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

impl From<TenantId> for String {
    fn from(value: TenantId) -> Self {
        value.0
    }
}

/// Common application error categories.
#[derive(Debug, Error)]
pub enum AppError {
    /// Invalid input or violated invariant.
    #[error("validation error: {0}")]
    Validation(String),

    /// Requested resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Write operation conflicts with existing state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A required collaborator (store or ingestion backend) cannot be reached.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// Internal unexpected error.
    #[error("internal error: {0}")]
    Internal(String),
}
