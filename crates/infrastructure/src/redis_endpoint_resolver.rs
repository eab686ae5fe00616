//! Probes candidate Redis endpoints for one that currently accepts writes.
//!
//! The store runs with a primary/replica topology where the primary can
//! move at runtime, so resolved handles are never cached across operations;
//! callers re-resolve whenever they need the store.

use std::future::Future;
use std::time::Duration;

use redis::AsyncCommands;
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use redis::{ConnectionAddr, IntoConnectionInfo, RedisConnectionInfo};
use tracing::{debug, warn};
use uuid::Uuid;
use vaultline_core::{AppError, AppResult};

/// Seconds the canary key may linger if the delete after a canary write is
/// lost; keeps a crashed probe from leaving permanent garbage.
const CANARY_TTL_SECONDS: u64 = 5;

/// Connection attempts against the load-balanced fallback alias.
const FALLBACK_RETRIES: usize = 3;

/// Store endpoint locations, in probe-priority order.
#[derive(Debug, Clone)]
pub struct StoreTopologyConfig {
    /// Explicit candidate host names, primary-by-convention first.
    pub candidate_hosts: Vec<String>,
    /// Load-balanced service alias used when every candidate fails.
    pub fallback_host: String,
    /// Store port shared by all endpoints.
    pub port: u16,
    /// Logical database index.
    pub database: i64,
}

/// A resolved (host, port, logical-db-index) triple confirmed writable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WritableEndpoint {
    /// Host the handle is bound to.
    pub host: String,
    /// Port the handle is bound to.
    pub port: u16,
    /// Logical database index.
    pub database: i64,
}

/// A live store handle together with the endpoint it is bound to.
pub struct ResolvedStore {
    /// Managed connection to the resolved endpoint.
    pub connection: ConnectionManager,
    /// The endpoint the connection is bound to.
    pub endpoint: WritableEndpoint,
}

/// Finds a store endpoint that currently accepts writes.
pub struct WritableEndpointResolver {
    config: StoreTopologyConfig,
    connect_timeout: Duration,
}

impl WritableEndpointResolver {
    /// Creates a resolver with the default 2 s per-candidate timeout.
    #[must_use]
    pub fn new(config: StoreTopologyConfig) -> Self {
        Self {
            config,
            connect_timeout: Duration::from_secs(2),
        }
    }

    /// Resolves a writable endpoint.
    ///
    /// Candidates are probed in priority order with a canary write; the
    /// first writable one wins and the rest are not probed. When every
    /// candidate fails, a retrying connection to the fallback alias is
    /// returned without a canary check, since the alias targets a
    /// load-balanced entry point. If even the fallback cannot be
    /// constructed this surfaces [`AppError::Unavailable`]; the caller
    /// decides whether to abort or retry.
    pub async fn resolve(&self) -> AppResult<ResolvedStore> {
        let selected = select_candidate(&self.config.candidate_hosts, |host| async move {
            self.probe(host.as_str()).await
        })
        .await;

        if let Some((host, connection)) = selected {
            debug!(host = host.as_str(), port = self.config.port, "resolved writable store endpoint");
            return Ok(ResolvedStore {
                connection,
                endpoint: self.endpoint_for(host),
            });
        }

        let fallback = self.config.fallback_host.clone();
        warn!(
            host = fallback.as_str(),
            "no store candidate accepted writes, falling back to service alias"
        );
        let connection = self
            .connect(fallback.as_str(), FALLBACK_RETRIES)
            .await
            .map_err(|error| {
                AppError::Unavailable(format!("no writable store endpoint available: {error}"))
            })?;

        Ok(ResolvedStore {
            connection,
            endpoint: self.endpoint_for(fallback),
        })
    }

    /// Connects to one candidate and performs a canary write: a uniquely
    /// named marker key with a short expiry, deleted immediately. Read-only
    /// rejection and connect failure are equivalent try-the-next signals.
    async fn probe(&self, host: &str) -> AppResult<ConnectionManager> {
        let mut connection = self.connect(host, 0).await?;

        let canary_key = format!("write_probe:{}", Uuid::new_v4());
        connection
            .set_ex::<_, _, ()>(canary_key.as_str(), "1", CANARY_TTL_SECONDS)
            .await
            .map_err(|error| {
                AppError::Unavailable(format!("canary write rejected by {host}: {error}"))
            })?;
        connection
            .del::<_, ()>(canary_key.as_str())
            .await
            .map_err(|error| {
                AppError::Unavailable(format!("canary delete rejected by {host}: {error}"))
            })?;

        Ok(connection)
    }

    async fn connect(&self, host: &str, retries: usize) -> AppResult<ConnectionManager> {
        let client = ConnectionAddr::Tcp(host.to_owned(), self.config.port)
            .into_connection_info()
            .map(|info| {
                info.set_redis_settings(RedisConnectionInfo::default().set_db(self.config.database))
            })
            .and_then(redis::Client::open)
            .map_err(|error| {
                AppError::Validation(format!("invalid store endpoint '{host}': {error}"))
            })?;

        let manager_config = ConnectionManagerConfig::new()
            .set_connection_timeout(Some(self.connect_timeout))
            .set_response_timeout(Some(self.connect_timeout))
            .set_number_of_retries(retries);

        ConnectionManager::new_with_config(client, manager_config)
            .await
            .map_err(|error| {
                AppError::Unavailable(format!("failed to connect to store at {host}: {error}"))
            })
    }

    fn endpoint_for(&self, host: String) -> WritableEndpoint {
        WritableEndpoint {
            host,
            port: self.config.port,
            database: self.config.database,
        }
    }
}

/// Returns the first candidate whose probe succeeds, stopping immediately;
/// later candidates are never probed once one accepts writes.
async fn select_candidate<C, F, Fut>(candidates: &[String], mut probe: F) -> Option<(String, C)>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = AppResult<C>>,
{
    for host in candidates {
        match probe(host.clone()).await {
            Ok(connection) => return Some((host.clone(), connection)),
            Err(error) => {
                warn!(
                    host = host.as_str(),
                    error = %error,
                    "store candidate not writable, trying next"
                );
            }
        }
    }

    None
}
