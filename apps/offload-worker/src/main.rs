//! Vaultline audit offload worker runtime.

#![forbid(unsafe_code)]

use std::env;
use std::sync::Arc;
use std::time::Duration;

use vaultline_application::{OffloadConfig, OffloadService};
use vaultline_core::{AppError, AppResult};
use vaultline_infrastructure::{
    LokiLogIngestor, RedisAuditQueue, StoreTopologyConfig, WritableEndpointResolver,
};

use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone)]
struct WorkerConfig {
    run_once: bool,
    store_candidates: Vec<String>,
    store_fallback_host: String,
    store_port: u16,
    store_logs_db: i64,
    loki_base_url: String,
    offload_interval_secs: u64,
    http_timeout_secs: u64,
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = WorkerConfig::load()?;
    let service = build_offload_service(&config)?;

    info!(
        store_candidates = config.store_candidates.join(",").as_str(),
        store_fallback = config.store_fallback_host.as_str(),
        store_port = config.store_port,
        loki_base_url = config.loki_base_url.as_str(),
        offload_interval_secs = config.offload_interval_secs,
        "vaultline-offload-worker started"
    );

    if config.run_once {
        let report = service.run_cycle().await?;
        info!(
            cycle_id = %report.cycle_id,
            drained = report.drained,
            delivered = report.delivered,
            requeued = report.requeued,
            "manual offload cycle complete"
        );
        println!("{}", report.cycle_id);
        return Ok(());
    }

    service
        .run_scheduled(Duration::from_secs(config.offload_interval_secs))
        .await;
    Ok(())
}

fn build_offload_service(config: &WorkerConfig) -> AppResult<OffloadService> {
    let resolver = Arc::new(WritableEndpointResolver::new(StoreTopologyConfig {
        candidate_hosts: config.store_candidates.clone(),
        fallback_host: config.store_fallback_host.clone(),
        port: config.store_port,
        database: config.store_logs_db,
    }));
    let queue = Arc::new(RedisAuditQueue::new(resolver));

    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.http_timeout_secs))
        .build()
        .map_err(|error| AppError::Internal(format!("failed to build HTTP client: {error}")))?;
    let ingestor = Arc::new(LokiLogIngestor::new(
        http_client,
        config.loki_base_url.as_str(),
    ));

    Ok(OffloadService::new(queue, ingestor, OffloadConfig::default()))
}

impl WorkerConfig {
    fn load() -> AppResult<Self> {
        let run_once = env::args().nth(1).as_deref() == Some("once");

        let store_candidates: Vec<String> = env::var("REDIS_NODES")
            .unwrap_or_else(|_| {
                "redis-0.redis-headless,redis-1.redis-headless,redis-2.redis-headless".to_owned()
            })
            .split(',')
            .map(|host| host.trim().to_owned())
            .filter(|host| !host.is_empty())
            .collect();
        if store_candidates.is_empty() {
            return Err(AppError::Validation(
                "REDIS_NODES must name at least one candidate host".to_owned(),
            ));
        }

        let store_fallback_host = env::var("REDIS_HOST").unwrap_or_else(|_| "redis".to_owned());
        let store_port = parse_env_u16("REDIS_PORT", 6379)?;
        let store_logs_db = parse_env_i64("REDIS_LOGS_DB", 1)?;

        let loki_host = env::var("LOKI_HOST").unwrap_or_else(|_| "loki-gateway".to_owned());
        let loki_port = parse_env_u16("LOKI_PORT", 80)?;
        let loki_base_url = format!("http://{loki_host}:{loki_port}");

        let offload_interval_secs = parse_env_u64("OFFLOAD_INTERVAL_SECS", 60)?;
        if offload_interval_secs == 0 {
            return Err(AppError::Validation(
                "OFFLOAD_INTERVAL_SECS must be greater than zero".to_owned(),
            ));
        }

        let http_timeout_secs = parse_env_u64("LOKI_HTTP_TIMEOUT_SECS", 10)?;
        if http_timeout_secs == 0 {
            return Err(AppError::Validation(
                "LOKI_HTTP_TIMEOUT_SECS must be greater than zero".to_owned(),
            ));
        }

        Ok(Self {
            run_once,
            store_candidates,
            store_fallback_host,
            store_port,
            store_logs_db,
            loki_base_url,
            offload_interval_secs,
            http_timeout_secs,
        })
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

fn parse_env_u16(name: &str, default: u16) -> AppResult<u16> {
    match env::var(name) {
        Ok(value) => value.parse::<u16>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        Err(_) => Ok(default),
    }
}

fn parse_env_i64(name: &str, default: i64) -> AppResult<i64> {
    match env::var(name) {
        Ok(value) => value.parse::<i64>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        Err(_) => Ok(default),
    }
}

fn parse_env_u64(name: &str, default: u64) -> AppResult<u64> {
    match env::var(name) {
        Ok(value) => value.parse::<u64>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        Err(_) => Ok(default),
    }
}
