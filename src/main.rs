//! Tiered Cache Server
//!
//! Serves a `TieredCache<serde_json::Value>` over HTTP.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       tiered-cache server                       │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐    ┌──────────────┐    ┌──────────────┐       │
//! │  │  HTTP routes │───▶│ TieredCache  │───▶│  HttpOrigin  │       │
//! │  │   (hyper)    │    │  L1/L2/L3    │    │  (refresher) │       │
//! │  └──────────────┘    └──────────────┘    └──────────────┘       │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tiered_cache::adapters::{HttpOrigin, OriginConfig, PrometheusExporter};
use tiered_cache::cache::{CacheConfig, FileL2Store, InMemoryL3Store, MemoryL2Store, TieredCache};
use tiered_cache::error::{Error, Result};
use tiered_cache::server::{self, AppState};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Tiered Cache - three-tier cache server with background refresh
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// YAML configuration file
    #[arg(long, env = "CACHE_CONFIG")]
    config: Option<PathBuf>,

    /// Maximum L1 entries (overrides the config file)
    #[arg(long, env = "L1_MAX_SIZE")]
    l1_max_size: Option<usize>,

    /// Maximum L2 entries (overrides the config file)
    #[arg(long, env = "L2_MAX_SIZE")]
    l2_max_size: Option<usize>,

    /// Maximum L3 entries (overrides the config file)
    #[arg(long, env = "L3_MAX_SIZE")]
    l3_max_size: Option<usize>,

    /// Default TTL in milliseconds (overrides the config file)
    #[arg(long, env = "DEFAULT_TTL_MS")]
    default_ttl_ms: Option<u64>,

    /// Directory for the L2 file store; in-memory L2 when unset
    #[arg(long, env = "L2_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// L2 disk quota in bytes
    #[arg(long, env = "L2_QUOTA_BYTES")]
    l2_quota_bytes: Option<u64>,

    /// Run without the structured tier
    #[arg(long, env = "DISABLE_L3")]
    disable_l3: bool,

    /// Origin base URL for read-through and background refresh
    #[arg(long, env = "ORIGIN_URL")]
    origin_url: Option<String>,

    /// Origin request timeout in seconds
    #[arg(long, env = "ORIGIN_TIMEOUT_SECONDS", default_value = "10")]
    origin_timeout_seconds: u64,

    /// HTTP bind address
    #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:8080")]
    listen_addr: String,

    /// Maintenance sweep interval in seconds
    #[arg(long, env = "MAINTENANCE_INTERVAL_SECONDS", default_value = "60")]
    maintenance_interval_seconds: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

impl Args {
    fn cache_config(&self) -> Result<CacheConfig> {
        let mut config = match &self.config {
            Some(path) => CacheConfig::from_yaml_file(path)?,
            None => CacheConfig::default(),
        };

        if let Some(size) = self.l1_max_size {
            config.l1_max_size = size;
        }
        if let Some(size) = self.l2_max_size {
            config.l2_max_size = size;
        }
        if let Some(size) = self.l3_max_size {
            config.l3_max_size = size;
        }
        if let Some(ttl) = self.default_ttl_ms {
            config.default_ttl = Duration::from_millis(ttl);
        }

        config.validate()?;
        Ok(config)
    }
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    init_logging(&args);

    info!("Starting tiered cache server");

    let config = args.cache_config()?;
    info!("  L1 max size: {}", config.l1_max_size);
    info!("  L2 max size: {}", config.l2_max_size);
    info!("  L3 max size: {}", config.l3_max_size);
    info!("  Default TTL: {:?}", config.default_ttl);
    info!("  Background refresh: {}", config.background_refresh);

    let memory_l2 = || {
        Arc::new(match args.l2_quota_bytes {
            Some(quota) => MemoryL2Store::with_quota(quota),
            None => MemoryL2Store::new(),
        })
    };
    let mut builder = TieredCache::<Value>::builder(config);
    builder = match &args.data_dir {
        Some(dir) => match FileL2Store::open_with_quota(dir, args.l2_quota_bytes) {
            Ok(store) => builder.l2_store(Arc::new(store)),
            Err(e) => {
                warn!("L2 file store unavailable at {}: {}", dir.display(), e);
                warn!("Continuing with an in-memory L2 tier");
                builder.l2_store(memory_l2())
            }
        },
        None => builder.l2_store(memory_l2()),
    };
    if !args.disable_l3 {
        builder = builder.l3_store(Arc::new(InMemoryL3Store::new()));
    }
    let cache = builder.build()?;

    let origin = match &args.origin_url {
        Some(url) => {
            let origin = HttpOrigin::new(OriginConfig {
                base_url: url.clone(),
                timeout: Duration::from_secs(args.origin_timeout_seconds),
            })?;
            info!("  Origin: {}", url);
            Some(Arc::new(origin))
        }
        None => None,
    };

    let shutdown = CancellationToken::new();

    // Background refresh needs an origin to fetch from
    let refresher = match (&origin, cache.config().background_refresh) {
        (Some(origin), true) => Some(cache.spawn_refresher(origin.clone())),
        _ => None,
    };

    // Periodic maintenance sweep
    let maintenance = {
        let cache = cache.clone();
        let token = shutdown.clone();
        let period = Duration::from_secs(args.maintenance_interval_seconds.max(1));
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tick.tick() => {
                        let report = cache.maintain().await;
                        tracing::debug!(?report, "Maintenance sweep finished");
                    }
                }
            }
        })
    };

    let state = Arc::new(AppState {
        cache: cache.clone(),
        exporter: PrometheusExporter::new("tiered_cache")?,
        origin,
    });

    let addr: SocketAddr = args
        .listen_addr
        .parse()
        .map_err(|e| Error::Internal(format!("Invalid listen address: {}", e)))?;
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Internal(format!("Failed to bind cache server: {}", e)))?;

    let server_token = shutdown.clone();
    let server = tokio::spawn(server::serve(listener, state, server_token));

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutdown signal received");
    shutdown.cancel();

    if let Some(refresher) = refresher {
        refresher.shutdown().await;
    }
    if let Err(e) = maintenance.await {
        error!("Maintenance task ended abnormally: {}", e);
    }
    match server.await {
        Ok(Err(e)) => error!("Cache server error: {}", e),
        Err(e) => error!("Cache server task ended abnormally: {}", e),
        Ok(Ok(())) => {}
    }

    info!("Tiered cache shutdown complete");
    Ok(())
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    for directive in ["hyper=warn", "reqwest=warn"] {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}
