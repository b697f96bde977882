//! Configuration management for Tollgate.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Result, TollgateError};
use crate::ratelimit::{TierSet, DEFAULT_NAMESPACE};

/// Prefix for environment overrides, e.g. `TOLLGATE__SERVER__HTTP_ADDR`.
pub const ENV_PREFIX: &str = "TOLLGATE";

/// Main configuration for the Tollgate service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TollgateConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,

    /// Report endpoint configuration
    #[serde(default)]
    pub reports: ReportsConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address
    #[serde(default = "default_http_addr")]
    pub http_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
        }
    }
}

fn default_http_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 5000))
}

/// Which counter store backs the limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Redis,
    /// Process-local counters; only correct for a single instance.
    Memory,
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Counter store backend
    #[serde(default)]
    pub backend: StoreBackend,

    /// Redis connection URL
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    /// Key namespace for counters
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Per-operation counter store timeout in milliseconds
    #[serde(default = "default_store_timeout")]
    pub store_timeout_ms: u64,

    /// Optional YAML file holding the tier list; overrides `tiers`
    #[serde(default)]
    pub tiers_path: Option<PathBuf>,

    /// Ordered rate limit tiers
    #[serde(default)]
    pub tiers: TierSet,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            redis_url: default_redis_url(),
            namespace: default_namespace(),
            store_timeout_ms: default_store_timeout(),
            tiers_path: None,
            tiers: TierSet::default(),
        }
    }
}

impl RateLimitingConfig {
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379/".to_string()
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

fn default_store_timeout() -> u64 {
    250
}

/// Report endpoint configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportsConfig {
    /// JSON snapshot of report rows
    pub snapshot_path: Option<PathBuf>,
}

impl TollgateConfig {
    /// Load configuration from an optional file plus `TOLLGATE__*` environment
    /// overrides, then validate it.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

        let mut config: TollgateConfig = builder.build()?.try_deserialize()?;
        config.resolve_tiers()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let mut config: TollgateConfig =
            serde_yaml::from_str(yaml).map_err(|e| TollgateError::Config(e.to_string()))?;
        config.resolve_tiers()?;
        config.validate()?;
        Ok(config)
    }

    fn resolve_tiers(&mut self) -> Result<()> {
        if let Some(path) = &self.rate_limiting.tiers_path {
            self.rate_limiting.tiers = TierSet::from_file(path)?;
        }
        Ok(())
    }

    /// Reject settings that would make the limiter misbehave.
    pub fn validate(&self) -> Result<()> {
        let rl = &self.rate_limiting;

        if rl.namespace.is_empty() {
            return Err(TollgateError::Config("namespace must not be empty".to_string()));
        }
        if rl.namespace.contains(':') {
            return Err(TollgateError::Config(format!(
                "namespace {:?} must not contain ':'",
                rl.namespace
            )));
        }
        if rl.store_timeout_ms == 0 {
            return Err(TollgateError::Config(
                "store_timeout_ms must be positive".to_string(),
            ));
        }

        Ok(())
    }
}
