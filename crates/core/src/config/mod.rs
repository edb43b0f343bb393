//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (MEILI_PROXY_*)
//! 2. Legacy flat environment variables (MEILISEARCH_HOST, CACHE_TTL, ...)
//! 3. TOML config file (if MEILI_PROXY_CONFIG_FILE set)
//! 4. Built-in defaults

use std::fmt;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

/// Flat variable names understood for compatibility with existing deployments,
/// paired with the configuration path they populate.
const LEGACY_ENV: &[(&str, &str)] = &[
    ("MEILISEARCH_HOST", "upstream_url"),
    ("MEILISEARCH_MASTER_KEY", "upstream_master_key"),
    ("PROXY_MASTER_KEY", "proxy_master_key"),
    ("PROXY_MASTER_KEY_OVERRIDE", "master_key_override"),
    ("PROXY_PURGE_TOKEN", "purge_token"),
    ("PORT", "port"),
    ("AUTO_RESTART_INTERVAL", "auto_restart_interval_secs"),
    ("CACHE_ENGINE", "cache.engine"),
    ("CACHE_TTL", "cache.ttl"),
    ("CACHE_URL", "cache.url"),
];

/// Cache backend selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheEngine {
    /// In-process bounded cache, always available.
    Memory,
    /// Networked Redis cache, probed once at startup.
    Redis,
}

impl fmt::Display for CacheEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheEngine::Memory => f.write_str("memory"),
            CacheEngine::Redis => f.write_str("redis"),
        }
    }
}

/// Cache store configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Backend engine.
    ///
    /// Set via CACHE_ENGINE or MEILI_PROXY_CACHE__ENGINE.
    #[serde(default = "default_engine")]
    pub engine: CacheEngine,

    /// Entry time-to-live in seconds (at least 1).
    ///
    /// Set via CACHE_TTL or MEILI_PROXY_CACHE__TTL.
    #[serde(default = "default_ttl")]
    pub ttl: u64,

    /// Connection string for the redis engine.
    ///
    /// Set via CACHE_URL or MEILI_PROXY_CACHE__URL.
    #[serde(default)]
    pub url: Option<String>,

    /// Capacity of the memory engine, in entries.
    #[serde(default = "default_max_entries")]
    pub max_entries: u64,

    /// Namespace prepended to every key written by the redis engine.
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

fn default_engine() -> CacheEngine {
    CacheEngine::Memory
}

fn default_ttl() -> u64 {
    300
}

fn default_max_entries() -> u64 {
    10_000
}

fn default_key_prefix() -> String {
    "meiliproxy:".into()
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            engine: default_engine(),
            ttl: default_ttl(),
            url: None,
            max_entries: default_max_entries(),
            key_prefix: default_key_prefix(),
        }
    }
}

impl CacheConfig {
    /// TTL as Duration.
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl)
    }
}

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (MEILI_PROXY_*)
/// 2. Legacy flat environment variables
/// 3. TOML config file (if MEILI_PROXY_CONFIG_FILE set)
/// 4. Built-in defaults
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Base URL of the upstream search engine.
    ///
    /// Set via MEILISEARCH_HOST.
    #[serde(default = "default_upstream_url")]
    pub upstream_url: String,

    /// Privileged credential sent upstream when override mode is on.
    ///
    /// Set via MEILISEARCH_MASTER_KEY.
    #[serde(default)]
    pub upstream_master_key: Option<String>,

    /// Credential clients must present when override mode is on.
    ///
    /// Set via PROXY_MASTER_KEY.
    #[serde(default)]
    pub proxy_master_key: Option<String>,

    /// Swap the client credential for the upstream master key.
    ///
    /// Set via PROXY_MASTER_KEY_OVERRIDE.
    #[serde(default)]
    pub master_key_override: bool,

    /// Bearer token required by the purge endpoint. Purge is open when unset.
    ///
    /// Set via PROXY_PURGE_TOKEN.
    #[serde(default)]
    pub purge_token: Option<String>,

    /// Listen port.
    ///
    /// Set via PORT.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Upstream transport timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Timeout for liveness and cache backend probes in milliseconds.
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,

    /// Largest inbound body buffered for a cached search.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    /// Report unhealthy after running this long so the orchestrator restarts us.
    ///
    /// Set via AUTO_RESTART_INTERVAL (seconds).
    #[serde(default)]
    pub auto_restart_interval_secs: Option<u64>,

    /// Skip the upstream reachability check at startup.
    #[serde(default)]
    pub skip_startup_probe: bool,

    /// Cache store settings.
    #[serde(default)]
    pub cache: CacheConfig,
}

fn default_upstream_url() -> String {
    "http://localhost:7700".into()
}

fn default_port() -> u16 {
    8080
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_probe_timeout_ms() -> u64 {
    2_000
}

fn default_max_body_bytes() -> usize {
    10 * 1024 * 1024
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            upstream_url: default_upstream_url(),
            upstream_master_key: None,
            proxy_master_key: None,
            master_key_override: false,
            purge_token: None,
            port: default_port(),
            timeout_ms: default_timeout_ms(),
            probe_timeout_ms: default_probe_timeout_ms(),
            max_body_bytes: default_max_body_bytes(),
            auto_restart_interval_secs: None,
            skip_startup_probe: false,
            cache: CacheConfig::default(),
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Probe timeout as Duration.
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    /// Auto-restart interval, if configured.
    pub fn auto_restart_interval(&self) -> Option<Duration> {
        self.auto_restart_interval_secs.filter(|secs| *secs > 0).map(Duration::from_secs)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed (including unknown cache engines)
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let config: Self = Self::figment()
            .extract()
            .map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }

    /// The layered figment, exposed separately so callers can merge overrides.
    pub fn figment() -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("MEILI_PROXY_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        let legacy_keys: Vec<&str> = LEGACY_ENV.iter().map(|(name, _)| *name).collect();
        figment = figment.merge(Env::raw().only(&legacy_keys).map(|key| {
            LEGACY_ENV
                .iter()
                .find(|(name, _)| key.as_str().eq_ignore_ascii_case(name))
                .map(|(_, path)| (*path).into())
                .unwrap_or_else(|| key.as_str().to_lowercase().into())
        }));

        figment.merge(
            Env::prefixed("MEILI_PROXY_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        )
    }
}
