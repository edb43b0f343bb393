//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::{AppConfig, CacheEngine};
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },

    #[error("missing required configuration: {field} ({hint})")]
    Missing { field: String, hint: String },
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `upstream_url` is not an absolute http(s) URL
    /// - `port` is 0
    /// - `timeout_ms` is less than 100ms or exceeds 5 minutes
    /// - `probe_timeout_ms` or `max_body_bytes` is 0
    /// - `cache.ttl` or `cache.max_entries` is 0
    ///
    /// Returns `ConfigError::Missing` if:
    /// - the redis engine is selected without `cache.url`
    /// - override mode is enabled without both master keys
    pub fn validate(&self) -> Result<(), ConfigError> {
        match url::Url::parse(&self.upstream_url) {
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
            Ok(parsed) => {
                return Err(ConfigError::Invalid {
                    field: "upstream_url".into(),
                    reason: format!("unsupported scheme: {}", parsed.scheme()),
                });
            }
            Err(e) => {
                return Err(ConfigError::Invalid { field: "upstream_url".into(), reason: e.to_string() });
            }
        }

        if self.port == 0 {
            return Err(ConfigError::Invalid { field: "port".into(), reason: "must be greater than 0".into() });
        }

        if self.timeout_ms < 100 {
            return Err(ConfigError::Invalid { field: "timeout_ms".into(), reason: "must be at least 100ms".into() });
        }
        if self.timeout_ms > 300_000 {
            return Err(ConfigError::Invalid {
                field: "timeout_ms".into(),
                reason: "must not exceed 5 minutes (300000ms)".into(),
            });
        }

        if self.probe_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "probe_timeout_ms".into(),
                reason: "must be greater than 0".into(),
            });
        }

        if self.max_body_bytes == 0 {
            return Err(ConfigError::Invalid {
                field: "max_body_bytes".into(),
                reason: "must be greater than 0".into(),
            });
        }

        if self.cache.ttl < 1 {
            return Err(ConfigError::Invalid { field: "cache.ttl".into(), reason: "must be greater than 0".into() });
        }

        if self.cache.max_entries == 0 {
            return Err(ConfigError::Invalid {
                field: "cache.max_entries".into(),
                reason: "must be greater than 0".into(),
            });
        }

        if self.cache.engine == CacheEngine::Redis && self.cache.url.as_deref().is_none_or(str::is_empty) {
            return Err(ConfigError::Missing {
                field: "cache.url".into(),
                hint: "Set CACHE_URL when CACHE_ENGINE=redis".into(),
            });
        }

        if self.master_key_override {
            if self.proxy_master_key.as_deref().is_none_or(str::is_empty) {
                return Err(ConfigError::Missing {
                    field: "proxy_master_key".into(),
                    hint: "Set PROXY_MASTER_KEY when PROXY_MASTER_KEY_OVERRIDE is enabled".into(),
                });
            }
            if self.upstream_master_key.as_deref().is_none_or(str::is_empty) {
                return Err(ConfigError::Missing {
                    field: "upstream_master_key".into(),
                    hint: "Set MEILISEARCH_MASTER_KEY when PROXY_MASTER_KEY_OVERRIDE is enabled".into(),
                });
            }
        }

        if self.purge_token.is_none() {
            tracing::warn!("purge_token is not set; the purge endpoint accepts unauthenticated requests");
        }

        if self.purge_blocked_by_override() {
            tracing::warn!("purge_token differs from proxy_master_key in override mode; purges will be rejected");
        }

        Ok(())
    }

    /// In override mode one `Authorization` header must satisfy both the master-key
    /// check and the purge check, so a distinct purge token makes purge unreachable.
    pub fn purge_blocked_by_override(&self) -> bool {
        match (self.master_key_override, self.purge_token.as_deref()) {
            (true, Some(token)) if !token.is_empty() => self.proxy_master_key.as_deref() != Some(token),
            _ => false,
        }
    }
}
