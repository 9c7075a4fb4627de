//! Configuration System
//!
//! Provides hierarchical configuration loading from:
//! - avql.toml (default configuration)
//! - avql.local.toml (git-ignored local overrides)
//! - Environment variables (AVQL_* prefix)
//!
//! ## Example
//!
//! ```toml
//! # avql.toml
//! [matches]
//! result_cache_min_size = 64
//! max_match_count = 255
//!
//! [diagnostics]
//! runtime_warnings = true
//! ```
//!
//! Environment variable overrides:
//! ```bash
//! AVQL_MATCHES__RESULT_CACHE_MIN_SIZE=128
//! AVQL_LOGGING__LEVEL=debug
//! ```

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Main configuration struct
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub matches: MatchConfig,
    #[serde(default)]
    pub order: OrderConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,
}

/// Match-table and result-cache tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchConfig {
    /// Minimum input size before `execute_and_cache` builds a per-result
    /// index instead of scanning
    #[serde(default = "default_cache_min_size")]
    pub result_cache_min_size: usize,

    /// Expected maximum match count per element; drives the byte width of
    /// packed match-count tables
    #[serde(default = "default_max_match_count")]
    pub max_match_count: u32,
}

/// Ordering service tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderConfig {
    /// Maximum elements forwarded per listener notification batch
    #[serde(default = "default_notify_batch_size")]
    pub notify_batch_size: usize,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (text, json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

/// Diagnostics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticsConfig {
    /// Emit warnings for recoverable conditions (compiler shape fallback,
    /// match-table reconstruction)
    #[serde(default = "default_true")]
    pub runtime_warnings: bool,
}

// Default value functions
fn default_cache_min_size() -> usize {
    64
}
fn default_max_match_count() -> u32 {
    255
}
fn default_notify_batch_size() -> usize {
    4096
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "text".to_string()
}
fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Merges in order:
    /// 1. avql.toml (base configuration)
    /// 2. avql.local.toml (local overrides, git-ignored)
    /// 3. Environment variables (AVQL_* prefix)
    pub fn load() -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file("avql.toml"))
            .merge(Toml::file("avql.local.toml"))
            .merge(Env::prefixed("AVQL_").split("__"))
            .extract()
    }

    /// Load configuration from a specific file path
    pub fn from_file(path: &str) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("AVQL_").split("__"))
            .extract()
    }
}

impl Default for MatchConfig {
    fn default() -> Self {
        MatchConfig {
            result_cache_min_size: default_cache_min_size(),
            max_match_count: default_max_match_count(),
        }
    }
}

impl Default for OrderConfig {
    fn default() -> Self {
        OrderConfig {
            notify_batch_size: default_notify_batch_size(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        DiagnosticsConfig {
            runtime_warnings: default_true(),
        }
    }
}

/// Initialize tracing from the logging section. Safe to call more than
/// once; later calls are no-ops when a subscriber is already installed.
pub fn init_logging(cfg: &LoggingConfig) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_new(&cfg.level).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let result = if cfg.format == "json" {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    let _ = result;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.matches.result_cache_min_size, 64);
        assert_eq!(config.matches.max_match_count, 255);
        assert!(config.diagnostics.runtime_warnings);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).unwrap();
        assert!(toml_str.contains("[matches]"));
        assert!(toml_str.contains("[diagnostics]"));
    }
}
