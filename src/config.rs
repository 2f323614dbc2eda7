use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

/// Top-level configuration for the hivewatch monitor.
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Logging verbosity (debug, info, warn, error). Default: "info".
    #[serde(default = "default_log_level")]
    #[allow(dead_code)]
    pub log_level: String,

    /// Event feed connection configuration.
    #[serde(default)]
    pub feed: FeedConfig,

    /// Snapshot refresh configuration.
    #[serde(default)]
    pub refresh: RefreshConfig,

    /// JSON/metrics API server configuration.
    #[serde(default)]
    pub api: ApiConfig,

    /// How often to log snapshot statistics. Default: 60s.
    #[serde(default = "default_stats_report_interval", with = "humantime_serde")]
    pub stats_report_interval: Duration,
}

/// Event feed connection configuration.
#[derive(Debug, Deserialize)]
pub struct FeedConfig {
    /// Collector HTTP endpoint (e.g., "http://127.0.0.1:8000").
    #[serde(default)]
    pub endpoint: String,

    /// Request timeout. Default: 10s.
    #[serde(default = "default_feed_timeout", with = "humantime_serde")]
    pub timeout: Duration,

    /// Maximum events requested per fetch. Default: 100.
    #[serde(default = "default_feed_limit")]
    pub limit: usize,
}

/// Snapshot refresh configuration.
#[derive(Debug, Deserialize)]
pub struct RefreshConfig {
    /// Interval between fetches. Default: 5s.
    #[serde(default = "default_refresh_interval", with = "humantime_serde")]
    pub interval: Duration,
}

/// JSON/metrics API server configuration.
#[derive(Debug, Deserialize)]
pub struct ApiConfig {
    /// Listen address. Default: ":9090".
    #[serde(default = "default_api_addr")]
    pub addr: String,
}

// --- Default value functions ---

fn default_log_level() -> String {
    "info".to_string()
}

fn default_feed_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_feed_limit() -> usize {
    100
}

fn default_refresh_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_stats_report_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_api_addr() -> String {
    ":9090".to_string()
}

// --- Default trait impls ---

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            feed: FeedConfig::default(),
            refresh: RefreshConfig::default(),
            api: ApiConfig::default(),
            stats_report_interval: default_stats_report_interval(),
        }
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            timeout: default_feed_timeout(),
            limit: default_feed_limit(),
        }
    }
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval: default_refresh_interval(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            addr: default_api_addr(),
        }
    }
}

// --- Validation and loading ---

impl Config {
    /// Load configuration from a YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;

        let cfg: Config = serde_yaml::from_str(&data)
            .with_context(|| format!("parsing config file {}", path.display()))?;

        cfg.validate()?;

        Ok(cfg)
    }

    /// Validate the configuration for required fields and consistency.
    pub fn validate(&self) -> Result<()> {
        if self.feed.endpoint.is_empty() {
            bail!("feed.endpoint is required");
        }

        if self.feed.limit == 0 {
            bail!("feed.limit must be positive");
        }

        if self.refresh.interval.is_zero() {
            bail!("refresh.interval must be positive");
        }

        if self.stats_report_interval.is_zero() {
            bail!("stats_report_interval must be positive");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_gets_defaults() {
        let cfg: Config = serde_yaml::from_str("feed:\n  endpoint: http://127.0.0.1:8000\n")
            .expect("minimal config should parse");

        cfg.validate().expect("minimal config should validate");
        assert_eq!(cfg.log_level, "info");
        assert_eq!(cfg.feed.timeout, Duration::from_secs(10));
        assert_eq!(cfg.feed.limit, 100);
        assert_eq!(cfg.refresh.interval, Duration::from_secs(5));
        assert_eq!(cfg.api.addr, ":9090");
        assert_eq!(cfg.stats_report_interval, Duration::from_secs(60));
    }

    #[test]
    fn test_full_config_parses_humantime_durations() {
        let yaml = r#"
log_level: debug
feed:
  endpoint: http://collector:8000
  timeout: 3s
  limit: 250
refresh:
  interval: 500ms
api:
  addr: "127.0.0.1:9100"
stats_report_interval: 2m
"#;

        let cfg: Config = serde_yaml::from_str(yaml).expect("full config should parse");
        cfg.validate().expect("full config should validate");

        assert_eq!(cfg.feed.endpoint, "http://collector:8000");
        assert_eq!(cfg.feed.timeout, Duration::from_secs(3));
        assert_eq!(cfg.feed.limit, 250);
        assert_eq!(cfg.refresh.interval, Duration::from_millis(500));
        assert_eq!(cfg.api.addr, "127.0.0.1:9100");
        assert_eq!(cfg.stats_report_interval, Duration::from_secs(120));
    }

    #[test]
    fn test_validate_requires_endpoint() {
        let cfg = Config::default();
        let err = cfg.validate().expect_err("empty endpoint should fail");
        assert!(err.to_string().contains("feed.endpoint"));
    }

    #[test]
    fn test_validate_rejects_zero_refresh_interval() {
        let cfg: Config = serde_yaml::from_str(
            "feed:\n  endpoint: http://127.0.0.1:8000\nrefresh:\n  interval: 0s\n",
        )
        .expect("config should parse");

        let err = cfg.validate().expect_err("zero interval should fail");
        assert!(err.to_string().contains("refresh.interval"));
    }

    #[test]
    fn test_validate_rejects_zero_limit() {
        let cfg: Config =
            serde_yaml::from_str("feed:\n  endpoint: http://127.0.0.1:8000\n  limit: 0\n")
                .expect("config should parse");

        let err = cfg.validate().expect_err("zero limit should fail");
        assert!(err.to_string().contains("feed.limit"));
    }
}
