//! Worker configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use domain::ProviderCode;
use reconciliation::ReconciliationConfig;
use saga::{FlowConfig, PoolConfig};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format {other:?}")),
        }
    }
}

/// Worker configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`, `PORT`: bind address (default `0.0.0.0:3000`)
/// - `RUST_LOG`: tracing filter directive (default `info`)
/// - `LOG_FORMAT`: `text` or `json` (default `text`)
/// - `WORKER_POOL_SIZE`: side-effect pool slots (default 32)
/// - `COMPENSATION_TIMEOUT_SECS`: rollback budget per saga (default 30)
/// - `ORDER_TTL_SECS`: order lifetime before expiry (default 900)
/// - `RECONCILE_INTERVAL_SECS`: time between sweeps (default 60)
/// - `RECONCILE_BATCH_LIMIT`: orders per sweep (default 500)
/// - `RECONCILE_PROVIDERS`: comma-separated providers needing retrieval
/// - `VA_PROVIDER`: virtual-account provider code
///
/// Unparseable values fall back to the default.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub worker_pool_size: usize,
    pub compensation_timeout: Duration,
    pub order_ttl: Duration,
    pub reconcile_interval: Duration,
    pub reconcile_batch_limit: usize,
    pub reconcile_providers: Vec<ProviderCode>,
    pub va_provider: Option<ProviderCode>,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let parsed = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());
        let secs = |key: &str, default: Duration| {
            parsed(key).map(Duration::from_secs).unwrap_or(default)
        };
        let count = |key: &str, default: usize| {
            parsed(key)
                .and_then(|v| usize::try_from(v).ok())
                .unwrap_or(default)
        };

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: lookup("PORT")
                .and_then(|p| p.trim().parse().ok())
                .unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: lookup("LOG_FORMAT")
                .and_then(|f| f.parse().ok())
                .unwrap_or(defaults.log_format),
            worker_pool_size: count("WORKER_POOL_SIZE", defaults.worker_pool_size),
            compensation_timeout: secs("COMPENSATION_TIMEOUT_SECS", defaults.compensation_timeout),
            order_ttl: secs("ORDER_TTL_SECS", defaults.order_ttl),
            reconcile_interval: parsed("RECONCILE_INTERVAL_SECS")
                .filter(|&secs| secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.reconcile_interval),
            reconcile_batch_limit: count("RECONCILE_BATCH_LIMIT", defaults.reconcile_batch_limit),
            reconcile_providers: lookup("RECONCILE_PROVIDERS")
                .map(|list| {
                    list.split(',')
                        .filter(|code| !code.trim().is_empty())
                        .map(ProviderCode::new)
                        .collect()
                })
                .unwrap_or_default(),
            va_provider: lookup("VA_PROVIDER")
                .filter(|code| !code.trim().is_empty())
                .map(ProviderCode::new),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn flow_config(&self) -> FlowConfig {
        FlowConfig {
            order_ttl: self.order_ttl,
            compensation_timeout: self.compensation_timeout,
        }
    }

    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            max_concurrent: self.worker_pool_size,
        }
    }

    pub fn reconciliation_config(&self) -> ReconciliationConfig {
        ReconciliationConfig {
            interval: self.reconcile_interval,
            batch_limit: self.reconcile_batch_limit,
            retrieval_providers: self.reconcile_providers.iter().cloned().collect(),
            ..ReconciliationConfig::default()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            worker_pool_size: 32,
            compensation_timeout: Duration::from_secs(30),
            order_ttl: Duration::from_secs(900),
            reconcile_interval: Duration::from_secs(60),
            reconcile_batch_limit: 500,
            reconcile_providers: Vec::new(),
            va_provider: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn from_pairs(pairs: &[(&str, &str)]) -> Config {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn test_default_values() {
        let config = from_pairs(&[]);
        assert_eq!(config.addr(), "0.0.0.0:3000");
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_format, LogFormat::Text);
        assert_eq!(config.worker_pool_size, 32);
        assert_eq!(config.flow_config(), FlowConfig::default());
        assert!(config.reconcile_providers.is_empty());
        assert!(config.va_provider.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = from_pairs(&[
            ("HOST", "127.0.0.1"),
            ("PORT", "8080"),
            ("LOG_FORMAT", "JSON"),
            ("WORKER_POOL_SIZE", "4"),
            ("COMPENSATION_TIMEOUT_SECS", "5"),
            ("ORDER_TTL_SECS", "60"),
            ("RECONCILE_INTERVAL_SECS", "10"),
            ("RECONCILE_BATCH_LIMIT", "50"),
            ("RECONCILE_PROVIDERS", "bidv, vpbank,,"),
            ("VA_PROVIDER", "vpbank"),
        ]);
        assert_eq!(config.addr(), "127.0.0.1:8080");
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.pool_config().max_concurrent, 4);
        assert_eq!(config.flow_config().compensation_timeout, Duration::from_secs(5));
        assert_eq!(config.flow_config().order_ttl, Duration::from_secs(60));

        let reconciliation = config.reconciliation_config();
        assert_eq!(reconciliation.interval, Duration::from_secs(10));
        assert_eq!(reconciliation.batch_limit, 50);
        assert_eq!(reconciliation.retrieval_providers.len(), 2);
        assert!(reconciliation.retrieval_providers.contains(&ProviderCode::new("BIDV")));
        assert_eq!(config.va_provider, Some(ProviderCode::new("VPBANK")));
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = from_pairs(&[
            ("PORT", "not-a-port"),
            ("LOG_FORMAT", "xml"),
            ("ORDER_TTL_SECS", "-1"),
        ]);
        assert_eq!(config.port, 3000);
        assert_eq!(config.log_format, LogFormat::Text);
        assert_eq!(config.order_ttl, Duration::from_secs(900));
    }

    #[test]
    fn test_zero_reconcile_interval_falls_back() {
        let config = from_pairs(&[("RECONCILE_INTERVAL_SECS", "0")]);
        assert_eq!(config.reconcile_interval, Duration::from_secs(60));
    }
}
