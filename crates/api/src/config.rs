//! Application configuration loaded from environment variables.

use std::time::Duration;

use common::Money;
use domain::PricingConfig;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "text" | "pretty" => Some(LogFormat::Text),
            "json" => Some(LogFormat::Json),
            _ => None,
        }
    }
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST` (default `"0.0.0.0"`), `PORT` (default `3000`)
/// - `RUST_LOG` tracing filter (default `"info"`), `LOG_FORMAT` `text` or `json`
/// - `DATABASE_URL`: PostgreSQL URL; unset runs the in-memory store with a demo catalog
/// - `DB_MAX_CONNECTIONS` (default `10`), `LOCK_TIMEOUT_MS` (default `5000`)
/// - `CURRENCY`, `VAT_BASIS_POINTS`, `FREE_SHIPPING_THRESHOLD`,
///   `REDUCED_SHIPPING_THRESHOLD`, `REDUCED_SHIPPING_FEE`, `STANDARD_SHIPPING_FEE`
/// - `RECONCILE_INTERVAL_SECS`: background sweep period, `0` disables it
///
/// Unparseable values fall back to the default.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub lock_timeout: Duration,
    pub pricing: PricingConfig,
    pub reconcile_interval: Option<Duration>,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Config::default();
        let parsed = |key: &str| lookup(key).and_then(|v| v.trim().parse::<i64>().ok());
        let money = |key: &str, default: Money| parsed(key).map(Money::new).unwrap_or(default);

        let pricing = PricingConfig {
            currency: lookup("CURRENCY")
                .map(|c| c.trim().to_uppercase())
                .filter(|c| !c.is_empty())
                .unwrap_or(defaults.pricing.currency.clone()),
            vat_basis_points: parsed("VAT_BASIS_POINTS")
                .filter(|bp| *bp >= 0)
                .unwrap_or(defaults.pricing.vat_basis_points),
            free_shipping_threshold: money(
                "FREE_SHIPPING_THRESHOLD",
                defaults.pricing.free_shipping_threshold,
            ),
            reduced_shipping_threshold: money(
                "REDUCED_SHIPPING_THRESHOLD",
                defaults.pricing.reduced_shipping_threshold,
            ),
            reduced_shipping_fee: money(
                "REDUCED_SHIPPING_FEE",
                defaults.pricing.reduced_shipping_fee,
            ),
            standard_shipping_fee: money(
                "STANDARD_SHIPPING_FEE",
                defaults.pricing.standard_shipping_fee,
            ),
        };

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: lookup("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: lookup("LOG_FORMAT")
                .and_then(|f| LogFormat::parse(&f))
                .unwrap_or_default(),
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            db_max_connections: lookup("DB_MAX_CONNECTIONS")
                .and_then(|n| n.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.db_max_connections),
            lock_timeout: lookup("LOCK_TIMEOUT_MS")
                .and_then(|ms| ms.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.lock_timeout),
            pricing,
            reconcile_interval: lookup("RECONCILE_INTERVAL_SECS")
                .and_then(|s| s.parse::<u64>().ok())
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            database_url: None,
            db_max_connections: 10,
            lock_timeout: store::DEFAULT_LOCK_TIMEOUT,
            pricing: PricingConfig::default(),
            reconcile_interval: None,
        }
    }
}
