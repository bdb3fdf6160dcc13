use dotenvy::dotenv;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::domain::money::Money;
use crate::domain::pricing::PricingPolicy;
use crate::services::EngineSettings;
use crate::utils::CircuitBreakerConfig;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server_host: String,
    pub server_port: u16,
    /// In-memory stores are used when absent
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub payment_timeout: Duration,
    pub delivery_lead_days: i64,
    pub pricing: PricingPolicy,
}

impl AppConfig {
    /// Load from the process environment, reading `.env` first if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok();
        let config = Self::from_lookup(|name| env::var(name).ok())?;
        tracing::info!(
            host = %config.server_host,
            port = config.server_port,
            persistent = config.database_url.is_some(),
            "Configuration loaded"
        );
        Ok(config)
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let defaults = PricingPolicy::default();
        let remote_keywords = match get("REMOTE_CITY_KEYWORDS") {
            Some(list) => list
                .split(',')
                .map(|k| k.trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
            None => defaults.remote_keywords.clone(),
        };

        let pricing = PricingPolicy {
            tax_rate_bps: parse_or(&get, "TAX_RATE_BPS", defaults.tax_rate_bps)?,
            shipping_base_fee: money_or(&get, "SHIPPING_BASE_FEE", defaults.shipping_base_fee)?,
            free_shipping_threshold: money_or(&get, "FREE_SHIPPING_THRESHOLD", defaults.free_shipping_threshold)?,
            remote_surcharge: money_or(&get, "REMOTE_SURCHARGE", defaults.remote_surcharge)?,
            remote_keywords,
        };
        if pricing.tax_rate_bps > 10_000 {
            return Err(ConfigError::Invalid {
                name: "TAX_RATE_BPS",
                reason: "must not exceed 10000".to_string(),
            });
        }

        let database_max_connections: u32 = parse_or(&get, "DATABASE_MAX_CONNECTIONS", 10)?;
        if database_max_connections == 0 {
            return Err(ConfigError::Invalid {
                name: "DATABASE_MAX_CONNECTIONS",
                reason: "must be at least 1".to_string(),
            });
        }

        let payment_timeout_ms: u64 = parse_or(&get, "PAYMENT_TIMEOUT_MS", 10_000)?;
        if payment_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                name: "PAYMENT_TIMEOUT_MS",
                reason: "must be greater than zero".to_string(),
            });
        }

        let delivery_lead_days: i64 = parse_or(&get, "DELIVERY_LEAD_DAYS", 3)?;
        if !(0..=365).contains(&delivery_lead_days) {
            return Err(ConfigError::Invalid {
                name: "DELIVERY_LEAD_DAYS",
                reason: "must be between 0 and 365".to_string(),
            });
        }

        Ok(Self {
            server_host: get("SERVER_HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            server_port: parse_or(&get, "SERVER_PORT", 8080)?,
            database_url: get("DATABASE_URL"),
            database_max_connections,
            payment_timeout: Duration::from_millis(payment_timeout_ms),
            delivery_lead_days,
            pricing,
        })
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            pricing: self.pricing.clone(),
            delivery_lead_time: chrono::Duration::days(self.delivery_lead_days),
            payment_timeout: self.payment_timeout,
            payment_breaker: CircuitBreakerConfig::default(),
        }
    }
}

fn parse_or<T, G>(get: &G, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(name) {
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            reason: format!("{raw:?}: {e}"),
        }),
        None => Ok(default),
    }
}

/// Money settings are given in minor units
fn money_or<G>(get: &G, name: &'static str, default: Money) -> Result<Money, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    let minor: i64 = parse_or(get, name, default.minor_units())?;
    if minor < 0 {
        return Err(ConfigError::Invalid {
            name,
            reason: "must not be negative".to_string(),
        });
    }
    Ok(Money::from_minor(minor))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        AppConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config.server_host, "127.0.0.1");
        assert_eq!(config.server_port, 8080);
        assert!(config.database_url.is_none());
        assert_eq!(config.payment_timeout, Duration::from_secs(10));
        assert_eq!(config.delivery_lead_days, 3);
        assert_eq!(config.pricing.tax_rate_bps, 1_000);
        assert_eq!(config.pricing.free_shipping_threshold, Money::from_major(1_000));
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            ("SERVER_PORT", "9000"),
            ("DATABASE_URL", "postgres://localhost/agrimarket"),
            ("SHIPPING_BASE_FEE", "7500"),
            ("REMOTE_CITY_KEYWORDS", "Island, Lake ,"),
        ])
        .unwrap();

        assert_eq!(config.server_port, 9000);
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/agrimarket"));
        assert_eq!(config.pricing.shipping_base_fee, Money::from_major(75));
        assert_eq!(config.pricing.remote_keywords, vec!["island".to_string(), "lake".to_string()]);
    }

    #[test]
    fn test_invalid_values_fail() {
        assert!(matches!(
            config(&[("SERVER_PORT", "eighty")]),
            Err(ConfigError::Invalid { name: "SERVER_PORT", .. })
        ));
        assert!(matches!(
            config(&[("PAYMENT_TIMEOUT_MS", "0")]),
            Err(ConfigError::Invalid { name: "PAYMENT_TIMEOUT_MS", .. })
        ));
        assert!(matches!(
            config(&[("REMOTE_SURCHARGE", "-1")]),
            Err(ConfigError::Invalid { name: "REMOTE_SURCHARGE", .. })
        ));
    }
}
