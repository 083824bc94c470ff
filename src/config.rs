use std::str::FromStr;
use std::time::Duration;

use bigdecimal::{BigDecimal, Zero};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{var} is invalid: {message}")]
    Invalid { var: &'static str, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Garanzia3Mode {
    Mock,
    Live,
}

#[derive(Debug, Clone)]
pub struct PaymentConfig {
    pub mock_enabled: bool,
    pub mock_webhook_secret: String,
    pub payplug_secret_key: Option<String>,
    pub payplug_api_url: String,
}

#[derive(Debug, Clone)]
pub struct Garanzia3Config {
    pub mode: Garanzia3Mode,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub dealer_code: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub db_max_connections: u32,
    pub admin_api_key: String,
    pub jwt_secret: String,
    pub public_base_url: String,
    pub currency: String,
    pub shipping_flat_rate: BigDecimal,
    pub cart_ttl_hours: i64,
    pub http_timeout: Duration,
    pub payment: PaymentConfig,
    pub garanzia3: Garanzia3Config,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source. Blank
    /// values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let required = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));
        let or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let shipping_flat_rate = parse::<BigDecimal>("SHIPPING_FLAT_RATE", &or("SHIPPING_FLAT_RATE", "9.90"))?;
        if shipping_flat_rate < BigDecimal::zero() {
            return Err(ConfigError::Invalid {
                var: "SHIPPING_FLAT_RATE",
                message: "must not be negative".to_string(),
            });
        }

        let cart_ttl_hours = parse::<i64>("CART_TTL_HOURS", &or("CART_TTL_HOURS", "72"))?;
        if cart_ttl_hours <= 0 {
            return Err(ConfigError::Invalid {
                var: "CART_TTL_HOURS",
                message: "must be positive".to_string(),
            });
        }

        let mock_enabled = parse_bool("PAYMENT_MOCK_ENABLED", &or("PAYMENT_MOCK_ENABLED", "true"))?;

        let mode = match or("GARANZIA3_MODE", "mock").to_ascii_lowercase().as_str() {
            "mock" => Garanzia3Mode::Mock,
            "live" => Garanzia3Mode::Live,
            other => {
                return Err(ConfigError::Invalid {
                    var: "GARANZIA3_MODE",
                    message: format!("expected 'mock' or 'live', got '{other}'"),
                })
            }
        };
        let garanzia3 = Garanzia3Config {
            mode,
            base_url: get("GARANZIA3_BASE_URL"),
            api_key: get("GARANZIA3_API_KEY"),
            dealer_code: or("GARANZIA3_DEALER_CODE", ""),
        };
        if mode == Garanzia3Mode::Live {
            if garanzia3.base_url.is_none() {
                return Err(ConfigError::Missing("GARANZIA3_BASE_URL"));
            }
            if garanzia3.api_key.is_none() {
                return Err(ConfigError::Missing("GARANZIA3_API_KEY"));
            }
        }

        Ok(AppConfig {
            database_url: required("DATABASE_URL")?,
            host: or("HOST", "0.0.0.0"),
            port: parse("PORT", &or("PORT", "8080"))?,
            db_max_connections: parse("DB_MAX_CONNECTIONS", &or("DB_MAX_CONNECTIONS", "10"))?,
            admin_api_key: required("ADMIN_API_KEY")?,
            jwt_secret: required("JWT_SECRET")?,
            public_base_url: or("PUBLIC_BASE_URL", "http://localhost:8080"),
            currency: or("CURRENCY", "EUR").to_ascii_uppercase(),
            shipping_flat_rate,
            cart_ttl_hours,
            http_timeout: Duration::from_secs(parse("HTTP_TIMEOUT_SECS", &or("HTTP_TIMEOUT_SECS", "30"))?),
            payment: PaymentConfig {
                mock_enabled,
                // Anyone holding this secret can mark orders paid.
                mock_webhook_secret: if mock_enabled {
                    required("MOCK_WEBHOOK_SECRET")?
                } else {
                    String::new()
                },
                payplug_secret_key: get("PAYPLUG_SECRET_KEY"),
                payplug_api_url: or("PAYPLUG_API_URL", "https://api.payplug.com"),
            },
            garanzia3,
        })
    }
}

fn parse<T>(var: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
        var,
        message: e.to_string(),
    })
}

fn parse_bool(var: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::Invalid {
            var,
            message: format!("'{other}' is not a boolean"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| map.get(key).cloned())
    }

    const BASE: [(&str, &str); 4] = [
        ("DATABASE_URL", "postgres://localhost/shop"),
        ("ADMIN_API_KEY", "admin-key"),
        ("JWT_SECRET", "jwt-secret"),
        ("MOCK_WEBHOOK_SECRET", "whsec-local"),
    ];

    #[test]
    fn defaults_apply() {
        let cfg = load(&BASE).unwrap();
        assert_eq!(cfg.host, "0.0.0.0");
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.db_max_connections, 10);
        assert_eq!(cfg.currency, "EUR");
        assert_eq!(cfg.shipping_flat_rate, BigDecimal::from_str("9.90").unwrap());
        assert_eq!(cfg.cart_ttl_hours, 72);
        assert_eq!(cfg.http_timeout, Duration::from_secs(30));
        assert!(cfg.payment.mock_enabled);
        assert_eq!(cfg.payment.mock_webhook_secret, "whsec-local");
        assert!(cfg.payment.payplug_secret_key.is_none());
        assert_eq!(cfg.garanzia3.mode, Garanzia3Mode::Mock);
    }

    #[test]
    fn required_variables_are_reported() {
        let err = load(&BASE[1..]).unwrap_err();
        assert_eq!(err, ConfigError::Missing("DATABASE_URL"));

        let err = load(&[BASE[0], BASE[1], ("JWT_SECRET", "  ")]).unwrap_err();
        assert_eq!(err, ConfigError::Missing("JWT_SECRET"));
    }

    #[test]
    fn mock_provider_needs_its_own_secret() {
        let err = load(&BASE[..3]).unwrap_err();
        assert_eq!(err, ConfigError::Missing("MOCK_WEBHOOK_SECRET"));

        let mut vars = BASE[..3].to_vec();
        vars.push(("PAYMENT_MOCK_ENABLED", "false"));
        let cfg = load(&vars).unwrap();
        assert!(!cfg.payment.mock_enabled);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let mut vars = BASE.to_vec();
        vars.push(("PORT", "eighty"));
        assert!(matches!(load(&vars), Err(ConfigError::Invalid { var: "PORT", .. })));

        let mut vars = BASE.to_vec();
        vars.push(("PAYMENT_MOCK_ENABLED", "maybe"));
        assert!(matches!(
            load(&vars),
            Err(ConfigError::Invalid { var: "PAYMENT_MOCK_ENABLED", .. })
        ));

        let mut vars = BASE.to_vec();
        vars.push(("SHIPPING_FLAT_RATE", "-1"));
        assert!(load(&vars).is_err());
    }

    #[test]
    fn live_warranty_mode_needs_endpoint_and_key() {
        let mut vars = BASE.to_vec();
        vars.push(("GARANZIA3_MODE", "live"));
        assert_eq!(load(&vars).unwrap_err(), ConfigError::Missing("GARANZIA3_BASE_URL"));

        vars.push(("GARANZIA3_BASE_URL", "https://api.garanzia3.example"));
        vars.push(("GARANZIA3_API_KEY", "k"));
        let cfg = load(&vars).unwrap();
        assert_eq!(cfg.garanzia3.mode, Garanzia3Mode::Live);
    }
}
