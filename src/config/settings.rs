//! Application settings loaded from a TOML file.
//!
//! Everything has a default, so a missing file is not an error. Values that are present but
//! out of range fall back to their defaults with a warning rather than failing startup.

use crate::errors::{Error, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

/// Default number of days after purchase during which a receipt earns cashback.
pub const DEFAULT_RECEIPT_VALID_DAYS: i64 = 5;
/// Ticket lookup endpoint of the fiscal data operator.
pub const DEFAULT_FISCAL_ENDPOINT: &str = "https://consumer.oofd.kz/api/tickets/get-by-url";
/// Upper bound for one fiscal ticket lookup.
pub const DEFAULT_FISCAL_TIMEOUT_SECS: u64 = 10;

/// Configuration structure representing the entire settings file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    /// Promotion rules
    #[serde(default)]
    pub promo: PromoConfig,
    /// Fiscal ticket service
    #[serde(default)]
    pub fiscal: FiscalApiConfig,
}

/// Promotion rules
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PromoConfig {
    /// Raw configured validity window; read it through [`PromoConfig::receipt_valid_days`]
    pub receipt_valid_days: Option<i64>,
}

impl PromoConfig {
    /// Validity window in days. Non-positive values fall back to the default.
    #[must_use]
    pub fn receipt_valid_days(&self) -> i64 {
        match self.receipt_valid_days {
            Some(days) if days > 0 => days,
            Some(days) => {
                warn!(
                    "Invalid receipt_valid_days value: {}. Using default of {} days.",
                    days, DEFAULT_RECEIPT_VALID_DAYS
                );
                DEFAULT_RECEIPT_VALID_DAYS
            }
            None => DEFAULT_RECEIPT_VALID_DAYS,
        }
    }
}

/// Fiscal ticket service settings
#[derive(Debug, Clone, Deserialize)]
pub struct FiscalApiConfig {
    /// Ticket lookup URL without query string
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for FiscalApiConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl FiscalApiConfig {
    /// Request timeout; zero falls back to the default.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        if self.timeout_secs == 0 {
            warn!(
                "Invalid fiscal timeout_secs value: 0. Using default of {} seconds.",
                DEFAULT_FISCAL_TIMEOUT_SECS
            );
            return Duration::from_secs(DEFAULT_FISCAL_TIMEOUT_SECS);
        }
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_endpoint() -> String {
    DEFAULT_FISCAL_ENDPOINT.to_string()
}

const fn default_timeout_secs() -> u64 {
    DEFAULT_FISCAL_TIMEOUT_SECS
}

/// Parses settings from TOML text.
pub fn parse_settings(contents: &str) -> Result<Settings> {
    toml::from_str(contents).map_err(|e| Error::Config {
        message: format!("Failed to parse settings: {e}"),
    })
}

/// Loads settings from a TOML file. A missing file yields the defaults.
///
/// # Errors
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_settings<P: AsRef<Path>>(path: P) -> Result<Settings> {
    let path = path.as_ref();
    if !path.exists() {
        warn!("Settings file {:?} not found, using defaults", path);
        return Ok(Settings::default());
    }
    let contents = std::fs::read_to_string(path).map_err(|e| Error::Config {
        message: format!("Failed to read settings file {path:?}: {e}"),
    })?;
    parse_settings(&contents)
}

/// Loads settings from the file named by `APP_CONFIG`, or `./config.toml`.
pub fn load_default_settings() -> Result<Settings> {
    let path = std::env::var("APP_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
    load_settings(path)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn test_parse_settings() {
        let toml_str = r#"
            [promo]
            receipt_valid_days = 7

            [fiscal]
            endpoint = "http://127.0.0.1:9000/api/tickets/get-by-url"
            timeout_secs = 3
        "#;

        let settings = parse_settings(toml_str).unwrap();
        assert_eq!(settings.promo.receipt_valid_days(), 7);
        assert_eq!(
            settings.fiscal.endpoint,
            "http://127.0.0.1:9000/api/tickets/get-by-url"
        );
        assert_eq!(settings.fiscal.timeout(), Duration::from_secs(3));
    }

    #[test]
    fn test_empty_settings_use_defaults() {
        let settings = parse_settings("").unwrap();
        assert_eq!(settings.promo.receipt_valid_days(), DEFAULT_RECEIPT_VALID_DAYS);
        assert_eq!(settings.fiscal.endpoint, DEFAULT_FISCAL_ENDPOINT);
        assert_eq!(
            settings.fiscal.timeout(),
            Duration::from_secs(DEFAULT_FISCAL_TIMEOUT_SECS)
        );
    }

    #[test]
    fn test_invalid_valid_days_fall_back() {
        let zero = parse_settings("[promo]\nreceipt_valid_days = 0").unwrap();
        assert_eq!(zero.promo.receipt_valid_days(), DEFAULT_RECEIPT_VALID_DAYS);

        let negative = parse_settings("[promo]\nreceipt_valid_days = -3").unwrap();
        assert_eq!(negative.promo.receipt_valid_days(), DEFAULT_RECEIPT_VALID_DAYS);
    }

    #[test]
    fn test_malformed_settings_is_config_error() {
        let result = parse_settings("[promo]\nreceipt_valid_days = \"five\"");
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let settings = load_settings("/nonexistent/receipt-cashback.toml").unwrap();
        assert_eq!(settings.promo.receipt_valid_days(), DEFAULT_RECEIPT_VALID_DAYS);
    }
}
