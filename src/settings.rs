//! Runtime settings.
//!
//! Defaults are overridden by an optional `negotiation.toml` in the working
//! directory, then by environment variables prefixed with `NEGOTIATION_`
//! (nested fields separated using `__`), e.g. `NEGOTIATION_LOCK_TIMEOUT_MS=500`.
use super::error::ValidationError;
use super::money::{Currency, DEFAULT_CURRENCY};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Directory of the sled database.
    pub db_path: String,
    /// Longest a request waits for an order or offer lock before giving up.
    pub lock_timeout_ms: u64,
    /// Currency assumed when a money payload leaves it out.
    pub default_currency: String,
    pub log_filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            db_path: "negotiation.db".to_string(),
            lock_timeout_ms: 2_000,
            default_currency: DEFAULT_CURRENCY.to_string(),
            log_filter: "info".to_string(),
        }
    }
}

impl Settings {
    /// Load settings from defaults, `negotiation.toml` (optional), and environment.
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from(None)
    }

    // `env` replaces the process environment when given
    fn load_from(env: Option<config::Map<String, String>>) -> Result<Self, config::ConfigError> {
        let defaults = Settings::default();
        let config = config::Config::builder()
            .set_default("db_path", defaults.db_path)?
            .set_default("lock_timeout_ms", defaults.lock_timeout_ms as i64)?
            .set_default("default_currency", defaults.default_currency)?
            .set_default("log_filter", defaults.log_filter)?
            .add_source(config::File::with_name("negotiation").required(false))
            .add_source(
                config::Environment::with_prefix("NEGOTIATION")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .source(env),
            )
            .build()?;

        config.try_deserialize()
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn default_currency(&self) -> Result<Currency, ValidationError> {
        Currency::new(&self.default_currency)
    }
}
