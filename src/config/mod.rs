//! Application configuration module
//!
//! This module provides type-safe configuration loading from environment variables
//! using the `config` and `dotenvy` crates. Configuration is loaded with the
//! `PAYMENT_CONFIRMATION` prefix and nested values use double underscores as separators.
//!
//! # Example
//!
//! ```no_run
//! use payment_confirmation::config::{AppConfig, RobokassaSettings};
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//!
//! let settings = RobokassaSettings::from_config(&config.robokassa);
//! assert!(settings.is_operational());
//! ```

mod database;
mod error;
mod features;
mod robokassa;
mod telemetry;

pub use database::DatabaseConfig;
pub use error::{ConfigError, ValidationError};
pub use features::FeatureFlags;
pub use robokassa::{RobokassaConfig, RobokassaSettings};
pub use telemetry::TelemetryConfig;

use serde::Deserialize;

/// Root configuration for the payment confirmation service.
///
/// Load using [`AppConfig::load()`] which reads from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Database configuration (PostgreSQL connection)
    pub database: DatabaseConfig,

    /// Payment gateway credentials
    pub robokassa: RobokassaConfig,

    /// Feature flags
    #[serde(default)]
    pub features: FeatureFlags,

    /// Logging
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// This function:
    /// 1. Loads `.env` file if present (for development)
    /// 2. Reads environment variables with `PAYMENT_CONFIRMATION` prefix
    /// 3. Uses `__` (double underscore) to separate nested values
    /// 4. Deserializes into typed configuration structs
    ///
    /// # Environment Variable Format
    ///
    /// - `PAYMENT_CONFIRMATION__DATABASE__URL=...` -> `database.url = ...`
    /// - `PAYMENT_CONFIRMATION__ROBOKASSA__TEST_MODE=true` -> `robokassa.test_mode = true`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Required environment variables are missing
    /// - Values cannot be parsed into expected types
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present (development)
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::with_prefix("PAYMENT_CONFIRMATION")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Validate all configuration values
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if any configuration value is invalid.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.database.validate()?;
        self.robokassa.validate()?;
        self.telemetry.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // Mutex to ensure tests don't run in parallel (env vars are global)
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    const VARS: &[(&str, &str)] = &[
        ("PAYMENT_CONFIRMATION__DATABASE__URL", "postgresql://test@localhost/test"),
        ("PAYMENT_CONFIRMATION__ROBOKASSA__MERCHANT_LOGIN", "demo-shop"),
        ("PAYMENT_CONFIRMATION__ROBOKASSA__PASSWORD1", "first"),
        ("PAYMENT_CONFIRMATION__ROBOKASSA__PASSWORD2", "second"),
    ];

    fn set_minimal_env() {
        for (key, value) in VARS {
            env::set_var(key, value);
        }
    }

    fn clear_env() {
        for (key, _) in VARS {
            env::remove_var(key);
        }
        env::remove_var("PAYMENT_CONFIRMATION__ROBOKASSA__TEST_MODE");
        env::remove_var("PAYMENT_CONFIRMATION__ROBOKASSA__HASH_ALGORITHM");
    }

    #[test]
    fn test_load_from_environment() {
        let _guard = ENV_MUTEX.lock().unwrap();
        set_minimal_env();
        let result = AppConfig::load();
        clear_env();

        assert!(result.is_ok(), "Failed to load config: {:?}", result.err());
        let config = result.unwrap();
        assert_eq!(config.database.url, "postgresql://test@localhost/test");
        assert_eq!(config.robokassa.merchant_login, "demo-shop");
        assert!(!config.robokassa.test_mode);
        assert_eq!(config.robokassa.hash_algorithm, "md5");
        assert!(config.features.allow_uncorrelated_legacy_payments);
    }

    #[test]
    fn test_validate_full_config() {
        let _guard = ENV_MUTEX.lock().unwrap();
        set_minimal_env();
        let result = AppConfig::load();
        clear_env();

        assert!(result.unwrap().validate().is_ok());
    }

    #[test]
    fn test_overrides_from_environment() {
        let _guard = ENV_MUTEX.lock().unwrap();
        set_minimal_env();
        env::set_var("PAYMENT_CONFIRMATION__ROBOKASSA__TEST_MODE", "true");
        env::set_var("PAYMENT_CONFIRMATION__ROBOKASSA__HASH_ALGORITHM", "sha256");
        let result = AppConfig::load();
        clear_env();

        let config = result.unwrap();
        assert!(config.robokassa.test_mode);
        let settings = RobokassaSettings::from_config(&config.robokassa);
        assert!(settings.credentials().unwrap().test_mode());
    }

    #[test]
    fn test_missing_credentials_fail_to_load() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();
        env::set_var("PAYMENT_CONFIRMATION__DATABASE__URL", "postgresql://test@localhost/test");
        let result = AppConfig::load();
        clear_env();

        assert!(result.is_err());
    }
}
