// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::env;

use crate::error::CollectorError;

pub const DEFAULT_PORT: u16 = 7357;
pub const DEFAULT_PATH: &str = diagnostic_relay::config::DEFAULT_ENDPOINT;
pub const DEFAULT_LOG_LEVEL: &str = "info";
pub const DEVELOPMENT_ENV: &str = "development";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CollectorConfig {
    pub port: u16,
    /// Path deliveries are posted to.
    pub path: String,
    /// Outside development every request is refused.
    pub development: bool,
    pub log_level: String,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        CollectorConfig {
            port: DEFAULT_PORT,
            path: DEFAULT_PATH.to_string(),
            development: true,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl CollectorConfig {
    /// Reads `DIAGNOSTIC_COLLECTOR_*` variables on top of the defaults.
    pub fn from_env() -> Result<CollectorConfig, CollectorError> {
        let port = match env::var("DIAGNOSTIC_COLLECTOR_PORT") {
            Ok(raw) => raw.trim().parse::<u16>().map_err(|_| {
                CollectorError::InvalidConfig(format!(
                    "DIAGNOSTIC_COLLECTOR_PORT must be a port number, got '{raw}'"
                ))
            })?,
            Err(_) => DEFAULT_PORT,
        };
        let path = env::var("DIAGNOSTIC_COLLECTOR_PATH")
            .map(|path| path.trim().to_string())
            .unwrap_or_else(|_| DEFAULT_PATH.to_string());
        let development = env::var("DIAGNOSTIC_COLLECTOR_ENV")
            .map(|val| val.trim().eq_ignore_ascii_case(DEVELOPMENT_ENV))
            .unwrap_or(true);
        let log_level = env::var("DIAGNOSTIC_COLLECTOR_LOG_LEVEL")
            .map(|val| val.to_lowercase())
            .unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string());

        let config = CollectorConfig {
            port,
            path,
            development,
            log_level,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), CollectorError> {
        if !self.path.starts_with('/') {
            return Err(CollectorError::InvalidConfig(format!(
                "path must start with '/', got '{}'",
                self.path
            )));
        }
        if self.path.contains(['?', '#']) {
            return Err(CollectorError::InvalidConfig(format!(
                "path must not carry a query or fragment, got '{}'",
                self.path
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: [&str; 4] = [
        "DIAGNOSTIC_COLLECTOR_PORT",
        "DIAGNOSTIC_COLLECTOR_PATH",
        "DIAGNOSTIC_COLLECTOR_ENV",
        "DIAGNOSTIC_COLLECTOR_LOG_LEVEL",
    ];

    fn clear_env() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_defaults() {
        clear_env();
        let config = CollectorConfig::from_env().unwrap();
        assert_eq!(config, CollectorConfig::default());
        assert_eq!(config.path, "/__diagnostics");
    }

    #[test]
    #[serial]
    fn test_reads_env() {
        clear_env();
        env::set_var("DIAGNOSTIC_COLLECTOR_PORT", "9000");
        env::set_var("DIAGNOSTIC_COLLECTOR_PATH", "/debug/events");
        env::set_var("DIAGNOSTIC_COLLECTOR_ENV", "production");
        env::set_var("DIAGNOSTIC_COLLECTOR_LOG_LEVEL", "DEBUG");
        let config = CollectorConfig::from_env().unwrap();
        clear_env();

        assert_eq!(config.port, 9000);
        assert_eq!(config.path, "/debug/events");
        assert!(!config.development);
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    #[serial]
    fn test_invalid_port() {
        clear_env();
        env::set_var("DIAGNOSTIC_COLLECTOR_PORT", "seventy");
        let result = CollectorConfig::from_env();
        clear_env();
        assert!(matches!(result, Err(CollectorError::InvalidConfig(_))));
    }

    #[test]
    fn test_validate_path() {
        let mut config = CollectorConfig::default();
        assert!(config.validate().is_ok());

        config.path = "__diagnostics".to_string();
        assert!(config.validate().is_err());

        config.path = "/__diagnostics?x=1".to_string();
        assert!(config.validate().is_err());
    }
}
