// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Activation options and their resolution into a [`RelayConfig`].
//!
//! Options come from the caller ([`RelayOptions`], deserializable from JSON
//! with camelCase keys) and from `DIAGNOSTIC_RELAY_*` environment variables.
//! Resolution never fails: malformed values are logged and ignored, numeric
//! values are rounded and clamped into their allowed range.

use std::collections::BTreeSet;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::{error, warn};

use crate::event::Severity;

pub mod pattern;

pub use pattern::NetworkPattern;

pub const DEFAULT_ENDPOINT: &str = "/__diagnostics";

pub const DEFAULT_BATCH_SIZE: u64 = 20;
pub const BATCH_SIZE_RANGE: (u64, u64) = (1, 500);

pub const DEFAULT_BATCH_DELAY_MS: u64 = 250;
pub const BATCH_DELAY_MS_RANGE: (u64, u64) = (0, 60_000);

pub const DEFAULT_NETWORK_BODY_LIMIT: u64 = 500;
pub const NETWORK_BODY_LIMIT_RANGE: (u64, u64) = (0, 100_000);

pub const DEFAULT_LOOP_THRESHOLD: u64 = 10;
pub const LOOP_THRESHOLD_RANGE: (u64, u64) = (2, 1000);

pub const DEFAULT_LOOP_WINDOW_MS: u64 = 2000;
pub const LOOP_WINDOW_MS_RANGE: (u64, u64) = (100, 60_000);

pub const DEFAULT_MAX_QUEUE_SIZE: u64 = 1000;
pub const MAX_QUEUE_SIZE_RANGE: (u64, u64) = (10, 10_000);

pub const DEFAULT_SEVERITIES: [Severity; 4] = [
    Severity::Trace,
    Severity::Info,
    Severity::Warning,
    Severity::Error,
];

const ENV_PREFIX: &str = "DIAGNOSTIC_RELAY_";

/// Caller supplied activation options. Every field is optional.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RelayOptions {
    #[serde(deserialize_with = "deserialize_optional_string")]
    pub endpoint: Option<String>,
    #[serde(deserialize_with = "deserialize_optional_number")]
    pub batch_size: Option<f64>,
    #[serde(deserialize_with = "deserialize_optional_number")]
    pub batch_delay_ms: Option<f64>,
    #[serde(deserialize_with = "deserialize_severities")]
    pub enabled_severities: Option<Vec<Severity>>,
    #[serde(deserialize_with = "deserialize_optional_bool_from_anything")]
    pub capture_network: Option<bool>,
    #[serde(deserialize_with = "deserialize_optional_bool_from_anything")]
    pub capture_errors: Option<bool>,
    #[serde(deserialize_with = "deserialize_optional_number")]
    pub network_body_limit: Option<f64>,
    #[serde(deserialize_with = "deserialize_string_list")]
    pub network_include_patterns: Option<Vec<String>>,
    #[serde(deserialize_with = "deserialize_string_list")]
    pub network_exclude_patterns: Option<Vec<String>>,
    #[serde(deserialize_with = "deserialize_optional_number")]
    pub loop_threshold: Option<f64>,
    #[serde(deserialize_with = "deserialize_optional_number")]
    pub loop_window_ms: Option<f64>,
    #[serde(deserialize_with = "deserialize_optional_number")]
    pub max_queue_size: Option<f64>,
}

impl RelayOptions {
    /// Reads `DIAGNOSTIC_RELAY_*` environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        RelayOptions {
            endpoint: env_string("ENDPOINT"),
            batch_size: env_number("BATCH_SIZE"),
            batch_delay_ms: env_number("BATCH_DELAY_MS"),
            enabled_severities: env_string("ENABLED_SEVERITIES")
                .map(|raw| parse_severities(raw.split(','))),
            capture_network: env_bool("CAPTURE_NETWORK"),
            capture_errors: env_bool("CAPTURE_ERRORS"),
            network_body_limit: env_number("NETWORK_BODY_LIMIT"),
            network_include_patterns: env_string("NETWORK_INCLUDE").map(|raw| split_list(&raw)),
            network_exclude_patterns: env_string("NETWORK_EXCLUDE").map(|raw| split_list(&raw)),
            loop_threshold: env_number("LOOP_THRESHOLD"),
            loop_window_ms: env_number("LOOP_WINDOW_MS"),
            max_queue_size: env_number("MAX_QUEUE_SIZE"),
        }
    }

    /// Fills every unset field from `fallback`. Values already set win.
    #[must_use]
    pub fn merge(self, fallback: RelayOptions) -> Self {
        RelayOptions {
            endpoint: self.endpoint.or(fallback.endpoint),
            batch_size: self.batch_size.or(fallback.batch_size),
            batch_delay_ms: self.batch_delay_ms.or(fallback.batch_delay_ms),
            enabled_severities: self.enabled_severities.or(fallback.enabled_severities),
            capture_network: self.capture_network.or(fallback.capture_network),
            capture_errors: self.capture_errors.or(fallback.capture_errors),
            network_body_limit: self.network_body_limit.or(fallback.network_body_limit),
            network_include_patterns: self
                .network_include_patterns
                .or(fallback.network_include_patterns),
            network_exclude_patterns: self
                .network_exclude_patterns
                .or(fallback.network_exclude_patterns),
            loop_threshold: self.loop_threshold.or(fallback.loop_threshold),
            loop_window_ms: self.loop_window_ms.or(fallback.loop_window_ms),
            max_queue_size: self.max_queue_size.or(fallback.max_queue_size),
        }
    }
}

/// Resolved configuration of one session. Never mutated after resolution.
#[derive(Clone, Debug, PartialEq)]
pub struct RelayConfig {
    pub endpoint: String,
    pub batch_size: usize,
    pub batch_delay: Duration,
    pub enabled_severities: BTreeSet<Severity>,
    pub capture_network: bool,
    pub capture_errors: bool,
    /// Maximum characters kept from a response body; 0 disables excerpts.
    pub network_body_limit: usize,
    pub network_include_patterns: Vec<NetworkPattern>,
    pub network_exclude_patterns: Vec<NetworkPattern>,
    pub loop_threshold: usize,
    pub loop_window: Duration,
    pub max_queue_size: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        RelayConfig::resolve(&RelayOptions::default())
    }
}

impl RelayConfig {
    #[must_use]
    pub fn resolve(options: &RelayOptions) -> Self {
        let endpoint = match options.endpoint.as_deref().map(str::trim) {
            Some(endpoint) if !endpoint.is_empty() => endpoint.to_string(),
            _ => DEFAULT_ENDPOINT.to_string(),
        };
        let enabled_severities = match &options.enabled_severities {
            Some(severities) => severities.iter().copied().collect(),
            None => DEFAULT_SEVERITIES.into_iter().collect(),
        };

        RelayConfig {
            endpoint,
            batch_size: clamp_usize(options.batch_size, DEFAULT_BATCH_SIZE, BATCH_SIZE_RANGE),
            batch_delay: Duration::from_millis(clamp_option(
                options.batch_delay_ms,
                DEFAULT_BATCH_DELAY_MS,
                BATCH_DELAY_MS_RANGE,
            )),
            enabled_severities,
            capture_network: options.capture_network.unwrap_or(true),
            capture_errors: options.capture_errors.unwrap_or(true),
            network_body_limit: clamp_usize(
                options.network_body_limit,
                DEFAULT_NETWORK_BODY_LIMIT,
                NETWORK_BODY_LIMIT_RANGE,
            ),
            network_include_patterns: pattern::parse_patterns(
                options.network_include_patterns.as_deref().unwrap_or_default(),
            ),
            network_exclude_patterns: pattern::parse_patterns(
                options.network_exclude_patterns.as_deref().unwrap_or_default(),
            ),
            loop_threshold: clamp_usize(
                options.loop_threshold,
                DEFAULT_LOOP_THRESHOLD,
                LOOP_THRESHOLD_RANGE,
            ),
            loop_window: Duration::from_millis(clamp_option(
                options.loop_window_ms,
                DEFAULT_LOOP_WINDOW_MS,
                LOOP_WINDOW_MS_RANGE,
            )),
            max_queue_size: clamp_usize(
                options.max_queue_size,
                DEFAULT_MAX_QUEUE_SIZE,
                MAX_QUEUE_SIZE_RANGE,
            ),
        }
    }

    #[must_use]
    pub fn severity_enabled(&self, severity: Severity) -> bool {
        self.enabled_severities.contains(&severity)
    }

    #[must_use]
    pub fn loop_window_ms(&self) -> u64 {
        u64::try_from(self.loop_window.as_millis()).unwrap_or(u64::MAX)
    }
}

/// Rounds and clamps `value`; missing or non-finite values yield `default`.
#[must_use]
pub fn clamp_option(value: Option<f64>, default: u64, (min, max): (u64, u64)) -> u64 {
    match value {
        Some(value) if value.is_finite() => {
            // the cast saturates, the clamp below bounds it
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let rounded = value.round().max(0.0) as u64;
            rounded.clamp(min, max)
        }
        _ => default,
    }
}

fn clamp_usize(value: Option<f64>, default: u64, range: (u64, u64)) -> usize {
    usize::try_from(clamp_option(value, default, range)).unwrap_or(usize::MAX)
}

fn env_string(name: &str) -> Option<String> {
    env::var(format!("{ENV_PREFIX}{name}"))
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_number(name: &str) -> Option<f64> {
    let raw = env_string(name)?;
    match raw.parse::<f64>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Failed to parse {ENV_PREFIX}{name}='{raw}' as a number, ignoring");
            None
        }
    }
}

fn env_bool(name: &str) -> Option<bool> {
    let raw = env_string(name)?;
    let parsed = parse_bool(&raw);
    if parsed.is_none() {
        warn!("Failed to parse {ENV_PREFIX}{name}='{raw}' as a boolean, ignoring");
    }
    parsed
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_severities<'a>(raw: impl Iterator<Item = &'a str>) -> Vec<Severity> {
    let mut severities = Vec::new();
    for item in raw.map(str::trim).filter(|item| !item.is_empty()) {
        match Severity::from_str(item) {
            Ok(severity) if !severities.contains(&severity) => severities.push(severity),
            Ok(_) => {}
            Err(e) => error!("{e}, ignoring"),
        }
    }
    severities
}

pub fn deserialize_optional_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(other) => {
            error!("Failed to parse value, expected a string, got: {other}, ignoring");
            Ok(None)
        }
    }
}

/// Accepts numbers and numeric strings.
pub fn deserialize_optional_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Value::Number(n)) => Ok(n.as_f64()),
        Some(Value::String(s)) => match s.trim().parse::<f64>() {
            Ok(value) => Ok(Some(value)),
            Err(_) => {
                error!("Failed to parse '{s}' as a number, ignoring");
                Ok(None)
            }
        },
        Some(other) => {
            error!("Failed to parse value, expected a number, got: {other}, ignoring");
            Ok(None)
        }
    }
}

pub fn deserialize_optional_bool_from_anything<'de, D>(
    deserializer: D,
) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let parsed = match Option::<Value>::deserialize(deserializer)? {
        None => return Ok(None),
        Some(Value::Bool(b)) => Some(b),
        Some(Value::String(s)) => parse_bool(&s),
        Some(Value::Number(n)) => n.as_f64().map(|n| n != 0.0),
        Some(_) => None,
    };
    if parsed.is_none() {
        error!("Failed to parse bool value, ignoring");
    }
    Ok(parsed)
}

/// Accepts a list of strings or a comma separated string.
pub fn deserialize_string_list<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(split_list(&s))),
        Some(Value::Array(items)) => Ok(Some(
            items
                .into_iter()
                .filter_map(|item| match item {
                    Value::String(s) => Some(s),
                    other => {
                        error!("Failed to parse list entry, expected a string, got: {other}, ignoring");
                        None
                    }
                })
                .collect(),
        )),
        Some(other) => {
            error!("Failed to parse value, expected a list, got: {other}, ignoring");
            Ok(None)
        }
    }
}

/// Accepts a list of severity names or a comma separated string. Unknown
/// names are dropped.
pub fn deserialize_severities<'de, D>(deserializer: D) -> Result<Option<Vec<Severity>>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(deserialize_string_list(deserializer)?
        .map(|names| parse_severities(names.iter().map(String::as_str))))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;
    use serial_test::serial;

    #[test]
    fn test_defaults() {
        let config = RelayConfig::default();
        assert_eq!(config.endpoint, "/__diagnostics");
        assert_eq!(config.batch_size, 20);
        assert_eq!(config.batch_delay, Duration::from_millis(250));
        assert!(config.severity_enabled(Severity::Info));
        assert!(!config.severity_enabled(Severity::Network));
        assert!(config.capture_network);
        assert!(config.capture_errors);
        assert_eq!(config.network_body_limit, 500);
        assert_eq!(config.loop_threshold, 10);
        assert_eq!(config.loop_window_ms(), 2000);
        assert_eq!(config.max_queue_size, 1000);
    }

    #[test]
    fn test_clamping() {
        let config = RelayConfig::resolve(&RelayOptions {
            loop_threshold: Some(1.0),
            loop_window_ms: Some(10.0),
            max_queue_size: Some(1_000_000.0),
            batch_size: Some(-5.0),
            batch_delay_ms: Some(f64::NAN),
            network_body_limit: Some(f64::INFINITY),
            ..Default::default()
        });
        assert_eq!(config.loop_threshold, 2);
        assert_eq!(config.loop_window_ms(), 100);
        assert_eq!(config.max_queue_size, 10_000);
        assert_eq!(config.batch_size, 1);
        assert_eq!(config.batch_delay, Duration::from_millis(250));
        assert_eq!(config.network_body_limit, 500);
    }

    #[test]
    fn test_rounding() {
        let config = RelayConfig::resolve(&RelayOptions {
            batch_size: Some(2.6),
            ..Default::default()
        });
        assert_eq!(config.batch_size, 3);
    }

    #[test]
    fn test_empty_endpoint_falls_back() {
        let config = RelayConfig::resolve(&RelayOptions {
            endpoint: Some("  ".to_string()),
            ..Default::default()
        });
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
    }

    #[test]
    fn test_deserialize_camel_case_lenient() {
        let options: RelayOptions = serde_json::from_value(json!({
            "endpoint": "/collect",
            "batchSize": "5",
            "batchDelayMs": 100,
            "enabledSeverities": ["error", "bogus", "warn"],
            "captureNetwork": "false",
            "captureErrors": 1,
            "networkExcludePatterns": "analytics, /health/",
            "loopThreshold": {"nested": true},
        }))
        .unwrap();

        assert_eq!(options.endpoint.as_deref(), Some("/collect"));
        assert_eq!(options.batch_size, Some(5.0));
        assert_eq!(options.batch_delay_ms, Some(100.0));
        assert_eq!(
            options.enabled_severities,
            Some(vec![Severity::Error, Severity::Warning])
        );
        assert_eq!(options.capture_network, Some(false));
        assert_eq!(options.capture_errors, Some(true));
        assert_eq!(
            options.network_exclude_patterns,
            Some(vec!["analytics".to_string(), "/health/".to_string()])
        );
        assert_eq!(options.loop_threshold, None);
        assert_eq!(options.max_queue_size, None);
    }

    #[test]
    fn test_explicit_empty_severities_disable_console() {
        let config = RelayConfig::resolve(&RelayOptions {
            enabled_severities: Some(vec![]),
            ..Default::default()
        });
        assert!(config.enabled_severities.is_empty());
    }

    #[test]
    fn test_merge_prefers_explicit_values() {
        let explicit = RelayOptions {
            batch_size: Some(3.0),
            ..Default::default()
        };
        let fallback = RelayOptions {
            batch_size: Some(50.0),
            loop_threshold: Some(4.0),
            ..Default::default()
        };
        let merged = explicit.merge(fallback);
        assert_eq!(merged.batch_size, Some(3.0));
        assert_eq!(merged.loop_threshold, Some(4.0));
    }

    #[test]
    #[serial]
    fn test_from_env() {
        env::set_var("DIAGNOSTIC_RELAY_ENDPOINT", "/env-endpoint");
        env::set_var("DIAGNOSTIC_RELAY_BATCH_SIZE", "7");
        env::set_var("DIAGNOSTIC_RELAY_CAPTURE_NETWORK", "off");
        env::set_var("DIAGNOSTIC_RELAY_ENABLED_SEVERITIES", "error,warning");
        env::set_var("DIAGNOSTIC_RELAY_LOOP_WINDOW_MS", "not-a-number");
        env::set_var("DIAGNOSTIC_RELAY_NETWORK_INCLUDE", "/api/,graphql");

        let options = RelayOptions::from_env();

        env::remove_var("DIAGNOSTIC_RELAY_ENDPOINT");
        env::remove_var("DIAGNOSTIC_RELAY_BATCH_SIZE");
        env::remove_var("DIAGNOSTIC_RELAY_CAPTURE_NETWORK");
        env::remove_var("DIAGNOSTIC_RELAY_ENABLED_SEVERITIES");
        env::remove_var("DIAGNOSTIC_RELAY_LOOP_WINDOW_MS");
        env::remove_var("DIAGNOSTIC_RELAY_NETWORK_INCLUDE");

        assert_eq!(options.endpoint.as_deref(), Some("/env-endpoint"));
        assert_eq!(options.batch_size, Some(7.0));
        assert_eq!(options.capture_network, Some(false));
        assert_eq!(
            options.enabled_severities,
            Some(vec![Severity::Error, Severity::Warning])
        );
        assert_eq!(options.loop_window_ms, None);
        assert_eq!(
            options.network_include_patterns,
            Some(vec!["/api/".to_string(), "graphql".to_string()])
        );
    }

    #[test]
    #[serial]
    fn test_from_env_unset() {
        env::remove_var("DIAGNOSTIC_RELAY_BATCH_SIZE");
        let options = RelayOptions::from_env();
        assert_eq!(options.batch_size, None);
    }

    proptest! {
        #[test]
        fn prop_clamped_values_stay_in_range(value in proptest::num::f64::ANY) {
            let config = RelayConfig::resolve(&RelayOptions {
                loop_threshold: Some(value),
                loop_window_ms: Some(value),
                max_queue_size: Some(value),
                batch_size: Some(value),
                ..Default::default()
            });
            prop_assert!((2..=1000).contains(&config.loop_threshold));
            prop_assert!((100..=60_000).contains(&config.loop_window_ms()));
            prop_assert!((10..=10_000).contains(&config.max_queue_size));
            prop_assert!((1..=500).contains(&config.batch_size));
        }

        #[test]
        fn prop_in_range_integers_are_kept(value in 2u64..=1000) {
            #[allow(clippy::cast_precision_loss)]
            let config = RelayConfig::resolve(&RelayOptions {
                loop_threshold: Some(value as f64),
                ..Default::default()
            });
            prop_assert_eq!(config.loop_threshold, usize::try_from(value).unwrap());
        }
    }
}
