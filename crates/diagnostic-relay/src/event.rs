// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Normalized diagnostic events.
//!
//! Every capture path (console, network, uncaught errors) produces an [`Event`].
//! Events are built once through the constructors below and never mutated
//! afterwards: they are either dropped by the loop detector or queued for
//! delivery exactly once.
//!
//! # Wire format
//!
//! Events serialize to JSON with camelCase field names. Optional fields are
//! omitted when absent:
//!
//! ```json
//! {
//!   "kind": "network-call",
//!   "severity": "warning",
//!   "payload": ["GET http://localhost:3000/api/user 404 (12ms)"],
//!   "timestamp": "2024-05-01T10:00:00.123Z",
//!   "originUrl": "http://localhost:3000/",
//!   "method": "GET",
//!   "targetUrl": "http://localhost:3000/api/user",
//!   "statusCode": 404,
//!   "durationMs": 12,
//!   "transportKind": "fetch"
//! }
//! ```

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Maximum number of characters kept from a stack trace.
pub const MAX_STACK_EXCERPT_CHARS: usize = 1000;

/// Maximum number of characters of the first payload element used as a loop key.
pub const MAX_IDENTITY_KEY_CHARS: usize = 200;

/// Which capture path produced an event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    StructuredLog,
    NetworkCall,
    UncaughtError,
}

/// Event severity.
///
/// `Network` is reserved for healthy network calls; failing calls are
/// escalated to `Warning` or `Error` (see [`Severity::for_status`]).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Trace,
    Info,
    Warning,
    Error,
    Network,
}

impl Severity {
    pub const ALL: [Severity; 5] = [
        Severity::Trace,
        Severity::Info,
        Severity::Warning,
        Severity::Error,
        Severity::Network,
    ];

    /// Derives the severity of a network call from its status code.
    ///
    /// Status 0 is reserved for transport failures.
    #[must_use]
    pub fn for_status(status: u16) -> Self {
        match status {
            0 | 500.. => Severity::Error,
            400..=499 => Severity::Warning,
            _ => Severity::Network,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Trace => "trace",
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Network => "network",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "trace" | "debug" => Ok(Severity::Trace),
            "info" | "log" => Ok(Severity::Info),
            "warning" | "warn" => Ok(Severity::Warning),
            "error" => Ok(Severity::Error),
            "network" => Ok(Severity::Network),
            _ => Err(format!(
                "Invalid severity: '{s}'. Valid severities are: trace, info, warning, error, network"
            )),
        }
    }
}

/// The network primitive that observed a call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Fetch,
    Xhr,
}

/// Outcome of an observed network call, as handed over by the network wrappers.
#[derive(Clone, Debug, PartialEq)]
pub struct NetworkObservation {
    pub method: String,
    pub target_url: String,
    /// 0 when the call failed before a response was received.
    pub status: u16,
    pub duration_ms: u64,
    pub transport: TransportKind,
    pub response_excerpt: Option<String>,
    /// Transport failure message, if any.
    pub failure: Option<String>,
}

/// One captured occurrence.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub kind: EventKind,
    pub severity: Severity,
    #[serde(default)]
    pub payload: Vec<Value>,
    pub timestamp: DateTime<Utc>,
    pub origin_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_excerpt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transport_kind: Option<TransportKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_excerpt: Option<String>,
}

impl Event {
    fn base(kind: EventKind, severity: Severity, payload: Vec<Value>, origin_url: &str) -> Self {
        Event {
            kind,
            severity,
            payload,
            timestamp: Utc::now(),
            origin_url: origin_url.to_string(),
            stack_excerpt: None,
            method: None,
            target_url: None,
            status_code: None,
            duration_ms: None,
            transport_kind: None,
            response_excerpt: None,
        }
    }

    /// Builds a structured-log event from console arguments.
    #[must_use]
    pub fn structured_log(
        severity: Severity,
        payload: Vec<Value>,
        stack: Option<&str>,
        origin_url: &str,
    ) -> Self {
        let mut event = Self::base(EventKind::StructuredLog, severity, payload, origin_url);
        event.stack_excerpt = stack.map(truncate_stack);
        event
    }

    /// Builds the event for an uncaught error or unhandled rejection.
    #[must_use]
    pub fn uncaught_error(message: &str, stack: Option<&str>, origin_url: &str) -> Self {
        let mut event = Self::base(
            EventKind::UncaughtError,
            Severity::Error,
            vec![Value::String(message.to_string())],
            origin_url,
        );
        event.stack_excerpt = stack.map(truncate_stack);
        event
    }

    /// Builds a network-call event. Severity is derived from the status code.
    #[must_use]
    pub fn network_call(observation: NetworkObservation, origin_url: &str) -> Self {
        let NetworkObservation {
            method,
            target_url,
            status,
            duration_ms,
            transport,
            response_excerpt,
            failure,
        } = observation;

        let summary = match &failure {
            Some(reason) => format!("{method} {target_url} failed: {reason} ({duration_ms}ms)"),
            None => format!("{method} {target_url} {status} ({duration_ms}ms)"),
        };

        let mut event = Self::base(
            EventKind::NetworkCall,
            Severity::for_status(status),
            vec![Value::String(summary)],
            origin_url,
        );
        event.method = Some(method);
        event.target_url = Some(target_url);
        event.status_code = Some(status);
        event.duration_ms = Some(duration_ms);
        event.transport_kind = Some(transport);
        event.response_excerpt = response_excerpt;
        event
    }

    /// Builds the one-off warning emitted when a loop starts being suppressed.
    #[must_use]
    pub fn loop_detected(key: &str, count: usize, window_ms: u64, origin_url: &str) -> Self {
        let message = format!(
            "LOOP DETECTED: \"{key}\" repeated {count} times within {window_ms}ms, suppressing further occurrences"
        );
        Self::base(
            EventKind::StructuredLog,
            Severity::Warning,
            vec![Value::String(message)],
            origin_url,
        )
    }

    /// Key used by the loop detector to decide whether two events are "the same".
    ///
    /// Network events are keyed on method, URL and severity so that a URL
    /// polled successfully does not mask a later failure on the same URL.
    #[must_use]
    pub fn identity_key(&self) -> String {
        if self.kind == EventKind::NetworkCall {
            return format!(
                "{} {} {}",
                self.method.as_deref().unwrap_or_default(),
                self.target_url.as_deref().unwrap_or_default(),
                self.severity
            );
        }
        match self.payload.first() {
            Some(first) => truncate_chars(&stringify_value(first), MAX_IDENTITY_KEY_CHARS),
            None => String::new(),
        }
    }

    /// Human readable message: the payload elements joined by spaces.
    #[must_use]
    pub fn message(&self) -> String {
        self.payload
            .iter()
            .map(stringify_value)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Strings render raw, everything else as compact JSON.
#[must_use]
pub fn stringify_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Truncates to at most `max` characters, respecting char boundaries.
#[must_use]
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

fn truncate_stack(stack: &str) -> String {
    truncate_chars(stack, MAX_STACK_EXCERPT_CHARS)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn observation(status: u16) -> NetworkObservation {
        NetworkObservation {
            method: "GET".to_string(),
            target_url: "http://localhost:3000/api".to_string(),
            status,
            duration_ms: 12,
            transport: TransportKind::Fetch,
            response_excerpt: None,
            failure: None,
        }
    }

    #[test]
    fn test_severity_for_status() {
        assert_eq!(Severity::for_status(0), Severity::Error);
        assert_eq!(Severity::for_status(200), Severity::Network);
        assert_eq!(Severity::for_status(304), Severity::Network);
        assert_eq!(Severity::for_status(400), Severity::Warning);
        assert_eq!(Severity::for_status(404), Severity::Warning);
        assert_eq!(Severity::for_status(499), Severity::Warning);
        assert_eq!(Severity::for_status(500), Severity::Error);
        assert_eq!(Severity::for_status(503), Severity::Error);
    }

    #[test]
    fn test_network_event_escalation() {
        assert_eq!(
            Event::network_call(observation(503), "o").severity,
            Severity::Error
        );
        assert_eq!(
            Event::network_call(observation(404), "o").severity,
            Severity::Warning
        );
        assert_eq!(
            Event::network_call(observation(200), "o").severity,
            Severity::Network
        );
    }

    #[test]
    fn test_severity_from_str() {
        assert_eq!(Severity::from_str("WARN").unwrap(), Severity::Warning);
        assert_eq!(Severity::from_str(" error ").unwrap(), Severity::Error);
        assert_eq!(Severity::from_str("debug").unwrap(), Severity::Trace);
        assert!(Severity::from_str("fatal").is_err());
    }

    #[test]
    fn test_stack_excerpt_truncated() {
        let stack = "x".repeat(MAX_STACK_EXCERPT_CHARS + 50);
        let event = Event::uncaught_error("boom", Some(&stack), "o");
        assert_eq!(
            event.stack_excerpt.unwrap().chars().count(),
            MAX_STACK_EXCERPT_CHARS
        );
    }

    #[test]
    fn test_truncate_chars_multibyte() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("hi", 10), "hi");
    }

    #[test]
    fn test_identity_key_log() {
        let event = Event::structured_log(
            Severity::Info,
            vec![json!("retrying"), json!({"attempt": 3})],
            None,
            "o",
        );
        assert_eq!(event.identity_key(), "retrying");

        let event = Event::structured_log(Severity::Info, vec![json!({"a": 1})], None, "o");
        assert_eq!(event.identity_key(), r#"{"a":1}"#);

        let long = "y".repeat(500);
        let event = Event::structured_log(Severity::Info, vec![json!(long)], None, "o");
        assert_eq!(event.identity_key().len(), MAX_IDENTITY_KEY_CHARS);

        let event = Event::structured_log(Severity::Info, vec![], None, "o");
        assert_eq!(event.identity_key(), "");
    }

    #[test]
    fn test_identity_key_network_includes_severity() {
        let ok = Event::network_call(observation(200), "o");
        let failing = Event::network_call(observation(500), "o");
        assert_eq!(ok.identity_key(), "GET http://localhost:3000/api network");
        assert_ne!(ok.identity_key(), failing.identity_key());
    }

    #[test]
    fn test_wire_format() {
        let event = Event::network_call(observation(404), "http://localhost:3000/");
        let value = serde_json::to_value(&event).unwrap();

        assert_eq!(value["kind"], "network-call");
        assert_eq!(value["severity"], "warning");
        assert_eq!(value["originUrl"], "http://localhost:3000/");
        assert_eq!(value["statusCode"], 404);
        assert_eq!(value["durationMs"], 12);
        assert_eq!(value["transportKind"], "fetch");
        assert!(value.get("stackExcerpt").is_none());
        assert!(value.get("responseExcerpt").is_none());
        assert_eq!(
            value["payload"][0],
            "GET http://localhost:3000/api 404 (12ms)"
        );
    }

    #[test]
    fn test_failed_call_summary() {
        let mut obs = observation(0);
        obs.failure = Some("connection refused".to_string());
        let event = Event::network_call(obs, "o");
        assert_eq!(event.severity, Severity::Error);
        assert_eq!(
            event.message(),
            "GET http://localhost:3000/api failed: connection refused (12ms)"
        );
    }

    #[test]
    fn test_loop_detected_message() {
        let event = Event::loop_detected("tick", 5, 1000, "o");
        assert_eq!(event.severity, Severity::Warning);
        assert_eq!(event.kind, EventKind::StructuredLog);
        assert!(event.message().starts_with("LOOP DETECTED: \"tick\" repeated 5 times"));
    }

    #[test]
    fn test_deserialize_roundtrip_shape() {
        let raw = json!({
            "kind": "structured-log",
            "severity": "info",
            "payload": ["hello", 1],
            "timestamp": "2024-05-01T10:00:00.123Z",
            "originUrl": "http://localhost/"
        });
        let event: Event = serde_json::from_value(raw).unwrap();
        assert_eq!(event.kind, EventKind::StructuredLog);
        assert_eq!(event.message(), "hello 1");
        assert!(event.method.is_none());
    }
}
