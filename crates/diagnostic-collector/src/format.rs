// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Human readable rendering of received events.
//!
//! ```text
//! [ERROR] 14:03:22.117 GET http://localhost:3000/api 503 (12ms)  (http://localhost:3000/)
//!     response: {"error":"unavailable"}
//! ```

use std::io::Write;

use diagnostic_relay::Event;

const INDENT: &str = "    ";

/// Destination of rendered events.
pub trait DisplaySink: Send + Sync {
    fn write_event(&self, rendered: &str);
}

/// Writes every rendered event to stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct Stdout;

impl DisplaySink for Stdout {
    fn write_event(&self, rendered: &str) {
        let mut out = std::io::stdout().lock();
        // a closed stdout is not worth failing a delivery for
        let _ = writeln!(out, "{rendered}");
    }
}

#[must_use]
pub fn render(event: &Event) -> String {
    let mut rendered = format!(
        "[{}] {} {}  ({})",
        event.severity.as_str().to_uppercase(),
        event.timestamp.format("%H:%M:%S%.3f"),
        event.message(),
        event.origin_url
    );
    if let Some(stack) = &event.stack_excerpt {
        push_block(&mut rendered, "stack", stack);
    }
    if let Some(response) = &event.response_excerpt {
        push_block(&mut rendered, "response", response);
    }
    rendered
}

fn push_block(rendered: &mut String, label: &str, text: &str) {
    let mut lines = text.lines();
    if let Some(first) = lines.next() {
        rendered.push_str(&format!("\n{INDENT}{label}: {first}"));
    }
    for line in lines {
        rendered.push_str(&format!("\n{INDENT}{INDENT}{}", line.trim_start()));
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use diagnostic_relay::event::NetworkObservation;
    use diagnostic_relay::{Severity, TransportKind};
    use serde_json::json;

    fn at_noon(mut event: Event) -> Event {
        event.timestamp = Utc
            .with_ymd_and_hms(2024, 5, 1, 12, 30, 5)
            .unwrap()
            .checked_add_signed(chrono::Duration::milliseconds(42))
            .unwrap();
        event
    }

    #[test]
    fn test_render_log_line() {
        let event = at_noon(Event::structured_log(
            Severity::Warning,
            vec![json!("disk almost full"), json!({"free": 3})],
            None,
            "http://localhost:3000/",
        ));
        assert_eq!(
            render(&event),
            r#"[WARNING] 12:30:05.042 disk almost full {"free":3}  (http://localhost:3000/)"#
        );
    }

    #[test]
    fn test_render_stack_block() {
        let event = at_noon(Event::uncaught_error(
            "boom",
            Some("Error: boom\n    at main (app.js:1)\n    at run (app.js:9)"),
            "http://localhost:3000/",
        ));
        let rendered = render(&event);
        let lines: Vec<_> = rendered.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("[ERROR] 12:30:05.042 boom"));
        assert_eq!(lines[1], "    stack: Error: boom");
        assert_eq!(lines[2], "        at main (app.js:1)");
    }

    #[test]
    fn test_render_network_response() {
        let event = at_noon(Event::network_call(
            NetworkObservation {
                method: "GET".to_string(),
                target_url: "http://localhost:3000/api".to_string(),
                status: 503,
                duration_ms: 12,
                transport: TransportKind::Fetch,
                response_excerpt: Some(r#"{"error":"unavailable"}"#.to_string()),
                failure: None,
            },
            "http://localhost:3000/",
        ));
        assert_eq!(
            render(&event),
            "[ERROR] 12:30:05.042 GET http://localhost:3000/api 503 (12ms)  (http://localhost:3000/)\n    response: {\"error\":\"unavailable\"}"
        );
    }
}
