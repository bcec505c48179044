// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::io::Write;

use serde_json::{json, Value};

use crate::event::{stringify_value, Severity};

/// The host's logging-sink entry points, one slot each.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConsoleMethod {
    Trace,
    Debug,
    Log,
    Info,
    Warn,
    Error,
}

impl ConsoleMethod {
    pub const ALL: [ConsoleMethod; 6] = [
        ConsoleMethod::Trace,
        ConsoleMethod::Debug,
        ConsoleMethod::Log,
        ConsoleMethod::Info,
        ConsoleMethod::Warn,
        ConsoleMethod::Error,
    ];

    #[must_use]
    pub fn severity(self) -> Severity {
        match self {
            ConsoleMethod::Trace | ConsoleMethod::Debug => Severity::Trace,
            ConsoleMethod::Log | ConsoleMethod::Info => Severity::Info,
            ConsoleMethod::Warn => Severity::Warning,
            ConsoleMethod::Error => Severity::Error,
        }
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            ConsoleMethod::Trace => "trace",
            ConsoleMethod::Debug => "debug",
            ConsoleMethod::Log => "log",
            ConsoleMethod::Info => "info",
            ConsoleMethod::Warn => "warn",
            ConsoleMethod::Error => "error",
        }
    }
}

/// An error-like value passed to the console (name, message, optional stack).
#[derive(Clone, Debug, PartialEq)]
pub struct ErrorLike {
    pub name: String,
    pub message: String,
    pub stack: Option<String>,
}

impl ErrorLike {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        ErrorLike {
            name: name.into(),
            message: message.into(),
            stack: None,
        }
    }

    #[must_use]
    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }
}

/// One argument of a console call.
#[derive(Clone, Debug, PartialEq)]
pub enum ConsoleArg {
    Value(Value),
    Error(ErrorLike),
}

impl ConsoleArg {
    /// Serializable form used in event payloads.
    #[must_use]
    pub fn to_payload(&self) -> Value {
        match self {
            ConsoleArg::Value(value) => value.clone(),
            ConsoleArg::Error(err) => json!({
                "name": err.name,
                "message": err.message,
                "stack": err.stack,
            }),
        }
    }

    /// Stack trace, when this argument is an error that carries one.
    #[must_use]
    pub fn stack(&self) -> Option<&str> {
        match self {
            ConsoleArg::Error(err) => err.stack.as_deref(),
            ConsoleArg::Value(_) => None,
        }
    }

    fn render(&self) -> String {
        match self {
            ConsoleArg::Value(value) => stringify_value(value),
            ConsoleArg::Error(err) => format!("{}: {}", err.name, err.message),
        }
    }
}

impl From<&str> for ConsoleArg {
    fn from(s: &str) -> Self {
        ConsoleArg::Value(Value::String(s.to_string()))
    }
}

impl From<String> for ConsoleArg {
    fn from(s: String) -> Self {
        ConsoleArg::Value(Value::String(s))
    }
}

impl From<Value> for ConsoleArg {
    fn from(value: Value) -> Self {
        ConsoleArg::Value(value)
    }
}

impl From<ErrorLike> for ConsoleArg {
    fn from(err: ErrorLike) -> Self {
        ConsoleArg::Error(err)
    }
}

/// A logging-sink primitive.
pub trait ConsoleSink: Send + Sync {
    fn call(&self, args: &[ConsoleArg]);
}

impl<F> ConsoleSink for F
where
    F: Fn(&[ConsoleArg]) + Send + Sync,
{
    fn call(&self, args: &[ConsoleArg]) {
        self(args);
    }
}

/// Default console: writes space-joined arguments to stdout, or stderr for
/// warnings and errors.
#[derive(Debug, Clone, Copy)]
pub struct StdConsole {
    method: ConsoleMethod,
}

impl StdConsole {
    #[must_use]
    pub fn new(method: ConsoleMethod) -> Self {
        StdConsole { method }
    }
}

impl ConsoleSink for StdConsole {
    fn call(&self, args: &[ConsoleArg]) {
        let line = args
            .iter()
            .map(ConsoleArg::render)
            .collect::<Vec<_>>()
            .join(" ");
        // a closed stdio stream is not the caller's problem
        let _ = match self.method {
            ConsoleMethod::Warn | ConsoleMethod::Error => {
                writeln!(std::io::stderr().lock(), "{line}")
            }
            _ => writeln!(std::io::stdout().lock(), "{line}"),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_severity() {
        assert_eq!(ConsoleMethod::Debug.severity(), Severity::Trace);
        assert_eq!(ConsoleMethod::Log.severity(), Severity::Info);
        assert_eq!(ConsoleMethod::Warn.severity(), Severity::Warning);
        assert_eq!(ConsoleMethod::Error.severity(), Severity::Error);
    }

    #[test]
    fn test_error_arg_payload() {
        let arg =
            ConsoleArg::from(ErrorLike::new("TypeError", "x is undefined").with_stack("at f"));
        assert_eq!(arg.stack(), Some("at f"));
        assert_eq!(
            arg.to_payload(),
            json!({"name": "TypeError", "message": "x is undefined", "stack": "at f"})
        );
        assert_eq!(arg.render(), "TypeError: x is undefined");
    }

    #[test]
    fn test_closure_sink() {
        let seen = std::sync::Mutex::new(Vec::new());
        let sink = |args: &[ConsoleArg]| seen.lock().unwrap().extend_from_slice(args);
        ConsoleSink::call(&sink, &["a".into(), json!(1).into()]);
        assert_eq!(seen.lock().unwrap().len(), 2);
    }
}
