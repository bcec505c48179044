// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Diagnostics side channel of the relay itself.
//!
//! The relay reports its own failures (dropped batches, evictions, capture
//! errors) through `tracing`, never through the host console it captures.
//! Lines are prefixed so they stand out from host output:
//!
//! ```text
//! DIAGNOSTIC_RELAY | WARN | Dropping batch of 3 events: Collector rejected batch with status 503
//! ```

use std::fmt;

use tracing_core::{Event, Subscriber};
use tracing_subscriber::fmt::{
    format::{self, FormatEvent, FormatFields},
    FmtContext, FormattedFields,
};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

pub const PREFIX: &str = "DIAGNOSTIC_RELAY";

#[derive(Debug, Clone, Copy)]
pub struct Formatter;

impl<S, N> FormatEvent<S, N> for Formatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: format::Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        write!(&mut writer, "{PREFIX} | {} | ", event.metadata().level())?;

        if let Some(scope) = ctx.event_scope() {
            for span in scope.from_root() {
                write!(writer, "{}", span.name())?;
                let ext = span.extensions();
                if let Some(fields) = ext.get::<FormattedFields<N>>() {
                    if !fields.is_empty() {
                        write!(writer, "{{{fields}}}")?;
                    }
                }
                write!(writer, ": ")?;
            }
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LoggerError {
    #[error("Invalid log level: {0}")]
    Filter(#[from] tracing_subscriber::filter::ParseError),

    #[error("Failed to install subscriber: {0}")]
    Init(#[from] tracing_subscriber::util::TryInitError),
}

/// Builds the filter for `level`, silencing the HTTP stack's own chatter.
pub fn env_filter(level: &str) -> Result<EnvFilter, LoggerError> {
    Ok(EnvFilter::try_new(format!(
        "h2=off,hyper=off,rustls=off,{level}"
    ))?)
}

/// Installs the global subscriber. Fails if one is already installed.
pub fn init(level: &str) -> Result<(), LoggerError> {
    tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(env_filter(level)?)
        .event_format(Formatter)
        .finish()
        .try_init()?;
    Ok(())
}
