// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Development collector for relayed diagnostics.
//!
//! Listens on loopback, accepts single events or `{"batch": [..]}` envelopes
//! on one path and prints each event as a display line.

#![deny(clippy::all)]

pub mod config;
pub mod error;
pub mod format;
pub mod handler;
pub mod server;

pub use config::CollectorConfig;
pub use error::CollectorError;
pub use format::{DisplaySink, Stdout};
pub use handler::Collector;
