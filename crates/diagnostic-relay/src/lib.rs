// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Capture, loop detection and batched delivery of host diagnostics.
//!
//! The relay wraps the entry points of a [`Host`] (console methods, network
//! primitives, the global error hub), turns each call into an [`Event`],
//! drops pathological repetition and delivers the rest in batches to a
//! collector. Wrapped primitives behave exactly like the originals: same
//! arguments, same results, same failures.
//!
//! - [`host`]: the host's interception slots and primitive traits
//! - [`intercept`]: wrappers installed into those slots
//! - [`loop_detector`]: sliding-window repetition detection
//! - [`queue`] and [`flusher`]: bounded queue and delivery
//! - [`session`]: activation, deactivation and stale-session guards
//! - [`config`]: options, environment variables and clamping

#![deny(clippy::all)]

pub mod config;
pub mod error;
pub mod event;
pub mod flusher;
pub mod host;
pub mod http;
pub mod intercept;
pub mod logger;
pub mod loop_detector;
pub mod queue;
pub mod session;

pub use config::{RelayConfig, RelayOptions};
pub use error::{DeliveryError, RelayError};
pub use event::{Event, EventKind, Severity, TransportKind};
pub use flusher::Payload;
pub use host::{Host, HostContext};
pub use session::{Activation, Relay};
