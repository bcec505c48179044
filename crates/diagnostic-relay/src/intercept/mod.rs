// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Wrappers installed into the host's slots.
//!
//! Every wrapper delegates to the primitive it replaced and hands back the
//! primitive's result untouched. Building and submitting the event runs
//! under [`guarded`], so a failure while capturing is logged on the
//! diagnostics channel and never reaches the host.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{debug, error};

use crate::config::RelayConfig;
use crate::host::{ConsoleMethod, ConsoleSink, FetchPrimitive, Host, ListenerId, XhrPrimitive};
use crate::session::Shared;

mod console;
mod errors;
mod fetch;
pub mod filter;
mod xhr;

pub(crate) use xhr::XhrCalls;

/// Runs a capture step, absorbing any panic it raises.
pub(crate) fn guarded<T>(what: &str, f: impl FnOnce() -> T) -> Option<T> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => Some(value),
        Err(payload) => {
            error!("Failed to capture {what}: {}", panic_message(payload.as_ref()));
            None
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown cause".to_string()
    }
}

/// The relay's installed interceptions on one host.
#[derive(Debug, Default)]
pub(crate) struct Interceptions {
    error_listener: Option<ListenerId>,
    xhr_calls: Arc<XhrCalls>,
}

impl Interceptions {
    /// Installs what `config` enables and restores what it disables.
    /// Already installed wrappers are left in place. Calls opened under a
    /// previous session are forgotten.
    pub(crate) fn reconcile(&mut self, host: &Host, shared: &Arc<Shared>, config: &RelayConfig) {
        self.xhr_calls.clear();
        for method in ConsoleMethod::ALL {
            let slot = host.console_slot(method);
            if config.severity_enabled(method.severity()) {
                slot.install(|original| console_wrapper(method, original, shared));
            } else if slot.restore() {
                debug!("Restored console.{}", method.name());
            }
        }

        if config.capture_network {
            host.fetch_slot()
                .install(|original| fetch_wrapper(original, shared));
            host.xhr_slot()
                .install(|original| xhr_wrapper(original, shared, &self.xhr_calls));
        } else {
            self.restore_network(host);
        }

        if config.capture_errors {
            if self.error_listener.is_none() {
                let listener = errors::listener(Arc::clone(shared));
                self.error_listener = Some(host.error_hub().add_listener(listener));
            }
        } else {
            self.remove_error_listener(host);
        }
    }

    /// Puts every slot back to the host's own primitive.
    pub(crate) fn restore_all(&mut self, host: &Host) {
        for method in ConsoleMethod::ALL {
            host.console_slot(method).restore();
        }
        self.restore_network(host);
        self.remove_error_listener(host);
    }

    /// Number of xhr calls opened but not yet sent.
    pub(crate) fn tracked_xhr_calls(&self) -> usize {
        self.xhr_calls.len()
    }

    fn restore_network(&mut self, host: &Host) {
        let fetch = host.fetch_slot().restore();
        let xhr = host.xhr_slot().restore();
        self.xhr_calls.clear();
        if fetch || xhr {
            debug!("Restored network primitives");
        }
    }

    fn remove_error_listener(&mut self, host: &Host) {
        if let Some(id) = self.error_listener.take() {
            host.error_hub().remove_listener(id);
        }
    }
}

fn console_wrapper(
    method: ConsoleMethod,
    original: Arc<dyn ConsoleSink>,
    shared: &Arc<Shared>,
) -> Arc<dyn ConsoleSink> {
    Arc::new(console::ConsoleWrapper::new(
        method,
        original,
        Arc::clone(shared),
    ))
}

fn fetch_wrapper(
    original: Arc<dyn FetchPrimitive>,
    shared: &Arc<Shared>,
) -> Arc<dyn FetchPrimitive> {
    Arc::new(fetch::FetchWrapper::new(original, Arc::clone(shared)))
}

fn xhr_wrapper(
    original: Arc<dyn XhrPrimitive>,
    shared: &Arc<Shared>,
    calls: &Arc<XhrCalls>,
) -> Arc<dyn XhrPrimitive> {
    Arc::new(xhr::XhrWrapper::new(
        original,
        Arc::clone(shared),
        Arc::clone(calls),
    ))
}

/// Cuts a response body down to an excerpt of at most `limit` characters.
/// A limit of 0 disables excerpts.
pub(crate) fn excerpt(body: &str, limit: usize) -> Option<String> {
    if limit == 0 || body.is_empty() {
        return None;
    }
    Some(crate::event::truncate_chars(body, limit))
}
