// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The embedding environment observed by the relay.
//!
//! A [`Host`] owns every entry point the relay may intercept. Host code never
//! holds on to a primitive: it calls through [`Host::console`], [`Host::fetch`]
//! and friends, which always dispatch to the slot's current value.

use std::sync::Arc;

use bytes::Bytes;

use crate::http::{ReqwestFetch, ReqwestXhr};

mod console;
mod errors;
mod network;
mod slot;

pub use console::{ConsoleArg, ConsoleMethod, ConsoleSink, ErrorLike, StdConsole};
pub use errors::{ErrorHub, ErrorListener, ErrorNotification, ListenerId};
pub use network::{
    is_textual, FetchError, FetchPrimitive, FetchRequest, FetchResponse, XhrBody, XhrHandle,
    XhrOutcome, XhrPrimitive,
};
pub use slot::Slot;

pub const DEFAULT_ORIGIN: &str = "http://localhost/";

/// Execution conditions that decide whether capture may be enabled at all.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HostContext {
    /// Running a development build.
    pub development: bool,
    /// The embedding context allows capture (e.g. not a nested preview frame).
    pub capture_enabled: bool,
}

impl Default for HostContext {
    fn default() -> Self {
        HostContext {
            development: true,
            capture_enabled: true,
        }
    }
}

pub struct Host {
    context: HostContext,
    origin: String,
    consoles: [Slot<dyn ConsoleSink>; 6],
    fetch: Slot<dyn FetchPrimitive>,
    xhr: Slot<dyn XhrPrimitive>,
    errors: ErrorHub,
}

impl Host {
    #[must_use]
    pub fn builder() -> HostBuilder {
        HostBuilder::default()
    }

    #[must_use]
    pub fn context(&self) -> HostContext {
        self.context
    }

    /// Location the host runs at. Relative network targets resolve against it.
    #[must_use]
    pub fn origin(&self) -> &str {
        &self.origin
    }

    #[must_use]
    pub fn console_slot(&self, method: ConsoleMethod) -> &Slot<dyn ConsoleSink> {
        &self.consoles[slot_index(method)]
    }

    #[must_use]
    pub fn fetch_slot(&self) -> &Slot<dyn FetchPrimitive> {
        &self.fetch
    }

    #[must_use]
    pub fn xhr_slot(&self) -> &Slot<dyn XhrPrimitive> {
        &self.xhr
    }

    #[must_use]
    pub fn error_hub(&self) -> &ErrorHub {
        &self.errors
    }

    pub fn console(&self, method: ConsoleMethod, args: &[ConsoleArg]) {
        self.console_slot(method).get().call(args);
    }

    pub async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, FetchError> {
        let primitive = self.fetch.get();
        primitive.fetch(request).await
    }

    pub fn xhr_open(&self, handle: &XhrHandle, method: &str, url: &str) {
        self.xhr.get().open(handle, method, url);
    }

    pub async fn xhr_send(&self, handle: &XhrHandle, body: Option<Bytes>) -> XhrOutcome {
        let primitive = self.xhr.get();
        primitive.send(handle, body).await
    }

    /// Raises a global error notification, as the host runtime does for
    /// uncaught errors and unhandled rejections.
    pub fn report_error(&self, notification: &ErrorNotification) {
        self.errors.dispatch(notification);
    }

    /// Whether every slot holds the host's own primitive.
    #[must_use]
    pub fn is_pristine(&self) -> bool {
        self.consoles.iter().all(|slot| !slot.is_patched())
            && !self.fetch.is_patched()
            && !self.xhr.is_patched()
    }
}

impl std::fmt::Debug for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Host")
            .field("context", &self.context)
            .field("origin", &self.origin)
            .field("fetch", &self.fetch)
            .field("xhr", &self.xhr)
            .field("errors", &self.errors)
            .finish_non_exhaustive()
    }
}

fn slot_index(method: ConsoleMethod) -> usize {
    match method {
        ConsoleMethod::Trace => 0,
        ConsoleMethod::Debug => 1,
        ConsoleMethod::Log => 2,
        ConsoleMethod::Info => 3,
        ConsoleMethod::Warn => 4,
        ConsoleMethod::Error => 5,
    }
}

#[derive(Default)]
pub struct HostBuilder {
    context: HostContext,
    origin: Option<String>,
    consoles: Vec<(ConsoleMethod, Arc<dyn ConsoleSink>)>,
    fetch: Option<Arc<dyn FetchPrimitive>>,
    xhr: Option<Arc<dyn XhrPrimitive>>,
}

impl HostBuilder {
    #[must_use]
    pub fn development(mut self, development: bool) -> Self {
        self.context.development = development;
        self
    }

    #[must_use]
    pub fn capture_enabled(mut self, capture_enabled: bool) -> Self {
        self.context.capture_enabled = capture_enabled;
        self
    }

    #[must_use]
    pub fn origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    #[must_use]
    pub fn console(mut self, method: ConsoleMethod, sink: Arc<dyn ConsoleSink>) -> Self {
        self.consoles.push((method, sink));
        self
    }

    /// Uses the same sink for every console method.
    #[must_use]
    pub fn console_all(mut self, sink: Arc<dyn ConsoleSink>) -> Self {
        for method in ConsoleMethod::ALL {
            self.consoles.push((method, Arc::clone(&sink)));
        }
        self
    }

    #[must_use]
    pub fn fetch(mut self, fetch: Arc<dyn FetchPrimitive>) -> Self {
        self.fetch = Some(fetch);
        self
    }

    #[must_use]
    pub fn xhr(mut self, xhr: Arc<dyn XhrPrimitive>) -> Self {
        self.xhr = Some(xhr);
        self
    }

    #[must_use]
    pub fn build(self) -> Host {
        let consoles = ConsoleMethod::ALL.map(|method| {
            let sink = self
                .consoles
                .iter()
                .rev()
                .find(|(m, _)| *m == method)
                .map(|(_, sink)| Arc::clone(sink))
                .unwrap_or_else(|| Arc::new(StdConsole::new(method)));
            Slot::new(sink)
        });
        let origin = self.origin.unwrap_or_else(|| DEFAULT_ORIGIN.to_string());
        let fetch = self
            .fetch
            .unwrap_or_else(|| Arc::new(ReqwestFetch::default().with_origin(origin.as_str())));
        let xhr = self
            .xhr
            .unwrap_or_else(|| Arc::new(ReqwestXhr::default().with_origin(origin.as_str())));

        Host {
            context: self.context,
            origin,
            consoles,
            fetch: Slot::new(fetch),
            xhr: Slot::new(xhr),
            errors: ErrorHub::default(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_console_dispatches_to_configured_sink() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = Arc::clone(&seen);
        let host = Host::builder()
            .console(
                ConsoleMethod::Warn,
                Arc::new(move |args: &[ConsoleArg]| {
                    sink_seen.lock().unwrap().push(args.len());
                }),
            )
            .build();

        host.console(ConsoleMethod::Warn, &["a".into(), "b".into()]);
        assert_eq!(*seen.lock().unwrap(), vec![2]);
        assert!(host.is_pristine());
        assert_eq!(host.origin(), DEFAULT_ORIGIN);
    }

    #[test]
    fn test_slot_index_is_a_bijection() {
        let mut indices: Vec<usize> = ConsoleMethod::ALL.iter().map(|m| slot_index(*m)).collect();
        indices.sort_unstable();
        assert_eq!(indices, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_builder_context() {
        let host = Host::builder()
            .development(false)
            .capture_enabled(false)
            .origin("http://app.local/")
            .build();
        assert_eq!(
            host.context(),
            HostContext {
                development: false,
                capture_enabled: false
            }
        );
        assert_eq!(host.origin(), "http://app.local/");
    }
}
