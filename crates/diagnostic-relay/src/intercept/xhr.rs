// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::time::Instant;
use tracing::debug;

use crate::event::{Event, NetworkObservation, TransportKind};
use crate::host::{XhrBody, XhrHandle, XhrOutcome, XhrPrimitive};
use crate::intercept::filter::{resolve_url, should_observe};
use crate::intercept::{excerpt, guarded};
use crate::session::Shared;

/// Upper bound on calls opened but not yet sent.
const MAX_TRACKED_CALLS: usize = 1000;

#[derive(Clone, Debug, PartialEq)]
struct XhrCall {
    method: String,
    url: String,
}

/// Association table from call-site handle to the request line recorded by
/// `open`. Entries are removed by `send`.
#[derive(Debug, Default)]
pub(crate) struct XhrCalls {
    calls: Mutex<HashMap<u64, XhrCall>>,
}

impl XhrCalls {
    fn insert(&self, handle: &XhrHandle, call: XhrCall) {
        let mut calls = self.calls.lock().unwrap_or_else(PoisonError::into_inner);
        if calls.len() >= MAX_TRACKED_CALLS && !calls.contains_key(&handle.id()) {
            debug!("Too many pending xhr calls, not observing {}", call.url);
            return;
        }
        calls.insert(handle.id(), call);
    }

    fn remove(&self, handle: &XhrHandle) -> Option<XhrCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&handle.id())
    }

    pub(crate) fn len(&self) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub(crate) fn clear(&self) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

pub(crate) struct XhrWrapper {
    original: Arc<dyn XhrPrimitive>,
    shared: Arc<Shared>,
    calls: Arc<XhrCalls>,
}

struct Observed {
    session: u64,
    call: XhrCall,
    body_limit: usize,
}

impl XhrWrapper {
    pub(crate) fn new(
        original: Arc<dyn XhrPrimitive>,
        shared: Arc<Shared>,
        calls: Arc<XhrCalls>,
    ) -> Self {
        XhrWrapper {
            original,
            shared,
            calls,
        }
    }

    fn track(&self, handle: &XhrHandle, method: &str, url: &str) {
        if self.shared.snapshot().is_none() {
            return;
        }
        let call = XhrCall {
            method: method.to_uppercase(),
            url: resolve_url(self.shared.origin(), url),
        };
        self.calls.insert(handle, call);
    }

    fn observe(&self, handle: &XhrHandle) -> Option<Observed> {
        // every send drops its entry, observed or not
        let call = self.calls.remove(handle)?;
        let capture = self.shared.snapshot()?;
        if !capture.config.capture_network {
            return None;
        }
        let endpoint = resolve_url(self.shared.origin(), &capture.config.endpoint);
        if !should_observe(&call.url, &endpoint, &capture.config) {
            return None;
        }
        Some(Observed {
            session: capture.session,
            call,
            body_limit: capture.config.network_body_limit,
        })
    }

    fn record(&self, observed: Observed, outcome: &XhrOutcome, start: Instant) {
        let duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        let response_excerpt = match &outcome.body {
            XhrBody::Text(text) => excerpt(text, observed.body_limit),
            XhrBody::Binary(_) | XhrBody::Unreadable => None,
        };
        let failure = if outcome.status == 0 {
            Some(
                outcome
                    .error
                    .clone()
                    .unwrap_or_else(|| "network error".to_string()),
            )
        } else {
            None
        };
        let observation = NetworkObservation {
            method: observed.call.method,
            target_url: observed.call.url,
            status: outcome.status,
            duration_ms,
            transport: TransportKind::Xhr,
            response_excerpt,
            failure,
        };
        let event = Event::network_call(observation, self.shared.origin());
        self.shared.submit(observed.session, event);
    }
}

#[async_trait]
impl XhrPrimitive for XhrWrapper {
    fn open(&self, handle: &XhrHandle, method: &str, url: &str) {
        guarded("xhr open", || self.track(handle, method, url));
        self.original.open(handle, method, url);
    }

    async fn send(&self, handle: &XhrHandle, body: Option<Bytes>) -> XhrOutcome {
        let Some(observed) = guarded("xhr send", || self.observe(handle)).flatten() else {
            return self.original.send(handle, body).await;
        };

        let start = Instant::now();
        let outcome = self.original.send(handle, body).await;
        guarded("xhr send", || self.record(observed, &outcome, start));
        outcome
    }
}
