// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::event::{Event, NetworkObservation, TransportKind};
use crate::host::{is_textual, FetchError, FetchPrimitive, FetchRequest, FetchResponse};
use crate::intercept::filter::{resolve_url, should_observe};
use crate::intercept::{excerpt, guarded};
use crate::session::Shared;

pub(crate) struct FetchWrapper {
    original: Arc<dyn FetchPrimitive>,
    shared: Arc<Shared>,
}

/// What an observed call needs once it completes.
struct Observed {
    session: u64,
    method: String,
    url: String,
    body_limit: usize,
}

impl FetchWrapper {
    pub(crate) fn new(original: Arc<dyn FetchPrimitive>, shared: Arc<Shared>) -> Self {
        FetchWrapper { original, shared }
    }

    fn observe(&self, request: &FetchRequest) -> Option<Observed> {
        let capture = self.shared.snapshot()?;
        if !capture.config.capture_network {
            return None;
        }
        let origin = self.shared.origin();
        let url = resolve_url(origin, &request.url);
        let endpoint = resolve_url(origin, &capture.config.endpoint);
        if !should_observe(&url, &endpoint, &capture.config) {
            return None;
        }
        Some(Observed {
            session: capture.session,
            method: request.method.to_uppercase(),
            url,
            body_limit: capture.config.network_body_limit,
        })
    }

    fn record(
        &self,
        observed: Observed,
        result: &Result<FetchResponse, FetchError>,
        start: Instant,
    ) {
        let duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        let (status, response_excerpt, failure) = match result {
            Ok(response) => {
                let response_excerpt = if is_textual(response.content_type()) {
                    excerpt(&String::from_utf8_lossy(&response.body), observed.body_limit)
                } else {
                    None
                };
                (response.status, response_excerpt, None)
            }
            Err(e) => (0, None, Some(e.message.clone())),
        };
        let observation = NetworkObservation {
            method: observed.method,
            target_url: observed.url,
            status,
            duration_ms,
            transport: TransportKind::Fetch,
            response_excerpt,
            failure,
        };
        let event = Event::network_call(observation, self.shared.origin());
        self.shared.submit(observed.session, event);
    }
}

#[async_trait]
impl FetchPrimitive for FetchWrapper {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, FetchError> {
        let Some(observed) = guarded("fetch call", || self.observe(&request)).flatten() else {
            return self.original.fetch(request).await;
        };

        let start = Instant::now();
        let result = self.original.fetch(request).await;
        guarded("fetch call", || self.record(observed, &result, start));
        result
    }
}
