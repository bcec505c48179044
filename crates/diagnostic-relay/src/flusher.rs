// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Delivery of event batches to the collector.
//!
//! A batch of one event is sent as the bare event object, larger batches as
//! `{"batch": [...]}`. Requests go through the host's unwrapped fetch
//! primitive so deliveries are never observed by the relay itself. Failed
//! deliveries are logged and dropped.

use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::DeliveryError;
use crate::event::Event;
use crate::host::{FetchPrimitive, FetchRequest};

/// Request body accepted by the collector.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Payload {
    Batch { batch: Vec<Event> },
    Single(Box<Event>),
}

impl Payload {
    #[must_use]
    pub fn into_events(self) -> Vec<Event> {
        match self {
            Payload::Batch { batch } => batch,
            Payload::Single(event) => vec![*event],
        }
    }
}

#[derive(Serialize)]
struct BatchRef<'a> {
    batch: &'a [Event],
}

/// Serializes `events` into a request body.
pub fn encode(events: &[Event]) -> Result<Bytes, DeliveryError> {
    let body = match events {
        [single] => serde_json::to_vec(single)?,
        batch => serde_json::to_vec(&BatchRef { batch })?,
    };
    Ok(Bytes::from(body))
}

#[derive(Clone)]
pub struct Flusher {
    fetch: Arc<dyn FetchPrimitive>,
    endpoint: String,
}

impl Flusher {
    /// `fetch` must be the host's original primitive, never the wrapper.
    #[must_use]
    pub fn new(fetch: Arc<dyn FetchPrimitive>, endpoint: String) -> Self {
        Flusher { fetch, endpoint }
    }

    pub async fn send(&self, events: &[Event]) -> Result<(), DeliveryError> {
        let body = encode(events)?;
        let request = FetchRequest::new("POST", self.endpoint.as_str())
            .header("Content-Type", "application/json")
            .body(body);
        let response = self.fetch.fetch(request).await?;
        if response.is_success() {
            Ok(())
        } else {
            Err(DeliveryError::Status(response.status))
        }
    }

    /// Sends a batch, logging instead of returning failures.
    pub async fn flush(&self, events: Vec<Event>) {
        if events.is_empty() {
            return;
        }
        let start = Instant::now();
        match self.send(&events).await {
            Ok(()) => debug!(
                "Delivered {} events to {} in {} ms",
                events.len(),
                self.endpoint,
                start.elapsed().as_millis()
            ),
            Err(e) => warn!("Dropping batch of {} events: {}", events.len(), e),
        }
    }
}

impl std::fmt::Debug for Flusher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Flusher")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}
