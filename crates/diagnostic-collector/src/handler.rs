// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::error::Error;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Body;
use hyper::{header, http, Method, Request, Response, StatusCode};
use serde_json::json;
use tracing::{debug, error};

use diagnostic_relay::Payload;

use crate::config::CollectorConfig;
use crate::format::{render, DisplaySink};

pub const MAX_BODY_BYTES: usize = 1024 * 1024;

pub type HttpResponse = Response<Full<Bytes>>;

/// Logs `message` (debug on success, error otherwise) and returns it as
/// `{"message": message}` with `status`.
pub fn log_and_create_http_response(
    message: &str,
    status: StatusCode,
) -> http::Result<HttpResponse> {
    if status.is_success() {
        debug!("{message}");
    } else {
        error!("{message}");
    }
    json_response(status, json!({ "message": message }).to_string())
}

fn json_response(status: StatusCode, body: String) -> http::Result<HttpResponse> {
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from(body)))
}

/// Declared length above the limit, if any.
fn declared_too_large<B>(req: &Request<B>) -> bool {
    req.headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<usize>().ok())
        .is_some_and(|length| length > MAX_BODY_BYTES)
}

pub struct Collector {
    config: Arc<CollectorConfig>,
    sink: Arc<dyn DisplaySink>,
}

impl Collector {
    #[must_use]
    pub fn new(config: Arc<CollectorConfig>, sink: Arc<dyn DisplaySink>) -> Self {
        Collector { config, sink }
    }

    #[must_use]
    pub fn config(&self) -> &CollectorConfig {
        &self.config
    }

    pub async fn handle<B>(&self, req: Request<B>) -> http::Result<HttpResponse>
    where
        B: Body,
        B::Error: Into<Box<dyn Error + Send + Sync>>,
    {
        if !self.config.development {
            debug!("Refusing {} {}: not in development", req.method(), req.uri());
            return json_response(
                StatusCode::NOT_FOUND,
                json!({ "message": "Not found" }).to_string(),
            );
        }
        if req.uri().path() != self.config.path {
            return log_and_create_http_response(
                &format!("No route for {}", req.uri().path()),
                StatusCode::NOT_FOUND,
            );
        }
        if req.method() != Method::POST {
            return log_and_create_http_response(
                &format!("Method {} not allowed, use POST", req.method()),
                StatusCode::METHOD_NOT_ALLOWED,
            );
        }
        if declared_too_large(&req) {
            return log_and_create_http_response(
                "Diagnostics payload too large",
                StatusCode::PAYLOAD_TOO_LARGE,
            );
        }

        let body = match Limited::new(req.into_body(), MAX_BODY_BYTES).collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
                return log_and_create_http_response(
                    "Diagnostics payload too large",
                    StatusCode::PAYLOAD_TOO_LARGE,
                );
            }
            Err(e) => {
                return log_and_create_http_response(
                    &format!("Error reading request body: {e}"),
                    StatusCode::BAD_REQUEST,
                );
            }
        };

        let events = match serde_json::from_slice::<Payload>(&body) {
            Ok(payload) => payload.into_events(),
            Err(e) => {
                return log_and_create_http_response(
                    &format!("Error deserializing diagnostics payload: {e}"),
                    StatusCode::BAD_REQUEST,
                );
            }
        };

        for event in &events {
            self.sink.write_event(&render(event));
        }
        debug!("Received {} diagnostic events", events.len());
        json_response(
            StatusCode::OK,
            json!({ "received": events.len() }).to_string(),
        )
    }
}
