// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! reqwest-backed network primitives for hosts running natively.

use std::collections::HashMap;
use std::error::Error;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::warn;

use crate::host::{
    is_textual, FetchError, FetchPrimitive, FetchRequest, FetchResponse, XhrBody, XhrHandle,
    XhrOutcome, XhrPrimitive,
};
use crate::intercept::filter::resolve_url;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

pub fn build_client(timeout: Duration) -> Result<reqwest::Client, Box<dyn Error>> {
    Ok(reqwest::Client::builder().timeout(timeout).build()?)
}

fn default_client() -> reqwest::Client {
    build_client(DEFAULT_TIMEOUT).unwrap_or_else(|e| {
        warn!("Failed to build HTTP client: {e}, using defaults");
        reqwest::Client::default()
    })
}

async fn perform(
    client: &reqwest::Client,
    origin: Option<&str>,
    request: FetchRequest,
) -> Result<FetchResponse, FetchError> {
    let method = reqwest::Method::from_bytes(request.method.to_uppercase().as_bytes())
        .map_err(|_| FetchError::new(format!("Invalid method '{}'", request.method)))?;
    let url = match origin {
        Some(origin) => resolve_url(origin, &request.url),
        None => request.url,
    };

    let mut builder = client.request(method, url.as_str());
    for (name, value) in &request.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    if let Some(body) = request.body {
        builder = builder.body(body);
    }

    let response = builder
        .send()
        .await
        .map_err(|e| FetchError::new(e.to_string()))?;
    let status = response.status().as_u16();
    let headers = response
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.as_str().to_string(), value.to_string()))
        })
        .collect();
    let body = response
        .bytes()
        .await
        .map_err(|e| FetchError::new(e.to_string()))?;

    Ok(FetchResponse {
        status,
        headers,
        body,
    })
}

/// Request-style primitive over a reqwest client.
///
/// With an origin set, relative URLs resolve against it.
#[derive(Clone, Debug)]
pub struct ReqwestFetch {
    client: reqwest::Client,
    origin: Option<String>,
}

impl ReqwestFetch {
    #[must_use]
    pub fn new(client: reqwest::Client) -> Self {
        ReqwestFetch {
            client,
            origin: None,
        }
    }

    #[must_use]
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }
}

impl Default for ReqwestFetch {
    fn default() -> Self {
        ReqwestFetch::new(default_client())
    }
}

#[async_trait]
impl FetchPrimitive for ReqwestFetch {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, FetchError> {
        perform(&self.client, self.origin.as_deref(), request).await
    }
}

/// Open/send primitive over a reqwest client.
#[derive(Debug)]
pub struct ReqwestXhr {
    client: reqwest::Client,
    origin: Option<String>,
    opened: Mutex<HashMap<u64, (String, String)>>,
}

impl ReqwestXhr {
    #[must_use]
    pub fn new(client: reqwest::Client) -> Self {
        ReqwestXhr {
            client,
            origin: None,
            opened: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }
}

impl Default for ReqwestXhr {
    fn default() -> Self {
        ReqwestXhr::new(default_client())
    }
}

#[async_trait]
impl XhrPrimitive for ReqwestXhr {
    fn open(&self, handle: &XhrHandle, method: &str, url: &str) {
        self.opened
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(handle.id(), (method.to_string(), url.to_string()));
    }

    async fn send(&self, handle: &XhrHandle, body: Option<Bytes>) -> XhrOutcome {
        let opened = self
            .opened
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&handle.id());
        let Some((method, url)) = opened else {
            return XhrOutcome::failed("send called before open");
        };

        let mut request = FetchRequest::new(method, url);
        request.body = body;
        match perform(&self.client, self.origin.as_deref(), request).await {
            Ok(response) => {
                let body = if is_textual(response.content_type()) {
                    XhrBody::Text(String::from_utf8_lossy(&response.body).into_owned())
                } else {
                    XhrBody::Binary(response.body)
                };
                XhrOutcome {
                    status: response.status,
                    body,
                    error: None,
                }
            }
            Err(e) => XhrOutcome::failed(e.message),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fetch_roundtrip() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/items")
            .match_header("content-type", "application/json")
            .match_body(r#"{"name":"x"}"#)
            .with_status(201)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id":1}"#)
            .create_async()
            .await;

        let fetch = ReqwestFetch::default().with_origin(server.url());
        let response = fetch
            .fetch(
                FetchRequest::new("post", "/api/items")
                    .header("Content-Type", "application/json")
                    .body(r#"{"name":"x"}"#),
            )
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(response.status, 201);
        assert_eq!(response.content_type(), Some("application/json"));
        assert_eq!(response.body, Bytes::from_static(br#"{"id":1}"#));
    }

    #[tokio::test]
    async fn test_fetch_relative_url_without_origin_fails() {
        let fetch = ReqwestFetch::default();
        let err = fetch.fetch(FetchRequest::get("/relative")).await.unwrap_err();
        assert!(!err.message.is_empty());
    }

    #[tokio::test]
    async fn test_xhr_text_and_binary_bodies() {
        let mut server = mockito::Server::new_async().await;
        let _text = server
            .mock("GET", "/text")
            .with_status(404)
            .with_header("content-type", "text/plain")
            .with_body("missing")
            .create_async()
            .await;
        let _binary = server
            .mock("GET", "/image")
            .with_status(200)
            .with_header("content-type", "image/png")
            .with_body([0u8, 1, 2])
            .create_async()
            .await;

        let xhr = ReqwestXhr::default().with_origin(server.url());

        let handle = XhrHandle::new();
        xhr.open(&handle, "GET", "/text");
        let outcome = xhr.send(&handle, None).await;
        assert_eq!(outcome, XhrOutcome::text(404, "missing"));

        let handle = XhrHandle::new();
        xhr.open(&handle, "GET", "/image");
        let outcome = xhr.send(&handle, None).await;
        assert_eq!(outcome.status, 200);
        assert_eq!(outcome.body, XhrBody::Binary(Bytes::from_static(&[0, 1, 2])));
    }

    #[tokio::test]
    async fn test_xhr_send_without_open() {
        let xhr = ReqwestXhr::default();
        let outcome = xhr.send(&XhrHandle::new(), None).await;
        assert_eq!(outcome.status, 0);
        assert!(outcome.error.is_some());
    }
}
