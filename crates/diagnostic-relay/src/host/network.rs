// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Network primitives of the host.
//!
//! Two shapes are supported, matching what embedded runtimes usually expose:
//! a request-style primitive ([`FetchPrimitive`]) that resolves to a response,
//! and an open/send pair ([`XhrPrimitive`]) keyed by a call-site handle.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;

#[derive(Clone, Debug, PartialEq)]
pub struct FetchRequest {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Bytes>,
}

impl FetchRequest {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        FetchRequest {
            method: method.into(),
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new("GET", url)
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FetchResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl FetchResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        FetchResponse {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("content-type"))
            .map(|(_, value)| value.as_str())
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Failure of a network call before any response was received.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct FetchError {
    pub message: String,
}

impl FetchError {
    pub fn new(message: impl Into<String>) -> Self {
        FetchError {
            message: message.into(),
        }
    }
}

/// Request-style network primitive.
#[async_trait]
pub trait FetchPrimitive: Send + Sync {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, FetchError>;
}

/// Identity of one xhr-style call site.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct XhrHandle(u64);

static NEXT_XHR_HANDLE: AtomicU64 = AtomicU64::new(1);

impl XhrHandle {
    #[must_use]
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        XhrHandle(NEXT_XHR_HANDLE.fetch_add(1, Ordering::Relaxed))
    }

    #[must_use]
    pub fn id(self) -> u64 {
        self.0
    }
}

/// Response body as exposed by an xhr-style primitive.
#[derive(Clone, Debug, PartialEq)]
pub enum XhrBody {
    Text(String),
    Binary(Bytes),
    /// The body exists but cannot be read (opaque or already consumed).
    Unreadable,
}

/// Completion notification of an xhr-style call.
#[derive(Clone, Debug, PartialEq)]
pub struct XhrOutcome {
    /// 0 when the call failed before a response was received.
    pub status: u16,
    pub body: XhrBody,
    pub error: Option<String>,
}

impl XhrOutcome {
    pub fn text(status: u16, body: impl Into<String>) -> Self {
        XhrOutcome {
            status,
            body: XhrBody::Text(body.into()),
            error: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        XhrOutcome {
            status: 0,
            body: XhrBody::Unreadable,
            error: Some(message.into()),
        }
    }
}

/// Open/send network primitive pair.
///
/// `open` records the request line for a handle; `send` performs the call and
/// resolves once the handle signals completion.
#[async_trait]
pub trait XhrPrimitive: Send + Sync {
    fn open(&self, handle: &XhrHandle, method: &str, url: &str);

    async fn send(&self, handle: &XhrHandle, body: Option<Bytes>) -> XhrOutcome;
}

/// Whether a response with this content type is worth excerpting as text.
#[must_use]
pub fn is_textual(content_type: Option<&str>) -> bool {
    let Some(content_type) = content_type else {
        return false;
    };
    let content_type = content_type.to_ascii_lowercase();
    content_type.starts_with("text/")
        || content_type.contains("json")
        || content_type.contains("xml")
        || content_type.contains("javascript")
        || content_type.contains("x-www-form-urlencoded")
}
