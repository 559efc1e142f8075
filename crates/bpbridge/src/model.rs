// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Request/response models exchanged with the ingress collaborators.
//!
//! The HTTP front end and the TLS-interception module hand the core a
//! `ProxyRequest` and receive a `ProxyResponse` (or an error they map to
//! an HTTP status). Cacheability classification lives here because it is
//! a property of the request alone.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Cookie fragments that mark a request as user-specific. A cookie whose
/// value mentions any of these is session state, not shared content.
const SESSION_MARKERS: [&str; 3] = ["session", "auth", "token"];

/// An HTTP request to be carried over the bundle network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyRequest {
    /// HTTP method (GET, POST, ...).
    pub method: String,

    /// Absolute target URL.
    pub url: String,

    /// HTTP headers (multimap).
    #[serde(default)]
    pub headers: HashMap<String, Vec<String>>,

    /// Request body bytes.
    #[serde(default)]
    pub body: Vec<u8>,

    /// Content-Type header value, when present.
    #[serde(default)]
    pub content_type: String,

    /// Content-Length header value, when present.
    #[serde(default)]
    pub content_length: i64,
}

impl ProxyRequest {
    /// Plain GET request for `url` with no headers or body.
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: "GET".to_string(),
            url: url.into(),
            headers: HashMap::new(),
            body: Vec::new(),
            content_type: String::new(),
            content_length: 0,
        }
    }

    /// Reject empty or scheme-less URLs before any processing.
    pub fn validate_url(&self) -> Result<(), InvalidRequest> {
        if self.url.is_empty() {
            return Err(InvalidRequest::EmptyUrl);
        }
        if !self.url.contains("://") {
            return Err(InvalidRequest::MalformedUrl(self.url.clone()));
        }
        Ok(())
    }

    /// All values for a header, matched case-insensitively.
    pub fn header_values(&self, name: &str) -> Option<&Vec<String>> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    }

    /// Whether this request may be served from / stored into the cache.
    ///
    /// Only GET requests qualify, and a session/auth/token cookie marks
    /// the content as dynamic rather than shared.
    pub fn is_cacheable(&self) -> bool {
        if self.method != "GET" {
            return false;
        }
        !self.has_session_cookie()
    }

    /// Whether the content is scoped to one user. Authorization headers
    /// and session cookies both force per-user cache keys.
    pub fn is_user_specific(&self) -> bool {
        if self.header_values("Authorization").is_some() {
            return true;
        }
        self.has_session_cookie()
    }

    /// Cache key for this request (see [`crate::cache::key`]).
    pub fn cache_key(&self) -> String {
        crate::cache::key::cache_key(self)
    }

    fn has_session_cookie(&self) -> bool {
        let Some(cookies) = self.header_values("Cookie") else {
            return false;
        };
        cookies.iter().any(|cookie| {
            let lowered = cookie.to_ascii_lowercase();
            SESSION_MARKERS.iter().any(|marker| lowered.contains(marker))
        })
    }
}

/// An HTTP response carried back over the bundle network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyResponse {
    /// HTTP status code.
    pub status_code: u16,

    /// HTTP headers (multimap).
    #[serde(default)]
    pub headers: HashMap<String, Vec<String>>,

    /// Response body bytes.
    #[serde(default)]
    pub body: Vec<u8>,

    /// Content-Type header value, when present.
    #[serde(default)]
    pub content_type: String,

    /// Content-Length header value, when present.
    #[serde(default)]
    pub content_length: i64,
}

impl ProxyResponse {
    /// A 200 response wrapping the given body.
    pub fn ok(body: Vec<u8>, content_type: impl Into<String>) -> Self {
        let content_length = body.len() as i64;
        Self {
            status_code: 200,
            headers: HashMap::new(),
            body,
            content_type: content_type.into(),
            content_length,
        }
    }

    /// A 503 response used when not even a placeholder can be produced.
    pub fn service_unavailable(message: &str) -> Self {
        let body = message.as_bytes().to_vec();
        let content_length = body.len() as i64;
        Self {
            status_code: 503,
            headers: HashMap::new(),
            body,
            content_type: "text/plain; charset=utf-8".to_string(),
            content_length,
        }
    }
}

/// Request validation failures, surfaced to the ingress layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidRequest {
    EmptyUrl,
    MalformedUrl(String),
}

impl fmt::Display for InvalidRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyUrl => write!(f, "URL is empty"),
            Self::MalformedUrl(url) => write!(f, "malformed URL: {}", url),
        }
    }
}

impl std::error::Error for InvalidRequest {}
