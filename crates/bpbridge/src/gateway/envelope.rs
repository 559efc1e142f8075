// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Wire payloads carried inside bundles.
//!
//! Both sides exchange JSON records: a request envelope on the way out,
//! a response envelope on the way back, correlated by `request_id`.
//! Bodies travel base64-encoded. Required fields are validated at decode
//! time -- a missing request ID or an empty URL is a decode failure, not
//! a zero value.

use crate::model::{ProxyRequest, ProxyResponse};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Request payload sent as a bundle to the remote side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    pub request_id: String,
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub headers: HashMap<String, Vec<String>>,
    /// Base64-encoded body.
    #[serde(default)]
    pub body: String,
}

impl RequestEnvelope {
    /// Wrap a request model under the given correlation ID.
    pub fn from_request(request_id: &str, request: &ProxyRequest) -> Self {
        Self {
            request_id: request_id.to_string(),
            method: request.method.clone(),
            url: request.url.clone(),
            headers: request.headers.clone(),
            body: BASE64.encode(&request.body),
        }
    }

    /// Serialize to the JSON wire form.
    pub fn encode(&self) -> Result<Vec<u8>, EnvelopeError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parse and validate a received request payload.
    pub fn decode(payload: &[u8]) -> Result<Self, EnvelopeError> {
        let envelope: Self = serde_json::from_slice(payload)?;
        if envelope.request_id.is_empty() {
            return Err(EnvelopeError::MissingRequestId);
        }
        if envelope.url.is_empty() {
            return Err(EnvelopeError::MissingUrl);
        }
        Ok(envelope)
    }

    /// Reconstruct the request model (decodes the body).
    pub fn to_request(&self) -> Result<ProxyRequest, EnvelopeError> {
        let body = BASE64.decode(&self.body)?;
        let content_type = first_header(&self.headers, "Content-Type");
        let content_length = body.len() as i64;
        Ok(ProxyRequest {
            method: self.method.clone(),
            url: self.url.clone(),
            headers: self.headers.clone(),
            body,
            content_type,
            content_length,
        })
    }
}

/// Response payload received as a bundle from the remote side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub request_id: String,
    pub status_code: u16,
    #[serde(default)]
    pub headers: HashMap<String, Vec<String>>,
    /// Base64-encoded body.
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub content_type: String,
    #[serde(default)]
    pub content_length: i64,
}

impl ResponseEnvelope {
    /// Wrap a response model under the given correlation ID.
    pub fn from_response(request_id: &str, response: &ProxyResponse) -> Self {
        Self {
            request_id: request_id.to_string(),
            status_code: response.status_code,
            headers: response.headers.clone(),
            body: BASE64.encode(&response.body),
            content_type: response.content_type.clone(),
            content_length: response.content_length,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, EnvelopeError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parse and validate a received response payload.
    pub fn decode(payload: &[u8]) -> Result<Self, EnvelopeError> {
        let envelope: Self = serde_json::from_slice(payload)?;
        if envelope.request_id.is_empty() {
            return Err(EnvelopeError::MissingRequestId);
        }
        Ok(envelope)
    }

    /// Reconstruct the response model (decodes the body).
    pub fn to_response(&self) -> Result<ProxyResponse, EnvelopeError> {
        let body = BASE64.decode(&self.body)?;
        Ok(ProxyResponse {
            status_code: self.status_code,
            headers: self.headers.clone(),
            body,
            content_type: self.content_type.clone(),
            content_length: self.content_length,
        })
    }
}

fn first_header(headers: &HashMap<String, Vec<String>>, name: &str) -> String {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .and_then(|(_, v)| v.first())
        .cloned()
        .unwrap_or_default()
}

/// Envelope encode/decode failures.
#[derive(Debug)]
pub enum EnvelopeError {
    Json(serde_json::Error),
    Base64(base64::DecodeError),
    MissingRequestId,
    MissingUrl,
}

impl fmt::Display for EnvelopeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json(e) => write!(f, "JSON error: {}", e),
            Self::Base64(e) => write!(f, "base64 body error: {}", e),
            Self::MissingRequestId => write!(f, "request_id is missing or empty"),
            Self::MissingUrl => write!(f, "URL is missing or empty"),
        }
    }
}

impl std::error::Error for EnvelopeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Json(e) => Some(e),
            Self::Base64(e) => Some(e),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for EnvelopeError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e)
    }
}

impl From<base64::DecodeError> for EnvelopeError {
    fn from(e: base64::DecodeError) -> Self {
        Self::Base64(e)
    }
}
