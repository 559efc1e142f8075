// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error types for gateway operations.

use crate::gateway::envelope::EnvelopeError;
use std::fmt;
use std::io;

/// Result type for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Errors surfaced to a caller of `proxy_request`.
#[derive(Debug)]
pub enum GatewayError {
    /// The request bundle could not be handed to the transport.
    SendFailed(io::Error),

    /// No response arrived before the caller's deadline.
    Timeout,

    /// The caller's cancellation token fired.
    Cancelled,

    /// The gateway was shut down while the call was outstanding.
    Shutdown,

    /// Request serialization or response body decoding failed.
    Envelope(EnvelopeError),

    /// The request model failed validation.
    InvalidRequest(crate::model::InvalidRequest),
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SendFailed(e) => write!(f, "bundle send failed: {}", e),
            Self::Timeout => write!(f, "proxied request timed out"),
            Self::Cancelled => write!(f, "proxied request was cancelled"),
            Self::Shutdown => write!(f, "gateway shut down"),
            Self::Envelope(e) => write!(f, "envelope error: {}", e),
            Self::InvalidRequest(e) => write!(f, "invalid request: {}", e),
        }
    }
}

impl std::error::Error for GatewayError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::SendFailed(e) => Some(e),
            Self::Envelope(e) => Some(e),
            Self::InvalidRequest(e) => Some(e),
            _ => None,
        }
    }
}

impl From<EnvelopeError> for GatewayError {
    fn from(e: EnvelopeError) -> Self {
        Self::Envelope(e)
    }
}

impl From<crate::model::InvalidRequest> for GatewayError {
    fn from(e: crate::model::InvalidRequest) -> Self {
        Self::InvalidRequest(e)
    }
}
