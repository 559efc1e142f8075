// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Cache key derivation.
//!
//! The key digests method + URL plus the headers that scope content to a
//! user or a representation: Authorization and session/auth/token cookies
//! for user-specific requests, Accept and Accept-Language always. The
//! SHA-256 hex rendering keeps store keys fixed-width regardless of URL
//! length.

use crate::model::ProxyRequest;
use sha2::{Digest, Sha256};

/// Prefix namespacing bpbridge entries inside a shared store.
const KEY_PREFIX: &str = "bp:cache:";

/// Representation-relevant headers always folded into the key.
const VARY_HEADERS: [&str; 2] = ["Accept", "Accept-Language"];

/// Derive the cache key for a request.
///
/// Two requests for the same URL with distinct session cookies produce
/// distinct keys; anonymous requests share one key per URL/representation.
pub fn cache_key(request: &ProxyRequest) -> String {
    let mut base = format!("{}:{}", request.method, request.url);

    let mut parts: Vec<String> = Vec::new();
    if request.is_user_specific() {
        if let Some(auth) = request.header_values("Authorization") {
            parts.push(format!("auth:{}", auth.join(",")));
        }
        if let Some(cookies) = request.header_values("Cookie") {
            for cookie in cookies {
                let lowered = cookie.to_ascii_lowercase();
                if lowered.contains("session")
                    || lowered.contains("auth")
                    || lowered.contains("token")
                {
                    parts.push(format!("cookie:{}", cookie));
                }
            }
        }
    }
    for name in VARY_HEADERS {
        if let Some(values) = request.header_values(name) {
            parts.push(format!("{}:{}", name, values.join(",")));
        }
    }

    if !parts.is_empty() {
        parts.sort();
        base.push(':');
        base.push_str(&parts.join("|"));
    }

    let digest = Sha256::digest(base.as_bytes());
    let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
    format!("{}{}", KEY_PREFIX, hex)
}
