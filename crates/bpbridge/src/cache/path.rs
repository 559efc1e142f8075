// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Hierarchical on-disk layout for cached response bodies.
//!
//! Bulky bodies are kept out of the lookup index and written under a path
//! derived from the request URL (host, then path segments) with an
//! extension matching the response content type. A short slice of the
//! cache key is folded into the file name so representations of one URL
//! (query strings, Accept variants) do not collide.

use mime_guess::get_mime_extensions_str;
use std::path::{Path, PathBuf};

/// Fallback extension when the content type maps to nothing.
const DEFAULT_EXT: &str = "bin";

/// File stem used for directory-style URLs (`/`, `/docs/`).
const INDEX_STEM: &str = "index";

/// Derive the body file path for a cached response.
pub fn body_path(cache_dir: &Path, url: &str, content_type: &str, cache_key: &str) -> PathBuf {
    let (host, url_path) = split_url(url);

    let mut path = cache_dir.join("bodies").join(sanitize(host));
    let mut segments: Vec<&str> = url_path.split('/').filter(|s| !s.is_empty()).collect();
    let stem = match segments.pop() {
        Some(last) => last,
        None => INDEX_STEM,
    };
    for segment in segments {
        path.push(sanitize(segment));
    }

    // Strip any URL extension; the stored one reflects the response type.
    let stem = stem.rsplit_once('.').map_or(stem, |(s, _)| s);
    let stem = if stem.is_empty() { INDEX_STEM } else { stem };
    let tag = key_tag(cache_key);
    path.push(format!(
        "{}-{}.{}",
        sanitize(stem),
        tag,
        extension_for(content_type)
    ));
    path
}

/// Host and path portions of an absolute URL, without scheme/query/fragment.
fn split_url(url: &str) -> (&str, &str) {
    let rest = url.split_once("://").map_or(url, |(_, r)| r);
    let end = rest.find(|c| c == '?' || c == '#').unwrap_or(rest.len());
    let rest = &rest[..end];
    match rest.find('/') {
        Some(idx) => (&rest[..idx], &rest[idx..]),
        None => (rest, ""),
    }
}

/// Keep path components filesystem-safe.
fn sanitize(segment: &str) -> String {
    segment
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn extension_for(content_type: &str) -> &str {
    let essence = content_type.split(';').next().unwrap_or("").trim();
    get_mime_extensions_str(essence)
        .and_then(|exts| exts.first())
        .copied()
        .unwrap_or(DEFAULT_EXT)
}

/// Short, stable tag from the hex tail of the cache key.
fn key_tag(cache_key: &str) -> &str {
    let hex = cache_key.rsplit(':').next().unwrap_or(cache_key);
    &hex[..hex.len().min(16)]
}
