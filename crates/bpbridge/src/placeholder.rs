// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Placeholder content for cache misses.
//!
//! On a miss the scheduler answers immediately with stand-in content while
//! a worker fetches the real thing in the background. Actual page
//! generation is an external collaborator; [`PlaceholderSource`] is its
//! seam, and [`BuiltinPlaceholders`] is the minimal shipped fallback.

use mime_guess::from_path;

/// Supplies stand-in content for a URL whose fetch is still in flight.
pub trait PlaceholderSource: Send + Sync {
    /// Placeholder body and content type for `url`, or `None` when no
    /// stand-in can be produced (the scheduler then answers 503).
    fn placeholder_for(&self, url: &str) -> Option<(Vec<u8>, String)>;
}

/// Content type inferred from the URL's path extension, if any.
pub fn content_type_for_url(url: &str) -> Option<&'static str> {
    from_path(url_path(url)).first_raw()
}

/// Whether the URL looks like an image resource. Image misses are served
/// a placeholder but never reserved for background fetching.
pub fn is_image_url(url: &str) -> bool {
    content_type_for_url(url).is_some_and(|ct| ct.starts_with("image/"))
}

/// Path portion of an absolute URL, without query or fragment.
fn url_path(url: &str) -> &str {
    let rest = url.split_once("://").map_or(url, |(_, r)| r);
    let end = rest.find(|c| c == '?' || c == '#').unwrap_or(rest.len());
    let rest = &rest[..end];
    rest.find('/').map_or("", |idx| &rest[idx..])
}

/// A 1x1 transparent GIF, the classic stand-in pixel.
const PLACEHOLDER_PIXEL: &[u8] = &[
    0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x01, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x21, 0xF9, 0x04, 0x01, 0x00, 0x00, 0x00, 0x00, 0x2C, 0x00, 0x00,
    0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x02, 0x02, 0x44, 0x01, 0x00, 0x3B,
];

const PLACEHOLDER_PAGE: &str = "<!DOCTYPE html>\n<html>\n<head><meta http-equiv=\"refresh\" content=\"30\"><title>Fetching over DTN</title></head>\n<body>\n<h1>Content requested</h1>\n<p>This page is being fetched over the delay-tolerant link.\nIt will be available on a later visit; this page refreshes automatically.</p>\n</body>\n</html>\n";

/// Minimal built-in placeholder set: a refresh page for documents, a
/// transparent pixel for images.
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinPlaceholders;

impl PlaceholderSource for BuiltinPlaceholders {
    fn placeholder_for(&self, url: &str) -> Option<(Vec<u8>, String)> {
        match content_type_for_url(url) {
            Some(ct) if ct.starts_with("image/") => {
                Some((PLACEHOLDER_PIXEL.to_vec(), "image/gif".to_string()))
            }
            _ => Some((
                PLACEHOLDER_PAGE.as_bytes().to_vec(),
                "text/html; charset=utf-8".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_urls_are_detected_by_extension() {
        assert!(is_image_url("http://example.org/logo.png"));
        assert!(is_image_url("http://example.org/photo.jpg?size=2"));
        assert!(!is_image_url("http://example.org/page.html"));
        assert!(!is_image_url("http://example.org/"));
    }

    #[test]
    fn builtin_serves_pixel_for_images() {
        let (body, ct) = BuiltinPlaceholders.placeholder_for("http://e/x.gif").unwrap();
        assert_eq!(ct, "image/gif");
        assert_eq!(&body[..3], b"GIF");
    }

    #[test]
    fn builtin_serves_page_for_documents() {
        let (body, ct) = BuiltinPlaceholders
            .placeholder_for("http://example.org/article")
            .unwrap();
        assert!(ct.starts_with("text/html"));
        assert!(String::from_utf8(body).unwrap().contains("delay-tolerant"));
    }
}
