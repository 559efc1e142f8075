// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Cache-aside request scheduling.
//!
//! Incoming requests are answered from the cache whenever possible; a
//! miss is reserved for background fulfilment and answered immediately
//! with a placeholder, so the caller never blocks on the high-latency
//! link. Non-cacheable requests bypass the cache and pay the round trip.
//! The worker pool that drains reservations lives in [`worker`].

/// Worker pool and cleanup task.
pub mod worker;

pub use worker::{WorkerOptions, WorkerPool};

use crate::cache::BundleCache;
use crate::gateway::{GatewayResult, ProxyGateway};
use crate::model::{ProxyRequest, ProxyResponse};
use crate::placeholder::{self, PlaceholderSource};
use std::sync::Arc;
use std::time::Duration;

/// Front half of the cache-aside pattern: classify, look up, reserve.
///
/// State is owned by this struct and injected by the caller; there are no
/// process-global maps, so independent instances coexist and tests stay
/// deterministic.
pub struct Scheduler {
    cache: Arc<dyn BundleCache>,
    gateway: Arc<dyn ProxyGateway>,
    placeholders: Arc<dyn PlaceholderSource>,
    /// Deadline for the direct (cache-bypassing) gateway path.
    gateway_deadline: Duration,
}

impl Scheduler {
    pub fn new(
        cache: Arc<dyn BundleCache>,
        gateway: Arc<dyn ProxyGateway>,
        placeholders: Arc<dyn PlaceholderSource>,
        gateway_deadline: Duration,
    ) -> Self {
        Self {
            cache,
            gateway,
            placeholders,
            gateway_deadline,
        }
    }

    /// Handle one ingress request.
    ///
    /// Returns a response in every recoverable situation; an `Err` means
    /// not even a degraded answer was possible and the ingress layer maps
    /// it to an HTTP error status.
    pub fn handle_incoming(&self, request: &ProxyRequest) -> GatewayResult<ProxyResponse> {
        if !request.is_cacheable() {
            log::debug!(
                "[Scheduler] not cacheable: {} {}",
                request.method,
                request.url
            );
            return self.gateway.proxy_request(self.gateway_deadline, request);
        }

        let key = request.cache_key();
        match self.cache.get_response(&key) {
            Ok(Some(cached)) => {
                log::debug!("[Scheduler] cache hit: {}", request.url);
                return Ok(cached);
            }
            Ok(None) => {}
            Err(err) => {
                // Store trouble must not fail the request; fall back to
                // the direct path.
                log::warn!(
                    "[Scheduler] cache lookup failed for {}: {}",
                    request.url,
                    err
                );
                return self.gateway.proxy_request(self.gateway_deadline, request);
            }
        }

        log::debug!("[Scheduler] cache miss: {}", request.url);

        // Images are answered with a placeholder but not reserved.
        if placeholder::is_image_url(&request.url) {
            log::debug!("[Scheduler] image request, skipping reservation: {}", request.url);
        } else if let Err(err) = self.cache.reserve_request(request) {
            log::warn!(
                "[Scheduler] could not reserve {}: {}",
                request.url,
                err
            );
        }

        match self.placeholders.placeholder_for(&request.url) {
            Some((body, content_type)) => Ok(ProxyResponse::ok(body, content_type)),
            None => {
                log::error!(
                    "[Scheduler] no placeholder available for {}",
                    request.url
                );
                Ok(ProxyResponse::service_unavailable(
                    "content is being fetched over the delay-tolerant link; no placeholder available",
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::SqliteCache;
    use crate::gateway::GatewayError;
    use crate::placeholder::BuiltinPlaceholders;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Gateway stub counting calls and returning a canned response.
    pub(crate) struct StubGateway {
        pub calls: AtomicUsize,
        pub response: Mutex<GatewayResult<ProxyResponse>>,
    }

    impl StubGateway {
        pub(crate) fn responding(response: ProxyResponse) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                response: Mutex::new(Ok(response)),
            }
        }

        pub(crate) fn failing() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                response: Mutex::new(Err(GatewayError::Timeout)),
            }
        }
    }

    impl ProxyGateway for StubGateway {
        fn proxy_request(
            &self,
            _deadline: Duration,
            _request: &ProxyRequest,
        ) -> GatewayResult<ProxyResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &*self.response.lock() {
                Ok(resp) => Ok(resp.clone()),
                Err(GatewayError::Timeout) => Err(GatewayError::Timeout),
                Err(_) => Err(GatewayError::Shutdown),
            }
        }
    }

    fn scheduler_with(
        gateway: Arc<StubGateway>,
    ) -> (Scheduler, Arc<SqliteCache>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(SqliteCache::open_in_memory(dir.path()).unwrap());
        let scheduler = Scheduler::new(
            cache.clone(),
            gateway,
            Arc::new(BuiltinPlaceholders),
            Duration::from_secs(5),
        );
        (scheduler, cache, dir)
    }

    #[test]
    fn non_cacheable_requests_bypass_the_cache() {
        let gateway = Arc::new(StubGateway::responding(ProxyResponse::ok(
            b"posted".to_vec(),
            "text/plain",
        )));
        let (scheduler, cache, _dir) = scheduler_with(gateway.clone());

        let mut req = ProxyRequest::get("http://example.org/form");
        req.method = "POST".to_string();
        let resp = scheduler.handle_incoming(&req).unwrap();

        assert_eq!(resp.body, b"posted");
        assert_eq!(gateway.calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.reservation_count().unwrap(), 0);
    }

    #[test]
    fn miss_reserves_and_returns_placeholder() {
        let gateway = Arc::new(StubGateway::failing());
        let (scheduler, cache, _dir) = scheduler_with(gateway.clone());

        let req = ProxyRequest::get("http://example.org/article");
        let resp = scheduler.handle_incoming(&req).unwrap();

        assert_eq!(resp.status_code, 200, "placeholder is a 200");
        assert!(resp.content_type.starts_with("text/html"));
        assert_eq!(cache.reservation_count().unwrap(), 1);
        assert_eq!(
            gateway.calls.load(Ordering::SeqCst),
            0,
            "miss path never touches the gateway"
        );
    }

    #[test]
    fn image_miss_is_not_reserved() {
        let gateway = Arc::new(StubGateway::failing());
        let (scheduler, cache, _dir) = scheduler_with(gateway);

        let resp = scheduler
            .handle_incoming(&ProxyRequest::get("http://example.org/logo.png"))
            .unwrap();
        assert_eq!(resp.status_code, 200);
        assert_eq!(resp.content_type, "image/gif");
        assert_eq!(cache.reservation_count().unwrap(), 0);
    }

    #[test]
    fn hit_is_served_without_touching_the_gateway() {
        let gateway = Arc::new(StubGateway::failing());
        let (scheduler, cache, _dir) = scheduler_with(gateway.clone());

        let req = ProxyRequest::get("http://example.org/cached");
        cache
            .set_response_with_ttl(
                &req,
                &ProxyResponse::ok(b"cached body".to_vec(), "text/html"),
                Duration::from_secs(60),
            )
            .unwrap();

        let resp = scheduler.handle_incoming(&req).unwrap();
        assert_eq!(resp.body, b"cached body");
        assert_eq!(gateway.calls.load(Ordering::SeqCst), 0);
        assert_eq!(cache.reservation_count().unwrap(), 0, "hit adds no reservation");
    }

    #[test]
    fn session_request_is_not_served_from_anonymous_cache() {
        let gateway = Arc::new(StubGateway::responding(ProxyResponse::ok(
            b"private".to_vec(),
            "text/html",
        )));
        let (scheduler, cache, _dir) = scheduler_with(gateway.clone());

        // Anonymous entry for the URL.
        let anon = ProxyRequest::get("http://example.org/a");
        cache
            .set_response_with_ttl(
                &anon,
                &ProxyResponse::ok(b"public".to_vec(), "text/html"),
                Duration::from_secs(60),
            )
            .unwrap();

        // Same URL with a session cookie is classified user-specific and
        // never touches the anonymous entry.
        let mut scoped = ProxyRequest::get("http://example.org/a");
        scoped
            .headers
            .insert("Cookie".to_string(), vec!["session=abc".to_string()]);
        let resp = scheduler.handle_incoming(&scoped).unwrap();

        assert_eq!(resp.body, b"private");
        assert_eq!(gateway.calls.load(Ordering::SeqCst), 1, "went to the gateway");
    }
}
