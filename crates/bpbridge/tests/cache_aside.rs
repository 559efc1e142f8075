// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! End-to-end cache-aside behavior: scheduler + worker pool + gateway
//! over an in-memory bundle transport.

use bpbridge::bp::BundleTx;
use bpbridge::cache::BundleCache;
use bpbridge::gateway::envelope::{RequestEnvelope, ResponseEnvelope};
use bpbridge::placeholder::BuiltinPlaceholders;
use bpbridge::{
    BundleGateway, ProxyRequest, ProxyResponse, Scheduler, SqliteCache, WorkerOptions, WorkerPool,
};
use crossbeam::channel::{unbounded, Sender};
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// In-memory stand-in for the remote side: decodes each request bundle,
/// "fetches" a canned document, and queues the response bundle back.
struct RemoteStub {
    queue_tx: Sender<Vec<u8>>,
    status_code: u16,
    fetches: AtomicUsize,
}

impl RemoteStub {
    fn new(queue_tx: Sender<Vec<u8>>, status_code: u16) -> Self {
        Self {
            queue_tx,
            status_code,
            fetches: AtomicUsize::new(0),
        }
    }
}

impl BundleTx for RemoteStub {
    fn send(&self, payload: &[u8]) -> io::Result<()> {
        let request = RequestEnvelope::decode(payload)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
        self.fetches.fetch_add(1, Ordering::SeqCst);

        let mut response = ProxyResponse::ok(
            format!("remote content for {}", request.url).into_bytes(),
            "text/html; charset=utf-8",
        );
        response.status_code = self.status_code;
        let envelope = ResponseEnvelope::from_response(&request.request_id, &response);
        self.queue_tx
            .send(envelope.encode().expect("encodable response"))
            .expect("response queue alive");
        Ok(())
    }
}

struct Harness {
    scheduler: Scheduler,
    cache: Arc<SqliteCache>,
    remote: Arc<RemoteStub>,
    pool: WorkerPool,
    _dir: tempfile::TempDir,
}

fn harness(status_code: u16) -> Harness {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = tempfile::tempdir().unwrap();
    let cache = Arc::new(SqliteCache::open_in_memory(dir.path()).unwrap());

    let (queue_tx, queue_rx) = unbounded();
    let remote = Arc::new(RemoteStub::new(queue_tx, status_code));
    let gateway = Arc::new(BundleGateway::new(remote.clone(), queue_rx));

    let scheduler = Scheduler::new(
        cache.clone(),
        gateway.clone(),
        Arc::new(BuiltinPlaceholders),
        Duration::from_secs(5),
    );
    let pool = WorkerPool::start(
        cache.clone(),
        gateway,
        WorkerOptions {
            workers: 2,
            pop_timeout: Duration::from_millis(50),
            default_ttl: Duration::from_secs(300),
            gateway_deadline: Duration::from_secs(5),
            cleanup_interval: Duration::from_secs(3600),
        },
    );

    Harness {
        scheduler,
        cache,
        remote,
        pool,
        _dir: dir,
    }
}

fn wait_until(limit: Duration, mut done: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < limit {
        if done() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    false
}

#[test]
fn fresh_get_misses_then_serves_from_cache() {
    let mut h = harness(200);
    let request = ProxyRequest::get("http://example.org/a");

    // (a) First request: miss -> reservation -> immediate placeholder.
    let first = h.scheduler.handle_incoming(&request).unwrap();
    assert_eq!(first.status_code, 200);
    assert!(first.content_type.starts_with("text/html"));
    assert!(
        String::from_utf8_lossy(&first.body).contains("delay-tolerant"),
        "placeholder body served immediately"
    );

    // (b) A worker fetches over the bundle link and persists the 200.
    assert!(wait_until(Duration::from_secs(5), || {
        h.cache.get_response(&request.cache_key()).unwrap().is_some()
    }));
    assert!(wait_until(Duration::from_secs(5), || {
        h.cache.reservation_count().unwrap() == 0
    }));

    // (c) Replaying the identical GET is served from the cache, with no
    // new reservation and no second bundle exchange.
    let fetches_before = h.remote.fetches.load(Ordering::SeqCst);
    let second = h.scheduler.handle_incoming(&request).unwrap();
    assert_eq!(second.status_code, 200);
    assert_eq!(
        String::from_utf8_lossy(&second.body),
        "remote content for http://example.org/a"
    );
    assert_eq!(h.cache.reservation_count().unwrap(), 0);
    assert_eq!(h.remote.fetches.load(Ordering::SeqCst), fetches_before);

    h.pool.shutdown();
}

#[test]
fn non_200_remote_result_is_not_cached() {
    let mut h = harness(502);
    let request = ProxyRequest::get("http://example.org/broken");

    let first = h.scheduler.handle_incoming(&request).unwrap();
    assert_eq!(first.status_code, 200, "placeholder regardless of remote state");

    assert!(wait_until(Duration::from_secs(5), || {
        h.remote.fetches.load(Ordering::SeqCst) >= 1
            && h.cache.reservation_count().unwrap() == 0
    }));
    // The reservation is gone, nothing was cached, nothing is retried.
    std::thread::sleep(Duration::from_millis(200));
    assert!(h.cache.get_response(&request.cache_key()).unwrap().is_none());
    assert_eq!(h.remote.fetches.load(Ordering::SeqCst), 1);

    h.pool.shutdown();
}

#[test]
fn session_cookies_scope_cache_keys() {
    let url = "http://example.org/account";
    let mut alice = ProxyRequest::get(url);
    alice
        .headers
        .insert("Cookie".to_string(), vec!["session=alice".to_string()]);
    let mut bob = ProxyRequest::get(url);
    bob.headers
        .insert("Cookie".to_string(), vec!["session=bob".to_string()]);
    let anon = ProxyRequest::get(url);

    assert!(alice.is_user_specific());
    assert_ne!(alice.cache_key(), bob.cache_key());
    assert_ne!(alice.cache_key(), anon.cache_key());
}

#[test]
fn user_specific_request_bypasses_the_anonymous_cache() {
    let mut h = harness(200);
    let url = "http://example.org/profile";

    // Prime the anonymous cache for the URL.
    let anon = ProxyRequest::get(url);
    h.cache
        .set_response_with_ttl(
            &anon,
            &ProxyResponse::ok(b"anonymous view".to_vec(), "text/html"),
            Duration::from_secs(300),
        )
        .unwrap();

    // A session-scoped request must go over the link instead.
    let mut scoped = ProxyRequest::get(url);
    scoped
        .headers
        .insert("Cookie".to_string(), vec!["session=abc".to_string()]);
    let response = h.scheduler.handle_incoming(&scoped).unwrap();

    assert_eq!(
        String::from_utf8_lossy(&response.body),
        format!("remote content for {}", url)
    );
    assert_eq!(h.remote.fetches.load(Ordering::SeqCst), 1);

    h.pool.shutdown();
}

#[test]
fn expiry_sweep_is_idempotent_across_the_contract() {
    let h = harness(200);
    let request = ProxyRequest::get("http://example.org/short-lived");
    h.cache
        .set_response_with_ttl(
            &request,
            &ProxyResponse::ok(b"soon gone".to_vec(), "text/html"),
            Duration::ZERO,
        )
        .unwrap();

    let cache: &dyn BundleCache = &*h.cache;
    assert_eq!(cache.delete_expired().unwrap(), 1);
    assert_eq!(cache.delete_expired().unwrap(), 0, "second sweep is a no-op");
}
