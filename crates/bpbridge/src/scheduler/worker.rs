// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Background fulfilment of reserved cache misses.
//!
//! N workers drain the reservation queue: pop, re-check the cache (a
//! concurrent fetch may have landed first), carry the request over the
//! gateway, persist a 200 with the default TTL. Every reservation is
//! removed after exactly one processing attempt -- success, non-200,
//! gateway error and persist error alike -- so the queue always makes
//! forward progress and a key can never wedge behind a stuck duplicate.
//! A separate task sweeps expired entries on a fixed interval.

use crate::cache::BundleCache;
use crate::gateway::ProxyGateway;
use crate::model::ProxyRequest;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Tuning knobs for the worker pool.
#[derive(Debug, Clone)]
pub struct WorkerOptions {
    /// Number of worker threads draining the reservation queue.
    pub workers: usize,
    /// How long one pop blocks before re-checking for shutdown.
    pub pop_timeout: Duration,
    /// TTL applied to responses persisted by workers.
    pub default_ttl: Duration,
    /// Deadline passed to the gateway for each background fetch.
    pub gateway_deadline: Duration,
    /// Interval between expiry sweeps.
    pub cleanup_interval: Duration,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            workers: 5,
            pop_timeout: Duration::from_secs(5),
            default_ttl: Duration::from_secs(24 * 60 * 60),
            gateway_deadline: Duration::from_secs(180),
            cleanup_interval: Duration::from_secs(5 * 60),
        }
    }
}

/// Handle over the worker threads and the cleanup task.
pub struct WorkerPool {
    shutdown: Arc<AtomicBool>,
    cleanup_signal: Arc<(Mutex<bool>, Condvar)>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn the workers and the cleanup task.
    pub fn start(
        cache: Arc<dyn BundleCache>,
        gateway: Arc<dyn ProxyGateway>,
        opts: WorkerOptions,
    ) -> Self {
        let shutdown = Arc::new(AtomicBool::new(false));
        let cleanup_signal = Arc::new((Mutex::new(false), Condvar::new()));
        let mut handles = Vec::with_capacity(opts.workers + 1);

        for worker_id in 0..opts.workers {
            let cache = Arc::clone(&cache);
            let gateway = Arc::clone(&gateway);
            let shutdown = Arc::clone(&shutdown);
            let opts = opts.clone();
            let handle = std::thread::Builder::new()
                .name(format!("bp-worker-{}", worker_id))
                .spawn(move || worker_loop(worker_id, cache, gateway, opts, shutdown))
                .expect("spawn worker thread");
            handles.push(handle);
        }

        {
            let cache = Arc::clone(&cache);
            let signal = Arc::clone(&cleanup_signal);
            let interval = opts.cleanup_interval;
            let handle = std::thread::Builder::new()
                .name("bp-cleanup".into())
                .spawn(move || cleanup_loop(cache, interval, signal))
                .expect("spawn cleanup thread");
            handles.push(handle);
        }

        log::info!("[WorkerPool] started {} workers", opts.workers);
        Self {
            shutdown,
            cleanup_signal,
            handles,
        }
    }

    /// Stop all threads and wait for them to finish.
    pub fn shutdown(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        {
            let (lock, cv) = &*self.cleanup_signal;
            *lock.lock() = true;
            cv.notify_all();
        }
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
        log::info!("[WorkerPool] stopped");
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(
    worker_id: usize,
    cache: Arc<dyn BundleCache>,
    gateway: Arc<dyn ProxyGateway>,
    opts: WorkerOptions,
    shutdown: Arc<AtomicBool>,
) {
    while !shutdown.load(Ordering::SeqCst) {
        let request = match cache.blocking_pop_reservation(opts.pop_timeout) {
            Ok(Some(request)) => request,
            Ok(None) => continue,
            Err(err) => {
                log::warn!("[Worker {}] reservation pop failed: {}", worker_id, err);
                std::thread::sleep(Duration::from_millis(500));
                continue;
            }
        };
        handle_reservation(worker_id, &*cache, &*gateway, &opts, &request);
    }
    log::debug!("[Worker {}] exited", worker_id);
}

/// Process one reservation. Exactly one attempt; the reservation (and any
/// queued duplicates for the same key) is removed on every outcome.
fn handle_reservation(
    worker_id: usize,
    cache: &dyn BundleCache,
    gateway: &dyn ProxyGateway,
    opts: &WorkerOptions,
    request: &ProxyRequest,
) {
    log::debug!("[Worker {}] processing {}", worker_id, request.url);

    // A concurrent fetch may have completed while this one sat queued.
    let key = request.cache_key();
    match cache.get_response(&key) {
        Ok(Some(_)) => {
            log::debug!(
                "[Worker {}] {} already cached, dropping reservation",
                worker_id,
                request.url
            );
            remove_reservation(worker_id, cache, request);
            return;
        }
        Ok(None) => {}
        Err(err) => {
            // Lookup trouble does not abort the fetch.
            log::warn!(
                "[Worker {}] cache re-check failed for {}: {}",
                worker_id,
                request.url,
                err
            );
        }
    }

    match gateway.proxy_request(opts.gateway_deadline, request) {
        Ok(response) if response.status_code == 200 => {
            if let Err(err) = cache.set_response_with_ttl(request, &response, opts.default_ttl) {
                log::warn!(
                    "[Worker {}] could not persist {}: {}",
                    worker_id,
                    request.url,
                    err
                );
            } else {
                log::info!(
                    "[Worker {}] cached {} ({} bytes)",
                    worker_id,
                    request.url,
                    response.body.len()
                );
            }
        }
        Ok(response) => {
            log::info!(
                "[Worker {}] not caching {} (status {})",
                worker_id,
                request.url,
                response.status_code
            );
        }
        Err(err) => {
            log::warn!(
                "[Worker {}] fetch failed for {}: {}",
                worker_id,
                request.url,
                err
            );
        }
    }

    // Single attempt, no automatic retry.
    remove_reservation(worker_id, cache, request);
}

fn remove_reservation(worker_id: usize, cache: &dyn BundleCache, request: &ProxyRequest) {
    if let Err(err) = cache.remove_reservation(request) {
        log::warn!(
            "[Worker {}] could not remove reservation for {}: {}",
            worker_id,
            request.url,
            err
        );
    }
}

fn cleanup_loop(
    cache: Arc<dyn BundleCache>,
    interval: Duration,
    signal: Arc<(Mutex<bool>, Condvar)>,
) {
    let (lock, cv) = &*signal;
    loop {
        {
            let mut stopped = lock.lock();
            if *stopped {
                break;
            }
            if !cv.wait_for(&mut stopped, interval).timed_out() && *stopped {
                break;
            }
        }
        match cache.delete_expired() {
            Ok(0) => {}
            Ok(removed) => log::info!("[Cleanup] removed {} expired entries", removed),
            Err(err) => log::warn!("[Cleanup] expiry sweep failed: {}", err),
        }
    }
    log::debug!("[Cleanup] exited");
}
