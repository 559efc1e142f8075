// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Cache repository: TTL'd response store plus the reservation queue.
//!
//! The scheduler consumes only the [`BundleCache`] contract; the concrete
//! store is an implementation detail behind it. The shipped backend is
//! SQLite for the lookup index and the reservation queue, with bulky
//! bodies on the filesystem under a hierarchical path (see [`path`]).
//!
//! # Modules
//!
//! - `key` - fixed-width SHA-256 cache keys
//! - `path` - hierarchical body file layout
//! - `sqlite` - the rusqlite-backed store

/// Fixed-width cache key derivation.
pub mod key;
/// On-disk body path derivation.
pub mod path;
/// SQLite store backend.
pub mod sqlite;

pub use sqlite::SqliteCache;

use crate::model::{ProxyRequest, ProxyResponse};
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// An index entry surfaced by expiry scans and the admin surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheItem {
    /// Lookup key (`bp:cache:<hex>`).
    pub key: String,
    /// Body file location, when the body is not stored inline.
    pub body_path: Option<PathBuf>,
    /// Expiry as Unix seconds.
    pub expires_at: u64,
}

/// Contract between the scheduler/workers and the cache store.
///
/// The store provides its own atomicity for get/set/reserve/pop; the
/// blocking pop guarantees at most one worker dequeues a reservation.
pub trait BundleCache: Send + Sync {
    /// Look up a cached response. An expired entry is a miss, never a
    /// stale hit.
    fn get_response(&self, key: &str) -> CacheResult<Option<ProxyResponse>>;

    /// Persist a response for `request` with the given TTL.
    fn set_response_with_ttl(
        &self,
        request: &ProxyRequest,
        response: &ProxyResponse,
        ttl: Duration,
    ) -> CacheResult<()>;

    /// Enqueue a cache-miss request for asynchronous fulfilment.
    fn reserve_request(&self, request: &ProxyRequest) -> CacheResult<()>;

    /// Dequeue the oldest reservation, blocking up to `timeout`.
    /// Pop removes -- a returned reservation is owned by the caller.
    fn blocking_pop_reservation(&self, timeout: Duration) -> CacheResult<Option<ProxyRequest>>;

    /// Drop any queued reservations matching `request`'s cache key.
    fn remove_reservation(&self, request: &ProxyRequest) -> CacheResult<()>;

    /// List entries whose TTL has elapsed.
    fn scan_expired(&self) -> CacheResult<Vec<CacheItem>>;

    /// Delete expired entries (index rows and body files); returns how
    /// many entries were removed. Idempotent when nothing new expired.
    fn delete_expired(&self) -> CacheResult<usize>;

    /// Number of queued reservations (admin surface).
    fn reservation_count(&self) -> CacheResult<usize>;

    /// Remove every entry and reservation (admin surface, tests).
    fn clear(&self) -> CacheResult<()>;
}

/// Errors from the cache store.
///
/// Callers degrade on these (direct gateway call or placeholder) rather
/// than failing the request.
#[derive(Debug)]
pub enum CacheError {
    Sqlite(rusqlite::Error),
    Io(io::Error),
    Serde(serde_json::Error),
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sqlite(e) => write!(f, "cache store error: {}", e),
            Self::Io(e) => write!(f, "cache I/O error: {}", e),
            Self::Serde(e) => write!(f, "cache serialization error: {}", e),
        }
    }
}

impl std::error::Error for CacheError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Sqlite(e) => Some(e),
            Self::Io(e) => Some(e),
            Self::Serde(e) => Some(e),
        }
    }
}

impl From<rusqlite::Error> for CacheError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Sqlite(e)
    }
}

impl From<io::Error> for CacheError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serde(e)
    }
}
