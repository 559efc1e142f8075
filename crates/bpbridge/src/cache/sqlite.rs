// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! SQLite cache backend.
//!
//! One database holds the response index and the reservation queue;
//! response bodies above an inline threshold live on the filesystem under
//! the hierarchical layout of [`crate::cache::path`]. Thread-safe via an
//! internal Mutex (the SQLite `Connection` is not Sync); the reservation
//! queue adds a Condvar so `blocking_pop_reservation` sleeps instead of
//! polling.
//!
//! # Schema
//!
//! ```sql
//! CREATE TABLE cache_entries (
//!     key TEXT PRIMARY KEY,
//!     response TEXT NOT NULL,     -- ProxyResponse JSON (body emptied when external)
//!     body_path TEXT,             -- file location for external bodies
//!     expires_at INTEGER NOT NULL -- Unix seconds
//! );
//! CREATE TABLE reservations (
//!     id INTEGER PRIMARY KEY AUTOINCREMENT,
//!     request_key TEXT NOT NULL,
//!     request TEXT NOT NULL,      -- ProxyRequest JSON
//!     created_at INTEGER NOT NULL
//! );
//! ```

use crate::cache::{path, BundleCache, CacheError, CacheItem, CacheResult};
use crate::model::{ProxyRequest, ProxyResponse};
use parking_lot::{Condvar, Mutex};
use rusqlite::{params, Connection, OptionalExtension};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Bodies up to this many bytes are stored inline in the index row.
const DEFAULT_INLINE_LIMIT: usize = 4096;

/// SQLite-backed implementation of [`BundleCache`].
pub struct SqliteCache {
    conn: Mutex<Connection>,
    cache_dir: PathBuf,
    inline_limit: usize,
    queue_lock: Mutex<()>,
    queue_cv: Condvar,
}

impl SqliteCache {
    /// Open (or create) the store at `db_path`, with bodies under
    /// `cache_dir`.
    pub fn open(db_path: &Path, cache_dir: &Path) -> CacheResult<Self> {
        fs::create_dir_all(cache_dir)?;
        if let Some(parent) = db_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        Self::with_connection(conn, cache_dir)
    }

    /// In-memory index (bodies still go to `cache_dir`), for testing.
    pub fn open_in_memory(cache_dir: &Path) -> CacheResult<Self> {
        fs::create_dir_all(cache_dir)?;
        let conn = Connection::open_in_memory()?;
        Self::with_connection(conn, cache_dir)
    }

    fn with_connection(conn: Connection, cache_dir: &Path) -> CacheResult<Self> {
        let store = Self {
            conn: Mutex::new(conn),
            cache_dir: cache_dir.to_path_buf(),
            inline_limit: DEFAULT_INLINE_LIMIT,
            queue_lock: Mutex::new(()),
            queue_cv: Condvar::new(),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> CacheResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "CREATE TABLE IF NOT EXISTS cache_entries (
                key TEXT PRIMARY KEY,
                response TEXT NOT NULL,
                body_path TEXT,
                expires_at INTEGER NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_expires ON cache_entries(expires_at)",
            [],
        )?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS reservations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                request_key TEXT NOT NULL,
                request TEXT NOT NULL,
                created_at INTEGER NOT NULL
            )",
            [],
        )?;
        Ok(())
    }

    /// Dequeue the oldest reservation, if any, in one transaction.
    fn try_pop(&self) -> CacheResult<Option<ProxyRequest>> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let row: Option<(i64, String)> = tx
            .query_row(
                "SELECT id, request FROM reservations ORDER BY id LIMIT 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let Some((id, request_json)) = row else {
            return Ok(None);
        };
        tx.execute("DELETE FROM reservations WHERE id = ?1", params![id])?;
        tx.commit()?;

        match serde_json::from_str(&request_json) {
            Ok(request) => Ok(Some(request)),
            Err(err) => {
                // The row is gone either way; a corrupt reservation must
                // not wedge the queue.
                log::warn!("[Cache] dropping undecodable reservation {}: {}", id, err);
                Ok(None)
            }
        }
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

impl BundleCache for SqliteCache {
    fn get_response(&self, key: &str) -> CacheResult<Option<ProxyResponse>> {
        let row: Option<(String, Option<String>, i64)> = {
            let conn = self.conn.lock();
            conn.query_row(
                "SELECT response, body_path, expires_at FROM cache_entries WHERE key = ?1",
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?
        };
        let Some((response_json, body_path, expires_at)) = row else {
            return Ok(None);
        };

        // Read-time TTL enforcement: an expired entry is a miss and is
        // left for the sweep to delete.
        if expires_at <= now_secs() as i64 {
            log::debug!("[Cache] entry {} expired, treating as miss", key);
            return Ok(None);
        }

        let mut response: ProxyResponse = serde_json::from_str(&response_json)?;
        if let Some(body_path) = body_path {
            match fs::read(&body_path) {
                Ok(body) => response.body = body,
                Err(err) => {
                    log::warn!(
                        "[Cache] body file {} unreadable, treating {} as miss: {}",
                        body_path,
                        key,
                        err
                    );
                    return Ok(None);
                }
            }
        }
        Ok(Some(response))
    }

    fn set_response_with_ttl(
        &self,
        request: &ProxyRequest,
        response: &ProxyResponse,
        ttl: Duration,
    ) -> CacheResult<()> {
        let key = request.cache_key();
        let expires_at = now_secs() + ttl.as_secs();

        let (stored, body_path) = if response.body.len() > self.inline_limit {
            let file = path::body_path(&self.cache_dir, &request.url, &response.content_type, &key);
            if let Some(parent) = file.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&file, &response.body)?;
            let mut stripped = response.clone();
            stripped.body = Vec::new();
            (stripped, Some(file.to_string_lossy().into_owned()))
        } else {
            (response.clone(), None)
        };
        let response_json = serde_json::to_string(&stored)?;

        // Replacing an entry must not leak a previous body file.
        let old_path: Option<Option<String>> = {
            let conn = self.conn.lock();
            conn.query_row(
                "SELECT body_path FROM cache_entries WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?
        };
        if let Some(Some(old)) = old_path {
            if Some(&old) != body_path.as_ref() {
                let _ = fs::remove_file(&old);
            }
        }

        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO cache_entries (key, response, body_path, expires_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![key, response_json, body_path, expires_at as i64],
        )?;
        log::debug!(
            "[Cache] stored {} ({} bytes, ttl {}s)",
            key,
            response.body.len(),
            ttl.as_secs()
        );
        Ok(())
    }

    fn reserve_request(&self, request: &ProxyRequest) -> CacheResult<()> {
        let key = request.cache_key();
        let request_json = serde_json::to_string(request)?;
        {
            let conn = self.conn.lock();
            conn.execute(
                "INSERT INTO reservations (request_key, request, created_at)
                 VALUES (?1, ?2, ?3)",
                params![key, request_json, now_secs() as i64],
            )?;
        }
        log::debug!("[Cache] reserved {} for {}", key, request.url);

        // Taken after the insert so a popper between its empty check and
        // its wait cannot miss the wakeup.
        let _guard = self.queue_lock.lock();
        self.queue_cv.notify_one();
        Ok(())
    }

    fn blocking_pop_reservation(&self, timeout: Duration) -> CacheResult<Option<ProxyRequest>> {
        let deadline = Instant::now() + timeout;
        let mut guard = self.queue_lock.lock();
        loop {
            if let Some(request) = self.try_pop()? {
                return Ok(Some(request));
            }
            if self.queue_cv.wait_until(&mut guard, deadline).timed_out() {
                return self.try_pop();
            }
        }
    }

    fn remove_reservation(&self, request: &ProxyRequest) -> CacheResult<()> {
        let key = request.cache_key();
        let conn = self.conn.lock();
        let removed = conn.execute(
            "DELETE FROM reservations WHERE request_key = ?1",
            params![key],
        )?;
        if removed > 0 {
            log::debug!("[Cache] removed {} reservation(s) for {}", removed, key);
        }
        Ok(())
    }

    fn scan_expired(&self) -> CacheResult<Vec<CacheItem>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT key, body_path, expires_at FROM cache_entries WHERE expires_at <= ?1",
        )?;
        let items = stmt
            .query_map(params![now_secs() as i64], |row| {
                let body_path: Option<String> = row.get(1)?;
                Ok(CacheItem {
                    key: row.get(0)?,
                    body_path: body_path.map(PathBuf::from),
                    expires_at: row.get::<_, i64>(2)? as u64,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(items)
    }

    fn delete_expired(&self) -> CacheResult<usize> {
        let expired = self.scan_expired()?;
        for item in &expired {
            if let Some(body_path) = &item.body_path {
                match fs::remove_file(body_path) {
                    Ok(()) => {}
                    Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                    Err(err) => {
                        log::warn!(
                            "[Cache] could not remove body file {}: {}",
                            body_path.display(),
                            err
                        );
                    }
                }
            }
        }
        let conn = self.conn.lock();
        let removed = conn.execute(
            "DELETE FROM cache_entries WHERE expires_at <= ?1",
            params![now_secs() as i64],
        )?;
        if removed > 0 {
            log::info!("[Cache] expired {} cache entries", removed);
        }
        Ok(removed)
    }

    fn reservation_count(&self) -> CacheResult<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM reservations", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn clear(&self) -> CacheResult<()> {
        let paths: Vec<String> = {
            let conn = self.conn.lock();
            let mut stmt =
                conn.prepare("SELECT body_path FROM cache_entries WHERE body_path IS NOT NULL")?;
            let paths = stmt
                .query_map([], |row| row.get(0))?
                .collect::<Result<Vec<_>, _>>()?;
            paths
        };
        for body_path in paths {
            let _ = fs::remove_file(&body_path);
        }
        let conn = self.conn.lock();
        conn.execute("DELETE FROM cache_entries", [])?;
        conn.execute("DELETE FROM reservations", [])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn store() -> (SqliteCache, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let cache = SqliteCache::open_in_memory(dir.path()).unwrap();
        (cache, dir)
    }

    fn sample_response(body: Vec<u8>) -> ProxyResponse {
        ProxyResponse::ok(body, "text/html; charset=utf-8")
    }

    #[test]
    fn set_then_get_roundtrip_inline() {
        let (cache, _dir) = store();
        let req = ProxyRequest::get("http://example.org/a");
        let resp = sample_response(b"<html>hi</html>".to_vec());

        cache
            .set_response_with_ttl(&req, &resp, Duration::from_secs(60))
            .unwrap();
        let got = cache.get_response(&req.cache_key()).unwrap().unwrap();
        assert_eq!(got, resp);
    }

    #[test]
    fn large_body_is_stored_under_the_body_tree() {
        let (cache, dir) = store();
        let req = ProxyRequest::get("http://example.org/big/page");
        let resp = sample_response(vec![0x42u8; 10_000]);

        cache
            .set_response_with_ttl(&req, &resp, Duration::from_secs(60))
            .unwrap();

        let bodies = dir.path().join("bodies").join("example.org");
        assert!(bodies.exists(), "hierarchical body dir created");

        let got = cache.get_response(&req.cache_key()).unwrap().unwrap();
        assert_eq!(got.body, resp.body);
    }

    #[test]
    fn expired_entry_is_a_miss() {
        let (cache, _dir) = store();
        let req = ProxyRequest::get("http://example.org/stale");
        cache
            .set_response_with_ttl(&req, &sample_response(b"old".to_vec()), Duration::ZERO)
            .unwrap();
        assert!(cache.get_response(&req.cache_key()).unwrap().is_none());
    }

    #[test]
    fn delete_expired_is_idempotent() {
        let (cache, dir) = store();
        let stale = ProxyRequest::get("http://example.org/stale");
        let fresh = ProxyRequest::get("http://example.org/fresh");
        cache
            .set_response_with_ttl(&stale, &sample_response(vec![1u8; 10_000]), Duration::ZERO)
            .unwrap();
        cache
            .set_response_with_ttl(&fresh, &sample_response(b"keep".to_vec()), Duration::from_secs(300))
            .unwrap();

        assert_eq!(cache.delete_expired().unwrap(), 1);
        // Nothing newly expired: the second sweep is a no-op.
        assert_eq!(cache.delete_expired().unwrap(), 0);
        assert!(cache.get_response(&fresh.cache_key()).unwrap().is_some());

        // The stale entry's body file is gone with it.
        let mut leftover = Vec::new();
        for entry in walk(dir.path().join("bodies")) {
            leftover.push(entry);
        }
        assert!(leftover.iter().all(|p| !p.to_string_lossy().contains("stale")));
    }

    fn walk(root: PathBuf) -> Vec<PathBuf> {
        let mut files = Vec::new();
        let mut stack = vec![root];
        while let Some(dir) = stack.pop() {
            let Ok(entries) = fs::read_dir(&dir) else { continue };
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_dir() {
                    stack.push(path);
                } else {
                    files.push(path);
                }
            }
        }
        files
    }

    #[test]
    fn reservations_pop_in_fifo_order() {
        let (cache, _dir) = store();
        cache
            .reserve_request(&ProxyRequest::get("http://example.org/first"))
            .unwrap();
        cache
            .reserve_request(&ProxyRequest::get("http://example.org/second"))
            .unwrap();

        let first = cache
            .blocking_pop_reservation(Duration::from_millis(10))
            .unwrap()
            .unwrap();
        assert_eq!(first.url, "http://example.org/first");
        let second = cache
            .blocking_pop_reservation(Duration::from_millis(10))
            .unwrap()
            .unwrap();
        assert_eq!(second.url, "http://example.org/second");
    }

    #[test]
    fn pop_consumes_exactly_once() {
        let (cache, _dir) = store();
        cache
            .reserve_request(&ProxyRequest::get("http://example.org/one"))
            .unwrap();

        assert!(cache
            .blocking_pop_reservation(Duration::from_millis(10))
            .unwrap()
            .is_some());
        assert!(cache
            .blocking_pop_reservation(Duration::from_millis(10))
            .unwrap()
            .is_none());
    }

    #[test]
    fn pop_times_out_on_an_empty_queue() {
        let (cache, _dir) = store();
        let started = Instant::now();
        let popped = cache
            .blocking_pop_reservation(Duration::from_millis(50))
            .unwrap();
        assert!(popped.is_none());
        assert!(started.elapsed() >= Duration::from_millis(40));
    }

    #[test]
    fn pop_wakes_when_a_reservation_arrives() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(SqliteCache::open_in_memory(dir.path()).unwrap());

        let popper = {
            let cache = Arc::clone(&cache);
            std::thread::spawn(move || cache.blocking_pop_reservation(Duration::from_secs(5)))
        };
        std::thread::sleep(Duration::from_millis(100));
        cache
            .reserve_request(&ProxyRequest::get("http://example.org/wake"))
            .unwrap();

        let popped = popper.join().unwrap().unwrap().unwrap();
        assert_eq!(popped.url, "http://example.org/wake");
    }

    #[test]
    fn remove_reservation_clears_duplicates_for_a_key() {
        let (cache, _dir) = store();
        let req = ProxyRequest::get("http://example.org/dup");
        cache.reserve_request(&req).unwrap();
        cache.reserve_request(&req).unwrap();
        assert_eq!(cache.reservation_count().unwrap(), 2);

        cache.remove_reservation(&req).unwrap();
        assert_eq!(cache.reservation_count().unwrap(), 0);
    }

    #[test]
    fn clear_removes_entries_and_reservations() {
        let (cache, _dir) = store();
        let req = ProxyRequest::get("http://example.org/c");
        cache
            .set_response_with_ttl(&req, &sample_response(b"x".to_vec()), Duration::from_secs(60))
            .unwrap();
        cache.reserve_request(&req).unwrap();

        cache.clear().unwrap();
        assert!(cache.get_response(&req.cache_key()).unwrap().is_none());
        assert_eq!(cache.reservation_count().unwrap(), 0);
    }
}
