// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! One-shot bundle transmission with size enforcement and bounded retry.

use crate::bp::addr::BpAddr;
use crate::bp::socket::BpSocket;
use crate::bp::BundleTx;
use std::io;
use std::time::Duration;

/// Default maximum bundle payload size (4 MiB).
pub const MAX_BUNDLE_SIZE: usize = 4 * 1024 * 1024;

/// Tuning knobs for the send path.
#[derive(Debug, Clone)]
pub struct SenderOptions {
    /// Payloads larger than this are rejected before any transport call.
    pub max_bundle_size: usize,
    /// Transient send failures are retried this many additional times.
    pub retry_attempts: u32,
    /// Pause between send retries.
    pub retry_backoff: Duration,
    /// Kernel-level send timeout applied to the socket.
    pub send_timeout: Duration,
}

impl Default for SenderOptions {
    fn default() -> Self {
        Self {
            max_bundle_size: MAX_BUNDLE_SIZE,
            retry_attempts: 3,
            retry_backoff: Duration::from_secs(1),
            send_timeout: Duration::from_secs(30),
        }
    }
}

/// Sends bundles from a bound local endpoint to one remote endpoint.
pub struct BundleSender {
    socket: BpSocket,
    remote: BpAddr,
    opts: SenderOptions,
}

impl BundleSender {
    /// Bind a send-only AF_BP socket on `local`, targeting `remote`.
    pub fn bind(local: BpAddr, remote: BpAddr, opts: SenderOptions) -> io::Result<Self> {
        let socket = BpSocket::bind(local)?;
        socket.set_send_timeout(opts.send_timeout)?;
        log::info!("[BpSender] created socket {} -> {}", local, remote);
        Ok(Self {
            socket,
            remote,
            opts,
        })
    }

    /// Remote endpoint bundles are sent to.
    pub fn remote(&self) -> BpAddr {
        self.remote
    }

    /// Reject payloads exceeding `max` before any transport call.
    /// A payload of exactly `max` bytes is accepted.
    pub fn check_size(len: usize, max: usize) -> io::Result<()> {
        if len > max {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("bundle size {} exceeds max {}", len, max),
            ));
        }
        Ok(())
    }

    /// Send one bundle, retrying transient socket errors with backoff.
    pub fn send(&self, payload: &[u8]) -> io::Result<()> {
        Self::check_size(payload.len(), self.opts.max_bundle_size)?;

        let mut attempt = 0;
        loop {
            match self.socket.send_to(payload, self.remote) {
                Ok(sent) => {
                    log::debug!("[BpSender] sent {} bytes to {}", sent, self.remote);
                    return Ok(());
                }
                Err(err) if attempt < self.opts.retry_attempts => {
                    attempt += 1;
                    log::warn!(
                        "[BpSender] send to {} failed (attempt {}/{}): {}",
                        self.remote,
                        attempt,
                        self.opts.retry_attempts,
                        err
                    );
                    std::thread::sleep(self.opts.retry_backoff);
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Close the underlying socket.
    pub fn close(&self) {
        self.socket.close();
    }
}

impl BundleTx for BundleSender {
    fn send(&self, payload: &[u8]) -> io::Result<()> {
        BundleSender::send(self, payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_max_size_is_accepted() {
        assert!(BundleSender::check_size(MAX_BUNDLE_SIZE, MAX_BUNDLE_SIZE).is_ok());
    }

    #[test]
    fn one_byte_over_max_is_rejected() {
        let err = BundleSender::check_size(MAX_BUNDLE_SIZE + 1, MAX_BUNDLE_SIZE).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        assert!(err.to_string().contains("exceeds max"));
    }

    #[test]
    fn default_options_use_four_mib() {
        assert_eq!(SenderOptions::default().max_bundle_size, 4 * 1024 * 1024);
    }
}
