// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Continuous bundle reception feeding a bounded queue.
//!
//! One receive-loop thread copies each bundle into owned memory and pushes
//! it onto a bounded channel consumed by the gateway dispatcher. When the
//! queue is full the newest bundle is dropped and logged; the BP agent
//! underneath provides its own custody/retransmission, so backpressure by
//! drop is acceptable here.

use crate::bp::addr::BpAddr;
use crate::bp::socket::BpSocket;
use crate::bp::BundleRx;
use crossbeam::channel::{bounded, Receiver, Sender, TrySendError};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Tuning knobs for the receive path.
#[derive(Debug, Clone)]
pub struct ReceiverOptions {
    /// Receive buffer size; also the largest accepted bundle.
    pub max_bundle_size: usize,
    /// Capacity of the bounded queue feeding the dispatcher.
    pub queue_capacity: usize,
    /// Consecutive receive errors before a rebind is attempted.
    pub error_threshold: u32,
    /// Maximum rebind attempts before the loop gives up.
    pub rebind_attempts: u32,
    /// Pause between rebind attempts.
    pub rebind_backoff: Duration,
    /// Kernel-level receive timeout; bounds how long a shutdown waits.
    pub recv_timeout: Duration,
}

impl Default for ReceiverOptions {
    fn default() -> Self {
        Self {
            max_bundle_size: super::sender::MAX_BUNDLE_SIZE,
            queue_capacity: 100,
            error_threshold: 3,
            rebind_attempts: 3,
            rebind_backoff: Duration::from_secs(2),
            recv_timeout: Duration::from_secs(1),
        }
    }
}

/// Receives bundles on a bound local endpoint.
pub struct BundleReceiver {
    socket: Arc<BpSocket>,
    queue_rx: Receiver<Vec<u8>>,
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl BundleReceiver {
    /// Bind a receive-only AF_BP socket on `local` and start the loop.
    pub fn bind(local: BpAddr, opts: ReceiverOptions) -> io::Result<Self> {
        let socket = Arc::new(BpSocket::bind(local)?);
        socket.set_recv_timeout(opts.recv_timeout)?;
        log::info!("[BpReceiver] listening on {}", local);

        let (queue_tx, queue_rx) = bounded(opts.queue_capacity);
        let shutdown = Arc::new(AtomicBool::new(false));

        let loop_socket = Arc::clone(&socket);
        let loop_shutdown = Arc::clone(&shutdown);
        let handle = std::thread::Builder::new()
            .name("bp-receiver".into())
            .spawn(move || receive_loop(loop_socket, queue_tx, loop_shutdown, opts))
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;

        Ok(Self {
            socket,
            queue_rx,
            shutdown,
            handle: Some(handle),
        })
    }

    /// Bounded queue of received bundle payloads.
    pub fn incoming(&self) -> Receiver<Vec<u8>> {
        self.queue_rx.clone()
    }

    /// Stop the receive loop and close the socket.
    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.socket.close();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        log::info!("[BpReceiver] stopped");
    }
}

impl Drop for BundleReceiver {
    fn drop(&mut self) {
        self.stop();
    }
}

impl BundleRx for BundleReceiver {
    fn incoming(&self) -> Receiver<Vec<u8>> {
        BundleReceiver::incoming(self)
    }

    fn stop(&mut self) {
        BundleReceiver::stop(self)
    }
}

fn receive_loop(
    socket: Arc<BpSocket>,
    queue_tx: Sender<Vec<u8>>,
    shutdown: Arc<AtomicBool>,
    opts: ReceiverOptions,
) {
    let mut buf = vec![0u8; opts.max_bundle_size];
    let mut consecutive_errors = 0u32;

    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        let (n, source) = match socket.recv_from(&mut buf) {
            Ok(received) => received,
            Err(err) if is_wakeup(&err) => continue,
            Err(err) => {
                if shutdown.load(Ordering::SeqCst) {
                    break;
                }
                consecutive_errors += 1;
                log::warn!(
                    "[BpReceiver] recv error ({} consecutive): {}",
                    consecutive_errors,
                    err
                );
                if consecutive_errors >= opts.error_threshold {
                    if !try_rebind(&socket, &shutdown, &opts) {
                        log::error!(
                            "[BpReceiver] rebind failed after {} attempts, stopping receive loop",
                            opts.rebind_attempts
                        );
                        break;
                    }
                    consecutive_errors = 0;
                }
                continue;
            }
        };
        consecutive_errors = 0;

        if n >= opts.max_bundle_size {
            log::warn!(
                "[BpReceiver] received {} bytes (buffer limit), possible truncation",
                n
            );
        }
        log::debug!("[BpReceiver] received {} bytes from {}", n, source);

        match queue_tx.try_send(buf[..n].to_vec()) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                log::warn!("[BpReceiver] queue full, dropping {}-byte bundle", n);
            }
            Err(TrySendError::Disconnected(_)) => break,
        }
    }
    log::debug!("[BpReceiver] receive loop exited");
}

/// Timeout/interrupt wakeups are scheduling artifacts, not link errors.
fn is_wakeup(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
    )
}

fn try_rebind(socket: &BpSocket, shutdown: &AtomicBool, opts: &ReceiverOptions) -> bool {
    for attempt in 1..=opts.rebind_attempts {
        if shutdown.load(Ordering::SeqCst) {
            return false;
        }
        log::info!(
            "[BpReceiver] attempting socket rebind ({}/{})",
            attempt,
            opts.rebind_attempts
        );
        match socket.rebind() {
            Ok(()) => {
                if socket.set_recv_timeout(opts.recv_timeout).is_err() {
                    log::warn!("[BpReceiver] could not restore recv timeout after rebind");
                }
                return true;
            }
            Err(err) => {
                log::warn!("[BpReceiver] rebind attempt {} failed: {}", attempt, err);
                std::thread::sleep(opts.rebind_backoff);
            }
        }
    }
    false
}
