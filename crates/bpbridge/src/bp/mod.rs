// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Bundle Protocol transport layer.
//!
//! Owns everything below the correlation gateway: endpoint addressing,
//! the raw AF_BP datagram socket, the send/receive transports built on
//! top of it, and the exec-based ION alternative.
//!
//! # Modules
//!
//! - `addr` - `ipn:<node>.<service>` endpoint addresses and the
//!   `sockaddr_bp` wire layout
//! - `socket` - the raw AF_BP socket (Linux; fail-fast stub elsewhere)
//! - `sender` / `receiver` - one-shot transmit with size enforcement,
//!   continuous receive loop with bounded queue and rebind/backoff
//! - `ion` - `bpsendfile`/`bprecvfile` exec transport
//!
//! The `BundleTx`/`BundleRx` traits are the seam the gateway consumes;
//! which implementation backs them is a configuration decision.

/// Endpoint addresses and the sockaddr_bp binary contract.
pub mod addr;
/// Exec transport via the ION `bpsendfile`/`bprecvfile` utilities.
pub mod ion;
/// Continuous receive loop feeding a bounded queue.
pub mod receiver;
/// One-shot bundle transmission with retry.
pub mod sender;
/// Raw AF_BP datagram socket.
pub mod socket;

pub use addr::{BpAddr, AF_BP, BP_PROTO, BP_SCHEME_IPN, SOCKADDR_BP_LEN};
pub use ion::{IonReceiver, IonSender};
pub use receiver::{BundleReceiver, ReceiverOptions};
pub use sender::{BundleSender, SenderOptions, MAX_BUNDLE_SIZE};
pub use socket::BpSocket;

use crossbeam::channel::Receiver;
use std::io;

/// Outbound half of a bundle transport.
///
/// Implementations enforce the maximum bundle size before any transport
/// call and retry transient failures internally.
pub trait BundleTx: Send + Sync {
    fn send(&self, payload: &[u8]) -> io::Result<()>;
}

/// Inbound half of a bundle transport: a bounded queue of received
/// bundle payloads, each already copied into owned memory.
pub trait BundleRx: Send {
    fn incoming(&self) -> Receiver<Vec<u8>>;

    /// Stop the receive loop. Idempotent.
    fn stop(&mut self);
}
