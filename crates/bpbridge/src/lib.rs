// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # bpbridge - HTTP over the Bundle Protocol
//!
//! Bridges conventional HTTP traffic onto a Delay/Disruption-Tolerant
//! Network: each request is carried as one bundle to the remote side,
//! executed there, and its result carried back as a second bundle, with
//! no reliable session and latencies from seconds to minutes.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bpbridge::{BridgeConfig, BundleGateway, Scheduler, SqliteCache, WorkerPool};
//! use bpbridge::placeholder::BuiltinPlaceholders;
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = BridgeConfig::default();
//!     let (tx, mut rx) = bpbridge::build_transport(&config)?;
//!
//!     let gateway = Arc::new(BundleGateway::new(tx, rx.incoming()));
//!     let cache = Arc::new(SqliteCache::open(
//!         Path::new(&config.db_path),
//!         Path::new(&config.cache_dir),
//!     )?);
//!     let scheduler = Scheduler::new(
//!         cache.clone(),
//!         gateway.clone(),
//!         Arc::new(BuiltinPlaceholders),
//!         config.gateway_deadline(),
//!     );
//!     let pool = WorkerPool::start(cache, gateway, config.worker_options());
//!
//!     // Hand `scheduler` to the HTTP ingress; on shutdown stop the
//!     // transport first so the dispatcher can drain.
//!     # drop((scheduler, pool));
//!     # rx.stop();
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +------------------------------------------------------------+
//! |           HTTP ingress / TLS bump (collaborators)          |
//! +------------------------------------------------------------+
//! |  Scheduler    hit -> cached | miss -> reserve + placeholder|
//! |  WorkerPool   pop -> re-check -> gateway -> persist 200    |
//! +------------------------------------------------------------+
//! |  Gateway      correlation IDs, rendezvous slots, deadlines |
//! +------------------------------------------------------------+
//! |  bp           AF_BP socket | ION CLI, bounded recv queue   |
//! +------------------------------------------------------------+
//! |  Bundle Protocol agent (black box)                         |
//! +------------------------------------------------------------+
//! ```
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`BpAddr`] | `ipn:<node>.<service>` endpoint address |
//! | [`BundleGateway`] | Blocking request/response correlation over bundles |
//! | [`Scheduler`] | Cache-aside front end for ingress requests |
//! | [`WorkerPool`] | Background fulfilment of reserved cache misses |
//! | [`SqliteCache`] | TTL'd response store + reservation queue |
//! | [`BridgeConfig`] | Process configuration (endpoints, timeouts, sizing) |

/// Bundle Protocol transport layer (addresses, sockets, send/receive).
pub mod bp;
/// Cache repository contract, keys, and the SQLite backend.
pub mod cache;
/// Process configuration.
pub mod config;
/// Request/response correlation over the bundle transport.
pub mod gateway;
/// Request/response models shared with the ingress collaborators.
pub mod model;
/// Placeholder content served while a fetch is in flight.
pub mod placeholder;
/// Cache-aside scheduling and the worker pool.
pub mod scheduler;

pub use bp::{BpAddr, BundleReceiver, BundleRx, BundleSender, BundleTx, IonReceiver, IonSender};
pub use cache::{BundleCache, CacheError, SqliteCache};
pub use config::{BridgeConfig, ConfigError, TransportKind};
pub use gateway::{BundleGateway, GatewayError, ProxyGateway};
pub use model::{ProxyRequest, ProxyResponse};
pub use scheduler::{Scheduler, WorkerOptions, WorkerPool};

use std::io;
use std::path::Path;
use std::sync::Arc;

/// Assemble the configured transport pair.
///
/// `bp-socket` binds two AF_BP sockets (send and receive services);
/// `ion-cli` wraps the ION utilities. Either way the caller gets the
/// transport-agnostic [`BundleTx`]/[`BundleRx`] pair the gateway needs.
pub fn build_transport(
    config: &BridgeConfig,
) -> io::Result<(Arc<dyn BundleTx>, Box<dyn BundleRx>)> {
    match config.transport {
        TransportKind::BpSocket => {
            let sender = BundleSender::bind(
                config.send_addr(),
                config.remote_addr(),
                config.sender_options(),
            )?;
            let receiver = BundleReceiver::bind(config.receive_addr(), config.receiver_options())?;
            Ok((Arc::new(sender), Box::new(receiver)))
        }
        TransportKind::IonCli => {
            let work_dir = Path::new(&config.cache_dir).join("ion");
            let sender = IonSender::new(
                &config.ion_send_program,
                config.send_addr().to_string(),
                config.remote_addr().to_string(),
                work_dir.join("out"),
                config.max_bundle_size,
            )?;
            let receiver = IonReceiver::start(
                &config.ion_recv_program,
                config.receive_addr().to_string(),
                work_dir.join("in"),
                config.queue_capacity,
            )?;
            Ok((Arc::new(sender), Box::new(receiver)))
        }
    }
}
