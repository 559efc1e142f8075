// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Request/response correlation over the bundle transport.
//!
//! The transport underneath is asynchronous, unordered and loosely
//! reliable; this layer makes it behave like an ordinary blocking call.
//! Each outbound request gets an unpredictable correlation ID and a
//! one-slot rendezvous in a concurrent registry. A single dispatcher
//! thread drains the receive queue and routes decoded responses to their
//! slots; the caller blocks until its slot fills, its deadline elapses,
//! or its cancellation token fires. Responses may arrive in any order --
//! the correlation ID is the sole ordering primitive.
//!
//! Orphaned responses (ID unknown, caller already gone) and duplicate
//! deliveries are logged and dropped; they never reach a waiting caller
//! and never crash the dispatcher.

/// Wire payloads (request/response envelopes).
pub mod envelope;
/// Error types for gateway operations.
pub mod error;
/// Rendezvous slots and call states.
pub mod pending;

pub use envelope::{EnvelopeError, RequestEnvelope, ResponseEnvelope};
pub use error::{GatewayError, GatewayResult};
pub use pending::CallState;

use crate::bp::BundleTx;
use crate::model::{ProxyRequest, ProxyResponse};
use crossbeam::channel::{bounded, never, Receiver, TrySendError};
use dashmap::DashMap;
use pending::PendingCall;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// The capability the scheduler and workers consume: carry one request to
/// the remote side and bring its response back, blocking the caller.
pub trait ProxyGateway: Send + Sync {
    fn proxy_request(
        &self,
        deadline: Duration,
        request: &ProxyRequest,
    ) -> GatewayResult<ProxyResponse>;
}

/// Correlation gateway bound to one bundle transport pair.
pub struct BundleGateway {
    sender: Arc<dyn BundleTx>,
    pending: Arc<DashMap<String, PendingCall>>,
    shutdown: Arc<AtomicBool>,
}

impl BundleGateway {
    /// Create the gateway and start its dispatcher on the given receive
    /// queue (normally `BundleRx::incoming()`).
    pub fn new(sender: Arc<dyn BundleTx>, incoming: Receiver<Vec<u8>>) -> Self {
        let pending: Arc<DashMap<String, PendingCall>> = Arc::new(DashMap::new());
        let shutdown = Arc::new(AtomicBool::new(false));

        let dispatcher_pending = Arc::clone(&pending);
        let dispatcher_shutdown = Arc::clone(&shutdown);
        // Dispatcher lifetime is tied to the queue: it exits when the
        // transport stops and the queue disconnects.
        std::thread::Builder::new()
            .name("gateway-dispatcher".into())
            .spawn(move || dispatch_loop(incoming, dispatcher_pending, dispatcher_shutdown))
            .expect("spawn dispatcher thread");

        Self {
            sender,
            pending,
            shutdown,
        }
    }

    /// Number of calls currently awaiting a response.
    pub fn outstanding(&self) -> usize {
        self.pending.len()
    }

    /// Shut down: wake every waiting caller with `Shutdown` and stop
    /// accepting new calls. Stop the transport receiver first so the
    /// dispatcher thread can exit.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        // Dropping the slots disconnects the rendezvous channels.
        self.pending.clear();
        log::info!("[Gateway] shut down");
    }

    /// Like [`ProxyGateway::proxy_request`] with an optional cancellation
    /// token; a message (or disconnect) on `cancel` aborts the wait.
    pub fn proxy_request_with_cancel(
        &self,
        deadline: Duration,
        request: &ProxyRequest,
        cancel: Option<&Receiver<()>>,
    ) -> GatewayResult<ProxyResponse> {
        if self.shutdown.load(Ordering::SeqCst) {
            return Err(GatewayError::Shutdown);
        }
        request.validate_url()?;

        // Unpredictable ID: collisions under concurrent load are negligible.
        let request_id = Uuid::new_v4().to_string();
        let (slot_tx, slot_rx) = bounded(1);
        self.pending
            .insert(request_id.clone(), PendingCall::new(slot_tx));

        let envelope = RequestEnvelope::from_request(&request_id, request);
        let payload = match envelope.encode() {
            Ok(p) => p,
            Err(e) => {
                self.pending.remove(&request_id);
                return Err(e.into());
            }
        };

        log::debug!(
            "[Gateway] {} {} ({} bytes, id={})",
            request.method,
            request.url,
            payload.len(),
            request_id
        );
        if let Err(e) = self.sender.send(&payload) {
            self.pending.remove(&request_id);
            return Err(GatewayError::SendFailed(e));
        }
        self.set_state(&request_id, CallState::Sent);

        let never_rx = never();
        let cancel_rx = cancel.unwrap_or(&never_rx);
        let result = crossbeam::select! {
            recv(slot_rx) -> delivered => match delivered {
                Ok(response) => {
                    log::debug!(
                        "[Gateway] response for id={} (status {})",
                        request_id,
                        response.status_code
                    );
                    Ok(response)
                }
                // Slot dropped without delivery: shutdown cleared the registry.
                Err(_) => Err(GatewayError::Shutdown),
            },
            recv(cancel_rx) -> _ => {
                self.set_state(&request_id, CallState::Cancelled);
                log::debug!("[Gateway] call id={} cancelled", request_id);
                Err(GatewayError::Cancelled)
            }
            default(deadline) => {
                self.set_state(&request_id, CallState::TimedOut);
                log::warn!(
                    "[Gateway] call id={} timed out after {:?}",
                    request_id,
                    deadline
                );
                Err(GatewayError::Timeout)
            }
        };

        // Unregister on every exit path; a response arriving later is an
        // orphan for the dispatcher to drop.
        self.pending.remove(&request_id);
        result
    }

    fn set_state(&self, request_id: &str, state: CallState) {
        if let Some(mut call) = self.pending.get_mut(request_id) {
            call.state = state;
        }
    }
}

impl ProxyGateway for BundleGateway {
    fn proxy_request(
        &self,
        deadline: Duration,
        request: &ProxyRequest,
    ) -> GatewayResult<ProxyResponse> {
        self.proxy_request_with_cancel(deadline, request, None)
    }
}

impl Drop for BundleGateway {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn dispatch_loop(
    incoming: Receiver<Vec<u8>>,
    pending: Arc<DashMap<String, PendingCall>>,
    shutdown: Arc<AtomicBool>,
) {
    for payload in incoming.iter() {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        let envelope = match ResponseEnvelope::decode(&payload) {
            Ok(env) => env,
            Err(e) => {
                log::warn!(
                    "[Gateway] discarding undecodable bundle ({} bytes): {}",
                    payload.len(),
                    e
                );
                continue;
            }
        };
        let response = match envelope.to_response() {
            Ok(resp) => resp,
            Err(e) => {
                log::warn!(
                    "[Gateway] discarding response id={} with bad body: {}",
                    envelope.request_id,
                    e
                );
                continue;
            }
        };

        match pending.get_mut(&envelope.request_id) {
            None => {
                log::warn!(
                    "[Gateway] orphaned response id={} (status {}), dropping",
                    envelope.request_id,
                    envelope.status_code
                );
            }
            Some(mut call) => match call.slot.try_send(response) {
                Ok(()) => {
                    call.state = CallState::Completed;
                    log::debug!(
                        "[Gateway] delivered id={} after {:?}",
                        envelope.request_id,
                        call.created_at.elapsed()
                    );
                }
                Err(TrySendError::Full(_)) => {
                    log::warn!(
                        "[Gateway] duplicate response id={}, dropping",
                        envelope.request_id
                    );
                }
                Err(TrySendError::Disconnected(_)) => {
                    log::debug!(
                        "[Gateway] caller for id={} already gone",
                        envelope.request_id
                    );
                }
            },
        }
    }
    log::debug!("[Gateway] dispatcher stopped");
}
