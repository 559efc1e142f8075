// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-call rendezvous slots for request/response correlation.

use crate::model::ProxyResponse;
use crossbeam::channel::Sender;
use std::time::Instant;

/// Lifecycle of one proxied call.
///
/// `Created -> Sent -> (Completed | TimedOut | Cancelled)`; the terminal
/// state is recorded for logging before the slot is unregistered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Created,
    Sent,
    Completed,
    TimedOut,
    Cancelled,
}

/// Registry entry owned by the gateway for the duration of one call.
///
/// The slot is a bounded(1) channel: it receives at most one response,
/// delivered non-blocking by the dispatcher. Entries are removed on every
/// exit path so the registry never grows unbounded.
pub(crate) struct PendingCall {
    pub slot: Sender<ProxyResponse>,
    pub state: CallState,
    pub created_at: Instant,
}

impl PendingCall {
    pub fn new(slot: Sender<ProxyResponse>) -> Self {
        Self {
            slot,
            state: CallState::Created,
            created_at: Instant::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam::channel::bounded;

    #[test]
    fn slot_accepts_exactly_one_response() {
        let (tx, rx) = bounded(1);
        let call = PendingCall::new(tx);
        assert_eq!(call.state, CallState::Created);

        let resp = ProxyResponse::ok(vec![1], "text/plain");
        call.slot.try_send(resp.clone()).unwrap();
        // A second delivery must not block; it fails because the slot is full.
        assert!(call.slot.try_send(resp).is_err());
        assert_eq!(rx.try_iter().count(), 1);
    }
}
