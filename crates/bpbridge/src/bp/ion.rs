// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Alternate bundle transport shelling out to the ION utilities.
//!
//! Where the bp-socket kernel module is unavailable, bundles can be moved
//! through `bpsendfile`/`bprecvfile` instead: payloads are exchanged via
//! files in a working directory and the utilities talk to the local ION
//! agent. Selected by configuration; the gateway and scheduler only see
//! the `BundleTx`/`BundleRx` capability traits.

use crate::bp::sender::BundleSender;
use crate::bp::{BundleRx, BundleTx};
use crossbeam::channel::{bounded, Receiver, Sender, TrySendError};
use std::fs;
use std::io;
use std::path::PathBuf;
use std::process::Command;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// File name `bprecvfile` writes its first received bundle to.
const RECV_FILE: &str = "testfile1";

/// Sends bundles by invoking `bpsendfile <source> <dest> <file>`.
pub struct IonSender {
    program: PathBuf,
    source_eid: String,
    dest_eid: String,
    work_dir: PathBuf,
    max_bundle_size: usize,
    seq: AtomicU64,
}

impl IonSender {
    pub fn new(
        program: impl Into<PathBuf>,
        source_eid: impl Into<String>,
        dest_eid: impl Into<String>,
        work_dir: impl Into<PathBuf>,
        max_bundle_size: usize,
    ) -> io::Result<Self> {
        let work_dir = work_dir.into();
        fs::create_dir_all(&work_dir)?;
        Ok(Self {
            program: program.into(),
            source_eid: source_eid.into(),
            dest_eid: dest_eid.into(),
            work_dir,
            max_bundle_size,
            seq: AtomicU64::new(0),
        })
    }

    /// Write the payload to a scratch file and hand it to `bpsendfile`.
    pub fn send(&self, payload: &[u8]) -> io::Result<()> {
        BundleSender::check_size(payload.len(), self.max_bundle_size)?;

        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let path = self.work_dir.join(format!("req_{}_{}.bin", std::process::id(), seq));
        fs::write(&path, payload)?;

        let output = Command::new(&self.program)
            .arg(&self.source_eid)
            .arg(&self.dest_eid)
            .arg(&path)
            .output();
        let result = match output {
            Ok(out) if out.status.success() => {
                log::debug!(
                    "[IonSender] sent {} bytes {} -> {}",
                    payload.len(),
                    self.source_eid,
                    self.dest_eid
                );
                Ok(())
            }
            Ok(out) => Err(io::Error::new(
                io::ErrorKind::Other,
                format!(
                    "{} exited with {}: {}",
                    self.program.display(),
                    out.status,
                    String::from_utf8_lossy(&out.stderr).trim()
                ),
            )),
            Err(err) => Err(io::Error::new(
                err.kind(),
                format!("failed to run {}: {}", self.program.display(), err),
            )),
        };

        if let Err(err) = fs::remove_file(&path) {
            log::warn!("[IonSender] could not remove {}: {}", path.display(), err);
        }
        result
    }
}

impl BundleTx for IonSender {
    fn send(&self, payload: &[u8]) -> io::Result<()> {
        IonSender::send(self, payload)
    }
}

/// Receives bundles by looping `bprecvfile <eid> 1`.
pub struct IonReceiver {
    queue_rx: Receiver<Vec<u8>>,
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl IonReceiver {
    pub fn start(
        program: impl Into<PathBuf>,
        local_eid: impl Into<String>,
        work_dir: impl Into<PathBuf>,
        queue_capacity: usize,
    ) -> io::Result<Self> {
        let program = program.into();
        let local_eid = local_eid.into();
        let work_dir = work_dir.into();
        fs::create_dir_all(&work_dir)?;

        let (queue_tx, queue_rx) = bounded(queue_capacity);
        let shutdown = Arc::new(AtomicBool::new(false));
        let loop_shutdown = Arc::clone(&shutdown);
        let handle = std::thread::Builder::new()
            .name("ion-receiver".into())
            .spawn(move || receive_loop(program, local_eid, work_dir, queue_tx, loop_shutdown))
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;

        Ok(Self {
            queue_rx,
            shutdown,
            handle: Some(handle),
        })
    }
}

impl BundleRx for IonReceiver {
    fn incoming(&self) -> Receiver<Vec<u8>> {
        self.queue_rx.clone()
    }

    /// Signals shutdown; a `bprecvfile` already blocking on the agent only
    /// notices once it delivers or exits.
    fn stop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn receive_loop(
    program: PathBuf,
    local_eid: String,
    work_dir: PathBuf,
    queue_tx: Sender<Vec<u8>>,
    shutdown: Arc<AtomicBool>,
) {
    log::info!("[IonReceiver] listening on {} via {}", local_eid, program.display());
    let recv_path = work_dir.join(RECV_FILE);

    while !shutdown.load(Ordering::SeqCst) {
        // Stale file from a previous run would be mistaken for a delivery.
        let _ = fs::remove_file(&recv_path);

        let status = Command::new(&program)
            .arg(&local_eid)
            .arg("1")
            .current_dir(&work_dir)
            .status();
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        match status {
            Ok(st) if st.success() => {}
            Ok(st) => {
                log::warn!("[IonReceiver] {} exited with {}", program.display(), st);
                std::thread::sleep(Duration::from_secs(1));
                continue;
            }
            Err(err) => {
                log::warn!("[IonReceiver] failed to run {}: {}", program.display(), err);
                std::thread::sleep(Duration::from_secs(1));
                continue;
            }
        }

        let payload = match fs::read(&recv_path) {
            Ok(data) => data,
            Err(err) => {
                log::warn!(
                    "[IonReceiver] received bundle file {} missing: {}",
                    recv_path.display(),
                    err
                );
                continue;
            }
        };
        let _ = fs::remove_file(&recv_path);

        log::debug!("[IonReceiver] received {} bytes on {}", payload.len(), local_eid);
        match queue_tx.try_send(payload) {
            Ok(()) => {}
            Err(TrySendError::Full(dropped)) => {
                log::warn!("[IonReceiver] queue full, dropping {}-byte bundle", dropped.len());
            }
            Err(TrySendError::Disconnected(_)) => break,
        }
    }
    log::debug!("[IonReceiver] receive loop exited");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_succeeds_with_benign_program() {
        let dir = tempfile::tempdir().unwrap();
        let sender = IonSender::new("true", "ipn:149.1", "ipn:150.1", dir.path(), 1024).unwrap();
        sender.send(b"hello").unwrap();
        // Scratch file is cleaned up after the hand-off.
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn send_surfaces_program_failure() {
        let dir = tempfile::tempdir().unwrap();
        let sender = IonSender::new("false", "ipn:149.1", "ipn:150.1", dir.path(), 1024).unwrap();
        assert!(sender.send(b"hello").is_err());
    }

    #[test]
    fn send_enforces_size_limit_before_exec() {
        let dir = tempfile::tempdir().unwrap();
        let sender =
            IonSender::new("/nonexistent-program", "ipn:149.1", "ipn:150.1", dir.path(), 8)
                .unwrap();
        let err = sender.send(&[0u8; 9]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }
}
