// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! AF_BP datagram socket.
//!
//! One connectionless socket bound to a local `ipn:` endpoint: send one
//! bundle to a destination, block on receive, close idempotently. The
//! protocol family is provided by the bp-socket kernel module and exists
//! only on Linux; on other platforms every operation fails fast with
//! `io::ErrorKind::Unsupported` instead of silently no-op'ing.

#[cfg(target_os = "linux")]
pub use self::linux::BpSocket;
#[cfg(not(target_os = "linux"))]
pub use self::stub::BpSocket;

#[cfg(target_os = "linux")]
mod linux {
    use crate::bp::addr::{BpAddr, AF_BP, BP_PROTO, SOCKADDR_BP_LEN};
    use socket2::{Domain, Protocol, Socket, Type};
    use std::io;
    use std::os::fd::IntoRawFd;
    use std::sync::atomic::{AtomicI32, Ordering};
    use std::time::Duration;

    /// A bound AF_BP datagram socket.
    ///
    /// The descriptor may be shared by concurrent senders; each datagram
    /// write is self-contained. `close()` is idempotent and also runs on
    /// Drop. `rebind()` swaps in a fresh descriptor for the same local
    /// address, which the receive loop uses for reconnection.
    pub struct BpSocket {
        fd: AtomicI32,
        local: BpAddr,
    }

    impl BpSocket {
        /// Create an AF_BP socket and bind it to `local`.
        ///
        /// Fails with the OS error when the family is unsupported (kernel
        /// module not loaded) or the address is already bound.
        pub fn bind(local: BpAddr) -> io::Result<Self> {
            let fd = Self::open_fd(local)?;
            log::debug!("[BpSocket] bound {} (fd={})", local, fd);
            Ok(Self {
                fd: AtomicI32::new(fd),
                local,
            })
        }

        fn open_fd(local: BpAddr) -> io::Result<i32> {
            let socket = Socket::new(
                Domain::from(AF_BP),
                Type::DGRAM,
                Some(Protocol::from(BP_PROTO)),
            )
            .map_err(|e| {
                io::Error::new(e.kind(), format!("AF_BP socket creation failed: {}", e))
            })?;
            let fd = socket.into_raw_fd();

            let sockaddr = local.to_sockaddr();
            // SAFETY: sockaddr is a valid 16-byte sockaddr_bp record and fd
            // is a live descriptor owned by this function until returned.
            let rc = unsafe {
                libc::bind(
                    fd,
                    sockaddr.as_ptr() as *const libc::sockaddr,
                    SOCKADDR_BP_LEN as libc::socklen_t,
                )
            };
            if rc != 0 {
                let err = io::Error::last_os_error();
                // SAFETY: fd was just created and is not shared yet.
                unsafe { libc::close(fd) };
                return Err(io::Error::new(err.kind(), format!("bind {} failed: {}", local, err)));
            }
            Ok(fd)
        }

        /// Local endpoint this socket is bound to.
        pub fn local_addr(&self) -> BpAddr {
            self.local
        }

        /// Send one bundle payload to `dest`.
        pub fn send_to(&self, payload: &[u8], dest: BpAddr) -> io::Result<usize> {
            let fd = self.fd()?;
            let sockaddr = dest.to_sockaddr();
            // SAFETY: payload pointer/length come from a valid slice and
            // sockaddr is a valid sockaddr_bp record.
            let sent = unsafe {
                libc::sendto(
                    fd,
                    payload.as_ptr() as *const libc::c_void,
                    payload.len(),
                    0,
                    sockaddr.as_ptr() as *const libc::sockaddr,
                    SOCKADDR_BP_LEN as libc::socklen_t,
                )
            };
            if sent < 0 {
                let err = io::Error::last_os_error();
                return Err(io::Error::new(
                    err.kind(),
                    format!("sendto {} failed: {}", dest, err),
                ));
            }
            Ok(sent as usize)
        }

        /// Block until one bundle arrives; returns payload length and the
        /// source address.
        ///
        /// A returned length equal to the buffer capacity means the
        /// payload may have been truncated; the caller reports that as a
        /// warning, not an error.
        pub fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, BpAddr)> {
            let fd = self.fd()?;
            let mut from = [0u8; SOCKADDR_BP_LEN];
            let mut from_len = SOCKADDR_BP_LEN as libc::socklen_t;
            // SAFETY: buf is a valid mutable slice, from/from_len describe a
            // writable sockaddr_bp-sized buffer.
            let n = unsafe {
                libc::recvfrom(
                    fd,
                    buf.as_mut_ptr() as *mut libc::c_void,
                    buf.len(),
                    0,
                    from.as_mut_ptr() as *mut libc::sockaddr,
                    &mut from_len,
                )
            };
            if n < 0 {
                return Err(io::Error::last_os_error());
            }
            let source = BpAddr::from_sockaddr(&from)?;
            Ok((n as usize, source))
        }

        /// Set a receive timeout so a blocking `recv_from` wakes up
        /// periodically (shutdown checks, reconnection bookkeeping).
        pub fn set_recv_timeout(&self, timeout: Duration) -> io::Result<()> {
            self.set_timeout_opt(libc::SO_RCVTIMEO, timeout)
        }

        /// Set a send timeout for the blocking send path.
        pub fn set_send_timeout(&self, timeout: Duration) -> io::Result<()> {
            self.set_timeout_opt(libc::SO_SNDTIMEO, timeout)
        }

        fn set_timeout_opt(&self, opt: libc::c_int, timeout: Duration) -> io::Result<()> {
            let fd = self.fd()?;
            let tv = libc::timeval {
                tv_sec: timeout.as_secs() as libc::time_t,
                tv_usec: libc::suseconds_t::from(timeout.subsec_micros()),
            };
            // SAFETY: setsockopt FFI with a live fd, standard socket option,
            // and a correctly sized timeval pointer.
            let rc = unsafe {
                libc::setsockopt(
                    fd,
                    libc::SOL_SOCKET,
                    opt,
                    &tv as *const _ as *const libc::c_void,
                    std::mem::size_of::<libc::timeval>() as libc::socklen_t,
                )
            };
            if rc != 0 {
                return Err(io::Error::last_os_error());
            }
            Ok(())
        }

        /// Replace the descriptor with a freshly bound one for the same
        /// local address. The old descriptor is closed.
        pub fn rebind(&self) -> io::Result<()> {
            let fresh = Self::open_fd(self.local)?;
            let old = self.fd.swap(fresh, Ordering::SeqCst);
            if old >= 0 {
                // SAFETY: old was a descriptor owned by this socket.
                unsafe { libc::close(old) };
            }
            log::info!("[BpSocket] rebound {} (fd={})", self.local, fresh);
            Ok(())
        }

        /// Close the socket. Safe to call more than once; subsequent
        /// sends/receives fail with `NotConnected`.
        pub fn close(&self) {
            let old = self.fd.swap(-1, Ordering::SeqCst);
            if old >= 0 {
                // SAFETY: old was a descriptor owned by this socket.
                unsafe { libc::close(old) };
                log::debug!("[BpSocket] closed {}", self.local);
            }
        }

        fn fd(&self) -> io::Result<i32> {
            let fd = self.fd.load(Ordering::SeqCst);
            if fd < 0 {
                return Err(io::Error::new(
                    io::ErrorKind::NotConnected,
                    "BP socket is closed",
                ));
            }
            Ok(fd)
        }
    }

    impl Drop for BpSocket {
        fn drop(&mut self) {
            self.close();
        }
    }
}

#[cfg(not(target_os = "linux"))]
mod stub {
    //! Stub module -- AF_BP sockets are only available on Linux.
    //! Provides the public type so downstream code compiles unchanged;
    //! every operation fails fast with `Unsupported`.

    use crate::bp::addr::BpAddr;
    use std::io;
    use std::time::Duration;

    /// Unsupported-platform stand-in for the AF_BP socket.
    pub struct BpSocket {
        local: BpAddr,
    }

    fn unsupported() -> io::Error {
        io::Error::new(
            io::ErrorKind::Unsupported,
            format!("AF_BP sockets are only supported on Linux (current OS: {})", std::env::consts::OS),
        )
    }

    impl BpSocket {
        pub fn bind(_local: BpAddr) -> io::Result<Self> {
            Err(unsupported())
        }

        pub fn local_addr(&self) -> BpAddr {
            self.local
        }

        pub fn send_to(&self, _payload: &[u8], _dest: BpAddr) -> io::Result<usize> {
            Err(unsupported())
        }

        pub fn recv_from(&self, _buf: &mut [u8]) -> io::Result<(usize, BpAddr)> {
            Err(unsupported())
        }

        pub fn set_recv_timeout(&self, _timeout: Duration) -> io::Result<()> {
            Err(unsupported())
        }

        pub fn set_send_timeout(&self, _timeout: Duration) -> io::Result<()> {
            Err(unsupported())
        }

        pub fn rebind(&self) -> io::Result<()> {
            Err(unsupported())
        }

        pub fn close(&self) {}
    }
}

#[cfg(all(test, not(target_os = "linux")))]
mod tests {
    use super::BpSocket;
    use crate::bp::addr::BpAddr;
    use std::io;

    #[test]
    fn bind_fails_fast_on_unsupported_platform() {
        let err = BpSocket::bind(BpAddr::new(149, 1)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Unsupported);
    }
}
