// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Bundle Protocol endpoint addresses (`ipn:<node>.<service>`).
//!
//! Mirrors the `sockaddr_bp` record of the bp-socket kernel module:
//!
//! ```c
//! struct sockaddr_bp {
//!     sa_family_t bp_family;   /* uint16, AF_BP = 28            */
//!     bp_scheme_t bp_scheme;   /* int32 enum, BP_SCHEME_IPN = 1 */
//!     union {
//!         struct {
//!             uint32_t node_id;
//!             uint32_t service_id;
//!         } ipn;
//!     } bp_addr;
//! };
//! ```
//!
//! The byte layout is a binary contract with the kernel module, not a
//! self-describing encoding: 16 bytes total, native byte order, with the
//! 2 implicit C-struct padding bytes after the family tag.

use std::fmt;
use std::io;

/// Protocol family number registered by the bp-socket kernel module.
pub const AF_BP: libc::c_int = 28;

/// IPN addressing scheme identifier.
pub const BP_SCHEME_IPN: i32 = 1;

/// Protocol argument for `socket(2)` (the family has a single protocol).
pub const BP_PROTO: libc::c_int = 0;

/// Encoded size of `sockaddr_bp`: family (2) + pad (2) + scheme (4) +
/// node (4) + service (4).
pub const SOCKADDR_BP_LEN: usize = 16;

/// A Bundle Protocol endpoint identified by node and service number.
///
/// Immutable once constructed; renders as `ipn:<node>.<service>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BpAddr {
    node: u32,
    service: u32,
}

impl BpAddr {
    /// Create an address from node and service numbers.
    pub fn new(node: u32, service: u32) -> Self {
        Self { node, service }
    }

    /// Node number of the endpoint.
    pub fn node(&self) -> u32 {
        self.node
    }

    /// Service number of the endpoint.
    pub fn service(&self) -> u32 {
        self.service
    }

    /// Encode into the exact `sockaddr_bp` wire layout.
    ///
    /// Field offsets: family at 0, scheme at 4, node at 8, service at 12.
    /// Bytes 2..4 are the C-struct padding and are always zero.
    pub fn to_sockaddr(&self) -> [u8; SOCKADDR_BP_LEN] {
        let mut buf = [0u8; SOCKADDR_BP_LEN];
        buf[0..2].copy_from_slice(&(AF_BP as libc::sa_family_t).to_ne_bytes());
        buf[4..8].copy_from_slice(&BP_SCHEME_IPN.to_ne_bytes());
        buf[8..12].copy_from_slice(&self.node.to_ne_bytes());
        buf[12..16].copy_from_slice(&self.service.to_ne_bytes());
        buf
    }

    /// Decode a `sockaddr_bp` record, verifying family and scheme tags.
    pub fn from_sockaddr(buf: &[u8]) -> io::Result<Self> {
        if buf.len() < SOCKADDR_BP_LEN {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("sockaddr_bp too short: {} bytes", buf.len()),
            ));
        }

        let family = libc::sa_family_t::from_ne_bytes([buf[0], buf[1]]);
        if libc::c_int::from(family) != AF_BP {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unexpected address family {} (want AF_BP={})", family, AF_BP),
            ));
        }

        let scheme = i32::from_ne_bytes([buf[4], buf[5], buf[6], buf[7]]);
        if scheme != BP_SCHEME_IPN {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unexpected BP scheme {} (want ipn={})", scheme, BP_SCHEME_IPN),
            ));
        }

        let node = u32::from_ne_bytes([buf[8], buf[9], buf[10], buf[11]]);
        let service = u32::from_ne_bytes([buf[12], buf[13], buf[14], buf[15]]);
        Ok(Self { node, service })
    }
}

impl fmt::Display for BpAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ipn:{}.{}", self.node, self.service)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_renders_ipn_form() {
        let addr = BpAddr::new(150, 1);
        assert_eq!(addr.to_string(), "ipn:150.1");
    }

    #[test]
    fn sockaddr_layout_is_byte_exact() {
        let addr = BpAddr::new(0x01020304, 0x0A0B0C0D);
        let bytes = addr.to_sockaddr();

        assert_eq!(bytes.len(), SOCKADDR_BP_LEN);
        assert_eq!(
            bytes[0..2],
            (AF_BP as libc::sa_family_t).to_ne_bytes(),
            "family tag at offset 0"
        );
        assert_eq!(bytes[2..4], [0, 0], "padding bytes stay zero");
        assert_eq!(bytes[4..8], BP_SCHEME_IPN.to_ne_bytes(), "scheme at offset 4");
        assert_eq!(bytes[8..12], 0x01020304u32.to_ne_bytes(), "node at offset 8");
        assert_eq!(
            bytes[12..16],
            0x0A0B0C0Du32.to_ne_bytes(),
            "service at offset 12"
        );
    }

    #[test]
    fn sockaddr_roundtrip() {
        let addr = BpAddr::new(149, 2);
        let decoded = BpAddr::from_sockaddr(&addr.to_sockaddr()).unwrap();
        assert_eq!(decoded, addr);
    }

    #[test]
    fn from_sockaddr_rejects_wrong_family() {
        let mut bytes = BpAddr::new(1, 1).to_sockaddr();
        bytes[0..2].copy_from_slice(&(libc::AF_INET as libc::sa_family_t).to_ne_bytes());
        assert!(BpAddr::from_sockaddr(&bytes).is_err());
    }

    #[test]
    fn from_sockaddr_rejects_wrong_scheme() {
        let mut bytes = BpAddr::new(1, 1).to_sockaddr();
        bytes[4..8].copy_from_slice(&7i32.to_ne_bytes());
        assert!(BpAddr::from_sockaddr(&bytes).is_err());
    }

    #[test]
    fn from_sockaddr_rejects_short_buffer() {
        assert!(BpAddr::from_sockaddr(&[0u8; 8]).is_err());
    }
}
