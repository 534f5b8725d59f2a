//! Wire formats for the switch and inside interfaces.
//!
//! Two headers matter to the session layer:
//!
//! - the 12-byte **switch header** that fronts every packet on the switch
//!   interface, carrying the 64-bit routing label;
//! - the 68-byte **route header** that fronts every packet on the inside
//!   interface, carrying the switch header plus peer identity fields.
//!
//! ## Layout contract
//!
//! The route header embeds the switch header as its first field on
//! purpose. On a post-handshake switch-ingress packet the bytes consumed
//! ahead of the plaintext are switch header (12) + handle (4) + run
//! frame header (52) = 68 = `RouteHeader::SIZE`, so growing the packet
//! head by a route header lands the embedded switch header exactly on
//! the original one. The ingress pipeline asserts this instead of
//! copying; handshake packets (whose crypto header is larger) take the
//! copying path.

mod event;

use std::fmt;
use thiserror::Error;

pub use event::{
    CoreEvent, CoreMsg, NodeRecord, PathfinderEvent, PathfinderMsg, EVENT_PREFIX_SIZE,
    METRIC_UNKNOWN, NODE_RECORD_SIZE, PATHFINDER_BROADCAST,
};

/// Errors from wire format parsing.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("truncated {what}: needed {needed}, got {got}")]
    Truncated { what: &'static str, needed: usize, got: usize },

    #[error("unknown event kind: {0}")]
    UnknownEventKind(u32),

    #[error("trailing bytes after {what}: {left} left")]
    TrailingBytes { what: &'static str, left: usize },
}

impl WireError {
    fn truncated(what: &'static str, needed: usize, got: usize) -> Self {
        WireError::Truncated { what, needed, got }
    }
}

// ============================================================================
// Switch Header
// ============================================================================

/// The 12-byte header fronting every switch-interface packet.
///
/// Wire format:
/// ```text
/// [label: u64 BE][congestion: u8][label_shift: u8][traffic_class: u16 BE]
/// ```
///
/// Only `label` is meaningful to the session layer; the remaining fields
/// are carried through opaquely for the switch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SwitchHeader {
    /// 64-bit routing label, opaque beyond equality.
    pub label: u64,
    /// Congestion marking, owned by the switch.
    pub congestion: u8,
    /// Label bit-consumption marker, owned by the switch.
    pub label_shift: u8,
    /// Traffic class, owned by the switch.
    pub traffic_class: u16,
}

impl SwitchHeader {
    /// Encoded size in bytes.
    pub const SIZE: usize = 12;

    /// Build a header carrying only a label.
    pub fn with_label(label: u64) -> Self {
        Self { label, ..Default::default() }
    }

    /// Parse from the first `SIZE` bytes of `data`.
    pub fn parse(data: &[u8]) -> Result<Self, WireError> {
        if data.len() < Self::SIZE {
            return Err(WireError::truncated("switch header", Self::SIZE, data.len()));
        }
        let mut label = [0u8; 8];
        label.copy_from_slice(&data[..8]);
        Ok(Self {
            label: u64::from_be_bytes(label),
            congestion: data[8],
            label_shift: data[9],
            traffic_class: u16::from_be_bytes([data[10], data[11]]),
        })
    }

    /// Encode to wire bytes.
    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[..8].copy_from_slice(&self.label.to_be_bytes());
        out[8] = self.congestion;
        out[9] = self.label_shift;
        out[10..12].copy_from_slice(&self.traffic_class.to_be_bytes());
        out
    }
}

impl fmt::Display for SwitchHeader {
    // Path labels are conventionally shown as zero-padded hex.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.label)
    }
}

// ============================================================================
// Route Header
// ============================================================================

/// The 68-byte header fronting every inside-interface packet.
///
/// Wire format:
/// ```text
/// [switch_header: 12][version: u32 BE][pad: u32 = 0][ip6: 16][public_key: 32]
/// ```
///
/// Inbound (toward the switch), `public_key` may be all-zero when the
/// upper layer knows only the address; the session layer then buffers
/// the packet and asks the pathfinder. Outbound (from the switch), all
/// fields are populated from the session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RouteHeader {
    /// Embedded switch header (label selection happens in place here).
    pub switch: SwitchHeader,
    /// Peer protocol version, 0 when unknown.
    pub version: u32,
    /// Destination or source overlay address.
    pub ip6: [u8; 16],
    /// Peer public key, or all-zero when unknown.
    pub public_key: [u8; 32],
}

impl RouteHeader {
    /// Encoded size in bytes.
    pub const SIZE: usize = 68;

    /// Byte offset of the embedded label within the header.
    pub const LABEL_OFFSET: usize = 0;

    /// Parse from the first `SIZE` bytes of `data`.
    pub fn parse(data: &[u8]) -> Result<Self, WireError> {
        if data.len() < Self::SIZE {
            return Err(WireError::truncated("route header", Self::SIZE, data.len()));
        }
        let switch = SwitchHeader::parse(&data[..SwitchHeader::SIZE])?;
        let version = u32::from_be_bytes([data[12], data[13], data[14], data[15]]);
        let mut ip6 = [0u8; 16];
        ip6.copy_from_slice(&data[20..36]);
        let mut public_key = [0u8; 32];
        public_key.copy_from_slice(&data[36..68]);
        Ok(Self { switch, version, ip6, public_key })
    }

    /// Encode to wire bytes. The pad word is always zero.
    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[..12].copy_from_slice(&self.switch.encode());
        out[12..16].copy_from_slice(&self.version.to_be_bytes());
        out[20..36].copy_from_slice(&self.ip6);
        out[36..68].copy_from_slice(&self.public_key);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_switch_header_round_trip() {
        let header = SwitchHeader {
            label: 0x0011_2233_4455_6677,
            congestion: 3,
            label_shift: 9,
            traffic_class: 0xbeef,
        };
        let parsed = SwitchHeader::parse(&header.encode()).unwrap();
        assert_eq!(parsed, header);
    }

    #[test]
    fn test_switch_header_label_is_big_endian() {
        let bytes = SwitchHeader::with_label(0x13).encode();
        assert_eq!(&bytes[..8], &[0, 0, 0, 0, 0, 0, 0, 0x13]);
    }

    #[test]
    fn test_switch_header_truncated() {
        assert!(matches!(
            SwitchHeader::parse(&[0u8; 11]),
            Err(WireError::Truncated { needed: 12, got: 11, .. })
        ));
    }

    #[test]
    fn test_route_header_round_trip() {
        let header = RouteHeader {
            switch: SwitchHeader::with_label(0x42),
            version: 18,
            ip6: [0xfc; 16],
            public_key: [7u8; 32],
        };
        let bytes = header.encode();
        assert_eq!(bytes.len(), RouteHeader::SIZE);
        // Pad word stays zero.
        assert_eq!(&bytes[16..20], &[0, 0, 0, 0]);
        assert_eq!(RouteHeader::parse(&bytes).unwrap(), header);
    }

    #[test]
    fn test_route_header_embeds_switch_header_first() {
        let header = RouteHeader {
            switch: SwitchHeader::with_label(0xabcd),
            version: 0,
            ip6: [0; 16],
            public_key: [0; 32],
        };
        let bytes = header.encode();
        assert_eq!(&bytes[..12], &header.switch.encode());
    }

    #[test]
    fn test_layout_contract_arithmetic() {
        // switch header + handle + run frame header must equal the route
        // header, or the no-copy rewrite in switch ingress breaks.
        assert_eq!(
            SwitchHeader::SIZE + 4 + crate::crypto::RUN_HEADER_SIZE,
            RouteHeader::SIZE
        );
    }
}
