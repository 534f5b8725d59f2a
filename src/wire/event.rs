//! Pathfinder event-bus frames.
//!
//! Bus messages are a two-word prefix followed by a payload:
//!
//! ```text
//! [event_kind: u32 LE][dest_or_source_pf: u32 LE][payload]
//! ```
//!
//! The prefix words are little-endian (the bus ABI is host-order; this
//! implementation fixes LE) while payload fields are big-endian. The
//! `NodeRecord` payload is shared by NODE, SESSION, SESSION_ENDED and
//! DISCOVERED_PATH; SEARCH_REQ carries only the 16-byte address.

use std::fmt;

use super::WireError;

/// Destination pathfinder id meaning "all pathfinders".
pub const PATHFINDER_BROADCAST: u32 = 0xffff_ffff;

/// Size of the `[kind][pf]` frame prefix.
pub const EVENT_PREFIX_SIZE: usize = 8;

/// Metric value meaning "metric unknown"; the session layer always
/// emits this.
pub const METRIC_UNKNOWN: u32 = 0xffff_ffff;

/// Encoded size of a `NodeRecord`.
pub const NODE_RECORD_SIZE: usize = 64;

// ============================================================================
// Event Kinds
// ============================================================================

/// Events the session layer emits onto the bus.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum CoreEvent {
    /// A session was created, or enumerated in answer to SESSIONS.
    Session = 16,
    /// A session was torn down.
    SessionEnded = 17,
    /// The receive label of a session changed.
    DiscoveredPath = 18,
    /// A packet needs a path for an address we cannot reach yet.
    SearchReq = 19,
}

impl CoreEvent {
    /// Try to convert from a wire word.
    pub fn from_u32(v: u32) -> Option<Self> {
        match v {
            16 => Some(CoreEvent::Session),
            17 => Some(CoreEvent::SessionEnded),
            18 => Some(CoreEvent::DiscoveredPath),
            19 => Some(CoreEvent::SearchReq),
            _ => None,
        }
    }
}

impl fmt::Display for CoreEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CoreEvent::Session => "SESSION",
            CoreEvent::SessionEnded => "SESSION_ENDED",
            CoreEvent::DiscoveredPath => "DISCOVERED_PATH",
            CoreEvent::SearchReq => "SEARCH_REQ",
        };
        write!(f, "{}", name)
    }
}

/// Events the pathfinder delivers to the session layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum PathfinderEvent {
    /// A peer was resolved to a (path, key, version) triple.
    Node = 1,
    /// Request to enumerate all live sessions.
    Sessions = 2,
}

impl PathfinderEvent {
    /// Try to convert from a wire word.
    pub fn from_u32(v: u32) -> Option<Self> {
        match v {
            1 => Some(PathfinderEvent::Node),
            2 => Some(PathfinderEvent::Sessions),
            _ => None,
        }
    }
}

// ============================================================================
// Node Record
// ============================================================================

/// Fixed-size peer record shared by several event payloads.
///
/// Wire format (64 bytes):
/// ```text
/// [path: u64 BE][metric: u32 BE][version: u32 BE][ip6: 16][public_key: 32]
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NodeRecord {
    /// Routing label toward the peer.
    pub path: u64,
    /// Path metric; the session layer emits `METRIC_UNKNOWN`.
    pub metric: u32,
    /// Peer protocol version, 0 when unknown.
    pub version: u32,
    /// Peer overlay address.
    pub ip6: [u8; 16],
    /// Peer public key.
    pub public_key: [u8; 32],
}

impl NodeRecord {
    /// Parse from the first `NODE_RECORD_SIZE` bytes of `data`.
    pub fn parse(data: &[u8]) -> Result<Self, WireError> {
        if data.len() < NODE_RECORD_SIZE {
            return Err(WireError::Truncated {
                what: "node record",
                needed: NODE_RECORD_SIZE,
                got: data.len(),
            });
        }
        let mut path = [0u8; 8];
        path.copy_from_slice(&data[..8]);
        let metric = u32::from_be_bytes([data[8], data[9], data[10], data[11]]);
        let version = u32::from_be_bytes([data[12], data[13], data[14], data[15]]);
        let mut ip6 = [0u8; 16];
        ip6.copy_from_slice(&data[16..32]);
        let mut public_key = [0u8; 32];
        public_key.copy_from_slice(&data[32..64]);
        Ok(Self { path: u64::from_be_bytes(path), metric, version, ip6, public_key })
    }

    /// Encode to wire bytes.
    pub fn encode(&self) -> [u8; NODE_RECORD_SIZE] {
        let mut out = [0u8; NODE_RECORD_SIZE];
        out[..8].copy_from_slice(&self.path.to_be_bytes());
        out[8..12].copy_from_slice(&self.metric.to_be_bytes());
        out[12..16].copy_from_slice(&self.version.to_be_bytes());
        out[16..32].copy_from_slice(&self.ip6);
        out[32..64].copy_from_slice(&self.public_key);
        out
    }
}

// ============================================================================
// Frames
// ============================================================================

/// A decoded inbound (pathfinder → core) bus frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PathfinderMsg {
    /// Peer discovery result.
    Node { source_pf: u32, record: NodeRecord },
    /// Session enumeration request.
    Sessions { source_pf: u32 },
}

impl PathfinderMsg {
    /// Decode an inbound frame.
    pub fn decode(data: &[u8]) -> Result<Self, WireError> {
        let (kind, pf, payload) = split_frame(data)?;
        match PathfinderEvent::from_u32(kind) {
            Some(PathfinderEvent::Node) => {
                let record = NodeRecord::parse(payload)?;
                if payload.len() > NODE_RECORD_SIZE {
                    return Err(WireError::TrailingBytes {
                        what: "NODE frame",
                        left: payload.len() - NODE_RECORD_SIZE,
                    });
                }
                Ok(PathfinderMsg::Node { source_pf: pf, record })
            }
            Some(PathfinderEvent::Sessions) => {
                if !payload.is_empty() {
                    return Err(WireError::TrailingBytes {
                        what: "SESSIONS frame",
                        left: payload.len(),
                    });
                }
                Ok(PathfinderMsg::Sessions { source_pf: pf })
            }
            None => Err(WireError::UnknownEventKind(kind)),
        }
    }

    /// Encode this frame (used by pathfinder-side callers and tests).
    pub fn encode(&self) -> Vec<u8> {
        match self {
            PathfinderMsg::Node { source_pf, record } => {
                build_frame(PathfinderEvent::Node as u32, *source_pf, &record.encode())
            }
            PathfinderMsg::Sessions { source_pf } => {
                build_frame(PathfinderEvent::Sessions as u32, *source_pf, &[])
            }
        }
    }
}

/// A decoded outbound (core → pathfinder) bus frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CoreMsg {
    /// Session created or enumerated.
    Session { dest_pf: u32, record: NodeRecord },
    /// Session torn down; the record carries the last send label.
    SessionEnded { dest_pf: u32, record: NodeRecord },
    /// Receive label transition; the record carries the new label.
    DiscoveredPath { dest_pf: u32, record: NodeRecord },
    /// Path wanted for an address.
    SearchReq { dest_pf: u32, ip6: [u8; 16] },
}

impl CoreMsg {
    /// Encode to a wire frame.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            CoreMsg::Session { dest_pf, record } => {
                build_frame(CoreEvent::Session as u32, *dest_pf, &record.encode())
            }
            CoreMsg::SessionEnded { dest_pf, record } => {
                build_frame(CoreEvent::SessionEnded as u32, *dest_pf, &record.encode())
            }
            CoreMsg::DiscoveredPath { dest_pf, record } => {
                build_frame(CoreEvent::DiscoveredPath as u32, *dest_pf, &record.encode())
            }
            CoreMsg::SearchReq { dest_pf, ip6 } => {
                build_frame(CoreEvent::SearchReq as u32, *dest_pf, ip6)
            }
        }
    }

    /// Decode an outbound frame (pathfinder-side and tests).
    pub fn decode(data: &[u8]) -> Result<Self, WireError> {
        let (kind, pf, payload) = split_frame(data)?;
        match CoreEvent::from_u32(kind) {
            Some(CoreEvent::SearchReq) => {
                if payload.len() != 16 {
                    return Err(WireError::Truncated {
                        what: "SEARCH_REQ frame",
                        needed: 16,
                        got: payload.len(),
                    });
                }
                let mut ip6 = [0u8; 16];
                ip6.copy_from_slice(payload);
                Ok(CoreMsg::SearchReq { dest_pf: pf, ip6 })
            }
            Some(ev) => {
                let record = NodeRecord::parse(payload)?;
                Ok(match ev {
                    CoreEvent::Session => CoreMsg::Session { dest_pf: pf, record },
                    CoreEvent::SessionEnded => CoreMsg::SessionEnded { dest_pf: pf, record },
                    CoreEvent::DiscoveredPath => CoreMsg::DiscoveredPath { dest_pf: pf, record },
                    CoreEvent::SearchReq => unreachable!(),
                })
            }
            None => Err(WireError::UnknownEventKind(kind)),
        }
    }

    /// The event kind of this frame.
    pub fn kind(&self) -> CoreEvent {
        match self {
            CoreMsg::Session { .. } => CoreEvent::Session,
            CoreMsg::SessionEnded { .. } => CoreEvent::SessionEnded,
            CoreMsg::DiscoveredPath { .. } => CoreEvent::DiscoveredPath,
            CoreMsg::SearchReq { .. } => CoreEvent::SearchReq,
        }
    }
}

fn build_frame(kind: u32, pf: u32, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(EVENT_PREFIX_SIZE + payload.len());
    out.extend_from_slice(&kind.to_le_bytes());
    out.extend_from_slice(&pf.to_le_bytes());
    out.extend_from_slice(payload);
    out
}

fn split_frame(data: &[u8]) -> Result<(u32, u32, &[u8]), WireError> {
    if data.len() < EVENT_PREFIX_SIZE {
        return Err(WireError::Truncated {
            what: "event frame",
            needed: EVENT_PREFIX_SIZE,
            got: data.len(),
        });
    }
    let kind = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
    let pf = u32::from_le_bytes([data[4], data[5], data[6], data[7]]);
    Ok((kind, pf, &data[EVENT_PREFIX_SIZE..]))
}
