//! Pending-outbound packet store.
//!
//! Packets that cannot be sent yet (no path known) wait here, keyed by
//! destination address, while a SEARCH_REQ is outstanding. The store is
//! bounded; at most one packet per destination (newer replaces older);
//! entries not drained by a pathfinder NODE event are pruned by age.

use std::collections::HashMap;

use crate::packet::Packet;

/// Buffered entries older than this are pruned.
pub const BUFFER_TTL_SECONDS: u64 = 10;

/// A packet parked while its destination is resolved.
struct BufferedMessage {
    packet: Packet,
    inserted_at_s: u64,
}

/// Bounded map of destination address to pending packet.
pub struct BufferedMessages {
    map: HashMap<[u8; 16], BufferedMessage>,
    max: usize,
}

impl BufferedMessages {
    /// Create a store with the given ceiling.
    pub fn new(max: usize) -> Self {
        Self { map: HashMap::new(), max }
    }

    /// The configured ceiling.
    pub fn max(&self) -> usize {
        self.max
    }

    /// Number of pending packets.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Whether the ceiling is reached.
    pub fn is_full(&self) -> bool {
        self.map.len() >= self.max
    }

    /// Whether a packet is pending for this destination.
    pub fn contains(&self, ip6: &[u8; 16]) -> bool {
        self.map.contains_key(ip6)
    }

    /// Park a packet. The caller handles replacement and the ceiling.
    pub fn insert(&mut self, ip6: [u8; 16], packet: Packet, now_s: u64) {
        self.map.insert(ip6, BufferedMessage { packet, inserted_at_s: now_s });
    }

    /// Remove and return the pending packet for a destination.
    pub fn take(&mut self, ip6: &[u8; 16]) -> Option<Packet> {
        self.map.remove(ip6).map(|entry| entry.packet)
    }

    /// Drop entries whose age reached `BUFFER_TTL_SECONDS`. Returns the
    /// number removed.
    pub fn prune_expired(&mut self, now_s: u64) -> usize {
        let before = self.map.len();
        self.map
            .retain(|_, entry| now_s.saturating_sub(entry.inserted_at_s) < BUFFER_TTL_SECONDS);
        before - self.map.len()
    }
}
