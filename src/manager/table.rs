//! Dual-keyed session table.
//!
//! Sessions are reachable by peer address (inside ingress) and by
//! receive handle (switch ingress). Handles must stay valid across
//! arbitrary insertions and removals, so the table is a slab: a slot's
//! index is stable until the slot is freed, and the externally visible
//! handle is `first_handle + index`. The `first_handle` offset is drawn
//! at random per manager so handles are not guessable across restarts,
//! and never goes below 4; values 0-3 belong to handshake stages on
//! the wire.

use std::collections::HashMap;
use std::net::Ipv6Addr;
use thiserror::Error;

use super::Session;

/// Smallest allowed handle offset. 0-3 are reserved for handshake
/// nonces.
pub const MIN_FIRST_HANDLE: u32 = 4;

/// Upper bound (exclusive) for the random handle offset.
pub const MAX_FIRST_HANDLE: u32 = 100_000;

/// Errors from session table operations.
#[derive(Debug, Error)]
pub enum TableError {
    #[error("session already exists for {0}")]
    AlreadyPresent(Ipv6Addr),
}

/// Slab-backed dual-keyed session map.
pub struct SessionTable {
    slots: Vec<Option<Session>>,
    free: Vec<usize>,
    by_ip6: HashMap<[u8; 16], usize>,
    first_handle: u32,
}

impl SessionTable {
    /// Create a table with the given handle offset.
    pub fn new(first_handle: u32) -> Self {
        assert!(
            (MIN_FIRST_HANDLE..MAX_FIRST_HANDLE).contains(&first_handle),
            "first handle out of range"
        );
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            by_ip6: HashMap::new(),
            first_handle,
        }
    }

    /// The random handle offset.
    pub fn first_handle(&self) -> u32 {
        self.first_handle
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.by_ip6.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.by_ip6.is_empty()
    }

    /// Slab index for an address.
    pub fn index_of_ip6(&self, ip6: &[u8; 16]) -> Option<usize> {
        self.by_ip6.get(ip6).copied()
    }

    /// Slab index for an external handle. Rejects out-of-range and
    /// vacant slots.
    pub fn index_of_handle(&self, handle: u32) -> Option<usize> {
        let index = handle.checked_sub(self.first_handle)? as usize;
        match self.slots.get(index) {
            Some(Some(_)) => Some(index),
            _ => None,
        }
    }

    /// Look up a session by peer address.
    pub fn lookup_ip6(&self, ip6: &[u8; 16]) -> Option<&Session> {
        self.index_of_ip6(ip6).map(|index| self.get(index))
    }

    /// Look up a session by external handle.
    pub fn lookup_handle(&self, handle: u32) -> Option<&Session> {
        self.index_of_handle(handle).map(|index| self.get(index))
    }

    /// Borrow the session in an occupied slot.
    ///
    /// Panics on a vacant index; callers hold indices obtained from the
    /// lookup methods in the same single-threaded call chain.
    pub fn get(&self, index: usize) -> &Session {
        self.slots[index].as_ref().expect("vacant session slot")
    }

    /// Mutably borrow the session in an occupied slot.
    pub fn get_mut(&mut self, index: usize) -> &mut Session {
        self.slots[index].as_mut().expect("vacant session slot")
    }

    /// Insert a session, assigning its receive handle.
    ///
    /// Returns the slab index and the handle. Fails if a session for
    /// the address already exists; callers check first.
    pub fn insert(
        &mut self,
        ip6: [u8; 16],
        mut session: Session,
    ) -> Result<(usize, u32), TableError> {
        if self.by_ip6.contains_key(&ip6) {
            return Err(TableError::AlreadyPresent(Ipv6Addr::from(ip6)));
        }
        let handle_base = self.first_handle;
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                self.slots.push(None);
                self.slots.len() - 1
            }
        };
        let handle = handle_base + index as u32;
        session.set_receive_handle(handle);
        self.slots[index] = Some(session);
        self.by_ip6.insert(ip6, index);
        Ok((index, handle))
    }

    /// Remove the session for an address, freeing its slot.
    pub fn remove_ip6(&mut self, ip6: &[u8; 16]) -> Option<Session> {
        let index = self.by_ip6.remove(ip6)?;
        let session = self.slots[index].take().expect("index map pointed at vacant slot");
        self.free.push(index);
        Some(session)
    }

    /// Snapshot of all live external handles.
    pub fn handles(&self) -> Vec<u32> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_some())
            .map(|(index, _)| self.first_handle + index as u32)
            .collect()
    }

    /// Remove and return every session.
    pub(crate) fn drain(&mut self) -> Vec<Session> {
        self.by_ip6.clear();
        self.free.clear();
        self.slots.drain(..).flatten().collect()
    }
}
