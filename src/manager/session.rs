//! Per-peer session state.

use crate::crypto::CaSession;

/// A single session with a remote peer.
///
/// Owns the CryptoAuth state plus the switch-layer bookkeeping: the
/// handle pair used to demultiplex packets without re-parsing identity,
/// and the labels in each direction.
pub struct Session {
    /// CryptoAuth session (carries the peer address and public key).
    ca: CaSession,
    /// Handle the peer stamps on packets destined to us. Assigned by
    /// the session table at insertion, fixed for the session lifetime.
    receive_handle: u32,
    /// Handle we stamp on run packets to the peer; learned as the first
    /// four plaintext bytes of their handshake payloads.
    send_handle: Option<u32>,
    /// Label we use to reach the peer. 0 until discovered.
    send_switch_label: u64,
    /// Last label observed on an incoming packet. Transitions fire a
    /// DISCOVERED_PATH event.
    recv_switch_label: u64,
    /// Peer protocol version. 0 until learned.
    version: u32,
    /// Creation timestamp (Unix milliseconds), for diagnostics.
    time_of_creation: u64,
}

impl Session {
    /// Create a session around a CryptoAuth state.
    ///
    /// The receive handle is assigned when the session enters the
    /// table.
    pub fn new(ca: CaSession, version: u32, send_switch_label: u64, now_ms: u64) -> Self {
        Self {
            ca,
            receive_handle: 0,
            send_handle: None,
            send_switch_label,
            recv_switch_label: 0,
            version,
            time_of_creation: now_ms,
        }
    }

    /// The CryptoAuth session.
    pub fn ca(&self) -> &CaSession {
        &self.ca
    }

    /// Mutable CryptoAuth session.
    pub(crate) fn ca_mut(&mut self) -> &mut CaSession {
        &mut self.ca
    }

    /// Peer overlay address bytes.
    pub fn ip6(&self) -> &[u8; 16] {
        self.ca.her_ip6()
    }

    /// Handle the peer uses to reach us.
    pub fn receive_handle(&self) -> u32 {
        self.receive_handle
    }

    pub(crate) fn set_receive_handle(&mut self, handle: u32) {
        self.receive_handle = handle;
    }

    /// Handle we stamp on run packets, once learned.
    pub fn send_handle(&self) -> Option<u32> {
        self.send_handle
    }

    pub(crate) fn set_send_handle(&mut self, handle: u32) {
        self.send_handle = Some(handle);
    }

    /// Label used to reach the peer, 0 when unknown.
    pub fn send_switch_label(&self) -> u64 {
        self.send_switch_label
    }

    pub(crate) fn set_send_switch_label(&mut self, label: u64) {
        self.send_switch_label = label;
    }

    /// Last label seen on incoming packets.
    pub fn recv_switch_label(&self) -> u64 {
        self.recv_switch_label
    }

    pub(crate) fn set_recv_switch_label(&mut self, label: u64) {
        self.recv_switch_label = label;
    }

    /// Peer protocol version, 0 when unknown.
    pub fn version(&self) -> u32 {
        self.version
    }

    pub(crate) fn set_version(&mut self, version: u32) {
        self.version = version;
    }

    /// Creation time in Unix milliseconds.
    pub fn time_of_creation(&self) -> u64 {
        self.time_of_creation
    }
}
