//! Session manager tests.
//!
//! `TestManager` wires a manager to capturing channels; `RemotePeer`
//! speaks the switch wire format by hand so tests can drive real
//! handshakes against the manager from outside.

mod buffer;
mod inside;
mod table;

use super::*;
use crate::config::SessionConfig;
use crate::crypto::{CaSession, CaState, MAX_HANDSHAKE_STAGE};
use crate::iface::{event_channel, packet_channel, EventRx, PacketRx};
use crate::identity::{Identity, OverlayAddress};
use crate::packet::Packet;
use crate::wire::{PathfinderMsg, RouteHeader, SwitchHeader};

pub struct TestManager {
    pub manager: SessionManager,
    pub inside_rx: PacketRx,
    pub switch_rx: PacketRx,
    pub event_rx: EventRx,
}

pub fn test_manager() -> TestManager {
    test_manager_with(SessionConfig::default())
}

pub fn test_manager_with(config: SessionConfig) -> TestManager {
    let (inside_tx, inside_rx) = packet_channel();
    let (switch_tx, switch_rx) = packet_channel();
    let (event_tx, event_rx) = event_channel();
    let manager = SessionManager::new(
        Identity::generate(),
        &config,
        inside_tx,
        switch_tx,
        event_tx,
    );
    TestManager { manager, inside_rx, switch_rx, event_rx }
}

impl TestManager {
    /// All events emitted since the last drain, decoded.
    pub fn drain_events(&mut self) -> Vec<CoreMsg> {
        drain_core_msgs(&mut self.event_rx)
    }

    /// Next packet emitted on the switch interface, if any.
    pub fn next_switch(&mut self) -> Option<Packet> {
        self.switch_rx.try_recv().ok()
    }

    /// Next packet emitted on the inside interface, if any.
    pub fn next_inside(&mut self) -> Option<Packet> {
        self.inside_rx.try_recv().ok()
    }
}

pub fn drain_core_msgs(rx: &mut EventRx) -> Vec<CoreMsg> {
    let mut out = Vec::new();
    while let Ok(frame) = rx.try_recv() {
        out.push(CoreMsg::decode(&frame).expect("manager emitted a malformed event"));
    }
    out
}

/// A hand-driven remote node on the far side of the switch.
pub struct RemotePeer {
    pub identity: Identity,
    /// CryptoAuth session toward the local manager.
    pub ca: CaSession,
    /// Handle this peer advertises for packets destined to it.
    pub receive_handle: u32,
    /// Handle learned from the manager's handshake payloads.
    pub send_handle: Option<u32>,
}

impl RemotePeer {
    pub fn new(local: &Identity) -> Self {
        Self::with_handle(local, 0x99)
    }

    pub fn with_handle(local: &Identity, receive_handle: u32) -> Self {
        let identity = Identity::generate();
        let ca = CaSession::new(&identity, *local.public_key_bytes(), *local.address().as_bytes())
            .expect("generated identity has a valid key");
        Self { identity, ca, receive_handle, send_handle: None }
    }

    pub fn ip6(&self) -> [u8; 16] {
        *self.identity.address().as_bytes()
    }

    pub fn public_key(&self) -> [u8; 32] {
        *self.identity.public_key_bytes()
    }

    /// Build a switch-form packet carrying `payload` to the manager.
    pub fn build_switch_packet(&mut self, label: u64, payload: &[u8]) -> Packet {
        let mut packet = Packet::from_payload(payload);
        if self.ca.state().is_pre_key() {
            packet.push_front_u32(self.receive_handle);
        }
        let frame = self.ca.encrypt(&mut packet, 0).expect("peer encrypt");
        if frame == crate::crypto::CaFrame::Run {
            let handle = self.send_handle.expect("run packet before handshake finished");
            packet.push_front_u32(handle);
        }
        packet.push_front(&SwitchHeader::with_label(label).encode());
        packet
    }

    /// Open a switch-form packet the manager emitted toward this peer.
    /// Returns the label and the decrypted payload.
    pub fn open_switch_packet(&mut self, mut packet: Packet) -> (u64, Vec<u8>) {
        let switch_header = SwitchHeader::parse(packet.bytes()).expect("switch header");
        packet.pop_front(SwitchHeader::SIZE).unwrap();
        let word = packet.peek_u32().unwrap();
        if word > MAX_HANDSHAKE_STAGE {
            let handle = packet.pop_front_u32().unwrap();
            assert_eq!(handle, self.receive_handle, "manager stamped the wrong handle");
            self.ca.decrypt(&mut packet, 0).expect("peer decrypt run");
        } else {
            self.ca.decrypt(&mut packet, 0).expect("peer decrypt handshake");
            let handle = packet.pop_front_u32().expect("handshake payload carries a handle");
            self.send_handle = Some(handle);
        }
        (switch_header.label, packet.bytes().to_vec())
    }
}

/// Build an inside-form packet.
pub fn inside_packet(
    ip6: [u8; 16],
    public_key: [u8; 32],
    version: u32,
    label: u64,
    payload: &[u8],
) -> Packet {
    let header = RouteHeader {
        switch: SwitchHeader::with_label(label),
        version,
        ip6,
        public_key,
    };
    let mut packet = Packet::from_payload(payload);
    packet.push_front(&header.encode());
    packet
}

/// Encoded NODE discovery frame.
pub fn node_event(ip6: [u8; 16], path: u64, public_key: [u8; 32], version: u32) -> Vec<u8> {
    PathfinderMsg::Node {
        source_pf: 1,
        record: NodeRecord {
            path,
            metric: METRIC_UNKNOWN,
            version,
            ip6,
            public_key,
        },
    }
    .encode()
}

/// Grind a real secp256k1 key whose derived address is not fc-prefixed.
pub fn non_fc_public_key() -> [u8; 32] {
    loop {
        let identity_attempt = {
            use rand::RngCore;
            use secp256k1::{Keypair, Secp256k1, SecretKey};
            let secp = Secp256k1::new();
            let mut rng = rand::rng();
            let mut secret = [0u8; 32];
            rng.fill_bytes(&mut secret);
            match SecretKey::from_slice(&secret) {
                Ok(sk) => Keypair::from_secret_key(&secp, &sk)
                    .x_only_public_key()
                    .0
                    .serialize(),
                Err(_) => continue,
            }
        };
        if OverlayAddress::for_public_key(&identity_attempt).is_none() {
            return identity_attempt;
        }
    }
}
