//! Inside ingress: plaintext from upstream to ciphertext on the mesh.

use std::net::Ipv6Addr;
use tracing::debug;

use crate::crypto::CaFrame;
use crate::identity::is_zero_key;
use crate::manager::SessionManager;
use crate::packet::Packet;
use crate::wire::{CoreMsg, RouteHeader, PATHFINDER_BROADCAST};

impl SessionManager {
    /// Process one packet from the inside interface.
    ///
    /// Resolves the session by address, creating one when the header
    /// carries a key. Without a key or a label the packet is parked and
    /// a SEARCH_REQ goes out instead.
    pub fn handle_inside_packet(&mut self, mut packet: Packet) {
        // Upstream builds these headers; a short one is corruption.
        assert!(
            packet.len() >= RouteHeader::SIZE,
            "inside packet shorter than a route header"
        );
        let header = RouteHeader::parse(packet.bytes()).expect("length checked");

        let index = match self.table.index_of_ip6(&header.ip6) {
            Some(index) => index,
            None if !is_zero_key(&header.public_key) => {
                match self.get_or_create_session(
                    header.ip6,
                    header.public_key,
                    header.version,
                    header.switch.label,
                    Self::now_ms(),
                ) {
                    Ok(index) => index,
                    Err(e) => {
                        debug!(
                            error = %e,
                            ip = %Ipv6Addr::from(header.ip6),
                            "DROP inside packet with unusable key"
                        );
                        return;
                    }
                }
            }
            None => {
                self.needs_lookup(packet);
                return;
            }
        };

        let session = self.table.get_mut(index);
        if header.version != 0 {
            session.set_version(header.version);
        }
        let session_label = session.send_switch_label();

        if header.switch.label != 0 {
            // Caller chose the path; leave it.
        } else if session_label != 0 {
            packet.bytes_mut()[..8].copy_from_slice(&session_label.to_be_bytes());
        } else {
            // Session exists but neither side knows a path yet.
            self.needs_lookup(packet);
            return;
        }

        self.ready_to_send(packet, index);
    }

    /// Park a packet and ask the pathfinders for a route.
    ///
    /// A newer packet for the same destination replaces the parked one.
    /// At the ceiling, expired entries are pruned first; if the store
    /// is still full the packet is dropped.
    pub(in crate::manager) fn needs_lookup(&mut self, packet: Packet) {
        let header = RouteHeader::parse(packet.bytes()).expect("verified by caller");
        let ip6 = header.ip6;
        debug!(
            ip = %Ipv6Addr::from(ip6),
            "buffering a packet and beginning a search"
        );

        if self.buffered.take(&ip6).is_some() {
            debug!("DROP message which needs lookup because a new one arrived");
        }
        if self.buffered.is_full() {
            self.prune_buffered(Self::now_s());
            if self.buffered.is_full() {
                debug!(
                    max = self.buffered.max(),
                    "DROP message needing lookup, buffer ceiling reached"
                );
                return;
            }
        }
        self.buffered.insert(ip6, packet, Self::now_s());

        Self::emit_event(
            &self.event_tx,
            &CoreMsg::SearchReq { dest_pf: PATHFINDER_BROADCAST, ip6 },
        );
    }

    /// Strip the route header, encrypt, and emit on the switch
    /// interface.
    ///
    /// Pre-key sessions prefix their receive handle inside the
    /// plaintext so the peer can authenticate which session we are;
    /// once transport keys are live the send handle is stamped outside
    /// the ciphertext instead.
    pub(in crate::manager) fn ready_to_send(&mut self, mut packet: Packet, index: usize) {
        let header = RouteHeader::parse(packet.bytes()).expect("verified by caller");
        packet.pop_front(RouteHeader::SIZE).expect("length checked");

        let now_ms = Self::now_ms();
        let session = self.table.get_mut(index);
        session.ca_mut().reset_if_timeout(now_ms);

        if session.ca().state().is_pre_key() {
            packet.push_front_u32(session.receive_handle());
        }

        // Encryption failing here means the session state machine is
        // corrupted; there is no packet-level recovery.
        let frame = session
            .ca_mut()
            .encrypt(&mut packet, now_ms)
            .expect("session encryption failed");

        match frame {
            CaFrame::Run => {
                let send_handle = session
                    .send_handle()
                    .expect("run frame without a learned send handle");
                debug!(
                    recv_handle = session.receive_handle(),
                    send_handle,
                    path = %header.switch,
                    "sending run message"
                );
                packet.push_front_u32(send_handle);
            }
            CaFrame::Handshake => {
                debug!(
                    recv_handle = session.receive_handle(),
                    state = %session.ca().state(),
                    path = %header.switch,
                    "sending start message"
                );
            }
        }

        packet.push_front(&header.switch.encode());
        if self.switch_tx.send(packet).is_err() {
            debug!("switch interface receiver closed");
        }
    }
}
