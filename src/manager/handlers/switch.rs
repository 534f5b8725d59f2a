//! Switch ingress: ciphertext from the mesh to plaintext upstream.

use std::net::Ipv6Addr;
use tracing::debug;

use crate::crypto::{handshake_public_key, HANDSHAKE_HEADER_SIZE, MAX_HANDSHAKE_STAGE};
use crate::identity::OverlayAddress;
use crate::manager::{SessionEventKind, SessionManager};
use crate::packet::Packet;
use crate::wire::{RouteHeader, SwitchHeader, PATHFINDER_BROADCAST};

/// Smallest acceptable switch packet: switch header, nonce-or-handle
/// word, and the minimum crypto overhead behind it.
const MIN_SWITCH_PACKET: usize = SwitchHeader::SIZE + 4 + 20;

impl SessionManager {
    /// Process one packet from the switch interface.
    ///
    /// Demultiplexes on the word after the switch header: a handle
    /// locates an existing session, a handshake stage creates one from
    /// the embedded key. The decrypted packet is rewritten into the
    /// inside form and forwarded upstream.
    pub fn handle_switch_packet(&mut self, mut packet: Packet) {
        if packet.len() < MIN_SWITCH_PACKET {
            debug!(len = packet.len(), "DROP runt");
            return;
        }
        // Where this packet started, for the layout contract below.
        let base = packet.consumed();
        let switch_header = SwitchHeader::parse(packet.bytes()).expect("length checked");
        packet.pop_front(SwitchHeader::SIZE).expect("length checked");

        let nonce_or_handle = packet.peek_u32().expect("length checked");
        let setup = nonce_or_handle <= MAX_HANDSHAKE_STAGE;

        let index = if !setup {
            let Some(index) = self.table.index_of_handle(nonce_or_handle) else {
                debug!(handle = nonce_or_handle, "DROP message with unrecognized handle");
                return;
            };
            packet.pop_front(4).expect("length checked");
            index
        } else {
            if packet.len() < HANDSHAKE_HEADER_SIZE + 4 {
                debug!(len = packet.len(), "DROP runt handshake");
                return;
            }
            let her_key = handshake_public_key(packet.bytes()).expect("length checked");
            let Some(ip6) = OverlayAddress::for_public_key(&her_key) else {
                debug!("DROP handshake with non-fc key");
                return;
            };
            // A packet which claims to be from us causes problems.
            if &her_key == self.identity.public_key_bytes() {
                debug!("DROP handshake from ourselves");
                return;
            }
            match self.get_or_create_session(
                *ip6.as_bytes(),
                her_key,
                0,
                switch_header.label,
                Self::now_ms(),
            ) {
                Ok(index) => {
                    let session = self.table.get(index);
                    debug!(
                        nonce = nonce_or_handle,
                        recv_handle = session.receive_handle(),
                        ip = %Ipv6Addr::from(*session.ip6()),
                        path = %switch_header,
                        "handshake packet"
                    );
                    index
                }
                Err(e) => {
                    debug!(error = %e, "DROP handshake with unusable key");
                    return;
                }
            }
        };

        let now_ms = Self::now_ms();
        let session = self.table.get_mut(index);
        if let Err(e) = session.ca_mut().decrypt(&mut packet, now_ms) {
            debug!(
                nonce_or_handle,
                state = %session.ca().state(),
                error = %e,
                "DROP failed decrypting message"
            );
            return;
        }

        if setup {
            // First four plaintext bytes are the handle the peer chose
            // for us to stamp on our run packets.
            match packet.pop_front_u32() {
                Ok(handle) => session.set_send_handle(handle),
                Err(_) => {
                    debug!("DROP setup message without a handle");
                    return;
                }
            }
        }

        // Rewrite to the inside form.
        let route = RouteHeader {
            switch: switch_header,
            version: session.version(),
            ip6: *session.ca().her_ip6(),
            public_key: *session.ca().her_public_key(),
        };
        if setup {
            packet.grow_front(RouteHeader::SIZE);
            packet.bytes_mut()[..RouteHeader::SIZE].copy_from_slice(&route.encode());
            debug!(
                recv_handle = session.receive_handle(),
                send_handle = session.send_handle(),
                path = %switch_header,
                "received start message"
            );
        } else {
            // A run packet consumed switch header + handle + run frame,
            // which is exactly one route header: the embedded switch
            // header is already in place. Anything else means the
            // layout is corrupted.
            assert_eq!(
                packet.consumed() - base,
                RouteHeader::SIZE,
                "route header layout broken"
            );
            packet.grow_front(RouteHeader::SIZE);
            assert_eq!(
                &packet.bytes()[..SwitchHeader::SIZE],
                &switch_header.encode(),
                "switch header not in place"
            );
            let encoded = route.encode();
            packet.bytes_mut()[SwitchHeader::SIZE..RouteHeader::SIZE]
                .copy_from_slice(&encoded[SwitchHeader::SIZE..]);
            debug!(
                recv_handle = session.receive_handle(),
                path = %switch_header,
                "received run message"
            );
        }

        let path = switch_header.label;
        if session.send_switch_label() == 0 {
            session.set_send_switch_label(path);
        }
        if path != session.recv_switch_label() {
            session.set_recv_switch_label(path);
            Self::send_session_event(
                &self.event_tx,
                session,
                path,
                PATHFINDER_BROADCAST,
                SessionEventKind::DiscoveredPath,
            );
        }

        if self.inside_tx.send(packet).is_err() {
            debug!("inside interface receiver closed");
        }
    }
}
