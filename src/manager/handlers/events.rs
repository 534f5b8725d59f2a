//! Event-bus ingress: pathfinder discoveries and enumeration requests.

use std::net::Ipv6Addr;
use tracing::debug;

use crate::manager::{SessionEventKind, SessionManager};
use crate::wire::{NodeRecord, PathfinderMsg, RouteHeader};

impl SessionManager {
    /// Process one frame from the event bus.
    pub fn handle_event(&mut self, frame: &[u8]) {
        let msg = match PathfinderMsg::decode(frame) {
            Ok(msg) => msg,
            Err(e) => {
                debug!(error = %e, "DROP malformed event frame");
                return;
            }
        };
        match msg {
            PathfinderMsg::Sessions { source_pf } => self.enumerate_sessions(source_pf),
            PathfinderMsg::Node { record, .. } => self.handle_node_event(record),
        }
    }

    /// Answer SESSIONS: one SESSION event per live session, addressed
    /// back to the asking pathfinder.
    fn enumerate_sessions(&self, source_pf: u32) {
        for handle in self.table.handles() {
            let session = self.table.lookup_handle(handle).expect("handle snapshot is live");
            Self::send_session_event(
                &self.event_tx,
                session,
                session.send_switch_label(),
                source_pf,
                SessionEventKind::Session,
            );
        }
    }

    /// Apply a NODE discovery.
    ///
    /// With a packet parked for the address: create-or-update the
    /// session and drain the packet through ready-to-send. Without one:
    /// refresh an existing session's path and version, or ignore a peer
    /// we have no interest in.
    fn handle_node_event(&mut self, record: NodeRecord) {
        if !self.buffered.contains(&record.ip6) {
            if let Some(index) = self.table.index_of_ip6(&record.ip6) {
                let session = self.table.get_mut(index);
                session.set_send_switch_label(record.path);
                session.set_version(record.version);
                debug!(
                    ip = %Ipv6Addr::from(record.ip6),
                    path = %format_args!("{:016x}", record.path),
                    "updated session path from discovery"
                );
            }
            return;
        }

        let index = match self.get_or_create_session(
            record.ip6,
            record.public_key,
            record.version,
            record.path,
            Self::now_ms(),
        ) {
            Ok(index) => index,
            Err(e) => {
                debug!(error = %e, "DROP node event with unusable key");
                return;
            }
        };

        if let Some(mut packet) = self.buffered.take(&record.ip6) {
            // The packet was parked without a label; stamp the one the
            // session just learned.
            let label = self.table.get(index).send_switch_label();
            let header = RouteHeader::parse(packet.bytes()).expect("buffered packets carry a route header");
            if header.switch.label == 0 && label != 0 {
                packet.bytes_mut()[..8].copy_from_slice(&label.to_be_bytes());
            }
            debug!(ip = %Ipv6Addr::from(record.ip6), "draining buffered packet");
            self.ready_to_send(packet, index);
        }
    }
}
