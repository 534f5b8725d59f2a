//! The session manager.
//!
//! Convergence point of four concerns: per-peer CryptoAuth state with a
//! staged handshake, a dual-keyed session table whose handles survive
//! map churn, coordination with the pathfinder over an event bus with
//! bounded buffering, and bit-level header rewriting between the inside
//! and switch packet forms.
//!
//! Everything runs on one task: the ingress handlers are synchronous
//! `&mut self` methods, emission is non-blocking, and events produced
//! by a handler are on their channel, in program order, before the
//! handler returns.

mod buffer;
mod handlers;
mod session;
mod table;
#[cfg(test)]
mod tests;

use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;
use tracing::debug;

use crate::config::SessionConfig;
use crate::crypto::{CaSession, CryptoError};
use crate::iface::{EventTx, PacketTx};
use crate::identity::Identity;
use crate::wire::{CoreMsg, NodeRecord, METRIC_UNKNOWN, PATHFINDER_BROADCAST};

pub use buffer::{BufferedMessages, BUFFER_TTL_SECONDS};
pub use handlers::BUFFER_CHECK_INTERVAL;
pub use session::Session;
pub use table::{SessionTable, TableError, MAX_FIRST_HANDLE, MIN_FIRST_HANDLE};

/// The session manager. See the module docs.
pub struct SessionManager {
    identity: Identity,
    table: SessionTable,
    buffered: BufferedMessages,
    /// Plaintext toward the upper layers.
    inside_tx: PacketTx,
    /// Ciphertext toward the mesh.
    switch_tx: PacketTx,
    /// Outbound pathfinder events.
    event_tx: EventTx,
    /// Retained for interface compatibility; metric decay was removed.
    metric_halflife_ms: u64,
}

impl SessionManager {
    /// Assemble a manager around its three outbound interfaces.
    ///
    /// Draws the random handle offset; handles allocated by this
    /// manager are `first_handle + slot`, starting at `first_handle`.
    pub fn new(
        identity: Identity,
        config: &SessionConfig,
        inside_tx: PacketTx,
        switch_tx: PacketTx,
        event_tx: EventTx,
    ) -> Self {
        let first_handle = rand::rng().random_range(MIN_FIRST_HANDLE..MAX_FIRST_HANDLE);
        Self {
            identity,
            table: SessionTable::new(first_handle),
            buffered: BufferedMessages::new(config.max_buffered_messages),
            inside_tx,
            switch_tx,
            event_tx,
            metric_halflife_ms: config.metric_halflife_ms,
        }
    }

    /// The local identity.
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// The random handle offset.
    pub fn first_handle(&self) -> u32 {
        self.table.first_handle()
    }

    /// Number of live sessions.
    pub fn session_count(&self) -> usize {
        self.table.len()
    }

    /// Number of packets awaiting path resolution.
    pub fn buffered_count(&self) -> usize {
        self.buffered.len()
    }

    /// Look up a session by peer address.
    pub fn session_for_ip6(&self, ip6: &[u8; 16]) -> Option<&Session> {
        self.table.lookup_ip6(ip6)
    }

    /// Look up a session by receive handle.
    pub fn session_for_handle(&self, handle: u32) -> Option<&Session> {
        self.table.lookup_handle(handle)
    }

    /// Snapshot of live handles.
    pub fn handles(&self) -> Vec<u32> {
        self.table.handles()
    }

    /// Configured metric halflife. Unused by current logic.
    pub fn metric_halflife_ms(&self) -> u64 {
        self.metric_halflife_ms
    }

    /// Tear down the session for an address.
    ///
    /// Emits exactly one SESSION_ENDED carrying the last known send
    /// label. Returns false when no session existed.
    pub fn drop_session(&mut self, ip6: &[u8; 16]) -> bool {
        match self.table.remove_ip6(ip6) {
            Some(session) => {
                debug!(
                    ip = %std::net::Ipv6Addr::from(*ip6),
                    recv_handle = session.receive_handle(),
                    "session ended"
                );
                Self::emit_event(
                    &self.event_tx,
                    &CoreMsg::SessionEnded {
                        dest_pf: PATHFINDER_BROADCAST,
                        record: Self::session_record(&session, session.send_switch_label()),
                    },
                );
                true
            }
            None => false,
        }
    }

    /// Find or create the session for a peer.
    ///
    /// On an existing session, nonzero stored version/label win over
    /// the arguments. On creation the SESSION event is emitted before
    /// the index is returned, so the bus sees the peer before any
    /// packet does.
    fn get_or_create_session(
        &mut self,
        ip6: [u8; 16],
        public_key: [u8; 32],
        version: u32,
        label: u64,
        now_ms: u64,
    ) -> Result<usize, CryptoError> {
        if let Some(index) = self.table.index_of_ip6(&ip6) {
            let session = self.table.get_mut(index);
            if session.version() == 0 {
                session.set_version(version);
            }
            if session.send_switch_label() == 0 {
                session.set_send_switch_label(label);
            }
            return Ok(index);
        }

        let ca = CaSession::new(&self.identity, public_key, ip6)?;
        let session = Session::new(ca, version, label, now_ms);
        let (index, handle) = self
            .table
            .insert(ip6, session)
            .expect("session insert after negative lookup");
        let session = self.table.get(index);
        debug!(
            ip = %std::net::Ipv6Addr::from(ip6),
            recv_handle = handle,
            version,
            path = %format_args!("{label:016x}"),
            "new session"
        );
        Self::send_session_event(
            &self.event_tx,
            session,
            label,
            PATHFINDER_BROADCAST,
            SessionEventKind::Session,
        );
        Ok(index)
    }

    /// Build the event-bus record for a session, with an explicit path.
    fn session_record(session: &Session, path: u64) -> NodeRecord {
        NodeRecord {
            path,
            metric: METRIC_UNKNOWN,
            version: session.version(),
            ip6: *session.ca().her_ip6(),
            public_key: *session.ca().her_public_key(),
        }
    }

    /// Emit a SESSION-shaped event for a session.
    fn send_session_event(
        event_tx: &EventTx,
        session: &Session,
        path: u64,
        dest_pf: u32,
        kind: SessionEventKind,
    ) {
        let record = Self::session_record(session, path);
        let msg = match kind {
            SessionEventKind::Session => CoreMsg::Session { dest_pf, record },
            SessionEventKind::DiscoveredPath => CoreMsg::DiscoveredPath { dest_pf, record },
        };
        Self::emit_event(event_tx, &msg);
    }

    /// Put an event on the bus. The bus accepts every message; a closed
    /// receiver only happens at teardown.
    fn emit_event(event_tx: &EventTx, msg: &CoreMsg) {
        if event_tx.send(msg.encode()).is_err() {
            debug!(kind = %msg.kind(), "event bus receiver closed");
        }
    }

    /// Current Unix time in milliseconds.
    fn now_ms() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }

    /// Current Unix time in seconds.
    fn now_s() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}

/// Which session-record event to emit.
enum SessionEventKind {
    Session,
    DiscoveredPath,
}

impl Drop for SessionManager {
    /// Tearing down the manager tears down every session, each with its
    /// SESSION_ENDED.
    fn drop(&mut self) {
        for session in self.table.drain() {
            Self::emit_event(
                &self.event_tx,
                &CoreMsg::SessionEnded {
                    dest_pf: PATHFINDER_BROADCAST,
                    record: Self::session_record(&session, session.send_switch_label()),
                },
            );
        }
    }
}
