//! Buffered-message expiry.

use std::time::Duration;
use tracing::debug;

use crate::manager::SessionManager;

/// Cadence of the periodic buffered-message sweep.
pub const BUFFER_CHECK_INTERVAL: Duration = Duration::from_secs(10);

impl SessionManager {
    /// Drop buffered packets whose search has been outstanding too
    /// long.
    ///
    /// Runs on the periodic tick, and synchronously when the inside
    /// ingress hits the buffer ceiling.
    pub fn check_timed_out_buffers(&mut self) {
        self.prune_buffered(Self::now_s());
    }

    pub(in crate::manager) fn prune_buffered(&mut self, now_s: u64) {
        let removed = self.buffered.prune_expired(now_s);
        if removed > 0 {
            debug!(removed, "dropped expired buffered packets");
        }
    }
}
