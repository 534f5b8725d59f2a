//! Event loop driver.

use tracing::info;

use super::BUFFER_CHECK_INTERVAL;
use crate::iface::{EventRx, PacketRx};
use crate::manager::SessionManager;

impl SessionManager {
    /// Drive the manager from its three inbound channels.
    ///
    /// Multiplexes switch ingress, inside ingress and the event bus on
    /// one task, with the periodic buffered-message sweep. Returns when
    /// any inbound channel closes.
    pub async fn run(
        &mut self,
        mut switch_rx: PacketRx,
        mut inside_rx: PacketRx,
        mut event_rx: EventRx,
    ) {
        let mut tick = tokio::time::interval(BUFFER_CHECK_INTERVAL);
        info!(first_handle = self.first_handle(), "session manager started");

        loop {
            tokio::select! {
                packet = switch_rx.recv() => match packet {
                    Some(packet) => self.handle_switch_packet(packet),
                    None => break,
                },
                packet = inside_rx.recv() => match packet {
                    Some(packet) => self.handle_inside_packet(packet),
                    None => break,
                },
                frame = event_rx.recv() => match frame {
                    Some(frame) => self.handle_event(&frame),
                    None => break,
                },
                _ = tick.tick() => self.check_timed_out_buffers(),
            }
        }

        info!("session manager stopped (channel closed)");
    }
}
