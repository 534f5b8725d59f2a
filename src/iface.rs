//! Interface plumbing between the session manager and its neighbors.
//!
//! The manager talks to three parties: the inside interface (plaintext
//! toward the upper layers), the switch interface (ciphertext toward
//! the mesh), and the pathfinder event bus. Each is a pair of unbounded
//! channels: sends are synchronous and never block, which keeps the
//! single-threaded cooperative model honest. A handler runs to
//! completion and every event it emits is on the wire, in program
//! order, before it returns.

use tokio::sync::mpsc;

use crate::packet::Packet;

/// Sending half of a packet interface.
pub type PacketTx = mpsc::UnboundedSender<Packet>;

/// Receiving half of a packet interface.
pub type PacketRx = mpsc::UnboundedReceiver<Packet>;

/// Sending half of the event bus.
pub type EventTx = mpsc::UnboundedSender<Vec<u8>>;

/// Receiving half of the event bus.
pub type EventRx = mpsc::UnboundedReceiver<Vec<u8>>;

/// Create a packet interface.
pub fn packet_channel() -> (PacketTx, PacketRx) {
    mpsc::unbounded_channel()
}

/// Create an event-bus interface.
pub fn event_channel() -> (EventTx, EventRx) {
    mpsc::unbounded_channel()
}
