//! HALO: Handle-Addressed Label Overlay
//!
//! The session layer between a plaintext inside interface and a
//! label-switched encrypted mesh. For every remote peer, identified by
//! an fc-prefixed address derived from its public key, the manager owns
//! a CryptoAuth session and a pair of 32-bit handles used to
//! demultiplex packets without re-parsing identity, buffers outbound
//! traffic until the pathfinder resolves a route, and rewrites headers
//! between the inside and switch packet forms.

pub mod config;
pub mod crypto;
pub mod iface;
pub mod identity;
pub mod manager;
pub mod packet;
pub mod wire;

// Re-export configuration types
pub use config::{Config, ConfigError, SessionConfig};

// Re-export CryptoAuth types
pub use crypto::{CaFrame, CaSession, CaState, CryptoError};

// Re-export interface plumbing
pub use iface::{event_channel, packet_channel, EventRx, EventTx, PacketRx, PacketTx};

// Re-export identity types
pub use identity::{Identity, IdentityError, OverlayAddress};

// Re-export session manager types
pub use manager::{BufferedMessages, Session, SessionManager, SessionTable, TableError};

// Re-export packet buffer types
pub use packet::{Packet, PacketError};

// Re-export wire types
pub use wire::{
    CoreEvent, CoreMsg, NodeRecord, PathfinderEvent, PathfinderMsg, RouteHeader, SwitchHeader,
    WireError,
};
