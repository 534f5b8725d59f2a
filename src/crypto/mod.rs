//! CryptoAuth: per-peer authenticated encryption sessions.
//!
//! A Noise-IK-shaped handshake over secp256k1 with ChaCha20-Poly1305
//! payloads and HKDF-SHA256 key derivation. The initiator knows the
//! responder's permanent key before the handshake (it is how the peer's
//! overlay address was derived in the first place).
//!
//! ## Frames
//!
//! Every encrypted packet leads with a big-endian u32. Values 0-3 are
//! handshake stages; anything larger is a run-frame counter. This is
//! what lets the session layer demultiplex nonce-or-handle without
//! parsing identity: handles are allocated starting at 4, and run
//! counters also start at 4.
//!
//! Handshake frame (84-byte header):
//! ```text
//! [stage: u32 BE][perm_public_key: 32][eph_public_key: 32][tag: 16][ciphertext]
//! ```
//!
//! Run frame (52-byte header):
//! ```text
//! [counter: u32 BE][ratchet_public_key: 32][tag: 16][ciphertext]
//! ```
//!
//! The run-frame header size is load-bearing: switch header (12) +
//! handle (4) + run header (52) equals the route header (68), which is
//! what makes the ingress no-copy rewrite possible.
//!
//! ## Stages
//!
//! ```text
//! 0 hello          initiator -> responder, fresh ephemeral each send
//! 1 hello repeat   retransmitted hello
//! 2 key            responder -> initiator, establishes transport keys
//! 3 key repeat     reserved; current responders send run frames instead
//! ```

mod session;

use std::fmt;
use thiserror::Error;

pub use session::CaSession;

/// Domain separation label for all key derivation.
pub(crate) const PROTOCOL_NAME: &[u8] = b"Halo_IK_secp256k1_ChaChaPoly_SHA256";

/// Size of the AEAD tag.
pub const TAG_SIZE: usize = 16;

/// Size of a handshake frame header (stage + both keys + tag).
pub const HANDSHAKE_HEADER_SIZE: usize = 4 + 32 + 32 + TAG_SIZE;

/// Size of a run frame header (counter + ratchet key + tag).
pub const RUN_HEADER_SIZE: usize = 4 + 32 + TAG_SIZE;

/// Largest leading word that denotes a handshake stage.
pub const MAX_HANDSHAKE_STAGE: u32 = 3;

/// First counter value used by run frames. 0-3 would alias handshake
/// stages on the wire.
pub const FIRST_RUN_COUNTER: u32 = 4;

/// A mid-handshake session that sees no handshake traffic for this long
/// is reset on the next outbound attempt.
pub const HANDSHAKE_RESET_MS: u64 = 60_000;

/// Errors from CryptoAuth operations.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("frame too short: needed {needed}, got {got}")]
    Runt { needed: usize, got: usize },

    #[error("invalid public key: {0}")]
    InvalidPublicKey(secp256k1::Error),

    #[error("handshake key does not match the session peer")]
    KeyMismatch,

    #[error("hello lost the initiator tie-break")]
    HelloRace,

    #[error("{got} session cannot process {what}")]
    WrongState { what: &'static str, got: CaState },

    #[error("decryption failed")]
    DecryptFailed,

    #[error("encryption failed")]
    EncryptFailed,

    #[error("replayed or stale counter {0}")]
    Replay(u32),

    #[error("send counter exhausted")]
    CounterExhausted,
}

/// Handshake progression. Monotonic for a given session except for the
/// explicit resets (timeout, peer re-hello).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum CaState {
    /// Nothing sent or received yet.
    Init,
    /// We sent a hello and wait for a key packet.
    HelloSent,
    /// We received a hello and owe a key packet.
    HelloReceived,
    /// We sent a key packet; transport keys are live, waiting for the
    /// first run frame to confirm.
    KeySent,
    /// Both directions confirmed.
    Established,
}

impl CaState {
    /// Whether this side must still send handshake frames (and so
    /// prefix its receive handle inside the plaintext).
    pub fn is_pre_key(&self) -> bool {
        *self < CaState::KeySent
    }
}

impl fmt::Display for CaState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CaState::Init => "init",
            CaState::HelloSent => "hello_sent",
            CaState::HelloReceived => "hello_received",
            CaState::KeySent => "key_sent",
            CaState::Established => "established",
        };
        write!(f, "{}", name)
    }
}

/// What kind of frame an encrypt/decrypt call produced or consumed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CaFrame {
    /// Hello or key frame; the plaintext leads with the sender's
    /// receive handle.
    Handshake,
    /// Counter-numbered transport frame.
    Run,
}

/// Read the permanent public key out of a raw handshake frame.
///
/// Switch ingress needs the key before a session exists.
pub fn handshake_public_key(data: &[u8]) -> Result<[u8; 32], CryptoError> {
    if data.len() < 36 {
        return Err(CryptoError::Runt { needed: 36, got: data.len() });
    }
    let mut key = [0u8; 32];
    key.copy_from_slice(&data[4..36]);
    Ok(key)
}
