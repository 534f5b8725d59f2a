//! HALO identity system.
//!
//! Node identity is a secp256k1 keypair. The overlay address is derived
//! from the 32-byte x-only public key via double SHA-256 and must fall in
//! the `fc00::/8` range; key generation grinds until the derived address
//! is valid. Two peers with the same public key therefore have the same
//! address by construction.

mod address;
mod local;

use sha2::{Digest, Sha256};
use thiserror::Error;

pub use address::OverlayAddress;
pub use local::Identity;

/// Overlay address prefix. Addresses outside `fc00::/8` are invalid.
pub const ADDRESS_PREFIX: u8 = 0xfc;

/// Size of a serialized (x-only) public key.
pub const PUBLIC_KEY_SIZE: usize = 32;

/// Errors that can occur in identity operations.
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("invalid secret key: {0}")]
    InvalidSecretKey(secp256k1::Error),

    #[error("invalid public key: {0}")]
    InvalidPublicKey(secp256k1::Error),

    #[error("public key does not derive an fc-prefixed address")]
    AddressNotDerivable,

    #[error("invalid address length: expected 16, got {0}")]
    InvalidAddressLength(usize),

    #[error("invalid address prefix: expected 0xfc, got 0x{0:02x}")]
    InvalidAddressPrefix(u8),
}

/// Compute SHA-256 of data.
pub(crate) fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let result = hasher.finalize();
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&result);
    hash
}

/// Whether a 32-byte public key field is the all-zero placeholder.
pub fn is_zero_key(key: &[u8; PUBLIC_KEY_SIZE]) -> bool {
    key.iter().all(|&b| b == 0)
}
