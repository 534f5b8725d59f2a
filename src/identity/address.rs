//! 128-bit overlay address with IPv6-compatible format.

use std::fmt;
use std::net::Ipv6Addr;

use super::{sha256, IdentityError, ADDRESS_PREFIX, PUBLIC_KEY_SIZE};

/// 128-bit overlay address in the IPv6 `fc00::/8` range.
///
/// The address is the first 16 bytes of `sha256(sha256(public_key))` and
/// is only valid when the leading byte is `0xfc`. Roughly one key in 256
/// derives a valid address; `Identity::generate` grinds for one. The
/// format lets applications designed for IP transports address overlay
/// peers directly.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct OverlayAddress([u8; 16]);

impl OverlayAddress {
    /// Create an OverlayAddress from a 16-byte array.
    pub fn from_bytes(bytes: [u8; 16]) -> Result<Self, IdentityError> {
        if bytes[0] != ADDRESS_PREFIX {
            return Err(IdentityError::InvalidAddressPrefix(bytes[0]));
        }
        Ok(Self(bytes))
    }

    /// Create an OverlayAddress from a slice.
    pub fn from_slice(slice: &[u8]) -> Result<Self, IdentityError> {
        if slice.len() != 16 {
            return Err(IdentityError::InvalidAddressLength(slice.len()));
        }
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(slice);
        Self::from_bytes(bytes)
    }

    /// Derive the address for a serialized x-only public key.
    ///
    /// Returns `None` when the key does not hash into `fc00::/8`; such
    /// keys have no overlay address and handshakes carrying them are
    /// dropped.
    pub fn for_public_key(public_key: &[u8; PUBLIC_KEY_SIZE]) -> Option<Self> {
        let digest = sha256(&sha256(public_key));
        if digest[0] != ADDRESS_PREFIX {
            return None;
        }
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&digest[..16]);
        Some(Self(bytes))
    }

    /// Return the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Convert to std::net::Ipv6Addr.
    pub fn to_ipv6(&self) -> Ipv6Addr {
        Ipv6Addr::from(self.0)
    }
}

impl From<OverlayAddress> for Ipv6Addr {
    fn from(addr: OverlayAddress) -> Self {
        Ipv6Addr::from(addr.0)
    }
}

impl fmt::Debug for OverlayAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OverlayAddress({})", self.to_ipv6())
    }
}

impl fmt::Display for OverlayAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_ipv6())
    }
}
