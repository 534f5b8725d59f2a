//! Local node identity.

use rand::RngCore;
use secp256k1::{Keypair, Secp256k1, SecretKey, XOnlyPublicKey};
use std::fmt;

use super::{IdentityError, OverlayAddress, PUBLIC_KEY_SIZE};

/// A HALO node identity: a secp256k1 keypair and its derived address.
///
/// Only keypairs whose x-only public key hashes into `fc00::/8` are
/// usable; `generate` retries until it finds one.
pub struct Identity {
    keypair: Keypair,
    public_key: [u8; PUBLIC_KEY_SIZE],
    address: OverlayAddress,
}

impl Identity {
    /// Generate a new random identity.
    ///
    /// Grinds random keys until one derives a valid overlay address
    /// (expected 256 attempts).
    pub fn generate() -> Self {
        let secp = Secp256k1::new();
        let mut rng = rand::rng();
        loop {
            let mut secret_bytes = [0u8; 32];
            rng.fill_bytes(&mut secret_bytes);
            let secret_key = match SecretKey::from_slice(&secret_bytes) {
                Ok(sk) => sk,
                Err(_) => continue,
            };
            let keypair = Keypair::from_secret_key(&secp, &secret_key);
            let public_key = keypair.x_only_public_key().0.serialize();
            if let Some(address) = OverlayAddress::for_public_key(&public_key) {
                return Self { keypair, public_key, address };
            }
        }
    }

    /// Create an identity from secret key bytes.
    ///
    /// Fails when the key is invalid or its address falls outside
    /// `fc00::/8`.
    pub fn from_secret_bytes(bytes: &[u8; 32]) -> Result<Self, IdentityError> {
        let secp = Secp256k1::new();
        let secret_key =
            SecretKey::from_slice(bytes).map_err(IdentityError::InvalidSecretKey)?;
        let keypair = Keypair::from_secret_key(&secp, &secret_key);
        let public_key = keypair.x_only_public_key().0.serialize();
        let address = OverlayAddress::for_public_key(&public_key)
            .ok_or(IdentityError::AddressNotDerivable)?;
        Ok(Self { keypair, public_key, address })
    }

    /// Return the underlying keypair.
    ///
    /// Needed for the CryptoAuth handshake ECDH operations.
    pub fn keypair(&self) -> Keypair {
        self.keypair
    }

    /// Return the x-only public key.
    pub fn public_key(&self) -> XOnlyPublicKey {
        self.keypair.x_only_public_key().0
    }

    /// Return the serialized 32-byte public key.
    pub fn public_key_bytes(&self) -> &[u8; PUBLIC_KEY_SIZE] {
        &self.public_key
    }

    /// Return the overlay address.
    pub fn address(&self) -> &OverlayAddress {
        &self.address
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("public_key", &hex::encode(self.public_key))
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}
