//! CryptoAuth session state machine.

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    ChaCha20Poly1305, Nonce,
};
use hkdf::Hkdf;
use rand::RngCore;
use secp256k1::{
    ecdh::shared_secret_point, All, Keypair, Parity, PublicKey, Secp256k1, SecretKey,
    XOnlyPublicKey,
};
use sha2::Sha256;

use super::{
    CaFrame, CaState, CryptoError, FIRST_RUN_COUNTER, HANDSHAKE_HEADER_SIZE,
    HANDSHAKE_RESET_MS, MAX_HANDSHAKE_STAGE, PROTOCOL_NAME, RUN_HEADER_SIZE, TAG_SIZE,
};
use crate::identity::Identity;
use crate::packet::Packet;

/// Directional transport keys derived from the key packet.
struct TransportKeys {
    tx: [u8; 32],
    rx: [u8; 32],
}

/// A CryptoAuth session with one remote peer.
///
/// Owns the handshake state and, once past the key packet, the
/// directional transport keys. All operations are in-memory and
/// non-blocking; encryption and decryption rewrite the packet in place.
pub struct CaSession {
    secp: Secp256k1<All>,
    /// Our permanent keypair.
    local: Keypair,
    /// Peer permanent key, x-only serialization.
    her_public_key: [u8; 32],
    /// Peer overlay address, fixed at session creation.
    her_ip6: [u8; 16],
    state: CaState,
    /// Our handshake ephemeral; regenerated per hello.
    local_eph: Option<Keypair>,
    /// Peer's handshake ephemeral, learned from their hello or key.
    remote_eph: Option<XOnlyPublicKey>,
    /// Live transport keys, present from KeySent / Established.
    keys: Option<TransportKeys>,
    /// Next run-frame counter we will send.
    send_counter: u32,
    /// Highest run-frame counter accepted from the peer.
    recv_counter: u32,
    /// Rekey key we advertise in run frames.
    local_ratchet: Keypair,
    /// Peer's latest advertised rekey key. Rekeying itself is not
    /// implemented; the field tracks the freshest value seen.
    her_ratchet: Option<[u8; 32]>,
    /// Last handshake activity, for the stuck-handshake reset.
    last_handshake_ms: u64,
}

impl CaSession {
    /// Create a session with a known peer key and address.
    pub fn new(
        local: &Identity,
        her_public_key: [u8; 32],
        her_ip6: [u8; 16],
    ) -> Result<Self, CryptoError> {
        // Reject keys that are not valid curve points up front.
        XOnlyPublicKey::from_slice(&her_public_key).map_err(CryptoError::InvalidPublicKey)?;
        let secp = Secp256k1::new();
        let local_ratchet = random_keypair(&secp);
        Ok(Self {
            secp,
            local: local.keypair(),
            her_public_key,
            her_ip6,
            state: CaState::Init,
            local_eph: None,
            remote_eph: None,
            keys: None,
            send_counter: FIRST_RUN_COUNTER,
            recv_counter: FIRST_RUN_COUNTER - 1,
            local_ratchet,
            her_ratchet: None,
            last_handshake_ms: 0,
        })
    }

    /// Peer overlay address.
    pub fn her_ip6(&self) -> &[u8; 16] {
        &self.her_ip6
    }

    /// Peer permanent public key.
    pub fn her_public_key(&self) -> &[u8; 32] {
        &self.her_public_key
    }

    /// Current handshake state.
    pub fn state(&self) -> CaState {
        self.state
    }

    /// Peer's latest advertised rekey key, if any run frame arrived.
    pub fn her_ratchet(&self) -> Option<&[u8; 32]> {
        self.her_ratchet.as_ref()
    }

    /// Reset a session stuck mid-handshake for `HANDSHAKE_RESET_MS`.
    ///
    /// Called from the outbound path so a peer that lost our handshake
    /// gets a fresh hello instead of an undecryptable run frame.
    pub fn reset_if_timeout(&mut self, now_ms: u64) {
        if self.state == CaState::Init || self.state == CaState::Established {
            return;
        }
        if now_ms.saturating_sub(self.last_handshake_ms) > HANDSHAKE_RESET_MS {
            self.reset();
        }
    }

    fn reset(&mut self) {
        self.state = CaState::Init;
        self.local_eph = None;
        self.remote_eph = None;
        self.keys = None;
        self.send_counter = FIRST_RUN_COUNTER;
        self.recv_counter = FIRST_RUN_COUNTER - 1;
        self.her_ratchet = None;
    }

    // ========================================================================
    // Encrypt
    // ========================================================================

    /// Encrypt `packet` in place, advancing the handshake as needed.
    ///
    /// Returns which frame kind was produced: handshake frames carry
    /// their identity in-band, run frames expect the caller to stamp a
    /// handle in front.
    pub fn encrypt(
        &mut self,
        packet: &mut Packet,
        now_ms: u64,
    ) -> Result<CaFrame, CryptoError> {
        match self.state {
            CaState::Init | CaState::HelloSent => self.send_hello(packet, now_ms),
            CaState::HelloReceived => self.send_key(packet, now_ms),
            CaState::KeySent | CaState::Established => self.send_run(packet),
        }
    }

    fn send_hello(&mut self, packet: &mut Packet, now_ms: u64) -> Result<CaFrame, CryptoError> {
        let stage: u32 = if self.state == CaState::Init { 0 } else { 1 };
        let eph = random_keypair(&self.secp);
        let her_perm = self.her_xonly();

        let eph_secret = SecretKey::from_keypair(&eph);
        let local_secret = SecretKey::from_keypair(&self.local);
        let mut ikm = [0u8; 64];
        ikm[..32].copy_from_slice(&ecdh_x(&eph_secret, &her_perm));
        ikm[32..].copy_from_slice(&ecdh_x(&local_secret, &her_perm));
        let key = derive_key(&ikm, b"hello");

        let header = self.seal_handshake(packet, stage, &eph, &key)?;
        packet.push_front(&header);

        self.local_eph = Some(eph);
        self.state = CaState::HelloSent;
        self.last_handshake_ms = now_ms;
        Ok(CaFrame::Handshake)
    }

    fn send_key(&mut self, packet: &mut Packet, now_ms: u64) -> Result<CaFrame, CryptoError> {
        let remote_eph = self
            .remote_eph
            .expect("hello_received state implies a remote ephemeral");
        let eph = random_keypair(&self.secp);

        let eph_secret = SecretKey::from_keypair(&eph);
        let local_secret = SecretKey::from_keypair(&self.local);
        let mut ikm = [0u8; 64];
        ikm[..32].copy_from_slice(&ecdh_x(&eph_secret, &remote_eph));
        ikm[32..].copy_from_slice(&ecdh_x(&local_secret, &remote_eph));
        let key = derive_key(&ikm, b"key");

        let header = self.seal_handshake(packet, 2, &eph, &key)?;
        packet.push_front(&header);

        self.keys = Some(split_transport_keys(&ikm, false));
        self.local_eph = Some(eph);
        self.state = CaState::KeySent;
        self.last_handshake_ms = now_ms;
        Ok(CaFrame::Handshake)
    }

    fn send_run(&mut self, packet: &mut Packet) -> Result<CaFrame, CryptoError> {
        let keys = self.keys.as_ref().expect("run state implies transport keys");
        if self.send_counter == u32::MAX {
            return Err(CryptoError::CounterExhausted);
        }
        let counter = self.send_counter;

        let mut prefix = [0u8; 36];
        prefix[..4].copy_from_slice(&counter.to_be_bytes());
        prefix[4..].copy_from_slice(&self.local_ratchet.x_only_public_key().0.serialize());

        let cipher = ChaCha20Poly1305::new((&keys.tx).into());
        let sealed = cipher
            .encrypt(&nonce_for(counter), Payload { msg: packet.bytes(), aad: &prefix })
            .map_err(|_| CryptoError::EncryptFailed)?;
        let (body, tag) = sealed.split_at(sealed.len() - TAG_SIZE);

        let mut header = [0u8; RUN_HEADER_SIZE];
        header[..36].copy_from_slice(&prefix);
        header[36..].copy_from_slice(tag);
        packet.overwrite(body);
        packet.push_front(&header);

        self.send_counter += 1;
        Ok(CaFrame::Run)
    }

    /// Seal a handshake payload and build the 84-byte frame header.
    fn seal_handshake(
        &self,
        packet: &mut Packet,
        stage: u32,
        eph: &Keypair,
        key: &[u8; 32],
    ) -> Result<[u8; HANDSHAKE_HEADER_SIZE], CryptoError> {
        let mut prefix = [0u8; 68];
        prefix[..4].copy_from_slice(&stage.to_be_bytes());
        prefix[4..36].copy_from_slice(&self.local.x_only_public_key().0.serialize());
        prefix[36..68].copy_from_slice(&eph.x_only_public_key().0.serialize());

        let cipher = ChaCha20Poly1305::new(key.into());
        let sealed = cipher
            .encrypt(&nonce_for(stage), Payload { msg: packet.bytes(), aad: &prefix })
            .map_err(|_| CryptoError::EncryptFailed)?;
        let (body, tag) = sealed.split_at(sealed.len() - TAG_SIZE);

        let mut header = [0u8; HANDSHAKE_HEADER_SIZE];
        header[..68].copy_from_slice(&prefix);
        header[68..].copy_from_slice(tag);
        packet.overwrite(body);
        Ok(header)
    }

    // ========================================================================
    // Decrypt
    // ========================================================================

    /// Decrypt `packet` in place.
    ///
    /// The leading big-endian u32 selects the path: 0-3 handshake
    /// stage, otherwise run counter. Failures leave state untouched so
    /// a garbage packet cannot wedge a live session.
    pub fn decrypt(
        &mut self,
        packet: &mut Packet,
        now_ms: u64,
    ) -> Result<CaFrame, CryptoError> {
        let word = packet.peek_u32().map_err(|_| CryptoError::Runt {
            needed: 4,
            got: packet.len(),
        })?;
        if word <= MAX_HANDSHAKE_STAGE {
            self.decrypt_handshake(packet, word, now_ms)
        } else {
            self.decrypt_run(packet, word)
        }
    }

    fn decrypt_handshake(
        &mut self,
        packet: &mut Packet,
        stage: u32,
        now_ms: u64,
    ) -> Result<CaFrame, CryptoError> {
        if packet.len() < HANDSHAKE_HEADER_SIZE {
            return Err(CryptoError::Runt {
                needed: HANDSHAKE_HEADER_SIZE,
                got: packet.len(),
            });
        }
        let bytes = packet.bytes();
        let mut perm = [0u8; 32];
        perm.copy_from_slice(&bytes[4..36]);
        let mut eph_bytes = [0u8; 32];
        eph_bytes.copy_from_slice(&bytes[36..68]);
        let mut tag = [0u8; TAG_SIZE];
        tag.copy_from_slice(&bytes[68..84]);

        if perm != self.her_public_key {
            return Err(CryptoError::KeyMismatch);
        }
        let eph =
            XOnlyPublicKey::from_slice(&eph_bytes).map_err(CryptoError::InvalidPublicKey)?;

        if stage <= 1 {
            self.recv_hello(packet, stage, eph, &tag, now_ms)
        } else {
            self.recv_key(packet, stage, eph, &tag, now_ms)
        }
    }

    fn recv_hello(
        &mut self,
        packet: &mut Packet,
        stage: u32,
        remote_eph: XOnlyPublicKey,
        tag: &[u8; TAG_SIZE],
        now_ms: u64,
    ) -> Result<CaFrame, CryptoError> {
        // Simultaneous hellos: the smaller permanent key keeps the
        // initiator role, the other side answers with a key packet.
        if self.state == CaState::HelloSent
            && self.her_public_key > self.local.x_only_public_key().0.serialize()
        {
            return Err(CryptoError::HelloRace);
        }

        let local_secret = SecretKey::from_keypair(&self.local);
        let mut ikm = [0u8; 64];
        ikm[..32].copy_from_slice(&ecdh_x(&local_secret, &remote_eph));
        ikm[32..].copy_from_slice(&ecdh_x(&local_secret, &self.her_xonly()));
        let key = derive_key(&ikm, b"hello");

        self.open_frame(packet, HANDSHAKE_HEADER_SIZE, stage, tag, &key)?;

        // A hello also resets an established session: the peer has
        // evidently lost its state and wants a fresh handshake.
        self.reset();
        self.remote_eph = Some(remote_eph);
        self.state = CaState::HelloReceived;
        self.last_handshake_ms = now_ms;
        Ok(CaFrame::Handshake)
    }

    fn recv_key(
        &mut self,
        packet: &mut Packet,
        stage: u32,
        remote_eph: XOnlyPublicKey,
        tag: &[u8; TAG_SIZE],
        now_ms: u64,
    ) -> Result<CaFrame, CryptoError> {
        if self.state != CaState::HelloSent {
            return Err(CryptoError::WrongState { what: "key packet", got: self.state });
        }
        let eph = self.local_eph.expect("hello_sent state implies a local ephemeral");
        let eph_secret = SecretKey::from_keypair(&eph);
        let mut ikm = [0u8; 64];
        ikm[..32].copy_from_slice(&ecdh_x(&eph_secret, &remote_eph));
        ikm[32..].copy_from_slice(&ecdh_x(&eph_secret, &self.her_xonly()));
        let key = derive_key(&ikm, b"key");

        self.open_frame(packet, HANDSHAKE_HEADER_SIZE, stage, tag, &key)?;

        self.keys = Some(split_transport_keys(&ikm, true));
        self.remote_eph = Some(remote_eph);
        self.state = CaState::Established;
        self.last_handshake_ms = now_ms;
        Ok(CaFrame::Handshake)
    }

    fn decrypt_run(&mut self, packet: &mut Packet, counter: u32) -> Result<CaFrame, CryptoError> {
        if self.state < CaState::KeySent {
            return Err(CryptoError::WrongState { what: "run frame", got: self.state });
        }
        if packet.len() < RUN_HEADER_SIZE {
            return Err(CryptoError::Runt { needed: RUN_HEADER_SIZE, got: packet.len() });
        }
        if counter <= self.recv_counter {
            return Err(CryptoError::Replay(counter));
        }
        let bytes = packet.bytes();
        let mut ratchet = [0u8; 32];
        ratchet.copy_from_slice(&bytes[4..36]);
        let mut tag = [0u8; TAG_SIZE];
        tag.copy_from_slice(&bytes[36..52]);

        let rx = self.keys.as_ref().expect("key_sent state implies transport keys").rx;
        self.open_frame(packet, RUN_HEADER_SIZE, counter, &tag, &rx)?;

        self.recv_counter = counter;
        self.her_ratchet = Some(ratchet);
        if self.state == CaState::KeySent {
            self.state = CaState::Established;
        }
        Ok(CaFrame::Run)
    }

    /// Verify and decrypt a frame in place: strip `header_size`, swap
    /// the body for plaintext. State is only touched by callers after
    /// success.
    fn open_frame(
        &self,
        packet: &mut Packet,
        header_size: usize,
        nonce_word: u32,
        tag: &[u8; TAG_SIZE],
        key: &[u8; 32],
    ) -> Result<(), CryptoError> {
        let aad_len = header_size - TAG_SIZE;
        let bytes = packet.bytes();
        let mut sealed = Vec::with_capacity(bytes.len() - header_size + TAG_SIZE);
        sealed.extend_from_slice(&bytes[header_size..]);
        sealed.extend_from_slice(tag);

        let cipher = ChaCha20Poly1305::new(key.into());
        let plaintext = cipher
            .decrypt(
                &nonce_for(nonce_word),
                Payload { msg: &sealed, aad: &bytes[..aad_len] },
            )
            .map_err(|_| CryptoError::DecryptFailed)?;

        packet.pop_front(header_size).expect("header length already checked");
        packet.overwrite(&plaintext);
        Ok(())
    }

    fn her_xonly(&self) -> XOnlyPublicKey {
        XOnlyPublicKey::from_slice(&self.her_public_key)
            .expect("peer key validated at session creation")
    }
}

/// ECDH returning only the x-coordinate of the shared point.
///
/// X-only public keys carry no parity; P and -P share an x-coordinate
/// under scalar multiplication, so lifting with even parity and hashing
/// only x gives both sides the same secret regardless of the key's
/// actual parity.
fn ecdh_x(secret: &SecretKey, public: &XOnlyPublicKey) -> [u8; 32] {
    let full = PublicKey::from_x_only_public_key(*public, Parity::Even);
    let point = shared_secret_point(&full, secret);
    let mut out = [0u8; 32];
    out.copy_from_slice(&point[..32]);
    out
}

fn derive_key(ikm: &[u8; 64], info: &[u8]) -> [u8; 32] {
    let hk = Hkdf::<Sha256>::new(Some(PROTOCOL_NAME), ikm);
    let mut okm = [0u8; 32];
    hk.expand(info, &mut okm).expect("32 bytes is a valid hkdf output length");
    okm
}

/// Derive the directional transport keys from the key-packet secret.
fn split_transport_keys(ikm: &[u8; 64], initiator: bool) -> TransportKeys {
    let hk = Hkdf::<Sha256>::new(Some(PROTOCOL_NAME), ikm);
    let mut okm = [0u8; 64];
    hk.expand(b"transport", &mut okm).expect("64 bytes is a valid hkdf output length");
    let mut init_tx = [0u8; 32];
    let mut resp_tx = [0u8; 32];
    init_tx.copy_from_slice(&okm[..32]);
    resp_tx.copy_from_slice(&okm[32..]);
    if initiator {
        TransportKeys { tx: init_tx, rx: resp_tx }
    } else {
        TransportKeys { tx: resp_tx, rx: init_tx }
    }
}

/// 96-bit nonce from a frame word: zero prefix + big-endian word.
fn nonce_for(word: u32) -> Nonce {
    let mut nonce = [0u8; 12];
    nonce[8..].copy_from_slice(&word.to_be_bytes());
    nonce.into()
}

fn random_keypair(secp: &Secp256k1<All>) -> Keypair {
    let mut rng = rand::rng();
    loop {
        let mut secret = [0u8; 32];
        rng.fill_bytes(&mut secret);
        if let Ok(sk) = SecretKey::from_slice(&secret) {
            return Keypair::from_secret_key(secp, &sk);
        }
    }
}
