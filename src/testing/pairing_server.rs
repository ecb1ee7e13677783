//! Accessory side of pair-setup and pair-verify, for exercising the controller in tests

use std::collections::HashMap;

use rand::RngCore;
use thiserror::Error;

use crate::protocol::crypto::{
    ChaCha20Poly1305Cipher, ControlKeys, CryptoError, Ed25519KeyPair, Ed25519PublicKey,
    Ed25519Signature, Nonce, SessionKey, SrpParams, SrpServer, X25519KeyPair, X25519PublicKey,
    derive_key,
};
use crate::protocol::pairing::tlv::{TlvDecoder, TlvEncoder, TlvError, TlvType, errors};

/// Reasons the accessory refuses a pairing message
#[derive(Debug, Error)]
pub enum PairingServerError {
    #[error("TLV decode failed: {0}")]
    Tlv(#[from] TlvError),
    #[error("crypto failure: {0}")]
    Crypto(#[from] CryptoError),
    #[error("unexpected state {0}")]
    UnexpectedState(u8),
    #[error("controller is not paired")]
    UnknownController,
    #[error("authentication failed")]
    Authentication,
}

/// Keys an accessory uses once pair-verify completes
#[derive(Clone)]
pub struct AccessorySessionKeys {
    /// Accessory to controller (the controller's read key)
    pub encrypt_key: [u8; 32],
    /// Controller to accessory (the controller's write key)
    pub decrypt_key: [u8; 32],
}

/// Reply to one pairing request
pub struct PairingReply {
    /// TLV body to send back
    pub body: Vec<u8>,
    /// Set once pair-verify has finished
    pub session_keys: Option<AccessorySessionKeys>,
}

impl PairingReply {
    fn send(body: Vec<u8>) -> Self {
        Self {
            body,
            session_keys: None,
        }
    }
}

struct VerifySession {
    ephemeral: X25519KeyPair,
    controller_ephemeral: [u8; 32],
    shared: [u8; 32],
}

/// Accessory-side pairing responder
pub struct PairingServer {
    accessory_id: String,
    identity: Ed25519KeyPair,
    setup_code: String,
    salt: [u8; 16],
    srp: Option<SrpServer>,
    srp_key: Option<SessionKey>,
    verify: Option<VerifySession>,
    pairings: HashMap<String, [u8; 32]>,
    /// Sign pair-verify M2 with this key instead of the real identity
    pub impersonate_with: Option<Ed25519KeyPair>,
}

impl PairingServer {
    /// Create a responder for the given identity and setup code
    #[must_use]
    pub fn new(accessory_id: &str, identity: Ed25519KeyPair, setup_code: &str) -> Self {
        let mut salt = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut salt);
        Self {
            accessory_id: accessory_id.to_string(),
            identity,
            setup_code: setup_code.to_string(),
            salt,
            srp: None,
            srp_key: None,
            verify: None,
            pairings: HashMap::new(),
            impersonate_with: None,
        }
    }

    /// Accessory long-term public key
    #[must_use]
    pub fn public_key(&self) -> Ed25519PublicKey {
        self.identity.public_key()
    }

    /// Register a controller directly, skipping pair-setup
    pub fn add_pairing(&mut self, controller_id: &str, ltpk: &Ed25519PublicKey) {
        self.pairings
            .insert(controller_id.to_string(), *ltpk.as_bytes());
    }

    /// Forget a controller; returns whether it was paired
    pub fn remove_pairing(&mut self, controller_id: &str) -> bool {
        self.pairings.remove(controller_id).is_some()
    }

    /// Whether a controller is currently paired
    #[must_use]
    pub fn is_paired(&self, controller_id: &str) -> bool {
        self.pairings.contains_key(controller_id)
    }

    /// Handle a `/pair-setup` body. Failures become error TLVs.
    pub fn handle_pair_setup(&mut self, body: &[u8]) -> PairingReply {
        let result = TlvDecoder::decode(body)
            .map_err(PairingServerError::from)
            .and_then(|tlv| match tlv.get_state()? {
                1 => self.setup_m1(),
                3 => self.setup_m3(&tlv),
                5 => self.setup_m5(&tlv),
                other => Err(PairingServerError::UnexpectedState(other)),
            });
        reply_or_error(result, body)
    }

    /// Handle a `/pair-verify` body. Failures become error TLVs.
    pub fn handle_pair_verify(&mut self, body: &[u8]) -> PairingReply {
        let result = TlvDecoder::decode(body)
            .map_err(PairingServerError::from)
            .and_then(|tlv| match tlv.get_state()? {
                1 => self.verify_m1(&tlv).map(PairingReply::send),
                3 => self.verify_m3(&tlv),
                other => Err(PairingServerError::UnexpectedState(other)),
            });
        reply_or_error(result, body)
    }

    fn setup_m1(&mut self) -> Result<PairingReply, PairingServerError> {
        let params = SrpParams::RFC5054_3072;
        let verifier = SrpServer::compute_verifier(
            b"Pair-Setup",
            self.setup_code.as_bytes(),
            &self.salt,
            &params,
        )?;
        let srp = SrpServer::new(&verifier, &params)?;

        let body = TlvEncoder::new()
            .add_state(2)
            .add(TlvType::Salt, &self.salt)
            .add(TlvType::PublicKey, srp.public_key())
            .build();
        self.srp = Some(srp);
        Ok(PairingReply::send(body))
    }

    fn setup_m3(&mut self, tlv: &TlvDecoder) -> Result<PairingReply, PairingServerError> {
        let srp = self.srp.take().ok_or(PairingServerError::UnexpectedState(3))?;
        let (key, m2) = srp
            .verify_client(
                b"Pair-Setup",
                &self.salt,
                tlv.get_required(TlvType::PublicKey)?,
                tlv.get_required(TlvType::Proof)?,
            )
            .map_err(|_| PairingServerError::Authentication)?;

        self.srp_key = Some(key);
        Ok(PairingReply::send(
            TlvEncoder::new()
                .add_state(4)
                .add(TlvType::Proof, &m2)
                .build(),
        ))
    }

    fn setup_m5(&mut self, tlv: &TlvDecoder) -> Result<PairingReply, PairingServerError> {
        let key = self.srp_key.take().ok_or(PairingServerError::UnexpectedState(5))?;
        let cipher = ChaCha20Poly1305Cipher::new(&derive_key(
            key.as_bytes(),
            "Pair-Setup-Encrypt-Salt",
            "Pair-Setup-Encrypt-Info",
        )?)?;

        let decrypted = cipher
            .decrypt(
                &Nonce::from_label(b"PS-Msg05"),
                tlv.get_required(TlvType::EncryptedData)?,
            )
            .map_err(|_| PairingServerError::Authentication)?;
        let inner = TlvDecoder::decode(&decrypted)?;
        let controller_id = inner.get_required(TlvType::Identifier)?;
        let controller_ltpk = inner.get_required(TlvType::PublicKey)?;
        let signature = Ed25519Signature::from_bytes(inner.get_required(TlvType::Signature)?)?;

        let controller_x = derive_key(
            key.as_bytes(),
            "Pair-Setup-Controller-Sign-Salt",
            "Pair-Setup-Controller-Sign-Info",
        )?;
        let ltpk = Ed25519PublicKey::from_bytes(controller_ltpk)?;
        ltpk.verify(
            &[controller_x.as_slice(), controller_id, controller_ltpk].concat(),
            &signature,
        )
        .map_err(|_| PairingServerError::Authentication)?;
        self.pairings.insert(
            String::from_utf8_lossy(controller_id).into_owned(),
            *ltpk.as_bytes(),
        );

        let accessory_x = derive_key(
            key.as_bytes(),
            "Pair-Setup-Accessory-Sign-Salt",
            "Pair-Setup-Accessory-Sign-Info",
        )?;
        let own_ltpk = self.identity.public_key();
        let accessory_info = [
            accessory_x.as_slice(),
            self.accessory_id.as_bytes(),
            own_ltpk.as_bytes(),
        ]
        .concat();
        let sub_tlv = TlvEncoder::new()
            .add(TlvType::Identifier, self.accessory_id.as_bytes())
            .add(TlvType::PublicKey, own_ltpk.as_bytes())
            .add(
                TlvType::Signature,
                &self.identity.sign(&accessory_info).to_bytes(),
            )
            .build();
        let encrypted = cipher.encrypt(&Nonce::from_label(b"PS-Msg06"), &sub_tlv)?;

        Ok(PairingReply::send(
            TlvEncoder::new()
                .add_state(6)
                .add(TlvType::EncryptedData, &encrypted)
                .build(),
        ))
    }

    fn verify_m1(&mut self, tlv: &TlvDecoder) -> Result<Vec<u8>, PairingServerError> {
        let controller_ephemeral: [u8; 32] = tlv
            .get_required(TlvType::PublicKey)?
            .try_into()
            .map_err(|_| TlvError::InvalidValue(TlvType::PublicKey))?;

        let ephemeral = X25519KeyPair::generate();
        let shared = *ephemeral
            .diffie_hellman(&X25519PublicKey::from_bytes(&controller_ephemeral)?)
            .as_bytes();

        let own_ephemeral = ephemeral.public_key();
        let accessory_info = [
            own_ephemeral.as_bytes().as_slice(),
            self.accessory_id.as_bytes(),
            controller_ephemeral.as_slice(),
        ]
        .concat();
        let signer = self.impersonate_with.as_ref().unwrap_or(&self.identity);
        let sub_tlv = TlvEncoder::new()
            .add(TlvType::Identifier, self.accessory_id.as_bytes())
            .add(TlvType::Signature, &signer.sign(&accessory_info).to_bytes())
            .build();

        let cipher = verify_cipher(&shared)?;
        let encrypted = cipher.encrypt(&Nonce::from_label(b"PV-Msg02"), &sub_tlv)?;

        let body = TlvEncoder::new()
            .add_state(2)
            .add(TlvType::PublicKey, own_ephemeral.as_bytes())
            .add(TlvType::EncryptedData, &encrypted)
            .build();
        self.verify = Some(VerifySession {
            ephemeral,
            controller_ephemeral,
            shared,
        });
        Ok(body)
    }

    fn verify_m3(&mut self, tlv: &TlvDecoder) -> Result<PairingReply, PairingServerError> {
        let session = self
            .verify
            .take()
            .ok_or(PairingServerError::UnexpectedState(3))?;
        let decrypted = verify_cipher(&session.shared)?
            .decrypt(
                &Nonce::from_label(b"PV-Msg03"),
                tlv.get_required(TlvType::EncryptedData)?,
            )
            .map_err(|_| PairingServerError::Authentication)?;

        let inner = TlvDecoder::decode(&decrypted)?;
        let controller_id = inner.get_required(TlvType::Identifier)?;
        let signature = Ed25519Signature::from_bytes(inner.get_required(TlvType::Signature)?)?;
        let ltpk = self
            .pairings
            .get(&*String::from_utf8_lossy(controller_id))
            .ok_or(PairingServerError::UnknownController)?;

        let controller_info = [
            session.controller_ephemeral.as_slice(),
            controller_id,
            session.ephemeral.public_key().as_bytes().as_slice(),
        ]
        .concat();
        Ed25519PublicKey::from_bytes(ltpk)?
            .verify(&controller_info, &signature)
            .map_err(|_| PairingServerError::Authentication)?;

        let keys = ControlKeys::derive(&session.shared)?;
        Ok(PairingReply {
            body: TlvEncoder::new().add_state(4).build(),
            session_keys: Some(AccessorySessionKeys {
                encrypt_key: keys.read_key,
                decrypt_key: keys.write_key,
            }),
        })
    }
}

fn verify_cipher(shared: &[u8; 32]) -> Result<ChaCha20Poly1305Cipher, CryptoError> {
    ChaCha20Poly1305Cipher::new(&derive_key(
        shared,
        "Pair-Verify-Encrypt-Salt",
        "Pair-Verify-Encrypt-Info",
    )?)
}

fn reply_or_error(result: Result<PairingReply, PairingServerError>, request: &[u8]) -> PairingReply {
    match result {
        Ok(reply) => reply,
        Err(e) => {
            tracing::debug!("Mock accessory rejecting pairing message: {e}");
            let state = TlvDecoder::decode(request)
                .ok()
                .and_then(|tlv| tlv.get_state().ok())
                .unwrap_or(1);
            PairingReply::send(
                TlvEncoder::new()
                    .add_state(state.saturating_add(1))
                    .add_byte(TlvType::Error, errors::AUTHENTICATION)
                    .build(),
            )
        }
    }
}
