//! Pair-Verify: per-connection handshake using the long-term keys from pair-setup
//!
//! Sans-IO state machine. The caller posts each returned TLV body to `/pair-verify`
//! and feeds the accessory's reply back in. One attempt per connection: once the
//! machine has failed it refuses further input.

use super::tlv::{TlvDecoder, TlvEncoder, TlvType};
use super::{PairingCredential, PairingError, PairingStepResult, SessionKeys, expect_state};
use crate::protocol::crypto::{
    ChaCha20Poly1305Cipher, ControlKeys, Ed25519KeyPair, Ed25519PublicKey, Ed25519Signature,
    Nonce, X25519KeyPair, X25519PublicKey, X25519SharedSecret, derive_key,
};

const ENCRYPT_SALT: &str = "Pair-Verify-Encrypt-Salt";
const ENCRYPT_INFO: &str = "Pair-Verify-Encrypt-Info";

/// Handshake progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyState {
    /// Nothing sent yet
    Start,
    /// M1 sent, waiting for the accessory's ephemeral key and proof
    AwaitServerProof,
    /// M3 sent, waiting for the accessory to accept our proof
    AwaitConfirmation,
    /// Session keys derived
    Established,
    /// Terminal failure
    Failed,
}

/// Pair-Verify session
pub struct PairVerify {
    state: VerifyState,
    controller_id: String,
    controller_keys: Ed25519KeyPair,
    accessory_id: String,
    accessory_ltpk: Ed25519PublicKey,
    ephemeral: X25519KeyPair,
    shared_secret: Option<X25519SharedSecret>,
}

impl PairVerify {
    /// Prepare a handshake for the accessory named in `credential`
    ///
    /// # Errors
    ///
    /// Returns an error if the stored keys are malformed.
    pub fn new(credential: &PairingCredential) -> Result<Self, PairingError> {
        Ok(Self {
            state: VerifyState::Start,
            controller_id: credential.controller_id.clone(),
            controller_keys: credential.controller_keypair()?,
            accessory_id: credential.accessory_id.clone(),
            accessory_ltpk: credential.accessory_public_key()?,
            ephemeral: X25519KeyPair::generate(),
            shared_secret: None,
        })
    }

    #[must_use]
    pub fn state(&self) -> VerifyState {
        self.state
    }

    /// Build M1: our ephemeral public key
    ///
    /// # Errors
    ///
    /// Returns `PairingError::InvalidState` unless called first.
    pub fn start(&mut self) -> Result<Vec<u8>, PairingError> {
        if self.state != VerifyState::Start {
            return Err(PairingError::invalid_state("Start", self.state));
        }

        let m1 = TlvEncoder::new()
            .add_state(1)
            .add(TlvType::PublicKey, self.ephemeral.public_key().as_bytes())
            .build();

        self.state = VerifyState::AwaitServerProof;
        Ok(m1)
    }

    /// Check the accessory's proof in M2 and build M3
    ///
    /// # Errors
    ///
    /// `AuthenticationFailed` when the encrypted payload does not authenticate,
    /// `UntrustedPeer` when the identifier or signature does not match the credential.
    pub fn process_m2(&mut self, data: &[u8]) -> Result<Vec<u8>, PairingError> {
        if self.state != VerifyState::AwaitServerProof {
            return Err(PairingError::invalid_state("AwaitServerProof", self.state));
        }
        let result = self.handle_m2(data);
        self.settle(result, VerifyState::AwaitConfirmation)
    }

    fn handle_m2(&mut self, data: &[u8]) -> Result<Vec<u8>, PairingError> {
        let tlv = TlvDecoder::decode(data)?;
        expect_state(&tlv, 2)?;

        let peer_ephemeral_bytes = tlv.get_required(TlvType::PublicKey)?;
        let encrypted = tlv.get_required(TlvType::EncryptedData)?;

        let peer_ephemeral = X25519PublicKey::from_bytes(peer_ephemeral_bytes)?;
        let shared = self.ephemeral.diffie_hellman(&peer_ephemeral);
        let cipher = ChaCha20Poly1305Cipher::new(&derive_key(
            shared.as_bytes(),
            ENCRYPT_SALT,
            ENCRYPT_INFO,
        )?)?;

        let decrypted = cipher
            .decrypt(&Nonce::from_label(b"PV-Msg02"), encrypted)
            .map_err(|e| PairingError::AuthenticationFailed(e.to_string()))?;

        let inner = TlvDecoder::decode(&decrypted)?;
        let peer_id = inner.get_required(TlvType::Identifier)?;
        let peer_signature = inner.get_required(TlvType::Signature)?;

        if peer_id != self.accessory_id.as_bytes() {
            return Err(PairingError::UntrustedPeer(format!(
                "accessory identified as {:?}, expected {}",
                String::from_utf8_lossy(peer_id),
                self.accessory_id
            )));
        }

        let own_ephemeral = self.ephemeral.public_key();
        let accessory_info = [
            peer_ephemeral_bytes,
            peer_id,
            own_ephemeral.as_bytes().as_slice(),
        ]
        .concat();
        let signature = Ed25519Signature::from_bytes(peer_signature)
            .map_err(|e| PairingError::UntrustedPeer(e.to_string()))?;
        self.accessory_ltpk
            .verify(&accessory_info, &signature)
            .map_err(|_| {
                PairingError::UntrustedPeer("accessory signature does not verify".to_string())
            })?;

        let controller_info = [
            own_ephemeral.as_bytes().as_slice(),
            self.controller_id.as_bytes(),
            peer_ephemeral_bytes,
        ]
        .concat();
        let own_signature = self.controller_keys.sign(&controller_info);

        let sub_tlv = TlvEncoder::new()
            .add(TlvType::Identifier, self.controller_id.as_bytes())
            .add(TlvType::Signature, &own_signature.to_bytes())
            .build();
        let encrypted = cipher.encrypt(&Nonce::from_label(b"PV-Msg03"), &sub_tlv)?;

        self.shared_secret = Some(shared);
        Ok(TlvEncoder::new()
            .add_state(3)
            .add(TlvType::EncryptedData, &encrypted)
            .build())
    }

    /// Accept M4 and derive the session keys
    ///
    /// # Errors
    ///
    /// `AuthenticationFailed` if the accessory rejected our proof.
    pub fn process_m4(&mut self, data: &[u8]) -> Result<SessionKeys, PairingError> {
        if self.state != VerifyState::AwaitConfirmation {
            return Err(PairingError::invalid_state("AwaitConfirmation", self.state));
        }
        let result = self.handle_m4(data);
        self.settle(result, VerifyState::Established)
    }

    fn handle_m4(&mut self, data: &[u8]) -> Result<SessionKeys, PairingError> {
        let tlv = TlvDecoder::decode(data)?;
        match expect_state(&tlv, 4) {
            Err(PairingError::DeviceError { code }) => {
                return Err(PairingError::AuthenticationFailed(format!(
                    "accessory rejected controller proof (error {code})"
                )));
            }
            other => other?,
        }

        let shared = self
            .shared_secret
            .take()
            .ok_or_else(|| PairingError::invalid_state("shared secret", "none"))?;
        let keys = ControlKeys::derive(shared.as_bytes())?;

        Ok(SessionKeys {
            write_key: keys.write_key,
            read_key: keys.read_key,
        })
    }

    fn settle<T>(
        &mut self,
        result: Result<T, PairingError>,
        next: VerifyState,
    ) -> Result<T, PairingError> {
        self.state = if result.is_ok() {
            next
        } else {
            VerifyState::Failed
        };
        result
    }

    /// Drive the handshake: `None` to start, then each accessory reply
    ///
    /// # Errors
    ///
    /// Propagates the error of the step that failed.
    pub fn step(
        &mut self,
        data: Option<&[u8]>,
    ) -> Result<PairingStepResult<SessionKeys>, PairingError> {
        match (self.state, data) {
            (VerifyState::Start, _) => self.start().map(PairingStepResult::SendData),
            (VerifyState::AwaitServerProof, Some(data)) => {
                self.process_m2(data).map(PairingStepResult::SendData)
            }
            (VerifyState::AwaitConfirmation, Some(data)) => {
                self.process_m4(data).map(PairingStepResult::Complete)
            }
            (state, _) => Err(PairingError::invalid_state("accessory reply", state)),
        }
    }
}
