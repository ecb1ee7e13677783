//! Pair-Setup: first-time pairing authenticated by the accessory's setup code
//!
//! Runs SRP-6a (M1-M4) to agree on a key proving both sides know the setup code,
//! then exchanges long-term Ed25519 public keys under that key (M5-M6).

use super::tlv::{TlvDecoder, TlvEncoder, TlvType, errors, methods};
use super::{PairingError, PairingStepResult, expect_state};
use crate::protocol::crypto::{
    ChaCha20Poly1305Cipher, Ed25519KeyPair, Ed25519PublicKey, Ed25519Signature, Nonce,
    SessionKey, SrpClient, SrpParams, SrpVerifier, derive_key,
};

const SRP_IDENTITY: &[u8] = b"Pair-Setup";
const ENCRYPT_SALT: &str = "Pair-Setup-Encrypt-Salt";
const ENCRYPT_INFO: &str = "Pair-Setup-Encrypt-Info";
const CONTROLLER_SIGN_SALT: &str = "Pair-Setup-Controller-Sign-Salt";
const CONTROLLER_SIGN_INFO: &str = "Pair-Setup-Controller-Sign-Info";
const ACCESSORY_SIGN_SALT: &str = "Pair-Setup-Accessory-Sign-Salt";
const ACCESSORY_SIGN_INFO: &str = "Pair-Setup-Accessory-Sign-Info";

/// Pair-setup progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupState {
    Start,
    /// M1 sent, waiting for salt and B
    AwaitChallenge,
    /// M3 sent, waiting for the accessory's SRP proof
    AwaitProof,
    /// M5 sent, waiting for the accessory's long-term key
    AwaitExchange,
    Complete,
    Failed,
}

/// What pair-setup learned about the accessory
#[derive(Debug, Clone)]
pub struct AccessoryIdentity {
    /// Accessory pairing identifier
    pub id: String,
    /// Accessory long-term public key
    pub ltpk: Ed25519PublicKey,
}

/// Pair-Setup session
pub struct PairSetup {
    state: SetupState,
    setup_code: String,
    controller_id: String,
    controller_keys: Ed25519KeyPair,
    srp_verifier: Option<SrpVerifier>,
    session_key: Option<SessionKey>,
}

impl PairSetup {
    /// Prepare pairing with the code printed on the accessory
    ///
    /// Accepts `XXX-XX-XXX` or eight bare digits.
    ///
    /// # Errors
    ///
    /// Returns `PairingError::InvalidSetupCode` for any other shape.
    pub fn new(
        setup_code: &str,
        controller_id: impl Into<String>,
        controller_keys: Ed25519KeyPair,
    ) -> Result<Self, PairingError> {
        Ok(Self {
            state: SetupState::Start,
            setup_code: normalize_setup_code(setup_code)?,
            controller_id: controller_id.into(),
            controller_keys,
            srp_verifier: None,
            session_key: None,
        })
    }

    #[must_use]
    pub fn state(&self) -> SetupState {
        self.state
    }

    /// The controller identity that will be registered with the accessory
    #[must_use]
    pub fn controller_keys(&self) -> &Ed25519KeyPair {
        &self.controller_keys
    }

    /// Build M1
    ///
    /// # Errors
    ///
    /// Returns `PairingError::InvalidState` unless called first.
    pub fn start(&mut self) -> Result<Vec<u8>, PairingError> {
        if self.state != SetupState::Start {
            return Err(PairingError::invalid_state("Start", self.state));
        }
        self.state = SetupState::AwaitChallenge;
        Ok(TlvEncoder::new()
            .add_state(1)
            .add_method(methods::PAIR_SETUP)
            .build())
    }

    /// Consume salt and B from M2, build M3 with A and the SRP proof
    ///
    /// # Errors
    ///
    /// Returns an error for device errors, malformed replies or a zero B.
    pub fn process_m2(&mut self, data: &[u8]) -> Result<Vec<u8>, PairingError> {
        self.require(SetupState::AwaitChallenge)?;
        let result = self.handle_m2(data);
        self.settle(result, SetupState::AwaitProof)
    }

    fn handle_m2(&mut self, data: &[u8]) -> Result<Vec<u8>, PairingError> {
        let tlv = TlvDecoder::decode(data)?;
        expect_state(&tlv, 2)?;

        let salt = tlv.get_required(TlvType::Salt)?;
        let server_public = tlv.get_required(TlvType::PublicKey)?;

        let client = SrpClient::new(&SrpParams::RFC5054_3072)?;
        let verifier = client.process_challenge(
            SRP_IDENTITY,
            self.setup_code.as_bytes(),
            salt,
            server_public,
        )?;

        let m3 = TlvEncoder::new()
            .add_state(3)
            .add(TlvType::PublicKey, client.public_key())
            .add(TlvType::Proof, verifier.client_proof())
            .build();
        self.srp_verifier = Some(verifier);
        Ok(m3)
    }

    /// Check the accessory's SRP proof in M4, build M5 with our long-term key
    ///
    /// # Errors
    ///
    /// `AuthenticationFailed` if the accessory rejected the setup code or its proof
    /// does not match.
    pub fn process_m4(&mut self, data: &[u8]) -> Result<Vec<u8>, PairingError> {
        self.require(SetupState::AwaitProof)?;
        let result = self.handle_m4(data);
        self.settle(result, SetupState::AwaitExchange)
    }

    fn handle_m4(&mut self, data: &[u8]) -> Result<Vec<u8>, PairingError> {
        let tlv = TlvDecoder::decode(data)?;
        match expect_state(&tlv, 4) {
            Err(PairingError::DeviceError {
                code: errors::AUTHENTICATION,
            }) => {
                return Err(PairingError::AuthenticationFailed(
                    "accessory rejected the setup code".to_string(),
                ));
            }
            other => other?,
        }

        let verifier = self
            .srp_verifier
            .take()
            .ok_or_else(|| PairingError::invalid_state("SRP verifier", "none"))?;
        let session_key = verifier
            .verify_server(tlv.get_required(TlvType::Proof)?)
            .map_err(|e| PairingError::AuthenticationFailed(e.to_string()))?;

        let controller_x = derive_key(
            session_key.as_bytes(),
            CONTROLLER_SIGN_SALT,
            CONTROLLER_SIGN_INFO,
        )?;
        let ltpk = self.controller_keys.public_key();
        let controller_info = [
            controller_x.as_slice(),
            self.controller_id.as_bytes(),
            ltpk.as_bytes(),
        ]
        .concat();
        let signature = self.controller_keys.sign(&controller_info);

        let sub_tlv = TlvEncoder::new()
            .add(TlvType::Identifier, self.controller_id.as_bytes())
            .add(TlvType::PublicKey, ltpk.as_bytes())
            .add(TlvType::Signature, &signature.to_bytes())
            .build();
        let encrypted = setup_cipher(&session_key)?.encrypt(&Nonce::from_label(b"PS-Msg05"), &sub_tlv)?;

        self.session_key = Some(session_key);
        Ok(TlvEncoder::new()
            .add_state(5)
            .add(TlvType::EncryptedData, &encrypted)
            .build())
    }

    /// Decrypt M6 and verify the accessory's long-term key
    ///
    /// # Errors
    ///
    /// `AuthenticationFailed` if the payload does not decrypt, `UntrustedPeer` if the
    /// accessory's signature does not verify.
    pub fn process_m6(&mut self, data: &[u8]) -> Result<AccessoryIdentity, PairingError> {
        self.require(SetupState::AwaitExchange)?;
        let result = self.handle_m6(data);
        self.settle(result, SetupState::Complete)
    }

    fn handle_m6(&mut self, data: &[u8]) -> Result<AccessoryIdentity, PairingError> {
        let tlv = TlvDecoder::decode(data)?;
        expect_state(&tlv, 6)?;

        let session_key = self
            .session_key
            .take()
            .ok_or_else(|| PairingError::invalid_state("session key", "none"))?;
        let decrypted = setup_cipher(&session_key)?
            .decrypt(
                &Nonce::from_label(b"PS-Msg06"),
                tlv.get_required(TlvType::EncryptedData)?,
            )
            .map_err(|e| PairingError::AuthenticationFailed(e.to_string()))?;

        let inner = TlvDecoder::decode(&decrypted)?;
        let accessory_id = inner.get_required(TlvType::Identifier)?;
        let accessory_ltpk = inner.get_required(TlvType::PublicKey)?;
        let signature = Ed25519Signature::from_bytes(inner.get_required(TlvType::Signature)?)
            .map_err(|e| PairingError::UntrustedPeer(e.to_string()))?;

        let accessory_x = derive_key(
            session_key.as_bytes(),
            ACCESSORY_SIGN_SALT,
            ACCESSORY_SIGN_INFO,
        )?;
        let accessory_info = [accessory_x.as_slice(), accessory_id, accessory_ltpk].concat();

        let ltpk = Ed25519PublicKey::from_bytes(accessory_ltpk)
            .map_err(|e| PairingError::UntrustedPeer(e.to_string()))?;
        ltpk.verify(&accessory_info, &signature).map_err(|_| {
            PairingError::UntrustedPeer("accessory signature does not verify".to_string())
        })?;

        let id = String::from_utf8(accessory_id.to_vec())
            .map_err(|_| PairingError::Tlv(super::TlvError::InvalidValue(TlvType::Identifier)))?;
        Ok(AccessoryIdentity { id, ltpk })
    }

    fn require(&self, expected: SetupState) -> Result<(), PairingError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(PairingError::invalid_state(&format!("{expected:?}"), self.state))
        }
    }

    fn settle<T>(
        &mut self,
        result: Result<T, PairingError>,
        next: SetupState,
    ) -> Result<T, PairingError> {
        self.state = if result.is_ok() {
            next
        } else {
            SetupState::Failed
        };
        result
    }

    /// Drive the exchange: `None` to start, then each accessory reply
    ///
    /// # Errors
    ///
    /// Propagates the error of the step that failed.
    pub fn step(
        &mut self,
        data: Option<&[u8]>,
    ) -> Result<PairingStepResult<AccessoryIdentity>, PairingError> {
        match (self.state, data) {
            (SetupState::Start, _) => self.start().map(PairingStepResult::SendData),
            (SetupState::AwaitChallenge, Some(data)) => {
                self.process_m2(data).map(PairingStepResult::SendData)
            }
            (SetupState::AwaitProof, Some(data)) => {
                self.process_m4(data).map(PairingStepResult::SendData)
            }
            (SetupState::AwaitExchange, Some(data)) => {
                self.process_m6(data).map(PairingStepResult::Complete)
            }
            (state, _) => Err(PairingError::invalid_state("accessory reply", state)),
        }
    }
}

fn setup_cipher(session_key: &SessionKey) -> Result<ChaCha20Poly1305Cipher, PairingError> {
    let key = derive_key(session_key.as_bytes(), ENCRYPT_SALT, ENCRYPT_INFO)?;
    Ok(ChaCha20Poly1305Cipher::new(&key)?)
}

/// Canonical `XXX-XX-XXX` form of a setup code
///
/// # Errors
///
/// Returns `PairingError::InvalidSetupCode` unless the input holds exactly eight digits,
/// either bare or already dashed.
pub fn normalize_setup_code(code: &str) -> Result<String, PairingError> {
    let digits: String = code.chars().filter(char::is_ascii_digit).collect();
    let well_formed = digits.len() == 8
        && (code.len() == 8 || (code.len() == 10 && code.as_bytes()[3] == b'-' && code.as_bytes()[6] == b'-'));
    if !well_formed {
        return Err(PairingError::InvalidSetupCode(code.to_string()));
    }
    Ok(format!("{}-{}-{}", &digits[..3], &digits[3..5], &digits[5..]))
}
