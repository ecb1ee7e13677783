//! HAP pairing: first-time pair-setup, per-connection pair-verify and credential storage

pub mod setup;
pub mod storage;
pub mod tlv;
pub mod verify;

#[cfg(test)]
mod tests;

use std::fmt;
use std::net::SocketAddr;

use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

pub use setup::PairSetup;
pub use storage::{CredentialStore, FileStorage, MemoryStorage, StorageError};
pub use tlv::{TlvDecoder, TlvEncoder, TlvError, TlvType};
pub use verify::PairVerify;

use crate::protocol::crypto::{CryptoError, Ed25519KeyPair, Ed25519PublicKey};

/// Long-term trust between this controller and one accessory
///
/// Produced by pair-setup and consumed by every pair-verify. The session core never
/// persists it; see [`CredentialStore`].
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairingCredential {
    /// Controller pairing identifier sent to the accessory
    pub controller_id: String,
    /// Controller Ed25519 seed
    pub controller_ltsk: [u8; 32],
    /// Controller Ed25519 public key
    pub controller_ltpk: [u8; 32],
    /// Accessory pairing identifier, usually `XX:XX:XX:XX:XX:XX`
    pub accessory_id: String,
    /// Accessory Ed25519 public key, the trust anchor for pair-verify
    pub accessory_ltpk: [u8; 32],
    /// Address the accessory was last reached at
    pub address: SocketAddr,
}

impl PairingCredential {
    /// Build a credential from the controller identity and what the accessory proved
    #[must_use]
    pub fn new(
        controller_id: impl Into<String>,
        controller_keys: &Ed25519KeyPair,
        accessory_id: impl Into<String>,
        accessory_ltpk: &Ed25519PublicKey,
        address: SocketAddr,
    ) -> Self {
        Self {
            controller_id: controller_id.into(),
            controller_ltsk: controller_keys.secret_bytes(),
            controller_ltpk: *controller_keys.public_key().as_bytes(),
            accessory_id: accessory_id.into(),
            accessory_ltpk: *accessory_ltpk.as_bytes(),
            address,
        }
    }

    /// # Errors
    ///
    /// Returns an error if the stored seed is malformed.
    pub fn controller_keypair(&self) -> Result<Ed25519KeyPair, CryptoError> {
        Ed25519KeyPair::from_bytes(&self.controller_ltsk)
    }

    /// # Errors
    ///
    /// Returns an error if the stored key is not a valid curve point.
    pub fn accessory_public_key(&self) -> Result<Ed25519PublicKey, CryptoError> {
        Ed25519PublicKey::from_bytes(&self.accessory_ltpk)
    }
}

impl fmt::Debug for PairingCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PairingCredential")
            .field("controller_id", &self.controller_id)
            .field("accessory_id", &self.accessory_id)
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

impl Drop for PairingCredential {
    fn drop(&mut self) {
        self.controller_ltsk.zeroize();
    }
}

/// Result of one step of a pairing exchange
#[derive(Debug)]
pub enum PairingStepResult<T> {
    /// Send this TLV body to the accessory and feed back its reply
    SendData(Vec<u8>),
    /// The exchange finished
    Complete(T),
}

/// Directional keys of one encrypted connection
#[derive(Clone)]
pub struct SessionKeys {
    /// Controller to accessory
    pub write_key: [u8; 32],
    /// Accessory to controller
    pub read_key: [u8; 32],
}

impl fmt::Debug for SessionKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionKeys(..)")
    }
}

impl Drop for SessionKeys {
    fn drop(&mut self) {
        self.write_key.zeroize();
        self.read_key.zeroize();
    }
}

/// Pairing errors
#[derive(Debug, thiserror::Error)]
pub enum PairingError {
    #[error("invalid state: expected {expected}, got {actual}")]
    InvalidState { expected: String, actual: String },

    #[error("unexpected pairing message: expected state {expected}, got {actual}")]
    UnexpectedState { expected: u8, actual: u8 },

    /// AEAD tag mismatch or the accessory rejected our proof
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The accessory could not prove it holds the trusted long-term key
    #[error("untrusted peer: {0}")]
    UntrustedPeer(String),

    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("invalid setup code {0:?}: expected XXX-XX-XXX")]
    InvalidSetupCode(String),

    #[error("device returned error: {code}")]
    DeviceError { code: u8 },

    #[error("TLV error: {0}")]
    Tlv(#[from] TlvError),
}

impl PairingError {
    fn invalid_state(expected: &str, actual: impl fmt::Debug) -> Self {
        Self::InvalidState {
            expected: expected.to_string(),
            actual: format!("{actual:?}"),
        }
    }
}

/// Check the `State` item of a reply and surface any device error first
fn expect_state(tlv: &TlvDecoder, expected: u8) -> Result<(), PairingError> {
    if let Some(code) = tlv.get_error() {
        return Err(PairingError::DeviceError { code });
    }
    let actual = tlv.get_state()?;
    if actual != expected {
        return Err(PairingError::UnexpectedState { expected, actual });
    }
    Ok(())
}
