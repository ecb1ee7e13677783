use chacha20poly1305::{
    ChaCha20Poly1305 as ChaChaImpl, Nonce as ChaChaNonce,
    aead::{Aead, AeadInPlace, KeyInit, Payload},
};

use super::{CryptoError, lengths};

/// 96-bit ChaCha20-Poly1305 nonce: four zero bytes followed by eight payload bytes
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Nonce([u8; lengths::CHACHA_NONCE]);

impl Nonce {
    /// Create from exactly 12 bytes
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::InvalidKeyLength` for any other length.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let arr: [u8; lengths::CHACHA_NONCE] =
            bytes
                .try_into()
                .map_err(|_| CryptoError::InvalidKeyLength {
                    expected: lengths::CHACHA_NONCE,
                    actual: bytes.len(),
                })?;
        Ok(Self(arr))
    }

    /// Transport nonce: little-endian frame counter
    #[must_use]
    pub fn from_counter(counter: u64) -> Self {
        let mut arr = [0u8; lengths::CHACHA_NONCE];
        arr[4..].copy_from_slice(&counter.to_le_bytes());
        Self(arr)
    }

    /// Handshake nonce built from an eight byte message label such as `PV-Msg02`
    #[must_use]
    pub fn from_label(label: &[u8; 8]) -> Self {
        let mut arr = [0u8; lengths::CHACHA_NONCE];
        arr[4..].copy_from_slice(label);
        Self(arr)
    }

    /// Raw bytes
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; lengths::CHACHA_NONCE] {
        &self.0
    }
}

impl std::fmt::Debug for Nonce {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Nonce({:02x?})", &self.0[4..])
    }
}

/// ChaCha20-Poly1305 AEAD keyed for one direction
pub struct ChaCha20Poly1305Cipher {
    cipher: ChaChaImpl,
}

impl ChaCha20Poly1305Cipher {
    /// Create cipher with a 32-byte key
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::InvalidKeyLength` if the key is not 32 bytes.
    pub fn new(key: &[u8]) -> Result<Self, CryptoError> {
        let cipher =
            ChaChaImpl::new_from_slice(key).map_err(|_| CryptoError::InvalidKeyLength {
                expected: lengths::CHACHA_KEY,
                actual: key.len(),
            })?;
        Ok(Self { cipher })
    }

    /// Encrypt, returning ciphertext with the 16-byte tag appended
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::EncryptionFailed` if the AEAD rejects the input.
    pub fn encrypt(&self, nonce: &Nonce, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        self.encrypt_with_aad(nonce, &[], plaintext)
    }

    /// Encrypt with associated data
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::EncryptionFailed` if the AEAD rejects the input.
    pub fn encrypt_with_aad(
        &self,
        nonce: &Nonce,
        aad: &[u8],
        plaintext: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        self.cipher
            .encrypt(
                ChaChaNonce::from_slice(&nonce.0),
                Payload {
                    msg: plaintext,
                    aad,
                },
            )
            .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))
    }

    /// Encrypt a buffer in place and return the detached tag
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::EncryptionFailed` if the AEAD rejects the input.
    pub fn encrypt_in_place_detached(
        &self,
        nonce: &Nonce,
        aad: &[u8],
        buffer: &mut [u8],
    ) -> Result<[u8; lengths::CHACHA_TAG], CryptoError> {
        let tag = self
            .cipher
            .encrypt_in_place_detached(ChaChaNonce::from_slice(&nonce.0), aad, buffer)
            .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;
        let mut out = [0u8; lengths::CHACHA_TAG];
        out.copy_from_slice(&tag);
        Ok(out)
    }

    /// Decrypt and authenticate ciphertext with the tag appended
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::DecryptionFailed` on tag mismatch.
    pub fn decrypt(&self, nonce: &Nonce, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        self.decrypt_with_aad(nonce, &[], ciphertext)
    }

    /// Decrypt with associated data
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::DecryptionFailed` on tag mismatch.
    pub fn decrypt_with_aad(
        &self,
        nonce: &Nonce,
        aad: &[u8],
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        self.cipher
            .decrypt(
                ChaChaNonce::from_slice(&nonce.0),
                Payload {
                    msg: ciphertext,
                    aad,
                },
            )
            .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))
    }
}
