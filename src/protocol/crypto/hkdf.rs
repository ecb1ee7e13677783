use hkdf::Hkdf;
use sha2::Sha512;

use super::CryptoError;

/// HKDF-SHA512 extract step, ready to expand labelled sub-keys
pub struct HkdfSha512 {
    hkdf: Hkdf<Sha512>,
}

impl HkdfSha512 {
    /// Extract from input key material with an optional salt
    #[must_use]
    pub fn new(salt: Option<&[u8]>, ikm: &[u8]) -> Self {
        Self {
            hkdf: Hkdf::<Sha512>::new(salt, ikm),
        }
    }

    /// Expand to `length` bytes of output key material
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::KeyDerivationFailed` if `length` exceeds the HKDF limit.
    pub fn expand(&self, info: &[u8], length: usize) -> Result<Vec<u8>, CryptoError> {
        let mut okm = vec![0u8; length];
        self.hkdf
            .expand(info, &mut okm)
            .map_err(|_| CryptoError::KeyDerivationFailed(format!("cannot expand {length} bytes")))?;
        Ok(okm)
    }

    /// Expand into a fixed-size array
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::KeyDerivationFailed` if `N` exceeds the HKDF limit.
    pub fn expand_fixed<const N: usize>(&self, info: &[u8]) -> Result<[u8; N], CryptoError> {
        let mut okm = [0u8; N];
        self.hkdf
            .expand(info, &mut okm)
            .map_err(|_| CryptoError::KeyDerivationFailed(format!("cannot expand {N} bytes")))?;
        Ok(okm)
    }
}

/// One-shot 32-byte key derivation with HAP's string salt/info pairs
///
/// # Errors
///
/// Never fails for a 32-byte output, but keeps the HKDF error surface.
pub fn derive_key(ikm: &[u8], salt: &str, info: &str) -> Result<[u8; 32], CryptoError> {
    HkdfSha512::new(Some(salt.as_bytes()), ikm).expand_fixed::<32>(info.as_bytes())
}

/// Directional keys of an established HAP session
pub struct ControlKeys {
    /// Controller to accessory
    pub write_key: [u8; 32],
    /// Accessory to controller
    pub read_key: [u8; 32],
}

impl ControlKeys {
    /// Derive both keys from the pair-verify shared secret
    ///
    /// # Errors
    ///
    /// Propagates HKDF failures.
    pub fn derive(shared_secret: &[u8]) -> Result<Self, CryptoError> {
        let hkdf = HkdfSha512::new(Some(b"Control-Salt"), shared_secret);
        Ok(Self {
            write_key: hkdf.expand_fixed::<32>(b"Control-Write-Encryption-Key")?,
            read_key: hkdf.expand_fixed::<32>(b"Control-Read-Encryption-Key")?,
        })
    }
}

impl Drop for ControlKeys {
    fn drop(&mut self) {
        use zeroize::Zeroize;
        self.write_key.zeroize();
        self.read_key.zeroize();
    }
}
