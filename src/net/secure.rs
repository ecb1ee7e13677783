//! HAP (`HomeKit` Accessory Protocol) secure session implementation
//!
//! After pair-verify every byte on the connection travels in frames of
//! `u16 LE length ‖ ciphertext ‖ 16-byte tag`. The length prefix is the associated
//! data and each direction keeps its own 64-bit nonce counter.

use byteorder::{ByteOrder, LittleEndian};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::protocol::crypto::{ChaCha20Poly1305Cipher, Nonce, lengths};
use crate::protocol::pairing::SessionKeys;

/// Largest plaintext carried by one frame
pub const MAX_FRAME_PLAINTEXT: usize = 1024;

const LENGTH_PREFIX: usize = 2;
const FRAME_OVERHEAD: usize = LENGTH_PREFIX + lengths::CHACHA_TAG;

/// Transport errors; all of them end the session
#[derive(Debug, Error)]
pub enum EncryptionError {
    /// Tag mismatch, wrong key, replay or reordering
    #[error("frame {counter} failed authentication")]
    Decryption { counter: u64 },

    #[error("encryption failed: {0}")]
    Encryption(String),

    /// Every nonce of this direction has been used
    #[error("nonce counter exhausted")]
    NonceExhausted,

    #[error("frame of {0} bytes is shorter than its header")]
    FrameTooShort(usize),

    #[error("frame declares {0} plaintext bytes, limit is 1024")]
    FrameTooLong(usize),
}

fn next_nonce(counter: &mut u64) -> Result<(u64, Nonce), EncryptionError> {
    let current = *counter;
    *counter = current.checked_add(1).ok_or(EncryptionError::NonceExhausted)?;
    Ok((current, Nonce::from_counter(current)))
}

/// Outbound half: controller-to-accessory key and counter
pub struct FrameEncryptor {
    cipher: ChaCha20Poly1305Cipher,
    counter: u64,
}

impl FrameEncryptor {
    /// # Errors
    ///
    /// Returns an error if the key is rejected by the cipher.
    pub fn new(key: &[u8; 32]) -> Result<Self, EncryptionError> {
        Ok(Self {
            cipher: ChaCha20Poly1305Cipher::new(key)
                .map_err(|e| EncryptionError::Encryption(e.to_string()))?,
            counter: 0,
        })
    }

    /// Number of frames sealed so far
    #[must_use]
    pub fn counter(&self) -> u64 {
        self.counter
    }

    /// Encrypt data into HAP frames of at most 1024 plaintext bytes each
    ///
    /// Empty input produces no frames.
    ///
    /// # Errors
    ///
    /// Fails once the nonce counter is exhausted.
    pub fn encrypt(&mut self, data: &[u8]) -> Result<Vec<u8>, EncryptionError> {
        let frames = data.len().div_ceil(MAX_FRAME_PLAINTEXT);
        let mut output = Vec::with_capacity(data.len() + frames * FRAME_OVERHEAD);

        for chunk in data.chunks(MAX_FRAME_PLAINTEXT) {
            let len = u16::try_from(chunk.len())
                .map_err(|_| EncryptionError::FrameTooLong(chunk.len()))?;
            let mut len_bytes = [0u8; LENGTH_PREFIX];
            LittleEndian::write_u16(&mut len_bytes, len);

            let (_, nonce) = next_nonce(&mut self.counter)?;
            let mut buffer = chunk.to_vec();
            let tag = self
                .cipher
                .encrypt_in_place_detached(&nonce, &len_bytes, &mut buffer)
                .map_err(|e| EncryptionError::Encryption(e.to_string()))?;

            output.extend_from_slice(&len_bytes);
            output.extend_from_slice(&buffer);
            output.extend_from_slice(&tag);
        }

        Ok(output)
    }
}

/// Inbound half: accessory-to-controller key and counter
pub struct FrameDecryptor {
    cipher: ChaCha20Poly1305Cipher,
    counter: u64,
}

impl FrameDecryptor {
    /// # Errors
    ///
    /// Returns an error if the key is rejected by the cipher.
    pub fn new(key: &[u8; 32]) -> Result<Self, EncryptionError> {
        Ok(Self {
            cipher: ChaCha20Poly1305Cipher::new(key)
                .map_err(|e| EncryptionError::Encryption(e.to_string()))?,
            counter: 0,
        })
    }

    /// Number of frames opened so far
    #[must_use]
    pub fn counter(&self) -> u64 {
        self.counter
    }

    /// Decrypt the first complete frame in `data`
    ///
    /// Returns the plaintext and the bytes after the frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame is incomplete or fails authentication. A failed
    /// frame still consumes its nonce; the session must be torn down.
    pub fn decrypt_block<'a>(
        &mut self,
        data: &'a [u8],
    ) -> Result<(Vec<u8>, &'a [u8]), EncryptionError> {
        if data.len() < FRAME_OVERHEAD {
            return Err(EncryptionError::FrameTooShort(data.len()));
        }

        let len = usize::from(LittleEndian::read_u16(&data[..LENGTH_PREFIX]));
        if len > MAX_FRAME_PLAINTEXT {
            return Err(EncryptionError::FrameTooLong(len));
        }
        let frame_end = LENGTH_PREFIX + len + lengths::CHACHA_TAG;
        if data.len() < frame_end {
            return Err(EncryptionError::FrameTooShort(data.len()));
        }

        let (counter, nonce) = next_nonce(&mut self.counter)?;
        let plaintext = self
            .cipher
            .decrypt_with_aad(&nonce, &data[..LENGTH_PREFIX], &data[LENGTH_PREFIX..frame_end])
            .map_err(|_| EncryptionError::Decryption { counter })?;

        Ok((plaintext, &data[frame_end..]))
    }
}

/// Both directions of one encrypted connection
pub struct HapSecureSession {
    encryptor: FrameEncryptor,
    decryptor: FrameDecryptor,
}

impl HapSecureSession {
    /// Create a session from the local encrypt key and the local decrypt key
    ///
    /// # Errors
    ///
    /// Returns an error if a key is rejected by the cipher.
    pub fn new(encrypt_key: &[u8; 32], decrypt_key: &[u8; 32]) -> Result<Self, EncryptionError> {
        Ok(Self {
            encryptor: FrameEncryptor::new(encrypt_key)?,
            decryptor: FrameDecryptor::new(decrypt_key)?,
        })
    }

    /// Controller side of a pair-verify result
    ///
    /// # Errors
    ///
    /// Returns an error if a key is rejected by the cipher.
    pub fn for_controller(keys: &SessionKeys) -> Result<Self, EncryptionError> {
        Self::new(&keys.write_key, &keys.read_key)
    }

    /// # Errors
    ///
    /// See [`FrameEncryptor::encrypt`].
    pub fn encrypt(&mut self, data: &[u8]) -> Result<Vec<u8>, EncryptionError> {
        self.encryptor.encrypt(data)
    }

    /// # Errors
    ///
    /// See [`FrameDecryptor::decrypt_block`].
    pub fn decrypt_block<'a>(
        &mut self,
        data: &'a [u8],
    ) -> Result<(Vec<u8>, &'a [u8]), EncryptionError> {
        self.decryptor.decrypt_block(data)
    }

    /// Separate the halves so reader and writer can own them independently
    #[must_use]
    pub fn split(self) -> (FrameEncryptor, FrameDecryptor) {
        (self.encryptor, self.decryptor)
    }
}

/// Read one raw frame (prefix, ciphertext and tag)
///
/// Returns `Ok(None)` on a clean end of stream at a frame boundary.
///
/// # Errors
///
/// I/O errors, a stream that ends mid-frame (`UnexpectedEof`) and oversized frames
/// (`InvalidData`).
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> std::io::Result<Option<Vec<u8>>> {
    let mut prefix = [0u8; LENGTH_PREFIX];
    let first = reader.read(&mut prefix[..1]).await?;
    if first == 0 {
        return Ok(None);
    }
    reader.read_exact(&mut prefix[1..]).await?;

    let len = usize::from(LittleEndian::read_u16(&prefix));
    if len > MAX_FRAME_PLAINTEXT {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            EncryptionError::FrameTooLong(len),
        ));
    }

    let mut frame = vec![0u8; FRAME_OVERHEAD + len];
    frame[..LENGTH_PREFIX].copy_from_slice(&prefix);
    reader.read_exact(&mut frame[LENGTH_PREFIX..]).await?;
    Ok(Some(frame))
}

#[cfg(test)]
impl FrameEncryptor {
    pub(crate) fn set_counter(&mut self, counter: u64) {
        self.counter = counter;
    }
}
