use thiserror::Error;

/// Cryptographic operation errors
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("invalid signature")]
    InvalidSignature,

    #[error("decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("key derivation failed: {0}")]
    KeyDerivationFailed(String),

    #[error("SRP error: {0}")]
    SrpError(String),

    /// A peer's SRP public value is congruent to zero modulo N
    #[error("SRP public value is zero modulo N")]
    ZeroPublicValue,

    #[error("invalid public key")]
    InvalidPublicKey,

    #[error("invalid hex string: {0}")]
    InvalidHex(String),

    /// The integer has no canonical hex width and cannot be rendered
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error("division by zero")]
    DivisionByZero,
}
