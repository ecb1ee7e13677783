//! Cryptographic primitives for pair-setup, pair-verify and the session transport

mod bigint;
mod chacha;
mod ed25519;
mod error;
mod hkdf;
mod srp;
#[cfg(test)]
mod tests;
mod x25519;

pub use self::bigint::SrpInteger;
pub use self::chacha::{ChaCha20Poly1305Cipher, Nonce};
pub use self::ed25519::{Ed25519KeyPair, Ed25519PublicKey, Ed25519Signature};
pub use self::error::CryptoError;
pub use self::hkdf::{ControlKeys, HkdfSha512, derive_key};
pub use self::srp::{
    SessionKey, SrpClient, SrpGroup, SrpParams, SrpServer, SrpVerifier, derive_private_key,
};
pub use self::x25519::{X25519KeyPair, X25519PublicKey, X25519SharedSecret};

/// Length of various cryptographic values
pub mod lengths {
    /// Ed25519 public key length
    pub const ED25519_PUBLIC_KEY: usize = 32;
    /// Ed25519 secret seed length
    pub const ED25519_SECRET_KEY: usize = 32;
    /// Ed25519 signature length
    pub const ED25519_SIGNATURE: usize = 64;
    /// X25519 public key length
    pub const X25519_PUBLIC_KEY: usize = 32;
    /// ChaCha20-Poly1305 key length
    pub const CHACHA_KEY: usize = 32;
    /// ChaCha20-Poly1305 nonce length
    pub const CHACHA_NONCE: usize = 12;
    /// ChaCha20-Poly1305 tag length
    pub const CHACHA_TAG: usize = 16;
    /// SRP public value length for the 3072-bit group
    pub const SRP_PUBLIC_KEY: usize = 384;
}
