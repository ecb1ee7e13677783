//! TLV8 encoding used by the HAP pairing endpoints
//!
//! Items longer than 255 bytes are split into consecutive fragments of the same type and
//! joined again on decode.

use std::collections::HashMap;

use thiserror::Error;

/// Maximum payload of one TLV8 item
const MAX_FRAGMENT: usize = 255;

/// TLV type codes used by pair-setup, pair-verify and pairing management
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TlvType {
    /// Pairing method
    Method = 0x00,
    /// Pairing identifier
    Identifier = 0x01,
    /// SRP salt
    Salt = 0x02,
    /// SRP or Curve25519 public key
    PublicKey = 0x03,
    /// SRP proof
    Proof = 0x04,
    /// Encrypted sub-TLV with appended tag
    EncryptedData = 0x05,
    /// Message number in the exchange
    State = 0x06,
    /// Error code
    Error = 0x07,
    /// Seconds to wait before retrying
    RetryDelay = 0x08,
    /// MFi certificate
    Certificate = 0x09,
    /// Ed25519 signature
    Signature = 0x0A,
    /// Controller permissions
    Permissions = 0x0B,
    FragmentData = 0x0C,
    FragmentLast = 0x0D,
    /// Pairing type flags
    Flags = 0x13,
    /// Zero-length item separating list entries
    Separator = 0xFF,
}

impl TlvType {
    /// Map a wire byte to a known type
    #[must_use]
    pub fn from_byte(b: u8) -> Option<Self> {
        Some(match b {
            0x00 => Self::Method,
            0x01 => Self::Identifier,
            0x02 => Self::Salt,
            0x03 => Self::PublicKey,
            0x04 => Self::Proof,
            0x05 => Self::EncryptedData,
            0x06 => Self::State,
            0x07 => Self::Error,
            0x08 => Self::RetryDelay,
            0x09 => Self::Certificate,
            0x0A => Self::Signature,
            0x0B => Self::Permissions,
            0x0C => Self::FragmentData,
            0x0D => Self::FragmentLast,
            0x13 => Self::Flags,
            0xFF => Self::Separator,
            _ => return None,
        })
    }
}

/// TLV encoding errors
#[derive(Debug, Error)]
pub enum TlvError {
    #[error("truncated TLV item at offset {0}")]
    Truncated(usize),

    #[error("missing required field: {0:?}")]
    MissingField(TlvType),

    #[error("invalid value for {0:?}")]
    InvalidValue(TlvType),
}

/// Builder for a TLV8 message
#[derive(Debug, Default)]
pub struct TlvEncoder {
    buffer: Vec<u8>,
}

impl TlvEncoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an item, fragmenting values over 255 bytes
    #[must_use]
    pub fn add(mut self, tlv_type: TlvType, value: &[u8]) -> Self {
        if value.is_empty() {
            self.buffer.extend_from_slice(&[tlv_type as u8, 0]);
            return self;
        }

        for chunk in value.chunks(MAX_FRAGMENT) {
            self.buffer.push(tlv_type as u8);
            #[allow(clippy::cast_possible_truncation)]
            self.buffer.push(chunk.len() as u8);
            self.buffer.extend_from_slice(chunk);
        }
        self
    }

    /// Append a one-byte item
    #[must_use]
    pub fn add_byte(self, tlv_type: TlvType, value: u8) -> Self {
        self.add(tlv_type, &[value])
    }

    #[must_use]
    pub fn add_state(self, state: u8) -> Self {
        self.add_byte(TlvType::State, state)
    }

    #[must_use]
    pub fn add_method(self, method: u8) -> Self {
        self.add_byte(TlvType::Method, method)
    }

    #[must_use]
    pub fn build(self) -> Vec<u8> {
        self.buffer
    }
}

/// Decoded TLV8 message, fragments already joined
#[derive(Debug)]
pub struct TlvDecoder {
    items: HashMap<u8, Vec<u8>>,
}

impl TlvDecoder {
    /// Decode a complete message
    ///
    /// Adjacent items of the same type are concatenated.
    ///
    /// # Errors
    ///
    /// Returns `TlvError::Truncated` if an item runs past the end of the buffer.
    pub fn decode(data: &[u8]) -> Result<Self, TlvError> {
        let mut items: HashMap<u8, Vec<u8>> = HashMap::new();
        let mut pos = 0;

        while pos < data.len() {
            let header = data.get(pos..pos + 2).ok_or(TlvError::Truncated(pos))?;
            let (tlv_type, length) = (header[0], usize::from(header[1]));
            let start = pos + 2;
            let end = start + length;
            let value = data.get(start..end).ok_or(TlvError::Truncated(pos))?;

            items.entry(tlv_type).or_default().extend_from_slice(value);
            pos = end;
        }

        Ok(Self { items })
    }

    #[must_use]
    pub fn get(&self, tlv_type: TlvType) -> Option<&[u8]> {
        self.items.get(&(tlv_type as u8)).map(Vec::as_slice)
    }

    /// # Errors
    ///
    /// Returns `TlvError::MissingField` if the item is absent.
    pub fn get_required(&self, tlv_type: TlvType) -> Result<&[u8], TlvError> {
        self.get(tlv_type).ok_or(TlvError::MissingField(tlv_type))
    }

    /// The `State` item, which must be exactly one byte
    ///
    /// # Errors
    ///
    /// Returns an error if the state is missing or not one byte long.
    pub fn get_state(&self) -> Result<u8, TlvError> {
        match self.get_required(TlvType::State)? {
            [state] => Ok(*state),
            _ => Err(TlvError::InvalidValue(TlvType::State)),
        }
    }

    /// Device error code, if the message carries one
    #[must_use]
    pub fn get_error(&self) -> Option<u8> {
        self.get(TlvType::Error).and_then(|v| v.first().copied())
    }
}

/// Pairing method codes
pub mod methods {
    pub const PAIR_SETUP: u8 = 0;
    pub const PAIR_SETUP_AUTH: u8 = 1;
    pub const PAIR_VERIFY: u8 = 2;
    pub const ADD_PAIRING: u8 = 3;
    pub const REMOVE_PAIRING: u8 = 4;
    pub const LIST_PAIRINGS: u8 = 5;
}

/// Error codes reported by accessories
pub mod errors {
    pub const UNKNOWN: u8 = 0x01;
    /// Wrong setup code or failed signature check
    pub const AUTHENTICATION: u8 = 0x02;
    pub const BACKOFF: u8 = 0x03;
    pub const MAX_PEERS: u8 = 0x04;
    pub const MAX_TRIES: u8 = 0x05;
    pub const UNAVAILABLE: u8 = 0x06;
    pub const BUSY: u8 = 0x07;
}
