use std::io;

use thiserror::Error;

use crate::net::secure::EncryptionError;
use crate::protocol::crypto::CryptoError;
use crate::protocol::http::HttpCodecError;
use crate::protocol::pairing::{PairingError, StorageError};

/// Errors that can occur while talking to a `HomeKit` accessory
#[derive(Debug, Error)]
pub enum HomeKitError {
    // ===== Connection Errors =====
    /// Could not reach the accessory
    #[error("connection failed to {address}: {message}")]
    ConnectionFailed {
        /// Address that was tried last
        address: String,
        /// Description of the failure
        message: String,
        /// The underlying source of the error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The session ended while the operation was in flight or before it started
    #[error("connection lost: {message}")]
    ConnectionLost {
        /// Why the session is gone
        message: String,
    },

    /// Caller cancelled the operation
    #[error("operation cancelled")]
    Cancelled,

    /// Operation timed out
    #[error("{operation} timed out after {duration:?}")]
    Timeout {
        /// What was being waited for
        operation: &'static str,
        /// How long we waited
        duration: std::time::Duration,
    },

    // ===== Authentication Errors =====
    /// Wrong setup code, rejected proof or AEAD tag mismatch during pairing
    #[error("authentication failed: {message}")]
    AuthenticationFailed {
        /// Description of the failure
        message: String,
    },

    /// The accessory could not prove its identity
    #[error("untrusted peer: {message}")]
    UntrustedPeer {
        /// Description of the mismatch
        message: String,
    },

    /// Accessory reported a pairing error code
    #[error("accessory returned pairing error {code}")]
    PairingRejected {
        /// TLV error code
        code: u8,
    },

    // ===== Protocol Errors =====
    /// Peer violated the protocol
    #[error("protocol error: {message}")]
    Protocol {
        /// Description of the violation
        message: String,
    },

    /// Encrypted frame failed authentication; the session is unusable
    #[error("decryption failed: {message}")]
    Decryption {
        /// Description of the failure
        message: String,
    },

    /// Message encoding or decoding failed
    #[error("codec error: {0}")]
    Codec(#[from] HttpCodecError),

    /// Non-success HTTP status or HAP status
    #[error("request failed with status {status}{}", hap_suffix(.hap_status))]
    Status {
        /// HTTP status code
        status: u16,
        /// First failing per-characteristic HAP status, if reported
        hap_status: Option<i32>,
    },

    // ===== State Errors =====
    /// Operation not valid in the current state
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why it is invalid
        message: String,
    },

    // ===== I/O Errors =====
    /// Network I/O error
    #[error("network error: {0}")]
    NetworkError(#[from] io::Error),

    /// Credential storage failed
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl HomeKitError {
    /// Check if this error is recoverable by retrying
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. }
                | Self::NetworkError(_)
                | Self::ConnectionFailed { .. }
                | Self::PairingRejected { code: 0x03 | 0x07 }
        )
    }

    /// Check if this error indicates connection loss
    #[must_use]
    pub fn is_connection_lost(&self) -> bool {
        matches!(
            self,
            Self::ConnectionLost { .. }
                | Self::ConnectionFailed { .. }
                | Self::Decryption { .. }
                | Self::NetworkError(_)
        )
    }

    pub(crate) fn connection_lost(message: impl Into<String>) -> Self {
        Self::ConnectionLost {
            message: message.into(),
        }
    }

    pub(crate) fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    pub(crate) fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }
}

impl From<PairingError> for HomeKitError {
    fn from(err: PairingError) -> Self {
        match err {
            PairingError::AuthenticationFailed(message) => Self::AuthenticationFailed { message },
            PairingError::UntrustedPeer(message) => Self::UntrustedPeer { message },
            PairingError::DeviceError { code } => Self::PairingRejected { code },
            PairingError::InvalidSetupCode(_) => Self::invalid_operation(err.to_string()),
            PairingError::InvalidState { .. }
            | PairingError::UnexpectedState { .. }
            | PairingError::Crypto(_)
            | PairingError::Tlv(_) => Self::protocol(err.to_string()),
        }
    }
}

impl From<CryptoError> for HomeKitError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::DecryptionFailed(message) => Self::Decryption { message },
            other => Self::protocol(other.to_string()),
        }
    }
}

impl From<EncryptionError> for HomeKitError {
    fn from(err: EncryptionError) -> Self {
        match err {
            EncryptionError::Decryption { .. } => Self::Decryption {
                message: err.to_string(),
            },
            EncryptionError::NonceExhausted | EncryptionError::Encryption(_) => {
                Self::connection_lost(err.to_string())
            }
            EncryptionError::FrameTooShort(_) | EncryptionError::FrameTooLong(_) => {
                Self::protocol(err.to_string())
            }
        }
    }
}

impl From<serde_json::Error> for HomeKitError {
    fn from(err: serde_json::Error) -> Self {
        Self::protocol(format!("invalid JSON: {err}"))
    }
}

fn hap_suffix(hap_status: &Option<i32>) -> String {
    hap_status.map(|s| format!(" (HAP {s})")).unwrap_or_default()
}

/// Result type alias for `HomeKit` operations
pub type Result<T> = std::result::Result<T, HomeKitError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = HomeKitError::Status {
            status: 207,
            hap_status: Some(-70402),
        };
        assert_eq!(
            err.to_string(),
            "request failed with status 207 (HAP -70402)"
        );
        assert_eq!(
            HomeKitError::connection_lost("remote closed").to_string(),
            "connection lost: remote closed"
        );
    }

    #[test]
    fn test_error_is_recoverable() {
        assert!(
            HomeKitError::Timeout {
                operation: "request",
                duration: std::time::Duration::from_secs(1)
            }
            .is_recoverable()
        );
        assert!(HomeKitError::PairingRejected { code: 0x07 }.is_recoverable());
        assert!(!HomeKitError::PairingRejected { code: 0x02 }.is_recoverable());
        assert!(!HomeKitError::Cancelled.is_recoverable());
    }

    #[test]
    fn test_error_is_connection_lost() {
        assert!(HomeKitError::connection_lost("gone").is_connection_lost());
        assert!(
            HomeKitError::Decryption {
                message: "tag".into()
            }
            .is_connection_lost()
        );
        assert!(!HomeKitError::Cancelled.is_connection_lost());
    }

    #[test]
    fn test_error_from_io() {
        let io_err = io::Error::new(io::ErrorKind::ConnectionRefused, "refused");
        let err: HomeKitError = io_err.into();

        assert!(matches!(err, HomeKitError::NetworkError(_)));
    }

    #[test]
    fn test_pairing_errors_keep_their_class() {
        let err: HomeKitError = PairingError::UntrustedPeer("bad signature".into()).into();
        assert!(matches!(err, HomeKitError::UntrustedPeer { .. }));

        let err: HomeKitError = PairingError::AuthenticationFailed("tag".into()).into();
        assert!(matches!(err, HomeKitError::AuthenticationFailed { .. }));

        let err: HomeKitError = PairingError::DeviceError { code: 7 }.into();
        assert!(matches!(err, HomeKitError::PairingRejected { code: 7 }));
    }

    #[test]
    fn test_error_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<HomeKitError>();
    }
}
