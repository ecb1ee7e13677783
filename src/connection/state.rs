//! Connection state and session events

use serde_json::Value;

use crate::model::CharacteristicId;

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Never connected
    Disconnected,
    /// TCP connection in progress
    Connecting,
    /// Pair-verify in progress
    Verifying,
    /// Encrypted session running
    Connected,
    /// Session ended; a new `SecureConnection` is needed
    Closed,
}

impl ConnectionState {
    /// Check if currently connected or connecting
    #[must_use]
    pub fn is_active(self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting | ConnectionState::Verifying | ConnectionState::Connected
        )
    }

    /// Check if fully connected
    #[must_use]
    pub fn is_connected(self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

/// A characteristic changed on the accessory
#[derive(Debug, Clone, PartialEq)]
pub struct AccessoryValueChangedEvent {
    pub aid: u64,
    pub iid: u64,
    pub value: Value,
}

impl AccessoryValueChangedEvent {
    #[must_use]
    pub fn id(&self) -> CharacteristicId {
        CharacteristicId::new(self.aid, self.iid)
    }
}

/// Reason for disconnection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Accessory closed the connection
    RemoteClosed,
    /// Socket read failed
    ReadError,
    /// Socket write failed or the send nonces ran out
    WriteError,
    /// An inbound frame failed authentication
    DecryptionFailed,
    /// The connect cancellation token fired
    Cancelled,
    /// This controller's pairing was removed
    Unpaired,
    /// `disconnect()` was called
    UserRequested,
}

/// Events broadcast by a session
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// A characteristic value arrived from an event push or a refresh
    ValueChanged(AccessoryValueChangedEvent),
    /// The session came up or went down
    ConnectionChanged {
        connected: bool,
        /// Set when `connected` is false
        reason: Option<DisconnectReason>,
    },
}
