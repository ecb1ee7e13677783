//! # homekit-controller
//!
//! Controller side of the `HomeKit` Accessory Protocol over IP.
//!
//! ## Features
//!
//! - First-time pairing with an accessory's setup code (SRP-6a)
//! - Per-connection pair-verify and the encrypted session that follows
//! - Characteristic reads, writes and event subscriptions
//! - Pluggable credential storage
//!
//! ## Example
//!
//! ```rust,no_run
//! use homekit_controller::{SecureConnection, SessionEvent};
//! use homekit_controller::protocol::pairing::{CredentialStore, FileStorage};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), homekit_controller::HomeKitError> {
//! let store = FileStorage::new("pairings.json").await?;
//! let credential = store.load("AA:BB:CC:DD:EE:FF").await.expect("paired");
//!
//! let cancel = CancellationToken::new();
//! let session = SecureConnection::new();
//! let mut events = session.events();
//! session.connect_and_listen(&credential, None, &cancel).await?;
//! session.subscribe_all(&cancel).await?;
//!
//! while let Ok(SessionEvent::ValueChanged(event)) = events.recv().await {
//!     println!("{}.{} = {}", event.aid, event.iid, event.value);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! The library is organized into layers:
//!
//! - **Session**: [`SecureConnection`] and [`connection::pair_setup`]
//! - **Model**: the accessory database and characteristic payloads
//! - **Low-level**: crypto, pairing state machines, HTTP codec and frame encryption

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

/// Error types
pub mod error;
/// Core types
pub mod types;

/// Testing utilities
pub mod testing;

pub mod connection;
pub mod model;
pub mod net;
pub mod protocol;

pub use connection::{
    AccessoryValueChangedEvent, ConnectionState, DisconnectReason, SecureConnection,
    SessionEvent, pair_setup,
};
pub use error::{HomeKitError, Result};
pub use model::{CharacteristicId, CharacteristicValue, DeviceReportedInfo};
pub use protocol::pairing::{CredentialStore, PairingCredential};
pub use types::SessionConfig;
