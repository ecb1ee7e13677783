//! Connection management: pairing, the encrypted session and its events

mod pending;
mod plain;
mod reader;
mod session;
mod setup;
mod state;

pub use session::SecureConnection;
pub use setup::{pair_setup, pair_setup_with_keys};
pub use state::{AccessoryValueChangedEvent, ConnectionState, DisconnectReason, SessionEvent};

#[cfg(test)]
mod tests;
