//! Test harness: an in-process accessory that speaks HAP over TCP

pub mod mock_accessory;
pub mod pairing_server;

#[cfg(test)]
mod tests;

pub use mock_accessory::{
    LIGHTBULB_ACCESSORIES, MockAccessory, MockAccessoryConfig, TEMPERATURE_SENSOR_ACCESSORIES,
};
pub use pairing_server::{AccessorySessionKeys, PairingReply, PairingServer, PairingServerError};
