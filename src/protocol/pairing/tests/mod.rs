mod setup;
mod tlv;
mod verify;

use std::net::SocketAddr;

use crate::protocol::crypto::Ed25519KeyPair;
use crate::protocol::pairing::PairingCredential;
use crate::testing::pairing_server::PairingServer;

pub(super) const ACCESSORY_ID: &str = "AA:BB:CC:DD:EE:FF";
pub(super) const CONTROLLER_ID: &str = "3F6A1C2B-0D4E-4B8A-9E21-7C5D6E8F9A01";
pub(super) const SETUP_CODE: &str = "031-45-154";

/// Accessory responder plus a controller credential it already trusts
pub(super) fn paired_fixture() -> (PairingServer, PairingCredential) {
    let accessory_keys = Ed25519KeyPair::generate();
    let controller_keys = Ed25519KeyPair::generate();
    let mut server = PairingServer::new(ACCESSORY_ID, accessory_keys, SETUP_CODE);
    server.add_pairing(CONTROLLER_ID, &controller_keys.public_key());

    let address: SocketAddr = "127.0.0.1:51826".parse().unwrap();
    let credential = PairingCredential::new(
        CONTROLLER_ID,
        &controller_keys,
        ACCESSORY_ID,
        &server.public_key(),
        address,
    );
    (server, credential)
}
