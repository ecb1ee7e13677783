use super::{ACCESSORY_ID, CONTROLLER_ID, SETUP_CODE};
use crate::protocol::crypto::Ed25519KeyPair;
use crate::protocol::pairing::setup::{SetupState, normalize_setup_code};
use crate::protocol::pairing::tlv::{TlvDecoder, TlvEncoder, TlvType, errors};
use crate::protocol::pairing::{PairSetup, PairingError, PairingStepResult};
use crate::testing::pairing_server::PairingServer;

fn accessory() -> PairingServer {
    PairingServer::new(ACCESSORY_ID, Ed25519KeyPair::generate(), SETUP_CODE)
}

#[test]
fn test_pair_setup_full_exchange() {
    let mut server = accessory();
    let controller_keys = Ed25519KeyPair::generate();
    let controller_ltpk = controller_keys.public_key();
    let mut setup = PairSetup::new(SETUP_CODE, CONTROLLER_ID, controller_keys).unwrap();

    let mut reply: Option<Vec<u8>> = None;
    let identity = loop {
        match setup.step(reply.as_deref()).unwrap() {
            PairingStepResult::SendData(body) => {
                reply = Some(server.handle_pair_setup(&body).body);
            }
            PairingStepResult::Complete(identity) => break identity,
        }
    };

    assert_eq!(setup.state(), SetupState::Complete);
    assert_eq!(identity.id, ACCESSORY_ID);
    assert_eq!(identity.ltpk, server.public_key());
    assert!(server.is_paired(CONTROLLER_ID));
    assert_eq!(setup.controller_keys().public_key(), controller_ltpk);
}

#[test]
fn test_pair_setup_m1_layout() {
    let mut setup = PairSetup::new("03145154", CONTROLLER_ID, Ed25519KeyPair::generate()).unwrap();
    let m1 = TlvDecoder::decode(&setup.start().unwrap()).unwrap();
    assert_eq!(m1.get_state().unwrap(), 1);
    assert_eq!(m1.get(TlvType::Method), Some(&[0u8][..]));
}

#[test]
fn test_pair_setup_wrong_code() {
    let mut server = accessory();
    let mut setup = PairSetup::new("111-22-333", CONTROLLER_ID, Ed25519KeyPair::generate()).unwrap();

    let m2 = server.handle_pair_setup(&setup.start().unwrap());
    let m3 = setup.process_m2(&m2.body).unwrap();
    let m4 = server.handle_pair_setup(&m3);

    assert!(matches!(
        setup.process_m4(&m4.body),
        Err(PairingError::AuthenticationFailed(_))
    ));
    assert_eq!(setup.state(), SetupState::Failed);
    assert!(!server.is_paired(CONTROLLER_ID));
}

#[test]
fn test_pair_setup_device_busy() {
    let mut setup = PairSetup::new(SETUP_CODE, CONTROLLER_ID, Ed25519KeyPair::generate()).unwrap();
    let _ = setup.start().unwrap();

    let m2 = TlvEncoder::new()
        .add_state(2)
        .add_byte(TlvType::Error, errors::BUSY)
        .build();
    assert!(matches!(
        setup.process_m2(&m2),
        Err(PairingError::DeviceError { code: 7 })
    ));
}

#[test]
fn test_pair_setup_rejects_zero_srp_public_key() {
    let mut setup = PairSetup::new(SETUP_CODE, CONTROLLER_ID, Ed25519KeyPair::generate()).unwrap();
    let _ = setup.start().unwrap();

    let m2 = TlvEncoder::new()
        .add_state(2)
        .add(TlvType::Salt, &[1u8; 16])
        .add(TlvType::PublicKey, &[0u8; 384])
        .build();
    assert!(matches!(
        setup.process_m2(&m2),
        Err(PairingError::Crypto(
            crate::protocol::crypto::CryptoError::ZeroPublicValue
        ))
    ));
}

#[test]
fn test_pair_setup_out_of_order() {
    let mut setup = PairSetup::new(SETUP_CODE, CONTROLLER_ID, Ed25519KeyPair::generate()).unwrap();
    assert!(matches!(
        setup.process_m4(&[]),
        Err(PairingError::InvalidState { .. })
    ));
}

#[test]
fn test_setup_code_normalization() {
    assert_eq!(normalize_setup_code("03145154").unwrap(), "031-45-154");
    assert_eq!(normalize_setup_code("031-45-154").unwrap(), "031-45-154");
    assert!(normalize_setup_code("0314-5154").is_err());
    assert!(normalize_setup_code("1234").is_err());
    assert!(normalize_setup_code("abc-de-fgh").is_err());
}
