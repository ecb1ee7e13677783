use super::paired_fixture;
use crate::protocol::crypto::{ChaCha20Poly1305Cipher, Ed25519KeyPair, Nonce};
use crate::protocol::pairing::tlv::{TlvDecoder, TlvEncoder, TlvType};
use crate::protocol::pairing::verify::VerifyState;
use crate::protocol::pairing::{PairVerify, PairingError, PairingStepResult};

#[test]
fn test_pair_verify_derives_matching_keys() {
    let (mut server, credential) = paired_fixture();
    let mut client = PairVerify::new(&credential).unwrap();

    let m1 = client.start().unwrap();
    assert_eq!(client.state(), VerifyState::AwaitServerProof);

    let m2 = server.handle_pair_verify(&m1);
    let m3 = client.process_m2(&m2.body).unwrap();
    assert_eq!(client.state(), VerifyState::AwaitConfirmation);

    let m4 = server.handle_pair_verify(&m3);
    let accessory_keys = m4.session_keys.expect("accessory should finish verify");
    let keys = client.process_m4(&m4.body).unwrap();

    assert_eq!(client.state(), VerifyState::Established);
    assert_eq!(keys.write_key, accessory_keys.decrypt_key);
    assert_eq!(keys.read_key, accessory_keys.encrypt_key);
    assert_ne!(keys.write_key, keys.read_key);
}

#[test]
fn test_pair_verify_step_driver() {
    let (mut server, credential) = paired_fixture();
    let mut client = PairVerify::new(&credential).unwrap();

    let mut reply: Option<Vec<u8>> = None;
    let keys = loop {
        match client.step(reply.as_deref()).unwrap() {
            PairingStepResult::SendData(body) => {
                reply = Some(server.handle_pair_verify(&body).body);
            }
            PairingStepResult::Complete(keys) => break keys,
        }
    };
    assert_ne!(keys.write_key, [0u8; 32]);
}

#[test]
fn test_pair_verify_rejects_impostor_signature() {
    let (mut server, credential) = paired_fixture();
    server.impersonate_with = Some(Ed25519KeyPair::generate());

    let mut client = PairVerify::new(&credential).unwrap();
    let m1 = client.start().unwrap();
    let m2 = server.handle_pair_verify(&m1);

    let result = client.process_m2(&m2.body);
    assert!(matches!(result, Err(PairingError::UntrustedPeer(_))));
    assert_eq!(client.state(), VerifyState::Failed);

    // single attempt per connection
    assert!(matches!(
        client.process_m2(&m2.body),
        Err(PairingError::InvalidState { .. })
    ));
}

#[test]
fn test_pair_verify_rejects_wrong_accessory_id() {
    let (_, mut credential) = paired_fixture();
    credential.accessory_id = "11:22:33:44:55:66".to_string();
    let (mut server, _) = paired_fixture();
    credential.accessory_ltpk = *server.public_key().as_bytes();

    let mut client = PairVerify::new(&credential).unwrap();
    let m2 = server.handle_pair_verify(&client.start().unwrap());
    assert!(matches!(
        client.process_m2(&m2.body),
        Err(PairingError::UntrustedPeer(_))
    ));
}

#[test]
fn test_pair_verify_tampered_payload_is_authentication_failure() {
    let (mut server, credential) = paired_fixture();
    let mut client = PairVerify::new(&credential).unwrap();
    let m2 = server.handle_pair_verify(&client.start().unwrap());

    let tlv = TlvDecoder::decode(&m2.body).unwrap();
    let mut encrypted = tlv.get_required(TlvType::EncryptedData).unwrap().to_vec();
    encrypted[0] ^= 0x01;
    let tampered = TlvEncoder::new()
        .add_state(2)
        .add(TlvType::PublicKey, tlv.get_required(TlvType::PublicKey).unwrap())
        .add(TlvType::EncryptedData, &encrypted)
        .build();

    assert!(matches!(
        client.process_m2(&tampered),
        Err(PairingError::AuthenticationFailed(_))
    ));
}

#[test]
fn test_pair_verify_m4_error_is_authentication_failure() {
    let (mut server, credential) = paired_fixture();
    let mut client = PairVerify::new(&credential).unwrap();
    let m2 = server.handle_pair_verify(&client.start().unwrap());
    let _m3 = client.process_m2(&m2.body).unwrap();

    let m4 = TlvEncoder::new()
        .add_state(4)
        .add_byte(TlvType::Error, 0x02)
        .build();
    assert!(matches!(
        client.process_m4(&m4),
        Err(PairingError::AuthenticationFailed(_))
    ));
}

#[test]
fn test_pair_verify_unknown_controller_is_rejected_by_accessory() {
    let (mut server, credential) = paired_fixture();
    assert!(server.remove_pairing(&credential.controller_id));

    let mut client = PairVerify::new(&credential).unwrap();
    let m2 = server.handle_pair_verify(&client.start().unwrap());
    let m3 = client.process_m2(&m2.body).unwrap();
    let m4 = server.handle_pair_verify(&m3);
    assert!(m4.session_keys.is_none());
    assert!(client.process_m4(&m4.body).is_err());
}

#[test]
fn test_pair_verify_m3_layout() {
    let (mut server, credential) = paired_fixture();
    let mut client = PairVerify::new(&credential).unwrap();
    let m2 = server.handle_pair_verify(&client.start().unwrap());
    let m3 = client.process_m2(&m2.body).unwrap();

    let tlv = TlvDecoder::decode(&m3).unwrap();
    assert_eq!(tlv.get_state().unwrap(), 3);
    let encrypted = tlv.get_required(TlvType::EncryptedData).unwrap();
    assert!(encrypted.len() > 16);

    // a wrong key cannot open it
    let cipher = ChaCha20Poly1305Cipher::new(&[0u8; 32]).unwrap();
    assert!(cipher.decrypt(&Nonce::from_label(b"PV-Msg03"), encrypted).is_err());
}
