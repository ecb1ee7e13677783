use crate::protocol::pairing::tlv::*;

#[test]
fn test_tlv_encode_pair_setup_m1() {
    let encoded = TlvEncoder::new()
        .add_state(1)
        .add_method(methods::PAIR_SETUP)
        .build();
    assert_eq!(encoded, vec![0x06, 0x01, 0x01, 0x00, 0x01, 0x00]);
}

#[test]
fn test_tlv_empty_value() {
    let encoded = TlvEncoder::new().add(TlvType::Separator, &[]).build();
    assert_eq!(encoded, vec![0xFF, 0x00]);

    let decoded = TlvDecoder::decode(&encoded).unwrap();
    assert_eq!(decoded.get(TlvType::Separator), Some(&[][..]));
}

#[test]
fn test_tlv_fragments_srp_public_key() {
    // a 384-byte SRP public key needs two fragments
    let key = (0..384u32).map(|i| (i % 251) as u8).collect::<Vec<_>>();
    let encoded = TlvEncoder::new()
        .add_state(2)
        .add(TlvType::PublicKey, &key)
        .build();

    assert_eq!(encoded.len(), 3 + (2 + 255) + (2 + 129));
    assert_eq!(encoded[3], TlvType::PublicKey as u8);
    assert_eq!(encoded[4], 255);
    assert_eq!(encoded[3 + 257], TlvType::PublicKey as u8);
    assert_eq!(encoded[3 + 258], 129);

    let decoded = TlvDecoder::decode(&encoded).unwrap();
    assert_eq!(decoded.get_state().unwrap(), 2);
    assert_eq!(decoded.get(TlvType::PublicKey).unwrap(), key.as_slice());
}

#[test]
fn test_tlv_truncated_input() {
    assert!(matches!(
        TlvDecoder::decode(&[0x06]),
        Err(TlvError::Truncated(0))
    ));
    assert!(matches!(
        TlvDecoder::decode(&[0x06, 0x01, 0x01, 0x03, 0x05, 0xAA]),
        Err(TlvError::Truncated(3))
    ));
}

#[test]
fn test_tlv_error_and_missing_field() {
    let decoded = TlvDecoder::decode(&[0x06, 0x01, 0x04, 0x07, 0x01, 0x02]).unwrap();
    assert_eq!(decoded.get_error(), Some(errors::AUTHENTICATION));
    assert!(matches!(
        decoded.get_required(TlvType::Proof),
        Err(TlvError::MissingField(TlvType::Proof))
    ));
}

#[test]
fn test_tlv_state_must_be_one_byte() {
    let decoded = TlvDecoder::decode(&[0x06, 0x02, 0x01, 0x02]).unwrap();
    assert!(matches!(
        decoded.get_state(),
        Err(TlvError::InvalidValue(TlvType::State))
    ));
}

#[test]
fn test_tlv_type_lookup() {
    assert_eq!(TlvType::from_byte(0x0A), Some(TlvType::Signature));
    assert_eq!(TlvType::from_byte(0x13), Some(TlvType::Flags));
    assert_eq!(TlvType::from_byte(0x42), None);
}
