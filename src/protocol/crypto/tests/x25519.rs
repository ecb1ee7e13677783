use super::super::*;

#[test]
fn test_x25519_agreement() {
    let controller = X25519KeyPair::generate();
    let accessory = X25519KeyPair::generate();

    let a = controller.diffie_hellman(&accessory.public_key());
    let b = accessory.diffie_hellman(&controller.public_key());
    assert_eq!(a.as_bytes(), b.as_bytes());
}

#[test]
fn test_x25519_public_key_parse() {
    let kp = X25519KeyPair::from_bytes(&[7u8; 32]).unwrap();
    let parsed = X25519PublicKey::from_bytes(kp.public_key().as_bytes()).unwrap();
    assert_eq!(parsed.as_bytes(), kp.public_key().as_bytes());
    assert!(X25519PublicKey::from_bytes(&[0u8; 16]).is_err());
}
