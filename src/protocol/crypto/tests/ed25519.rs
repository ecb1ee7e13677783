use super::super::*;

#[test]
fn test_ed25519_identity_persists_through_seed() {
    let original = Ed25519KeyPair::generate();
    let restored = Ed25519KeyPair::from_bytes(&original.secret_bytes()).unwrap();
    assert_eq!(original.public_key(), restored.public_key());
}

#[test]
fn test_ed25519_sign_verify() {
    let kp = Ed25519KeyPair::generate();
    let signature = kp.sign(b"device info");
    kp.public_key().verify(b"device info", &signature).unwrap();

    let reparsed = Ed25519Signature::from_bytes(&signature.to_bytes()).unwrap();
    kp.public_key().verify(b"device info", &reparsed).unwrap();
}

#[test]
fn test_ed25519_rejects_other_signer() {
    let signer = Ed25519KeyPair::generate();
    let impostor = Ed25519KeyPair::generate();

    let signature = impostor.sign(b"device info");
    let result = signer.public_key().verify(b"device info", &signature);
    assert!(matches!(result, Err(CryptoError::InvalidSignature)));
}

#[test]
fn test_ed25519_length_checks() {
    assert!(matches!(
        Ed25519PublicKey::from_bytes(&[1u8; 31]),
        Err(CryptoError::InvalidKeyLength { .. })
    ));
    assert!(Ed25519Signature::from_bytes(&[0u8; 63]).is_err());
    assert!(Ed25519KeyPair::from_bytes(&[0u8; 33]).is_err());
}
