mod common;

use common::{CONTROLLER_ID, init_logging};
use homekit_controller::testing::MockAccessory;
use homekit_controller::{HomeKitError, SecureConnection, SessionConfig, pair_setup};
use tokio_util::sync::CancellationToken;

async fn started() -> MockAccessory {
    init_logging();
    let mut accessory = MockAccessory::temperature_sensor();
    accessory.start().await.unwrap();
    accessory
}

#[tokio::test]
async fn test_pair_setup_then_connect() {
    let accessory = started().await;
    let address = accessory.address().unwrap();
    let cancel = CancellationToken::new();

    let credential = pair_setup(
        address,
        accessory.setup_code(),
        CONTROLLER_ID,
        &SessionConfig::default(),
        &cancel,
    )
    .await
    .unwrap();

    assert_eq!(credential.accessory_id, accessory.accessory_id());
    assert_eq!(credential.controller_id, CONTROLLER_ID);
    assert_eq!(credential.address, address);
    assert!(accessory.is_paired(CONTROLLER_ID).await);

    let session = SecureConnection::new();
    session
        .connect_and_listen(&credential, None, &cancel)
        .await
        .unwrap();
    assert!(session.is_connected());
    assert!(session.ping(&cancel).await);
}

#[tokio::test]
async fn test_pair_setup_accepts_bare_digits() {
    let accessory = started().await;

    let credential = pair_setup(
        accessory.address().unwrap(),
        "03145154",
        CONTROLLER_ID,
        &SessionConfig::default(),
        &CancellationToken::new(),
    )
    .await
    .unwrap();

    assert!(accessory.is_paired(&credential.controller_id).await);
}

#[tokio::test]
async fn test_pair_setup_with_wrong_code() {
    let accessory = started().await;

    let err = pair_setup(
        accessory.address().unwrap(),
        "111-22-333",
        CONTROLLER_ID,
        &SessionConfig::default(),
        &CancellationToken::new(),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, HomeKitError::AuthenticationFailed { .. }), "got {err}");
    assert!(!accessory.is_paired(CONTROLLER_ID).await);
}

#[tokio::test]
async fn test_pair_setup_rejects_malformed_code_before_connecting() {
    let accessory = started().await;

    let err = pair_setup(
        accessory.address().unwrap(),
        "1234",
        CONTROLLER_ID,
        &SessionConfig::default(),
        &CancellationToken::new(),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, HomeKitError::InvalidOperation { .. }), "got {err}");
    assert!(accessory.received_requests().await.is_empty());
}

#[tokio::test]
async fn test_pair_setup_cancelled() {
    let accessory = started().await;
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = pair_setup(
        accessory.address().unwrap(),
        accessory.setup_code(),
        CONTROLLER_ID,
        &SessionConfig::default(),
        &cancel,
    )
    .await
    .unwrap_err();

    assert!(matches!(err, HomeKitError::Cancelled));
    assert!(!accessory.is_paired(CONTROLLER_ID).await);
}
