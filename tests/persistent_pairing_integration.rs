mod common;

use common::{CONTROLLER_ID, init_logging};
use homekit_controller::protocol::pairing::{FileStorage, StorageError};
use homekit_controller::testing::MockAccessory;
use homekit_controller::{CredentialStore, SecureConnection, SessionConfig, pair_setup};
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_stored_credential_survives_reload() {
    init_logging();
    let mut accessory = MockAccessory::temperature_sensor();
    let address = accessory.start().await.unwrap();
    let cancel = CancellationToken::new();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pairings.json");

    let credential = pair_setup(
        address,
        accessory.setup_code(),
        CONTROLLER_ID,
        &SessionConfig::default(),
        &cancel,
    )
    .await
    .unwrap();
    {
        let mut store = FileStorage::new(&path).await.unwrap();
        store.save(&credential).await.unwrap();
    }

    let store = FileStorage::new(&path).await.unwrap();
    assert_eq!(store.list_devices().await, vec![accessory.accessory_id().to_string()]);
    let loaded = store.load(accessory.accessory_id()).await.unwrap();
    assert_eq!(loaded, credential);

    let session = SecureConnection::new();
    session
        .connect_and_listen(&loaded, None, &cancel)
        .await
        .unwrap();
    assert!(session.is_connected());
}

#[tokio::test]
async fn test_update_address_and_remove() {
    init_logging();
    let mut accessory = MockAccessory::temperature_sensor();
    accessory.start().await.unwrap();
    let credential = accessory.pair_controller(CONTROLLER_ID).await;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pairings.json");
    let mut store = FileStorage::new(&path).await.unwrap();
    store.save(&credential).await.unwrap();

    let moved: std::net::SocketAddr = "127.0.0.1:51826".parse().unwrap();
    store
        .update_address(&credential.accessory_id, moved)
        .await
        .unwrap();

    let reloaded = FileStorage::new(&path).await.unwrap();
    assert_eq!(
        reloaded.load(&credential.accessory_id).await.unwrap().address,
        moved
    );

    store.remove(&credential.accessory_id).await.unwrap();
    let reloaded = FileStorage::new(&path).await.unwrap();
    assert!(reloaded.load(&credential.accessory_id).await.is_none());

    let err = store
        .update_address(&credential.accessory_id, moved)
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::NotFound(_)));
}
