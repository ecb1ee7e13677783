#![allow(dead_code)]

use std::time::Duration;

use homekit_controller::testing::{MockAccessory, MockAccessoryConfig};
use homekit_controller::{PairingCredential, SecureConnection, SessionConfig, SessionEvent};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

pub const CONTROLLER_ID: &str = "6A1B2C3D-0000-4000-8000-00000000C0DE";
pub const WAIT: Duration = Duration::from_secs(5);

pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub struct Fixture {
    pub accessory: MockAccessory,
    pub credential: PairingCredential,
    pub session: SecureConnection,
    pub events: broadcast::Receiver<SessionEvent>,
    pub cancel: CancellationToken,
}

/// Start a mock accessory, pair a controller with it and connect
pub async fn connected(config: MockAccessoryConfig) -> Fixture {
    connected_with(config, SessionConfig::default()).await
}

pub async fn connected_with(config: MockAccessoryConfig, session_config: SessionConfig) -> Fixture {
    init_logging();
    let mut accessory = MockAccessory::new(config);
    accessory.start().await.unwrap();
    let credential = accessory.pair_controller(CONTROLLER_ID).await;

    let session = SecureConnection::with_config(session_config);
    let events = session.events();
    let cancel = CancellationToken::new();
    session
        .connect_and_listen(&credential, None, &cancel)
        .await
        .unwrap();

    Fixture {
        accessory,
        credential,
        session,
        events,
        cancel,
    }
}

pub async fn next_event(events: &mut broadcast::Receiver<SessionEvent>) -> SessionEvent {
    tokio::time::timeout(WAIT, events.recv())
        .await
        .expect("timed out waiting for a session event")
        .expect("event stream closed")
}

/// Skip anything that is not a value change
pub async fn next_value(
    events: &mut broadcast::Receiver<SessionEvent>,
) -> homekit_controller::AccessoryValueChangedEvent {
    loop {
        if let SessionEvent::ValueChanged(event) = next_event(events).await {
            return event;
        }
    }
}

/// Wait for the session to report itself disconnected
pub async fn next_disconnect(
    events: &mut broadcast::Receiver<SessionEvent>,
) -> Option<homekit_controller::DisconnectReason> {
    loop {
        if let SessionEvent::ConnectionChanged {
            connected: false,
            reason,
        } = next_event(events).await
        {
            return reason;
        }
    }
}

pub fn lightbulb() -> MockAccessoryConfig {
    MockAccessoryConfig {
        accessories_json: homekit_controller::testing::LIGHTBULB_ACCESSORIES.to_string(),
        ..MockAccessoryConfig::default()
    }
}
