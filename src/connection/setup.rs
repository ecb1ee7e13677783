//! First-time pairing over a dedicated connection

use std::net::SocketAddr;

use tokio_util::sync::CancellationToken;

use super::plain::{PlainChannel, paths};
use crate::error::{HomeKitError, Result};
use crate::net::connect_tcp;
use crate::protocol::crypto::Ed25519KeyPair;
use crate::protocol::pairing::{PairSetup, PairingCredential, PairingStepResult};
use crate::types::SessionConfig;

/// Pair with an unpaired accessory using its setup code
///
/// Generates a fresh controller identity. The connection is closed afterwards; use the
/// returned credential with [`SecureConnection::connect_and_listen`].
///
/// [`SecureConnection::connect_and_listen`]: super::SecureConnection::connect_and_listen
///
/// # Errors
///
/// `InvalidOperation` for a malformed setup code, `AuthenticationFailed` for a wrong
/// one, `PairingRejected` when the accessory refuses (busy, max peers, back-off),
/// `UntrustedPeer` if the accessory's key exchange signature fails, and
/// connection errors or `Cancelled`.
pub async fn pair_setup(
    address: SocketAddr,
    setup_code: &str,
    controller_id: &str,
    config: &SessionConfig,
    cancel: &CancellationToken,
) -> Result<PairingCredential> {
    pair_setup_with_keys(
        address,
        setup_code,
        controller_id,
        Ed25519KeyPair::generate(),
        config,
        cancel,
    )
    .await
}

/// Like [`pair_setup`] but registers an existing controller identity
///
/// # Errors
///
/// See [`pair_setup`].
pub async fn pair_setup_with_keys(
    address: SocketAddr,
    setup_code: &str,
    controller_id: &str,
    controller_keys: Ed25519KeyPair,
    config: &SessionConfig,
    cancel: &CancellationToken,
) -> Result<PairingCredential> {
    let mut setup = PairSetup::new(setup_code, controller_id, controller_keys)?;

    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(HomeKitError::Cancelled),
        result = run_setup(&mut setup, address, controller_id, config) => result,
    }
}

async fn run_setup(
    setup: &mut PairSetup,
    address: SocketAddr,
    controller_id: &str,
    config: &SessionConfig,
) -> Result<PairingCredential> {
    let (stream, address) = connect_tcp(&[address], config.connection_timeout)
        .await
        .map_err(|e| HomeKitError::ConnectionFailed {
            address: address.to_string(),
            message: e.to_string(),
            source: Some(Box::new(e)),
        })?;
    let mut channel = PlainChannel::new(stream, address, config);

    tracing::info!("Starting pair-setup with {}", address);
    let mut reply: Option<Vec<u8>> = None;
    loop {
        match setup.step(reply.as_deref())? {
            PairingStepResult::SendData(body) => {
                reply = Some(channel.post_tlv(paths::PAIR_SETUP, body).await?);
            }
            PairingStepResult::Complete(accessory) => {
                tracing::info!("Paired with accessory {}", accessory.id);
                return Ok(PairingCredential::new(
                    controller_id,
                    setup.controller_keys(),
                    accessory.id,
                    &accessory.ltpk,
                    address,
                ));
            }
        }
    }
}
