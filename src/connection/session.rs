//! Encrypted controller session with one accessory

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::{Mutex, RwLock, broadcast};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::pending::ResponseAction;
use super::plain::{PlainChannel, pair_verify, paths};
use super::reader::{ReadLoop, Shared};
use super::state::{ConnectionState, DisconnectReason, SessionEvent};
use crate::error::{HomeKitError, Result};
use crate::model::{
    CharacteristicId, CharacteristicValue, CharacteristicWrite, CharacteristicsPayload,
    DeviceReportedInfo,
};
use crate::net::{FrameEncryptor, HapSecureSession, connect_tcp};
use crate::protocol::http::{HttpCodec, HttpRequest, HttpRequestBuilder, HttpResponse, Method, StatusCode};
use crate::protocol::pairing::tlv::{TlvDecoder, TlvEncoder, TlvType, methods};
use crate::protocol::pairing::PairingCredential;
use crate::types::SessionConfig;

/// Send half of the encrypted session
struct Writer {
    stream: OwnedWriteHalf,
    encryptor: FrameEncryptor,
}

/// Encrypted session with one paired accessory
///
/// Connects once with [`connect_and_listen`](Self::connect_and_listen); after the
/// session closes for any reason a new instance is needed. Requests may be issued
/// concurrently from several tasks.
pub struct SecureConnection {
    config: SessionConfig,
    shared: Arc<Shared>,
    /// Registering a pending slot and writing its frames happen under this lock
    writer: Mutex<Option<Writer>>,
    reader_task: Mutex<Option<JoinHandle<()>>>,
    shutdown: CancellationToken,
    credential: RwLock<Option<PairingCredential>>,
    address: RwLock<Option<SocketAddr>>,
}

impl SecureConnection {
    /// Create an unconnected session with default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(SessionConfig::default())
    }

    /// Create an unconnected session with the given timeouts and limits
    #[must_use]
    pub fn with_config(config: SessionConfig) -> Self {
        Self {
            shared: Arc::new(Shared::new(config.event_capacity)),
            config,
            writer: Mutex::new(None),
            reader_task: Mutex::new(None),
            shutdown: CancellationToken::new(),
            credential: RwLock::new(None),
            address: RwLock::new(None),
        }
    }

    /// Subscribe to value and connection events
    #[must_use]
    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.events.subscribe()
    }

    /// Whether the session is usable
    ///
    /// Cleared when the session closes and when a ping fails.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    /// Current lifecycle state
    ///
    /// `Closed` is terminal; a closed session cannot be reconnected.
    pub async fn state(&self) -> ConnectionState {
        *self.shared.state.read().await
    }

    /// Address the session is connected to
    pub async fn address(&self) -> Option<SocketAddr> {
        *self.address.read().await
    }

    /// Latest accessory database, with values kept current by reads and events
    pub async fn device_reported_info(&self) -> Option<DeviceReportedInfo> {
        self.shared.info.read().await.clone()
    }

    /// Connect, run pair-verify, start the read loop and fetch `/accessories`
    ///
    /// Tries `credential.address` first, then `fallback`. Cancelling `cancel` aborts the
    /// attempt, or closes the session once it is running.
    ///
    /// # Errors
    ///
    /// `ConnectionFailed` if no address is reachable, `Cancelled`, `Timeout`, the
    /// pair-verify failure (`AuthenticationFailed`, `UntrustedPeer`, ...), or
    /// `InvalidOperation` if this session was already used.
    pub async fn connect_and_listen(
        &self,
        credential: &PairingCredential,
        fallback: Option<SocketAddr>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        {
            let mut state = self.shared.state.write().await;
            if *state != ConnectionState::Disconnected {
                return Err(HomeKitError::invalid_operation(format!(
                    "cannot connect a session in state {:?}",
                    *state
                )));
            }
            *state = ConnectionState::Connecting;
        }

        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(HomeKitError::Cancelled),
            result = self.establish(credential, fallback, cancel) => result,
        };

        match result {
            Ok(()) if self.shared.announce_connected().await => Ok(()),
            Ok(()) => {
                let reason = self
                    .shared
                    .close_reason
                    .lock()
                    .await
                    .unwrap_or(DisconnectReason::RemoteClosed);
                tracing::warn!(
                    "{} closed before the session was announced",
                    credential.accessory_id
                );
                self.shutdown(reason).await;
                Err(HomeKitError::connection_lost(format!(
                    "session closed while connecting ({reason:?})"
                )))
            }
            Err(e) => {
                tracing::warn!("Connect to {} failed: {}", credential.accessory_id, e);
                let reason = if matches!(e, HomeKitError::Cancelled) {
                    DisconnectReason::Cancelled
                } else {
                    DisconnectReason::ReadError
                };
                self.shutdown(reason).await;
                Err(e)
            }
        }
    }

    async fn establish(
        &self,
        credential: &PairingCredential,
        fallback: Option<SocketAddr>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mut addresses = vec![credential.address];
        if let Some(fallback) = fallback.filter(|a| *a != credential.address) {
            addresses.push(fallback);
        }

        let (stream, address) = connect_tcp(&addresses, self.config.connection_timeout)
            .await
            .map_err(|e| HomeKitError::ConnectionFailed {
                address: addresses
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", "),
                message: e.to_string(),
                source: Some(Box::new(e)),
            })?;
        tracing::info!("Connected to {} at {}", credential.accessory_id, address);

        *self.shared.state.write().await = ConnectionState::Verifying;
        let mut channel = PlainChannel::new(stream, address, &self.config);
        let keys = pair_verify(&mut channel, credential).await?;
        let (read_half, write_half) = channel.into_stream()?.into_split();
        let (encryptor, decryptor) = HapSecureSession::for_controller(&keys)?.split();

        let reader = ReadLoop::new(
            read_half,
            decryptor,
            HttpCodec::new().with_max_size(self.config.max_message_size),
            Arc::clone(&self.shared),
            self.shutdown.clone(),
            cancel.clone(),
        );
        *self.writer.lock().await = Some(Writer {
            stream: write_half,
            encryptor,
        });
        *self.address.write().await = Some(address);
        *self.credential.write().await = Some(credential.clone());
        // before the read loop exists, so its close always comes after
        self.shared.connected.store(true, Ordering::SeqCst);
        *self.shared.state.write().await = ConnectionState::Connected;
        *self.reader_task.lock().await = Some(tokio::spawn(reader.run()));

        let request = self.request_builder(Method::Get, "/accessories").await.build();
        let response = self
            .send(&request, ResponseAction::StoreAccessories, cancel)
            .await?;
        if !response.is_success() {
            return Err(status_error(&response));
        }
        Ok(())
    }

    /// Send a request and wait for its response
    ///
    /// Responses are returned whatever their status. A cancelled request keeps its
    /// place in line; its response is discarded when it arrives.
    ///
    /// # Errors
    ///
    /// `ConnectionLost` if the session is closed or closes while waiting, `Cancelled`,
    /// or a write error.
    pub async fn request(
        &self,
        request: &HttpRequest,
        cancel: &CancellationToken,
    ) -> Result<HttpResponse> {
        self.send(request, ResponseAction::Deliver, cancel).await
    }

    async fn send(
        &self,
        request: &HttpRequest,
        action: ResponseAction,
        cancel: &CancellationToken,
    ) -> Result<HttpResponse> {
        if cancel.is_cancelled() {
            return Err(HomeKitError::Cancelled);
        }

        let response = {
            let mut guard = self.writer.lock().await;
            let writer = guard
                .as_mut()
                .ok_or_else(|| HomeKitError::connection_lost("session is not connected"))?;
            let response = self.shared.pending.lock().await.register(action)?;

            let written = match writer.encryptor.encrypt(&request.encode()) {
                Ok(frames) => writer.stream.write_all(&frames).await.map_err(HomeKitError::from),
                Err(e) => Err(e.into()),
            };
            if let Err(e) = written {
                drop(guard);
                tracing::warn!("Write to accessory failed: {}", e);
                self.shutdown(DisconnectReason::WriteError).await;
                return Err(e);
            }
            response
        };
        tracing::debug!(">> {} {}", request.method.as_str(), request.path);

        tokio::select! {
            () = cancel.cancelled() => Err(HomeKitError::Cancelled),
            result = response => result
                .unwrap_or_else(|_| Err(HomeKitError::connection_lost("session closed"))),
        }
    }

    async fn request_builder(&self, method: Method, path: impl Into<String>) -> HttpRequestBuilder {
        let builder = HttpRequest::builder(method, path).user_agent(&self.config.user_agent);
        match *self.address.read().await {
            Some(address) => builder.host(&address.to_string()),
            None => builder,
        }
    }

    /// Read characteristics with `GET /characteristics?id=...`
    ///
    /// Values come back in the order the accessory reports them, each with its own
    /// status on a multi-status reply.
    ///
    /// # Errors
    ///
    /// `Status` for a non-success reply, plus the errors of [`request`](Self::request).
    pub async fn get_characteristics(
        &self,
        ids: &[CharacteristicId],
        cancel: &CancellationToken,
    ) -> Result<Vec<CharacteristicValue>> {
        self.read(ids, ResponseAction::Deliver, cancel).await
    }

    /// Re-read values and raise one `ValueChanged` event per returned value
    ///
    /// `None` reads every readable characteristic in declared order.
    ///
    /// # Errors
    ///
    /// `InvalidOperation` when `None` is passed before the accessory database is known,
    /// plus the errors of [`get_characteristics`](Self::get_characteristics).
    pub async fn refresh_values(
        &self,
        ids: Option<&[CharacteristicId]>,
        cancel: &CancellationToken,
    ) -> Result<Vec<CharacteristicValue>> {
        match ids {
            Some(ids) => self.read(ids, ResponseAction::RaiseEvents, cancel).await,
            None => {
                let ids = self.snapshot_ids(DeviceReportedInfo::readable_ids).await?;
                self.read(&ids, ResponseAction::RaiseEvents, cancel).await
            }
        }
    }

    async fn read(
        &self,
        ids: &[CharacteristicId],
        action: ResponseAction,
        cancel: &CancellationToken,
    ) -> Result<Vec<CharacteristicValue>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let query = ids
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");
        let request = self
            .request_builder(Method::Get, format!("/characteristics?id={query}"))
            .await
            .build();
        let response = self.send(&request, action, cancel).await?;
        characteristic_values(&response)
    }

    /// Write values or event flags with `PUT /characteristics`
    ///
    /// Returns the per-characteristic results of a 207 reply, or nothing for 204.
    ///
    /// # Errors
    ///
    /// `Status` for a non-success reply, plus the errors of [`request`](Self::request).
    pub async fn put_characteristics(
        &self,
        writes: &[CharacteristicWrite],
        cancel: &CancellationToken,
    ) -> Result<Vec<CharacteristicValue>> {
        if writes.is_empty() {
            return Ok(Vec::new());
        }
        let request = self
            .request_builder(Method::Put, "/characteristics")
            .await
            .body_json(&CharacteristicsPayload::new(writes.to_vec()))?
            .build();
        let response = self.send(&request, ResponseAction::Deliver, cancel).await?;
        characteristic_values(&response)
    }

    /// Write one value
    ///
    /// # Errors
    ///
    /// `Status` carrying the HAP status if the accessory refused the write.
    pub async fn write_value(
        &self,
        id: CharacteristicId,
        value: Value,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let results = self
            .put_characteristics(&[CharacteristicWrite::value(id, value)], cancel)
            .await?;
        check_multi_status(&results)
    }

    /// Enable event notifications
    ///
    /// # Errors
    ///
    /// `Status` carrying the first failing HAP status, plus the errors of
    /// [`put_characteristics`](Self::put_characteristics).
    pub async fn subscribe(&self, ids: &[CharacteristicId], cancel: &CancellationToken) -> Result<()> {
        self.set_events(ids, true, cancel).await
    }

    /// Disable event notifications
    ///
    /// # Errors
    ///
    /// See [`subscribe`](Self::subscribe).
    pub async fn unsubscribe(
        &self,
        ids: &[CharacteristicId],
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.set_events(ids, false, cancel).await
    }

    async fn set_events(
        &self,
        ids: &[CharacteristicId],
        enable: bool,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let writes: Vec<_> = ids
            .iter()
            .map(|id| CharacteristicWrite::events(*id, enable))
            .collect();
        let results = self.put_characteristics(&writes, cancel).await?;
        check_multi_status(&results)
    }

    /// Subscribe to every characteristic that supports events, then refresh them
    ///
    /// The refresh raises one event per current value, so subscribers see the starting
    /// state before any change.
    ///
    /// # Errors
    ///
    /// See [`subscribe`](Self::subscribe) and [`refresh_values`](Self::refresh_values).
    pub async fn subscribe_all(&self, cancel: &CancellationToken) -> Result<Vec<CharacteristicValue>> {
        let ids = self.snapshot_ids(DeviceReportedInfo::event_ids).await?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.subscribe(&ids, cancel).await?;
        self.refresh_values(Some(&ids), cancel).await
    }

    async fn snapshot_ids(
        &self,
        select: fn(&DeviceReportedInfo) -> Vec<CharacteristicId>,
    ) -> Result<Vec<CharacteristicId>> {
        self.shared
            .info
            .read()
            .await
            .as_ref()
            .map(select)
            .ok_or_else(|| HomeKitError::invalid_operation("accessory database not loaded"))
    }

    /// Remove this controller's pairing from the accessory and close the session
    ///
    /// # Errors
    ///
    /// `ConnectionLost` or a network error if the session is already gone,
    /// `PairingRejected` if the accessory refuses.
    pub async fn remove_pairing(&self, cancel: &CancellationToken) -> Result<()> {
        let controller_id = self
            .credential
            .read()
            .await
            .as_ref()
            .map(|c| c.controller_id.clone())
            .ok_or_else(|| HomeKitError::connection_lost("session is not connected"))?;

        let body = TlvEncoder::new()
            .add_state(1)
            .add_method(methods::REMOVE_PAIRING)
            .add(TlvType::Identifier, controller_id.as_bytes())
            .build();
        let request = self
            .request_builder(Method::Post, paths::PAIRINGS)
            .await
            .body_tlv(body)
            .build();
        let response = self.send(&request, ResponseAction::Deliver, cancel).await?;
        if !response.is_success() {
            return Err(status_error(&response));
        }

        let tlv = TlvDecoder::decode(&response.body)
            .map_err(|e| HomeKitError::protocol(format!("invalid remove-pairing reply: {e}")))?;
        if let Some(code) = tlv.get_error() {
            return Err(HomeKitError::PairingRejected { code });
        }

        tracing::info!("Removed pairing {}; closing session", controller_id);
        self.shutdown(DisconnectReason::Unpaired).await;
        Ok(())
    }

    /// Check the accessory still answers with a side-effect-free read
    ///
    /// A failed ping clears [`is_connected`](Self::is_connected) but leaves the
    /// socket open; a later successful ping sets it again.
    pub async fn ping(&self, cancel: &CancellationToken) -> bool {
        if !self.state().await.is_connected() {
            return false;
        }

        let target = self.shared.info.read().await.as_ref().and_then(|info| {
            info.readable_ids().first().copied()
        });
        let path = match target {
            Some(id) => format!("/characteristics?id={id}"),
            None => "/accessories".to_string(),
        };
        let request = self.request_builder(Method::Get, path).await.build();

        let outcome = tokio::time::timeout(
            self.config.ping_timeout,
            self.send(&request, ResponseAction::Deliver, cancel),
        )
        .await;
        match outcome {
            Ok(Ok(response)) if response.is_success() => {
                if self.state().await.is_connected() {
                    self.shared.connected.store(true, Ordering::SeqCst);
                }
                true
            }
            Ok(Err(HomeKitError::Cancelled)) => false,
            Ok(Ok(response)) => {
                tracing::warn!("Ping answered with {}", response.status.as_u16());
                self.shared.connected.store(false, Ordering::SeqCst);
                false
            }
            Ok(Err(e)) => {
                tracing::warn!("Ping failed: {}", e);
                self.shared.connected.store(false, Ordering::SeqCst);
                false
            }
            Err(_) => {
                tracing::warn!("Ping timed out after {:?}", self.config.ping_timeout);
                self.shared.connected.store(false, Ordering::SeqCst);
                false
            }
        }
    }

    /// Close the session
    ///
    /// Pending requests fail with `ConnectionLost`. Does nothing if the session is not
    /// running.
    pub async fn disconnect(&self) {
        if self.state().await.is_active() {
            self.shutdown(DisconnectReason::UserRequested).await;
        }
    }

    async fn shutdown(&self, reason: DisconnectReason) {
        let reason = *self.shared.close_reason.lock().await.get_or_insert(reason);
        self.shutdown.cancel();

        if let Some(mut writer) = self.writer.lock().await.take() {
            if let Err(e) = writer.stream.shutdown().await {
                tracing::debug!("Socket shutdown: {}", e);
            }
        }

        let task = self.reader_task.lock().await.take();
        match task {
            Some(task) => {
                if let Err(e) = task.await {
                    tracing::warn!("Read loop ended abnormally: {}", e);
                }
            }
            None => {
                // never got as far as the read loop
                self.shared.pending.lock().await.close(reason);
            }
        }

        self.shared.connected.store(false, Ordering::SeqCst);
        *self.shared.state.write().await = ConnectionState::Closed;
    }
}

impl Default for SecureConnection {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SecureConnection {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Decode the body of a `/characteristics` reply
fn characteristic_values(response: &HttpResponse) -> Result<Vec<CharacteristicValue>> {
    match response.status {
        StatusCode::NO_CONTENT => Ok(Vec::new()),
        StatusCode::OK | StatusCode::MULTI_STATUS => {
            let payload: CharacteristicsPayload<CharacteristicValue> = response.json()?;
            Ok(payload.characteristics)
        }
        _ => Err(status_error(response)),
    }
}

fn check_multi_status(results: &[CharacteristicValue]) -> Result<()> {
    match results.iter().find(|r| !r.is_success()) {
        Some(failed) => Err(HomeKitError::Status {
            status: StatusCode::MULTI_STATUS.as_u16(),
            hap_status: failed.status,
        }),
        None => Ok(()),
    }
}

/// Build a `Status` error, picking up a HAP status from the body if there is one
fn status_error(response: &HttpResponse) -> HomeKitError {
    let hap_status = response
        .json::<CharacteristicsPayload<CharacteristicValue>>()
        .ok()
        .and_then(|p| p.characteristics.iter().find(|c| !c.is_success())?.status)
        .or_else(|| {
            let body: Value = response.json().ok()?;
            i32::try_from(body.get("status")?.as_i64()?).ok()
        });
    HomeKitError::Status {
        status: response.status.as_u16(),
        hap_status,
    }
}
