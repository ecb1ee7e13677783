//! The per-connection read loop
//!
//! Sole owner of the receive key and counter, and sole writer of the characteristic
//! snapshot. Responses are matched to waiting requests in FIFO order; `EVENT/1.0`
//! pushes become value-changed events.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::net::tcp::OwnedReadHalf;
use tokio::sync::{Mutex, RwLock, broadcast};
use tokio_util::sync::CancellationToken;

use super::pending::{PendingQueue, ResponseAction};
use super::state::{AccessoryValueChangedEvent, ConnectionState, DisconnectReason, SessionEvent};
use crate::error::HomeKitError;
use crate::model::{CharacteristicValue, CharacteristicsPayload, DeviceReportedInfo};
use crate::net::{FrameDecryptor, read_frame};
use crate::protocol::http::{HttpCodec, HttpResponse, MessageKind};

/// State shared by the session handle and its read loop
pub(crate) struct Shared {
    pub(crate) state: RwLock<ConnectionState>,
    pub(crate) connected: AtomicBool,
    /// Set once the session reported itself connected
    pub(crate) announced: AtomicBool,
    pub(crate) pending: Mutex<PendingQueue>,
    pub(crate) info: RwLock<Option<DeviceReportedInfo>>,
    pub(crate) close_reason: Mutex<Option<DisconnectReason>>,
    pub(crate) events: broadcast::Sender<SessionEvent>,
}

impl Shared {
    pub(crate) fn new(event_capacity: usize) -> Self {
        let (events, _) = broadcast::channel(event_capacity);
        Self {
            state: RwLock::new(ConnectionState::Disconnected),
            connected: AtomicBool::new(false),
            announced: AtomicBool::new(false),
            pending: Mutex::new(PendingQueue::default()),
            info: RwLock::new(None),
            close_reason: Mutex::new(None),
            events,
        }
    }

    pub(crate) fn emit(&self, event: SessionEvent) {
        // no receivers is fine
        let _ = self.events.send(event);
    }

    /// Report the session connected unless it already closed
    ///
    /// Serialised with [`mark_closed`](Self::mark_closed) by the state lock, so a
    /// session is announced either before its close or not at all.
    pub(crate) async fn announce_connected(&self) -> bool {
        let state = self.state.write().await;
        if !state.is_connected() {
            return false;
        }
        self.announced.store(true, Ordering::SeqCst);
        self.emit(SessionEvent::ConnectionChanged {
            connected: true,
            reason: None,
        });
        true
    }

    /// Move to `Closed`; returns whether the session had been announced
    pub(crate) async fn mark_closed(&self) -> bool {
        let mut state = self.state.write().await;
        self.connected.store(false, Ordering::SeqCst);
        *state = ConnectionState::Closed;
        self.announced.load(Ordering::SeqCst)
    }
}

pub(crate) struct ReadLoop {
    reader: OwnedReadHalf,
    decryptor: FrameDecryptor,
    codec: HttpCodec,
    shared: Arc<Shared>,
    /// Owned by the session handle
    shutdown: CancellationToken,
    /// The caller's connect token
    cancel: CancellationToken,
}

impl ReadLoop {
    pub(crate) fn new(
        reader: OwnedReadHalf,
        decryptor: FrameDecryptor,
        codec: HttpCodec,
        shared: Arc<Shared>,
        shutdown: CancellationToken,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            reader,
            decryptor,
            codec,
            shared,
            shutdown,
            cancel,
        }
    }

    /// Read until the session ends, then tear it down exactly once
    ///
    /// The pump runs as its own task so that teardown still happens if it panics.
    pub(crate) async fn run(self) {
        let shared = Arc::clone(&self.shared);
        let detected = match tokio::spawn(self.pump()).await {
            Ok(reason) => reason,
            Err(e) => {
                tracing::error!("Read loop aborted: {}", e);
                DisconnectReason::ReadError
            }
        };
        let reason = *shared.close_reason.lock().await.get_or_insert(detected);
        tracing::info!("Session closed: {:?}", reason);

        let announced = shared.mark_closed().await;
        shared.pending.lock().await.close(reason);

        if announced {
            shared.emit(SessionEvent::ConnectionChanged {
                connected: false,
                reason: Some(reason),
            });
        }
    }

    async fn pump(mut self) -> DisconnectReason {
        loop {
            let frame = tokio::select! {
                () = self.shutdown.cancelled() => return DisconnectReason::UserRequested,
                () = self.cancel.cancelled() => return DisconnectReason::Cancelled,
                frame = read_frame(&mut self.reader) => frame,
            };

            let frame = match frame {
                Ok(Some(frame)) => frame,
                Ok(None) => return DisconnectReason::RemoteClosed,
                Err(e) => {
                    tracing::warn!("Session read failed: {}", e);
                    return DisconnectReason::ReadError;
                }
            };

            let plaintext = match self.decryptor.decrypt_block(&frame) {
                Ok((plaintext, _)) => plaintext,
                Err(e) => {
                    tracing::error!("Dropping session: {}", e);
                    return DisconnectReason::DecryptionFailed;
                }
            };

            if let Err(e) = self.codec.feed(&plaintext) {
                tracing::warn!("Discarding inbound data: {}", e);
                self.drop_malformed(e.into()).await;
                continue;
            }

            loop {
                match self.codec.decode() {
                    Ok(Some(message)) => self.dispatch(message).await,
                    Ok(None) => break,
                    Err(e) => {
                        tracing::warn!("Dropping malformed message: {}", e);
                        self.drop_malformed(e.into()).await;
                    }
                }
            }
        }
    }

    /// Skip a message that failed to parse
    ///
    /// A broken response still answers the oldest request, which gets the error, so
    /// later responses stay matched to their requests.
    async fn drop_malformed(&mut self, error: HomeKitError) {
        if self.codec.skip_malformed() != Some(MessageKind::Response) {
            return;
        }
        if let Some(pending) = self.shared.pending.lock().await.pop() {
            pending.complete(Err(error));
        }
    }

    async fn dispatch(&self, message: HttpResponse) {
        if message.is_event() {
            tracing::trace!("<< EVENT ({} bytes)", message.body.len());
            self.apply_values(&message).await;
            return;
        }

        let Some(pending) = self.shared.pending.lock().await.pop() else {
            tracing::warn!(
                "Dropping unsolicited {} response",
                message.status.as_u16()
            );
            return;
        };

        if message.is_success() {
            match pending.action {
                ResponseAction::Deliver => {}
                ResponseAction::RaiseEvents => self.apply_values(&message).await,
                ResponseAction::StoreAccessories => {
                    match DeviceReportedInfo::from_json(&message.body) {
                        Ok(info) => {
                            tracing::debug!("Accessory database: {} accessories", info.accessories.len());
                            *self.shared.info.write().await = Some(info);
                        }
                        Err(e) => {
                            pending.complete(Err(e.into()));
                            return;
                        }
                    }
                }
            }
        }

        pending.complete(Ok(message));
    }

    /// Store each reported value and raise its event, in payload order
    async fn apply_values(&self, message: &HttpResponse) {
        let payload = match message.json::<CharacteristicsPayload<CharacteristicValue>>() {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!("Ignoring undecodable characteristics payload: {}", e);
                return;
            }
        };

        let mut info = self.shared.info.write().await;
        for item in payload.characteristics {
            let id = item.id();
            if !item.is_success() {
                continue;
            }
            let Some(value) = item.value else {
                continue;
            };
            if let Some(info) = info.as_mut() {
                info.set_value(id, value.clone());
            }
            self.shared
                .emit(SessionEvent::ValueChanged(AccessoryValueChangedEvent {
                    aid: id.aid,
                    iid: id.iid,
                    value,
                }));
        }
    }
}
