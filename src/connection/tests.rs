use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use super::pending::{PendingQueue, ResponseAction};
use super::reader::{ReadLoop, Shared};
use super::{ConnectionState, DisconnectReason, SecureConnection, SessionEvent};
use crate::error::{HomeKitError, Result};
use crate::net::{FrameDecryptor, FrameEncryptor};
use crate::protocol::http::{HttpCodec, HttpResponse, StatusCode};

const KEY: [u8; 32] = [7; 32];

#[test]
fn test_connection_state_is_active() {
    assert!(ConnectionState::Connecting.is_active());
    assert!(ConnectionState::Verifying.is_active());
    assert!(ConnectionState::Connected.is_active());
    assert!(!ConnectionState::Disconnected.is_active());
    assert!(!ConnectionState::Closed.is_active());
}

#[test]
fn test_connection_state_is_connected() {
    assert!(ConnectionState::Connected.is_connected());
    assert!(!ConnectionState::Verifying.is_connected());
}

#[tokio::test]
async fn test_pending_queue_is_fifo() {
    let mut queue = PendingQueue::default();
    let first = queue.register(ResponseAction::Deliver).unwrap();
    let second = queue.register(ResponseAction::RaiseEvents).unwrap();
    assert_eq!(queue.len(), 2);

    let slot = queue.pop().unwrap();
    assert_eq!(slot.action, ResponseAction::Deliver);
    slot.complete(Ok(HttpResponse::new(StatusCode::OK)));
    let slot = queue.pop().unwrap();
    slot.complete(Ok(HttpResponse::new(StatusCode::NO_CONTENT)));

    assert_eq!(first.await.unwrap().unwrap().status, StatusCode::OK);
    assert_eq!(second.await.unwrap().unwrap().status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_abandoned_slot_keeps_its_place() {
    let mut queue = PendingQueue::default();
    let abandoned = queue.register(ResponseAction::Deliver).unwrap();
    let waiting = queue.register(ResponseAction::Deliver).unwrap();
    drop(abandoned);

    // the first response still belongs to the abandoned slot
    queue.pop().unwrap().complete(Ok(HttpResponse::new(StatusCode::OK)));
    queue
        .pop()
        .unwrap()
        .complete(Ok(HttpResponse::new(StatusCode::MULTI_STATUS)));

    assert_eq!(waiting.await.unwrap().unwrap().status, StatusCode::MULTI_STATUS);
}

#[tokio::test]
async fn test_close_fails_waiters_and_refuses_new_requests() {
    let mut queue = PendingQueue::default();
    let waiting = queue.register(ResponseAction::Deliver).unwrap();

    queue.close(DisconnectReason::RemoteClosed);
    assert!(queue.is_closed());
    assert_eq!(queue.len(), 0);

    let err = waiting.await.unwrap().unwrap_err();
    assert!(matches!(err, HomeKitError::ConnectionLost { .. }));
    assert!(matches!(
        queue.register(ResponseAction::Deliver),
        Err(HomeKitError::ConnectionLost { .. })
    ));
}

#[tokio::test]
async fn test_unconnected_session() {
    let session = SecureConnection::new();
    let cancel = tokio_util::sync::CancellationToken::new();

    assert!(!session.is_connected());
    assert_eq!(session.state().await, ConnectionState::Disconnected);
    assert!(session.address().await.is_none());
    assert!(session.device_reported_info().await.is_none());
    assert!(!session.ping(&cancel).await);

    let err = session
        .get_characteristics(&[crate::model::CharacteristicId::new(1, 9)], &cancel)
        .await
        .unwrap_err();
    assert!(err.is_connection_lost());

    let err = session.refresh_values(None, &cancel).await.unwrap_err();
    assert!(matches!(err, HomeKitError::InvalidOperation { .. }));
}

#[tokio::test]
async fn test_close_after_decryption_failure_reports_decryption() {
    let mut queue = PendingQueue::default();
    let waiting = queue.register(ResponseAction::Deliver).unwrap();

    queue.close(DisconnectReason::DecryptionFailed);

    let err = waiting.await.unwrap().unwrap_err();
    assert!(matches!(err, HomeKitError::Decryption { .. }), "{err:?}");
}

#[tokio::test]
async fn test_closed_session_is_never_announced() {
    let shared = Shared::new(8);
    let mut events = shared.events.subscribe();
    *shared.state.write().await = ConnectionState::Connected;

    assert!(!shared.mark_closed().await);
    assert!(!shared.announce_connected().await);
    assert_eq!(*shared.state.read().await, ConnectionState::Closed);
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_announced_session_reports_its_close() {
    let shared = Shared::new(8);
    let mut events = shared.events.subscribe();
    *shared.state.write().await = ConnectionState::Connected;

    assert!(shared.announce_connected().await);
    assert!(matches!(
        events.try_recv(),
        Ok(SessionEvent::ConnectionChanged {
            connected: true,
            reason: None
        })
    ));
    assert!(shared.mark_closed().await);
}

/// A read loop fed by an in-process peer that encrypts with [`KEY`]
struct Loopback {
    shared: Arc<Shared>,
    peer: TcpStream,
    encryptor: FrameEncryptor,
    shutdown: CancellationToken,
    task: tokio::task::JoinHandle<()>,
}

impl Loopback {
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap())
            .await
            .unwrap();
        let (peer, _) = listener.accept().await.unwrap();
        let (read_half, _write_half) = client.into_split();

        let shared = Arc::new(Shared::new(8));
        *shared.state.write().await = ConnectionState::Connected;
        let shutdown = CancellationToken::new();
        let reader = ReadLoop::new(
            read_half,
            FrameDecryptor::new(&KEY).unwrap(),
            HttpCodec::new().with_max_size(4096),
            Arc::clone(&shared),
            shutdown.clone(),
            CancellationToken::new(),
        );
        let task = tokio::spawn(reader.run());

        Self {
            shared,
            peer,
            encryptor: FrameEncryptor::new(&KEY).unwrap(),
            shutdown,
            task,
        }
    }

    async fn expect(&self) -> oneshot::Receiver<Result<HttpResponse>> {
        self.shared
            .pending
            .lock()
            .await
            .register(ResponseAction::Deliver)
            .unwrap()
    }

    async fn send(&mut self, message: &[u8]) {
        let frames = self.encryptor.encrypt(message).unwrap();
        self.peer.write_all(&frames).await.unwrap();
    }

    async fn stop(self) {
        self.shutdown.cancel();
        self.task.await.unwrap();
    }
}

async fn assert_bad_reply_answers_first_request(bad: &[u8]) {
    let mut peer = Loopback::start().await;
    let first = peer.expect().await;
    let second = peer.expect().await;

    let mut wire = bad.to_vec();
    wire.extend_from_slice(b"HTTP/1.1 204 No Content\r\n\r\n");
    peer.send(&wire).await;

    let err = first.await.unwrap().unwrap_err();
    assert!(matches!(err, HomeKitError::Codec(_)), "{err:?}");
    let response = second.await.unwrap().unwrap();
    assert_eq!(response.status, StatusCode::NO_CONTENT);
    assert_eq!(*peer.shared.state.read().await, ConnectionState::Connected);

    peer.stop().await;
}

#[tokio::test]
async fn test_malformed_response_fails_only_its_request() {
    assert_bad_reply_answers_first_request(b"HTTP/1.1 500 Internal\r\nBadHeader\r\n\r\n").await;
}

#[tokio::test]
async fn test_oversized_chunk_fails_only_its_request() {
    assert_bad_reply_answers_first_request(
        b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n1\r\nA\r\nffffffffffffffff\r\n",
    )
    .await;
}

#[tokio::test]
async fn test_malformed_response_split_across_frames() {
    let mut peer = Loopback::start().await;
    let first = peer.expect().await;
    let second = peer.expect().await;

    peer.send(b"HTTP/1.1 500 Internal\r\nBad").await;
    peer.send(b"Header\r\n\r\nHTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\n").await;
    peer.send(b"{}").await;

    assert!(first.await.unwrap().is_err());
    let response = second.await.unwrap().unwrap();
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body, b"{}");

    peer.stop().await;
}
