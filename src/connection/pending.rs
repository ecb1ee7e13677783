//! FIFO correlation of requests and responses
//!
//! HAP answers requests strictly in order, so the oldest waiting slot owns the next
//! response. A slot whose caller gave up stays queued and swallows its response.

use std::collections::VecDeque;

use tokio::sync::oneshot;

use super::state::DisconnectReason;
use crate::error::{HomeKitError, Result};
use crate::protocol::http::HttpResponse;

/// What the read loop does with a response before handing it back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ResponseAction {
    /// Deliver as is
    Deliver,
    /// Store the returned values and raise one event per value
    RaiseEvents,
    /// Replace the accessory database snapshot
    StoreAccessories,
}

pub(crate) struct PendingRequest {
    pub(crate) action: ResponseAction,
    tx: oneshot::Sender<Result<HttpResponse>>,
}

impl PendingRequest {
    pub(crate) fn complete(self, result: Result<HttpResponse>) {
        // receiver is gone when the caller cancelled
        let _ = self.tx.send(result);
    }
}

#[derive(Default)]
pub(crate) struct PendingQueue {
    queue: VecDeque<PendingRequest>,
    closed: Option<String>,
}

impl PendingQueue {
    /// Queue a slot for the next request written to the wire
    pub(crate) fn register(
        &mut self,
        action: ResponseAction,
    ) -> Result<oneshot::Receiver<Result<HttpResponse>>> {
        if let Some(reason) = &self.closed {
            return Err(HomeKitError::connection_lost(reason.clone()));
        }
        let (tx, rx) = oneshot::channel();
        self.queue.push_back(PendingRequest { action, tx });
        Ok(rx)
    }

    pub(crate) fn pop(&mut self) -> Option<PendingRequest> {
        self.queue.pop_front()
    }

    /// Fail every waiting request and refuse new ones
    ///
    /// Waiters see `Decryption` when an inbound frame failed authentication and
    /// `ConnectionLost` otherwise.
    pub(crate) fn close(&mut self, reason: DisconnectReason) {
        let message = format!("session closed ({reason:?})");
        for request in self.queue.drain(..) {
            let error = match reason {
                DisconnectReason::DecryptionFailed => HomeKitError::Decryption {
                    message: "inbound frame failed authentication".to_string(),
                },
                _ => HomeKitError::connection_lost(message.clone()),
            };
            request.complete(Err(error));
        }
        self.closed = Some(message);
    }

    #[cfg(test)]
    pub(crate) fn is_closed(&self) -> bool {
        self.closed.is_some()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.queue.len()
    }
}
