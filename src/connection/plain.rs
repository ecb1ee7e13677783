//! Plaintext HTTP exchanges used before the session is encrypted

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::error::{HomeKitError, Result};
use crate::protocol::http::{HttpCodec, HttpRequest, HttpResponse};
use crate::protocol::pairing::{
    PairVerify, PairingCredential, PairingStepResult, SessionKeys,
};
use crate::types::SessionConfig;

/// Paths of the pairing endpoints
pub(crate) mod paths {
    pub const PAIR_SETUP: &str = "/pair-setup";
    pub const PAIR_VERIFY: &str = "/pair-verify";
    pub const PAIRINGS: &str = "/pairings";
}

/// Unencrypted request/response channel over a fresh TCP connection
pub(crate) struct PlainChannel {
    stream: TcpStream,
    codec: HttpCodec,
    host: String,
    user_agent: String,
    timeout: Duration,
}

impl PlainChannel {
    pub(crate) fn new(stream: TcpStream, address: SocketAddr, config: &SessionConfig) -> Self {
        Self {
            stream,
            codec: HttpCodec::new().with_max_size(config.max_message_size),
            host: address.to_string(),
            user_agent: config.user_agent.clone(),
            timeout: config.handshake_timeout,
        }
    }

    /// POST a TLV body and return the accessory's TLV reply
    ///
    /// Pairing failures travel as error items inside the TLV, so any reply with a body
    /// is handed back for the state machine to judge.
    pub(crate) async fn post_tlv(&mut self, path: &str, body: Vec<u8>) -> Result<Vec<u8>> {
        let request = HttpRequest::post(path)
            .host(&self.host)
            .user_agent(&self.user_agent)
            .body_tlv(body)
            .build();
        tracing::debug!(">> POST {} ({} bytes)", path, request.body.len());

        let response = tokio::time::timeout(self.timeout, self.round_trip(&request))
            .await
            .map_err(|_| HomeKitError::Timeout {
                operation: "pairing exchange",
                duration: self.timeout,
            })??;
        tracing::debug!(
            "<< {} {} ({} bytes)",
            response.status.as_u16(),
            path,
            response.body.len()
        );

        if !response.is_success() && response.body.is_empty() {
            return Err(HomeKitError::Status {
                status: response.status.as_u16(),
                hap_status: None,
            });
        }
        Ok(response.body)
    }

    async fn round_trip(&mut self, request: &HttpRequest) -> Result<HttpResponse> {
        self.stream.write_all(&request.encode()).await?;

        let mut buf = [0u8; 4096];
        loop {
            if let Some(response) = self.codec.decode()? {
                return Ok(response);
            }
            let n = self.stream.read(&mut buf).await?;
            if n == 0 {
                return Err(HomeKitError::connection_lost(
                    "accessory closed the connection during pairing",
                ));
            }
            self.codec.feed(&buf[..n])?;
        }
    }

    /// Hand the socket over to the encrypted session
    pub(crate) fn into_stream(self) -> Result<TcpStream> {
        if self.codec.buffered_len() > 0 {
            return Err(HomeKitError::protocol(
                "accessory sent unexpected plaintext after pairing",
            ));
        }
        Ok(self.stream)
    }
}

/// Run pair-verify and return the session keys
pub(crate) async fn pair_verify(
    channel: &mut PlainChannel,
    credential: &PairingCredential,
) -> Result<SessionKeys> {
    let mut verify = PairVerify::new(credential)?;
    let mut reply: Option<Vec<u8>> = None;

    loop {
        match verify.step(reply.as_deref())? {
            PairingStepResult::SendData(body) => {
                reply = Some(channel.post_tlv(paths::PAIR_VERIFY, body).await?);
            }
            PairingStepResult::Complete(keys) => {
                tracing::info!("Pair-verify with {} complete", credential.accessory_id);
                return Ok(keys);
            }
        }
    }
}
