//! Network layer: TCP connect and the HAP encrypted transport

pub mod secure;


use std::io;
use std::net::SocketAddr;
use std::time::Duration;

pub use secure::{
    EncryptionError, FrameDecryptor, FrameEncryptor, HapSecureSession, MAX_FRAME_PLAINTEXT,
    read_frame,
};
pub use tokio::net::TcpStream;

/// Connect to the first reachable address, in order
///
/// Each attempt gets the full `timeout`.
///
/// # Errors
///
/// Returns the error of the last attempt, `TimedOut` for an expired attempt, or
/// `InvalidInput` if no address was given.
pub async fn connect_tcp(
    addresses: &[SocketAddr],
    timeout: Duration,
) -> io::Result<(TcpStream, SocketAddr)> {
    let mut last_error = io::Error::new(io::ErrorKind::InvalidInput, "no address to connect to");

    for &address in addresses {
        tracing::debug!("Connecting to {}", address);
        match tokio::time::timeout(timeout, TcpStream::connect(address)).await {
            Ok(Ok(stream)) => {
                stream.set_nodelay(true)?;
                return Ok((stream, address));
            }
            Ok(Err(e)) => {
                tracing::debug!("Connect to {} failed: {}", address, e);
                last_error = e;
            }
            Err(_) => {
                tracing::debug!("Connect to {} timed out", address);
                last_error = io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("connect to {address} timed out"),
                );
            }
        }
    }

    Err(last_error)
}
