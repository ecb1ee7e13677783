//! Accessory-side codec: parses requests, the mirror image of [`HttpCodec`](super::HttpCodec)

use std::str;

use bytes::BytesMut;

use super::codec::{HttpCodecError, parse_header_block};
use super::{HttpRequest, Method};

/// Maximum header section size (64 KB)
const MAX_HEADER_SIZE: usize = 64 * 1024;

/// Sans-IO request parser
///
/// Only `Content-Length` bodies are accepted; controllers never send chunked requests.
pub struct HttpServerCodec {
    buffer: BytesMut,
    max_body: usize,
}

impl HttpServerCodec {
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
            max_body: 1024 * 1024,
        }
    }

    /// Feed bytes into the internal buffer
    pub fn feed(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    #[must_use]
    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }

    /// Attempt to decode one complete request
    ///
    /// # Errors
    ///
    /// Returns `HttpCodecError` if the request is malformed.
    pub fn decode(&mut self) -> Result<Option<HttpRequest>, HttpCodecError> {
        let Some(header_end) = self.buffer.windows(4).position(|w| w == b"\r\n\r\n") else {
            if self.buffer.len() > MAX_HEADER_SIZE {
                return Err(HttpCodecError::InvalidHeader("headers too large".into()));
            }
            return Ok(None);
        };

        let header_str = str::from_utf8(&self.buffer[..header_end])
            .map_err(|_| HttpCodecError::InvalidHeader("invalid UTF-8".into()))?;
        let (request_line, header_block) = header_str.split_once("\r\n").unwrap_or((header_str, ""));
        let (method, path) = parse_request_line(request_line)?;
        let headers = parse_header_block(header_block)?;

        let content_length = headers
            .content_length()
            .transpose()
            .map_err(|_| HttpCodecError::InvalidContentLength)?
            .unwrap_or(0);
        if content_length > self.max_body {
            return Err(HttpCodecError::MessageTooLarge {
                size: content_length,
                max: self.max_body,
            });
        }

        let total_size = header_end + 4 + content_length;
        if self.buffer.len() < total_size {
            return Ok(None);
        }

        let _ = self.buffer.split_to(header_end + 4);
        let body = self.buffer.split_to(content_length).to_vec();

        Ok(Some(HttpRequest {
            method,
            path,
            headers,
            body,
        }))
    }
}

impl Default for HttpServerCodec {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_request_line(line: &str) -> Result<(Method, String), HttpCodecError> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    let [method, path, version] = parts.as_slice() else {
        return Err(HttpCodecError::InvalidRequestLine(line.to_string()));
    };
    if !version.starts_with("HTTP/") {
        return Err(HttpCodecError::InvalidRequestLine(line.to_string()));
    }
    let method = method
        .parse::<Method>()
        .map_err(|()| HttpCodecError::InvalidMethod((*method).to_string()))?;
    Ok((method, (*path).to_string()))
}
