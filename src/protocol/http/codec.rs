use bytes::{Buf, BytesMut};
use thiserror::Error;

use super::{Headers, HttpResponse, StatusCode};

/// Errors while parsing HTTP messages
#[derive(Debug, Error)]
pub enum HttpCodecError {
    #[error("invalid status line: {0}")]
    InvalidStatusLine(String),

    #[error("invalid request line: {0}")]
    InvalidRequestLine(String),

    #[error("invalid method: {0}")]
    InvalidMethod(String),

    #[error("invalid header: {0}")]
    InvalidHeader(String),

    #[error("invalid content length")]
    InvalidContentLength,

    #[error("invalid chunk: {0}")]
    InvalidChunk(String),

    #[error("message too large: {size} > {max} bytes")]
    MessageTooLarge { size: usize, max: usize },
}

/// Whether a message answers a request or was pushed by the accessory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// `HTTP/1.1` response, owned by the oldest waiting request
    Response,
    /// `EVENT/1.0` push
    Event,
}

/// Status line of the message being parsed
#[derive(Debug, Clone)]
struct Head {
    kind: MessageKind,
    version: String,
    status: StatusCode,
    reason: String,
}

#[derive(Debug)]
enum ParseState {
    StatusLine,
    Headers(Head),
    Body {
        head: Head,
        headers: Headers,
        content_length: usize,
    },
    ChunkSize {
        head: Head,
        headers: Headers,
        body: Vec<u8>,
    },
    ChunkData {
        head: Head,
        headers: Headers,
        body: Vec<u8>,
        remaining: usize,
    },
    Trailers {
        head: Head,
        headers: Headers,
        body: Vec<u8>,
    },
}

/// Sans-IO codec for responses and `EVENT/1.0` pushes
///
/// Feed decrypted bytes with `feed()`, then call `decode()` until it returns `None`.
/// Bodies are delimited by `Content-Length` or chunked transfer coding; a message with
/// neither has an empty body.
pub struct HttpCodec {
    buffer: BytesMut,
    max_size: usize,
    state: ParseState,
    /// Kind of the message whose status line has been read
    current: Option<MessageKind>,
}

impl HttpCodec {
    /// Create a new codec (1 MiB message limit)
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
            max_size: 1024 * 1024,
            state: ParseState::StatusLine,
            current: None,
        }
    }

    /// Set maximum message size
    #[must_use]
    pub fn with_max_size(mut self, size: usize) -> Self {
        self.max_size = size;
        self
    }

    /// Feed bytes into the codec
    ///
    /// # Errors
    ///
    /// Returns `HttpCodecError::MessageTooLarge` if the buffer would exceed the limit.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<(), HttpCodecError> {
        let size = self.buffer.len() + bytes.len();
        if size > self.max_size {
            return Err(HttpCodecError::MessageTooLarge {
                size,
                max: self.max_size,
            });
        }
        self.buffer.extend_from_slice(bytes);
        Ok(())
    }

    /// Try to decode one complete message
    ///
    /// Returns `Ok(None)` if more data is needed. After an error call
    /// [`skip_malformed`](Self::skip_malformed) or `reset()` before decoding again.
    ///
    /// # Errors
    ///
    /// Returns `HttpCodecError` if the message is malformed or too large.
    pub fn decode(&mut self) -> Result<Option<HttpResponse>, HttpCodecError> {
        loop {
            let state = std::mem::replace(&mut self.state, ParseState::StatusLine);
            match self.step(state)? {
                Step::Continue(next) => self.state = next,
                Step::NeedMore(current) => {
                    self.state = current;
                    return Ok(None);
                }
                Step::Done(response) => {
                    self.current = None;
                    return Ok(Some(response));
                }
            }
        }
    }

    /// Clear the buffer and reset state
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.state = ParseState::StatusLine;
        self.current = None;
    }

    /// Abandon the message that failed to decode
    ///
    /// Drops buffered bytes up to the next line that starts a message; a following
    /// message already in the buffer is kept. Returns the kind of the abandoned message
    /// if its status line had been read.
    pub fn skip_malformed(&mut self) -> Option<MessageKind> {
        self.state = ParseState::StatusLine;
        match next_message_start(&self.buffer) {
            Some(start) => self.buffer.advance(start),
            None => self.buffer.clear(),
        }
        self.current.take()
    }

    #[must_use]
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    fn step(&mut self, state: ParseState) -> Result<Step, HttpCodecError> {
        Ok(match state {
            ParseState::StatusLine => match self.take_line() {
                Some(line) => {
                    let head = parse_status_line(&line)?;
                    self.current = Some(head.kind);
                    Step::Continue(ParseState::Headers(head))
                }
                None => Step::NeedMore(ParseState::StatusLine),
            },

            ParseState::Headers(head) => match self.take_headers()? {
                Some(headers) => self.body_state(head, headers)?,
                None => Step::NeedMore(ParseState::Headers(head)),
            },

            ParseState::Body {
                head,
                headers,
                content_length,
            } => {
                if self.buffer.len() >= content_length {
                    let body = self.buffer.split_to(content_length).to_vec();
                    Step::Done(finish(head, headers, body))
                } else {
                    Step::NeedMore(ParseState::Body {
                        head,
                        headers,
                        content_length,
                    })
                }
            }

            ParseState::ChunkSize {
                head,
                headers,
                body,
            } => match self.take_line() {
                Some(line) => {
                    let size = parse_chunk_size(&line)?;
                    let total = body.len().checked_add(size).unwrap_or(usize::MAX);
                    if total > self.max_size {
                        return Err(HttpCodecError::MessageTooLarge {
                            size: total,
                            max: self.max_size,
                        });
                    }
                    if size == 0 {
                        Step::Continue(ParseState::Trailers {
                            head,
                            headers,
                            body,
                        })
                    } else {
                        Step::Continue(ParseState::ChunkData {
                            head,
                            headers,
                            body,
                            remaining: size,
                        })
                    }
                }
                None => Step::NeedMore(ParseState::ChunkSize {
                    head,
                    headers,
                    body,
                }),
            },

            ParseState::ChunkData {
                head,
                headers,
                mut body,
                remaining,
            } => {
                if self.buffer.len() < remaining + 2 {
                    return Ok(Step::NeedMore(ParseState::ChunkData {
                        head,
                        headers,
                        body,
                        remaining,
                    }));
                }
                body.extend_from_slice(&self.buffer[..remaining]);
                if &self.buffer[remaining..remaining + 2] != b"\r\n" {
                    return Err(HttpCodecError::InvalidChunk(
                        "chunk data not terminated by CRLF".to_string(),
                    ));
                }
                self.buffer.advance(remaining + 2);
                Step::Continue(ParseState::ChunkSize {
                    head,
                    headers,
                    body,
                })
            }

            ParseState::Trailers {
                head,
                headers,
                body,
            } => match self.take_line() {
                Some(line) if line.is_empty() => Step::Done(finish(head, headers, body)),
                Some(_) => Step::Continue(ParseState::Trailers {
                    head,
                    headers,
                    body,
                }),
                None => Step::NeedMore(ParseState::Trailers {
                    head,
                    headers,
                    body,
                }),
            },
        })
    }

    fn body_state(&self, head: Head, headers: Headers) -> Result<Step, HttpCodecError> {
        if headers.is_chunked() {
            return Ok(Step::Continue(ParseState::ChunkSize {
                head,
                headers,
                body: Vec::new(),
            }));
        }

        let content_length = headers
            .content_length()
            .transpose()
            .map_err(|_| HttpCodecError::InvalidContentLength)?
            .unwrap_or(0);
        if content_length > self.max_size {
            return Err(HttpCodecError::MessageTooLarge {
                size: content_length,
                max: self.max_size,
            });
        }

        Ok(Step::Continue(ParseState::Body {
            head,
            headers,
            content_length,
        }))
    }

    /// Remove one CRLF-terminated line, without the terminator
    fn take_line(&mut self) -> Option<String> {
        let line_end = self.buffer.windows(2).position(|w| w == b"\r\n")?;
        let line = String::from_utf8_lossy(&self.buffer[..line_end]).into_owned();
        self.buffer.advance(line_end + 2);
        Some(line)
    }

    /// Remove the header block up to and including the blank line
    fn take_headers(&mut self) -> Result<Option<Headers>, HttpCodecError> {
        if self.buffer.starts_with(b"\r\n") {
            self.buffer.advance(2);
            return Ok(Some(Headers::new()));
        }

        let Some(header_end) = self.buffer.windows(4).position(|w| w == b"\r\n\r\n") else {
            return Ok(None);
        };

        let headers = parse_header_block(&String::from_utf8_lossy(&self.buffer[..header_end]))?;
        self.buffer.advance(header_end + 4);
        Ok(Some(headers))
    }
}

impl Default for HttpCodec {
    fn default() -> Self {
        Self::new()
    }
}

enum Step {
    Continue(ParseState),
    NeedMore(ParseState),
    Done(HttpResponse),
}

fn finish(head: Head, headers: Headers, body: Vec<u8>) -> HttpResponse {
    HttpResponse {
        version: head.version,
        status: head.status,
        reason: head.reason,
        headers,
        body,
    }
}

fn parse_status_line(line: &str) -> Result<Head, HttpCodecError> {
    // "HTTP/1.1 200 OK" or "EVENT/1.0 200 OK"
    let invalid = || HttpCodecError::InvalidStatusLine(line.to_string());
    let mut parts = line.splitn(3, ' ');

    let version = parts.next().ok_or_else(invalid)?;
    if !(version.starts_with("HTTP/") || version.starts_with("EVENT/")) {
        return Err(invalid());
    }

    let status = parts
        .next()
        .ok_or_else(invalid)?
        .parse::<u16>()
        .map_err(|_| invalid())?;

    let kind = if version.starts_with("EVENT/") {
        MessageKind::Event
    } else {
        MessageKind::Response
    };

    Ok(Head {
        kind,
        version: version.to_string(),
        status: StatusCode(status),
        reason: parts.next().unwrap_or("").to_string(),
    })
}

pub(super) fn parse_header_block(block: &str) -> Result<Headers, HttpCodecError> {
    let mut headers = Headers::new();
    for line in block.split("\r\n").filter(|l| !l.is_empty()) {
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| HttpCodecError::InvalidHeader(line.to_string()))?;
        headers.insert(name.trim(), value.trim());
    }
    Ok(headers)
}

fn parse_chunk_size(line: &str) -> Result<usize, HttpCodecError> {
    // extensions after ';' are ignored
    let size = line.split(';').next().unwrap_or("").trim();
    usize::from_str_radix(size, 16).map_err(|_| HttpCodecError::InvalidChunk(line.to_string()))
}

/// Offset of the first line that begins a status line
fn next_message_start(buffer: &[u8]) -> Option<usize> {
    let starts_message = |at: usize| {
        buffer[at..].starts_with(b"HTTP/") || buffer[at..].starts_with(b"EVENT/")
    };
    if starts_message(0) {
        return Some(0);
    }
    buffer
        .windows(2)
        .enumerate()
        .filter(|(_, w)| *w == b"\r\n")
        .map(|(i, _)| i + 2)
        .find(|&at| starts_message(at))
}
