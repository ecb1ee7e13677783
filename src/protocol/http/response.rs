use serde::de::DeserializeOwned;

use super::{Headers, headers::names};

/// Protocol token of pushed events
pub const EVENT_VERSION: &str = "EVENT/1.0";
/// Protocol token of ordinary responses
pub const HTTP_VERSION: &str = "HTTP/1.1";

/// HTTP status code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusCode(pub u16);

impl StatusCode {
    pub const OK: StatusCode = StatusCode(200);
    pub const NO_CONTENT: StatusCode = StatusCode(204);
    pub const MULTI_STATUS: StatusCode = StatusCode(207);
    pub const BAD_REQUEST: StatusCode = StatusCode(400);
    pub const NOT_FOUND: StatusCode = StatusCode(404);
    pub const METHOD_NOT_ALLOWED: StatusCode = StatusCode(405);
    pub const UNPROCESSABLE_ENTITY: StatusCode = StatusCode(422);
    pub const CONNECTION_AUTHORIZATION_REQUIRED: StatusCode = StatusCode(470);
    pub const INTERNAL_ERROR: StatusCode = StatusCode(500);
    pub const SERVICE_UNAVAILABLE: StatusCode = StatusCode(503);

    /// Check if this is a success status (2xx)
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.0 >= 200 && self.0 < 300
    }

    #[must_use]
    pub fn as_u16(&self) -> u16 {
        self.0
    }

    /// Reason phrase used when encoding
    #[must_use]
    pub fn canonical_reason(&self) -> &'static str {
        match self.0 {
            200 => "OK",
            204 => "No Content",
            207 => "Multi-Status",
            400 => "Bad Request",
            404 => "Not Found",
            405 => "Method Not Allowed",
            422 => "Unprocessable Entity",
            470 => "Connection Authorization Required",
            500 => "Internal Server Error",
            503 => "Service Unavailable",
            _ => "",
        }
    }
}

/// A response or pushed event
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// `HTTP/1.1` or `EVENT/1.0`
    pub version: String,
    pub status: StatusCode,
    pub reason: String,
    pub headers: Headers,
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Response with the canonical reason phrase and no body
    #[must_use]
    pub fn new(status: StatusCode) -> Self {
        Self {
            version: HTTP_VERSION.to_string(),
            status,
            reason: status.canonical_reason().to_string(),
            headers: Headers::new(),
            body: Vec::new(),
        }
    }

    /// Unsolicited `EVENT/1.0 200 OK` carrying a HAP JSON body
    #[must_use]
    pub fn event(body: Vec<u8>) -> Self {
        let mut event = Self::new(StatusCode::OK)
            .with_body(super::content_type::HAP_JSON, body);
        event.version = EVENT_VERSION.to_string();
        event
    }

    #[must_use]
    pub fn with_body(mut self, content_type: &str, body: Vec<u8>) -> Self {
        self.headers.insert(names::CONTENT_TYPE, content_type);
        self.body = body;
        self
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Whether this is an unsolicited event rather than a response
    #[must_use]
    pub fn is_event(&self) -> bool {
        self.version.eq_ignore_ascii_case(EVENT_VERSION)
    }

    /// Decode the body as JSON
    ///
    /// # Errors
    ///
    /// Returns the JSON error if the body does not match `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    /// Encode with a `Content-Length` header
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut output = Vec::with_capacity(128 + self.body.len());
        output.extend_from_slice(
            format!("{} {} {}\r\n", self.version, self.status.0, self.reason).as_bytes(),
        );
        self.headers.encode_into(&mut output);
        if !self.headers.contains(names::CONTENT_LENGTH) {
            output.extend_from_slice(
                format!("{}: {}\r\n", names::CONTENT_LENGTH, self.body.len()).as_bytes(),
            );
        }
        output.extend_from_slice(b"\r\n");
        output.extend_from_slice(&self.body);
        output
    }
}
