use serde::Serialize;

use super::{Headers, Method, content_type, headers::names};

/// An HTTP request message
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    /// Path and query, e.g. `/characteristics?id=1.9`
    pub path: String,
    pub headers: Headers,
    pub body: Vec<u8>,
}

impl HttpRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: Headers::new(),
            body: Vec::new(),
        }
    }

    pub fn builder(method: Method, path: impl Into<String>) -> HttpRequestBuilder {
        HttpRequestBuilder::new(method, path)
    }

    pub fn get(path: impl Into<String>) -> HttpRequestBuilder {
        Self::builder(Method::Get, path)
    }

    pub fn put(path: impl Into<String>) -> HttpRequestBuilder {
        Self::builder(Method::Put, path)
    }

    pub fn post(path: impl Into<String>) -> HttpRequestBuilder {
        Self::builder(Method::Post, path)
    }

    /// Path without the query string
    #[must_use]
    pub fn route(&self) -> &str {
        self.path.split_once('?').map_or(&self.path, |(route, _)| route)
    }

    /// Value of a query parameter
    #[must_use]
    pub fn query(&self, key: &str) -> Option<&str> {
        let (_, query) = self.path.split_once('?')?;
        query
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v)
    }

    /// Encode to wire bytes
    ///
    /// `Content-Length` is always written for requests that carry a body or may carry
    /// one (`PUT`/`POST`).
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut output = Vec::with_capacity(256 + self.body.len());

        output.extend_from_slice(self.method.as_str().as_bytes());
        output.push(b' ');
        output.extend_from_slice(self.path.as_bytes());
        output.extend_from_slice(b" HTTP/1.1\r\n");

        self.headers.encode_into(&mut output);

        if (!self.body.is_empty() || matches!(self.method, Method::Put | Method::Post))
            && !self.headers.contains(names::CONTENT_LENGTH)
        {
            let len_header = format!("{}: {}\r\n", names::CONTENT_LENGTH, self.body.len());
            output.extend_from_slice(len_header.as_bytes());
        }

        output.extend_from_slice(b"\r\n");
        output.extend_from_slice(&self.body);
        output
    }
}

/// Builder for HTTP requests
#[derive(Debug)]
pub struct HttpRequestBuilder {
    request: HttpRequest,
}

impl HttpRequestBuilder {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            request: HttpRequest::new(method, path),
        }
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.request.headers.insert(name, value);
        self
    }

    #[must_use]
    pub fn host(self, host: &str) -> Self {
        self.header(names::HOST, host)
    }

    #[must_use]
    pub fn content_type(self, content_type: &str) -> Self {
        self.header(names::CONTENT_TYPE, content_type)
    }

    #[must_use]
    pub fn user_agent(self, agent: &str) -> Self {
        self.header(names::USER_AGENT, agent)
    }

    #[must_use]
    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.request.body = body;
        self
    }

    /// Pairing TLV body
    #[must_use]
    pub fn body_tlv(self, body: Vec<u8>) -> Self {
        self.content_type(content_type::PAIRING_TLV8).body(body)
    }

    /// HAP JSON body
    ///
    /// # Errors
    ///
    /// Returns the serializer error if `value` cannot be represented as JSON.
    pub fn body_json<T: Serialize>(self, value: &T) -> Result<Self, serde_json::Error> {
        let body = serde_json::to_vec(value)?;
        Ok(self.content_type(content_type::HAP_JSON).body(body))
    }

    #[must_use]
    pub fn build(self) -> HttpRequest {
        self.request
    }
}
