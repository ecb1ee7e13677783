//! Sans-IO HTTP/1.1 message layer for HAP
//!
//! Pairing requests travel as plaintext HTTP; after pair-verify the same messages are
//! carried inside the encrypted transport. Accessories push characteristic changes as
//! `EVENT/1.0` messages on the same stream.

pub mod codec;
pub mod headers;
pub mod request;
pub mod response;
pub mod server_codec;

#[cfg(test)]
mod tests;

pub use codec::{HttpCodec, HttpCodecError, MessageKind};
pub use headers::Headers;
pub use request::{HttpRequest, HttpRequestBuilder};
pub use response::{HttpResponse, StatusCode};
pub use server_codec::HttpServerCodec;

/// Content types used by HAP
pub mod content_type {
    pub const PAIRING_TLV8: &str = "application/pairing+tlv8";
    pub const HAP_JSON: &str = "application/hap+json";
}

/// HTTP methods used by HAP
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Put,
    Post,
    Delete,
}

impl Method {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Put => "PUT",
            Method::Post => "POST",
            Method::Delete => "DELETE",
        }
    }
}

impl std::str::FromStr for Method {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "GET" => Ok(Method::Get),
            "PUT" => Ok(Method::Put),
            "POST" => Ok(Method::Post),
            "DELETE" => Ok(Method::Delete),
            _ => Err(()),
        }
    }
}
