//! Protocol module

#![allow(missing_docs)]

pub mod crypto;
pub mod http;
pub mod pairing;
