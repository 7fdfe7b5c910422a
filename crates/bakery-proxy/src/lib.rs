//! bakery-proxy — Host-header reverse proxy for slice traffic.
//!
//! One HTTP/1.1 listener routes every inbound request by its `Host` header:
//! the host is looked up in the store's route table and the request is
//! streamed to the matching upstream port on loopback, with the standard
//! `X-Forwarded-*` chain applied.
//!
//! # Components
//!
//! - **`headers`** — Host normalization and forwarded-header synthesis
//! - **`server`** — accept loop, route lookup, upstream streaming

pub mod headers;
pub mod server;

pub use server::{bind_first_free, RouterProxy};
