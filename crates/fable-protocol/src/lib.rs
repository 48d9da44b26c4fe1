//! fable-protocol: Wire protocol for the conversation stream API
//!
//! This crate covers the network-facing half of the conversation client:
//! typed stream events, server-sent event frame decoding, and the HTTP
//! client for the streaming send endpoint and the out-of-band scene
//! generation endpoint.

pub mod client;
pub mod decoder;
pub mod error;
pub mod events;
pub mod types;

pub use client::ApiClient;
pub use decoder::EventStream;
pub use error::{Error, Result};
pub use events::StreamEvent;
pub use types::*;
