//! tether-bridge: Typed RPC bridge to the embedding IDE host
//!
//! This crate provides the request/reply wire types, the `Bridge` trait
//! every component calls the host through, and an HTTP implementation
//! with an SSE notification stream.

pub mod client;
pub mod error;
pub mod events;
pub mod types;

pub use client::{Bridge, BridgeExt, HttpBridge};
pub use error::{Error, Result};
pub use events::{HostEvent, HostEventStream, ProgressEvent};
pub use types::*;
