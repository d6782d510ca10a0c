#![forbid(unsafe_code)]
#![warn(unused, missing_debug_implementations, rust_2018_idioms)]

//! Broker B adapter (§4.5): a length-prefixed MessagePack socket protocol
//! wrapped in the shared [`janus_gateway::BrokerGateway`] contract. The
//! socket itself is owned by a dedicated [`engine::Engine`] task; this crate
//! never touches the wire from a caller's stack.

mod adapter;
mod engine;
mod error;
mod framing;
mod mapping;
mod protocol;

pub use adapter::BrokerBAdapter;
pub use error::BrokerBError;
