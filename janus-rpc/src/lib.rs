#![forbid(unsafe_code)]
#![warn(unused, missing_debug_implementations, rust_2018_idioms)]

//! # Janus RPC
//!
//! The RPC Service (§4.9): a ZeroMQ `REQ`/`REP` socket for the request/reply
//! surface in §6 (`send_order_intent`, `cancel_order`, `sync`, `harmony`,
//! `subscribe_bars`, `unsubscribe_bars`, `broker_list`), and a `PUB` socket
//! that fans out every typed [`janus_bus::Event`] plus a heartbeat.
//!
//! Wire encoding is MessagePack, the same choice `janus-broker-b` makes for
//! its socket protocol. Both sockets are synchronous ZeroMQ primitives, so
//! each runs on its own dedicated OS thread rather than the tokio runtime,
//! following the same "keep blocking I/O off the async path" rule
//! `janus-broker-a::http` applies to its HTTP SDK.

pub mod error;
pub mod protocol;
pub mod publisher;
pub mod server;

pub use error::RpcError;
pub use protocol::{BrokerListEntry, RpcCall, RpcRequest, RpcResponse, RpcResult};
pub use server::RpcServer;
