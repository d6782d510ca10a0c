#![forbid(unsafe_code)]
#![warn(unused, missing_debug_implementations, rust_2018_idioms)]

//! Broker A adapter (§4.6): a synchronous HTTP SDK dispatched on a worker
//! pool via [`tokio::task::spawn_blocking`], paired with a gRPC
//! trade-events stream per account that drives
//! [`state_machine::StreamStateMachine`] and folds order-status payloads
//! into the shared [`BrokerGateway`] contract (`janus-gateway`).

mod adapter;
mod error;
mod grpc;
mod http;
mod mapping;
mod pb;
mod state_machine;
mod stream;

pub use adapter::{BrokerAAdapter, TradeEventsSettings};
pub use error::BrokerAError;
