//! Failure modes for the RPC service itself, distinct from the domain
//! errors `{code, message}`-wrapped onto the wire (§7 "RPC wraps all core
//! errors").

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("zmq error: {0}")]
    Zmq(#[from] zmq::Error),

    #[error("failed to encode RPC message: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("failed to decode RPC message: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
}
