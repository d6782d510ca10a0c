//! Shutdown traits for components that need an orderly stop sequence (§5).
//!
//! The server's shutdown sequence (stop accepting RPC requests, stop the
//! EventBus, signal streaming threads, cancel the broker-B loop, close
//! sockets, join threads) composes these: synchronous components implement
//! [`SyncShutdown`], components that need to await something (draining a
//! queue, joining a task) implement [`AsyncShutdown`].

use serde::{Deserialize, Serialize};
use std::future::Future;

pub trait SyncShutdown {
    type Result;
    fn shutdown(&mut self) -> Self::Result;
}

pub trait AsyncShutdown {
    type Result;
    fn shutdown(&mut self) -> impl Future<Output = Self::Result> + Send;
}

/// Marker event carried on the EventBus to signal that a graceful shutdown
/// has begun, so subscribers can stop scheduling new work without needing a
/// second out-of-band channel.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Deserialize, Serialize)]
pub struct Shutdown;
