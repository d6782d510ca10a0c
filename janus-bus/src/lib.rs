#![forbid(unsafe_code)]
#![warn(unused, missing_debug_implementations, rust_2018_idioms)]

//! # Janus EventBus
//!
//! Single queue serving ordered, typed events (§4.2) from broker callbacks
//! to subscribers: the OMS cache, the RPC publisher, and anything else that
//! wants a live view of the server's state. Producers never block; the
//! worker is the only thread that dispatches, so subscribers see a strict
//! FIFO order per producer.

mod bus;
mod event;

pub use bus::{EventBus, DEFAULT_TICK_QUEUE_CAPACITY, DEFAULT_TIMER_CADENCE};
pub use event::{Event, LogEvent, LogLevel, Topic};
