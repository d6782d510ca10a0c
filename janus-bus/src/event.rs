//! Event envelope dispatched on the [`crate::EventBus`] (§4.2).

use chrono::{DateTime, Utc};
use janus_core::data::{AccountData, ContractData, OrderData, PositionData, TickData, TradeData};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Severity for an [`LogEvent`], mirroring `tracing::Level` without pulling
/// a `tracing` dependency into the wire-serializable event shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// A log line surfaced through the event path (§4.9 `eLog` topic), used for
/// operator-facing notices like "stream disconnected" or "ambiguous
/// auto-fill" that a terminal client should be able to display without
/// tailing server-side log files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEvent {
    pub level: LogLevel,
    pub source: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// One of the typed events carried on the bus (§4.2). Payloads are behind
/// `Arc` so fanning out to N subscribers is a refcount bump, never a clone of
/// the underlying value, and no subscriber can mutate what another
/// subscriber sees (§4.2 "subscribers must not mutate event payloads").
#[derive(Debug, Clone)]
pub enum Event {
    Tick(Arc<TickData>),
    Trade(Arc<TradeData>),
    Order(Arc<OrderData>),
    Position(Arc<PositionData>),
    Account(Arc<AccountData>),
    Contract(Arc<ContractData>),
    Log(Arc<LogEvent>),
    Timer(DateTime<Utc>),
}

/// The type-keyed dispatch topic for an [`Event`], independent of the
/// per-symbol tick suffix (§6 "per-symbol suffixed variants").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Topic {
    Tick,
    Trade,
    Order,
    Position,
    Account,
    Contract,
    Log,
    Timer,
}

impl Topic {
    /// Wire name used by the RPC publisher (§6): `eTick`, `eOrder`, ...
    pub fn wire_name(self) -> &'static str {
        match self {
            Self::Tick => "eTick",
            Self::Trade => "eTrade",
            Self::Order => "eOrder",
            Self::Position => "ePosition",
            Self::Account => "eAccount",
            Self::Contract => "eContract",
            Self::Log => "eLog",
            Self::Timer => "eTimer",
        }
    }
}

impl Event {
    pub fn topic(&self) -> Topic {
        match self {
            Self::Tick(_) => Topic::Tick,
            Self::Trade(_) => Topic::Trade,
            Self::Order(_) => Topic::Order,
            Self::Position(_) => Topic::Position,
            Self::Account(_) => Topic::Account,
            Self::Contract(_) => Topic::Contract,
            Self::Log(_) => Topic::Log,
            Self::Timer(_) => Topic::Timer,
        }
    }

    /// The per-symbol suffix topic for a tick event, e.g. `eTick.AAPL.SMART`
    /// (§6). `None` for every other event kind.
    pub fn symbol_topic(&self) -> Option<String> {
        match self {
            Self::Tick(tick) => Some(format!("{}.{}", Topic::Tick.wire_name(), tick.symbol)),
            _ => None,
        }
    }
}
