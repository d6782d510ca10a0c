//! Wire protocol for the broker-B socket connection: length-prefixed
//! MessagePack frames over TCP (§4.5). Each outbound request carries a
//! `reqid`; most inbound replies echo it back so the engine can route the
//! reply to whichever pending request or subscription owns it.

use serde::{Deserialize, Serialize};

/// A tick field tag, mirroring the partial-field callbacks §4.5 describes
/// (`tickPrice`, `tickSize`, `tickString(LAST_TIMESTAMP)`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TickField {
    Bid,
    Ask,
    Last,
    BidSize,
    AskSize,
    Volume,
    LastTimestamp,
}

/// A message sent to the broker over the socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OutboundMessage {
    ReqContractDetails {
        reqid: i64,
        symbol: String,
        exchange: String,
        currency: String,
        security_type: String,
    },
    ReqMktData {
        reqid: i64,
        symbol: String,
    },
    CancelMktData {
        reqid: i64,
    },
    PlaceOrder {
        order_id: i64,
        conid: i64,
        side: WireSide,
        order_type: WireOrderType,
        qty: rust_decimal::Decimal,
        limit_price: Option<rust_decimal::Decimal>,
        stop_price: Option<rust_decimal::Decimal>,
        tif: WireTif,
    },
    CancelOrder {
        order_id: i64,
    },
    ReqAccountUpdates,
    ReqPositions,
    ReqOpenOrders,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WireSide {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WireOrderType {
    Mkt,
    Lmt,
    Stp,
    StpLmt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WireTif {
    Day,
    Gtc,
}

/// Broker-reported order state, mapped by the engine per §4.5's status
/// table. Kept distinct from [`janus_core::data::OrderStatus`] because the
/// wire vocabulary is broker-specific and the mapping table is the
/// adapter's job, not the core's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WireOrderStatus {
    Submitted,
    PreSubmitted,
    Filled,
    Cancelled,
    ApiCancelled,
    Inactive,
    /// Any status value not in the documented mapping table (§4.5: "Only
    /// status values in the documented mapping table transition the
    /// order; unknown statuses leave the status unchanged and log once").
    Unknown(String),
}

/// A message received from the broker over the socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum InboundMessage {
    ContractDetails {
        reqid: i64,
        conid: i64,
        description: String,
    },
    ContractDetailsEnd {
        reqid: i64,
    },
    TickPrice {
        reqid: i64,
        field: TickField,
        price: rust_decimal::Decimal,
    },
    TickSize {
        reqid: i64,
        field: TickField,
        size: rust_decimal::Decimal,
    },
    TickString {
        reqid: i64,
        field: TickField,
        value: String,
    },
    OrderStatus {
        order_id: i64,
        status: WireOrderStatus,
        traded: rust_decimal::Decimal,
    },
    OpenOrder {
        order_id: i64,
        conid: i64,
        exchange: String,
        side: WireSide,
        order_type: WireOrderType,
        qty: rust_decimal::Decimal,
        limit_price: Option<rust_decimal::Decimal>,
        stop_price: Option<rust_decimal::Decimal>,
        tif: WireTif,
    },
    ExecDetails {
        order_id: i64,
        exec_id: String,
        price: rust_decimal::Decimal,
        qty: rust_decimal::Decimal,
    },
    Position {
        account: String,
        symbol: String,
        qty: rust_decimal::Decimal,
        avg_cost: rust_decimal::Decimal,
    },
    AccountValue {
        account: String,
        key: String,
        value: rust_decimal::Decimal,
        currency: String,
    },
    /// Informational or fatal error codes. `is_data_farm_connected` marks
    /// the broker-emitted "data farm connected" sentinel that also
    /// triggers resubscribe (§4.5 reconnection).
    Error {
        code: i32,
        message: String,
        is_data_farm_connected: bool,
    },
}

pub(crate) fn encode(message: &OutboundMessage) -> std::io::Result<Vec<u8>> {
    rmp_serde::to_vec(message)
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))
}

pub(crate) fn decode(bytes: &[u8]) -> std::io::Result<InboundMessage> {
    rmp_serde::from_slice(bytes)
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))
}
