//! Wire shapes for the trade-events gRPC stream (§4.6). Hand-authored rather
//! than `.proto`-generated: the message is small and stable enough that a
//! manual `prost::Message` derive is simpler than wiring a `build.rs`
//! codegen step for two messages.

use prost::Message;

#[derive(Clone, PartialEq, Message)]
pub struct SubscribeTradeEventsRequest {
    #[prost(string, tag = "1")]
    pub account_alias: String,
    #[prost(string, tag = "2")]
    pub region_id: String,
}

/// One trade-event payload as broker A's stream emits it. Every field is a
/// string because the upstream wire format is loosely typed JSON-over-gRPC;
/// the adapter parses these into domain types at the boundary (§9 "dynamic
/// payloads -> tagged variants").
#[derive(Clone, PartialEq, Message)]
pub struct TradeEventPayload {
    #[prost(string, tag = "1")]
    pub event_type: String,
    #[prost(string, tag = "2")]
    pub subscribe_type: String,
    #[prost(string, tag = "3")]
    pub scene_type: String,
    #[prost(string, tag = "4")]
    pub order_status: String,
    #[prost(string, tag = "5")]
    pub order_id: String,
    #[prost(string, tag = "6")]
    pub client_order_id: String,
    #[prost(string, tag = "7")]
    pub symbol: String,
    #[prost(string, tag = "8")]
    pub side: String,
    #[prost(string, tag = "9")]
    pub qty: String,
    #[prost(string, tag = "10")]
    pub filled_qty: String,
    #[prost(string, tag = "11")]
    pub price: String,
    #[prost(bool, tag = "12")]
    pub is_ping: bool,
    #[prost(bool, tag = "13")]
    pub is_subscribe_success: bool,
    /// Non-empty for `AuthError`/`NumOfConnExceed`/`SubscribeExpired`-style
    /// stream-level notices that aren't order events at all.
    #[prost(string, tag = "14")]
    pub stream_notice: String,
}
