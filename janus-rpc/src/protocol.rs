//! Wire shapes for the REQ/REP and PUB/SUB sockets (§6): MessagePack frames,
//! the same encoding `janus-broker-b` uses over its socket, since both are
//! "serialize a tagged enum, ship it as bytes" problems.

use janus_core::data::OrderIntent;
use janus_core::error::WireError;
use serde::{Deserialize, Serialize};

/// One request/reply call (§6 "RPC surface"). `reqid` lets a client pipeline
/// multiple outstanding calls over a single REQ socket's strict
/// request-reply cadence by fencing retried requests after a timeout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    pub reqid: u64,
    pub call: RpcCall,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RpcCall {
    SendOrderIntent(OrderIntent),
    CancelOrder {
        vt_orderid: String,
    },
    Sync,
    Harmony,
    SubscribeBars {
        symbols: Vec<String>,
        account_alias: String,
        use_rth: bool,
    },
    UnsubscribeBars {
        symbols: Vec<String>,
        account_alias: String,
    },
    BrokerList,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    pub reqid: u64,
    pub result: RpcResult,
}

/// One broker kind + alias entry in a `broker_list()` reply (§11
/// supplement: "default marker").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerListEntry {
    pub account_alias: String,
    pub broker_kind: &'static str,
    pub is_default: bool,
}

/// A per-broker-kind harmony breakdown, mirrored onto the wire from
/// [`janus_gateway::BrokerBreakdown`] since that type is not itself
/// `Serialize` (it has no reason to be, outside this boundary).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireBrokerBreakdown {
    pub filled: u32,
    pub skipped_ambiguous: u32,
    pub skipped_no_match: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WireHarmonySummary {
    pub filled: u32,
    pub skipped_ambiguous: u32,
    pub skipped_no_match: u32,
    pub errors: u32,
    pub per_broker: std::collections::HashMap<String, WireBrokerBreakdown>,
}

impl From<janus_gateway::HarmonySummary> for WireHarmonySummary {
    fn from(summary: janus_gateway::HarmonySummary) -> Self {
        Self {
            filled: summary.filled,
            skipped_ambiguous: summary.skipped_ambiguous,
            skipped_no_match: summary.skipped_no_match,
            errors: summary.errors,
            per_broker: summary
                .per_broker
                .into_iter()
                .map(|(kind, breakdown)| {
                    (
                        kind.to_string(),
                        WireBrokerBreakdown {
                            filled: breakdown.filled,
                            skipped_ambiguous: breakdown.skipped_ambiguous,
                            skipped_no_match: breakdown.skipped_no_match,
                        },
                    )
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RpcResult {
    OrderAck { vt_orderid: String },
    Ack,
    Harmony(WireHarmonySummary),
    BrokerList(Vec<BrokerListEntry>),
    Error(WireError),
}

/// Encodes a value to MessagePack bytes for the REQ/REP or PUB socket.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, rmp_serde::encode::Error> {
    rmp_serde::to_vec(value)
}

/// Decodes MessagePack bytes back into a value.
pub fn decode<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T, rmp_serde::decode::Error> {
    rmp_serde::from_slice(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use janus_core::data::{IntentSide, OrderType, TimeInForce};
    use rust_decimal_macros::dec;

    #[test]
    fn request_round_trips_through_msgpack() {
        let request = RpcRequest {
            reqid: 42,
            call: RpcCall::SendOrderIntent(OrderIntent {
                account_alias: "ib_main".to_string(),
                symbol: "AAPL".to_string(),
                side: IntentSide::Buy,
                order_type: OrderType::Limit,
                qty: dec!(100),
                limit_price: Some(dec!(190.5)),
                stop_price: None,
                tif: TimeInForce::Day,
            }),
        };
        let bytes = encode(&request).unwrap();
        let decoded: RpcRequest = decode(&bytes).unwrap();
        assert_eq!(decoded.reqid, 42);
        assert!(matches!(decoded.call, RpcCall::SendOrderIntent(_)));
    }

    #[test]
    fn broker_list_round_trips() {
        let response = RpcResponse {
            reqid: 7,
            result: RpcResult::BrokerList(vec![BrokerListEntry {
                account_alias: "ib_main".to_string(),
                broker_kind: "broker_b",
                is_default: true,
            }]),
        };
        let bytes = encode(&response).unwrap();
        let decoded: RpcResponse = decode(&bytes).unwrap();
        match decoded.result {
            RpcResult::BrokerList(entries) => {
                assert_eq!(entries.len(), 1);
                assert!(entries[0].is_default);
            }
            _ => panic!("expected BrokerList"),
        }
    }
}
