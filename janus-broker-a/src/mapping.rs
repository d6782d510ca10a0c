//! Order-id resolution and status mapping for broker A (§4.6).

use crate::pb::TradeEventPayload;
use janus_core::data::OrderStatus;
use rust_decimal::Decimal;
use std::str::FromStr;

/// Resolves the local order id a [`TradeEventPayload`] refers to.
///
/// Priority (§4.6): (1) the payload's own `order_id`; (2) the gateway's
/// `client_order_id -> order_id` map captured at placement time; (3) fall
/// back to the `client_order_id` itself.
pub fn resolve_order_id(
    event: &TradeEventPayload,
    client_order_id_to_order_id: &std::collections::HashMap<String, String>,
) -> String {
    if !event.order_id.is_empty() {
        return event.order_id.clone();
    }
    if let Some(order_id) = client_order_id_to_order_id.get(&event.client_order_id) {
        return order_id.clone();
    }
    event.client_order_id.clone()
}

/// Whether this payload is an order-status event this adapter cares about:
/// `event_type=ORDER` and `subscribe_type=ORDER_STATUS_CHANGED` (§4.6).
pub fn is_order_status_event(event: &TradeEventPayload) -> bool {
    event.event_type == "ORDER" && event.subscribe_type == "ORDER_STATUS_CHANGED"
}

fn parse_decimal(raw: &str) -> Decimal {
    Decimal::from_str(raw).unwrap_or_default()
}

/// Maps a broker-A status payload onto the core's [`OrderStatus`], per §4.6:
/// prefer the explicit `order_status` field, falling back to `scene_type`
/// when it is absent. Returns `None` for values outside both tables (e.g.
/// `MODIFY_SUCCESS`, which preserves whatever status is already cached).
pub fn map_status(event: &TradeEventPayload) -> Option<OrderStatus> {
    let qty = parse_decimal(&event.qty);
    let filled_qty = parse_decimal(&event.filled_qty);

    if !event.order_status.is_empty() {
        return match event.order_status.as_str() {
            "SUBMITTED" => Some(OrderStatus::NotTraded),
            "FILLED" => Some(if filled_qty < qty {
                OrderStatus::PartTraded
            } else {
                OrderStatus::AllTraded
            }),
            "CANCELLED" => Some(OrderStatus::Cancelled),
            "FAILED" => Some(OrderStatus::Rejected),
            _ => None,
        };
    }

    match event.scene_type.as_str() {
        "FILLED" => Some(OrderStatus::PartTraded),
        "FINAL_FILLED" => Some(OrderStatus::AllTraded),
        "PLACE_FAILED" | "MODIFY_FAILED" | "CANCEL_FAILED" => Some(OrderStatus::Rejected),
        "CANCEL_SUCCESS" => Some(OrderStatus::Cancelled),
        // MODIFY_SUCCESS preserves whatever status is already cached.
        _ => None,
    }
}

/// `true` for the stream-level events (§4.6) that schedule a debounced
/// snapshot refresh rather than an order-status merge.
pub fn triggers_refresh(event: &TradeEventPayload) -> bool {
    matches!(
        event.scene_type.as_str(),
        "FILLED" | "FINAL_FILLED" | "CANCEL_SUCCESS"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(order_status: &str, scene_type: &str, qty: &str, filled_qty: &str) -> TradeEventPayload {
        TradeEventPayload {
            event_type: "ORDER".to_string(),
            subscribe_type: "ORDER_STATUS_CHANGED".to_string(),
            scene_type: scene_type.to_string(),
            order_status: order_status.to_string(),
            order_id: String::new(),
            client_order_id: String::new(),
            symbol: String::new(),
            side: String::new(),
            qty: qty.to_string(),
            filled_qty: filled_qty.to_string(),
            price: String::new(),
            is_ping: false,
            is_subscribe_success: false,
            stream_notice: String::new(),
        }
    }

    #[test]
    fn explicit_status_takes_priority_over_scene_type() {
        let status = map_status(&event("FILLED", "FINAL_FILLED", "10", "10")).unwrap();
        assert_eq!(status, OrderStatus::AllTraded);
    }

    #[test]
    fn partial_fill_via_explicit_status() {
        let status = map_status(&event("FILLED", "", "10", "4")).unwrap();
        assert_eq!(status, OrderStatus::PartTraded);
    }

    #[test]
    fn falls_back_to_scene_type_when_order_status_absent() {
        let status = map_status(&event("", "FINAL_FILLED", "10", "10")).unwrap();
        assert_eq!(status, OrderStatus::AllTraded);
    }

    #[test]
    fn modify_success_is_not_a_transition() {
        assert!(map_status(&event("", "MODIFY_SUCCESS", "10", "0")).is_none());
    }

    #[test]
    fn order_id_resolution_prefers_payload_order_id() {
        let mut map = std::collections::HashMap::new();
        map.insert("client-1".to_string(), "server-9".to_string());
        let mut e = event("SUBMITTED", "", "10", "0");
        e.order_id = "server-5".to_string();
        e.client_order_id = "client-1".to_string();
        assert_eq!(resolve_order_id(&e, &map), "server-5");
    }

    #[test]
    fn order_id_resolution_falls_back_to_gateway_map_then_client_order_id() {
        let mut map = std::collections::HashMap::new();
        map.insert("client-1".to_string(), "server-9".to_string());
        let mut e = event("SUBMITTED", "", "10", "0");
        e.client_order_id = "client-1".to_string();
        assert_eq!(resolve_order_id(&e, &map), "server-9");

        let mut e2 = event("SUBMITTED", "", "10", "0");
        e2.client_order_id = "unmapped".to_string();
        assert_eq!(resolve_order_id(&e2, &map), "unmapped");
    }
}
