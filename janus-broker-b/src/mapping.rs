//! Status and order-type mapping tables (§4.5).

use crate::protocol::{WireOrderStatus, WireOrderType, WireSide, WireTif};
use janus_core::data::{Direction, IntentSide, OrderStatus, OrderType, TimeInForce};
use rust_decimal::Decimal;

/// Maps a broker status value onto the core's [`OrderStatus`], given the
/// order's traded/volume so far (§4.5 "Filled→ALLTRADED (or PARTTRADED when
/// `traded<volume`)"). Returns `None` for a status value outside the
/// documented table — callers must leave the cached status unchanged and
/// log once rather than apply a guess.
pub fn map_status(wire: &WireOrderStatus, traded: Decimal, volume: Decimal) -> Option<OrderStatus> {
    match wire {
        WireOrderStatus::Submitted | WireOrderStatus::PreSubmitted => Some(OrderStatus::NotTraded),
        WireOrderStatus::Filled => {
            if traded < volume {
                Some(OrderStatus::PartTraded)
            } else {
                Some(OrderStatus::AllTraded)
            }
        }
        WireOrderStatus::Cancelled | WireOrderStatus::ApiCancelled => Some(OrderStatus::Cancelled),
        WireOrderStatus::Inactive => Some(OrderStatus::Rejected),
        WireOrderStatus::Unknown(_) => None,
    }
}

/// MARKET→MKT, LIMIT→LMT, STOP→STP, STOP_LIMIT→STP LMT (§4.5).
pub fn map_order_type(order_type: OrderType) -> WireOrderType {
    match order_type {
        OrderType::Market => WireOrderType::Mkt,
        OrderType::Limit => WireOrderType::Lmt,
        OrderType::Stop => WireOrderType::Stp,
        OrderType::StopLimit => WireOrderType::StpLmt,
    }
}

/// LONG→BUY, SHORT→SELL (§4.5; short-sale policy itself lives in the
/// router, this only encodes the resolved [`Direction`]).
pub fn map_side(direction: Direction, intent_side: IntentSide) -> WireSide {
    let _ = intent_side; // kept for callers that want to log the original intent
    match direction {
        Direction::Long => WireSide::Buy,
        Direction::Short => WireSide::Sell,
    }
}

pub fn map_tif(tif: TimeInForce) -> WireTif {
    match tif {
        TimeInForce::Day => WireTif::Day,
        TimeInForce::Gtc => WireTif::Gtc,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn filled_with_partial_traded_is_parttraded() {
        let status = map_status(&WireOrderStatus::Filled, dec!(4), dec!(10)).unwrap();
        assert_eq!(status, OrderStatus::PartTraded);
    }

    #[test]
    fn filled_with_full_traded_is_alltraded() {
        let status = map_status(&WireOrderStatus::Filled, dec!(10), dec!(10)).unwrap();
        assert_eq!(status, OrderStatus::AllTraded);
    }

    #[test]
    fn unknown_status_maps_to_none() {
        assert!(map_status(&WireOrderStatus::Unknown("Huh".into()), dec!(0), dec!(10)).is_none());
    }

    #[test]
    fn order_type_table_matches_spec() {
        assert_eq!(map_order_type(OrderType::Market), WireOrderType::Mkt);
        assert_eq!(map_order_type(OrderType::Limit), WireOrderType::Lmt);
        assert_eq!(map_order_type(OrderType::Stop), WireOrderType::Stp);
        assert_eq!(map_order_type(OrderType::StopLimit), WireOrderType::StpLmt);
    }
}
