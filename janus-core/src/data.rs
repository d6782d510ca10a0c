//! Entities from the Janus data model (`spec.md` §3).
//!
//! Every type here is a plain immutable value. Adapters clone, apply a
//! delta, and produce a new value rather than mutating one in place once it
//! has been dispatched — see [`OrderData`]'s doc comment for why that
//! matters.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Asset class of a tradable instrument. Defaults to [`AssetClass::Equity`]
/// per §3's `SymbolRegistryEntry` default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AssetClass {
    Equity,
    Future,
    Option,
    Forex,
    Crypto,
}

impl Default for AssetClass {
    fn default() -> Self {
        Self::Equity
    }
}

/// Position / order direction, independent of the wire-level [`IntentSide`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Long,
    Short,
}

/// Order type as understood by the core; each broker adapter maps this onto
/// its own native order-type vocabulary (§4.5, §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderType {
    Market,
    Limit,
    Stop,
    StopLimit,
}

/// Time in force. Defaults to GTC per §4.5 unless the intent overrides it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum TimeInForce {
    Day,
    #[default]
    Gtc,
}

/// Order lifecycle status (§3 `OrderData`, §8 status-machine invariant).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    Submitting,
    NotTraded,
    PartTraded,
    AllTraded,
    Cancelled,
    Rejected,
}

impl OrderStatus {
    /// `true` for the active set `{SUBMITTING, NOTTRADED, PARTTRADED}` (§3, §4.3).
    pub fn is_active(self) -> bool {
        matches!(
            self,
            Self::Submitting | Self::NotTraded | Self::PartTraded
        )
    }

    /// `true` once no further `ORDER` events for the owning `vt_orderid` are
    /// expected (§8's forward-walk invariant).
    pub fn is_terminal(self) -> bool {
        !self.is_active()
    }

    /// Whether `next` is a legal forward transition from `self` under the
    /// status machine in §8: `SUBMITTING -> NOTTRADED -> (PARTTRADED)* ->
    /// {ALLTRADED, CANCELLED, REJECTED}`. Terminal statuses accept no
    /// further transitions.
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        if self.is_terminal() {
            return false;
        }
        match (self, next) {
            (Submitting, Submitting) => true,
            (Submitting, NotTraded | PartTraded | AllTraded | Cancelled | Rejected) => true,
            (NotTraded, NotTraded | PartTraded | AllTraded | Cancelled | Rejected) => true,
            (PartTraded, PartTraded | AllTraded | Cancelled | Rejected) => true,
            _ => false,
        }
    }
}

/// The side of an incoming [`OrderIntent`] (§3, §6 CLI surface). Distinct
/// from [`Direction`] because `Short`/`Cover` carry routing intent (§4.7
/// step 3) that a plain long/short direction does not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IntentSide {
    Buy,
    Sell,
    Short,
    Cover,
}

/// Greeks and other option-only fields folded into a [`TickData`]'s `extra`
/// bucket (§3). Absent for non-option instruments.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct OptionGreeks {
    pub implied_vol: Option<Decimal>,
    pub delta: Option<Decimal>,
    pub gamma: Option<Decimal>,
    pub vega: Option<Decimal>,
    pub theta: Option<Decimal>,
    pub underlying_price: Option<Decimal>,
}

impl OptionGreeks {
    /// Merge `update` on top of `self`, keeping any field `update` leaves as
    /// `None`. Mirrors [`TickData::apply`]'s "preserve non-null fields"
    /// contract at the greeks level.
    fn merged(self, update: OptionGreeks) -> Self {
        Self {
            implied_vol: update.implied_vol.or(self.implied_vol),
            delta: update.delta.or(self.delta),
            gamma: update.gamma.or(self.gamma),
            vega: update.vega.or(self.vega),
            theta: update.theta.or(self.theta),
            underlying_price: update.underlying_price.or(self.underlying_price),
        }
    }
}

/// Contract metadata produced at connect time or on demand (§3, §4.4).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractData {
    pub vt_symbol: String,
    pub exchange: String,
    pub product_type: AssetClass,
    pub min_volume: Decimal,
    pub price_tick: Decimal,
    pub currency: String,
}

/// An order as tracked by the OMS.
///
/// **Invariant (§3):** once dispatched through `on_order`, an `OrderData`
/// value is never mutated. Adapters clone the cached value, apply a delta,
/// and emit the clone. This type has no interior mutability and no setters
/// by design — the only way to get a new `OrderData` is [`OrderData::with_update`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderData {
    pub vt_orderid: String,
    pub account_alias: String,
    pub symbol: String,
    pub exchange: String,
    pub direction: Direction,
    pub order_type: OrderType,
    pub volume: Decimal,
    pub price: Decimal,
    pub stop_price: Option<Decimal>,
    pub traded: Decimal,
    pub status: OrderStatus,
    pub tif: TimeInForce,
    pub timestamp: DateTime<Utc>,
}

impl OrderData {
    /// Returns a new `OrderData` with `status`/`traded` advanced, without
    /// mutating `self`. Callers are responsible for checking
    /// [`OrderStatus::can_transition_to`] before calling this if the forward
    /// walk must be enforced; the OMS cache enforces it on insert.
    pub fn with_update(&self, status: OrderStatus, traded: Decimal, timestamp: DateTime<Utc>) -> Self {
        Self {
            status,
            traded,
            timestamp,
            ..self.clone()
        }
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }
}

/// A single fill. Append-only: trades are never updated or removed (§3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeData {
    pub vt_tradeid: String,
    pub vt_orderid: String,
    pub symbol: String,
    pub direction: Direction,
    pub price: Decimal,
    pub volume: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// A position snapshot as pushed by the broker. The core never derives this
/// from fills — see §3's invariant that positions are broker-authoritative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionData {
    pub account_alias: String,
    pub symbol: String,
    pub direction: Direction,
    pub volume: Decimal,
    pub price: Decimal,
    pub pnl: Decimal,
    pub frozen: Decimal,
}

impl PositionData {
    /// Zero-volume positions are evicted rather than cached (§3, §4.3).
    pub fn is_zero(&self) -> bool {
        self.volume.is_zero()
    }
}

/// Account balance snapshot as pushed by the broker (§3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountData {
    pub account_alias: String,
    pub balance: Decimal,
    pub available: Decimal,
    pub currency: String,
}

/// A merged market-data snapshot for one `vt_symbol` (§3, §4.5). A `TickData`
/// is never considered complete per callback: each partial field update is
/// merged on top of the previous snapshot via [`TickData::apply`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickData {
    pub symbol: String,
    pub last: Option<Decimal>,
    pub bid: Option<Decimal>,
    pub ask: Option<Decimal>,
    pub bid_size: Option<Decimal>,
    pub ask_size: Option<Decimal>,
    pub volume: Option<Decimal>,
    pub timestamp: DateTime<Utc>,
    pub extra: OptionGreeks,
}

impl TickData {
    pub fn empty(symbol: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            symbol: symbol.into(),
            last: None,
            bid: None,
            ask: None,
            bid_size: None,
            ask_size: None,
            volume: None,
            timestamp,
            extra: OptionGreeks::default(),
        }
    }

    /// Merges a partial `update` on top of `self`, preserving every
    /// previously non-null field unless `update` explicitly overwrites it
    /// (§8's tick-merge invariant). For instruments lacking a `last` trade
    /// (FX/commodity styles), callers should synthesize
    /// `(bid+ask)/2` into `update.last` before calling this, per §4.5.
    pub fn apply(&self, update: TickUpdate) -> Self {
        Self {
            symbol: self.symbol.clone(),
            last: update.last.or(self.last),
            bid: update.bid.or(self.bid),
            ask: update.ask.or(self.ask),
            bid_size: update.bid_size.or(self.bid_size),
            ask_size: update.ask_size.or(self.ask_size),
            volume: update.volume.or(self.volume),
            timestamp: update.timestamp,
            extra: self.extra.merged(update.extra),
        }
    }

    /// Synthesizes `last = (bid+ask)/2` when both sides are present and
    /// `last` is still unset, per §4.5's FX/commodity fallback.
    pub fn synthesize_mid_if_missing(self) -> Self {
        if self.last.is_none() {
            if let (Some(bid), Some(ask)) = (self.bid, self.ask) {
                let mut ticked = self;
                ticked.last = Some((bid + ask) / Decimal::TWO);
                return ticked;
            }
        }
        self
    }
}

/// A single partial field update to be merged into a [`TickData`] via
/// [`TickData::apply`]. Every field is optional; `None` means "this callback
/// did not touch this field".
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TickUpdate {
    pub last: Option<Decimal>,
    pub bid: Option<Decimal>,
    pub ask: Option<Decimal>,
    pub bid_size: Option<Decimal>,
    pub ask_size: Option<Decimal>,
    pub volume: Option<Decimal>,
    pub timestamp: DateTime<Utc>,
    pub extra: OptionGreeks,
}

/// A canonical↔broker-id mapping row (§3 `SymbolRegistryEntry`, §4.1).
///
/// Lifecycle: inserted when a unique lookup resolves; never overwritten in
/// place except to fill a missing broker id field. Removal is manual and
/// happens outside the core (§4.1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolRegistryEntry {
    pub id: i64,
    pub canonical_symbol: String,
    pub asset_class: AssetClass,
    pub currency: String,
    pub broker_a_ticker: Option<String>,
    pub broker_b_conid: Option<i64>,
    pub description: Option<String>,
}

impl SymbolRegistryEntry {
    /// Whether this entry already carries the broker id the given broker
    /// kind would need to place an order (§4.7 step 2).
    pub fn has_broker_b_id(&self) -> bool {
        self.broker_b_conid.is_some()
    }

    pub fn has_broker_a_id(&self) -> bool {
        self.broker_a_ticker.is_some()
    }
}

/// Wire-level order submission input (§3, §6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderIntent {
    pub account_alias: String,
    pub symbol: String,
    pub side: IntentSide,
    pub order_type: OrderType,
    pub qty: Decimal,
    pub limit_price: Option<Decimal>,
    pub stop_price: Option<Decimal>,
    pub tif: TimeInForce,
}

/// Arbitrary key/value attributes a broker callback could not map onto a
/// named field. Kept as a last resort so adapters never silently drop wire
/// data; `BTreeMap` for deterministic serialization in logs/tests.
pub type ExtraFields = BTreeMap<String, String>;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn tick_merge_preserves_previous_fields() {
        let base = TickData::empty("AAPL", ts()).apply(TickUpdate {
            last: Some(dec!(150.00)),
            bid: Some(dec!(149.99)),
            timestamp: ts(),
            ..Default::default()
        });
        let merged = base.apply(TickUpdate {
            ask: Some(dec!(150.01)),
            timestamp: ts(),
            ..Default::default()
        });
        assert_eq!(merged.last, Some(dec!(150.00)));
        assert_eq!(merged.bid, Some(dec!(149.99)));
        assert_eq!(merged.ask, Some(dec!(150.01)));
    }

    #[test]
    fn tick_merge_overwrites_when_update_present() {
        let base = TickData::empty("AAPL", ts()).apply(TickUpdate {
            last: Some(dec!(150.00)),
            timestamp: ts(),
            ..Default::default()
        });
        let merged = base.apply(TickUpdate {
            last: Some(dec!(151.00)),
            timestamp: ts(),
            ..Default::default()
        });
        assert_eq!(merged.last, Some(dec!(151.00)));
    }

    #[test]
    fn synthesizes_mid_when_last_missing() {
        let tick = TickData::empty("EURUSD", ts())
            .apply(TickUpdate {
                bid: Some(dec!(1.1000)),
                ask: Some(dec!(1.1002)),
                timestamp: ts(),
                ..Default::default()
            })
            .synthesize_mid_if_missing();
        assert_eq!(tick.last, Some(dec!(1.1001)));
    }

    #[test]
    fn order_status_forward_walk() {
        use OrderStatus::*;
        assert!(Submitting.can_transition_to(NotTraded));
        assert!(NotTraded.can_transition_to(PartTraded));
        assert!(PartTraded.can_transition_to(AllTraded));
        assert!(!AllTraded.can_transition_to(NotTraded));
        assert!(!Cancelled.can_transition_to(AllTraded));
    }

    #[test]
    fn zero_volume_position_is_evicted() {
        let pos = PositionData {
            account_alias: "acct".into(),
            symbol: "AAPL".into(),
            direction: Direction::Long,
            volume: Decimal::ZERO,
            price: dec!(0),
            pnl: dec!(0),
            frozen: dec!(0),
        };
        assert!(pos.is_zero());
    }
}
