//! The `BrokerGateway` capability contract (§4.4): every broker adapter
//! exposes the same surface regardless of whether it talks to a
//! synchronous HTTP SDK or an async socket protocol underneath.

use crate::error::GatewayError;
use async_trait::async_trait;
use janus_core::data::{Direction, IntentSide, OrderType, TimeInForce};
use rust_decimal::Decimal;
use std::fmt;

/// Which broker family a gateway belongs to, used by the router's
/// capability gate and by harmony's "for each connected broker kind"
/// iteration (§4.7, §4.8). Distinct from `janus_core::config::BrokerKind`
/// only in that it is the runtime identity of a *connected* adapter rather
/// than a configuration value — kept as a thin wrapper so adapters do not
/// need to depend on `janus-core::config`.
pub use janus_core::config::BrokerKind;

/// A market-data subscription request, tracked by the adapter so it can be
/// replayed verbatim after a reconnect (§4.5 "the set of active
/// SubscribeRequests resubscribed equals the pre-disconnect set").
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscribeRequest {
    pub vt_symbol: String,
}

/// A historical-bars subscription request (§6 `subscribe_bars`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BarsRequest {
    pub vt_symbol: String,
    pub use_rth: bool,
}

/// A fully-resolved, broker-specific order request composed by the router
/// (§4.7 step 5). The broker id (`broker_a_ticker`/`broker_b_conid`) has
/// already been resolved by the time this reaches a gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub account_alias: String,
    pub vt_symbol: String,
    pub broker_symbol_id: BrokerSymbolId,
    pub direction: Direction,
    pub intent_side: IntentSide,
    pub order_type: OrderType,
    pub qty: Decimal,
    pub limit_price: Option<Decimal>,
    pub stop_price: Option<Decimal>,
    pub tif: TimeInForce,
}

/// The broker-specific identifier an [`OrderRequest`] resolved to, so each
/// adapter can pull out exactly the id shape it understands without a
/// downcast.
#[derive(Debug, Clone, PartialEq)]
pub enum BrokerSymbolId {
    BrokerATicker(String),
    BrokerBConid(i64),
}

/// A query broker-B/broker-A contract-details lookups take (§4.1 auto-fill
/// "default filter (US + SMART + USD, STK)").
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContractQuery {
    pub symbol: String,
    pub exchange: String,
    pub currency: String,
    pub security_type: String,
}

impl ContractQuery {
    /// The default filter auto-fill uses for broker B (§4.1).
    pub fn default_us_stock(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            exchange: "SMART".to_string(),
            currency: "USD".to_string(),
            security_type: "STK".to_string(),
        }
    }

    /// Broker A's auto-fill pattern is ticker-only (§4.1 "Same pattern for
    /// broker A (ticker-only)").
    pub fn ticker_only(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            exchange: String::new(),
            currency: String::new(),
            security_type: String::new(),
        }
    }
}

/// One contract-details result. `broker_a_ticker`/`broker_b_conid` carry
/// whichever id the answering broker natively deals in; the other is
/// `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct ContractDetails {
    pub broker_a_ticker: Option<String>,
    pub broker_b_conid: Option<i64>,
    pub description: String,
}

/// The set of [`OrderType`]s a given adapter instance can natively express
/// (§4.7 step 4, §9 Open Question 3). The router rejects rather than
/// downgrades when a requested type is not in this set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupportedOrderTypes(u8);

impl SupportedOrderTypes {
    const MARKET: u8 = 0b0001;
    const LIMIT: u8 = 0b0010;
    const STOP: u8 = 0b0100;
    const STOP_LIMIT: u8 = 0b1000;

    pub const fn all() -> Self {
        Self(Self::MARKET | Self::LIMIT | Self::STOP | Self::STOP_LIMIT)
    }

    /// Broker A's default capability set has no STOP_LIMIT (§9 decision 3).
    pub const fn no_stop_limit() -> Self {
        Self(Self::MARKET | Self::LIMIT | Self::STOP)
    }

    pub fn supports(self, order_type: OrderType) -> bool {
        let bit = match order_type {
            OrderType::Market => Self::MARKET,
            OrderType::Limit => Self::LIMIT,
            OrderType::Stop => Self::STOP,
            OrderType::StopLimit => Self::STOP_LIMIT,
        };
        self.0 & bit != 0
    }
}

/// Every broker adapter implements this surface (§4.4). Methods return
/// promptly: no blocking network I/O ever runs on the caller's thread.
/// Side effects surface asynchronously through `on_*` callbacks onto the
/// `EventBus`, never through this trait's return values except the initial
/// ack (e.g. `vt_orderid`).
#[async_trait]
pub trait BrokerGateway: Send + Sync + fmt::Debug {
    fn broker_kind(&self) -> BrokerKind;

    fn account_alias(&self) -> &str;

    fn supported_order_types(&self) -> SupportedOrderTypes;

    /// Connects and performs the first snapshot burst of account,
    /// positions, open orders, and contracts (§4.4).
    async fn connect(&self) -> Result<(), GatewayError>;

    async fn close(&self) -> Result<(), GatewayError>;

    async fn subscribe(&self, req: SubscribeRequest) -> Result<(), GatewayError>;

    async fn unsubscribe(&self, req: SubscribeRequest) -> Result<(), GatewayError>;

    async fn subscribe_bars(&self, req: BarsRequest) -> Result<(), GatewayError>;

    async fn unsubscribe_bars(&self, req: BarsRequest) -> Result<(), GatewayError>;

    /// Emits a `SUBMITTING` `OrderData` via the event bus before returning
    /// (§4.5, §4.6, §5 "`send_order` always emits a SUBMITTING OrderData
    /// before returning to the caller").
    async fn send_order(&self, req: OrderRequest) -> Result<String, GatewayError>;

    async fn cancel_order(&self, vt_orderid: &str) -> Result<(), GatewayError>;

    async fn query_account(&self) -> Result<(), GatewayError>;

    async fn query_position(&self) -> Result<(), GatewayError>;

    async fn query_open_orders(&self) -> Result<(), GatewayError>;

    /// Synchronous (from the caller's perspective) with a bounded timeout;
    /// used by the registry's auto-fill (§4.1, §5 "Cancellation &
    /// timeouts"). Multiple results or a timeout are both treated as
    /// ambiguous by the caller — an empty `Vec` either way.
    async fn request_contract_details(
        &self,
        query: ContractQuery,
    ) -> Result<Vec<ContractDetails>, GatewayError>;
}
