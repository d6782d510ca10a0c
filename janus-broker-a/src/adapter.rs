//! The [`BrokerGateway`] implementation for broker A (§4.6): synchronous
//! HTTP dispatch on a worker pool, plus the trade-events stream task this
//! module spawns at [`BrokerAAdapter::connect`] time.

use crate::error::BrokerAError;
use crate::http::{self, HttpDispatch};
use crate::stream::{self, OrderCache, RefreshDebouncer};
use async_trait::async_trait;
use chrono::Utc;
use janus_bus::{Event, EventBus};
use janus_core::data::{
    AccountData, Direction, IntentSide, OrderData, OrderStatus, OrderType, PositionData,
    TimeInForce,
};
use janus_core::ids;
use janus_gateway::{
    BarsRequest, BrokerGateway, BrokerKind, BrokerSymbolId, ContractDetails, ContractQuery,
    GatewayError, OrderRequest, SubscribeRequest, SupportedOrderTypes,
};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::warn;

/// Every `OrderData` this adapter produces carries this exchange tag; broker
/// A's HTTP responses never name one (§4.6's order-event payloads have no
/// exchange field), so the adapter fills in a fixed convention rather than
/// leaving it blank.
const BROKER_A_EXCHANGE: &str = "NMS";

/// Bound on how long auto-fill waits for a contract-details lookup (§4.1,
/// §5 "Cancellation & timeouts").
const CONTRACT_DETAILS_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct TradeEventsSettings {
    pub enable: bool,
    pub host: String,
    pub region_id: String,
}

pub struct BrokerAAdapter {
    account_alias: String,
    http: Arc<HttpDispatch>,
    bus: Arc<EventBus>,
    cache: Arc<OrderCache>,
    refresh: Arc<RefreshDebouncer>,
    refresh_debounce: Duration,
    trade_events: Option<TradeEventsSettings>,
    next_client_order_id: AtomicI64,
    market_data_subscribed: Mutex<HashSet<String>>,
    bars_subscribed: Mutex<HashSet<String>>,
    stream_task: Mutex<Option<JoinHandle<()>>>,
    refresh_task: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for BrokerAAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerAAdapter")
            .field("account_alias", &self.account_alias)
            .finish()
    }
}

impl BrokerAAdapter {
    pub fn new(
        account_alias: String,
        base_url: String,
        api_key: String,
        bus: Arc<EventBus>,
        refresh_debounce_ms: u64,
        trade_events: Option<TradeEventsSettings>,
    ) -> Result<Self, BrokerAError> {
        Ok(Self {
            account_alias,
            http: Arc::new(HttpDispatch::new(base_url, api_key)?),
            bus,
            cache: Arc::new(OrderCache::new()),
            refresh: Arc::new(RefreshDebouncer::new()),
            refresh_debounce: Duration::from_millis(refresh_debounce_ms),
            trade_events,
            next_client_order_id: AtomicI64::new(1),
            market_data_subscribed: Mutex::new(HashSet::new()),
            bars_subscribed: Mutex::new(HashSet::new()),
            stream_task: Mutex::new(None),
            refresh_task: Mutex::new(None),
        })
    }

    fn allocate_client_order_id(&self) -> String {
        self.next_client_order_id.fetch_add(1, Ordering::Relaxed).to_string()
    }

    async fn do_refresh(http: Arc<HttpDispatch>, bus: Arc<EventBus>, account_alias: String) {
        if let Err(err) = refresh_open_orders(&http, &bus, &account_alias).await {
            warn!(account = %account_alias, error = %err, "debounced open-orders refresh failed");
        }
        if let Err(err) = refresh_positions(&http, &bus, &account_alias).await {
            warn!(account = %account_alias, error = %err, "debounced positions refresh failed");
        }
        if let Err(err) = refresh_account(&http, &bus, &account_alias).await {
            warn!(account = %account_alias, error = %err, "debounced account refresh failed");
        }
    }
}

impl Drop for BrokerAAdapter {
    fn drop(&mut self) {
        if let Some(task) = self.stream_task.lock().take() {
            task.abort();
        }
        if let Some(task) = self.refresh_task.lock().take() {
            task.abort();
        }
    }
}

#[async_trait]
impl BrokerGateway for BrokerAAdapter {
    fn broker_kind(&self) -> BrokerKind {
        BrokerKind::BrokerA
    }

    fn account_alias(&self) -> &str {
        &self.account_alias
    }

    /// Broker A's default capability set has no STOP_LIMIT (§9 decision 3).
    fn supported_order_types(&self) -> SupportedOrderTypes {
        SupportedOrderTypes::no_stop_limit()
    }

    /// Starts the debounce-refresh task and, if configured, the trade-events
    /// stream task, then performs the first snapshot burst (§4.4).
    async fn connect(&self) -> Result<(), GatewayError> {
        {
            let mut refresh_task = self.refresh_task.lock();
            if refresh_task.is_none() {
                let http = Arc::clone(&self.http);
                let bus = Arc::clone(&self.bus);
                let account_alias = self.account_alias.clone();
                let debouncer = Arc::clone(&self.refresh);
                let debounce = self.refresh_debounce;
                *refresh_task = Some(tokio::spawn(async move {
                    debouncer
                        .run(debounce, move || {
                            let http = Arc::clone(&http);
                            let bus = Arc::clone(&bus);
                            let account_alias = account_alias.clone();
                            async move { Self::do_refresh(http, bus, account_alias).await }
                        })
                        .await
                }));
            }
        }

        if let Some(settings) = &self.trade_events {
            if settings.enable {
                let mut stream_task = self.stream_task.lock();
                if stream_task.is_none() {
                    let account_alias = self.account_alias.clone();
                    let endpoint = settings.host.clone();
                    let region_id = settings.region_id.clone();
                    let bus = Arc::clone(&self.bus);
                    let cache = Arc::clone(&self.cache);
                    let refresh = Arc::clone(&self.refresh);
                    *stream_task = Some(tokio::spawn(stream::run(
                        account_alias,
                        endpoint,
                        region_id,
                        bus,
                        cache,
                        refresh,
                    )));
                }
            }
        }

        self.query_account().await?;
        self.query_position().await?;
        self.query_open_orders().await?;
        Ok(())
    }

    async fn close(&self) -> Result<(), GatewayError> {
        if let Some(task) = self.stream_task.lock().take() {
            task.abort();
        }
        if let Some(task) = self.refresh_task.lock().take() {
            task.abort();
        }
        Ok(())
    }

    /// Broker A's HTTP surface has no streaming market-data endpoint in this
    /// spec (§4.6 only models trade events); subscriptions are tracked so
    /// repeat calls are idempotent but no wire request is made.
    async fn subscribe(&self, req: SubscribeRequest) -> Result<(), GatewayError> {
        self.market_data_subscribed.lock().insert(req.vt_symbol);
        Ok(())
    }

    async fn unsubscribe(&self, req: SubscribeRequest) -> Result<(), GatewayError> {
        self.market_data_subscribed.lock().remove(&req.vt_symbol);
        Ok(())
    }

    async fn subscribe_bars(&self, req: BarsRequest) -> Result<(), GatewayError> {
        self.bars_subscribed.lock().insert(req.vt_symbol);
        Ok(())
    }

    async fn unsubscribe_bars(&self, req: BarsRequest) -> Result<(), GatewayError> {
        self.bars_subscribed.lock().remove(&req.vt_symbol);
        Ok(())
    }

    /// Emits a `SUBMITTING` `OrderData` before returning (§4.4, §5), using a
    /// locally allocated `client_order_id` as the `vt_orderid`'s broker half
    /// since the broker's own id is not known until the HTTP response
    /// arrives. The HTTP call itself runs on the worker pool and is not
    /// awaited by the caller.
    async fn send_order(&self, req: OrderRequest) -> Result<String, GatewayError> {
        let ticker = match req.broker_symbol_id {
            BrokerSymbolId::BrokerATicker(ticker) => ticker,
            BrokerSymbolId::BrokerBConid(_) => {
                return Err(GatewayError::Permanent(
                    "router resolved a broker-B conid for a broker-A order".to_string(),
                ))
            }
        };

        let client_order_id = self.allocate_client_order_id();
        let vt_orderid = ids::vt_orderid(&self.account_alias, &client_order_id);

        let order = OrderData {
            vt_orderid: vt_orderid.clone(),
            account_alias: self.account_alias.clone(),
            symbol: req.vt_symbol.clone(),
            exchange: BROKER_A_EXCHANGE.to_string(),
            direction: req.direction,
            order_type: req.order_type,
            volume: req.qty,
            price: req.limit_price.unwrap_or(Decimal::ZERO),
            stop_price: req.stop_price,
            traded: Decimal::ZERO,
            status: OrderStatus::Submitting,
            tif: req.tif,
            timestamp: Utc::now(),
        };
        self.cache
            .orders
            .lock()
            .insert(vt_orderid.clone(), order.clone());
        self.bus.publish(Event::Order(Arc::new(order)));

        let http = Arc::clone(&self.http);
        let bus = Arc::clone(&self.bus);
        let cache = Arc::clone(&self.cache);
        let vt_orderid_for_task = vt_orderid.clone();
        let client_order_id_for_task = client_order_id.clone();
        let wire_request = http::PlaceOrderRequest {
            client_order_id: client_order_id.clone(),
            symbol: ticker,
            side: wire_side(req.direction, req.intent_side),
            order_type: wire_order_type(req.order_type),
            qty: req.qty,
            limit_price: req.limit_price,
            stop_price: req.stop_price,
            tif: wire_tif(req.tif),
        };

        tokio::spawn(async move {
            let result = tokio::task::spawn_blocking(move || http.place_order(&wire_request)).await;
            match result {
                Ok(Ok(response)) => {
                    cache
                        .client_order_id_to_order_id
                        .lock()
                        .insert(client_order_id_for_task, response.order_id);
                }
                Ok(Err(err)) => {
                    warn!(vt_orderid = %vt_orderid_for_task, error = %err, "broker A place_order failed");
                    let mut orders = cache.orders.lock();
                    if let Some(existing) = orders.get(&vt_orderid_for_task).cloned() {
                        let rejected = existing.with_update(OrderStatus::Rejected, existing.traded, Utc::now());
                        orders.insert(vt_orderid_for_task.clone(), rejected.clone());
                        drop(orders);
                        bus.publish(Event::Order(Arc::new(rejected)));
                    }
                }
                Err(join_err) => {
                    warn!(vt_orderid = %vt_orderid_for_task, error = %join_err, "broker A place_order task panicked");
                }
            }
        });

        Ok(vt_orderid)
    }

    async fn cancel_order(&self, vt_orderid: &str) -> Result<(), GatewayError> {
        let Some((_, client_order_id)) = ids::split_vt_orderid(vt_orderid) else {
            return Err(GatewayError::Transient(format!("malformed vt_orderid {vt_orderid}")));
        };
        let order_id = self
            .cache
            .client_order_id_to_order_id
            .lock()
            .get(client_order_id)
            .cloned()
            .unwrap_or_else(|| client_order_id.to_string());

        let http = Arc::clone(&self.http);
        tokio::task::spawn_blocking(move || http.cancel_order(&order_id))
            .await
            .map_err(|err| GatewayError::Transient(err.to_string()))?
            .map_err(GatewayError::from)
    }

    async fn query_account(&self) -> Result<(), GatewayError> {
        refresh_account(&self.http, &self.bus, &self.account_alias)
            .await
            .map_err(GatewayError::from)
    }

    async fn query_position(&self) -> Result<(), GatewayError> {
        refresh_positions(&self.http, &self.bus, &self.account_alias)
            .await
            .map_err(GatewayError::from)
    }

    async fn query_open_orders(&self) -> Result<(), GatewayError> {
        refresh_open_orders(&self.http, &self.bus, &self.account_alias)
            .await
            .map_err(GatewayError::from)?;
        Ok(())
    }

    async fn request_contract_details(
        &self,
        query: ContractQuery,
    ) -> Result<Vec<ContractDetails>, GatewayError> {
        let http = Arc::clone(&self.http);
        let request = http::ContractQueryRequest {
            symbol: query.symbol,
            exchange: None,
        };
        let call = tokio::task::spawn_blocking(move || http.query_contract_details(&request));
        match tokio::time::timeout(CONTRACT_DETAILS_TIMEOUT, call).await {
            Ok(Ok(Ok(results))) => Ok(results
                .into_iter()
                .map(|r| ContractDetails {
                    broker_a_ticker: Some(r.ticker),
                    broker_b_conid: None,
                    description: r.description,
                })
                .collect()),
            Ok(Ok(Err(err))) => Err(GatewayError::from(err)),
            Ok(Err(join_err)) => Err(GatewayError::Transient(join_err.to_string())),
            // Timeout: treated as ambiguous by the registry caller (§4.1, §5).
            Err(_) => Ok(Vec::new()),
        }
    }
}

fn wire_side(direction: Direction, intent_side: IntentSide) -> String {
    let _ = intent_side;
    match direction {
        Direction::Long => "BUY".to_string(),
        Direction::Short => "SELL".to_string(),
    }
}

fn wire_order_type(order_type: OrderType) -> String {
    match order_type {
        OrderType::Market => "MARKET".to_string(),
        OrderType::Limit => "LIMIT".to_string(),
        OrderType::Stop => "STOP".to_string(),
        OrderType::StopLimit => "STOP_LIMIT".to_string(),
    }
}

fn wire_tif(tif: TimeInForce) -> String {
    match tif {
        TimeInForce::Day => "DAY".to_string(),
        TimeInForce::Gtc => "GTC".to_string(),
    }
}

fn wire_status_to_order_status(raw: &str, filled_qty: Decimal, qty: Decimal) -> OrderStatus {
    match raw {
        "NEW" | "SUBMITTED" => OrderStatus::NotTraded,
        "FILLED" if filled_qty < qty => OrderStatus::PartTraded,
        "FILLED" => OrderStatus::AllTraded,
        "CANCELLED" => OrderStatus::Cancelled,
        "REJECTED" | "FAILED" => OrderStatus::Rejected,
        _ => OrderStatus::NotTraded,
    }
}

async fn refresh_account(
    http: &Arc<HttpDispatch>,
    bus: &Arc<EventBus>,
    account_alias: &str,
) -> Result<(), BrokerAError> {
    let http = Arc::clone(http);
    let response = tokio::task::spawn_blocking(move || http.query_account())
        .await
        .map_err(|err| BrokerAError::BadResponse(err.to_string()))??;
    bus.publish(Event::Account(Arc::new(AccountData {
        account_alias: account_alias.to_string(),
        balance: response.net_liquidation,
        available: response.available_funds,
        currency: response.currency,
    })));
    Ok(())
}

async fn refresh_positions(
    http: &Arc<HttpDispatch>,
    bus: &Arc<EventBus>,
    account_alias: &str,
) -> Result<(), BrokerAError> {
    let http = Arc::clone(http);
    let responses = tokio::task::spawn_blocking(move || http.query_positions())
        .await
        .map_err(|err| BrokerAError::BadResponse(err.to_string()))??;
    for position in responses {
        let direction = if position.qty >= Decimal::ZERO {
            Direction::Long
        } else {
            Direction::Short
        };
        bus.publish(Event::Position(Arc::new(PositionData {
            account_alias: account_alias.to_string(),
            symbol: position.symbol,
            direction,
            volume: position.qty.abs(),
            price: position.avg_price,
            pnl: Decimal::ZERO,
            frozen: Decimal::ZERO,
        })));
    }
    Ok(())
}

async fn refresh_open_orders(
    http: &Arc<HttpDispatch>,
    bus: &Arc<EventBus>,
    account_alias: &str,
) -> Result<(), BrokerAError> {
    let http = Arc::clone(http);
    let responses = tokio::task::spawn_blocking(move || http.query_open_orders())
        .await
        .map_err(|err| BrokerAError::BadResponse(err.to_string()))??;
    for open in responses {
        let status = wire_status_to_order_status(&open.order_status, open.filled_qty, open.qty);
        let direction = if open.side == "SELL" {
            Direction::Short
        } else {
            Direction::Long
        };
        let order_type = match open.order_type.as_str() {
            "LIMIT" => OrderType::Limit,
            "STOP" => OrderType::Stop,
            "STOP_LIMIT" => OrderType::StopLimit,
            _ => OrderType::Market,
        };
        let tif = if open.tif == "DAY" { TimeInForce::Day } else { TimeInForce::Gtc };
        let vt_orderid = ids::vt_orderid(account_alias, &open.order_id);
        bus.publish(Event::Order(Arc::new(OrderData {
            vt_orderid,
            account_alias: account_alias.to_string(),
            symbol: open.symbol,
            exchange: BROKER_A_EXCHANGE.to_string(),
            direction,
            order_type,
            volume: open.qty,
            price: open.limit_price.unwrap_or(Decimal::ZERO),
            stop_price: open.stop_price,
            traded: open.filled_qty,
            status,
            tif,
            timestamp: Utc::now(),
        })));
    }
    Ok(())
}
