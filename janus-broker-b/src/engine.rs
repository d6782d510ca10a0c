//! The broker-B I/O loop (§4.5 "Threading model"): owns the socket, the
//! reqid registry, the tick aggregator, and the reconnect state. Runs as a
//! single spawned task; every [`Command`] reaching it comes from a
//! thread-safe channel, never a direct call from another task's stack.

use crate::error::BrokerBError;
use crate::framing;
use crate::mapping;
use crate::protocol::{InboundMessage, OutboundMessage, TickField, WireOrderStatus};
use chrono::Utc;
use janus_bus::{Event, EventBus, LogEvent, LogLevel, Topic};
use janus_core::data::{
    AccountData, Direction, OrderData, OrderStatus, OrderType, PositionData, TickData,
    TickUpdate, TimeInForce, TradeData,
};
use janus_core::ids;
use janus_gateway::{BrokerSymbolId, ContractDetails, ContractQuery, OrderRequest, SubscribeRequest};
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{mpsc, oneshot};
use tracing::{info, trace, warn};

/// Number of `EVENT_TIMER` ticks between connection-health checks (§4.5
/// "checks connection health every N ticks (~10s cadence)" at the default
/// 1s timer cadence).
const HEALTH_CHECK_TICKS: u32 = 10;

pub(crate) enum Command {
    Connect(oneshot::Sender<Result<(), BrokerBError>>),
    Close(oneshot::Sender<Result<(), BrokerBError>>),
    Subscribe(SubscribeRequest, oneshot::Sender<Result<(), BrokerBError>>),
    Unsubscribe(SubscribeRequest, oneshot::Sender<Result<(), BrokerBError>>),
    SendOrder(OrderRequest, oneshot::Sender<Result<String, BrokerBError>>),
    CancelOrder(String, oneshot::Sender<Result<(), BrokerBError>>),
    QueryAccount(oneshot::Sender<Result<(), BrokerBError>>),
    QueryPosition(oneshot::Sender<Result<(), BrokerBError>>),
    QueryOpenOrders(oneshot::Sender<Result<(), BrokerBError>>),
    RequestContractDetails(
        ContractQuery,
        oneshot::Sender<Result<Vec<ContractDetails>, BrokerBError>>,
    ),
}

struct ContractPending {
    buffer: Vec<ContractDetails>,
    responder: oneshot::Sender<Result<Vec<ContractDetails>, BrokerBError>>,
}

pub(crate) struct Engine {
    host: String,
    port: u16,
    account_alias: String,
    bus: Arc<EventBus>,
    cmd_rx: mpsc::UnboundedReceiver<Command>,
    timer_rx: tokio::sync::broadcast::Receiver<Event>,

    reader: Option<OwnedReadHalf>,
    writer: Option<OwnedWriteHalf>,
    ticks_since_health_check: u32,

    next_reqid: i64,
    next_order_id: i64,

    contract_pending: HashMap<i64, ContractPending>,
    tick_reqid_to_symbol: HashMap<i64, String>,
    symbol_to_reqid: HashMap<String, i64>,
    tick_cache: HashMap<String, TickData>,
    subscribed: HashMap<String, SubscribeRequest>,

    orders: HashMap<i64, OrderData>,
    order_id_by_vt: HashMap<String, i64>,
    warned_unknown_status: HashSet<String>,
}

impl Engine {
    pub(crate) fn new(
        host: String,
        port: u16,
        account_alias: String,
        bus: Arc<EventBus>,
        cmd_rx: mpsc::UnboundedReceiver<Command>,
    ) -> Self {
        let timer_rx = bus.subscribe(Topic::Timer);
        Self {
            host,
            port,
            account_alias,
            bus,
            cmd_rx,
            timer_rx,
            reader: None,
            writer: None,
            ticks_since_health_check: 0,
            next_reqid: 1,
            next_order_id: 1,
            contract_pending: HashMap::new(),
            tick_reqid_to_symbol: HashMap::new(),
            symbol_to_reqid: HashMap::new(),
            tick_cache: HashMap::new(),
            subscribed: HashMap::new(),
            orders: HashMap::new(),
            order_id_by_vt: HashMap::new(),
            warned_unknown_status: HashSet::new(),
        }
    }

    pub(crate) async fn run(mut self) {
        loop {
            let connected = self.reader.is_some();
            tokio::select! {
                biased;

                cmd = self.cmd_rx.recv() => {
                    match cmd {
                        Some(cmd) => self.handle_command(cmd).await,
                        None => break,
                    }
                }

                timer = self.timer_rx.recv() => {
                    if let Ok(Event::Timer(_)) = timer {
                        self.ticks_since_health_check += 1;
                        if self.ticks_since_health_check >= HEALTH_CHECK_TICKS {
                            self.ticks_since_health_check = 0;
                            self.check_health().await;
                        }
                    }
                }

                frame = Self::read_next(&mut self.reader), if connected => {
                    match frame {
                        Ok(message) => self.handle_inbound(message).await,
                        Err(err) => {
                            warn!(error = %err, "broker B socket read failed, marking disconnected");
                            self.reader = None;
                            self.writer = None;
                        }
                    }
                }
            }
        }
    }

    async fn read_next(reader: &mut Option<OwnedReadHalf>) -> std::io::Result<InboundMessage> {
        match reader {
            Some(reader) => framing::read_frame(reader).await,
            None => std::future::pending().await,
        }
    }

    async fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Connect(reply) => {
                let result = self.connect().await;
                let _ = reply.send(result);
            }
            Command::Close(reply) => {
                self.reader = None;
                self.writer = None;
                let _ = reply.send(Ok(()));
            }
            Command::Subscribe(req, reply) => {
                let result = self.subscribe(req).await;
                let _ = reply.send(result);
            }
            Command::Unsubscribe(req, reply) => {
                let result = self.unsubscribe(req).await;
                let _ = reply.send(result);
            }
            Command::SendOrder(req, reply) => {
                let result = self.send_order(req).await;
                let _ = reply.send(result);
            }
            Command::CancelOrder(vt_orderid, reply) => {
                let result = self.cancel_order(&vt_orderid).await;
                let _ = reply.send(result);
            }
            Command::QueryAccount(reply) => {
                let result = self.write(OutboundMessage::ReqAccountUpdates).await;
                let _ = reply.send(result);
            }
            Command::QueryPosition(reply) => {
                let result = self.write(OutboundMessage::ReqPositions).await;
                let _ = reply.send(result);
            }
            Command::QueryOpenOrders(reply) => {
                let result = self.write(OutboundMessage::ReqOpenOrders).await;
                let _ = reply.send(result);
            }
            Command::RequestContractDetails(query, reply) => {
                self.request_contract_details(query, reply).await;
            }
        }
    }

    async fn connect(&mut self) -> Result<(), BrokerBError> {
        let stream = TcpStream::connect((self.host.as_str(), self.port)).await?;
        let (reader, writer) = stream.into_split();
        self.reader = Some(reader);
        self.writer = Some(writer);

        // First snapshot burst (§4.4 "connect performs a first snapshot
        // burst of {account, positions, open_orders, contracts}").
        self.write(OutboundMessage::ReqAccountUpdates).await?;
        self.write(OutboundMessage::ReqPositions).await?;
        self.write(OutboundMessage::ReqOpenOrders).await?;

        if !self.subscribed.is_empty() {
            self.resubscribe_all().await;
        }
        info!(account = %self.account_alias, "broker B connected");
        Ok(())
    }

    async fn check_health(&mut self) {
        if self.reader.is_none() {
            info!(account = %self.account_alias, "broker B reconnecting after health check");
            if let Err(err) = self.connect().await {
                warn!(account = %self.account_alias, error = %err, "broker B reconnect attempt failed");
            }
        }
    }

    /// Replays the cached [`SubscribeRequest`] set after reconnect or a
    /// "data farm connected" sentinel (§4.5). The post-replay set must
    /// equal the pre-disconnect set exactly: no duplicates, no extras.
    async fn resubscribe_all(&mut self) {
        self.tick_reqid_to_symbol.clear();
        self.symbol_to_reqid.clear();
        let symbols: Vec<String> = self.subscribed.keys().cloned().collect();
        for vt_symbol in symbols {
            let reqid = self.allocate_reqid();
            self.tick_reqid_to_symbol.insert(reqid, vt_symbol.clone());
            self.symbol_to_reqid.insert(vt_symbol.clone(), reqid);
            if let Err(err) = self
                .write(OutboundMessage::ReqMktData {
                    reqid,
                    symbol: vt_symbol.clone(),
                })
                .await
            {
                warn!(symbol = %vt_symbol, error = %err, "resubscribe failed");
            }
        }
    }

    async fn subscribe(&mut self, req: SubscribeRequest) -> Result<(), BrokerBError> {
        self.subscribed.insert(req.vt_symbol.clone(), req.clone());
        let reqid = self.allocate_reqid();
        self.tick_reqid_to_symbol.insert(reqid, req.vt_symbol.clone());
        self.symbol_to_reqid.insert(req.vt_symbol.clone(), reqid);
        self.write(OutboundMessage::ReqMktData {
            reqid,
            symbol: req.vt_symbol,
        })
        .await
    }

    /// Cancels the live market-data stream but retains the cache slot and
    /// the resubscribe-set entry removal is intentional (§4.5 "Unsubscribe
    /// cancels the market data stream but retains the cache slot (known
    /// limitation)").
    async fn unsubscribe(&mut self, req: SubscribeRequest) -> Result<(), BrokerBError> {
        self.subscribed.remove(&req.vt_symbol);
        if let Some(reqid) = self.symbol_to_reqid.remove(&req.vt_symbol) {
            self.tick_reqid_to_symbol.remove(&reqid);
            self.write(OutboundMessage::CancelMktData { reqid }).await?;
        }
        Ok(())
    }

    async fn send_order(&mut self, req: OrderRequest) -> Result<String, BrokerBError> {
        let conid = match req.broker_symbol_id {
            BrokerSymbolId::BrokerBConid(conid) => conid,
            BrokerSymbolId::BrokerATicker(_) => {
                return Err(BrokerBError::Permanent(
                    "router resolved a broker-A ticker for a broker-B order".to_string(),
                ))
            }
        };
        let order_id = self.next_order_id;
        self.next_order_id += 1;
        let vt_orderid = ids::vt_orderid(&self.account_alias, &order_id.to_string());

        let order = OrderData {
            vt_orderid: vt_orderid.clone(),
            account_alias: self.account_alias.clone(),
            symbol: req.vt_symbol.clone(),
            exchange: "SMART".to_string(),
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
        self.orders.insert(order_id, order.clone());
        self.order_id_by_vt.insert(vt_orderid.clone(), order_id);
        self.bus.publish(Event::Order(Arc::new(order)));

        let wire = OutboundMessage::PlaceOrder {
            order_id,
            conid,
            side: mapping::map_side(req.direction, req.intent_side),
            order_type: mapping::map_order_type(req.order_type),
            qty: req.qty,
            limit_price: req.limit_price,
            stop_price: req.stop_price,
            tif: mapping::map_tif(req.tif),
        };

        if let Err(err) = self.write(wire).await {
            if let Some(mut rejected) = self.orders.get(&order_id).cloned() {
                rejected.status = OrderStatus::Rejected;
                rejected.timestamp = Utc::now();
                self.orders.insert(order_id, rejected.clone());
                self.bus.publish(Event::Order(Arc::new(rejected)));
            }
            return Err(err);
        }

        Ok(vt_orderid)
    }

    async fn cancel_order(&mut self, vt_orderid: &str) -> Result<(), BrokerBError> {
        let order_id = *self
            .order_id_by_vt
            .get(vt_orderid)
            .ok_or(BrokerBError::NotConnected)?;
        self.write(OutboundMessage::CancelOrder { order_id }).await
    }

    async fn request_contract_details(
        &mut self,
        query: ContractQuery,
        responder: oneshot::Sender<Result<Vec<ContractDetails>, BrokerBError>>,
    ) {
        let reqid = self.allocate_reqid();
        self.contract_pending.insert(
            reqid,
            ContractPending {
                buffer: Vec::new(),
                responder,
            },
        );
        let wire = OutboundMessage::ReqContractDetails {
            reqid,
            symbol: query.symbol,
            exchange: query.exchange,
            currency: query.currency,
            security_type: query.security_type,
        };
        if let Err(err) = self.write(wire).await {
            if let Some(pending) = self.contract_pending.remove(&reqid) {
                let _ = pending.responder.send(Err(err));
            }
        }
    }

    async fn handle_inbound(&mut self, message: InboundMessage) {
        match message {
            InboundMessage::ContractDetails {
                reqid,
                conid,
                description,
            } => {
                if let Some(pending) = self.contract_pending.get_mut(&reqid) {
                    pending.buffer.push(ContractDetails {
                        broker_a_ticker: None,
                        broker_b_conid: Some(conid),
                        description,
                    });
                }
            }
            InboundMessage::ContractDetailsEnd { reqid } => {
                if let Some(pending) = self.contract_pending.remove(&reqid) {
                    let _ = pending.responder.send(Ok(pending.buffer));
                }
            }
            InboundMessage::TickPrice { reqid, field, price } => {
                self.merge_tick(reqid, tick_update_for(field, TickValue::Price(price)));
            }
            InboundMessage::TickSize { reqid, field, size } => {
                self.merge_tick(reqid, tick_update_for(field, TickValue::Size(size)));
            }
            InboundMessage::TickString { reqid, field, value } => {
                trace!(reqid, field = ?field, value = %value, "tick string field ignored beyond timestamp");
            }
            InboundMessage::OrderStatus {
                order_id,
                status,
                traded,
            } => self.apply_order_status(order_id, status, traded),
            InboundMessage::OpenOrder {
                order_id,
                conid: _,
                exchange,
                side: _,
                order_type,
                qty,
                limit_price,
                stop_price,
                tif,
            } => self.apply_open_order(order_id, exchange, order_type, qty, limit_price, stop_price, tif),
            InboundMessage::ExecDetails {
                order_id,
                exec_id,
                price,
                qty,
            } => self.emit_trade(order_id, exec_id, price, qty),
            InboundMessage::Position {
                account,
                symbol,
                qty,
                avg_cost,
            } => {
                let direction = if qty >= Decimal::ZERO { Direction::Long } else { Direction::Short };
                self.bus.publish(Event::Position(Arc::new(PositionData {
                    account_alias: account,
                    symbol,
                    direction,
                    volume: qty.abs(),
                    price: avg_cost,
                    pnl: Decimal::ZERO,
                    frozen: Decimal::ZERO,
                })));
            }
            InboundMessage::AccountValue {
                account,
                key,
                value,
                currency,
            } => {
                if key == "NetLiquidation" || key == "AvailableFunds" {
                    self.bus.publish(Event::Account(Arc::new(AccountData {
                        account_alias: account,
                        balance: value,
                        available: value,
                        currency,
                    })));
                }
            }
            InboundMessage::Error {
                code,
                message,
                is_data_farm_connected,
            } => {
                if is_data_farm_connected {
                    info!(code, "data farm connected sentinel, resubscribing");
                    self.resubscribe_all().await;
                } else {
                    warn!(code, message = %message, "broker B error message");
                }
                self.bus.publish(Event::Log(Arc::new(LogEvent {
                    level: LogLevel::Warn,
                    source: "broker_b".to_string(),
                    message: format!("[{code}] {message}"),
                    timestamp: Utc::now(),
                })));
            }
        }
    }

    fn merge_tick(&mut self, reqid: i64, update: TickUpdate) {
        let Some(vt_symbol) = self.tick_reqid_to_symbol.get(&reqid).cloned() else {
            return;
        };
        let base = self
            .tick_cache
            .get(&vt_symbol)
            .cloned()
            .unwrap_or_else(|| TickData::empty(vt_symbol.clone(), Utc::now()));
        let merged = base.apply(update).synthesize_mid_if_missing();
        self.tick_cache.insert(vt_symbol, merged.clone());
        self.bus.publish(Event::Tick(Arc::new(merged)));
    }

    fn apply_order_status(&mut self, order_id: i64, status: WireOrderStatus, traded: Decimal) {
        let Some(existing) = self.orders.get(&order_id).cloned() else {
            trace!(order_id, "orderStatus for unknown order, ignoring");
            return;
        };
        let Some(mapped) = mapping::map_status(&status, traded, existing.volume) else {
            let key = format!("{status:?}");
            if self.warned_unknown_status.insert(key) {
                warn!(order_id, status = ?status, "unknown broker B order status, leaving unchanged");
            }
            return;
        };
        let updated = existing.with_update(mapped, traded, Utc::now());
        self.orders.insert(order_id, updated.clone());
        self.bus.publish(Event::Order(Arc::new(updated)));
    }

    fn apply_open_order(
        &mut self,
        order_id: i64,
        exchange: String,
        order_type: crate::protocol::WireOrderType,
        qty: Decimal,
        limit_price: Option<Decimal>,
        stop_price: Option<Decimal>,
        tif: crate::protocol::WireTif,
    ) {
        use crate::protocol::{WireOrderType, WireTif};

        let Some(existing) = self.orders.get(&order_id).cloned() else {
            trace!(order_id, "openOrder for unknown order, ignoring");
            return;
        };
        let mut updated = existing;
        updated.exchange = exchange;
        updated.volume = qty;
        if let Some(price) = limit_price {
            updated.price = price;
        }
        updated.stop_price = stop_price.or(updated.stop_price);
        updated.order_type = match order_type {
            WireOrderType::Mkt => OrderType::Market,
            WireOrderType::Lmt => OrderType::Limit,
            WireOrderType::Stp => OrderType::Stop,
            WireOrderType::StpLmt => OrderType::StopLimit,
        };
        updated.tif = match tif {
            WireTif::Day => TimeInForce::Day,
            WireTif::Gtc => TimeInForce::Gtc,
        };
        updated.timestamp = Utc::now();
        self.orders.insert(order_id, updated.clone());
        self.bus.publish(Event::Order(Arc::new(updated)));
    }

    fn emit_trade(&mut self, order_id: i64, exec_id: String, price: Decimal, qty: Decimal) {
        let Some(order) = self.orders.get(&order_id) else {
            trace!(order_id, "execDetails for unknown order, ignoring");
            return;
        };
        let trade = TradeData {
            vt_tradeid: format!("{}.{exec_id}", order.vt_orderid),
            vt_orderid: order.vt_orderid.clone(),
            symbol: order.symbol.clone(),
            direction: order.direction,
            price,
            volume: qty,
            timestamp: Utc::now(),
        };
        self.bus.publish(Event::Trade(Arc::new(trade)));
    }

    fn allocate_reqid(&mut self) -> i64 {
        let id = self.next_reqid;
        self.next_reqid += 1;
        id
    }

    async fn write(&mut self, message: OutboundMessage) -> Result<(), BrokerBError> {
        let writer = self.writer.as_mut().ok_or(BrokerBError::NotConnected)?;
        framing::write_frame(writer, &message).await?;
        Ok(())
    }
}

enum TickValue {
    Price(Decimal),
    Size(Decimal),
}

fn tick_update_for(field: TickField, value: TickValue) -> TickUpdate {
    let mut update = TickUpdate {
        timestamp: Utc::now(),
        ..Default::default()
    };
    match (field, value) {
        (TickField::Bid, TickValue::Price(p)) => update.bid = Some(p),
        (TickField::Ask, TickValue::Price(p)) => update.ask = Some(p),
        (TickField::Last, TickValue::Price(p)) => update.last = Some(p),
        (TickField::BidSize, TickValue::Size(s)) => update.bid_size = Some(s),
        (TickField::AskSize, TickValue::Size(s)) => update.ask_size = Some(s),
        (TickField::Volume, TickValue::Size(s)) => update.volume = Some(s),
        _ => {}
    }
    update
}
