#![forbid(unsafe_code)]
#![warn(unused, missing_debug_implementations, rust_2018_idioms)]

//! # Janus OMS Cache (§4.3)
//!
//! Subscribes to `ORDER`/`TRADE`/`POSITION`/`ACCOUNT`/`CONTRACT` on the
//! [`EventBus`] and maintains the authoritative in-memory snapshot the rest
//! of the server reads from. The cache is written only by the task draining
//! the bus subscription — exactly one writer, by construction — and every
//! read crosses a [`parking_lot::RwLock`] snapshot; it never calls back into
//! a broker adapter.

use janus_bus::{Event, EventBus};
use janus_core::data::{
    AccountData, ContractData, Direction, OrderData, PositionData, TradeData,
};
use janus_core::shutdown::AsyncShutdown;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{trace, warn};

/// Composite key for [`PositionData`] (§4.3): one position per
/// account/symbol/direction triple.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PositionKey {
    pub account_alias: String,
    pub symbol: String,
    pub direction: Direction,
}

impl PositionKey {
    fn of(position: &PositionData) -> Self {
        Self {
            account_alias: position.account_alias.clone(),
            symbol: position.symbol.clone(),
            direction: position.direction,
        }
    }
}

#[derive(Default)]
struct State {
    orders_by_vt: RwLock<HashMap<String, Arc<OrderData>>>,
    active_orders: RwLock<HashSet<String>>,
    trades_by_vt: RwLock<HashMap<String, Arc<TradeData>>>,
    positions_by_key: RwLock<HashMap<PositionKey, Arc<PositionData>>>,
    accounts_by_alias: RwLock<HashMap<String, Arc<AccountData>>>,
    contracts_by_vt: RwLock<HashMap<String, Arc<ContractData>>>,
}

impl State {
    fn apply_order(&self, order: Arc<OrderData>) {
        let mut orders = self.orders_by_vt.write();
        if let Some(previous) = orders.get(&order.vt_orderid) {
            if previous.status.is_terminal() {
                warn!(
                    vt_orderid = %order.vt_orderid,
                    previous = ?previous.status,
                    next = ?order.status,
                    "order event received after terminal status"
                );
                return;
            }
            if !previous.status.can_transition_to(order.status) {
                warn!(
                    vt_orderid = %order.vt_orderid,
                    previous = ?previous.status,
                    next = ?order.status,
                    "non-forward order status transition observed, applying anyway"
                );
            }
        }
        let mut active = self.active_orders.write();
        if order.is_active() {
            active.insert(order.vt_orderid.clone());
        } else {
            active.remove(&order.vt_orderid);
        }
        orders.insert(order.vt_orderid.clone(), order);
    }

    fn apply_trade(&self, trade: Arc<TradeData>) {
        self.trades_by_vt
            .write()
            .insert(trade.vt_tradeid.clone(), trade);
    }

    fn apply_position(&self, position: Arc<PositionData>) {
        let key = PositionKey::of(&position);
        let mut positions = self.positions_by_key.write();
        if position.is_zero() {
            positions.remove(&key);
        } else {
            positions.insert(key, position);
        }
    }

    fn apply_account(&self, account: Arc<AccountData>) {
        self.accounts_by_alias
            .write()
            .insert(account.account_alias.clone(), account);
    }

    fn apply_contract(&self, contract: Arc<ContractData>) {
        self.contracts_by_vt
            .write()
            .insert(contract.vt_symbol.clone(), contract);
    }
}

/// Authoritative in-memory snapshot of orders, trades, positions, accounts
/// and contracts (§4.3).
pub struct OmsCache {
    state: Arc<State>,
    task: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for OmsCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OmsCache")
            .field("orders", &self.state.orders_by_vt.read().len())
            .field("active_orders", &self.state.active_orders.read().len())
            .finish()
    }
}

impl OmsCache {
    /// Registers the cache's dedicated unbounded ingest channel and spawns
    /// the task that owns all writes to this cache. Deliberately not
    /// `subscribe_all`'s bounded `broadcast` subscription: a lagging
    /// `broadcast` receiver silently drops events past its capacity, which
    /// would violate §4.2/§8's "no other event kind is dropped" besides
    /// ticks and could leave a terminal `ORDER` permanently missing from
    /// this cache (§8 "once terminal ... OMS active set becomes empty").
    pub fn spawn(bus: &EventBus) -> Self {
        let state = Arc::new(State::default());
        let mut rx = bus.register_oms_sink();
        let task_state = Arc::clone(&state);
        let task = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                match event {
                    Event::Order(order) => task_state.apply_order(order),
                    Event::Trade(trade) => task_state.apply_trade(trade),
                    Event::Position(position) => task_state.apply_position(position),
                    Event::Account(account) => task_state.apply_account(account),
                    Event::Contract(contract) => task_state.apply_contract(contract),
                    Event::Tick(_) | Event::Log(_) | Event::Timer(_) => {}
                }
                trace!("oms cache applied one event");
            }
        });
        Self {
            state,
            task: Some(task),
        }
    }

    pub fn get_order(&self, vt_orderid: &str) -> Option<Arc<OrderData>> {
        self.state.orders_by_vt.read().get(vt_orderid).cloned()
    }

    /// Snapshot of every order currently in the active set
    /// `{SUBMITTING, NOTTRADED, PARTTRADED}` (§3). Locks `orders_by_vt`
    /// before `active_orders`, matching the order `State::apply_order`
    /// takes them in, so a concurrent writer and reader can never each hold
    /// one lock while waiting on the other.
    pub fn active_orders(&self) -> Vec<Arc<OrderData>> {
        let orders = self.state.orders_by_vt.read();
        let active = self.state.active_orders.read();
        active
            .iter()
            .filter_map(|vt_orderid| orders.get(vt_orderid).cloned())
            .collect()
    }

    pub fn is_active(&self, vt_orderid: &str) -> bool {
        self.state.active_orders.read().contains(vt_orderid)
    }

    pub fn get_trade(&self, vt_tradeid: &str) -> Option<Arc<TradeData>> {
        self.state.trades_by_vt.read().get(vt_tradeid).cloned()
    }

    pub fn positions_snapshot(&self) -> Vec<Arc<PositionData>> {
        self.state.positions_by_key.read().values().cloned().collect()
    }

    pub fn get_account(&self, account_alias: &str) -> Option<Arc<AccountData>> {
        self.state.accounts_by_alias.read().get(account_alias).cloned()
    }

    pub fn accounts_snapshot(&self) -> Vec<Arc<AccountData>> {
        self.state.accounts_by_alias.read().values().cloned().collect()
    }

    pub fn get_contract(&self, vt_symbol: &str) -> Option<Arc<ContractData>> {
        self.state.contracts_by_vt.read().get(vt_symbol).cloned()
    }
}

impl AsyncShutdown for OmsCache {
    type Result = ();

    async fn shutdown(&mut self) -> Self::Result {
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use janus_core::data::{OrderStatus, OrderType, TimeInForce};
    use rust_decimal_macros::dec;
    use std::time::Duration;

    fn order(status: OrderStatus, traded: rust_decimal::Decimal) -> Arc<OrderData> {
        Arc::new(OrderData {
            vt_orderid: "ib_main.1".into(),
            account_alias: "ib_main".into(),
            symbol: "AAPL".into(),
            exchange: "SMART".into(),
            direction: Direction::Long,
            order_type: OrderType::Limit,
            volume: dec!(10),
            price: dec!(150),
            stop_price: None,
            traded,
            status,
            tif: TimeInForce::Gtc,
            timestamp: Utc::now(),
        })
    }

    fn order_n(n: usize) -> Arc<OrderData> {
        Arc::new(OrderData {
            vt_orderid: format!("ib_main.{n}"),
            account_alias: "ib_main".into(),
            symbol: "AAPL".into(),
            exchange: "SMART".into(),
            direction: Direction::Long,
            order_type: OrderType::Limit,
            volume: dec!(10),
            price: dec!(150),
            stop_price: None,
            traded: dec!(0),
            status: OrderStatus::Submitting,
            tif: TimeInForce::Gtc,
            timestamp: Utc::now(),
        })
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn active_set_empties_on_terminal_status() {
        let mut bus = EventBus::new(16, Duration::from_secs(60));
        bus.start();
        let oms = OmsCache::spawn(&bus);

        bus.publish(Event::Order(order(OrderStatus::Submitting, dec!(0))));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(oms.is_active("ib_main.1"));

        bus.publish(Event::Order(order(OrderStatus::AllTraded, dec!(10))));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!oms.is_active("ib_main.1"));
        assert_eq!(oms.get_order("ib_main.1").unwrap().status, OrderStatus::AllTraded);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn zero_volume_position_is_evicted_from_snapshot() {
        let mut bus = EventBus::new(16, Duration::from_secs(60));
        bus.start();
        let oms = OmsCache::spawn(&bus);

        let pos = Arc::new(PositionData {
            account_alias: "ib_main".into(),
            symbol: "AAPL".into(),
            direction: Direction::Long,
            volume: dec!(5),
            price: dec!(150),
            pnl: dec!(0),
            frozen: dec!(0),
        });
        bus.publish(Event::Position(pos));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(oms.positions_snapshot().len(), 1);

        let flat = Arc::new(PositionData {
            account_alias: "ib_main".into(),
            symbol: "AAPL".into(),
            direction: Direction::Long,
            volume: dec!(0),
            price: dec!(150),
            pnl: dec!(0),
            frozen: dec!(0),
        });
        bus.publish(Event::Position(flat));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(oms.positions_snapshot().len(), 0);
    }

    /// A burst well past the generic `broadcast` subscription's capacity
    /// must not lose a single ORDER event on the way into the cache: the
    /// OMS ingest path is a dedicated unbounded channel, not
    /// `subscribe_all` (§4.2, §8 "no other event kind is dropped").
    #[tokio::test(flavor = "multi_thread")]
    async fn no_order_events_are_dropped_past_broadcast_capacity() {
        const BURST: usize = 5_000;
        let mut bus = EventBus::new(16, Duration::from_secs(60));
        bus.start();
        let oms = OmsCache::spawn(&bus);

        for n in 0..BURST {
            bus.publish(Event::Order(order_n(n)));
        }
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(oms.active_orders().len(), BURST);
        for n in 0..BURST {
            assert!(
                oms.get_order(&format!("ib_main.{n}")).is_some(),
                "order {n} missing from the cache after a burst past broadcast capacity"
            );
        }
    }
}
