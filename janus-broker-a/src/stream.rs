//! The trade-events stream manager (§4.6): one task per account (or per
//! credential group, §9 Open Question 2) that drives
//! [`crate::state_machine::StreamStateMachine`] against the gRPC stream and
//! folds payloads into order/trade events on the [`EventBus`].
//!
//! This task owns nothing the HTTP side touches except the shared order
//! cache and the `client_order_id -> order_id` map; both are behind a
//! `parking_lot::Mutex` so the synchronous HTTP dispatch (running on the
//! worker pool) and this stream task never need to coordinate more than a
//! lock acquisition.

use crate::grpc::TradeEventsClient;
use crate::mapping;
use crate::state_machine::StreamStateMachine;
use chrono::Utc;
use futures_util::StreamExt;
use janus_bus::{Event, EventBus, LogEvent, LogLevel};
use janus_core::data::OrderData;
use janus_core::ids;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{info, warn};

/// Shared order cache the HTTP side (placing orders) and the stream task
/// (merging status updates) both touch (§4.6 "the adapter maintains its own
/// `OrderData` cache").
pub(crate) struct OrderCache {
    pub(crate) orders: Mutex<HashMap<String, OrderData>>,
    pub(crate) client_order_id_to_order_id: Mutex<HashMap<String, String>>,
}

impl OrderCache {
    pub(crate) fn new() -> Self {
        Self {
            orders: Mutex::new(HashMap::new()),
            client_order_id_to_order_id: Mutex::new(HashMap::new()),
        }
    }
}

/// Coalesces refresh requests arriving within `debounce` of one another into
/// a single snapshot refresh (§4.6 "Refresh debouncing").
pub(crate) struct RefreshDebouncer {
    pending: AtomicBool,
    notify: Notify,
}

impl RefreshDebouncer {
    pub(crate) fn new() -> Self {
        Self {
            pending: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    /// Requests a refresh. If one is already pending within the debounce
    /// window, this is a no-op; otherwise it wakes the debounce task.
    pub(crate) fn request(&self) {
        if !self.pending.swap(true, Ordering::AcqRel) {
            self.notify.notify_one();
        }
    }

    /// Runs forever: waits for a request, sleeps out the debounce window so
    /// further requests coalesce, then clears the pending flag and invokes
    /// `refresh`.
    pub(crate) async fn run<F, Fut>(self: Arc<Self>, debounce: Duration, refresh: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        loop {
            self.notify.notified().await;
            tokio::time::sleep(debounce).await;
            self.pending.store(false, Ordering::Release);
            refresh().await;
        }
    }
}

/// Runs the per-account stream state machine until told to stop. Reconnects
/// with exponential backoff on `SubscribeExpired`/transport errors; stops
/// outright on `AuthError`/`NumOfConnExceed` (§4.6).
pub(crate) async fn run(
    account_alias: String,
    endpoint: String,
    region_id: String,
    bus: Arc<EventBus>,
    cache: Arc<OrderCache>,
    refresh: Arc<RefreshDebouncer>,
) {
    let mut machine = StreamStateMachine::new();

    loop {
        if machine.is_stopped() {
            let reason = machine.stop_reason();
            warn!(account = %account_alias, ?reason, "broker A trade-events stream stopped permanently");
            publish_log(
                &bus,
                LogLevel::Error,
                &account_alias,
                format!("trade-events stream stopped: {reason:?}"),
            );
            return;
        }

        machine.start_connecting();
        let connected = TradeEventsClient::connect(endpoint.clone()).await;
        let mut client = match connected {
            Ok(client) => client,
            Err(err) => {
                warn!(account = %account_alias, error = %err, "trade-events connect failed");
                let wait = machine.on_stream_error();
                tokio::time::sleep(wait).await;
                continue;
            }
        };

        let stream = match client.subscribe(account_alias.clone(), region_id.clone()).await {
            Ok(stream) => stream,
            Err(err) => {
                warn!(account = %account_alias, error = %err, "trade-events subscribe failed");
                let wait = machine.on_stream_error();
                tokio::time::sleep(wait).await;
                continue;
            }
        };

        let mut stream = std::pin::pin!(stream);
        loop {
            match stream.next().await {
                Some(Ok(payload)) => {
                    if payload.is_ping {
                        continue;
                    }
                    if payload.is_subscribe_success {
                        machine.on_subscribe_success();
                        info!(account = %account_alias, "trade-events subscribe success");
                        continue;
                    }
                    match payload.stream_notice.as_str() {
                        "AuthError" => {
                            machine.on_auth_error();
                            break;
                        }
                        "NumOfConnExceed" => {
                            machine.on_conn_limit_exceeded();
                            break;
                        }
                        "SubscribeExpired" => {
                            let wait = machine.on_subscribe_expired();
                            tokio::time::sleep(wait).await;
                            break;
                        }
                        _ => {}
                    }

                    if mapping::is_order_status_event(&payload) {
                        apply_order_event(&bus, &cache, &account_alias, &payload);
                        if mapping::triggers_refresh(&payload) {
                            refresh.request();
                        }
                    }
                }
                Some(Err(err)) => {
                    warn!(account = %account_alias, error = %err, "trade-events stream error");
                    let wait = machine.on_stream_error();
                    tokio::time::sleep(wait).await;
                    break;
                }
                None => {
                    warn!(account = %account_alias, "trade-events stream ended");
                    let wait = machine.on_stream_error();
                    tokio::time::sleep(wait).await;
                    break;
                }
            }
        }
    }
}

fn apply_order_event(
    bus: &EventBus,
    cache: &OrderCache,
    account_alias: &str,
    payload: &crate::pb::TradeEventPayload,
) {
    let client_map = cache.client_order_id_to_order_id.lock();
    let order_id = mapping::resolve_order_id(payload, &client_map);
    drop(client_map);
    let vt_orderid = ids::vt_orderid(account_alias, &order_id);

    let mut orders = cache.orders.lock();
    let Some(existing) = orders.get(&vt_orderid).cloned() else {
        warn!(vt_orderid = %vt_orderid, "order event for unknown order, ignoring");
        return;
    };

    let Some(status) = mapping::map_status(payload) else {
        // MODIFY_SUCCESS or any value outside the documented table:
        // preserve whatever status is already cached (§4.6).
        return;
    };
    if !existing.status.can_transition_to(status) && existing.status != status {
        warn!(
            vt_orderid = %vt_orderid,
            previous = ?existing.status,
            next = ?status,
            "non-forward broker A status transition observed, applying anyway"
        );
    }
    let updated = existing.with_update(status, existing.traded.max(parse_filled(payload)), Utc::now());
    orders.insert(vt_orderid.clone(), updated.clone());
    drop(orders);
    bus.publish(Event::Order(Arc::new(updated)));
}

fn parse_filled(payload: &crate::pb::TradeEventPayload) -> rust_decimal::Decimal {
    payload.filled_qty.parse().unwrap_or_default()
}

fn publish_log(bus: &EventBus, level: LogLevel, account_alias: &str, message: String) {
    bus.publish(Event::Log(Arc::new(LogEvent {
        level,
        source: format!("broker_a.{account_alias}"),
        message,
        timestamp: Utc::now(),
    })));
}

#[cfg(test)]
mod tests {
    use super::*;
    use janus_core::data::{Direction, OrderStatus, OrderType, TimeInForce};
    use rust_decimal::Decimal;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::mpsc;

    fn sample_payload(order_id: &str, order_status: &str, qty: &str, filled_qty: &str) -> crate::pb::TradeEventPayload {
        crate::pb::TradeEventPayload {
            event_type: "ORDER".to_string(),
            subscribe_type: "ORDER_STATUS_CHANGED".to_string(),
            scene_type: String::new(),
            order_status: order_status.to_string(),
            order_id: order_id.to_string(),
            client_order_id: String::new(),
            symbol: "AAPL".to_string(),
            side: "BUY".to_string(),
            qty: qty.to_string(),
            filled_qty: filled_qty.to_string(),
            price: "0".to_string(),
            is_ping: false,
            is_subscribe_success: false,
            stream_notice: String::new(),
        }
    }

    fn cached_order(vt_orderid: &str) -> OrderData {
        OrderData {
            vt_orderid: vt_orderid.to_string(),
            account_alias: "acct1".to_string(),
            symbol: "AAPL".to_string(),
            exchange: "NMS".to_string(),
            direction: Direction::Long,
            order_type: OrderType::Limit,
            volume: Decimal::from(100),
            price: Decimal::from(10),
            stop_price: None,
            traded: Decimal::ZERO,
            status: OrderStatus::NotTraded,
            tif: TimeInForce::Day,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn parse_filled_defaults_to_zero_on_garbage() {
        let payload = sample_payload("1", "FILLED", "not-a-number", "also-not-a-number");
        assert_eq!(parse_filled(&payload), Decimal::ZERO);
    }

    #[test]
    fn parse_filled_parses_valid_decimal() {
        let payload = sample_payload("1", "FILLED", "100", "40.5");
        assert_eq!(parse_filled(&payload), Decimal::new(405, 1));
    }

    #[test]
    fn apply_order_event_ignores_unknown_order() {
        let bus = EventBus::new(16, Duration::from_secs(60));
        let cache = OrderCache::new();
        let payload = sample_payload("missing-order", "FILLED", "100", "100");
        apply_order_event(&bus, &cache, "acct1", &payload);
        assert!(cache.orders.lock().is_empty());
    }

    #[test]
    fn apply_order_event_updates_cached_order_and_publishes() {
        let bus = EventBus::new(16, Duration::from_secs(60));
        let cache = OrderCache::new();
        let vt_orderid = ids::vt_orderid("acct1", "order-1");
        cache.orders.lock().insert(vt_orderid.clone(), cached_order(&vt_orderid));

        let payload = sample_payload("order-1", "FILLED", "100", "100");
        apply_order_event(&bus, &cache, "acct1", &payload);

        let updated = cache.orders.lock().get(&vt_orderid).cloned().unwrap();
        assert_eq!(updated.status, OrderStatus::AllTraded);
        assert_eq!(updated.traded, Decimal::from(100));
    }

    #[test]
    fn apply_order_event_preserves_status_on_unmapped_value() {
        let bus = EventBus::new(16, Duration::from_secs(60));
        let cache = OrderCache::new();
        let vt_orderid = ids::vt_orderid("acct1", "order-1");
        cache.orders.lock().insert(vt_orderid.clone(), cached_order(&vt_orderid));

        let payload = sample_payload("order-1", "MODIFY_SUCCESS", "100", "0");
        apply_order_event(&bus, &cache, "acct1", &payload);

        let unchanged = cache.orders.lock().get(&vt_orderid).cloned().unwrap();
        assert_eq!(unchanged.status, OrderStatus::NotTraded);
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn refresh_debouncer_coalesces_rapid_requests() {
        let debouncer = Arc::new(RefreshDebouncer::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let (tx, mut rx) = mpsc::channel::<()>(1);

        let task_debouncer = Arc::clone(&debouncer);
        let task_calls = Arc::clone(&calls);
        tokio::spawn(async move {
            task_debouncer
                .run(Duration::from_millis(50), move || {
                    let calls = Arc::clone(&task_calls);
                    let tx = tx.clone();
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        let _ = tx.send(()).await;
                    }
                })
                .await;
        });

        debouncer.request();
        debouncer.request();
        debouncer.request();
        tokio::time::advance(Duration::from_millis(60)).await;
        rx.recv().await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
