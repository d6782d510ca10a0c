//! The REQ/REP dispatch loop (§4.9, §6): a ZeroMQ `REP` socket served on a
//! dedicated OS thread, since `zmq::Socket` is synchronous like broker A's
//! HTTP SDK (`janus-broker-a::http`) — the difference is this thread calls
//! back into async router/harmony code, so it holds a [`tokio::runtime::Handle`]
//! and blocks on it per request rather than spawning work onto a pool.

use crate::protocol::{self, BrokerListEntry, RpcCall, RpcRequest, RpcResponse, RpcResult};
use janus_core::error::WireError;
use janus_gateway::{harmony, BarsRequest, OrderRouter};
use janus_core::ids;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};

/// How long `recv` blocks before checking the stop flag again (§5 shutdown
/// "stop accepting new RPC requests").
const POLL_TIMEOUT_MS: i32 = 200;

pub struct RpcServer {
    router: Arc<OrderRouter>,
    broker_list: Vec<BrokerListEntry>,
    rep_addr: String,
    stop: Arc<AtomicBool>,
}

impl std::fmt::Debug for RpcServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcServer").field("rep_addr", &self.rep_addr).finish()
    }
}

impl RpcServer {
    pub fn new(router: Arc<OrderRouter>, broker_list: Vec<BrokerListEntry>, rep_addr: String) -> Self {
        Self {
            router,
            broker_list,
            rep_addr,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Runs the REP loop on a dedicated thread until [`Self::stop`] is
    /// called. The thread holds a handle to the caller's tokio runtime so it
    /// can await the router/harmony calls each request needs.
    pub fn spawn(self: Arc<Self>) -> std::thread::JoinHandle<()> {
        let handle = tokio::runtime::Handle::current();
        std::thread::spawn(move || {
            if let Err(err) = self.run_loop(handle) {
                error!(error = %err, "RPC REP loop exited with an error");
            }
        })
    }

    /// Signals the REP loop to stop accepting new requests (§5 shutdown
    /// sequence's first step). Does not itself close the socket; the loop
    /// closes it on its own thread when it observes the flag.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    fn run_loop(&self, handle: tokio::runtime::Handle) -> Result<(), zmq::Error> {
        let ctx = zmq::Context::new();
        let socket = ctx.socket(zmq::REP)?;
        socket.set_rcvtimeo(POLL_TIMEOUT_MS)?;
        socket.bind(&self.rep_addr)?;
        info!(addr = %self.rep_addr, "RPC REP socket bound");

        while !self.stop.load(Ordering::Acquire) {
            let bytes = match socket.recv_bytes(0) {
                Ok(bytes) => bytes,
                Err(zmq::Error::EAGAIN) => continue,
                Err(err) => return Err(err),
            };

            let response = match protocol::decode::<RpcRequest>(&bytes) {
                Ok(request) => handle.block_on(self.dispatch(request)),
                Err(err) => {
                    warn!(error = %err, "failed to decode RPC request");
                    RpcResponse {
                        reqid: 0,
                        result: RpcResult::Error(WireError {
                            code: "invalid_intent".to_string(),
                            message: format!("malformed request: {err}"),
                        }),
                    }
                }
            };

            match protocol::encode(&response) {
                Ok(encoded) => {
                    if let Err(err) = socket.send(encoded, 0) {
                        error!(error = %err, "failed to send RPC response");
                    }
                }
                Err(err) => error!(error = %err, "failed to encode RPC response"),
            }
        }

        info!("RPC REP loop stopped");
        Ok(())
    }

    async fn dispatch(&self, request: RpcRequest) -> RpcResponse {
        let result = self.handle_call(request.call).await;
        RpcResponse { reqid: request.reqid, result }
    }

    async fn handle_call(&self, call: RpcCall) -> RpcResult {
        match call {
            RpcCall::SendOrderIntent(intent) => match self.router.route(intent).await {
                Ok(vt_orderid) => RpcResult::OrderAck { vt_orderid },
                Err(err) => RpcResult::Error(WireError::from_domain(&err)),
            },
            RpcCall::CancelOrder { vt_orderid } => self.cancel_order(&vt_orderid).await,
            RpcCall::Sync => self.sync_all().await,
            RpcCall::Harmony => match harmony::run(&self.router).await {
                Ok(summary) => RpcResult::Harmony(summary.into()),
                Err(err) => RpcResult::Error(WireError::from_domain(&err)),
            },
            RpcCall::SubscribeBars { symbols, account_alias, use_rth } => {
                self.bars(&symbols, &account_alias, use_rth, true).await
            }
            RpcCall::UnsubscribeBars { symbols, account_alias } => {
                self.bars(&symbols, &account_alias, false, false).await
            }
            RpcCall::BrokerList => RpcResult::BrokerList(self.broker_list.clone()),
        }
    }

    async fn cancel_order(&self, vt_orderid: &str) -> RpcResult {
        let Some((account_alias, _)) = ids::split_vt_orderid(vt_orderid) else {
            return RpcResult::Error(WireError {
                code: "invalid_intent".to_string(),
                message: format!("malformed vt_orderid: {vt_orderid}"),
            });
        };
        let Some(gateway) = self.router.gateway_for_account(account_alias) else {
            return RpcResult::Error(WireError {
                code: "invalid_intent".to_string(),
                message: format!("unknown account alias: {account_alias}"),
            });
        };
        match gateway.cancel_order(vt_orderid).await {
            Ok(()) => RpcResult::Ack,
            Err(err) => RpcResult::Error(WireError::from_domain(&err)),
        }
    }

    /// Triggers a full snapshot refresh across every connected adapter (§6
    /// `sync()`). Partial failures are logged and do not abort the others —
    /// `sync` is best-effort, not transactional.
    async fn sync_all(&self) -> RpcResult {
        for gateway in self.router.all_gateways() {
            if let Err(err) = gateway.query_account().await {
                warn!(account = %gateway.account_alias(), error = %err, "sync: account refresh failed");
            }
            if let Err(err) = gateway.query_position().await {
                warn!(account = %gateway.account_alias(), error = %err, "sync: position refresh failed");
            }
            if let Err(err) = gateway.query_open_orders().await {
                warn!(account = %gateway.account_alias(), error = %err, "sync: open-orders refresh failed");
            }
        }
        RpcResult::Ack
    }

    async fn bars(&self, symbols: &[String], account_alias: &str, use_rth: bool, subscribe: bool) -> RpcResult {
        let Some(gateway) = self.router.gateway_for_account(account_alias) else {
            return RpcResult::Error(WireError {
                code: "invalid_intent".to_string(),
                message: format!("unknown account alias: {account_alias}"),
            });
        };
        for symbol in symbols {
            let canonical = janus_registry::normalize(symbol);
            let result = if subscribe {
                gateway
                    .subscribe_bars(BarsRequest { vt_symbol: canonical, use_rth })
                    .await
            } else {
                let _ = use_rth;
                gateway
                    .unsubscribe_bars(BarsRequest { vt_symbol: canonical, use_rth: false })
                    .await
            };
            if let Err(err) = result {
                return RpcResult::Error(WireError::from_domain(&err));
            }
        }
        RpcResult::Ack
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use janus_bus::EventBus;
    use janus_gateway::{
        AccountPolicy, BrokerGateway, BrokerKind, BrokerSymbolId, ContractDetails, ContractQuery,
        GatewayError, OrderRequest, SubscribeRequest, SupportedOrderTypes,
    };
    use janus_oms::OmsCache;
    use janus_registry::SymbolRegistry;
    use rusqlite::Connection;

    #[derive(Debug)]
    struct FakeGateway {
        alias: String,
    }

    #[async_trait]
    impl BrokerGateway for FakeGateway {
        fn broker_kind(&self) -> BrokerKind {
            BrokerKind::BrokerB
        }
        fn account_alias(&self) -> &str {
            &self.alias
        }
        fn supported_order_types(&self) -> SupportedOrderTypes {
            SupportedOrderTypes::all()
        }
        async fn connect(&self) -> Result<(), GatewayError> {
            Ok(())
        }
        async fn close(&self) -> Result<(), GatewayError> {
            Ok(())
        }
        async fn subscribe(&self, _req: SubscribeRequest) -> Result<(), GatewayError> {
            Ok(())
        }
        async fn unsubscribe(&self, _req: SubscribeRequest) -> Result<(), GatewayError> {
            Ok(())
        }
        async fn subscribe_bars(&self, _req: BarsRequest) -> Result<(), GatewayError> {
            Ok(())
        }
        async fn unsubscribe_bars(&self, _req: BarsRequest) -> Result<(), GatewayError> {
            Ok(())
        }
        async fn send_order(&self, _req: OrderRequest) -> Result<String, GatewayError> {
            unreachable!("not exercised by these tests")
        }
        async fn cancel_order(&self, _vt_orderid: &str) -> Result<(), GatewayError> {
            Ok(())
        }
        async fn query_account(&self) -> Result<(), GatewayError> {
            Ok(())
        }
        async fn query_position(&self) -> Result<(), GatewayError> {
            Ok(())
        }
        async fn query_open_orders(&self) -> Result<(), GatewayError> {
            Ok(())
        }
        async fn request_contract_details(
            &self,
            _query: ContractQuery,
        ) -> Result<Vec<ContractDetails>, GatewayError> {
            Ok(Vec::new())
        }
    }

    fn fresh_registry() -> SymbolRegistry {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute(
            "CREATE TABLE registry (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                canonical_symbol TEXT UNIQUE NOT NULL,
                asset_class TEXT NOT NULL,
                currency TEXT NOT NULL,
                broker_a_ticker TEXT UNIQUE,
                broker_b_conid INTEGER UNIQUE,
                description TEXT
            )",
            [],
        )
        .unwrap();
        SymbolRegistry::from_connection(conn).unwrap()
    }

    fn test_server() -> RpcServer {
        let registry = Arc::new(fresh_registry());
        let mut bus = EventBus::default();
        bus.start();
        let oms = Arc::new(OmsCache::spawn(&bus));
        let mut router = OrderRouter::new(registry, oms);
        router.register_account(
            "ib_main",
            Arc::new(FakeGateway { alias: "ib_main".to_string() }),
            AccountPolicy { allow_short: false, auto_fill_enabled: true },
        );
        RpcServer::new(
            Arc::new(router),
            vec![BrokerListEntry {
                account_alias: "ib_main".to_string(),
                broker_kind: "broker_b",
                is_default: true,
            }],
            "tcp://127.0.0.1:0".to_string(),
        )
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn cancel_order_rejects_malformed_vt_orderid() {
        let server = test_server();
        let result = server.handle_call(RpcCall::CancelOrder { vt_orderid: "no-dot-here".to_string() }).await;
        assert!(matches!(result, RpcResult::Error(_)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn cancel_order_rejects_unknown_account() {
        let server = test_server();
        let result = server
            .handle_call(RpcCall::CancelOrder { vt_orderid: "nobody.1".to_string() })
            .await;
        assert!(matches!(result, RpcResult::Error(_)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn cancel_order_acks_for_a_known_account() {
        let server = test_server();
        let result = server
            .handle_call(RpcCall::CancelOrder { vt_orderid: "ib_main.1".to_string() })
            .await;
        assert!(matches!(result, RpcResult::Ack));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn broker_list_returns_the_configured_accounts() {
        let server = test_server();
        let result = server.handle_call(RpcCall::BrokerList).await;
        match result {
            RpcResult::BrokerList(entries) => {
                assert_eq!(entries.len(), 1);
                assert_eq!(entries[0].account_alias, "ib_main");
                assert!(entries[0].is_default);
            }
            _ => panic!("expected BrokerList"),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn subscribe_bars_rejects_unknown_account() {
        let server = test_server();
        let result = server
            .handle_call(RpcCall::SubscribeBars {
                symbols: vec!["AAPL".to_string()],
                account_alias: "nobody".to_string(),
                use_rth: false,
            })
            .await;
        assert!(matches!(result, RpcResult::Error(_)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn subscribe_bars_acks_for_a_known_account() {
        let server = test_server();
        let result = server
            .handle_call(RpcCall::SubscribeBars {
                symbols: vec!["AAPL".to_string()],
                account_alias: "ib_main".to_string(),
                use_rth: false,
            })
            .await;
        assert!(matches!(result, RpcResult::Ack));
    }
}
