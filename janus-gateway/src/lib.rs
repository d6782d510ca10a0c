#![forbid(unsafe_code)]
#![warn(unused, missing_debug_implementations, rust_2018_idioms)]

//! # Janus Gateway
//!
//! The broker-agnostic capability contract ([`BrokerGateway`], §4.4), the
//! order router ([`router::OrderRouter`], §4.7), the auto-fill primitive
//! both the router and harmony call into ([`autofill`], §4.1), and the
//! harmony orchestrator ([`harmony`], §4.8). Broker adapters (`janus-broker-a`,
//! `janus-broker-b`) depend on this crate to implement [`BrokerGateway`];
//! this crate has no knowledge of either adapter's wire protocol.

pub mod autofill;
pub mod error;
pub mod gateway;
pub mod harmony;
pub mod router;

pub use autofill::ContractDetailsCache;
pub use error::{GatewayError, HarmonyError, RouterError};
pub use gateway::{
    BarsRequest, BrokerGateway, BrokerKind, BrokerSymbolId, ContractDetails, ContractQuery,
    OrderRequest, SubscribeRequest, SupportedOrderTypes,
};
pub use harmony::{BrokerBreakdown, HarmonySummary};
pub use router::{AccountPolicy, OrderRouter};

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use janus_bus::EventBus;
    use janus_core::data::{Direction, IntentSide, OrderIntent, OrderType, TimeInForce};
    use janus_oms::OmsCache;
    use janus_registry::SymbolRegistry;
    use parking_lot::Mutex;
    use rusqlite::Connection;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    #[derive(Debug)]
    struct FakeGateway {
        kind: BrokerKind,
        alias: String,
        supported: SupportedOrderTypes,
        contract_results: Mutex<Vec<ContractDetails>>,
        sent: Mutex<Vec<OrderRequest>>,
    }

    #[async_trait]
    impl BrokerGateway for FakeGateway {
        fn broker_kind(&self) -> BrokerKind {
            self.kind
        }
        fn account_alias(&self) -> &str {
            &self.alias
        }
        fn supported_order_types(&self) -> SupportedOrderTypes {
            self.supported
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
        async fn send_order(&self, req: OrderRequest) -> Result<String, GatewayError> {
            let vt_orderid = format!("{}.1", req.account_alias);
            self.sent.lock().push(req);
            Ok(vt_orderid)
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
            Ok(self.contract_results.lock().clone())
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
        janus_registry::SymbolRegistry::from_connection(conn).unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn happy_limit_buy_resolves_and_sends() {
        let registry = Arc::new(fresh_registry());
        registry
            .ensure("AAPL", janus_registry::EnsureFields::broker_b(265598))
            .unwrap();

        let mut bus = EventBus::default();
        bus.start();
        let oms = Arc::new(OmsCache::spawn(&bus));

        let gateway: Arc<dyn BrokerGateway> = Arc::new(FakeGateway {
            kind: BrokerKind::BrokerB,
            alias: "ib_main".into(),
            supported: SupportedOrderTypes::all(),
            contract_results: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
        });

        let mut router = OrderRouter::new(Arc::clone(&registry), Arc::clone(&oms));
        router.register_account(
            "ib_main",
            Arc::clone(&gateway),
            AccountPolicy {
                allow_short: false,
                auto_fill_enabled: true,
            },
        );

        let intent = OrderIntent {
            account_alias: "ib_main".into(),
            symbol: "aapl".into(),
            side: IntentSide::Buy,
            order_type: OrderType::Limit,
            qty: dec!(10),
            limit_price: Some(dec!(150.00)),
            stop_price: None,
            tif: TimeInForce::Gtc,
        };

        let vt_orderid = router.route(intent).await.unwrap();
        assert_eq!(vt_orderid, "ib_main.1");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn ambiguous_autofill_rejects_without_write() {
        let registry = Arc::new(fresh_registry());
        let mut bus = EventBus::default();
        bus.start();
        let oms = Arc::new(OmsCache::spawn(&bus));

        let gateway: Arc<dyn BrokerGateway> = Arc::new(FakeGateway {
            kind: BrokerKind::BrokerB,
            alias: "ib_main".into(),
            supported: SupportedOrderTypes::all(),
            contract_results: Mutex::new(vec![
                ContractDetails {
                    broker_a_ticker: None,
                    broker_b_conid: Some(1),
                    description: "ACME A".into(),
                },
                ContractDetails {
                    broker_a_ticker: None,
                    broker_b_conid: Some(2),
                    description: "ACME B".into(),
                },
            ]),
            sent: Mutex::new(Vec::new()),
        });

        let mut router = OrderRouter::new(Arc::clone(&registry), Arc::clone(&oms));
        router.register_account(
            "ib_main",
            Arc::clone(&gateway),
            AccountPolicy {
                allow_short: false,
                auto_fill_enabled: true,
            },
        );

        let intent = OrderIntent {
            account_alias: "ib_main".into(),
            symbol: "ACME".into(),
            side: IntentSide::Buy,
            order_type: OrderType::Market,
            qty: dec!(1),
            limit_price: None,
            stop_price: None,
            tif: TimeInForce::Gtc,
        };

        let err = router.route(intent).await.unwrap_err();
        assert!(matches!(
            err,
            RouterError::Gateway(GatewayError::Registry(janus_registry::RegistryError::Ambiguous(..)))
        ));
        assert!(registry.lookup_by_canonical("ACME").is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn capability_gate_rejects_unsupported_order_type() {
        let registry = Arc::new(fresh_registry());
        registry
            .ensure("MSFT", janus_registry::EnsureFields::broker_b(1))
            .unwrap();
        let mut bus = EventBus::default();
        bus.start();
        let oms = Arc::new(OmsCache::spawn(&bus));

        let gateway: Arc<dyn BrokerGateway> = Arc::new(FakeGateway {
            kind: BrokerKind::BrokerA,
            alias: "alpaca_main".into(),
            supported: SupportedOrderTypes::no_stop_limit(),
            contract_results: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
        });
        registry
            .ensure("MSFT", janus_registry::EnsureFields::broker_a("MSFT"))
            .unwrap();

        let mut router = OrderRouter::new(Arc::clone(&registry), Arc::clone(&oms));
        router.register_account(
            "alpaca_main",
            Arc::clone(&gateway),
            AccountPolicy {
                allow_short: false,
                auto_fill_enabled: false,
            },
        );

        let intent = OrderIntent {
            account_alias: "alpaca_main".into(),
            symbol: "MSFT".into(),
            side: IntentSide::Buy,
            order_type: OrderType::StopLimit,
            qty: dec!(100),
            limit_price: Some(dec!(301)),
            stop_price: Some(dec!(300)),
            tif: TimeInForce::Gtc,
        };

        let err = router.route(intent).await.unwrap_err();
        assert!(matches!(err, RouterError::CapabilityUnsupported { .. }));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn sell_with_zero_position_opens_a_short_when_allowed() {
        let registry = Arc::new(fresh_registry());
        registry
            .ensure("TSLA", janus_registry::EnsureFields::broker_a("TSLA"))
            .unwrap();
        let mut bus = EventBus::default();
        bus.start();
        let oms = Arc::new(OmsCache::spawn(&bus));

        let fake = Arc::new(FakeGateway {
            kind: BrokerKind::BrokerA,
            alias: "alpaca_main".into(),
            supported: SupportedOrderTypes::all(),
            contract_results: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
        });
        let gateway: Arc<dyn BrokerGateway> = Arc::clone(&fake);

        let mut router = OrderRouter::new(Arc::clone(&registry), Arc::clone(&oms));
        router.register_account(
            "alpaca_main",
            Arc::clone(&gateway),
            AccountPolicy {
                allow_short: true,
                auto_fill_enabled: false,
            },
        );

        let intent = OrderIntent {
            account_alias: "alpaca_main".into(),
            symbol: "TSLA".into(),
            side: IntentSide::Sell,
            order_type: OrderType::Market,
            qty: dec!(5),
            limit_price: None,
            stop_price: None,
            tif: TimeInForce::Gtc,
        };

        router.route(intent).await.unwrap();
        let sent = fake.sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].direction, Direction::Short);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn sell_with_zero_position_rejects_when_shorting_disallowed() {
        let registry = Arc::new(fresh_registry());
        registry
            .ensure("TSLA", janus_registry::EnsureFields::broker_a("TSLA"))
            .unwrap();
        let mut bus = EventBus::default();
        bus.start();
        let oms = Arc::new(OmsCache::spawn(&bus));

        let gateway: Arc<dyn BrokerGateway> = Arc::new(FakeGateway {
            kind: BrokerKind::BrokerA,
            alias: "alpaca_main".into(),
            supported: SupportedOrderTypes::all(),
            contract_results: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
        });

        let mut router = OrderRouter::new(Arc::clone(&registry), Arc::clone(&oms));
        router.register_account(
            "alpaca_main",
            Arc::clone(&gateway),
            AccountPolicy {
                allow_short: false,
                auto_fill_enabled: false,
            },
        );

        let intent = OrderIntent {
            account_alias: "alpaca_main".into(),
            symbol: "TSLA".into(),
            side: IntentSide::Sell,
            order_type: OrderType::Market,
            qty: dec!(5),
            limit_price: None,
            stop_price: None,
            tif: TimeInForce::Gtc,
        };

        let err = router.route(intent).await.unwrap_err();
        assert!(matches!(err, RouterError::InvalidIntent(_)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn sell_reducing_an_existing_long_keeps_long_direction() {
        use janus_bus::Event;
        use janus_core::data::{Direction, PositionData};

        let registry = Arc::new(fresh_registry());
        registry
            .ensure("TSLA", janus_registry::EnsureFields::broker_a("TSLA"))
            .unwrap();
        let mut bus = EventBus::default();
        bus.start();
        let oms = Arc::new(OmsCache::spawn(&bus));

        bus.publish(Event::Position(Arc::new(PositionData {
            account_alias: "alpaca_main".into(),
            symbol: "TSLA".into(),
            direction: Direction::Long,
            volume: dec!(10),
            price: dec!(200),
            pnl: dec!(0),
            frozen: dec!(0),
        })));
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let gateway: Arc<dyn BrokerGateway> = Arc::new(FakeGateway {
            kind: BrokerKind::BrokerA,
            alias: "alpaca_main".into(),
            supported: SupportedOrderTypes::all(),
            contract_results: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
        });

        let mut router = OrderRouter::new(Arc::clone(&registry), Arc::clone(&oms));
        router.register_account(
            "alpaca_main",
            Arc::clone(&gateway),
            AccountPolicy {
                allow_short: false,
                auto_fill_enabled: false,
            },
        );

        let intent = OrderIntent {
            account_alias: "alpaca_main".into(),
            symbol: "TSLA".into(),
            side: IntentSide::Sell,
            order_type: OrderType::Market,
            qty: dec!(4),
            limit_price: None,
            stop_price: None,
            tif: TimeInForce::Gtc,
        };

        router.route(intent).await.unwrap();
    }
}
