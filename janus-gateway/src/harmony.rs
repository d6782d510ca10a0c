//! Harmony Orchestrator (§4.8): one-shot, user-initiated registry backfill
//! across every *connected* broker kind.

use crate::autofill;
use crate::error::{GatewayError, HarmonyError};
use crate::router::OrderRouter;
use janus_core::config::BrokerKind;
use janus_registry::RegistryError;
use std::collections::HashMap;
use tracing::{info, warn};

/// Per-broker-kind counts, summed into the totals (§11 supplement: "Harmony
/// dry-run count surfaced per broker kind, not just totals").
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BrokerBreakdown {
    pub filled: u32,
    pub skipped_ambiguous: u32,
    pub skipped_no_match: u32,
}

/// The `{filled, skipped, errors}` shape §6's `harmony()` RPC returns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HarmonySummary {
    pub filled: u32,
    pub skipped_ambiguous: u32,
    pub skipped_no_match: u32,
    pub errors: u32,
    pub per_broker: HashMap<&'static str, BrokerBreakdown>,
}

/// Runs §4.8's full backfill: for each connected broker kind, iterate
/// canonical symbols missing that broker's id and attempt auto-fill. A
/// store write error aborts the *entire* run and returns `Err` — symbols
/// already durably written before the abort stay written (§4.8, §8
/// scenario 6).
pub async fn run(router: &OrderRouter) -> Result<HarmonySummary, HarmonyError> {
    let mut summary = HarmonySummary::default();

    for kind in router.connected_broker_kinds() {
        let Some(gateway) = router.gateway_for_kind(kind) else {
            continue;
        };
        let breakdown = summary.per_broker.entry(kind.as_str()).or_default();

        let missing_symbols: Vec<String> = router
            .registry()
            .canonical_symbols()
            .into_iter()
            .filter(|symbol| {
                router
                    .registry()
                    .lookup_by_canonical(symbol)
                    .map(|entry| match kind {
                        BrokerKind::BrokerA => !entry.has_broker_a_id(),
                        BrokerKind::BrokerB => !entry.has_broker_b_id(),
                    })
                    .unwrap_or(false)
            })
            .collect();

        for symbol in missing_symbols {
            match autofill::auto_fill(router.registry(), gateway.as_ref(), &symbol, router.contract_cache()).await {
                Ok(()) => {
                    breakdown.filled += 1;
                    summary.filled += 1;
                }
                Err(GatewayError::Registry(RegistryError::Ambiguous(..))) => {
                    breakdown.skipped_ambiguous += 1;
                    summary.skipped_ambiguous += 1;
                }
                Err(GatewayError::Registry(RegistryError::Miss(_))) => {
                    breakdown.skipped_no_match += 1;
                    summary.skipped_no_match += 1;
                }
                Err(GatewayError::Registry(store_err @ RegistryError::StoreWrite(_)))
                | Err(GatewayError::Registry(store_err @ RegistryError::StoreUnavailable(_)))
                | Err(GatewayError::Registry(store_err @ RegistryError::Conflict { .. })) => {
                    warn!(symbol = %symbol, error = %store_err, "harmony run aborted on store error");
                    return Err(HarmonyError::StoreError(store_err));
                }
                Err(other) => {
                    summary.errors += 1;
                    warn!(symbol = %symbol, error = %other, "harmony auto-fill failed");
                }
            }
        }
    }

    info!(
        filled = summary.filled,
        skipped_ambiguous = summary.skipped_ambiguous,
        skipped_no_match = summary.skipped_no_match,
        errors = summary.errors,
        "harmony run complete"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{BarsRequest, BrokerGateway, OrderRequest, SubscribeRequest, SupportedOrderTypes};
    use async_trait::async_trait;
    use janus_bus::EventBus;
    use janus_oms::OmsCache;
    use janus_registry::SymbolRegistry;
    use rusqlite::Connection;
    use std::sync::Arc;

    /// Returns exactly one contract-details result per lookup, keyed by
    /// whatever conid the symbol's position in `order` implies, so each of
    /// the three missing symbols in the abort test auto-fills to a distinct
    /// conid.
    #[derive(Debug)]
    struct SequentialGateway {
        next_conid: std::sync::atomic::AtomicI64,
    }

    #[async_trait]
    impl BrokerGateway for SequentialGateway {
        fn broker_kind(&self) -> BrokerKind {
            BrokerKind::BrokerB
        }
        fn account_alias(&self) -> &str {
            "ib_main"
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
            unreachable!("harmony never sends orders")
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
            _query: crate::gateway::ContractQuery,
        ) -> Result<Vec<crate::gateway::ContractDetails>, GatewayError> {
            let conid = self
                .next_conid
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(vec![crate::gateway::ContractDetails {
                broker_a_ticker: None,
                broker_b_conid: Some(conid),
                description: "synthetic".to_string(),
            }])
        }
    }

    fn registry_with_trigger_on(poison_symbol: &str) -> SymbolRegistry {
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
        conn.execute(
            &format!(
                "CREATE TRIGGER poison_{sym} BEFORE UPDATE OF broker_b_conid ON registry
                 WHEN NEW.canonical_symbol = '{sym}'
                 BEGIN SELECT RAISE(ABORT, 'simulated store write failure'); END",
                sym = poison_symbol
            ),
            [],
        )
        .unwrap();
        SymbolRegistry::from_connection(conn).unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn store_write_error_aborts_run_without_further_commits() {
        // Three canonical symbols missing a broker-B conid; the store
        // rejects the third insert. The first two must be durably written
        // before the abort (§4.8, §8 scenario 6).
        let registry = Arc::new(registry_with_trigger_on("SYM3"));
        let mut bus = EventBus::default();
        bus.start();
        let oms = Arc::new(OmsCache::spawn(&bus));

        let gateway: Arc<dyn BrokerGateway> = Arc::new(SequentialGateway {
            next_conid: std::sync::atomic::AtomicI64::new(1),
        });

        let mut router = OrderRouter::new(Arc::clone(&registry), Arc::clone(&oms));
        router.register_account(
            "ib_main",
            Arc::clone(&gateway),
            crate::router::AccountPolicy {
                allow_short: false,
                auto_fill_enabled: true,
            },
        );

        // Pre-seed the three symbols with no broker-B id so harmony's
        // "missing that broker's id" filter picks them up in insertion
        // order (SQLite preserves rowid/insertion order for an unindexed
        // full scan of this size).
        for sym in ["SYM1", "SYM2", "SYM3"] {
            registry
                .ensure(sym, janus_registry::EnsureFields::default())
                .unwrap();
        }

        let err = run(&router).await.unwrap_err();
        assert!(matches!(err, HarmonyError::StoreError(_)));

        assert!(registry
            .lookup_by_canonical("SYM1")
            .unwrap()
            .has_broker_b_id());
        assert!(registry
            .lookup_by_canonical("SYM2")
            .unwrap()
            .has_broker_b_id());
        assert!(!registry
            .lookup_by_canonical("SYM3")
            .unwrap()
            .has_broker_b_id());
    }
}
