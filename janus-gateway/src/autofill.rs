//! Auto-fill: the single-attempt broker lookup that fills a missing
//! broker id on a registry entry, used by both the router (§4.7 step 2)
//! and harmony (§4.8).

use crate::error::GatewayError;
use crate::gateway::{BrokerGateway, BrokerKind, ContractDetails, ContractQuery};
use janus_registry::{EnsureFields, RegistryError, SymbolRegistry};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

/// Caches `request_contract_details` results per `(broker, canonical
/// symbol)` for the process lifetime, so repeated auto-fill attempts on an
/// ambiguous or missing symbol don't re-query the broker (§11 supplement:
/// "Contract details cache"). Does not change the ambiguity policy — a
/// cached ambiguous result is still ambiguous.
#[derive(Debug, Default)]
pub struct ContractDetailsCache {
    entries: RwLock<HashMap<(BrokerKind, String), Vec<ContractDetails>>>,
}

impl ContractDetailsCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn get(&self, kind: BrokerKind, symbol: &str) -> Option<Vec<ContractDetails>> {
        self.entries.read().get(&(kind, symbol.to_string())).cloned()
    }

    fn insert(&self, kind: BrokerKind, symbol: String, results: Vec<ContractDetails>) {
        self.entries.write().insert((kind, symbol), results);
    }
}

/// Attempts to fill the broker id `gateway.broker_kind()` needs for
/// `canonical_symbol`, using the default filter for that broker family
/// (§4.1). Writes only on exactly one match; zero or more than one is
/// surfaced as [`RegistryError::Miss`]/[`RegistryError::Ambiguous`] without
/// touching the store.
pub async fn auto_fill(
    registry: &SymbolRegistry,
    gateway: &dyn BrokerGateway,
    canonical_symbol: &str,
    cache: &ContractDetailsCache,
) -> Result<(), GatewayError> {
    let canonical = janus_registry::normalize(canonical_symbol);
    let kind = gateway.broker_kind();

    let results = if let Some(cached) = cache.get(kind, &canonical) {
        cached
    } else {
        let query = match kind {
            BrokerKind::BrokerB => ContractQuery::default_us_stock(&canonical),
            BrokerKind::BrokerA => ContractQuery::ticker_only(&canonical),
        };
        let fetched = match gateway.request_contract_details(query).await {
            Ok(results) => results,
            Err(GatewayError::ContractDetailsTimeout) => Vec::new(),
            Err(other) => return Err(other),
        };
        cache.insert(kind, canonical.clone(), fetched.clone());
        fetched
    };

    match results.len() {
        1 => {
            let details = &results[0];
            let fields = match gateway.broker_kind() {
                BrokerKind::BrokerB => {
                    let conid = details.broker_b_conid.ok_or_else(|| {
                        GatewayError::Transient(
                            "broker B contract details missing conid".to_string(),
                        )
                    })?;
                    EnsureFields::broker_b(conid)
                }
                BrokerKind::BrokerA => {
                    let ticker = details.broker_a_ticker.clone().ok_or_else(|| {
                        GatewayError::Transient(
                            "broker A contract details missing ticker".to_string(),
                        )
                    })?;
                    EnsureFields::broker_a(ticker)
                }
            };
            registry.ensure(&canonical, fields)?;
            Ok(())
        }
        0 => Err(RegistryError::Miss(canonical).into()),
        n => {
            warn!(symbol = %canonical, matches = n, "ambiguous auto-fill, no write");
            Err(RegistryError::Ambiguous(canonical, n).into())
        }
    }
}

/// Convenience wrapper used by the router when a gateway is looked up by
/// account alias rather than held directly.
pub async fn auto_fill_for_account(
    registry: &SymbolRegistry,
    gateway: &Arc<dyn BrokerGateway>,
    canonical_symbol: &str,
    cache: &ContractDetailsCache,
) -> Result<(), GatewayError> {
    auto_fill(registry, gateway.as_ref(), canonical_symbol, cache).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{BarsRequest, OrderRequest, SubscribeRequest, SupportedOrderTypes};
    use async_trait::async_trait;
    use rusqlite::Connection;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct CountingGateway {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl BrokerGateway for CountingGateway {
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
            unreachable!("auto-fill never sends orders")
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
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![ContractDetails {
                broker_a_ticker: None,
                broker_b_conid: Some(265598),
                description: "Apple Inc".to_string(),
            }])
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

    #[tokio::test(flavor = "multi_thread")]
    async fn repeated_lookups_for_the_same_symbol_hit_the_cache() {
        let registry = fresh_registry();
        let gateway = CountingGateway {
            calls: AtomicUsize::new(0),
        };
        let cache = ContractDetailsCache::new();

        auto_fill(&registry, &gateway, "AAPL", &cache).await.unwrap();
        assert_eq!(gateway.calls.load(Ordering::SeqCst), 1);

        auto_fill(&registry, &gateway, "AAPL", &cache).await.unwrap();
        assert_eq!(
            gateway.calls.load(Ordering::SeqCst),
            1,
            "second lookup for the same symbol should not re-query the broker"
        );
    }
}
