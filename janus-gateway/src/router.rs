//! Order Router (§4.7): `OrderIntent` → resolved, broker-specific
//! `OrderRequest`, with the short-sale policy and capability gate applied
//! before anything reaches a gateway.

use crate::autofill::{self, ContractDetailsCache};
use crate::error::RouterError;
use crate::gateway::{BrokerGateway, BrokerSymbolId, OrderRequest};
use janus_core::config::BrokerKind;
use janus_core::data::{Direction, IntentSide, OrderIntent, OrderType};
use janus_oms::OmsCache;
use janus_registry::{RegistryError, SymbolRegistry};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;

/// Per-account routing configuration the router needs beyond what lives on
/// the registry (§4.7 step 3 `allow_short`).
#[derive(Debug, Clone, Copy)]
pub struct AccountPolicy {
    pub allow_short: bool,
    /// Whether auto-fill is permitted for this account's broker (§4.7 step 1
    /// "reject if registry has no entry *and* auto-fill is disabled for the
    /// target broker").
    pub auto_fill_enabled: bool,
}

struct RoutedAccount {
    gateway: Arc<dyn BrokerGateway>,
    policy: AccountPolicy,
}

/// Translates `OrderIntent`s into adapter `send_order` calls (§4.7).
pub struct OrderRouter {
    registry: Arc<SymbolRegistry>,
    oms: Arc<OmsCache>,
    accounts: HashMap<String, RoutedAccount>,
    contract_cache: ContractDetailsCache,
}

impl std::fmt::Debug for OrderRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderRouter")
            .field("accounts", &self.accounts.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl OrderRouter {
    pub fn new(registry: Arc<SymbolRegistry>, oms: Arc<OmsCache>) -> Self {
        Self {
            registry,
            oms,
            accounts: HashMap::new(),
            contract_cache: ContractDetailsCache::new(),
        }
    }

    pub fn register_account(
        &mut self,
        account_alias: impl Into<String>,
        gateway: Arc<dyn BrokerGateway>,
        policy: AccountPolicy,
    ) {
        self.accounts
            .insert(account_alias.into(), RoutedAccount { gateway, policy });
    }

    /// Every distinct [`BrokerKind`] among currently-registered accounts,
    /// for harmony's "for each connected broker kind" iteration (§4.8).
    pub fn connected_broker_kinds(&self) -> Vec<BrokerKind> {
        let has_a = self
            .accounts
            .values()
            .any(|a| a.gateway.broker_kind() == BrokerKind::BrokerA);
        let has_b = self
            .accounts
            .values()
            .any(|a| a.gateway.broker_kind() == BrokerKind::BrokerB);
        let mut kinds = Vec::with_capacity(2);
        if has_a {
            kinds.push(BrokerKind::BrokerA);
        }
        if has_b {
            kinds.push(BrokerKind::BrokerB);
        }
        kinds
    }

    /// One gateway per connected broker kind, used by harmony to run
    /// auto-fill without needing a specific account (§4.8).
    pub fn gateway_for_kind(&self, kind: BrokerKind) -> Option<Arc<dyn BrokerGateway>> {
        self.accounts
            .values()
            .find(|a| a.gateway.broker_kind() == kind)
            .map(|a| Arc::clone(&a.gateway))
    }

    pub fn registry(&self) -> &SymbolRegistry {
        &self.registry
    }

    pub fn contract_cache(&self) -> &ContractDetailsCache {
        &self.contract_cache
    }

    /// The gateway registered for one account alias, used by RPC methods
    /// that take an explicit account (`cancel_order` via the `vt_orderid`'s
    /// account half, `subscribe_bars`/`unsubscribe_bars`) (§6).
    pub fn gateway_for_account(&self, account_alias: &str) -> Option<Arc<dyn BrokerGateway>> {
        self.accounts.get(account_alias).map(|a| Arc::clone(&a.gateway))
    }

    /// Every registered account's gateway, for `sync()`'s "full snapshot
    /// refresh across all connected adapters" (§6).
    pub fn all_gateways(&self) -> Vec<Arc<dyn BrokerGateway>> {
        self.accounts.values().map(|a| Arc::clone(&a.gateway)).collect()
    }

    /// Runs §4.7's five steps and calls `send_order` on the resolved
    /// gateway. Returns the `vt_orderid` the gateway acked with.
    pub async fn route(&self, intent: OrderIntent) -> Result<String, RouterError> {
        validate_intent(&intent)?;

        let account = self
            .accounts
            .get(&intent.account_alias)
            .ok_or_else(|| RouterError::UnknownAccount(intent.account_alias.clone()))?;

        let broker_symbol_id = self.resolve_symbol(account, &intent.symbol).await?;

        let direction = self.resolve_direction(account, &intent)?;

        if !account.gateway.supported_order_types().supports(intent.order_type) {
            return Err(RouterError::CapabilityUnsupported {
                broker: account.gateway.broker_kind().as_str(),
                order_type: intent.order_type,
            });
        }

        let canonical = janus_registry::normalize(&intent.symbol);
        let request = OrderRequest {
            account_alias: intent.account_alias.clone(),
            vt_symbol: canonical,
            broker_symbol_id,
            direction,
            intent_side: intent.side,
            order_type: intent.order_type,
            qty: intent.qty,
            limit_price: intent.limit_price,
            stop_price: intent.stop_price,
            tif: intent.tif,
        };

        account
            .gateway
            .send_order(request)
            .await
            .map_err(RouterError::from)
    }

    async fn resolve_symbol(
        &self,
        account: &RoutedAccount,
        symbol: &str,
    ) -> Result<BrokerSymbolId, RouterError> {
        let canonical = janus_registry::normalize(symbol);
        let kind = account.gateway.broker_kind();

        let mut entry = self.registry.lookup_by_canonical(&canonical);
        let missing_id = entry
            .as_ref()
            .map(|e| match kind {
                BrokerKind::BrokerA => !e.has_broker_a_id(),
                BrokerKind::BrokerB => !e.has_broker_b_id(),
            })
            .unwrap_or(true);

        if missing_id {
            if !account.policy.auto_fill_enabled {
                return Err(RegistryError::Miss(canonical).into());
            }
            autofill::auto_fill(
                &self.registry,
                account.gateway.as_ref(),
                &canonical,
                &self.contract_cache,
            )
            .await?;
            entry = self.registry.lookup_by_canonical(&canonical);
        }

        let entry = entry.ok_or_else(|| RegistryError::Miss(canonical.clone()))?;
        match kind {
            BrokerKind::BrokerA => entry
                .broker_a_ticker
                .clone()
                .map(BrokerSymbolId::BrokerATicker)
                .ok_or_else(|| RegistryError::Miss(canonical).into()),
            BrokerKind::BrokerB => entry
                .broker_b_conid
                .map(BrokerSymbolId::BrokerBConid)
                .ok_or_else(|| RegistryError::Miss(canonical).into()),
        }
    }

    fn resolve_direction(
        &self,
        account: &RoutedAccount,
        intent: &OrderIntent,
    ) -> Result<Direction, RouterError> {
        match intent.side {
            IntentSide::Buy => Ok(Direction::Long),
            IntentSide::Cover => Ok(Direction::Long),
            IntentSide::Short => Ok(Direction::Short),
            IntentSide::Sell => {
                let net = self.net_position(&intent.account_alias, &intent.symbol);
                if net > Decimal::ZERO {
                    Ok(Direction::Long)
                } else if net < Decimal::ZERO {
                    Ok(Direction::Short)
                } else if account.policy.allow_short {
                    Ok(Direction::Short)
                } else {
                    Err(RouterError::InvalidIntent(format!(
                        "sell with no position on {} and account does not allow short",
                        intent.symbol
                    )))
                }
            }
        }
    }

    /// Long volume minus short volume for `(account_alias, symbol)`, per
    /// §4.7 step 3's position-sign interpretation.
    fn net_position(&self, account_alias: &str, symbol: &str) -> Decimal {
        self.oms
            .positions_snapshot()
            .into_iter()
            .filter(|p| p.account_alias == account_alias && p.symbol == symbol)
            .fold(Decimal::ZERO, |acc, p| match p.direction {
                Direction::Long => acc + p.volume,
                Direction::Short => acc - p.volume,
            })
    }
}

fn validate_intent(intent: &OrderIntent) -> Result<(), RouterError> {
    match intent.order_type {
        OrderType::Market => {}
        OrderType::Limit if intent.limit_price.is_some() => {}
        OrderType::Limit => {
            return Err(RouterError::InvalidIntent(
                "LIMIT order requires limit_price".into(),
            ))
        }
        OrderType::Stop if intent.stop_price.is_some() => {}
        OrderType::Stop => {
            return Err(RouterError::InvalidIntent(
                "STOP order requires stop_price".into(),
            ))
        }
        OrderType::StopLimit if intent.limit_price.is_some() && intent.stop_price.is_some() => {}
        OrderType::StopLimit => {
            return Err(RouterError::InvalidIntent(
                "STOP_LIMIT order requires both stop_price and limit_price".into(),
            ))
        }
    }
    if intent.qty <= Decimal::ZERO {
        return Err(RouterError::InvalidIntent("qty must be positive".into()));
    }
    Ok(())
}
