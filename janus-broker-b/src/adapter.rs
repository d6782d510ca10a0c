//! The [`BrokerGateway`] implementation for broker B: a thin command-channel
//! wrapper around the [`crate::engine::Engine`] task. No method here touches
//! the socket directly; everything is forwarded and awaited via a oneshot.

use crate::engine::{Command, Engine};
use crate::error::BrokerBError;
use async_trait::async_trait;
use janus_bus::EventBus;
use janus_gateway::{
    BarsRequest, BrokerGateway, BrokerKind, ContractDetails, ContractQuery, GatewayError,
    OrderRequest, SubscribeRequest, SupportedOrderTypes,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Bound on how long a caller waits for contract-details before the adapter
/// treats the request as a miss (§4.1, §5 "Cancellation & timeouts").
const CONTRACT_DETAILS_TIMEOUT: Duration = Duration::from_secs(5);

pub struct BrokerBAdapter {
    account_alias: String,
    cmd_tx: mpsc::UnboundedSender<Command>,
    task: JoinHandle<()>,
    bars_subscribed: parking_lot::Mutex<std::collections::HashSet<String>>,
}

impl BrokerBAdapter {
    /// Spawns the I/O loop task and returns a handle to it. `host`/`port`
    /// are the broker B gateway's TCP endpoint.
    pub fn spawn(host: String, port: u16, account_alias: String, bus: Arc<EventBus>) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let engine = Engine::new(host, port, account_alias.clone(), bus, cmd_rx);
        let task = tokio::spawn(engine.run());
        Self {
            account_alias,
            cmd_tx,
            task,
            bars_subscribed: parking_lot::Mutex::new(std::collections::HashSet::new()),
        }
    }

    async fn call<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<T, BrokerBError>>) -> Command,
    ) -> Result<T, GatewayError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(build(tx))
            .map_err(|_| GatewayError::from(BrokerBError::LoopGone))?;
        match rx.await {
            Ok(result) => result.map_err(GatewayError::from),
            Err(_) => Err(GatewayError::from(BrokerBError::LoopGone)),
        }
    }
}

impl Drop for BrokerBAdapter {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl std::fmt::Debug for BrokerBAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerBAdapter")
            .field("account_alias", &self.account_alias)
            .finish()
    }
}

#[async_trait]
impl BrokerGateway for BrokerBAdapter {
    fn broker_kind(&self) -> BrokerKind {
        BrokerKind::BrokerB
    }

    fn account_alias(&self) -> &str {
        &self.account_alias
    }

    fn supported_order_types(&self) -> SupportedOrderTypes {
        SupportedOrderTypes::all()
    }

    async fn connect(&self) -> Result<(), GatewayError> {
        self.call(Command::Connect).await
    }

    async fn close(&self) -> Result<(), GatewayError> {
        self.call(Command::Close).await
    }

    async fn subscribe(&self, req: SubscribeRequest) -> Result<(), GatewayError> {
        self.call(|reply| Command::Subscribe(req, reply)).await
    }

    async fn unsubscribe(&self, req: SubscribeRequest) -> Result<(), GatewayError> {
        self.call(|reply| Command::Unsubscribe(req, reply)).await
    }

    /// Broker B's wire protocol has no historical-bars request modeled
    /// (§6: bars are a downstream-data concern, not required by the core).
    /// The adapter just tracks the subscription set so repeat/duplicate
    /// calls are idempotent.
    async fn subscribe_bars(&self, req: BarsRequest) -> Result<(), GatewayError> {
        self.bars_subscribed.lock().insert(req.vt_symbol);
        Ok(())
    }

    async fn unsubscribe_bars(&self, req: BarsRequest) -> Result<(), GatewayError> {
        self.bars_subscribed.lock().remove(&req.vt_symbol);
        Ok(())
    }

    async fn send_order(&self, req: OrderRequest) -> Result<String, GatewayError> {
        self.call(|reply| Command::SendOrder(req, reply)).await
    }

    async fn cancel_order(&self, vt_orderid: &str) -> Result<(), GatewayError> {
        let vt_orderid = vt_orderid.to_string();
        self.call(|reply| Command::CancelOrder(vt_orderid, reply)).await
    }

    async fn query_account(&self) -> Result<(), GatewayError> {
        self.call(Command::QueryAccount).await
    }

    async fn query_position(&self) -> Result<(), GatewayError> {
        self.call(Command::QueryPosition).await
    }

    async fn query_open_orders(&self) -> Result<(), GatewayError> {
        self.call(Command::QueryOpenOrders).await
    }

    async fn request_contract_details(
        &self,
        query: ContractQuery,
    ) -> Result<Vec<ContractDetails>, GatewayError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::RequestContractDetails(query, tx))
            .map_err(|_| GatewayError::from(BrokerBError::LoopGone))?;

        match tokio::time::timeout(CONTRACT_DETAILS_TIMEOUT, rx).await {
            Ok(Ok(result)) => result.map_err(GatewayError::from),
            Ok(Err(_)) => Err(GatewayError::from(BrokerBError::LoopGone)),
            // The engine keeps the pending reqid around; a late reply just
            // finds the oneshot sender's receiver gone and is dropped.
            Err(_) => Err(GatewayError::from(BrokerBError::ContractDetailsTimeout)),
        }
    }
}
