//! The Janus server binary: loads configuration, wires the SymbolRegistry,
//! EventBus, OMS cache, and broker adapters into an [`OrderRouter`], then
//! serves the RPC surface (§4.9, §6) until asked to stop.
//!
//! Shutdown order follows §5: stop accepting new RPC requests, stop the
//! event bus, signal the streaming/publisher tasks to exit, close every
//! broker adapter, then join every thread the server spawned.

mod error;

use error::ServerError;
use janus_bus::EventBus;
use janus_core::config::{BrokerKind, ServerConfig};
use janus_core::logging;
use janus_gateway::{AccountPolicy, BrokerGateway, OrderRouter};
use janus_oms::OmsCache;
use janus_registry::SymbolRegistry;
use janus_rpc::{BrokerListEntry, RpcServer};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Heartbeat cadence on the PUB socket (§11 supplement), independent of the
/// EventBus's own TIMER cadence.
const PUBLISHER_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() {
    logging::init_logging();

    let config_path = std::env::args().nth(1).unwrap_or_else(|| "janus.toml".to_string());
    if let Err(err) = run(&config_path).await {
        error!(error = %err, "janus-server exited with an error");
        std::process::exit(1);
    }
}

async fn run(config_path: &str) -> Result<(), ServerError> {
    let raw = std::fs::read_to_string(config_path).map_err(|source| ServerError::ConfigIo {
        path: config_path.to_string(),
        source,
    })?;
    let config = ServerConfig::from_toml_str(&raw)?;
    if config.accounts.is_empty() {
        return Err(ServerError::NoAccounts);
    }

    let registry = Arc::new(SymbolRegistry::load(&config.registry_path)?);

    let mut bus = EventBus::default();
    bus.start();
    let bus = Arc::new(bus);
    let oms = Arc::new(OmsCache::spawn(&bus));

    let mut router = OrderRouter::new(Arc::clone(&registry), Arc::clone(&oms));
    let mut gateways: Vec<Arc<dyn BrokerGateway>> = Vec::with_capacity(config.accounts.len());

    for account in &config.accounts {
        let gateway: Arc<dyn BrokerGateway> = match account.broker {
            BrokerKind::BrokerA => {
                let trade_events = account.trade_events.as_ref().map(|settings| {
                    janus_broker_a::TradeEventsSettings {
                        enable: settings.enable,
                        host: settings.host.clone(),
                        region_id: settings.region_id.clone(),
                    }
                });
                let base_url = format!("https://{}:{}", account.host, account.port);
                let adapter = janus_broker_a::BrokerAAdapter::new(
                    account.alias.clone(),
                    base_url,
                    account.credentials.expose().to_string(),
                    Arc::clone(&bus),
                    config.refresh_debounce_ms,
                    trade_events,
                )
                .map_err(|source| ServerError::BrokerA {
                    alias: account.alias.clone(),
                    source,
                })?;
                Arc::new(adapter)
            }
            BrokerKind::BrokerB => Arc::new(janus_broker_b::BrokerBAdapter::spawn(
                account.host.clone(),
                account.port,
                account.alias.clone(),
                Arc::clone(&bus),
            )),
        };

        gateway.connect().await?;
        router.register_account(
            account.alias.clone(),
            Arc::clone(&gateway),
            AccountPolicy {
                allow_short: account.allow_short,
                auto_fill_enabled: true,
            },
        );
        gateways.push(gateway);
    }

    let default_alias = config.default_account().map(|a| a.alias.clone());
    let broker_list: Vec<BrokerListEntry> = config
        .accounts
        .iter()
        .map(|account| BrokerListEntry {
            account_alias: account.alias.clone(),
            broker_kind: account.broker.as_str(),
            is_default: Some(&account.alias) == default_alias.as_ref(),
        })
        .collect();

    let router = Arc::new(router);
    let rpc_server = Arc::new(RpcServer::new(
        Arc::clone(&router),
        broker_list,
        config.rpc_rep_addr.clone(),
    ));
    let rep_thread = Arc::clone(&rpc_server).spawn();

    let (publisher_task, publisher_thread) =
        janus_rpc::publisher::spawn(Arc::clone(&bus), config.rpc_pub_addr.clone(), PUBLISHER_HEARTBEAT_INTERVAL);

    info!(rep_addr = %config.rpc_rep_addr, pub_addr = %config.rpc_pub_addr, accounts = config.accounts.len(), "janus-server started");

    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for ctrl-c, shutting down immediately");
    }
    info!("shutdown signal received");

    shutdown(rpc_server, rep_thread, bus, publisher_task, publisher_thread, gateways).await;
    Ok(())
}

async fn shutdown(
    rpc_server: Arc<RpcServer>,
    rep_thread: std::thread::JoinHandle<()>,
    bus: Arc<EventBus>,
    publisher_task: tokio::task::JoinHandle<()>,
    publisher_thread: std::thread::JoinHandle<()>,
    gateways: Vec<Arc<dyn BrokerGateway>>,
) {
    // Stop accepting new RPC requests.
    rpc_server.stop();

    // Stop the event bus: drains whatever is already queued, then joins.
    // Adapters and the publisher task still hold their own clone of `bus`,
    // so this runs through `&self` rather than requiring sole ownership.
    bus.stop().await;

    // Signal the publisher's drain task to exit; its socket thread exits on
    // its own once the channel sender it holds is dropped.
    publisher_task.abort();

    // Cancel every broker adapter's background loop/thread.
    for gateway in &gateways {
        if let Err(err) = gateway.close().await {
            warn!(account = %gateway.account_alias(), error = %err, "error while closing broker adapter");
        }
    }
    drop(gateways);
    drop(bus);

    // Join every thread the server spawned.
    if let Err(err) = tokio::task::spawn_blocking(move || rep_thread.join()).await {
        warn!(error = ?err, "RPC REP thread join task panicked");
    }
    if let Err(err) = tokio::task::spawn_blocking(move || publisher_thread.join()).await {
        warn!(error = ?err, "RPC PUB thread join task panicked");
    }

    info!("janus-server shutdown complete");
}
