//! Startup and shutdown failures for the server binary. Nothing here is
//! part of the RPC surface (§7) — these are process-lifecycle errors that
//! never reach a caller.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to read configuration file {path}: {source}")]
    ConfigIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Config(#[from] janus_core::config::ConfigError),

    #[error(transparent)]
    Registry(#[from] janus_registry::RegistryError),

    #[error("failed to start broker A adapter for account {alias}: {source}")]
    BrokerA {
        alias: String,
        #[source]
        source: janus_broker_a::BrokerAError,
    },

    #[error(transparent)]
    Gateway(#[from] janus_gateway::GatewayError),

    #[error("no accounts configured")]
    NoAccounts,
}
