//! Failure modes for the gateway contract, router, and harmony (§7).

use janus_core::error::{DomainError, DomainErrorKind};
use janus_registry::RegistryError;
use thiserror::Error;

/// Errors a [`crate::BrokerGateway`] implementation can return to a caller.
/// Per §4.4's universal precondition, none of these come from blocking
/// network I/O on the caller's thread — they are either validation
/// failures or the result of an already-failed background operation.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("broker adapter is not connected")]
    NotConnected,

    #[error("transient broker error: {0}")]
    Transient(String),

    #[error("broker authentication failed or operator action required: {0}")]
    Permanent(String),

    #[error("contract details request timed out")]
    ContractDetailsTimeout,

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl DomainError for GatewayError {
    fn kind(&self) -> DomainErrorKind {
        match self {
            Self::NotConnected | Self::Transient(_) => DomainErrorKind::BrokerTransient,
            Self::Permanent(_) => DomainErrorKind::BrokerPermanent,
            Self::ContractDetailsTimeout => DomainErrorKind::RegistryAmbiguous,
            Self::Registry(inner) => inner.kind(),
        }
    }
}

/// Errors the [`crate::router::OrderRouter`] surfaces synchronously to an
/// RPC caller (§4.7, §7).
#[derive(Debug, Error)]
pub enum RouterError {
    #[error("unknown account alias: {0}")]
    UnknownAccount(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("broker {broker} cannot express order type {order_type:?}")]
    CapabilityUnsupported {
        broker: &'static str,
        order_type: janus_core::data::OrderType,
    },

    #[error("invalid order intent: {0}")]
    InvalidIntent(String),

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

impl DomainError for RouterError {
    fn kind(&self) -> DomainErrorKind {
        match self {
            Self::UnknownAccount(_) => DomainErrorKind::InvalidIntent,
            Self::Registry(inner) => inner.kind(),
            Self::CapabilityUnsupported { .. } => DomainErrorKind::CapabilityUnsupported,
            Self::InvalidIntent(_) => DomainErrorKind::InvalidIntent,
            Self::Gateway(inner) => inner.kind(),
        }
    }
}

/// Failure of an entire harmony run (§4.8 "abort the whole run").
#[derive(Debug, Error)]
pub enum HarmonyError {
    #[error("registry store write failed during harmony run: {0}")]
    StoreError(#[from] RegistryError),
}

impl DomainError for HarmonyError {
    fn kind(&self) -> DomainErrorKind {
        DomainErrorKind::RegistryStoreError
    }
}
