//! Failure modes specific to the broker-B socket adapter (§7).

use janus_core::error::{DomainError, DomainErrorKind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BrokerBError {
    #[error("not connected to broker B")]
    NotConnected,

    #[error("socket I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("contract details request timed out")]
    ContractDetailsTimeout,

    #[error("broker B auth/permanent error: {0}")]
    Permanent(String),

    #[error("the I/O loop is not running")]
    LoopGone,
}

impl DomainError for BrokerBError {
    fn kind(&self) -> DomainErrorKind {
        match self {
            Self::NotConnected | Self::Io(_) | Self::LoopGone => DomainErrorKind::BrokerTransient,
            Self::ContractDetailsTimeout => DomainErrorKind::RegistryAmbiguous,
            Self::Permanent(_) => DomainErrorKind::BrokerPermanent,
        }
    }
}

impl From<BrokerBError> for janus_gateway::GatewayError {
    fn from(err: BrokerBError) -> Self {
        match err {
            BrokerBError::NotConnected => janus_gateway::GatewayError::NotConnected,
            BrokerBError::Io(inner) => janus_gateway::GatewayError::Transient(inner.to_string()),
            BrokerBError::ContractDetailsTimeout => {
                janus_gateway::GatewayError::ContractDetailsTimeout
            }
            BrokerBError::Permanent(message) => janus_gateway::GatewayError::Permanent(message),
            BrokerBError::LoopGone => {
                janus_gateway::GatewayError::Transient("broker B I/O loop is gone".to_string())
            }
        }
    }
}
