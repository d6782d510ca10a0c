//! Failure modes specific to the broker-A HTTP/gRPC adapter (§7).

use janus_core::error::{DomainError, DomainErrorKind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BrokerAError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("trade-events stream failed: {0}")]
    Stream(#[from] tonic::Status),

    #[error("unexpected response shape: {0}")]
    BadResponse(String),

    #[error("account authentication failed or operator action required: {0}")]
    AuthError(String),

    #[error("connection limit exceeded for this credential set")]
    ConnectionLimitExceeded,

    #[error("the trade-events thread is not running")]
    StreamGone,
}

impl DomainError for BrokerAError {
    fn kind(&self) -> DomainErrorKind {
        match self {
            Self::Http(_) | Self::Stream(_) | Self::StreamGone => DomainErrorKind::BrokerTransient,
            Self::BadResponse(_) => DomainErrorKind::BrokerTransient,
            Self::AuthError(_) | Self::ConnectionLimitExceeded => DomainErrorKind::BrokerPermanent,
        }
    }
}

impl From<BrokerAError> for janus_gateway::GatewayError {
    fn from(err: BrokerAError) -> Self {
        match err {
            BrokerAError::Http(inner) => janus_gateway::GatewayError::Transient(inner.to_string()),
            BrokerAError::Stream(inner) => janus_gateway::GatewayError::Transient(inner.to_string()),
            BrokerAError::BadResponse(message) => janus_gateway::GatewayError::Transient(message),
            BrokerAError::AuthError(message) => janus_gateway::GatewayError::Permanent(message),
            BrokerAError::ConnectionLimitExceeded => janus_gateway::GatewayError::Permanent(
                "broker A connection limit exceeded for this credential set".to_string(),
            ),
            BrokerAError::StreamGone => {
                janus_gateway::GatewayError::Transient("broker A trade-events thread is gone".to_string())
            }
        }
    }
}
