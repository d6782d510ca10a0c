//! Domain error kinds shared across crates (§7).
//!
//! Each subsystem crate (`janus-registry`, `janus-gateway`, the broker
//! adapters, `janus-rpc`) defines its own `thiserror` enum for the failure
//! modes specific to it, but every variant that is meaningful to a *caller*
//! (the router, the RPC layer) maps onto one of the [`DomainErrorKind`]
//! values below, so a top-level aggregate error can wrap any subsystem
//! error with `#[from]` without a giant match.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The seven error kinds from §7, as a closed set a caller can match on
/// without needing to know which subsystem produced the error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DomainErrorKind {
    /// Unknown canonical symbol; surfaced to the caller.
    RegistryMiss,
    /// Auto-fill returned more than one match; surfaced, no write.
    RegistryAmbiguous,
    /// Persistence failed; aborts any in-flight batch and surfaces.
    RegistryStoreError,
    /// Broker cannot express the requested order type; reject.
    CapabilityUnsupported,
    /// Missing required field (e.g. LIMIT without a price).
    InvalidIntent,
    /// Transient network/connection issue, recovered by the adapter itself;
    /// surfaced to order callers only as a send-time failure.
    BrokerTransient,
    /// AuthError or operator-action-required; logged, subsystem stops.
    BrokerPermanent,
}

impl DomainErrorKind {
    /// A short machine-readable code, used by [`crate::error`] wire wrapping
    /// (§7's "RPC wraps all core errors with `{code, message}`").
    pub fn code(self) -> &'static str {
        match self {
            Self::RegistryMiss => "registry_miss",
            Self::RegistryAmbiguous => "registry_ambiguous",
            Self::RegistryStoreError => "registry_store_error",
            Self::CapabilityUnsupported => "capability_unsupported",
            Self::InvalidIntent => "invalid_intent",
            Self::BrokerTransient => "broker_transient",
            Self::BrokerPermanent => "broker_permanent",
        }
    }
}

/// Implemented by every subsystem error enum so the RPC layer can wrap any
/// of them into `{code, message}` uniformly, without a giant match.
pub trait DomainError: std::error::Error {
    fn kind(&self) -> DomainErrorKind;
}

/// Wire-level `{code, message}` error shape (§7 propagation policy).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{code}: {message}")]
pub struct WireError {
    pub code: String,
    pub message: String,
}

impl WireError {
    pub fn from_domain(err: &dyn DomainError) -> Self {
        Self {
            code: err.kind().code().to_string(),
            message: err.to_string(),
        }
    }
}
