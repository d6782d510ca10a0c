//! Failure modes for [`crate::SymbolRegistry`] (§7).

use janus_core::error::{DomainError, DomainErrorKind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    /// The backing store could not be opened or queried at all. Startup is
    /// a hard fail on this — no degraded mode (§4.1 `load()`).
    #[error("symbol registry store unavailable: {0}")]
    StoreUnavailable(#[source] rusqlite::Error),

    /// A write failed after startup (harmony, auto-fill). Aborts the
    /// in-flight batch (§4.8).
    #[error("symbol registry store write failed: {0}")]
    StoreWrite(#[source] rusqlite::Error),

    /// `ensure()` tried to bind a broker id already bound to a different
    /// canonical symbol (§4.1, §8 idempotence property).
    #[error("{field} {value} is already bound to a different canonical symbol")]
    Conflict { field: &'static str, value: String },

    /// No canonical symbol matches the lookup.
    #[error("no registry entry for canonical symbol {0}")]
    Miss(String),

    /// Auto-fill (or a direct contract-details query) returned zero or
    /// more than one match (§4.1 "If zero or >1, do not write").
    #[error("ambiguous contract lookup for {0}: {1} matches")]
    Ambiguous(String, usize),
}

impl DomainError for RegistryError {
    fn kind(&self) -> DomainErrorKind {
        match self {
            Self::StoreUnavailable(_) | Self::StoreWrite(_) => DomainErrorKind::RegistryStoreError,
            Self::Conflict { .. } => DomainErrorKind::RegistryStoreError,
            Self::Miss(_) => DomainErrorKind::RegistryMiss,
            Self::Ambiguous(..) => DomainErrorKind::RegistryAmbiguous,
        }
    }
}
