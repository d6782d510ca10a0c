#![forbid(unsafe_code)]
#![warn(unused, missing_debug_implementations, rust_2018_idioms)]

//! # Janus SymbolRegistry (§4.1)
//!
//! Single source of truth for canonical↔broker-id mappings. Backed by a
//! relational store (rusqlite) whose schema is applied out-of-band (§6) —
//! this crate only reads and writes rows, it never runs a migration.
//! Startup loads the whole table into an immutable in-memory index; after
//! that, reads never take a lock and writers clone the index, apply one
//! change, and swap it in (§4.1 "single writer; reads are lock-free").
//!
//! Auto-fill (the broker lookup that fills a missing id) lives in
//! `janus-gateway`, not here, because it needs the `BrokerGateway` contract;
//! this crate only exposes [`SymbolRegistry::ensure`] as the write-through
//! primitive auto-fill and harmony call into.

mod error;
mod index;
mod store;

pub use error::RegistryError;

use arc_swap::ArcSwap;
use index::Index;
use janus_core::data::{AssetClass, SymbolRegistryEntry};
use parking_lot::Mutex;
use rusqlite::Connection;
use std::sync::Arc;

/// Fields an `ensure()` call may supply. Every field is optional; only
/// fields that are currently missing on the stored entry are written
/// (§4.1 "only fills missing broker-id fields").
#[derive(Debug, Clone, Default)]
pub struct EnsureFields {
    pub asset_class: Option<AssetClass>,
    pub currency: Option<String>,
    pub broker_a_ticker: Option<String>,
    pub broker_b_conid: Option<i64>,
    pub description: Option<String>,
}

impl EnsureFields {
    pub fn broker_a(ticker: impl Into<String>) -> Self {
        Self {
            broker_a_ticker: Some(ticker.into()),
            ..Default::default()
        }
    }

    pub fn broker_b(conid: i64) -> Self {
        Self {
            broker_b_conid: Some(conid),
            ..Default::default()
        }
    }
}

/// Persistent canonical↔broker-id mapping, fronted by an in-memory index.
pub struct SymbolRegistry {
    conn: Mutex<Connection>,
    index: ArcSwap<Index>,
}

impl std::fmt::Debug for SymbolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymbolRegistry")
            .field("entries", &self.index.load().by_canonical.len())
            .finish()
    }
}

/// Trims and uppercases a symbol before every lookup and write (§4.1
/// `normalize()`).
pub fn normalize(symbol: &str) -> String {
    symbol.trim().to_uppercase()
}

impl SymbolRegistry {
    /// Opens the store and loads every row into the in-memory index
    /// synchronously (§4.1 `load()`). A store that cannot be opened or
    /// queried is a hard startup failure — there is no degraded mode.
    pub fn load(database_path: &str) -> Result<Self, RegistryError> {
        let conn = store::open(database_path)?;
        let entries = store::load_all(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            index: ArcSwap::from_pointee(Index::from_entries(entries)),
        })
    }

    /// Wraps an already-open connection, skipping [`Self::load`]'s file-open
    /// step. Intended for tests in dependent crates that need a registry
    /// backed by an in-memory SQLite schema without going through a file
    /// path.
    pub fn from_connection(conn: Connection) -> Result<Self, RegistryError> {
        let entries = store::load_all(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            index: ArcSwap::from_pointee(Index::from_entries(entries)),
        })
    }

    pub fn lookup_by_canonical(&self, symbol: &str) -> Option<Arc<SymbolRegistryEntry>> {
        let key = normalize(symbol);
        self.index.load().by_canonical.get(&key).cloned()
    }

    pub fn lookup_by_broker_a_ticker(&self, ticker: &str) -> Option<Arc<SymbolRegistryEntry>> {
        self.index.load().by_broker_a_ticker.get(ticker).cloned()
    }

    pub fn lookup_by_broker_b_conid(&self, conid: i64) -> Option<Arc<SymbolRegistryEntry>> {
        self.index.load().by_broker_b_conid.get(&conid).cloned()
    }

    /// Every canonical symbol currently known, for harmony's iteration
    /// (§4.8 "iterate canonical symbols in the registry").
    pub fn canonical_symbols(&self) -> Vec<String> {
        self.index.load().by_canonical.keys().cloned().collect()
    }

    /// Write-through upsert: creates the row if `symbol` is unknown,
    /// otherwise fills only the fields `fields` supplies that are currently
    /// `None` on the stored entry. Conflicts on unique broker-id columns
    /// are errors, never silently ignored (§4.1, §8).
    pub fn ensure(
        &self,
        symbol: &str,
        fields: EnsureFields,
    ) -> Result<Arc<SymbolRegistryEntry>, RegistryError> {
        let canonical = normalize(symbol);
        let snapshot = self.index.load();

        if let Some(conid) = fields.broker_b_conid {
            if let Some(other) = snapshot.by_broker_b_conid.get(&conid) {
                if other.canonical_symbol != canonical {
                    return Err(RegistryError::Conflict {
                        field: "broker_b_conid",
                        value: conid.to_string(),
                    });
                }
            }
        }
        if let Some(ticker) = &fields.broker_a_ticker {
            if let Some(other) = snapshot.by_broker_a_ticker.get(ticker) {
                if other.canonical_symbol != canonical {
                    return Err(RegistryError::Conflict {
                        field: "broker_a_ticker",
                        value: ticker.clone(),
                    });
                }
            }
        }

        let conn = self.conn.lock();
        let updated = match snapshot.by_canonical.get(&canonical) {
            Some(existing) => self.fill_existing(&conn, existing, &fields)?,
            None => Arc::new(store::insert(
                &conn,
                &canonical,
                fields.asset_class.unwrap_or_default(),
                fields.currency.as_deref().unwrap_or("USD"),
                fields.broker_a_ticker.as_deref(),
                fields.broker_b_conid,
                fields.description.as_deref(),
            )?),
        };
        drop(conn);

        self.index.rcu(|current| current.with_entry(Arc::clone(&updated)));
        Ok(updated)
    }

    fn fill_existing(
        &self,
        conn: &Connection,
        existing: &Arc<SymbolRegistryEntry>,
        fields: &EnsureFields,
    ) -> Result<Arc<SymbolRegistryEntry>, RegistryError> {
        let mut next = (**existing).clone();
        let mut changed = false;

        if next.broker_a_ticker.is_none() {
            if let Some(ticker) = &fields.broker_a_ticker {
                store::fill_broker_a_ticker(conn, existing.id, ticker)?;
                next.broker_a_ticker = Some(ticker.clone());
                changed = true;
            }
        }
        if next.broker_b_conid.is_none() {
            if let Some(conid) = fields.broker_b_conid {
                store::fill_broker_b_conid(conn, existing.id, conid)?;
                next.broker_b_conid = Some(conid);
                changed = true;
            }
        }

        if !changed {
            return Ok(Arc::clone(existing));
        }
        Ok(Arc::new(next))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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
        SymbolRegistry {
            conn: Mutex::new(conn),
            index: ArcSwap::from_pointee(Index::from_entries(Vec::new())),
        }
    }

    #[test]
    fn normalize_is_idempotent() {
        assert_eq!(normalize(" aapl "), "AAPL");
        assert_eq!(normalize(&normalize(" aapl ")), normalize(" aapl "));
    }

    #[test]
    fn lookup_ignores_case_and_whitespace() {
        let registry = fresh_registry();
        registry.ensure("AAPL", EnsureFields::broker_b(265598)).unwrap();
        let entry = registry.lookup_by_canonical("  aapl\t").unwrap();
        assert_eq!(entry.canonical_symbol, "AAPL");
    }

    #[test]
    fn ensure_fills_missing_field_only() {
        let registry = fresh_registry();
        registry.ensure("AAPL", EnsureFields::broker_b(265598)).unwrap();
        registry
            .ensure("AAPL", EnsureFields::broker_a("AAPL.US"))
            .unwrap();
        let entry = registry.lookup_by_canonical("AAPL").unwrap();
        assert_eq!(entry.broker_b_conid, Some(265598));
        assert_eq!(entry.broker_a_ticker.as_deref(), Some("AAPL.US"));
    }

    #[test]
    fn ensure_is_idempotent_with_identical_fields() {
        let registry = fresh_registry();
        let first = registry.ensure("AAPL", EnsureFields::broker_b(265598)).unwrap();
        let second = registry.ensure("AAPL", EnsureFields::broker_b(265598)).unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.broker_b_conid, Some(265598));
    }

    #[test]
    fn ensure_rejects_conid_bound_to_different_symbol() {
        let registry = fresh_registry();
        registry.ensure("AAPL", EnsureFields::broker_b(265598)).unwrap();
        let err = registry.ensure("MSFT", EnsureFields::broker_b(265598)).unwrap_err();
        assert!(matches!(err, RegistryError::Conflict { .. }));
        assert!(registry.lookup_by_canonical("MSFT").is_none());
    }
}
