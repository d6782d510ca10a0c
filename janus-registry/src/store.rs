//! Thin rusqlite access layer over the `registry` table (§6 "Persisted
//! state"). The core never applies this schema — it is assumed to already
//! exist when [`crate::SymbolRegistry::load`] runs.

use crate::error::RegistryError;
use janus_core::data::{AssetClass, SymbolRegistryEntry};
use rusqlite::{params, Connection, OptionalExtension, Row};

pub(crate) fn open(path: &str) -> Result<Connection, RegistryError> {
    Connection::open(path).map_err(RegistryError::StoreUnavailable)
}

fn asset_class_to_str(class: AssetClass) -> &'static str {
    match class {
        AssetClass::Equity => "EQUITY",
        AssetClass::Future => "FUTURE",
        AssetClass::Option => "OPTION",
        AssetClass::Forex => "FOREX",
        AssetClass::Crypto => "CRYPTO",
    }
}

fn asset_class_from_str(raw: &str) -> AssetClass {
    match raw {
        "FUTURE" => AssetClass::Future,
        "OPTION" => AssetClass::Option,
        "FOREX" => AssetClass::Forex,
        "CRYPTO" => AssetClass::Crypto,
        _ => AssetClass::Equity,
    }
}

fn row_to_entry(row: &Row<'_>) -> rusqlite::Result<SymbolRegistryEntry> {
    let asset_class: String = row.get("asset_class")?;
    Ok(SymbolRegistryEntry {
        id: row.get("id")?,
        canonical_symbol: row.get("canonical_symbol")?,
        asset_class: asset_class_from_str(&asset_class),
        currency: row.get("currency")?,
        broker_a_ticker: row.get("broker_a_ticker")?,
        broker_b_conid: row.get("broker_b_conid")?,
        description: row.get("description")?,
    })
}

/// Loads every row from the `registry` table (§4.1 `load()`). A missing
/// table or connection failure is treated identically: the store is
/// unavailable and startup must hard-fail.
pub(crate) fn load_all(conn: &Connection) -> Result<Vec<SymbolRegistryEntry>, RegistryError> {
    let mut stmt = conn
        .prepare(
            "SELECT id, canonical_symbol, asset_class, currency, broker_a_ticker, \
             broker_b_conid, description FROM registry",
        )
        .map_err(RegistryError::StoreUnavailable)?;
    let rows = stmt
        .query_map([], row_to_entry)
        .map_err(RegistryError::StoreUnavailable)?;
    rows.collect::<Result<Vec<_>, _>>()
        .map_err(RegistryError::StoreUnavailable)
}

pub(crate) fn find_by_canonical(
    conn: &Connection,
    canonical_symbol: &str,
) -> Result<Option<SymbolRegistryEntry>, RegistryError> {
    conn.query_row(
        "SELECT id, canonical_symbol, asset_class, currency, broker_a_ticker, \
         broker_b_conid, description FROM registry WHERE canonical_symbol = ?1",
        params![canonical_symbol],
        row_to_entry,
    )
    .optional()
    .map_err(RegistryError::StoreWrite)
}

/// Inserts a brand-new row for a canonical symbol that has no entry yet.
pub(crate) fn insert(
    conn: &Connection,
    canonical_symbol: &str,
    asset_class: AssetClass,
    currency: &str,
    broker_a_ticker: Option<&str>,
    broker_b_conid: Option<i64>,
    description: Option<&str>,
) -> Result<SymbolRegistryEntry, RegistryError> {
    conn.execute(
        "INSERT INTO registry (canonical_symbol, asset_class, currency, broker_a_ticker, \
         broker_b_conid, description) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            canonical_symbol,
            asset_class_to_str(asset_class),
            currency,
            broker_a_ticker,
            broker_b_conid,
            description,
        ],
    )
    .map_err(map_unique_violation)?;
    let id = conn.last_insert_rowid();
    Ok(SymbolRegistryEntry {
        id,
        canonical_symbol: canonical_symbol.to_string(),
        asset_class,
        currency: currency.to_string(),
        broker_a_ticker: broker_a_ticker.map(str::to_string),
        broker_b_conid,
        description: description.map(str::to_string),
    })
}

/// Fills a currently-`NULL` broker_a_ticker on an existing row. Callers must
/// have already verified the row's `broker_a_ticker` is `None` — this never
/// overwrites a present value (§4.1 "only fills missing broker-id fields").
pub(crate) fn fill_broker_a_ticker(
    conn: &Connection,
    id: i64,
    ticker: &str,
) -> Result<(), RegistryError> {
    conn.execute(
        "UPDATE registry SET broker_a_ticker = ?1 WHERE id = ?2 AND broker_a_ticker IS NULL",
        params![ticker, id],
    )
    .map_err(map_unique_violation)?;
    Ok(())
}

pub(crate) fn fill_broker_b_conid(
    conn: &Connection,
    id: i64,
    conid: i64,
) -> Result<(), RegistryError> {
    conn.execute(
        "UPDATE registry SET broker_b_conid = ?1 WHERE id = ?2 AND broker_b_conid IS NULL",
        params![conid, id],
    )
    .map_err(map_unique_violation)?;
    Ok(())
}

fn map_unique_violation(err: rusqlite::Error) -> RegistryError {
    use rusqlite::ffi::ErrorCode;
    if let rusqlite::Error::SqliteFailure(sqlite_err, _) = &err {
        if sqlite_err.code == ErrorCode::ConstraintViolation {
            return RegistryError::Conflict {
                field: "unique constraint",
                value: err.to_string(),
            };
        }
    }
    RegistryError::StoreWrite(err)
}
