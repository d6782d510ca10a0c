//! Configuration shapes the core consumes (§6 "Configuration inputs").
//!
//! Loading configuration from disk, environment, or a secrets manager is an
//! external collaborator's job (§1 Non-goals); this module only defines the
//! struct shape the server binary deserializes into and hands to the core.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which broker family an account belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrokerKind {
    /// Synchronous HTTP + gRPC trade-events broker (§4.6).
    BrokerA,
    /// Async socket-protocol broker (§4.5).
    BrokerB,
}

impl BrokerKind {
    /// Short machine-readable name, used in capability-gate error messages.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BrokerA => "broker_a",
            Self::BrokerB => "broker_b",
        }
    }
}

/// Wraps a credential value so it never leaks into `{:?}`/logs by accident.
/// Real validation/rotation of the secret is out of scope here; this is a
/// transport for an opaque string the adapter hands to its SDK/socket.
#[derive(Clone, Serialize, Deserialize)]
pub struct SecretString(String);

impl SecretString {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretString(***)")
    }
}

/// Per-account trade-events streaming configuration (§3 "Configuration
/// inputs"), broker-A only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeEventsConfig {
    pub enable: bool,
    pub host: String,
    pub region_id: String,
}

/// Per-account configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountConfig {
    pub broker: BrokerKind,
    pub alias: String,
    pub credentials: SecretString,
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub allow_short: bool,
    #[serde(default)]
    pub locate_required: bool,
    #[serde(default)]
    pub trade_events: Option<TradeEventsConfig>,
    /// Marks the account `broker_list()` surfaces as the default target
    /// when a CLI command does not name one explicitly (§11 supplement).
    #[serde(default)]
    pub default: bool,
}

/// Global market-data defaults (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketDataConfig {
    #[serde(default)]
    pub default_symbols: Vec<String>,
    #[serde(default)]
    pub use_rth: bool,
}

impl Default for MarketDataConfig {
    fn default() -> Self {
        Self {
            default_symbols: Vec::new(),
            use_rth: false,
        }
    }
}

/// Reconnect cadence for every streaming adapter (§6).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ReconnectConfig {
    pub interval_seconds: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self { interval_seconds: 10 }
    }
}

/// Top-level server configuration (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub accounts: Vec<AccountConfig>,
    #[serde(default)]
    pub market_data: MarketDataConfig,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
    #[serde(default = "default_refresh_debounce_ms")]
    pub refresh_debounce_ms: u64,
    /// RPC bind addresses: request/reply and publish sockets (§4.9).
    pub rpc_rep_addr: String,
    pub rpc_pub_addr: String,
    /// Path to the SymbolRegistry's sqlite file. The schema it expects is
    /// applied out-of-band (§6); this is only where to find it.
    pub registry_path: String,
}

fn default_refresh_debounce_ms() -> u64 {
    1500
}

impl ServerConfig {
    /// Loads and validates a [`ServerConfig`] from a TOML file. The core
    /// never applies a schema or creates a database; it only parses its own
    /// configuration shape (§6 "Schema is applied out-of-band").
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = std::collections::HashSet::new();
        for account in &self.accounts {
            if !seen.insert(account.alias.as_str()) {
                return Err(ConfigError::DuplicateAlias(account.alias.clone()));
            }
        }
        Ok(())
    }

    /// The account `broker_list()` surfaces as the default, if any was
    /// marked, else the first configured account (§11 supplement).
    pub fn default_account(&self) -> Option<&AccountConfig> {
        self.accounts
            .iter()
            .find(|a| a.default)
            .or_else(|| self.accounts.first())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("duplicate account alias: {0}")]
    DuplicateAlias(String),
}
