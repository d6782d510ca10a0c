//! Lock-free read-side snapshot of the registry (§4.1 "reads are lock-free
//! over an immutable snapshot; writers clone+swap").

use indexmap::IndexMap;
use janus_core::data::SymbolRegistryEntry;
use std::sync::Arc;

#[derive(Default)]
pub(crate) struct Index {
    pub(crate) by_canonical: IndexMap<String, Arc<SymbolRegistryEntry>>,
    pub(crate) by_broker_a_ticker: IndexMap<String, Arc<SymbolRegistryEntry>>,
    pub(crate) by_broker_b_conid: IndexMap<i64, Arc<SymbolRegistryEntry>>,
}

impl Index {
    pub(crate) fn from_entries(entries: Vec<SymbolRegistryEntry>) -> Self {
        let mut index = Self::default();
        for entry in entries {
            index.insert(Arc::new(entry));
        }
        index
    }

    /// Clones the index's maps (cheap: values are `Arc`s) and applies
    /// `entry` on top, for the writer's clone-then-swap (§4.1).
    pub(crate) fn with_entry(&self, entry: Arc<SymbolRegistryEntry>) -> Self {
        let mut next = Self {
            by_canonical: self.by_canonical.clone(),
            by_broker_a_ticker: self.by_broker_a_ticker.clone(),
            by_broker_b_conid: self.by_broker_b_conid.clone(),
        };
        next.insert(entry);
        next
    }

    fn insert(&mut self, entry: Arc<SymbolRegistryEntry>) {
        self.by_canonical
            .insert(entry.canonical_symbol.clone(), Arc::clone(&entry));
        if let Some(ticker) = entry.broker_a_ticker.clone() {
            self.by_broker_a_ticker.insert(ticker, Arc::clone(&entry));
        }
        if let Some(conid) = entry.broker_b_conid {
            self.by_broker_b_conid.insert(conid, entry);
        }
    }
}
