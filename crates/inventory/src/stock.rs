use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use karat_core::DomainResult;

/// Inventory item identifier (opaque; unique within one invoice draft).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl core::fmt::Display for ItemId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Stock level of one item as reported by the inventory service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StockLevel {
    pub available_stock: i64,
    /// Stock already committed to other pending invoices.
    #[serde(default)]
    pub reserved_stock: i64,
}

/// Snapshot keyed by item, as returned by a [`StockLevelProvider`].
pub type StockLevels = HashMap<ItemId, StockLevel>;

/// Source of stock snapshots (`getStockLevels`).
///
/// Implemented by the host's inventory client. Fetching may be slow or remote;
/// the validator itself only ever sees the resulting snapshot.
pub trait StockLevelProvider {
    fn stock_levels(&self, item_ids: &[ItemId]) -> DomainResult<StockLevels>;
}

/// Fixed snapshot, handy for tests and offline replays.
impl StockLevelProvider for StockLevels {
    fn stock_levels(&self, item_ids: &[ItemId]) -> DomainResult<StockLevels> {
        Ok(item_ids
            .iter()
            .filter_map(|id| self.get(id).map(|level| (id.clone(), *level)))
            .collect())
    }
}
