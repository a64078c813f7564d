//! Per-line stock classification and the aggregate validation status.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use karat_core::{DomainError, DomainResult};

use crate::stock::{ItemId, StockLevel};

/// One requested invoice line together with the stock snapshot it is checked against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLineItem {
    pub item_id: ItemId,
    pub item_name: String,
    pub requested_quantity: i64,
    pub available_stock: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reserved_stock: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub low_stock_threshold: Option<i64>,
}

impl StockLineItem {
    pub fn new(
        item_id: impl Into<ItemId>,
        item_name: impl Into<String>,
        requested_quantity: i64,
        available_stock: i64,
    ) -> Self {
        Self {
            item_id: item_id.into(),
            item_name: item_name.into(),
            requested_quantity,
            available_stock,
            reserved_stock: None,
            low_stock_threshold: None,
        }
    }

    pub fn with_reserved(mut self, reserved_stock: i64) -> Self {
        self.reserved_stock = Some(reserved_stock);
        self
    }

    pub fn with_low_stock_threshold(mut self, threshold: i64) -> Self {
        self.low_stock_threshold = Some(threshold);
        self
    }

    /// Replace the stock snapshot with freshly fetched levels.
    pub fn with_stock_level(mut self, level: StockLevel) -> Self {
        self.available_stock = level.available_stock;
        self.reserved_stock = Some(level.reserved_stock);
        self
    }

    /// `available_stock - reserved_stock`; negative means over-committed.
    pub fn available_quantity(&self) -> i64 {
        self.available_stock - self.reserved_stock.unwrap_or(0)
    }

    fn check(&self) -> DomainResult<()> {
        if self.item_id.is_blank() {
            return Err(DomainError::invalid_input(format!(
                "line item '{}' is missing an item id",
                self.item_name
            )));
        }
        if self.requested_quantity <= 0 {
            return Err(DomainError::invalid_input(format!(
                "item {}: requested quantity must be positive (got {})",
                self.item_id, self.requested_quantity
            )));
        }
        if self.available_stock < 0 {
            return Err(DomainError::invalid_input(format!(
                "item {}: available stock cannot be negative",
                self.item_id
            )));
        }
        if self.reserved_stock.is_some_and(|r| r < 0) {
            return Err(DomainError::invalid_input(format!(
                "item {}: reserved stock cannot be negative",
                self.item_id
            )));
        }
        if self.low_stock_threshold.is_some_and(|t| t < 0) {
            return Err(DomainError::invalid_input(format!(
                "item {}: low stock threshold cannot be negative",
                self.item_id
            )));
        }
        Ok(())
    }
}

/// Availability classification of a single line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockStatus {
    Available,
    Insufficient,
    OutOfStock,
    LowStockWarning,
}

/// How disruptive a line's stock situation is likely to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImpactLevel {
    None,
    Low,
    Medium,
    High,
}

/// Worst-case aggregate over all line statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    /// No validation has run yet (or there was nothing to validate).
    #[default]
    Pending,
    Valid,
    Caution,
    Warning,
    Blocked,
}

impl OverallStatus {
    fn severity(self) -> u8 {
        match self {
            OverallStatus::Pending => 0,
            OverallStatus::Valid => 1,
            OverallStatus::Caution => 2,
            OverallStatus::Warning => 3,
            OverallStatus::Blocked => 4,
        }
    }

    fn from_line(status: StockStatus) -> Self {
        match status {
            StockStatus::Available => OverallStatus::Valid,
            StockStatus::LowStockWarning => OverallStatus::Caution,
            StockStatus::Insufficient => OverallStatus::Warning,
            StockStatus::OutOfStock => OverallStatus::Blocked,
        }
    }

    /// The more severe of the two statuses.
    pub fn worst(self, other: Self) -> Self {
        if other.severity() > self.severity() { other } else { self }
    }
}

/// Derived, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockValidationResult {
    pub item_id: ItemId,
    pub item_name: String,
    pub status: StockStatus,
    pub available_quantity: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shortfall: Option<i64>,
    pub impact_level: ImpactLevel,
    pub suggestions: Vec<String>,
}

impl StockValidationResult {
    fn classify(item: &StockLineItem) -> Self {
        let available_quantity = item.available_quantity();
        let shortfall = (item.requested_quantity - available_quantity.max(0)).max(0);

        let status = if available_quantity <= 0 {
            StockStatus::OutOfStock
        } else if shortfall > 0 {
            StockStatus::Insufficient
        } else if item
            .low_stock_threshold
            .is_some_and(|threshold| available_quantity <= threshold)
        {
            StockStatus::LowStockWarning
        } else {
            StockStatus::Available
        };

        let impact_level = match status {
            StockStatus::OutOfStock => ImpactLevel::High,
            // shortfall > available * 0.5, kept in integers; a doubled
            // shortfall past i64::MAX is high by definition.
            StockStatus::Insufficient
                if shortfall.checked_mul(2).is_none_or(|d| d > available_quantity) =>
            {
                ImpactLevel::High
            }
            StockStatus::Insufficient => ImpactLevel::Medium,
            StockStatus::LowStockWarning => ImpactLevel::Low,
            StockStatus::Available => ImpactLevel::None,
        };

        let suggestions = match status {
            StockStatus::OutOfStock => vec![
                "Item is out of stock".to_string(),
                "Consider removing this item or finding alternatives".to_string(),
            ],
            StockStatus::Insufficient => vec![
                format!("Only {available_quantity} units available"),
                format!("Reduce quantity by {shortfall} units"),
            ],
            StockStatus::LowStockWarning => vec![
                "Stock level is below minimum threshold".to_string(),
                "Consider restocking soon".to_string(),
            ],
            StockStatus::Available => Vec::new(),
        };

        Self {
            item_id: item.item_id.clone(),
            item_name: item.item_name.clone(),
            status,
            available_quantity,
            shortfall: (shortfall > 0).then_some(shortfall),
            impact_level,
            suggestions,
        }
    }
}

/// Per-line results plus the aggregate status.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StockValidation {
    pub results: Vec<StockValidationResult>,
    pub overall_status: OverallStatus,
}

impl StockValidation {
    /// State before any validation has run.
    pub fn pending() -> Self {
        Self::default()
    }

    pub fn is_blocked(&self) -> bool {
        self.overall_status == OverallStatus::Blocked
    }

    /// Ids of the lines that block approval.
    pub fn out_of_stock_items(&self) -> Vec<&ItemId> {
        self.results
            .iter()
            .filter(|r| r.status == StockStatus::OutOfStock)
            .map(|r| &r.item_id)
            .collect()
    }

    pub fn count(&self, status: StockStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }

    pub fn result_for(&self, item_id: &ItemId) -> Option<&StockValidationResult> {
        self.results.iter().find(|r| &r.item_id == item_id)
    }

    /// Fail with `StockBlocked` if any line is out of stock.
    pub fn ensure_not_blocked(&self) -> DomainResult<()> {
        if self.is_blocked() {
            return Err(DomainError::stock_blocked(
                self.out_of_stock_items().into_iter().map(|id| id.to_string()),
            ));
        }
        Ok(())
    }
}

/// Validate requested quantities against the supplied stock snapshot.
///
/// Input is checked in full before anything is classified: one malformed line
/// fails the whole call with `InvalidInput`.
pub fn validate(items: &[StockLineItem]) -> DomainResult<StockValidation> {
    let mut seen: HashSet<&ItemId> = HashSet::with_capacity(items.len());
    for item in items {
        item.check()?;
        if !seen.insert(&item.item_id) {
            return Err(DomainError::invalid_input(format!(
                "item {} appears more than once",
                item.item_id
            )));
        }
    }

    let results: Vec<StockValidationResult> =
        items.iter().map(StockValidationResult::classify).collect();

    let overall_status = results
        .iter()
        .map(|r| OverallStatus::from_line(r.status))
        .fold(OverallStatus::Pending, OverallStatus::worst);

    Ok(StockValidation {
        results,
        overall_status,
    })
}
