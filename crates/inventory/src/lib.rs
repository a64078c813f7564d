//! Stock sufficiency validation.
//!
//! Pure, deterministic classification of invoice line items against a stock
//! snapshot supplied by the caller (no IO, no data fetching).

pub mod stock;
pub mod validation;

pub use stock::{ItemId, StockLevel, StockLevelProvider, StockLevels};
pub use validation::{
    ImpactLevel, OverallStatus, StockLineItem, StockStatus, StockValidation,
    StockValidationResult, validate,
};
