use serde::{Deserialize, Serialize};

use karat_core::DomainResult;
use karat_inventory::StockLineItem;

/// Totals computed by the external pricing service.
///
/// How the amount is derived (metal price, weight, labor, VAT) is opaque to
/// the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceQuote {
    /// Total in smallest currency unit.
    pub total_amount: u64,
}

pub trait PricingService {
    fn quote(&self, lines: &[StockLineItem]) -> DomainResult<PriceQuote>;
}
