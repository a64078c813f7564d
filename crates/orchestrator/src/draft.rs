use serde::{Deserialize, Serialize};

use karat_inventory::{ItemId, StockLevels, StockLineItem};
use karat_invoicing::InvoiceId;

use crate::pricing::PriceQuote;

/// Field the UI must fill in before the invoice can be submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingField {
    CustomerName,
    LineItems,
    TotalAmount,
}

/// Editable form state of one invoice, as last seen by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceDraft {
    pub invoice_id: InvoiceId,
    /// Caller-side edit counter; newer edits carry larger revisions.
    #[serde(default)]
    pub revision: u64,
    #[serde(default)]
    pub customer_name: Option<String>,
    #[serde(default)]
    pub lines: Vec<StockLineItem>,
    /// Total in smallest currency unit, as computed by the pricing service.
    #[serde(default)]
    pub total_amount: Option<u64>,
}

impl InvoiceDraft {
    pub fn new(invoice_id: InvoiceId) -> Self {
        Self {
            invoice_id,
            revision: 0,
            customer_name: None,
            lines: Vec::new(),
            total_amount: None,
        }
    }

    pub fn missing_fields(&self) -> Vec<MissingField> {
        let mut missing = Vec::new();
        if self
            .customer_name
            .as_deref()
            .is_none_or(|name| name.trim().is_empty())
        {
            missing.push(MissingField::CustomerName);
        }
        if self.lines.is_empty() {
            missing.push(MissingField::LineItems);
        }
        if self.total_amount.is_none_or(|total| total == 0) {
            missing.push(MissingField::TotalAmount);
        }
        missing
    }

    pub fn item_ids(&self) -> Vec<ItemId> {
        self.lines.iter().map(|line| line.item_id.clone()).collect()
    }

    /// Merge a freshly fetched stock snapshot; lines absent from it keep
    /// their previous levels.
    pub fn apply_stock_levels(&mut self, levels: &StockLevels) {
        for line in &mut self.lines {
            if let Some(level) = levels.get(&line.item_id) {
                *line = line.clone().with_stock_level(*level);
            }
        }
    }

    pub fn apply_quote(&mut self, quote: &PriceQuote) {
        self.total_amount = Some(quote.total_amount);
    }

    /// Lines to validate, with `threshold` filled in where a line has none.
    pub(crate) fn lines_with_low_stock_default(&self, threshold: Option<i64>) -> Vec<StockLineItem> {
        let mut lines = self.lines.clone();
        if let Some(threshold) = threshold {
            for line in &mut lines {
                line.low_stock_threshold.get_or_insert(threshold);
            }
        }
        lines
    }

    /// Same invoice content, ignoring stock levels and revision.
    ///
    /// Once submitted, only the stock snapshot of a draft may still change.
    pub(crate) fn same_content_as(&self, other: &InvoiceDraft) -> bool {
        self.invoice_id == other.invoice_id
            && self.customer_name == other.customer_name
            && self.total_amount == other.total_amount
            && self.lines.len() == other.lines.len()
            && self.lines.iter().zip(&other.lines).all(|(a, b)| {
                a.item_id == b.item_id && a.requested_quantity == b.requested_quantity
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use karat_core::AggregateId;
    use karat_inventory::StockLevel;

    fn draft() -> InvoiceDraft {
        let mut draft = InvoiceDraft::new(InvoiceId::new(AggregateId::new()));
        draft.customer_name = Some("Layla".to_string());
        draft.lines = vec![StockLineItem::new("ring-18k", "18k ring", 2, 10)];
        draft.total_amount = Some(1_500);
        draft
    }

    #[test]
    fn complete_draft_has_no_missing_fields() {
        assert!(draft().missing_fields().is_empty());
    }

    #[test]
    fn blank_customer_and_zero_total_count_as_missing() {
        let mut d = draft();
        d.customer_name = Some("  ".to_string());
        d.total_amount = Some(0);
        d.lines.clear();
        assert_eq!(
            d.missing_fields(),
            vec![
                MissingField::CustomerName,
                MissingField::LineItems,
                MissingField::TotalAmount
            ]
        );
    }

    #[test]
    fn stock_levels_replace_snapshot_only_for_known_items() {
        let mut d = draft();
        d.lines.push(StockLineItem::new("chain", "chain", 1, 3));

        let mut levels = StockLevels::new();
        levels.insert(ItemId::new("ring-18k"), StockLevel { available_stock: 1, reserved_stock: 1 });
        d.apply_stock_levels(&levels);

        assert_eq!(d.lines[0].available_quantity(), 0);
        assert_eq!(d.lines[1].available_quantity(), 3);
    }

    #[test]
    fn default_threshold_does_not_override_explicit_one() {
        let mut d = draft();
        d.lines.push(StockLineItem::new("chain", "chain", 1, 3).with_low_stock_threshold(1));
        let lines = d.lines_with_low_stock_default(Some(5));
        assert_eq!(lines[0].low_stock_threshold, Some(5));
        assert_eq!(lines[1].low_stock_threshold, Some(1));
        assert_eq!(d.lines[0].low_stock_threshold, None);
    }

    #[test]
    fn stock_only_changes_keep_content_identical() {
        let a = draft();
        let mut b = a.clone();
        b.revision = 9;
        b.lines[0].available_stock = 0;
        assert!(a.same_content_as(&b));

        b.lines[0].requested_quantity = 3;
        assert!(!a.same_content_as(&b));
    }
}
