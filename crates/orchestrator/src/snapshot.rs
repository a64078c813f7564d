use serde::{Deserialize, Serialize};

use karat_approvals::ApprovalRequirement;
use karat_inventory::StockValidation;
use karat_invoicing::{StageProgress, WorkflowStage};

use crate::draft::MissingField;

/// Why the invoice cannot be submitted right now.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BlockingReason {
    MissingFields { fields: Vec<MissingField> },
    StockBlocked { items: Vec<String> },
    ApprovalPending,
    /// Already past `draft` (approved, paid or cancelled).
    StageClosed { stage: WorkflowStage },
    CommitOutstanding { count: usize },
}

/// Everything the UI renders after a recompute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceSnapshot {
    /// Draft revision this snapshot was computed from.
    pub revision: u64,
    pub validation: StockValidation,
    pub approval: ApprovalRequirement,
    pub stage: WorkflowStage,
    pub stage_description: String,
    pub progress: StageProgress,
    pub submittable: bool,
    pub blocking_reasons: Vec<BlockingReason>,
}

impl InvoiceSnapshot {
    /// Whether this snapshot supersedes `other` for the same invoice.
    pub fn is_newer_than(&self, other: &InvoiceSnapshot) -> bool {
        self.revision > other.revision
    }
}
