use serde::{Deserialize, Serialize};

/// Invoice workflow lifecycle.
///
/// `draft → pending_approval → approved → paid`, with `pending_approval`
/// skipped when no rule requires sign-off. `cancelled` is reachable from any
/// non-terminal stage; `paid` and `cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStage {
    #[default]
    Draft,
    PendingApproval,
    Approved,
    Paid,
    Cancelled,
}

impl WorkflowStage {
    pub fn as_str(self) -> &'static str {
        match self {
            WorkflowStage::Draft => "draft",
            WorkflowStage::PendingApproval => "pending_approval",
            WorkflowStage::Approved => "approved",
            WorkflowStage::Paid => "paid",
            WorkflowStage::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, WorkflowStage::Paid | WorkflowStage::Cancelled)
    }

    /// Human-readable description for status panels.
    pub fn description(self) -> &'static str {
        match self {
            WorkflowStage::Draft => "Invoice is being prepared and can still be edited",
            WorkflowStage::PendingApproval => "Invoice is waiting for approval",
            WorkflowStage::Approved => "Invoice is approved and awaiting payment",
            WorkflowStage::Paid => "Invoice has been paid in full",
            WorkflowStage::Cancelled => "Invoice was cancelled",
        }
    }

    /// Position of this stage for progress bars.
    pub fn progress(self, approval_required: bool) -> StageProgress {
        let total_steps = if approval_required { 4 } else { 3 };
        let step = match (self, approval_required) {
            (WorkflowStage::Cancelled, _) => 0,
            (WorkflowStage::Draft, _) => 1,
            (WorkflowStage::PendingApproval, _) => 2,
            (WorkflowStage::Approved, true) => 3,
            (WorkflowStage::Approved, false) => 2,
            (WorkflowStage::Paid, true) => 4,
            (WorkflowStage::Paid, false) => 3,
        };

        StageProgress {
            step,
            total_steps,
            percent: (u16::from(step) * 100 / u16::from(total_steps)) as u8,
            cancelled: self == WorkflowStage::Cancelled,
        }
    }
}

impl core::fmt::Display for WorkflowStage {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `step` of `total_steps`; cancelled invoices report 0% and are flagged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageProgress {
    pub step: u8,
    pub total_steps: u8,
    pub percent: u8,
    pub cancelled: bool,
}
