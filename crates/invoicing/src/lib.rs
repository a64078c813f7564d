//! Invoice workflow (approval and payment lifecycle).
//!
//! Business rules for moving an invoice from draft to paid, implemented purely
//! as deterministic domain logic (no IO, no HTTP, no storage).

pub mod stage;
pub mod workflow;

pub use stage::{StageProgress, WorkflowStage};
pub use workflow::{
    Approve, ApprovalDecision, ApprovalGranted, ApprovalRecord, ApprovalRejected, Cancel,
    InvoiceCancelled, InvoiceId, InvoiceSubmitted, InvoiceWorkflow, PaymentRecorded,
    RecordPayment, Reject, Submit, WorkflowCommand, WorkflowEvent,
};
