//! Invoice orchestration: recompute-on-edit and guarded workflow transitions.
//!
//! The orchestrator composes the stock validator, the approval rule engine and
//! the workflow aggregate. It never talks to storage; transitions that need
//! persisting return [`CommitRequest`]s for the host to perform and acknowledge.

pub mod commit;
pub mod config;
pub mod draft;
pub mod orchestrator;
pub mod pricing;
pub mod snapshot;

pub use commit::{
    CommitError, CommitOutcome, CommitReceipt, CommitRequest, CommitService, PendingCommit,
    StockDebit,
};
pub use config::EngineConfig;
pub use draft::{InvoiceDraft, MissingField};
pub use orchestrator::{InvoiceOrchestrator, TransitionOutcome, WorkflowAction};
pub use pricing::{PriceQuote, PricingService};
pub use snapshot::{BlockingReason, InvoiceSnapshot};
