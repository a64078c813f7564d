//! Persistence work produced by workflow transitions.
//!
//! The orchestrator only describes what must be committed. The host runs each
//! request against its persistence service and reports the outcome back with
//! a [`CommitReceipt`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

use karat_inventory::ItemId;
use karat_invoicing::{ApprovalRecord, InvoiceId};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommitError {
    #[error("persistence service unavailable: {0}")]
    Unavailable(String),

    /// The service refused the work itself; retrying unchanged will not help.
    #[error("commit rejected: {0}")]
    Rejected(String),
}

/// Quantity of one item to take out of inventory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockDebit {
    pub item_id: ItemId,
    pub quantity: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CommitRequest {
    CommitApproval {
        invoice_id: InvoiceId,
        decision: ApprovalRecord,
    },
    CommitStockDebit {
        invoice_id: InvoiceId,
        debits: Vec<StockDebit>,
    },
    RecordPayment {
        invoice_id: InvoiceId,
        amount: u64,
    },
}

impl CommitRequest {
    pub fn kind(&self) -> &'static str {
        match self {
            CommitRequest::CommitApproval { .. } => "commit_approval",
            CommitRequest::CommitStockDebit { .. } => "commit_stock_debit",
            CommitRequest::RecordPayment { .. } => "record_payment",
        }
    }

    /// Run this request against the host's persistence service.
    pub fn execute<S>(&self, service: &S) -> Result<(), CommitError>
    where
        S: CommitService + ?Sized,
    {
        match self {
            CommitRequest::CommitApproval {
                invoice_id,
                decision,
            } => service.commit_approval(*invoice_id, decision),
            CommitRequest::CommitStockDebit { invoice_id, debits } => {
                service.commit_stock_debit(*invoice_id, debits)
            }
            CommitRequest::RecordPayment { invoice_id, amount } => {
                service.record_payment(*invoice_id, *amount)
            }
        }
    }
}

/// Persistence collaborator implemented by the host application.
pub trait CommitService {
    fn commit_approval(
        &self,
        invoice_id: InvoiceId,
        decision: &ApprovalRecord,
    ) -> Result<(), CommitError>;

    fn commit_stock_debit(
        &self,
        invoice_id: InvoiceId,
        debits: &[StockDebit],
    ) -> Result<(), CommitError>;

    fn record_payment(&self, invoice_id: InvoiceId, amount: u64) -> Result<(), CommitError>;
}

/// A commit request awaiting acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingCommit {
    pub commit_id: u64,
    pub request: CommitRequest,
    /// Failed attempts reported so far.
    pub failed_attempts: u32,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CommitOutcome {
    Succeeded,
    Failed { reason: String },
}

impl From<Result<(), CommitError>> for CommitOutcome {
    fn from(value: Result<(), CommitError>) -> Self {
        match value {
            Ok(()) => CommitOutcome::Succeeded,
            Err(err) => CommitOutcome::Failed {
                reason: err.to_string(),
            },
        }
    }
}

/// Host's report of how a commit went.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitReceipt {
    pub commit_id: u64,
    pub outcome: CommitOutcome,
}

impl PendingCommit {
    /// Execute the request and turn the result into a receipt.
    pub fn run<S>(&self, service: &S) -> CommitReceipt
    where
        S: CommitService + ?Sized,
    {
        CommitReceipt {
            commit_id: self.commit_id,
            outcome: self.request.execute(service).into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    use karat_core::AggregateId;

    #[derive(Default)]
    struct Recording {
        calls: RefCell<Vec<String>>,
        fail_payments: bool,
    }

    impl CommitService for Recording {
        fn commit_approval(&self, _: InvoiceId, decision: &ApprovalRecord) -> Result<(), CommitError> {
            self.calls.borrow_mut().push(format!("approval:{}", decision.role));
            Ok(())
        }

        fn commit_stock_debit(&self, _: InvoiceId, debits: &[StockDebit]) -> Result<(), CommitError> {
            self.calls.borrow_mut().push(format!("debit:{}", debits.len()));
            Ok(())
        }

        fn record_payment(&self, _: InvoiceId, amount: u64) -> Result<(), CommitError> {
            if self.fail_payments {
                return Err(CommitError::Unavailable("ledger offline".to_string()));
            }
            self.calls.borrow_mut().push(format!("payment:{amount}"));
            Ok(())
        }
    }

    fn invoice_id() -> InvoiceId {
        InvoiceId::new(AggregateId::new())
    }

    #[test]
    fn execute_dispatches_to_matching_service_call() {
        let service = Recording::default();
        let request = CommitRequest::CommitStockDebit {
            invoice_id: invoice_id(),
            debits: vec![StockDebit { item_id: ItemId::new("ring"), quantity: 2 }],
        };
        request.execute(&service).unwrap();
        assert_eq!(service.calls.borrow().as_slice(), ["debit:1"]);
    }

    #[test]
    fn failed_execution_becomes_failed_receipt() {
        let service = Recording { fail_payments: true, ..Default::default() };
        let pending = PendingCommit {
            commit_id: 7,
            request: CommitRequest::RecordPayment { invoice_id: invoice_id(), amount: 100 },
            failed_attempts: 0,
            last_error: None,
        };

        let receipt = pending.run(&service);
        assert_eq!(receipt.commit_id, 7);
        assert!(matches!(
            receipt.outcome,
            CommitOutcome::Failed { reason } if reason.contains("ledger offline")
        ));
    }

    #[test]
    fn rejected_commit_reason_is_kept_in_outcome() {
        let outcome = CommitOutcome::from(Err::<(), _>(CommitError::Rejected(
            "invoice already settled".to_string(),
        )));
        assert_eq!(
            outcome,
            CommitOutcome::Failed {
                reason: "commit rejected: invoice already settled".to_string()
            }
        );
    }

    #[test]
    fn requests_serialize_with_kind_tag() {
        let request = CommitRequest::RecordPayment { invoice_id: invoice_id(), amount: 5 };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["kind"], "record_payment");
        assert_eq!(request.kind(), "record_payment");
    }
}
