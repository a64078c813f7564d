//! Invoice workflow aggregate: commands, events and transition guards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use karat_approvals::ApprovalRequirement;
use karat_auth::Role;
use karat_core::{Aggregate, AggregateId, AggregateRoot, DomainError, ExpectedVersion, UserId};
use karat_events::Event;
use karat_inventory::StockValidation;

use crate::stage::{StageProgress, WorkflowStage};

/// Invoice identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvoiceId(pub AggregateId);

impl InvoiceId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for InvoiceId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalDecision {
    Approve,
    Reject,
}

/// One entry of the approval history (append-only).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRecord {
    pub actor: UserId,
    pub role: Role,
    pub decision: ApprovalDecision,
    pub decided_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Aggregate root: the workflow-relevant state of one invoice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceWorkflow {
    id: InvoiceId,
    stage: WorkflowStage,
    total_amount: u64,
    total_paid: u64,
    approval: ApprovalRequirement,
    history: Vec<ApprovalRecord>,
    version: u64,
}

impl InvoiceWorkflow {
    /// A fresh invoice in `draft`.
    pub fn new(id: InvoiceId) -> Self {
        Self {
            id,
            stage: WorkflowStage::Draft,
            total_amount: 0,
            total_paid: 0,
            approval: ApprovalRequirement::none(),
            history: Vec::new(),
            version: 0,
        }
    }

    /// Rebuild state from a persisted event stream.
    pub fn rehydrate<'a>(id: InvoiceId, events: impl IntoIterator<Item = &'a WorkflowEvent>) -> Self {
        let mut workflow = Self::new(id);
        for event in events {
            workflow.apply(event);
        }
        workflow
    }

    pub fn id_typed(&self) -> InvoiceId {
        self.id
    }

    pub fn stage(&self) -> WorkflowStage {
        self.stage
    }

    pub fn total_amount(&self) -> u64 {
        self.total_amount
    }

    pub fn total_paid(&self) -> u64 {
        self.total_paid
    }

    pub fn remaining_balance(&self) -> u64 {
        self.total_amount.saturating_sub(self.total_paid)
    }

    /// Requirement captured at the last submission.
    pub fn approval(&self) -> &ApprovalRequirement {
        &self.approval
    }

    pub fn approval_required(&self) -> bool {
        self.approval.required
    }

    pub fn approval_history(&self) -> &[ApprovalRecord] {
        &self.history
    }

    pub fn progress(&self) -> StageProgress {
        self.stage.progress(self.approval.required)
    }

    /// Handle a command only if the caller's copy is at the expected version.
    pub fn handle_at(
        &self,
        expected: ExpectedVersion,
        command: &WorkflowCommand,
    ) -> Result<Vec<WorkflowEvent>, DomainError> {
        expected.check(self.version)?;
        self.handle(command)
    }
}

impl AggregateRoot for InvoiceWorkflow {
    type Id = InvoiceId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: Submit a draft, routed by the evaluated approval requirement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submit {
    pub total_amount: u64,
    pub approval: ApprovalRequirement,
    /// Fresh validation of the lines being submitted.
    pub stock: StockValidation,
    pub occurred_at: DateTime<Utc>,
}

/// Command: Approve a pending invoice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Approve {
    pub actor: UserId,
    /// Role the actor acts under (resolved through the role capability check).
    pub acting_role: Role,
    pub stock: StockValidation,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: Reject a pending invoice back to draft.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reject {
    pub actor: UserId,
    pub acting_role: Role,
    pub notes: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordPayment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordPayment {
    /// Payment amount in smallest currency unit.
    pub amount: u64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: Cancel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cancel {
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowCommand {
    Submit(Submit),
    Approve(Approve),
    Reject(Reject),
    RecordPayment(RecordPayment),
    Cancel(Cancel),
}

/// Event: InvoiceSubmitted (lands in `pending_approval` or `approved`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceSubmitted {
    pub invoice_id: InvoiceId,
    pub total_amount: u64,
    pub approval: ApprovalRequirement,
    pub to: WorkflowStage,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ApprovalGranted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalGranted {
    pub invoice_id: InvoiceId,
    pub actor: UserId,
    pub role: Role,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ApprovalRejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRejected {
    pub invoice_id: InvoiceId,
    pub actor: UserId,
    pub role: Role,
    pub notes: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PaymentRecorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecorded {
    pub invoice_id: InvoiceId,
    pub amount: u64,
    pub new_total_paid: u64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: InvoiceCancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceCancelled {
    pub invoice_id: InvoiceId,
    pub from: WorkflowStage,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkflowEvent {
    InvoiceSubmitted(InvoiceSubmitted),
    ApprovalGranted(ApprovalGranted),
    ApprovalRejected(ApprovalRejected),
    PaymentRecorded(PaymentRecorded),
    InvoiceCancelled(InvoiceCancelled),
}

impl Event for WorkflowEvent {
    fn event_type(&self) -> &'static str {
        match self {
            WorkflowEvent::InvoiceSubmitted(_) => "invoicing.workflow.submitted",
            WorkflowEvent::ApprovalGranted(_) => "invoicing.workflow.approval_granted",
            WorkflowEvent::ApprovalRejected(_) => "invoicing.workflow.approval_rejected",
            WorkflowEvent::PaymentRecorded(_) => "invoicing.workflow.payment_recorded",
            WorkflowEvent::InvoiceCancelled(_) => "invoicing.workflow.cancelled",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            WorkflowEvent::InvoiceSubmitted(e) => e.occurred_at,
            WorkflowEvent::ApprovalGranted(e) => e.occurred_at,
            WorkflowEvent::ApprovalRejected(e) => e.occurred_at,
            WorkflowEvent::PaymentRecorded(e) => e.occurred_at,
            WorkflowEvent::InvoiceCancelled(e) => e.occurred_at,
        }
    }
}

impl Aggregate for InvoiceWorkflow {
    type Command = WorkflowCommand;
    type Event = WorkflowEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            WorkflowEvent::InvoiceSubmitted(e) => {
                self.id = e.invoice_id;
                self.total_amount = e.total_amount;
                self.approval = e.approval.clone();
                self.stage = e.to;
            }
            WorkflowEvent::ApprovalGranted(e) => {
                self.history.push(ApprovalRecord {
                    actor: e.actor,
                    role: e.role.clone(),
                    decision: ApprovalDecision::Approve,
                    decided_at: e.occurred_at,
                    notes: e.notes.clone(),
                });
                self.stage = WorkflowStage::Approved;
            }
            WorkflowEvent::ApprovalRejected(e) => {
                self.history.push(ApprovalRecord {
                    actor: e.actor,
                    role: e.role.clone(),
                    decision: ApprovalDecision::Reject,
                    decided_at: e.occurred_at,
                    notes: Some(e.notes.clone()),
                });
                self.stage = WorkflowStage::Draft;
            }
            WorkflowEvent::PaymentRecorded(e) => {
                self.total_paid = e.new_total_paid;
                if self.total_paid >= self.total_amount {
                    self.stage = WorkflowStage::Paid;
                }
            }
            WorkflowEvent::InvoiceCancelled(_) => {
                self.stage = WorkflowStage::Cancelled;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            WorkflowCommand::Submit(cmd) => self.handle_submit(cmd),
            WorkflowCommand::Approve(cmd) => self.handle_approve(cmd),
            WorkflowCommand::Reject(cmd) => self.handle_reject(cmd),
            WorkflowCommand::RecordPayment(cmd) => self.handle_record_payment(cmd),
            WorkflowCommand::Cancel(cmd) => self.handle_cancel(cmd),
        }
    }
}

impl InvoiceWorkflow {
    fn ensure_stage(&self, expected: WorkflowStage, action: &str) -> Result<(), DomainError> {
        if self.stage != expected {
            return Err(DomainError::invalid_transition(self.stage, action));
        }
        Ok(())
    }

    fn ensure_authorized(&self, role: &Role, action: &str) -> Result<(), DomainError> {
        if !self.approval.authorizes(role) {
            return Err(DomainError::unauthorized(
                action,
                self.approval.applicable_roles.iter().map(|r| r.as_str().to_string()),
            ));
        }
        Ok(())
    }

    fn handle_submit(&self, cmd: &Submit) -> Result<Vec<WorkflowEvent>, DomainError> {
        self.ensure_stage(WorkflowStage::Draft, "submit")?;

        if cmd.total_amount == 0 {
            return Err(DomainError::invalid_input("invoice total must be positive"));
        }
        if cmd.approval.required && cmd.approval.applicable_roles.is_empty() {
            return Err(DomainError::invariant(
                "approval is required but no role can grant it",
            ));
        }

        let to = if cmd.approval.required {
            WorkflowStage::PendingApproval
        } else {
            // Direct approval debits stock.
            cmd.stock.ensure_not_blocked()?;
            WorkflowStage::Approved
        };

        Ok(vec![WorkflowEvent::InvoiceSubmitted(InvoiceSubmitted {
            invoice_id: self.id,
            total_amount: cmd.total_amount,
            approval: cmd.approval.clone(),
            to,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_approve(&self, cmd: &Approve) -> Result<Vec<WorkflowEvent>, DomainError> {
        self.ensure_stage(WorkflowStage::PendingApproval, "approve")?;
        self.ensure_authorized(&cmd.acting_role, "approve")?;
        cmd.stock.ensure_not_blocked()?;

        Ok(vec![WorkflowEvent::ApprovalGranted(ApprovalGranted {
            invoice_id: self.id,
            actor: cmd.actor,
            role: cmd.acting_role.clone(),
            notes: cmd.notes.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reject(&self, cmd: &Reject) -> Result<Vec<WorkflowEvent>, DomainError> {
        self.ensure_stage(WorkflowStage::PendingApproval, "reject")?;

        let notes = cmd.notes.trim();
        if notes.is_empty() {
            return Err(DomainError::invalid_input("rejection notes cannot be empty"));
        }
        self.ensure_authorized(&cmd.acting_role, "reject")?;

        Ok(vec![WorkflowEvent::ApprovalRejected(ApprovalRejected {
            invoice_id: self.id,
            actor: cmd.actor,
            role: cmd.acting_role.clone(),
            notes: notes.to_string(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_record_payment(
        &self,
        cmd: &RecordPayment,
    ) -> Result<Vec<WorkflowEvent>, DomainError> {
        self.ensure_stage(WorkflowStage::Approved, "record_payment")?;

        if cmd.amount == 0 {
            return Err(DomainError::invalid_input("payment amount must be positive"));
        }

        let new_total_paid = self
            .total_paid
            .checked_add(cmd.amount)
            .ok_or_else(|| DomainError::invariant("payment total overflow"))?;

        if new_total_paid > self.total_amount {
            return Err(DomainError::invalid_input(format!(
                "payment of {} exceeds remaining balance of {}",
                cmd.amount,
                self.remaining_balance()
            )));
        }

        Ok(vec![WorkflowEvent::PaymentRecorded(PaymentRecorded {
            invoice_id: self.id,
            amount: cmd.amount,
            new_total_paid,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cancel(&self, cmd: &Cancel) -> Result<Vec<WorkflowEvent>, DomainError> {
        if self.stage.is_terminal() {
            return Err(DomainError::invalid_transition(self.stage, "cancel"));
        }
        if self.total_paid > 0 {
            return Err(DomainError::invariant(
                "cannot cancel an invoice with recorded payments",
            ));
        }

        Ok(vec![WorkflowEvent::InvoiceCancelled(InvoiceCancelled {
            invoice_id: self.id,
            from: self.stage,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use karat_inventory::{validate, StockLineItem};

    fn test_invoice_id() -> InvoiceId {
        InvoiceId::new(AggregateId::new())
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn in_stock() -> StockValidation {
        validate(&[StockLineItem::new("ring-18k", "18k ring", 2, 10)]).unwrap()
    }

    fn out_of_stock() -> StockValidation {
        validate(&[StockLineItem::new("ring-18k", "18k ring", 2, 0)]).unwrap()
    }

    fn manager_required() -> ApprovalRequirement {
        ApprovalRequirement {
            required: true,
            applicable_roles: vec![Role::new("manager")],
        }
    }

    fn submit(total_amount: u64, approval: ApprovalRequirement, stock: StockValidation) -> WorkflowCommand {
        WorkflowCommand::Submit(Submit {
            total_amount,
            approval,
            stock,
            occurred_at: test_time(),
        })
    }

    fn approve(role: &'static str, stock: StockValidation) -> WorkflowCommand {
        WorkflowCommand::Approve(Approve {
            actor: UserId::new(),
            acting_role: Role::new(role),
            stock,
            notes: None,
            occurred_at: test_time(),
        })
    }

    fn reject(role: &'static str, notes: &str) -> WorkflowCommand {
        WorkflowCommand::Reject(Reject {
            actor: UserId::new(),
            acting_role: Role::new(role),
            notes: notes.to_string(),
            occurred_at: test_time(),
        })
    }

    fn pay(amount: u64) -> WorkflowCommand {
        WorkflowCommand::RecordPayment(RecordPayment {
            amount,
            occurred_at: test_time(),
        })
    }

    fn cancel() -> WorkflowCommand {
        WorkflowCommand::Cancel(Cancel {
            reason: Some("customer changed mind".to_string()),
            occurred_at: test_time(),
        })
    }

    fn pending_invoice() -> InvoiceWorkflow {
        let mut invoice = InvoiceWorkflow::new(test_invoice_id());
        invoice.execute(&submit(1500, manager_required(), in_stock())).unwrap();
        invoice
    }

    #[test]
    fn submit_without_approval_goes_straight_to_approved() {
        let mut invoice = InvoiceWorkflow::new(test_invoice_id());
        let events = invoice
            .execute(&submit(800, ApprovalRequirement::none(), in_stock()))
            .unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(invoice.stage(), WorkflowStage::Approved);
        assert!(!invoice.approval_required());
        assert_eq!(invoice.progress().total_steps, 3);
    }

    #[test]
    fn direct_approval_is_refused_when_stock_is_blocked() {
        let invoice = InvoiceWorkflow::new(test_invoice_id());
        let err = invoice
            .handle(&submit(800, ApprovalRequirement::none(), out_of_stock()))
            .unwrap_err();
        assert_eq!(err, DomainError::stock_blocked(["ring-18k"]));
        assert_eq!(invoice.stage(), WorkflowStage::Draft);
    }

    #[test]
    fn submit_with_approval_waits_for_approver() {
        let invoice = pending_invoice();
        assert_eq!(invoice.stage(), WorkflowStage::PendingApproval);
        assert_eq!(invoice.progress().step, 2);
    }

    #[test]
    fn manager_can_approve_and_history_is_recorded() {
        let mut invoice = pending_invoice();
        invoice.execute(&approve("manager", in_stock())).unwrap();

        assert_eq!(invoice.stage(), WorkflowStage::Approved);
        let history = invoice.approval_history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].decision, ApprovalDecision::Approve);
        assert_eq!(history[0].role, Role::new("manager"));
    }

    #[test]
    fn approver_without_applicable_role_is_unauthorized() {
        let invoice = pending_invoice();
        let err = invoice.handle(&approve("clerk", in_stock())).unwrap_err();
        match err {
            DomainError::UnauthorizedTransition { action, required_roles } => {
                assert_eq!(action, "approve");
                assert_eq!(required_roles, vec!["manager".to_string()]);
            }
            other => panic!("expected UnauthorizedTransition, got {other:?}"),
        }
    }

    #[test]
    fn approval_is_refused_when_stock_went_out() {
        let invoice = pending_invoice();
        let err = invoice.handle(&approve("manager", out_of_stock())).unwrap_err();
        assert!(matches!(err, DomainError::StockBlocked { .. }));
    }

    #[test]
    fn approve_from_draft_is_an_invalid_transition() {
        let invoice = InvoiceWorkflow::new(test_invoice_id());
        let err = invoice.handle(&approve("manager", in_stock())).unwrap_err();
        assert_eq!(err, DomainError::invalid_transition("draft", "approve"));
    }

    #[test]
    fn reject_returns_to_draft_and_requires_notes() {
        let mut invoice = pending_invoice();

        let err = invoice.handle(&reject("manager", "   ")).unwrap_err();
        assert!(matches!(err, DomainError::InvalidInput(_)));

        invoice.execute(&reject("manager", "price too low")).unwrap();
        assert_eq!(invoice.stage(), WorkflowStage::Draft);
        assert_eq!(invoice.approval_history()[0].decision, ApprovalDecision::Reject);
        assert_eq!(
            invoice.approval_history()[0].notes.as_deref(),
            Some("price too low")
        );

        // Resubmission re-evaluates from scratch.
        invoice.execute(&submit(1500, manager_required(), in_stock())).unwrap();
        assert_eq!(invoice.stage(), WorkflowStage::PendingApproval);
    }

    #[test]
    fn rejecter_without_applicable_role_is_unauthorized() {
        let invoice = pending_invoice();
        let err = invoice.handle(&reject("sales", "numbers look off")).unwrap_err();
        match err {
            DomainError::UnauthorizedTransition { action, required_roles } => {
                assert_eq!(action, "reject");
                assert_eq!(required_roles, vec!["manager".to_string()]);
            }
            other => panic!("expected UnauthorizedTransition, got {other:?}"),
        }
        assert_eq!(invoice.stage(), WorkflowStage::PendingApproval);
        assert!(invoice.approval_history().is_empty());
    }

    #[test]
    fn partial_payments_accumulate_until_paid() {
        let mut invoice = InvoiceWorkflow::new(test_invoice_id());
        invoice.execute(&submit(200, ApprovalRequirement::none(), in_stock())).unwrap();

        invoice.execute(&pay(50)).unwrap();
        assert_eq!(invoice.stage(), WorkflowStage::Approved);
        assert_eq!(invoice.remaining_balance(), 150);

        let err = invoice.handle(&pay(151)).unwrap_err();
        assert!(matches!(err, DomainError::InvalidInput(msg) if msg.contains("remaining balance of 150")));

        invoice.execute(&pay(150)).unwrap();
        assert_eq!(invoice.stage(), WorkflowStage::Paid);
        assert_eq!(invoice.progress().percent, 100);
    }

    #[test]
    fn paid_and_cancelled_are_terminal() {
        let mut invoice = InvoiceWorkflow::new(test_invoice_id());
        invoice.execute(&submit(100, ApprovalRequirement::none(), in_stock())).unwrap();
        invoice.execute(&pay(100)).unwrap();
        assert!(matches!(
            invoice.handle(&cancel()),
            Err(DomainError::InvalidTransition { .. })
        ));

        let mut cancelled = pending_invoice();
        cancelled.execute(&cancel()).unwrap();
        assert_eq!(cancelled.stage(), WorkflowStage::Cancelled);
        assert_eq!(cancelled.progress().percent, 0);
        for cmd in [cancel(), approve("manager", in_stock()), pay(1)] {
            assert!(matches!(
                cancelled.handle(&cmd),
                Err(DomainError::InvalidTransition { .. })
            ));
        }
    }

    #[test]
    fn cannot_cancel_after_partial_payment() {
        let mut invoice = InvoiceWorkflow::new(test_invoice_id());
        invoice.execute(&submit(100, ApprovalRequirement::none(), in_stock())).unwrap();
        invoice.execute(&pay(10)).unwrap();
        assert!(matches!(
            invoice.handle(&cancel()),
            Err(DomainError::InvariantViolation(_))
        ));
    }

    #[test]
    fn handle_does_not_mutate_state() {
        let invoice = pending_invoice();
        let before = invoice.clone();

        let events1 = invoice.handle(&reject("manager", "wrong weight")).unwrap();
        let events2 = invoice.handle(&reject("manager", "wrong weight")).unwrap();

        assert_eq!(invoice, before);
        assert_eq!(events1.len(), events2.len());
    }

    #[test]
    fn rehydrate_replays_to_the_same_state() {
        let mut invoice = InvoiceWorkflow::new(test_invoice_id());
        let mut log = Vec::new();
        log.extend(invoice.execute(&submit(1500, manager_required(), in_stock())).unwrap());
        log.extend(invoice.execute(&approve("manager", in_stock())).unwrap());
        log.extend(invoice.execute(&pay(1500)).unwrap());

        let replayed = InvoiceWorkflow::rehydrate(invoice.id_typed(), &log);
        assert_eq!(replayed, invoice);
        assert_eq!(replayed.version(), 3);
        assert_eq!(log[2].event_type(), "invoicing.workflow.payment_recorded");
    }

    #[test]
    fn stale_version_is_a_conflict() {
        let invoice = pending_invoice();
        let err = invoice
            .handle_at(ExpectedVersion::Exact(0), &approve("manager", in_stock()))
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
        assert!(invoice
            .handle_at(ExpectedVersion::Exact(1), &approve("manager", in_stock()))
            .is_ok());
    }
}
