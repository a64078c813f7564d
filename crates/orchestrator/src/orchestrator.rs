use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use karat_approvals::{ApprovalRequirement, ApprovalRule, evaluate, validate_rules};
use karat_auth::{Actor, RoleCheck, resolve_acting_role};
use karat_core::{Aggregate, AggregateRoot, DomainError, DomainResult, ExpectedVersion};
use karat_events::{Event, EventRecord};
use karat_inventory::{StockLevelProvider, StockValidation, validate};
use karat_invoicing::{
    ApprovalDecision, ApprovalRecord, Approve, Cancel, InvoiceWorkflow, RecordPayment, Reject,
    Submit, WorkflowCommand, WorkflowEvent, WorkflowStage,
};

use crate::commit::{CommitOutcome, CommitReceipt, CommitRequest, PendingCommit, StockDebit};
use crate::config::EngineConfig;
use crate::draft::InvoiceDraft;
use crate::pricing::PricingService;
use crate::snapshot::{BlockingReason, InvoiceSnapshot};

/// A user or system action on the invoice workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum WorkflowAction {
    Submit,
    Approve {
        #[serde(default)]
        notes: Option<String>,
    },
    Reject {
        notes: String,
    },
    RecordPayment {
        amount: u64,
    },
    Cancel {
        #[serde(default)]
        reason: Option<String>,
    },
}

impl WorkflowAction {
    pub fn name(&self) -> &'static str {
        match self {
            WorkflowAction::Submit => "submit",
            WorkflowAction::Approve { .. } => "approve",
            WorkflowAction::Reject { .. } => "reject",
            WorkflowAction::RecordPayment { .. } => "record_payment",
            WorkflowAction::Cancel { .. } => "cancel",
        }
    }
}

/// Result of a successful transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: WorkflowStage,
    pub to: WorkflowStage,
    pub events: Vec<EventRecord>,
    /// Work the host must commit and acknowledge before the next transition.
    pub commits: Vec<PendingCommit>,
}

/// Owns one invoice until submission is fully committed.
///
/// Single writer: callers serialize access per invoice and discard snapshots
/// superseded by a newer edit (see [`InvoiceSnapshot::is_newer_than`]).
#[derive(Debug)]
pub struct InvoiceOrchestrator<R> {
    rules: Vec<ApprovalRule>,
    default_low_stock_threshold: Option<i64>,
    role_check: R,
    workflow: InvoiceWorkflow,
    draft: InvoiceDraft,
    event_log: Vec<EventRecord>,
    pending: Vec<PendingCommit>,
    next_commit_id: u64,
}

impl<R: RoleCheck> InvoiceOrchestrator<R> {
    /// Start a new invoice in `draft`.
    pub fn new(draft: InvoiceDraft, rules: Vec<ApprovalRule>, role_check: R) -> DomainResult<Self> {
        let workflow = InvoiceWorkflow::new(draft.invoice_id);
        Self::resume(workflow, draft, rules, role_check)
    }

    /// Continue with a workflow rehydrated from persisted events.
    pub fn resume(
        workflow: InvoiceWorkflow,
        draft: InvoiceDraft,
        rules: Vec<ApprovalRule>,
        role_check: R,
    ) -> DomainResult<Self> {
        validate_rules(&rules)?;
        if draft.invoice_id != workflow.id_typed() {
            return Err(DomainError::invalid_input(format!(
                "draft belongs to invoice {}, workflow to {}",
                draft.invoice_id,
                workflow.id_typed()
            )));
        }

        Ok(Self {
            rules,
            default_low_stock_threshold: None,
            role_check,
            workflow,
            draft,
            event_log: Vec::new(),
            pending: Vec::new(),
            next_commit_id: 1,
        })
    }

    pub fn from_config(config: &EngineConfig, draft: InvoiceDraft, role_check: R) -> DomainResult<Self> {
        Ok(Self::new(draft, config.approval_rules.clone(), role_check)?
            .with_default_low_stock_threshold(config.default_low_stock_threshold))
    }

    pub fn with_default_low_stock_threshold(mut self, threshold: Option<i64>) -> Self {
        self.default_low_stock_threshold = threshold;
        self
    }

    pub fn workflow(&self) -> &InvoiceWorkflow {
        &self.workflow
    }

    pub fn stage(&self) -> WorkflowStage {
        self.workflow.stage()
    }

    pub fn draft(&self) -> &InvoiceDraft {
        &self.draft
    }

    pub fn rules(&self) -> &[ApprovalRule] {
        &self.rules
    }

    /// Events applied through this orchestrator, oldest first.
    pub fn event_log(&self) -> &[EventRecord] {
        &self.event_log
    }

    pub fn pending_commits(&self) -> &[PendingCommit] {
        &self.pending
    }

    /// Re-run stock validation and approval rules over an edited draft.
    ///
    /// Malformed lines fail with `InvalidInput` and leave the stored draft
    /// untouched. After submission only stock levels may change.
    pub fn recompute(&mut self, draft: InvoiceDraft) -> DomainResult<InvoiceSnapshot> {
        if draft.invoice_id != self.workflow.id_typed() {
            return Err(DomainError::invalid_input(format!(
                "draft belongs to invoice {}, not {}",
                draft.invoice_id,
                self.workflow.id_typed()
            )));
        }
        if draft.revision < self.draft.revision {
            return Err(DomainError::conflict(format!(
                "stale draft revision {} (current {})",
                draft.revision, self.draft.revision
            )));
        }
        if self.stage() != WorkflowStage::Draft && !draft.same_content_as(&self.draft) {
            return Err(DomainError::conflict(format!(
                "invoice can only be edited in draft (stage: {})",
                self.stage()
            )));
        }

        let (validation, approval) = self.assess(&draft)?;
        self.draft = draft;

        debug!(
            invoice_id = %self.workflow.id_typed(),
            revision = self.draft.revision,
            overall_status = ?validation.overall_status,
            approval_required = approval.required,
            "recomputed invoice"
        );

        Ok(self.build_snapshot(validation, approval))
    }

    /// Snapshot of the stored draft without changing anything.
    pub fn snapshot(&self) -> DomainResult<InvoiceSnapshot> {
        let (validation, approval) = self.assess(&self.draft)?;
        Ok(self.build_snapshot(validation, approval))
    }

    /// Fetch current stock levels for the draft's items and recompute.
    pub fn refresh_stock<P>(&mut self, provider: &P) -> DomainResult<InvoiceSnapshot>
    where
        P: StockLevelProvider + ?Sized,
    {
        let levels = provider.stock_levels(&self.draft.item_ids())?;
        let mut draft = self.draft.clone();
        draft.apply_stock_levels(&levels);
        self.recompute(draft)
    }

    /// Ask the pricing service for a new total and recompute.
    pub fn reprice<P>(&mut self, pricing: &P) -> DomainResult<InvoiceSnapshot>
    where
        P: PricingService + ?Sized,
    {
        let quote = pricing.quote(&self.draft.lines)?;
        let mut draft = self.draft.clone();
        draft.apply_quote(&quote);
        self.recompute(draft)
    }

    pub fn transition(&mut self, action: WorkflowAction, actor: &Actor) -> DomainResult<TransitionOutcome> {
        self.transition_at(action, actor, ExpectedVersion::Any)
    }

    /// Apply `action` if the workflow is still at `expected` version.
    ///
    /// Stock is re-validated for actions that can debit it; guard failures
    /// are returned and the workflow stays where it was.
    pub fn transition_at(
        &mut self,
        action: WorkflowAction,
        actor: &Actor,
        expected: ExpectedVersion,
    ) -> DomainResult<TransitionOutcome> {
        let invoice_id = self.workflow.id_typed();

        if !self.pending.is_empty() {
            warn!(%invoice_id, action = action.name(), outstanding = self.pending.len(), "transition refused: commits outstanding");
            return Err(DomainError::conflict(format!(
                "{} commit(s) awaiting acknowledgement",
                self.pending.len()
            )));
        }

        let from = self.stage();
        let events = self
            .command_for(&action, actor)
            .and_then(|command| self.workflow.handle_at(expected, &command))
            .inspect_err(|err| {
                warn!(%invoice_id, action = action.name(), %from, actor = %actor.id, error = %err, "transition refused");
            })?;

        let mut records = Vec::with_capacity(events.len());
        let mut requests = Vec::new();
        for event in &events {
            self.workflow.apply(event);
            records.push(event.record(self.workflow.version()));
            requests.extend(self.commits_for(event));
        }
        let commits: Vec<PendingCommit> = requests.into_iter().map(|r| self.enqueue(r)).collect();
        self.event_log.extend(records.iter().cloned());

        let to = self.stage();
        info!(
            %invoice_id,
            action = action.name(),
            %from,
            %to,
            actor = %actor.id,
            commits = commits.len(),
            "workflow transition"
        );

        Ok(TransitionOutcome {
            from,
            to,
            events: records,
            commits,
        })
    }

    /// Record the host's report for a commit produced by a transition.
    ///
    /// Failed commits stay outstanding so the host can retry them.
    pub fn acknowledge(&mut self, receipt: CommitReceipt) -> DomainResult<()> {
        let pos = self
            .pending
            .iter()
            .position(|c| c.commit_id == receipt.commit_id)
            .ok_or_else(|| {
                DomainError::invalid_input(format!("unknown commit id {}", receipt.commit_id))
            })?;

        match receipt.outcome {
            CommitOutcome::Succeeded => {
                let done = self.pending.remove(pos);
                info!(commit_id = done.commit_id, kind = done.request.kind(), "commit acknowledged");
            }
            CommitOutcome::Failed { reason } => {
                let commit = &mut self.pending[pos];
                commit.failed_attempts += 1;
                warn!(
                    commit_id = commit.commit_id,
                    kind = commit.request.kind(),
                    attempts = commit.failed_attempts,
                    %reason,
                    "commit failed"
                );
                commit.last_error = Some(reason);
            }
        }
        Ok(())
    }

    fn assess(&self, draft: &InvoiceDraft) -> DomainResult<(StockValidation, ApprovalRequirement)> {
        let lines = draft.lines_with_low_stock_default(self.default_low_stock_threshold);
        let validation = validate(&lines)?;
        let approval = evaluate(&self.rules, draft.total_amount.unwrap_or(0))?;
        Ok((validation, approval))
    }

    fn build_snapshot(
        &self,
        validation: StockValidation,
        live_approval: ApprovalRequirement,
    ) -> InvoiceSnapshot {
        let stage = self.stage();
        // Once submitted, the requirement captured at submission governs.
        let approval = if stage == WorkflowStage::Draft {
            live_approval
        } else {
            self.workflow.approval().clone()
        };

        let mut blocking_reasons = Vec::new();
        let missing = self.draft.missing_fields();
        if !missing.is_empty() {
            blocking_reasons.push(BlockingReason::MissingFields { fields: missing });
        }
        if validation.is_blocked() {
            blocking_reasons.push(BlockingReason::StockBlocked {
                items: validation
                    .out_of_stock_items()
                    .into_iter()
                    .map(|id| id.to_string())
                    .collect(),
            });
        }
        match stage {
            WorkflowStage::Draft => {}
            WorkflowStage::PendingApproval => blocking_reasons.push(BlockingReason::ApprovalPending),
            other => blocking_reasons.push(BlockingReason::StageClosed { stage: other }),
        }
        if !self.pending.is_empty() {
            blocking_reasons.push(BlockingReason::CommitOutstanding {
                count: self.pending.len(),
            });
        }

        InvoiceSnapshot {
            revision: self.draft.revision,
            progress: stage.progress(approval.required),
            stage_description: stage.description().to_string(),
            submittable: blocking_reasons.is_empty(),
            validation,
            approval,
            stage,
            blocking_reasons,
        }
    }

    fn ensure_stage(&self, expected: WorkflowStage, action: &str) -> DomainResult<()> {
        if self.stage() != expected {
            return Err(DomainError::invalid_transition(self.stage(), action));
        }
        Ok(())
    }

    fn command_for(&self, action: &WorkflowAction, actor: &Actor) -> DomainResult<WorkflowCommand> {
        let occurred_at = Utc::now();

        let command = match action {
            WorkflowAction::Submit => {
                self.ensure_stage(WorkflowStage::Draft, "submit")?;
                let missing = self.draft.missing_fields();
                if !missing.is_empty() {
                    return Err(DomainError::invalid_input(format!(
                        "missing required fields: {missing:?}"
                    )));
                }
                let (stock, approval) = self.assess(&self.draft)?;
                stock.ensure_not_blocked()?;
                WorkflowCommand::Submit(Submit {
                    total_amount: self.draft.total_amount.unwrap_or(0),
                    approval,
                    stock,
                    occurred_at,
                })
            }
            WorkflowAction::Approve { notes } => {
                self.ensure_stage(WorkflowStage::PendingApproval, "approve")?;
                let acting_role = resolve_acting_role(
                    &self.role_check,
                    actor,
                    &self.workflow.approval().applicable_roles,
                    "approve",
                )?;
                let (stock, _) = self.assess(&self.draft)?;
                WorkflowCommand::Approve(Approve {
                    actor: actor.id,
                    acting_role,
                    stock,
                    notes: notes.clone(),
                    occurred_at,
                })
            }
            WorkflowAction::Reject { notes } => {
                self.ensure_stage(WorkflowStage::PendingApproval, "reject")?;
                if notes.trim().is_empty() {
                    return Err(DomainError::invalid_input("rejection notes cannot be empty"));
                }
                let acting_role = resolve_acting_role(
                    &self.role_check,
                    actor,
                    &self.workflow.approval().applicable_roles,
                    "reject",
                )?;
                WorkflowCommand::Reject(Reject {
                    actor: actor.id,
                    acting_role,
                    notes: notes.clone(),
                    occurred_at,
                })
            }
            WorkflowAction::RecordPayment { amount } => {
                WorkflowCommand::RecordPayment(RecordPayment {
                    amount: *amount,
                    occurred_at,
                })
            }
            WorkflowAction::Cancel { reason } => WorkflowCommand::Cancel(Cancel {
                reason: reason.clone(),
                occurred_at,
            }),
        };

        Ok(command)
    }

    fn commits_for(&self, event: &WorkflowEvent) -> Vec<CommitRequest> {
        let invoice_id = self.workflow.id_typed();
        match event {
            WorkflowEvent::InvoiceSubmitted(e) if e.to == WorkflowStage::Approved => {
                vec![self.stock_debit()]
            }
            WorkflowEvent::ApprovalGranted(e) => vec![
                CommitRequest::CommitApproval {
                    invoice_id,
                    decision: ApprovalRecord {
                        actor: e.actor,
                        role: e.role.clone(),
                        decision: ApprovalDecision::Approve,
                        decided_at: e.occurred_at,
                        notes: e.notes.clone(),
                    },
                },
                self.stock_debit(),
            ],
            WorkflowEvent::PaymentRecorded(e) => vec![CommitRequest::RecordPayment {
                invoice_id,
                amount: e.amount,
            }],
            _ => Vec::new(),
        }
    }

    fn stock_debit(&self) -> CommitRequest {
        CommitRequest::CommitStockDebit {
            invoice_id: self.workflow.id_typed(),
            debits: self
                .draft
                .lines
                .iter()
                .map(|line| StockDebit {
                    item_id: line.item_id.clone(),
                    quantity: line.requested_quantity,
                })
                .collect(),
        }
    }

    fn enqueue(&mut self, request: CommitRequest) -> PendingCommit {
        let commit = PendingCommit {
            commit_id: self.next_commit_id,
            request,
            failed_attempts: 0,
            last_error: None,
        };
        self.next_commit_id += 1;
        self.pending.push(commit.clone());
        commit
    }
}
