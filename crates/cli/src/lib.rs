//! Scenario replay for the invoice engine.
//!
//! A scenario is a JSON document holding an invoice draft, the actors taking
//! part and the workflow actions they perform in order. Replaying it prints
//! every snapshot and transition outcome, which makes rule and stock
//! configurations easy to try out without a host application.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use karat_auth::{Actor, MembershipRoleCheck};
use karat_inventory::StockLevels;
use karat_invoicing::{ApprovalRecord, InvoiceId, WorkflowStage};
use karat_orchestrator::{
    CommitError, CommitService, EngineConfig, InvoiceDraft, InvoiceOrchestrator, InvoiceSnapshot,
    StockDebit, TransitionOutcome, WorkflowAction,
};

#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    pub draft: InvoiceDraft,
    /// Fresh stock levels merged into the draft before the first recompute.
    #[serde(default)]
    pub stock_levels: Option<StockLevels>,
    #[serde(default)]
    pub actors: BTreeMap<String, Actor>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

/// One action performed by a named actor.
#[derive(Debug, Clone, Deserialize)]
pub struct Step {
    pub actor: String,
    #[serde(flatten)]
    pub action: WorkflowAction,
}

impl Scenario {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read scenario {}", path.display()))?;
        Self::from_json_str(&raw).with_context(|| format!("in scenario {}", path.display()))
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).context("invalid scenario JSON")
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub initial: InvoiceSnapshot,
    pub steps: Vec<StepReport>,
    #[serde(rename = "final")]
    pub final_snapshot: InvoiceSnapshot,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub actor: String,
    pub action: &'static str,
    #[serde(flatten)]
    pub result: StepResult,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum StepResult {
    Applied { outcome: TransitionOutcome },
    Refused { error: String },
}

/// Commit service that acknowledges everything and logs what it would persist.
#[derive(Debug, Default)]
pub struct LoggingCommits;

impl CommitService for LoggingCommits {
    fn commit_approval(&self, invoice_id: InvoiceId, decision: &ApprovalRecord) -> Result<(), CommitError> {
        info!(%invoice_id, role = %decision.role, decision = ?decision.decision, "commit approval");
        Ok(())
    }

    fn commit_stock_debit(&self, invoice_id: InvoiceId, debits: &[StockDebit]) -> Result<(), CommitError> {
        for debit in debits {
            info!(%invoice_id, item_id = %debit.item_id, quantity = debit.quantity, "commit stock debit");
        }
        Ok(())
    }

    fn record_payment(&self, invoice_id: InvoiceId, amount: u64) -> Result<(), CommitError> {
        info!(%invoice_id, amount, "record payment");
        Ok(())
    }
}

/// Run every step of `scenario`; refused actions are reported, not fatal.
pub fn replay(config: &EngineConfig, scenario: Scenario) -> Result<Report> {
    let Scenario {
        draft,
        stock_levels,
        actors,
        steps,
    } = scenario;

    let mut orchestrator = InvoiceOrchestrator::from_config(config, draft.clone(), MembershipRoleCheck)
        .context("failed to start orchestrator")?;

    let initial = match stock_levels {
        Some(levels) => orchestrator.refresh_stock(&levels),
        None => orchestrator.recompute(draft),
    }
    .context("initial recompute failed")?;

    let commits = LoggingCommits;
    let mut reports = Vec::with_capacity(steps.len());
    for step in steps {
        let actor = actors
            .get(&step.actor)
            .with_context(|| format!("unknown actor '{}'", step.actor))?;
        let action = step.action.name();

        let result = match orchestrator.transition(step.action, actor) {
            Ok(outcome) => {
                for commit in &outcome.commits {
                    orchestrator
                        .acknowledge(commit.run(&commits))
                        .context("failed to acknowledge commit")?;
                }
                StepResult::Applied { outcome }
            }
            Err(err) => {
                warn!(actor = %step.actor, action, error = %err, "step refused");
                StepResult::Refused {
                    error: err.to_string(),
                }
            }
        };

        reports.push(StepReport {
            actor: step.actor,
            action,
            result,
        });
    }

    let final_snapshot = orchestrator.snapshot().context("final snapshot failed")?;
    if final_snapshot.stage == WorkflowStage::Cancelled {
        info!(invoice_id = %orchestrator.workflow().id_typed(), "scenario ended with a cancelled invoice");
    }

    Ok(Report {
        initial,
        steps: reports,
        final_snapshot,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use karat_approvals::ApprovalRule;

    const SCENARIO: &str = r#"{
        "draft": {
            "invoice_id": "01890f6e-7b1a-7cc0-9d2e-3f7f3c1a0b11",
            "revision": 1,
            "customer_name": "Salem Jewellers",
            "lines": [
                { "item_id": "ring-18k", "item_name": "18k ring", "requested_quantity": 2, "available_stock": 10 }
            ],
            "total_amount": 1500
        },
        "stock_levels": { "ring-18k": { "available_stock": 6, "reserved_stock": 1 } },
        "actors": {
            "clerk": { "id": "01890f6e-7b1a-7cc0-9d2e-3f7f3c1a0b12", "display_name": "Clerk", "roles": ["sales"] },
            "boss": { "id": "01890f6e-7b1a-7cc0-9d2e-3f7f3c1a0b13", "display_name": "Boss", "roles": ["manager"] }
        },
        "steps": [
            { "actor": "clerk", "action": "submit" },
            { "actor": "clerk", "action": "approve" },
            { "actor": "boss", "action": "approve", "notes": "fine" },
            { "actor": "clerk", "action": "record_payment", "amount": 1500 }
        ]
    }"#;

    fn config() -> EngineConfig {
        EngineConfig {
            approval_rules: vec![ApprovalRule::new("manager", 1_000)],
            ..EngineConfig::default()
        }
    }

    #[test]
    fn replay_reports_refused_and_applied_steps() {
        let scenario = Scenario::from_json_str(SCENARIO).unwrap();
        let report = replay(&config(), scenario).unwrap();

        assert_eq!(report.initial.validation.results[0].available_quantity, 5);
        assert!(report.initial.approval.required);

        let results: Vec<bool> = report
            .steps
            .iter()
            .map(|s| matches!(s.result, StepResult::Applied { .. }))
            .collect();
        assert_eq!(results, [true, false, true, true]);
        assert_eq!(report.final_snapshot.stage, WorkflowStage::Paid);
    }

    #[test]
    fn unknown_actor_is_an_error() {
        let mut scenario = Scenario::from_json_str(SCENARIO).unwrap();
        scenario.steps[0].actor = "ghost".to_string();
        let err = replay(&config(), scenario).unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn report_serializes_final_snapshot_under_final() {
        let scenario = Scenario::from_json_str(SCENARIO).unwrap();
        let report = replay(&config(), scenario).unwrap();
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["final"]["stage"], "paid");
        assert_eq!(json["steps"][1]["result"], "refused");
    }
}
