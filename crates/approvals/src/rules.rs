use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use karat_auth::Role;
use karat_core::{DomainError, DomainResult};

/// Invoices at or above `amount_threshold` need sign-off from `role`
/// when the rule is `required`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRule {
    pub role: Role,
    /// Threshold in smallest currency unit.
    pub amount_threshold: u64,
    #[serde(default = "default_required")]
    pub required: bool,
}

fn default_required() -> bool {
    true
}

impl ApprovalRule {
    pub fn new(role: impl Into<Role>, amount_threshold: u64) -> Self {
        Self {
            role: role.into(),
            amount_threshold,
            required: true,
        }
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn applies_to(&self, total_amount: u64) -> bool {
        self.required && total_amount >= self.amount_threshold
    }
}

/// Outcome of evaluating a rule set against an invoice total.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ApprovalRequirement {
    pub required: bool,
    /// Union of roles from every applicable rule; holding any one is enough.
    pub applicable_roles: Vec<Role>,
}

impl ApprovalRequirement {
    /// No approval needed; the workflow skips `pending_approval`.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn authorizes(&self, role: &Role) -> bool {
        self.applicable_roles.contains(role)
    }
}

/// Reject rule data that can never be satisfied.
///
/// This is the only hard failure of the rule engine: a blank role means the
/// configured rules are corrupted, not that the invoice is wrong.
pub fn validate_rules(rules: &[ApprovalRule]) -> DomainResult<()> {
    if let Some(pos) = rules.iter().position(|r| r.role.is_blank()) {
        return Err(DomainError::invariant(format!(
            "approval rule #{} has an empty role",
            pos + 1
        )));
    }
    Ok(())
}

/// Evaluate every rule independently against `total_amount`.
///
/// Multiple applicable rules are merged by union of roles (first-seen order,
/// no duplicates) rather than by picking one.
pub fn evaluate(rules: &[ApprovalRule], total_amount: u64) -> DomainResult<ApprovalRequirement> {
    validate_rules(rules)?;

    let mut seen: HashSet<&Role> = HashSet::new();
    let mut applicable_roles: Vec<Role> = Vec::new();
    for rule in rules.iter().filter(|rule| rule.applies_to(total_amount)) {
        if seen.insert(&rule.role) {
            applicable_roles.push(rule.role.clone());
        }
    }

    Ok(ApprovalRequirement {
        required: !applicable_roles.is_empty(),
        applicable_roles,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn manager_rule() -> Vec<ApprovalRule> {
        vec![ApprovalRule::new("manager", 1000)]
    }

    #[test]
    fn total_above_threshold_requires_manager() {
        let requirement = evaluate(&manager_rule(), 1500).unwrap();
        assert!(requirement.required);
        assert_eq!(requirement.applicable_roles, vec![Role::new("manager")]);
        assert!(requirement.authorizes(&Role::new("manager")));
        assert!(!requirement.authorizes(&Role::new("clerk")));
    }

    #[test]
    fn total_below_threshold_needs_no_approval() {
        assert_eq!(evaluate(&manager_rule(), 800).unwrap(), ApprovalRequirement::none());
    }

    #[test]
    fn threshold_is_inclusive() {
        assert!(evaluate(&manager_rule(), 1000).unwrap().required);
        assert!(!evaluate(&manager_rule(), 999).unwrap().required);
    }

    #[test]
    fn empty_or_optional_rules_never_require_approval() {
        assert!(!evaluate(&[], u64::MAX).unwrap().required);

        let optional = vec![ApprovalRule::new("owner", 0).optional()];
        assert!(!evaluate(&optional, 50_000).unwrap().required);
    }

    #[test]
    fn overlapping_rules_union_roles_without_duplicates() {
        let rules = vec![
            ApprovalRule::new("manager", 1_000),
            ApprovalRule::new("owner", 10_000),
            ApprovalRule::new("manager", 5_000),
            ApprovalRule::new("auditor", 50_000),
        ];

        let requirement = evaluate(&rules, 12_000).unwrap();
        assert_eq!(
            requirement.applicable_roles,
            vec![Role::new("manager"), Role::new("owner")]
        );
    }

    #[test]
    fn blank_role_is_corrupted_rule_data() {
        let rules = vec![ApprovalRule::new("manager", 10), ApprovalRule::new(" ", 20)];
        match evaluate(&rules, 5).unwrap_err() {
            DomainError::InvariantViolation(msg) => assert!(msg.contains("#2")),
            other => panic!("expected InvariantViolation, got {other:?}"),
        }
    }

    #[test]
    fn rules_deserialize_with_required_defaulting_to_true() {
        let rules: Vec<ApprovalRule> =
            serde_json::from_str(r#"[{"role": "manager", "amount_threshold": 1000}]"#).unwrap();
        assert_eq!(rules, manager_rule());
    }

    fn arb_rule() -> impl Strategy<Value = ApprovalRule> {
        (
            prop::sample::select(vec!["manager", "owner", "accountant"]),
            0u64..10_000,
            any::<bool>(),
        )
            .prop_map(|(role, threshold, required)| ApprovalRule {
                role: Role::new(role),
                amount_threshold: threshold,
                required,
            })
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: approval is required exactly when some required rule's
        /// threshold is reached, and every applicable role comes from such a rule.
        #[test]
        fn requirement_matches_rule_union(
            rules in prop::collection::vec(arb_rule(), 0..6),
            total in 0u64..12_000,
        ) {
            let requirement = evaluate(&rules, total).unwrap();
            let applicable: Vec<&ApprovalRule> =
                rules.iter().filter(|r| r.required && total >= r.amount_threshold).collect();

            prop_assert_eq!(requirement.required, !applicable.is_empty());
            for rule in &applicable {
                prop_assert!(requirement.authorizes(&rule.role));
            }
            for role in &requirement.applicable_roles {
                prop_assert!(applicable.iter().any(|r| &r.role == role));
            }
        }

        /// Property: raising the total never removes a required approval.
        #[test]
        fn raising_total_keeps_approval_required(
            rules in prop::collection::vec(arb_rule(), 0..6),
            total in 0u64..10_000,
            extra in 0u64..5_000,
        ) {
            if evaluate(&rules, total).unwrap().required {
                prop_assert!(evaluate(&rules, total + extra).unwrap().required);
            }
        }
    }
}
