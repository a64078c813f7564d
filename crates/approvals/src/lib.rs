//! Threshold-based approval rules.
//!
//! Stateless: the same rules and total always produce the same requirement.

pub mod rules;

pub use rules::{ApprovalRequirement, ApprovalRule, evaluate, validate_rules};
