//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Every failure of the validator, the rule engine and the workflow machine is
/// returned as one of these values so the UI layer can render it directly.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Malformed caller input (non-positive quantity, missing identifier,
    /// empty rejection notes, ...). Never partially processed.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A transition into `approved` was attempted while items are out of stock.
    #[error("stock blocked: out of stock items {items:?}")]
    StockBlocked { items: Vec<String> },

    /// The actor holds none of the roles allowed to perform the action.
    #[error("unauthorized transition '{action}': requires one of {required_roles:?}")]
    UnauthorizedTransition {
        action: String,
        required_roles: Vec<String>,
    },

    /// The action is not legal from the current stage.
    #[error("invalid transition: cannot {action} from {from}")]
    InvalidTransition { from: String, action: String },

    /// A domain invariant was violated (e.g. corrupted rule data).
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// A conflict occurred (stale revision, version mismatch, outstanding work).
    #[error("conflict: {0}")]
    Conflict(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

impl DomainError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn stock_blocked<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::StockBlocked {
            items: items.into_iter().map(Into::into).collect(),
        }
    }

    pub fn unauthorized<I, S>(action: impl Into<String>, required_roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::UnauthorizedTransition {
            action: action.into(),
            required_roles: required_roles.into_iter().map(Into::into).collect(),
        }
    }

    pub fn invalid_transition(from: impl core::fmt::Display, action: impl Into<String>) -> Self {
        Self::InvalidTransition {
            from: from.to_string(),
            action: action.into(),
        }
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    /// Whether the caller can fix the condition and retry the same action.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::InvalidInput(_) | Self::StockBlocked { .. } | Self::Conflict(_)
        )
    }
}
