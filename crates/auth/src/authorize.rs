use thiserror::Error;

use karat_core::DomainError;

use crate::{Actor, Role};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("no role is allowed to perform '{action}'")]
    NoApplicableRoles { action: String },

    #[error("forbidden: '{action}' requires one of {required:?}")]
    MissingRole {
        action: String,
        required: Vec<String>,
    },
}

impl From<AuthzError> for DomainError {
    fn from(value: AuthzError) -> Self {
        match value {
            AuthzError::NoApplicableRoles { action } => {
                DomainError::unauthorized(action, Vec::<String>::new())
            }
            AuthzError::MissingRole { action, required } => {
                DomainError::unauthorized(action, required)
            }
        }
    }
}

/// Capability check supplied by the host application's auth subsystem.
pub trait RoleCheck {
    fn actor_has_role(&self, actor: &Actor, role: &Role) -> bool;
}

impl<T: RoleCheck + ?Sized> RoleCheck for &T {
    fn actor_has_role(&self, actor: &Actor, role: &Role) -> bool {
        (**self).actor_has_role(actor, role)
    }
}

/// Role check backed by the roles carried on the [`Actor`] itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct MembershipRoleCheck;

impl RoleCheck for MembershipRoleCheck {
    fn actor_has_role(&self, actor: &Actor, role: &Role) -> bool {
        actor.roles.iter().any(|r| r == role)
    }
}

/// Pick the first allowed role the actor holds.
///
/// `allowed` is the applicable role set of an approval requirement; the
/// returned role is recorded in the approval history.
pub fn resolve_acting_role<C>(
    checker: &C,
    actor: &Actor,
    allowed: &[Role],
    action: &str,
) -> Result<Role, AuthzError>
where
    C: RoleCheck + ?Sized,
{
    if allowed.is_empty() {
        return Err(AuthzError::NoApplicableRoles {
            action: action.to_string(),
        });
    }

    allowed
        .iter()
        .find(|role| checker.actor_has_role(actor, role))
        .cloned()
        .ok_or_else(|| AuthzError::MissingRole {
            action: action.to_string(),
            required: allowed.iter().map(|r| r.as_str().to_string()).collect(),
        })
}
