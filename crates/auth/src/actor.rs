use serde::{Deserialize, Serialize};

use karat_core::UserId;

use crate::Role;

/// The user performing a workflow action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: UserId,
    pub display_name: String,
    /// Roles granted by the host application's auth subsystem.
    #[serde(default)]
    pub roles: Vec<Role>,
}

impl Actor {
    pub fn new(id: UserId, display_name: impl Into<String>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            roles: Vec::new(),
        }
    }

    pub fn with_role(mut self, role: impl Into<Role>) -> Self {
        self.roles.push(role.into());
        self
    }
}
