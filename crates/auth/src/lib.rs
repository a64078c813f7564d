//! `karat-auth`: role capability boundary.
//!
//! Authentication lives in the host application; this crate only models the
//! roles an actor holds and the `actor_has_role` capability the approval
//! guard consumes.

pub mod actor;
pub mod authorize;
pub mod roles;

pub use actor::Actor;
pub use authorize::{AuthzError, MembershipRoleCheck, RoleCheck, resolve_acting_role};
pub use roles::Role;
