//! `erpguard-auth`: role/permission resolution (pure, no IO).
//!
//! This crate is intentionally decoupled from HTTP and storage.

pub mod actor;
pub mod catalog;
pub mod engine;
pub mod guard;
pub mod hierarchy;
pub mod permissions;
pub mod roles;

pub use actor::{ActorContext, RbacCheck, TenantScoped};
pub use catalog::{CatalogError, PermissionCatalog, RoleDefinition};
pub use engine::{AuthorizationEngine, AuthorizationExplanation, AuthzError, DenialKind};
pub use guard::{Guard, GuardExpression, GuardOperator, GuardPredicate, PredicateError};
pub use hierarchy::{CombinationReport, OptimizedRoles, RoleHierarchy};
pub use permissions::{Action, Permission, PermissionError};
pub use roles::{Role, RoleClassification, RoleScope};
