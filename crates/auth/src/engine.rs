use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use erpguard_core::{TenantId, UserId};

use crate::catalog::{CatalogError, PermissionCatalog};
use crate::guard::{Guard, GuardReference};
use crate::hierarchy::RoleHierarchy;
use crate::{ActorContext, Permission, RbacCheck, Role};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    /// Rendered without detail: a cross-tenant probe learns nothing.
    #[error("access denied")]
    TenantMismatch,

    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),

    #[error("permission '{0}' is not declared in the permission catalog")]
    UnknownPermission(String),
}

/// Decides whether an actor may do something.
///
/// Holds only immutable, `Arc`-shared state, so one engine serves every
/// request concurrently. Every decision is a pure function of its inputs:
/// no IO, no panics.
#[derive(Debug, Clone)]
pub struct AuthorizationEngine {
    catalog: Arc<PermissionCatalog>,
    hierarchy: Arc<RoleHierarchy>,
}

impl AuthorizationEngine {
    pub fn new(catalog: Arc<PermissionCatalog>) -> Self {
        let hierarchy = Arc::new(RoleHierarchy::new(catalog.clone()));
        Self { catalog, hierarchy }
    }

    pub fn catalog(&self) -> &Arc<PermissionCatalog> {
        &self.catalog
    }

    pub fn hierarchy(&self) -> &Arc<RoleHierarchy> {
        &self.hierarchy
    }

    /// Build the actor context for a request from persisted role assignments.
    ///
    /// When the roles conflict, the actor holds the union of their
    /// permissions; the conflict is logged so operators can clean it up.
    pub fn resolve_actor(
        &self,
        actor_id: UserId,
        tenant_id: TenantId,
        roles: Vec<Role>,
    ) -> Result<ActorContext, CatalogError> {
        for role in &roles {
            self.catalog.ensure_role(role)?;
        }

        let report = self.hierarchy.validate_combination(&roles);
        if !report.conflicts.is_empty() {
            tracing::warn!(
                %actor_id,
                %tenant_id,
                conflicts = ?report.conflicts,
                "actor holds conflicting roles; granting the union of their permissions"
            );
        }

        let permissions = self.catalog.union_of(&roles);
        Ok(ActorContext::new(actor_id, tenant_id, roles, permissions))
    }

    /// Authorize `actor` for `required` on a resource owned by `resource_tenant`.
    pub fn authorize(
        &self,
        actor: &ActorContext,
        resource_tenant: TenantId,
        required: &Permission,
    ) -> Result<(), AuthzError> {
        if !self.catalog.contains_permission(required) {
            return Err(AuthzError::UnknownPermission(required.to_string()));
        }

        if !actor.belongs_to(resource_tenant) {
            tracing::debug!(
                actor_id = %actor.actor_id(),
                actor_tenant = %actor.tenant_id(),
                %resource_tenant,
                "cross-tenant access denied"
            );
            return Err(AuthzError::TenantMismatch);
        }

        if actor.has_permission(required) {
            Ok(())
        } else {
            Err(AuthzError::Forbidden(required.to_string()))
        }
    }

    pub fn is_allowed(
        &self,
        actor: &ActorContext,
        resource_tenant: TenantId,
        required: &Permission,
    ) -> bool {
        self.authorize(actor, resource_tenant, required).is_ok()
    }

    /// Evaluate a guard within the actor's own tenant.
    pub fn evaluate_guard(&self, actor: &ActorContext, guard: &Guard) -> bool {
        guard.evaluate(actor, actor)
    }

    /// Evaluate a guard against a resource owned by `resource_tenant`.
    pub fn evaluate_guard_in(
        &self,
        actor: &ActorContext,
        resource_tenant: TenantId,
        guard: &Guard,
    ) -> bool {
        let scoped = actor.scoped_to(resource_tenant);
        if !scoped.tenant_matches() {
            return false;
        }
        guard.evaluate(&scoped, actor)
    }

    /// Check that every role and permission a guard mentions exists in the
    /// catalog. Run at guard registration time, not per request.
    pub fn validate_guard(&self, guard: &Guard) -> Result<(), CatalogError> {
        let mut first_error = None;
        guard.for_each_reference(&mut |reference| {
            if first_error.is_some() {
                return;
            }
            let result = match reference {
                GuardReference::Role(role) => self.catalog.ensure_role(role),
                GuardReference::Permission(permission) => self.catalog.ensure_permission(permission),
            };
            first_error = result.err();
        });
        first_error.map_or(Ok(()), Err)
    }

    /// Explain why an authorization decision was made (or would be made).
    pub fn explain(
        &self,
        actor: &ActorContext,
        resource_tenant: TenantId,
        required: &Permission,
    ) -> AuthorizationExplanation {
        let state = ActorState {
            actor_id: actor.actor_id(),
            actor_tenant_id: actor.tenant_id(),
            resource_tenant_id: resource_tenant,
            roles: actor.roles().iter().map(|r| r.as_str().to_string()).collect(),
            effective_permissions: actor.permission_names(),
        };
        let required_str = required.to_string();

        match self.authorize(actor, resource_tenant, required) {
            Ok(()) => {
                let granted_by: Vec<String> = actor
                    .roles()
                    .iter()
                    .filter(|r| self.catalog.grants(r, required))
                    .map(|r| r.as_str().to_string())
                    .collect();
                AuthorizationExplanation {
                    reason: format!("Permission '{required_str}' is granted by role(s) {granted_by:?}"),
                    required_permission: required_str,
                    granted: true,
                    actor: state,
                    denial_reason: None,
                }
            }
            Err(AuthzError::TenantMismatch) => AuthorizationExplanation {
                reason: format!(
                    "Tenant mismatch: actor belongs to tenant {} but the resource belongs to tenant {}",
                    actor.tenant_id(),
                    resource_tenant
                ),
                required_permission: required_str,
                granted: false,
                actor: state,
                denial_reason: Some(DenialReason {
                    kind: DenialKind::TenantMismatch,
                    message: "Actor is acting in a different tenant than the resource".to_string(),
                    suggestions: vec![
                        "Verify the tenant context resolved for the request".to_string(),
                    ],
                }),
            },
            Err(AuthzError::UnknownPermission(_)) => AuthorizationExplanation {
                reason: format!("Permission '{required_str}' is not declared in catalog {}", self.catalog.version()),
                required_permission: required_str.clone(),
                granted: false,
                actor: state,
                denial_reason: Some(DenialReason {
                    kind: DenialKind::UnknownPermission,
                    message: format!("'{required_str}' is not granted by any role"),
                    suggestions: vec![
                        "Regenerate the permission catalog or fix the permission name at the call site"
                            .to_string(),
                    ],
                }),
            },
            Err(AuthzError::Forbidden(_)) => {
                let granting_roles: Vec<String> = self
                    .catalog
                    .roles_granting(required)
                    .into_iter()
                    .map(|r| r.as_str().to_string())
                    .collect();

                let mut suggestions = Vec::new();
                if !granting_roles.is_empty() {
                    suggestions.push(format!(
                        "Assign one of the roles that grant this permission: {granting_roles:?}"
                    ));
                }

                AuthorizationExplanation {
                    reason: format!(
                        "Actor does not have permission '{required_str}'. Current permissions: {:?}",
                        state.effective_permissions
                    ),
                    required_permission: required_str.clone(),
                    granted: false,
                    actor: state,
                    denial_reason: Some(DenialReason {
                        kind: DenialKind::MissingPermission,
                        message: format!("Missing required permission: '{required_str}'"),
                        suggestions,
                    }),
                }
            }
        }
    }
}

/// Detailed, auditable explanation of an authorization decision.
#[derive(Debug, Clone, Serialize)]
pub struct AuthorizationExplanation {
    /// The permission that was being checked.
    pub required_permission: String,

    /// Whether the authorization was granted.
    pub granted: bool,

    /// Human-readable reason for the decision.
    pub reason: String,

    pub actor: ActorState,

    /// If denied, this explains what was missing.
    pub denial_reason: Option<DenialReason>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActorState {
    pub actor_id: UserId,
    pub actor_tenant_id: TenantId,
    pub resource_tenant_id: TenantId,
    pub roles: Vec<String>,
    pub effective_permissions: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DenialReason {
    pub kind: DenialKind,
    pub message: String,
    pub suggestions: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialKind {
    TenantMismatch,
    MissingPermission,
    UnknownPermission,
}
