use std::collections::HashSet;

use serde::Serialize;

use erpguard_core::{TenantId, UserId};

use crate::{Permission, Role};

/// Stable membership-check contract consumed by UI guards and controller
/// middleware.
///
/// `has_any_*` over an empty list is `false`; `has_all_*` over an empty list
/// is `true`.
pub trait RbacCheck {
    fn has_role(&self, role: &Role) -> bool;

    fn has_permission(&self, permission: &Permission) -> bool;

    fn has_any_role(&self, roles: &[Role]) -> bool {
        roles.iter().any(|r| self.has_role(r))
    }

    fn has_all_roles(&self, roles: &[Role]) -> bool {
        roles.iter().all(|r| self.has_role(r))
    }

    fn has_any_permission(&self, permissions: &[Permission]) -> bool {
        permissions.iter().any(|p| self.has_permission(p))
    }

    fn has_all_permissions(&self, permissions: &[Permission]) -> bool {
        permissions.iter().all(|p| self.has_permission(p))
    }
}

/// Resolved roles and permissions of one actor within one tenant.
///
/// Built once per request (see [`crate::AuthorizationEngine::resolve_actor`])
/// and read-only for the unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActorContext {
    actor_id: UserId,
    tenant_id: TenantId,
    roles: Vec<Role>,
    permissions: HashSet<Permission>,
}

impl ActorContext {
    /// Roles are deduplicated, keeping first-seen order.
    pub fn new(
        actor_id: UserId,
        tenant_id: TenantId,
        roles: impl IntoIterator<Item = Role>,
        permissions: impl IntoIterator<Item = Permission>,
    ) -> Self {
        let mut distinct = Vec::new();
        for role in roles {
            if !distinct.contains(&role) {
                distinct.push(role);
            }
        }

        Self {
            actor_id,
            tenant_id,
            roles: distinct,
            permissions: permissions.into_iter().collect(),
        }
    }

    pub fn actor_id(&self) -> UserId {
        self.actor_id
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn roles(&self) -> &[Role] {
        &self.roles
    }

    pub fn permissions(&self) -> &HashSet<Permission> {
        &self.permissions
    }

    /// Sorted permission names, for display and audit output.
    pub fn permission_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.permissions.iter().map(Permission::to_string).collect();
        names.sort();
        names
    }

    pub fn belongs_to(&self, tenant_id: TenantId) -> bool {
        self.tenant_id == tenant_id
    }

    /// View of this actor against a resource owned by `resource_tenant`.
    ///
    /// Every check on the view answers `false` when the tenants differ: a
    /// cross-tenant request is indistinguishable from a missing grant.
    pub fn scoped_to(&self, resource_tenant: TenantId) -> TenantScoped<'_> {
        TenantScoped {
            actor: self,
            resource_tenant,
        }
    }
}

impl RbacCheck for ActorContext {
    fn has_role(&self, role: &Role) -> bool {
        self.roles.contains(role)
    }

    fn has_permission(&self, permission: &Permission) -> bool {
        self.permissions.contains(permission)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TenantScoped<'a> {
    actor: &'a ActorContext,
    resource_tenant: TenantId,
}

impl TenantScoped<'_> {
    pub fn actor(&self) -> &ActorContext {
        self.actor
    }

    pub fn resource_tenant(&self) -> TenantId {
        self.resource_tenant
    }

    pub fn tenant_matches(&self) -> bool {
        self.actor.belongs_to(self.resource_tenant)
    }
}

impl RbacCheck for TenantScoped<'_> {
    fn has_role(&self, role: &Role) -> bool {
        self.tenant_matches() && self.actor.has_role(role)
    }

    fn has_permission(&self, permission: &Permission) -> bool {
        self.tenant_matches() && self.actor.has_permission(permission)
    }

    fn has_any_role(&self, roles: &[Role]) -> bool {
        self.tenant_matches() && self.actor.has_any_role(roles)
    }

    fn has_all_roles(&self, roles: &[Role]) -> bool {
        self.tenant_matches() && self.actor.has_all_roles(roles)
    }

    fn has_any_permission(&self, permissions: &[Permission]) -> bool {
        self.tenant_matches() && self.actor.has_any_permission(permissions)
    }

    fn has_all_permissions(&self, permissions: &[Permission]) -> bool {
        self.tenant_matches() && self.actor.has_all_permissions(permissions)
    }
}
