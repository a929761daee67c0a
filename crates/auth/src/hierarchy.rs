//! Role privilege levels and role-set analysis.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;

use crate::catalog::{PermissionCatalog, RoleDefinition};
use crate::{Role, RoleClassification};

/// Outcome of checking a role combination.
///
/// Conflicts are contradictory assignments; warnings are redundant ones. Neither
/// blocks anything on its own: callers decide what to do with them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CombinationReport {
    pub conflicts: Vec<String>,
    pub warnings: Vec<String>,
}

impl CombinationReport {
    pub fn is_clean(&self) -> bool {
        self.conflicts.is_empty() && self.warnings.is_empty()
    }
}

/// Outcome of collapsing a role set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OptimizedRoles {
    pub optimized: Vec<Role>,
    pub removed: Vec<Role>,
    pub reasons: Vec<String>,
}

/// Privilege ordering over the catalog's roles.
///
/// Built from an immutable catalog, so it is `Send + Sync` and needs no locking.
#[derive(Debug, Clone)]
pub struct RoleHierarchy {
    catalog: Arc<PermissionCatalog>,
    top_administrative: Option<Role>,
}

impl RoleHierarchy {
    pub fn new(catalog: Arc<PermissionCatalog>) -> Self {
        // Highest-level administrative role; the first declared wins ties.
        let top_administrative = catalog
            .roles()
            .filter(|def| def.classification == RoleClassification::Administrative)
            .fold(None::<&RoleDefinition>, |best, def| match best {
                Some(b) if b.level >= def.level => Some(b),
                _ => Some(def),
            })
            .map(|def| def.role.clone());

        Self {
            catalog,
            top_administrative,
        }
    }

    pub fn catalog(&self) -> &PermissionCatalog {
        &self.catalog
    }

    pub fn level(&self, role: &Role) -> Option<u32> {
        self.catalog.role(role).map(|def| def.level)
    }

    /// Compare privilege levels. `None` if either role is unknown.
    pub fn compare(&self, a: &Role, b: &Role) -> Option<Ordering> {
        Some(self.level(a)?.cmp(&self.level(b)?))
    }

    pub fn classification(&self, role: &Role) -> Option<RoleClassification> {
        self.catalog.role(role).map(|def| def.classification)
    }

    pub fn is_administrative(&self, role: &Role) -> bool {
        self.classification(role) == Some(RoleClassification::Administrative)
    }

    pub fn is_operational(&self, role: &Role) -> bool {
        self.classification(role) == Some(RoleClassification::Operational)
    }

    pub fn is_observer(&self, role: &Role) -> bool {
        self.classification(role) == Some(RoleClassification::Observer)
    }

    pub fn top_administrative(&self) -> Option<&Role> {
        self.top_administrative.as_ref()
    }

    /// Highest level among the known roles in `roles`.
    pub fn highest_level(&self, roles: &[Role]) -> Option<u32> {
        roles.iter().filter_map(|r| self.level(r)).max()
    }

    /// Roles an actor holding `actor_roles` may grant to someone else.
    ///
    /// Everything strictly below the actor's highest level; an actor holding an
    /// administrative role may assign any role.
    pub fn assignable_roles(&self, actor_roles: &[Role]) -> Vec<Role> {
        if actor_roles.iter().any(|r| self.is_administrative(r)) {
            return self.catalog.roles().map(|def| def.role.clone()).collect();
        }

        let Some(ceiling) = self.highest_level(actor_roles) else {
            return Vec::new();
        };

        self.catalog
            .roles()
            .filter(|def| def.level < ceiling)
            .map(|def| def.role.clone())
            .collect()
    }

    pub fn can_assign(&self, actor_roles: &[Role], role: &Role) -> bool {
        self.catalog.is_known_role(role) && self.assignable_roles(actor_roles).contains(role)
    }

    /// Whether `higher` makes `lower` redundant: `higher` is not an observer,
    /// sits at a strictly higher level and grants every permission `lower` does.
    pub fn subsumes(&self, higher: &Role, lower: &Role) -> bool {
        let (Some(h), Some(l)) = (self.catalog.role(higher), self.catalog.role(lower)) else {
            return false;
        };
        h.classification != RoleClassification::Observer
            && h.level > l.level
            && l.permissions.is_subset(&h.permissions)
    }

    pub fn validate_combination(&self, roles: &[Role]) -> CombinationReport {
        let mut report = CombinationReport::default();
        let mut seen = HashSet::new();
        let mut distinct = Vec::new();

        for role in roles {
            if !self.catalog.is_known_role(role) {
                report
                    .conflicts
                    .push(format!("{role} is not a role declared in catalog {}", self.catalog.version()));
                continue;
            }
            if seen.insert(role) {
                distinct.push(role);
            } else {
                report.warnings.push(format!("{role} is assigned more than once"));
            }
        }

        for (i, a) in distinct.iter().enumerate() {
            for b in distinct.iter().skip(i + 1) {
                if let Some((admin, observer)) = self.admin_observer_pair(a, b) {
                    report.conflicts.push(format!(
                        "{admin} (administrative) and {observer} (observer) express contradictory intents"
                    ));
                    continue;
                }

                let redundant = if self.subsumes(a, b) {
                    Some((a, b))
                } else if self.subsumes(b, a) {
                    Some((b, a))
                } else {
                    None
                };
                if let Some((higher, lower)) = redundant {
                    report
                        .warnings
                        .push(format!("{lower} is redundant alongside {higher}"));
                }
            }
        }

        report
    }

    fn admin_observer_pair<'r>(&self, a: &'r Role, b: &'r Role) -> Option<(&'r Role, &'r Role)> {
        if self.is_administrative(a) && self.is_observer(b) {
            Some((a, b))
        } else if self.is_administrative(b) && self.is_observer(a) {
            Some((b, a))
        } else {
            None
        }
    }

    /// Collapse a role set by dropping roles made redundant by a higher role in
    /// the same set.
    ///
    /// Input order is preserved, duplicates collapse, unknown roles are kept as
    /// they are. The result is a fixed point: optimizing it again changes nothing.
    pub fn optimize(&self, roles: &[Role]) -> OptimizedRoles {
        let mut distinct: Vec<&Role> = Vec::new();
        let mut out = OptimizedRoles::default();

        for role in roles {
            if distinct.contains(&role) {
                if !out.removed.contains(role) {
                    out.removed.push(role.clone());
                    out.reasons.push(format!("{role} was listed more than once"));
                }
            } else {
                distinct.push(role);
            }
        }

        if let Some(top) = self.top_administrative.as_ref().filter(|t| distinct.contains(t)) {
            for role in distinct.iter().filter(|r| **r != top) {
                if !out.removed.contains(role) {
                    out.removed.push((*role).clone());
                }
                out.reasons
                    .push(format!("{role} is implied by {top}, which grants every permission"));
            }
            out.optimized = vec![top.clone()];
            return out;
        }

        for role in &distinct {
            let subsumer = distinct.iter().find(|other| self.subsumes(other, role));
            match subsumer {
                Some(higher) => {
                    if !out.removed.contains(role) {
                        out.removed.push((*role).clone());
                    }
                    out.reasons
                        .push(format!("{role} is fully subsumed by {higher}"));
                }
                None => out.optimized.push((*role).clone()),
            }
        }

        out
    }
}
