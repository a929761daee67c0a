//! Composable access guards.
//!
//! A [`Guard`] is a small boolean tree over role membership, permission
//! membership and named predicates. The flat [`GuardExpression`] used by UI
//! guard components (one operator over a list of leaves) lowers into it.

use std::borrow::Cow;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{ActorContext, Permission, RbacCheck, Role};

/// A predicate could not decide. Treated as "not satisfied" by evaluation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct PredicateError(pub String);

impl PredicateError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

type PredicateFn = dyn Fn(&ActorContext) -> Result<bool, PredicateError> + Send + Sync;

/// Named custom condition over the actor context.
#[derive(Clone)]
pub struct GuardPredicate {
    name: Cow<'static, str>,
    check: Arc<PredicateFn>,
}

impl GuardPredicate {
    pub fn new<F>(name: impl Into<Cow<'static, str>>, check: F) -> Self
    where
        F: Fn(&ActorContext) -> Result<bool, PredicateError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            check: Arc::new(check),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run the predicate. Errors collapse to `false` and are logged.
    pub fn evaluate(&self, actor: &ActorContext) -> bool {
        match (self.check)(actor) {
            Ok(satisfied) => satisfied,
            Err(err) => {
                tracing::warn!(
                    predicate = %self.name,
                    actor_id = %actor.actor_id(),
                    tenant_id = %actor.tenant_id(),
                    error = %err,
                    "guard predicate failed; treating as not satisfied"
                );
                false
            }
        }
    }
}

impl core::fmt::Debug for GuardPredicate {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("GuardPredicate")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub enum Guard {
    Role(Role),
    Permission(Permission),
    Predicate(GuardPredicate),
    /// True iff every child is true. Empty: true.
    All(Vec<Guard>),
    /// True iff some child is true. Empty: true (an empty guard restricts nothing).
    Any(Vec<Guard>),
}

impl Guard {
    pub fn role(role: impl Into<Role>) -> Self {
        Guard::Role(role.into())
    }

    pub fn permission(permission: Permission) -> Self {
        Guard::Permission(permission)
    }

    pub fn predicate<F>(name: impl Into<Cow<'static, str>>, check: F) -> Self
    where
        F: Fn(&ActorContext) -> Result<bool, PredicateError> + Send + Sync + 'static,
    {
        Guard::Predicate(GuardPredicate::new(name, check))
    }

    pub fn all(children: impl IntoIterator<Item = Guard>) -> Self {
        Guard::All(children.into_iter().collect())
    }

    pub fn any(children: impl IntoIterator<Item = Guard>) -> Self {
        Guard::Any(children.into_iter().collect())
    }

    /// Evaluate against `check` (the actor itself, or a tenant-scoped view of
    /// it); predicates receive `actor`.
    pub fn evaluate<C: RbacCheck + ?Sized>(&self, check: &C, actor: &ActorContext) -> bool {
        match self {
            Guard::Role(role) => check.has_role(role),
            Guard::Permission(permission) => check.has_permission(permission),
            Guard::Predicate(predicate) => predicate.evaluate(actor),
            Guard::All(children) => children.iter().all(|g| g.evaluate(check, actor)),
            Guard::Any(children) => {
                children.is_empty() || children.iter().any(|g| g.evaluate(check, actor))
            }
        }
    }

    /// Visit every leaf role and permission.
    pub fn for_each_reference(&self, visit: &mut dyn FnMut(GuardReference<'_>)) {
        match self {
            Guard::Role(role) => visit(GuardReference::Role(role)),
            Guard::Permission(permission) => visit(GuardReference::Permission(permission)),
            Guard::Predicate(_) => {}
            Guard::All(children) | Guard::Any(children) => {
                for child in children {
                    child.for_each_reference(visit);
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardReference<'a> {
    Role(&'a Role),
    Permission(&'a Permission),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GuardOperator {
    And,
    #[default]
    Or,
}

/// Flat guard: one operator applied to every listed condition.
#[derive(Debug, Clone, Default)]
pub struct GuardExpression {
    pub roles: Vec<Role>,
    pub permissions: Vec<Permission>,
    pub predicates: Vec<GuardPredicate>,
    pub operator: GuardOperator,
}

impl GuardExpression {
    pub fn leaf_count(&self) -> usize {
        self.roles.len() + self.permissions.len() + self.predicates.len()
    }
}

impl From<GuardExpression> for Guard {
    fn from(expr: GuardExpression) -> Self {
        let leaves: Vec<Guard> = expr
            .roles
            .into_iter()
            .map(Guard::Role)
            .chain(expr.permissions.into_iter().map(Guard::Permission))
            .chain(expr.predicates.into_iter().map(Guard::Predicate))
            .collect();

        match expr.operator {
            GuardOperator::And => Guard::All(leaves),
            GuardOperator::Or => Guard::Any(leaves),
        }
    }
}
