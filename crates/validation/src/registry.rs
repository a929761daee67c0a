//! Named predicates backing `CUSTOM_RULE` business rules.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

use crate::context::ValidationContext;
use crate::entity::EntitySnapshot;

/// A predicate could not decide. Evaluation treats it as "rule not satisfied".
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct RuleFailure(pub String);

impl RuleFailure {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

pub trait CustomRule: Send + Sync {
    /// `true` when `entity` satisfies the rule on `field`. `params` is the
    /// rule's opaque configuration payload.
    fn check(
        &self,
        entity: &EntitySnapshot,
        field: &str,
        params: &Value,
        ctx: &ValidationContext,
    ) -> Result<bool, RuleFailure>;
}

struct FnRule<F>(F);

impl<F> CustomRule for FnRule<F>
where
    F: Fn(&EntitySnapshot, &str, &Value, &ValidationContext) -> Result<bool, RuleFailure>
        + Send
        + Sync,
{
    fn check(
        &self,
        entity: &EntitySnapshot,
        field: &str,
        params: &Value,
        ctx: &ValidationContext,
    ) -> Result<bool, RuleFailure> {
        (self.0)(entity, field, params, ctx)
    }
}

/// Injected lookup of custom predicates by name. Built at startup,
/// immutable once shared.
#[derive(Clone, Default)]
pub struct CustomRuleRegistry {
    rules: HashMap<String, Arc<dyn CustomRule>>,
}

impl CustomRuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the predicate called `name`.
    pub fn register(&mut self, name: impl Into<String>, rule: impl CustomRule + 'static) {
        self.rules.insert(name.into(), Arc::new(rule));
    }

    /// Builder form taking a plain closure.
    pub fn with<F>(mut self, name: impl Into<String>, check: F) -> Self
    where
        F: Fn(&EntitySnapshot, &str, &Value, &ValidationContext) -> Result<bool, RuleFailure>
            + Send
            + Sync
            + 'static,
    {
        self.register(name, FnRule(check));
        self
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn CustomRule>> {
        self.rules.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.rules.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.rules.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl core::fmt::Debug for CustomRuleRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CustomRuleRegistry")
            .field("rules", &self.names())
            .finish()
    }
}
