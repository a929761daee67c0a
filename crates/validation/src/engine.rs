use std::sync::Arc;

use serde_json::{Value, json};
use thiserror::Error;

use erpguard_auth::{ActorContext, AuthorizationEngine, AuthzError};
use erpguard_core::TenantId;

use crate::context::ValidationContext;
use crate::entity::{EntitySnapshot, ID_FIELD, field_value, is_blank, record_id};
use crate::registry::CustomRuleRegistry;
use crate::rules::{BusinessRule, RuleConfigError, RuleKind};
use crate::store::{RecordQuery, StoreError, TenantQueryExecutor};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RuleEngineError {
    #[error(transparent)]
    Configuration(#[from] RuleConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("rule '{0}' queries the record store but no tenant is in scope")]
    UnscopedQuery(String),
}

/// Evaluates single business rules against a candidate entity.
#[derive(Clone)]
pub struct BusinessRuleEngine {
    authz: Arc<AuthorizationEngine>,
    store: Arc<dyn TenantQueryExecutor>,
    registry: Arc<CustomRuleRegistry>,
}

impl BusinessRuleEngine {
    pub fn new(
        authz: Arc<AuthorizationEngine>,
        store: Arc<dyn TenantQueryExecutor>,
        registry: Arc<CustomRuleRegistry>,
    ) -> Self {
        Self {
            authz,
            store,
            registry,
        }
    }

    pub fn authz(&self) -> &Arc<AuthorizationEngine> {
        &self.authz
    }

    pub fn registry(&self) -> &Arc<CustomRuleRegistry> {
        &self.registry
    }

    /// `Ok(true)` when `entity` satisfies `rule`.
    ///
    /// Store queries run in the context tenant, falling back to the actor's.
    pub async fn evaluate(
        &self,
        rule: &BusinessRule,
        entity: &EntitySnapshot,
        ctx: &ValidationContext,
        actor: Option<&ActorContext>,
    ) -> Result<bool, RuleEngineError> {
        let satisfied = match &rule.kind {
            RuleKind::RequiredField => field_value(entity, &rule.field).is_some_and(|v| !is_blank(v)),
            RuleKind::RangeConstraint(condition) => match field_value(entity, &rule.field) {
                None | Some(Value::Null) => true,
                Some(value) => condition.admits(value),
            },
            RuleKind::UniqueConstraint { table } => {
                self.is_unique(rule, table, entity, ctx, actor).await?
            }
            RuleKind::PermissionConstraint {
                required_permission,
                resource_type,
            } => {
                let Some(actor) = actor else {
                    return Ok(false);
                };
                let tenant = ctx.tenant_id().unwrap_or(actor.tenant_id());
                match self.authz.authorize(actor, tenant, required_permission) {
                    Ok(()) => match ctx.entity_id().or_else(|| record_id(entity)) {
                        Some(id) => {
                            let query = RecordQuery::table(resource_type.as_str())
                                .where_eq(ID_FIELD, json!(id.to_string()));
                            self.store.with_tenant_rls(tenant, &query).await? > 0
                        }
                        None => true,
                    },
                    Err(AuthzError::UnknownPermission(permission)) => {
                        tracing::error!(rule_id = %rule.id, %permission, "permission rule references an undeclared permission");
                        return Err(RuleConfigError::UnknownPermission {
                            rule: rule.id.clone(),
                            permission,
                        }
                        .into());
                    }
                    Err(_) => false,
                }
            }
            RuleKind::CustomRule { predicate, params } => {
                let Some(custom) = self.registry.get(predicate) else {
                    tracing::error!(rule_id = %rule.id, %predicate, "custom rule predicate is not registered");
                    return Err(RuleConfigError::UnregisteredPredicate {
                        rule: rule.id.clone(),
                        predicate: predicate.clone(),
                    }
                    .into());
                };
                match custom.check(entity, &rule.field, params, ctx) {
                    Ok(satisfied) => satisfied,
                    Err(err) => {
                        tracing::warn!(
                            rule_id = %rule.id,
                            %predicate,
                            correlation_id = %ctx.correlation_id(),
                            error = %err,
                            "custom rule failed; treating as not satisfied"
                        );
                        false
                    }
                }
            }
        };

        tracing::debug!(
            rule_id = %rule.id,
            rule_type = rule.kind.type_name(),
            field = %rule.field,
            satisfied,
            "evaluated business rule"
        );
        Ok(satisfied)
    }

    /// Whether `table` holds a record with id `value`, visible to `tenant`.
    pub async fn reference_exists(
        &self,
        tenant: TenantId,
        table: &str,
        value: &Value,
    ) -> Result<bool, RuleEngineError> {
        let query = RecordQuery::table(table).where_eq(ID_FIELD, value.clone());
        Ok(self.store.with_tenant_rls(tenant, &query).await? > 0)
    }

    async fn is_unique(
        &self,
        rule: &BusinessRule,
        table: &str,
        entity: &EntitySnapshot,
        ctx: &ValidationContext,
        actor: Option<&ActorContext>,
    ) -> Result<bool, RuleEngineError> {
        let Some(value) = field_value(entity, &rule.field).filter(|v| !v.is_null()) else {
            return Ok(true);
        };
        let tenant = ctx
            .tenant_id()
            .or(actor.map(ActorContext::tenant_id))
            .ok_or_else(|| RuleEngineError::UnscopedQuery(rule.id.clone()))?;

        let mut query = RecordQuery::table(table).where_eq(rule.field.as_str(), value.clone());
        if let Some(own_id) = ctx.entity_id().or_else(|| record_id(entity)) {
            query = query.where_ne(ID_FIELD, json!(own_id.to_string()));
        }

        Ok(self.store.with_tenant_rls(tenant, &query).await? == 0)
    }
}

impl core::fmt::Debug for BusinessRuleEngine {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BusinessRuleEngine")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}
