//! Four-stage validation: syntactic, semantic, security, integrity.

use std::sync::Arc;

use futures::stream::{self, StreamExt, TryStreamExt};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use erpguard_auth::{ActorContext, CatalogError, Permission};
use erpguard_core::TenantId;

use crate::context::{Operation, ValidationContext};
use crate::engine::{BusinessRuleEngine, RuleEngineError};
use crate::entity::{EntitySnapshot, field_value};
use crate::issue::{ENTITY_FIELD, Issue, IssueKind, Stage, ValidationResult};
use crate::rules::{BusinessRule, RuleSet};
use crate::schema::EntitySchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Integrity checks in flight at once. `1` runs them sequentially.
    pub integrity_concurrency: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            integrity_concurrency: 1,
        }
    }
}

/// Failures that are not validation outcomes: broken configuration or an
/// unreachable store.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error(transparent)]
    Rule(#[from] RuleEngineError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

/// One operation to validate.
#[derive(Debug, Clone)]
pub struct ValidationRequest<'a> {
    pub schema: &'a EntitySchema,
    pub operation: Operation,
    pub input: Value,
    pub context: ValidationContext,
    pub actor: &'a ActorContext,
}

enum IntegrityCheck<'a> {
    Rule(&'a BusinessRule),
    Reference {
        field: &'a str,
        table: &'a str,
        value: &'a Value,
    },
}

#[derive(Debug, Clone)]
pub struct ValidationPipeline {
    rules: Arc<RuleSet>,
    engine: BusinessRuleEngine,
    config: PipelineConfig,
}

impl ValidationPipeline {
    pub fn new(rules: Arc<RuleSet>, engine: BusinessRuleEngine, config: PipelineConfig) -> Self {
        Self {
            rules,
            engine,
            config,
        }
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn engine(&self) -> &BusinessRuleEngine {
        &self.engine
    }

    pub fn config(&self) -> PipelineConfig {
        self.config
    }

    /// Validate `request.input` and deserialize it into `T`.
    ///
    /// A syntactic failure returns its issues alone. Otherwise every later
    /// stage runs and all issues are aggregated in stage order.
    #[tracing::instrument(
        skip_all,
        fields(
            entity = %request.schema.entity,
            operation = %request.operation,
            correlation_id = %request.context.correlation_id(),
        )
    )]
    pub async fn validate<T: DeserializeOwned>(
        &self,
        request: ValidationRequest<'_>,
    ) -> Result<ValidationResult<T>, PipelineError> {
        let ValidationRequest {
            schema,
            operation,
            input,
            context,
            actor,
        } = request;

        if context.entity() != schema.entity {
            let issue = Issue::new(
                Stage::Syntactic,
                IssueKind::SchemaInvalid,
                ENTITY_FIELD,
                "ENTITY_MISMATCH",
                format!(
                    "context names entity '{}' but the schema validates '{}'",
                    context.entity(),
                    schema.entity
                ),
            );
            return Ok(ValidationResult::invalid(vec![issue]));
        }

        let tenant = context.tenant_id().unwrap_or(actor.tenant_id());
        let ctx = context.with_tenant(tenant);

        let entity = match schema.check(&input, operation, &ctx) {
            Ok(entity) => entity,
            Err(issues) => {
                tracing::debug!(issues = issues.len(), "rejected by schema");
                return Ok(ValidationResult::invalid(issues));
            }
        };
        let data: T = match serde_json::from_value(input) {
            Ok(data) => data,
            Err(err) => {
                let issue = Issue::new(
                    Stage::Syntactic,
                    IssueKind::SchemaInvalid,
                    ENTITY_FIELD,
                    "DESERIALIZATION_FAILED",
                    err.to_string(),
                );
                return Ok(ValidationResult::invalid(vec![issue]));
            }
        };

        // Deletes carry no new field values: only the security stage applies.
        let writes = operation != Operation::Delete;
        // Never query another tenant's records on the actor's behalf.
        let integrity_allowed = writes && actor.belongs_to(tenant);
        let rules: Vec<&BusinessRule> = self.rules.applicable(&schema.entity, Some(tenant)).collect();
        let mut issues = Vec::new();

        for rule in rules.iter().filter(|r| writes && r.stage() == Stage::Semantic) {
            if !self.engine.evaluate(rule, &entity, &ctx, Some(actor)).await? {
                issues.push(rule_issue(rule, &entity));
            }
        }

        issues.extend(self.operation_permission(schema, operation, actor, tenant)?);
        for rule in rules.iter().filter(|r| r.stage() == Stage::Security) {
            if !self.engine.evaluate(rule, &entity, &ctx, Some(actor)).await? {
                issues.push(rule_issue(rule, &entity));
            }
        }

        let checks = rules
            .iter()
            .filter(|r| integrity_allowed && r.stage() == Stage::Integrity)
            .map(|rule| IntegrityCheck::Rule(*rule))
            .chain(schema.fields.iter().filter(|_| integrity_allowed).filter_map(|declared| {
                let table = declared.references.as_deref()?;
                let value = entity.get(&declared.name).filter(|v| !v.is_null())?;
                Some(IntegrityCheck::Reference {
                    field: &declared.name,
                    table,
                    value,
                })
            }));
        let integrity: Vec<Option<Issue>> = stream::iter(checks)
            .map(|check| self.run_integrity(check, &entity, &ctx, actor, tenant))
            .buffered(self.config.integrity_concurrency.max(1))
            .try_collect()
            .await?;
        issues.extend(integrity.into_iter().flatten());

        let result = ValidationResult::from_issues(data, issues);
        tracing::debug!(
            tenant_id = %tenant,
            success = result.is_success(),
            issues = result.issues().len(),
            "validation finished"
        );
        Ok(result)
    }

    fn operation_permission(
        &self,
        schema: &EntitySchema,
        operation: Operation,
        actor: &ActorContext,
        tenant: TenantId,
    ) -> Result<Option<Issue>, CatalogError> {
        let authz = self.engine.authz();
        let required = Permission::new(schema.resource.clone(), operation.action());
        authz.catalog().ensure_permission(&required)?;

        Ok(authz.authorize(actor, tenant, &required).err().map(|denied| {
            Issue::new(
                Stage::Security,
                IssueKind::PermissionDenied,
                ENTITY_FIELD,
                "PERMISSION_DENIED",
                denied.to_string(),
            )
        }))
    }

    async fn run_integrity(
        &self,
        check: IntegrityCheck<'_>,
        entity: &EntitySnapshot,
        ctx: &ValidationContext,
        actor: &ActorContext,
        tenant: TenantId,
    ) -> Result<Option<Issue>, RuleEngineError> {
        match check {
            IntegrityCheck::Rule(rule) => {
                let satisfied = self.engine.evaluate(rule, entity, ctx, Some(actor)).await?;
                Ok((!satisfied).then(|| rule_issue(rule, entity)))
            }
            IntegrityCheck::Reference {
                field,
                table,
                value,
            } => {
                let exists = self.engine.reference_exists(tenant, table, value).await?;
                Ok((!exists).then(|| {
                    Issue::new(
                        Stage::Integrity,
                        IssueKind::ReferenceNotFound,
                        field,
                        "REFERENCE_NOT_FOUND",
                        format!("{field} does not reference an existing {table}"),
                    )
                    .with_value(Some(value.clone()))
                }))
            }
        }
    }
}

fn rule_issue(rule: &BusinessRule, entity: &EntitySnapshot) -> Issue {
    Issue::new(
        rule.stage(),
        rule.kind.issue_kind(),
        rule.field.as_str(),
        rule.error_code.as_str(),
        rule.error_message.as_str(),
    )
    .with_value(field_value(entity, &rule.field).cloned())
    .with_severity(rule.severity)
}
