use std::path::Path;

use anyhow::{Context, bail};
use serde_json::{Value, json};

use erpguard_auth::{AuthorizationEngine, Permission, PermissionCatalog, Role};
use erpguard_core::{RecordId, TenantId, UserId};
use erpguard_infra::{Core, load_rules};
use erpguard_validation::{
    CustomRuleRegistry, EntitySchema, EntitySnapshot, Operation, RuleFailure, ValidationContext,
    ValidationRequest, ValidationResult,
};

fn roles_from(names: &[String]) -> Vec<Role> {
    names.iter().map(|n| Role::new(n.trim().to_string())).collect()
}

fn read_json(path: &Path) -> anyhow::Result<Value> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
}

/// Registry whose predicates exist by name only: the real ones live in the
/// host application, so here they always fail (and evaluate as unsatisfied).
pub fn placeholder_registry(names: &[String]) -> CustomRuleRegistry {
    names.iter().fold(CustomRuleRegistry::new(), |registry, name| {
        let label = name.clone();
        registry.with(name.clone(), move |_, _, _, _| {
            Err(RuleFailure::new(format!("predicate '{label}' is only available in the host application")))
        })
    })
}

pub fn catalog(catalog: &PermissionCatalog) -> Value {
    let roles: Vec<Value> = catalog
        .roles()
        .map(|def| {
            json!({
                "role": def.role,
                "level": def.level,
                "scope": def.scope,
                "classification": def.classification,
                "permissions": def.permissions.len(),
            })
        })
        .collect();
    json!({
        "version": catalog.version(),
        "resources": catalog.resources().collect::<Vec<_>>(),
        "roles": roles,
    })
}

pub fn roles(authz: &AuthorizationEngine, names: &[String]) -> Value {
    let roles = roles_from(names);
    let hierarchy = authz.hierarchy();
    json!({
        "combination": hierarchy.validate_combination(&roles),
        "optimization": hierarchy.optimize(&roles),
        "assignable": hierarchy.assignable_roles(&roles),
    })
}

pub fn explain(
    authz: &AuthorizationEngine,
    permission: &str,
    names: &[String],
    foreign_tenant: bool,
) -> anyhow::Result<Value> {
    let required = Permission::parse(permission)?;
    let actor = authz.resolve_actor(UserId::new(), TenantId::new(), roles_from(names))?;
    let resource_tenant = if foreign_tenant {
        TenantId::new()
    } else {
        actor.tenant_id()
    };
    Ok(serde_json::to_value(authz.explain(&actor, resource_tenant, &required))?)
}

pub fn rules(
    catalog: &PermissionCatalog,
    path: Option<&Path>,
    predicates: &[String],
) -> anyhow::Result<Value> {
    let Some(path) = path else {
        bail!("no rule document given (use --rules or ERPGUARD_RULES_PATH)");
    };
    let rules = load_rules(Some(path), catalog, &placeholder_registry(predicates))?;
    let summary: Vec<Value> = rules
        .rules()
        .iter()
        .map(|r| {
            json!({
                "id": r.id,
                "entity": r.entity,
                "field": r.field,
                "type": r.kind.type_name(),
                "stage": r.stage(),
                "active": r.is_active,
            })
        })
        .collect();
    Ok(json!({ "rules": summary }))
}

pub struct ValidateArgs<'a> {
    pub schema: &'a Path,
    pub input: &'a Path,
    pub operation: Operation,
    pub roles: &'a [String],
    pub entity_id: Option<&'a str>,
}

pub async fn validate(core: &Core, args: ValidateArgs<'_>) -> anyhow::Result<Value> {
    let schema: EntitySchema = serde_json::from_value(read_json(args.schema)?)
        .with_context(|| format!("{} is not an entity schema", args.schema.display()))?;
    let input = read_json(args.input)?;

    let actor = core
        .authz
        .resolve_actor(UserId::new(), TenantId::new(), roles_from(args.roles))?;
    let mut context = ValidationContext::for_actor(&actor, schema.entity.clone());
    if let Some(id) = args.entity_id {
        context = context.with_entity_id(id.parse::<RecordId>()?);
    }

    let result: ValidationResult<EntitySnapshot> = core
        .pipeline
        .validate(ValidationRequest {
            schema: &schema,
            operation: args.operation,
            input,
            context,
            actor: &actor,
        })
        .await?;
    Ok(serde_json::to_value(&result)?)
}
