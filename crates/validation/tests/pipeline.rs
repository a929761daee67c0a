use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use erpguard_auth::{ActorContext, AuthorizationEngine, Permission, PermissionCatalog, Role};
use erpguard_core::{RecordId, TenantId, UserId};
use erpguard_validation::{
    BusinessRule, BusinessRuleEngine, CustomRuleRegistry, EntitySchema, EntitySnapshot, FieldKind,
    FieldSpec, InMemoryRecordStore, IssueKind, Operation, PipelineConfig, PipelineError,
    RangeBound, RangeCondition, RecordQuery, RuleEngineError, RuleKind, RuleSet, Severity, Stage,
    StoreError, TenantQueryExecutor, ValidationContext, ValidationPipeline, ValidationRequest,
    ValidationResult,
};
use serde::Deserialize;
use serde_json::{Value, json};

struct Harness {
    authz: Arc<AuthorizationEngine>,
    store: Arc<InMemoryRecordStore>,
    pipeline: ValidationPipeline,
}

impl Harness {
    fn new(rules: Vec<BusinessRule>) -> Self {
        Self::with_config(rules, PipelineConfig::default())
    }

    fn with_config(rules: Vec<BusinessRule>, config: PipelineConfig) -> Self {
        let store = Arc::new(InMemoryRecordStore::new());
        Self::build(rules, config, store.clone(), store)
    }

    fn build(
        rules: Vec<BusinessRule>,
        config: PipelineConfig,
        store: Arc<InMemoryRecordStore>,
        executor: Arc<dyn TenantQueryExecutor>,
    ) -> Self {
        let catalog = Arc::new(PermissionCatalog::embedded().unwrap());
        let authz = Arc::new(AuthorizationEngine::new(catalog.clone()));
        let registry = Arc::new(registry());
        let rules = RuleSet::new(rules, &catalog, &registry).unwrap();
        let engine = BusinessRuleEngine::new(authz.clone(), executor, registry);
        let pipeline = ValidationPipeline::new(Arc::new(rules), engine, config);
        Self {
            authz,
            store,
            pipeline,
        }
    }

    fn actor(&self, tenant: TenantId, roles: &[&'static str]) -> ActorContext {
        self.authz
            .resolve_actor(UserId::new(), tenant, roles.iter().map(|r| Role::new(*r)).collect())
            .unwrap()
    }

    fn seed_user(&self, tenant: TenantId, email: &str) -> RecordId {
        let id = RecordId::new();
        self.store
            .insert(tenant, "User", object(json!({"id": id.to_string(), "email": email})))
            .unwrap();
        id
    }

    async fn validate(
        &self,
        operation: Operation,
        input: Value,
        context: ValidationContext,
        actor: &ActorContext,
    ) -> ValidationResult<EntitySnapshot> {
        let schema = user_schema();
        self.pipeline
            .validate(ValidationRequest {
                schema: &schema,
                operation,
                input,
                context,
                actor,
            })
            .await
            .unwrap()
    }
}

fn registry() -> CustomRuleRegistry {
    CustomRuleRegistry::new().with("corporateDomain", |entity, field, params, _| {
        let domain = params["domain"].as_str().unwrap_or_default();
        Ok(entity
            .get(field)
            .and_then(Value::as_str)
            .is_none_or(|email| email.ends_with(domain)))
    })
}

fn object(value: Value) -> EntitySnapshot {
    value.as_object().cloned().unwrap()
}

fn user_schema() -> EntitySchema {
    EntitySchema::new("User")
        .field(FieldSpec::new("email", FieldKind::Email).required().max_length(254))
        .field(FieldSpec::new("displayName", FieldKind::String).max_length(80))
        .field(FieldSpec::new("managerId", FieldKind::Uuid).nullable().references("User"))
        .field(FieldSpec::new("hourlyRate", FieldKind::Number))
}

fn unique_email() -> BusinessRule {
    BusinessRule::new(
        "user-email-unique",
        "User",
        "email",
        RuleKind::UniqueConstraint {
            table: "User".to_string(),
        },
        "DUPLICATE_EMAIL",
        "Email is already in use",
    )
}

fn display_name_required() -> BusinessRule {
    BusinessRule::new(
        "user-display-name",
        "User",
        "displayName",
        RuleKind::RequiredField,
        "DISPLAY_NAME_REQUIRED",
        "Display name is required",
    )
}

fn rate_in_range() -> BusinessRule {
    BusinessRule::new(
        "user-rate",
        "User",
        "hourlyRate",
        RuleKind::RangeConstraint(RangeCondition {
            min: Some(RangeBound::Number(10.0)),
            max: Some(RangeBound::Number(200.0)),
            ..Default::default()
        }),
        "RATE_OUT_OF_RANGE",
        "Hourly rate must be between 10 and 200",
    )
}

fn codes<T>(result: &ValidationResult<T>) -> Vec<&str> {
    result.issues().iter().map(|i| i.code.as_str()).collect()
}

#[tokio::test]
async fn schema_failure_short_circuits_later_stages() {
    let harness = Harness::new(vec![display_name_required(), rate_in_range(), unique_email()]);
    let tenant = TenantId::new();
    harness.seed_user(tenant, "a@b.com");
    let viewer = harness.actor(tenant, &["VIEWER"]);

    let result = harness
        .validate(
            Operation::Create,
            json!({"email": "a@b.com", "hourlyRate": "lots"}),
            ValidationContext::for_actor(&viewer, "User"),
            &viewer,
        )
        .await;

    assert!(!result.is_success());
    assert_eq!(codes(&result), vec!["INVALID_TYPE"]);
    assert!(result.issues().iter().all(|i| i.stage == Stage::Syntactic));
}

#[tokio::test]
async fn independent_rule_failures_are_all_reported() {
    let harness = Harness::new(vec![display_name_required(), rate_in_range()]);
    let tenant = TenantId::new();
    let admin = harness.actor(tenant, &["ADMIN"]);

    let result = harness
        .validate(
            Operation::Create,
            json!({"email": "a@b.com", "hourlyRate": 5}),
            ValidationContext::for_actor(&admin, "User"),
            &admin,
        )
        .await;

    assert!(!result.is_success());
    assert_eq!(codes(&result), vec!["DISPLAY_NAME_REQUIRED", "RATE_OUT_OF_RANGE"]);
    let rate = result.issues_for("hourlyRate").next().unwrap();
    assert_eq!(rate.kind, IssueKind::ValueOutOfRange);
    assert_eq!(rate.value, Some(json!(5)));
}

#[tokio::test]
async fn duplicate_email_in_same_tenant_fails() {
    let harness = Harness::new(vec![unique_email()]);
    let tenant = TenantId::new();
    harness.seed_user(tenant, "a@b.com");
    let admin = harness.actor(tenant, &["ADMIN"]);

    let result = harness
        .validate(
            Operation::Create,
            json!({"email": "a@b.com"}),
            ValidationContext::for_actor(&admin, "User"),
            &admin,
        )
        .await;

    assert!(!result.is_success());
    assert_eq!(codes(&result), vec!["DUPLICATE_EMAIL"]);
    assert_eq!(result.issues()[0].kind, IssueKind::DuplicateValue);
    assert_eq!(result.issues()[0].field, "email");

    let body = serde_json::to_value(&result).unwrap();
    assert_eq!(body["success"], json!(false));
    assert_eq!(body["errors"][0]["code"], json!("DUPLICATE_EMAIL"));
}

#[tokio::test]
async fn duplicate_email_in_another_tenant_is_invisible() {
    let harness = Harness::new(vec![unique_email()]);
    let (tenant, other) = (TenantId::new(), TenantId::new());
    harness.seed_user(other, "a@b.com");
    let admin = harness.actor(tenant, &["ADMIN"]);

    let result = harness
        .validate(
            Operation::Create,
            json!({"email": "a@b.com"}),
            ValidationContext::for_actor(&admin, "User"),
            &admin,
        )
        .await;

    assert!(result.is_success());
    assert_eq!(result.data().unwrap()["email"], json!("a@b.com"));
}

#[tokio::test]
async fn updating_a_record_does_not_conflict_with_itself() {
    let harness = Harness::new(vec![unique_email()]);
    let tenant = TenantId::new();
    let id = harness.seed_user(tenant, "a@b.com");
    let admin = harness.actor(tenant, &["ADMIN"]);

    let result = harness
        .validate(
            Operation::Update,
            json!({"email": "a@b.com", "displayName": "Ada"}),
            ValidationContext::for_actor(&admin, "User").with_entity_id(id),
            &admin,
        )
        .await;
    assert!(result.is_success(), "{:?}", result.issues());
}

#[tokio::test]
async fn missing_operation_permission_is_reported_with_other_issues() {
    let harness = Harness::new(vec![display_name_required()]);
    let tenant = TenantId::new();
    let viewer = harness.actor(tenant, &["VIEWER"]);

    let result = harness
        .validate(
            Operation::Create,
            json!({"email": "a@b.com"}),
            ValidationContext::for_actor(&viewer, "User"),
            &viewer,
        )
        .await;

    assert_eq!(codes(&result), vec!["DISPLAY_NAME_REQUIRED", "PERMISSION_DENIED"]);
    let denied = &result.issues()[1];
    assert_eq!(denied.kind, IssueKind::PermissionDenied);
    assert_eq!(denied.stage, Stage::Security);
    assert!(denied.message.contains("User.create"));
}

fn activation_requires_visible_user() -> BusinessRule {
    BusinessRule::new(
        "user-activation",
        "User",
        "id",
        RuleKind::PermissionConstraint {
            required_permission: Permission::parse("User.activate").unwrap(),
            resource_type: "User".to_string(),
        },
        "ACTIVATION_DENIED",
        "Only visible users can be activated",
    )
}

#[tokio::test]
async fn permission_rules_join_semantic_issues_without_stopping() {
    let harness = Harness::new(vec![display_name_required(), activation_requires_visible_user()]);
    let tenant = TenantId::new();
    let admin = harness.actor(tenant, &["ADMIN"]);
    let missing = RecordId::new();

    let by_payload = harness
        .validate(
            Operation::Update,
            json!({"id": missing.to_string(), "email": "a@b.com"}),
            ValidationContext::for_actor(&admin, "User"),
            &admin,
        )
        .await;
    assert_eq!(codes(&by_payload), vec!["DISPLAY_NAME_REQUIRED", "ACTIVATION_DENIED"]);
    let denied = &by_payload.issues()[1];
    assert_eq!(denied.stage, Stage::Security);
    assert_eq!(denied.kind, IssueKind::PermissionDenied);

    let by_context = harness
        .validate(
            Operation::Update,
            json!({"email": "a@b.com"}),
            ValidationContext::for_actor(&admin, "User").with_entity_id(missing),
            &admin,
        )
        .await;
    assert_eq!(codes(&by_context), codes(&by_payload));

    let existing = harness.seed_user(tenant, "a@b.com");
    let visible = harness
        .validate(
            Operation::Update,
            json!({"id": existing.to_string(), "email": "a@b.com", "displayName": "Ada"}),
            ValidationContext::for_actor(&admin, "User"),
            &admin,
        )
        .await;
    assert!(visible.is_success(), "{:?}", visible.issues());
}

#[tokio::test]
async fn issues_on_one_field_from_different_stages_are_all_kept() {
    let corporate = BusinessRule::new(
        "user-domain",
        "User",
        "email",
        RuleKind::CustomRule {
            predicate: "corporateDomain".to_string(),
            params: json!({"domain": "@acme.test"}),
        },
        "EXTERNAL_EMAIL",
        "Use a company address",
    );
    let harness = Harness::new(vec![corporate, unique_email()]);
    let tenant = TenantId::new();
    harness.seed_user(tenant, "a@b.com");
    let admin = harness.actor(tenant, &["ADMIN"]);

    let result = harness
        .validate(
            Operation::Create,
            json!({"email": "a@b.com"}),
            ValidationContext::for_actor(&admin, "User"),
            &admin,
        )
        .await;

    let on_email: Vec<(&str, Stage)> = result
        .issues_for("email")
        .map(|i| (i.code.as_str(), i.stage))
        .collect();
    assert_eq!(
        on_email,
        vec![("EXTERNAL_EMAIL", Stage::Semantic), ("DUPLICATE_EMAIL", Stage::Integrity)]
    );
}

#[tokio::test]
async fn context_for_another_entity_is_rejected() {
    let harness = Harness::new(vec![display_name_required(), unique_email()]);
    let tenant = TenantId::new();
    harness.seed_user(tenant, "a@b.com");
    let admin = harness.actor(tenant, &["ADMIN"]);

    let result = harness
        .validate(
            Operation::Create,
            json!({"email": "a@b.com"}),
            ValidationContext::for_actor(&admin, "Project"),
            &admin,
        )
        .await;

    assert_eq!(codes(&result), vec!["ENTITY_MISMATCH"]);
    assert_eq!(result.issues()[0].stage, Stage::Syntactic);
}

#[tokio::test]
async fn cross_tenant_context_is_denied_without_detail() {
    let harness = Harness::new(vec![unique_email()]);
    let (home, foreign) = (TenantId::new(), TenantId::new());
    harness.seed_user(foreign, "a@b.com");
    let admin = harness.actor(home, &["ADMIN"]);

    let result = harness
        .validate(
            Operation::Create,
            json!({"email": "a@b.com"}),
            ValidationContext::new("User").with_tenant(foreign),
            &admin,
        )
        .await;

    // The foreign tenant's duplicate is never consulted.
    assert_eq!(codes(&result), vec!["PERMISSION_DENIED"]);
    assert_eq!(result.issues()[0].message, "access denied");
}

#[tokio::test]
async fn warnings_do_not_fail_validation() {
    let soft = display_name_required().with_severity(Severity::Warning);
    let harness = Harness::new(vec![soft]);
    let admin = harness.actor(TenantId::new(), &["ADMIN"]);

    let result = harness
        .validate(
            Operation::Create,
            json!({"email": "a@b.com"}),
            ValidationContext::for_actor(&admin, "User"),
            &admin,
        )
        .await;

    assert!(result.is_success());
    assert_eq!(codes(&result), vec!["DISPLAY_NAME_REQUIRED"]);
    let body = serde_json::to_value(&result).unwrap();
    assert_eq!(body["warnings"][0]["severity"], json!("WARNING"));
}

#[tokio::test]
async fn references_must_resolve_within_the_tenant() {
    let harness = Harness::new(Vec::new());
    let (tenant, other) = (TenantId::new(), TenantId::new());
    let manager = harness.seed_user(tenant, "boss@b.com");
    let stranger = harness.seed_user(other, "elsewhere@b.com");
    let admin = harness.actor(tenant, &["ADMIN"]);
    let ctx = || ValidationContext::for_actor(&admin, "User");

    let ok = harness
        .validate(
            Operation::Create,
            json!({"email": "a@b.com", "managerId": manager.to_string()}),
            ctx(),
            &admin,
        )
        .await;
    assert!(ok.is_success());

    let dangling = harness
        .validate(
            Operation::Create,
            json!({"email": "a@b.com", "managerId": stranger.to_string()}),
            ctx(),
            &admin,
        )
        .await;
    assert_eq!(codes(&dangling), vec!["REFERENCE_NOT_FOUND"]);
    assert_eq!(dangling.issues()[0].kind, IssueKind::ReferenceNotFound);
}

#[tokio::test]
async fn deletes_only_check_permissions() {
    let harness = Harness::new(vec![display_name_required(), unique_email()]);
    let tenant = TenantId::new();
    let id = harness.seed_user(tenant, "a@b.com");
    let admin = harness.actor(tenant, &["ADMIN"]);
    let manager = harness.actor(tenant, &["PROJECT_MANAGER"]);

    let by_admin = harness
        .validate(
            Operation::Delete,
            json!({}),
            ValidationContext::for_actor(&admin, "User").with_entity_id(id),
            &admin,
        )
        .await;
    assert!(by_admin.is_success(), "{:?}", by_admin.issues());

    let by_manager = harness
        .validate(
            Operation::Delete,
            json!({}),
            ValidationContext::for_actor(&manager, "User").with_entity_id(id),
            &manager,
        )
        .await;
    assert_eq!(codes(&by_manager), vec!["PERMISSION_DENIED"]);
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewUser {
    email: String,
    display_name: String,
}

#[tokio::test]
async fn deserializes_into_the_callers_type() {
    let harness = Harness::new(Vec::new());
    let admin = harness.actor(TenantId::new(), &["ADMIN"]);
    let schema = user_schema();
    let request = |input| ValidationRequest {
        schema: &schema,
        operation: Operation::Create,
        input,
        context: ValidationContext::for_actor(&admin, "User"),
        actor: &admin,
    };

    let typed: ValidationResult<NewUser> = harness
        .pipeline
        .validate(request(json!({"email": "a@b.com", "displayName": "Ada"})))
        .await
        .unwrap();
    let user = typed.into_data().unwrap();
    assert_eq!((user.email.as_str(), user.display_name.as_str()), ("a@b.com", "Ada"));

    let untyped: ValidationResult<NewUser> = harness
        .pipeline
        .validate(request(json!({"email": "a@b.com"})))
        .await
        .unwrap();
    assert_eq!(codes(&untyped), vec!["DESERIALIZATION_FAILED"]);
}

#[tokio::test]
async fn custom_rules_receive_their_params() {
    let corporate = BusinessRule::new(
        "user-domain",
        "User",
        "email",
        RuleKind::CustomRule {
            predicate: "corporateDomain".to_string(),
            params: json!({"domain": "@acme.test"}),
        },
        "EXTERNAL_EMAIL",
        "Use a company address",
    );
    let harness = Harness::new(vec![corporate]);
    let admin = harness.actor(TenantId::new(), &["ADMIN"]);

    let result = harness
        .validate(
            Operation::Create,
            json!({"email": "a@b.com"}),
            ValidationContext::for_actor(&admin, "User"),
            &admin,
        )
        .await;
    assert_eq!(codes(&result), vec!["EXTERNAL_EMAIL"]);
    assert_eq!(result.issues()[0].kind, IssueKind::RuleViolated);
}

#[tokio::test]
async fn unregistered_predicate_is_a_configuration_error() {
    let catalog = Arc::new(PermissionCatalog::embedded().unwrap());
    let authz = Arc::new(AuthorizationEngine::new(catalog.clone()));
    let rules = RuleSet::new(
        vec![BusinessRule::new(
            "user-domain",
            "User",
            "email",
            RuleKind::CustomRule {
                predicate: "corporateDomain".to_string(),
                params: Value::Null,
            },
            "EXTERNAL_EMAIL",
            "Use a company address",
        )],
        &catalog,
        &registry(),
    )
    .unwrap();
    // Engine wired with a registry that lacks the predicate the rules were loaded against.
    let engine = BusinessRuleEngine::new(
        authz.clone(),
        Arc::new(InMemoryRecordStore::new()),
        Arc::new(CustomRuleRegistry::new()),
    );
    let pipeline = ValidationPipeline::new(Arc::new(rules), engine, PipelineConfig::default());
    let admin = authz
        .resolve_actor(UserId::new(), TenantId::new(), vec![Role::new("ADMIN")])
        .unwrap();

    let schema = user_schema();
    let err = pipeline
        .validate::<EntitySnapshot>(ValidationRequest {
            schema: &schema,
            operation: Operation::Create,
            input: json!({"email": "a@b.com"}),
            context: ValidationContext::for_actor(&admin, "User"),
            actor: &admin,
        })
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Rule(RuleEngineError::Configuration(_))
    ));
}

/// Answers slower for earlier-declared fields, so concurrent checks finish
/// in reverse order.
struct ReversingStore {
    inner: Arc<InMemoryRecordStore>,
}

#[async_trait]
impl TenantQueryExecutor for ReversingStore {
    async fn with_tenant_rls(&self, tenant_id: TenantId, query: &RecordQuery) -> Result<u64, StoreError> {
        let delay = match query.filters.first().map(|f| f.field.as_str()) {
            Some("email") => 40,
            Some("displayName") => 20,
            _ => 1,
        };
        tokio::time::sleep(Duration::from_millis(delay)).await;
        self.inner.with_tenant_rls(tenant_id, query).await
    }
}

#[tokio::test]
async fn concurrent_integrity_checks_report_in_declaration_order() {
    let unique_name = BusinessRule::new(
        "user-name-unique",
        "User",
        "displayName",
        RuleKind::UniqueConstraint {
            table: "User".to_string(),
        },
        "DUPLICATE_NAME",
        "Display name is taken",
    );
    let store = Arc::new(InMemoryRecordStore::new());
    let executor = Arc::new(ReversingStore {
        inner: store.clone(),
    });
    let harness = Harness::build(
        vec![unique_email(), unique_name],
        PipelineConfig {
            integrity_concurrency: 4,
        },
        store,
        executor,
    );
    let tenant = TenantId::new();
    harness
        .store
        .insert(
            tenant,
            "User",
            object(json!({"id": RecordId::new().to_string(), "email": "a@b.com", "displayName": "Ada"})),
        )
        .unwrap();
    let admin = harness.actor(tenant, &["ADMIN"]);

    let result = harness
        .validate(
            Operation::Create,
            json!({"email": "a@b.com", "displayName": "Ada", "managerId": RecordId::new().to_string()}),
            ValidationContext::for_actor(&admin, "User"),
            &admin,
        )
        .await;

    assert_eq!(
        codes(&result),
        vec!["DUPLICATE_EMAIL", "DUPLICATE_NAME", "REFERENCE_NOT_FOUND"]
    );
}

#[test]
fn sequential_is_the_default() {
    assert_eq!(PipelineConfig::default().integrity_concurrency, 1);
}
