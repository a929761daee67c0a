//! Administrator-authored business rules and their load-time validation.

use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use erpguard_auth::{Permission, PermissionCatalog};
use erpguard_core::{TenantId, ensure_identifier};

use crate::issue::{IssueKind, Severity, Stage};
use crate::registry::CustomRuleRegistry;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RuleConfigError {
    #[error("rule document is invalid: {0}")]
    Parse(String),

    #[error("rule '{0}' is declared more than once")]
    DuplicateRule(String),

    #[error("rule '{rule}' requires permission '{permission}', which no role grants")]
    UnknownPermission { rule: String, permission: String },

    #[error("rule '{rule}' uses unregistered predicate '{predicate}'")]
    UnregisteredPredicate { rule: String, predicate: String },

    #[error("rule '{rule}' is misconfigured: {reason}")]
    InvalidCondition { rule: String, reason: String },
}

impl RuleConfigError {
    /// Stable code surfaced to administrators editing rules.
    pub fn code(&self) -> &'static str {
        "RULE_CONFIGURATION_INVALID"
    }
}

/// Bound of a range rule: a number, or an ISO-8601 date / RFC 3339 datetime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RangeBound {
    Number(f64),
    Text(String),
}

impl RangeBound {
    fn as_number(&self) -> Option<f64> {
        match self {
            RangeBound::Number(n) => Some(*n),
            RangeBound::Text(_) => None,
        }
    }

    fn as_instant(&self) -> Option<DateTime<Utc>> {
        match self {
            RangeBound::Number(_) => None,
            RangeBound::Text(s) => parse_instant(s),
        }
    }
}

/// `YYYY-MM-DD` (midnight UTC) or RFC 3339.
pub fn parse_instant(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()?
        .and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc())
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RangeCondition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<RangeBound>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<RangeBound>,
    #[serde(default)]
    pub min_exclusive: bool,
    #[serde(default)]
    pub max_exclusive: bool,
}

impl RangeCondition {
    fn is_temporal(&self) -> bool {
        matches!(
            (&self.min, &self.max),
            (Some(RangeBound::Text(_)), _) | (_, Some(RangeBound::Text(_)))
        )
    }

    fn check(&self) -> Result<(), String> {
        if self.min.is_none() && self.max.is_none() {
            return Err("range needs at least one of min/max".to_string());
        }

        if self.is_temporal() {
            let min = self.min.as_ref().map(|b| b.as_instant().ok_or(b));
            let max = self.max.as_ref().map(|b| b.as_instant().ok_or(b));
            match (min, max) {
                (Some(Err(bad)), _) | (_, Some(Err(bad))) => {
                    Err(format!("range bound {bad:?} is not a date or a number matching the other bound"))
                }
                (Some(Ok(lo)), Some(Ok(hi))) => self.check_order(lo, hi),
                _ => Ok(()),
            }
        } else {
            match (
                self.min.as_ref().and_then(RangeBound::as_number),
                self.max.as_ref().and_then(RangeBound::as_number),
            ) {
                (Some(lo), Some(hi)) => self.check_order(lo, hi),
                _ => Ok(()),
            }
        }
    }

    fn check_order<T: PartialOrd>(&self, lo: T, hi: T) -> Result<(), String> {
        let empty = if self.min_exclusive || self.max_exclusive {
            lo >= hi
        } else {
            lo > hi
        };
        if empty {
            Err("range admits no value (min is not below max)".to_string())
        } else {
            Ok(())
        }
    }

    /// Whether a present, non-null `value` lies in the range. Values of the
    /// wrong type are outside every range.
    pub fn admits(&self, value: &Value) -> bool {
        if self.is_temporal() {
            let Some(at) = value.as_str().and_then(parse_instant) else {
                return false;
            };
            self.within(
                at,
                self.min.as_ref().and_then(RangeBound::as_instant),
                self.max.as_ref().and_then(RangeBound::as_instant),
            )
        } else {
            let Some(n) = value.as_f64() else {
                return false;
            };
            self.within(
                n,
                self.min.as_ref().and_then(RangeBound::as_number),
                self.max.as_ref().and_then(RangeBound::as_number),
            )
        }
    }

    fn within<T: PartialOrd>(&self, value: T, min: Option<T>, max: Option<T>) -> bool {
        let above = min.is_none_or(|lo| {
            if self.min_exclusive { value > lo } else { value >= lo }
        });
        let below = max.is_none_or(|hi| {
            if self.max_exclusive { value < hi } else { value <= hi }
        });
        above && below
    }
}

/// Type tag plus type-specific payload of a rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleKind {
    RequiredField,
    UniqueConstraint {
        table: String,
    },
    RangeConstraint(RangeCondition),
    #[serde(rename_all = "camelCase")]
    PermissionConstraint {
        required_permission: Permission,
        resource_type: String,
    },
    CustomRule {
        predicate: String,
        #[serde(default)]
        params: Value,
    },
}

impl RuleKind {
    pub fn stage(&self) -> Stage {
        match self {
            RuleKind::RequiredField | RuleKind::RangeConstraint(_) | RuleKind::CustomRule { .. } => {
                Stage::Semantic
            }
            RuleKind::PermissionConstraint { .. } => Stage::Security,
            RuleKind::UniqueConstraint { .. } => Stage::Integrity,
        }
    }

    pub fn issue_kind(&self) -> IssueKind {
        match self {
            RuleKind::RequiredField => IssueKind::FieldRequired,
            RuleKind::UniqueConstraint { .. } => IssueKind::DuplicateValue,
            RuleKind::RangeConstraint(_) => IssueKind::ValueOutOfRange,
            RuleKind::PermissionConstraint { .. } => IssueKind::PermissionDenied,
            RuleKind::CustomRule { .. } => IssueKind::RuleViolated,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            RuleKind::RequiredField => "REQUIRED_FIELD",
            RuleKind::UniqueConstraint { .. } => "UNIQUE_CONSTRAINT",
            RuleKind::RangeConstraint(_) => "RANGE_CONSTRAINT",
            RuleKind::PermissionConstraint { .. } => "PERMISSION_CONSTRAINT",
            RuleKind::CustomRule { .. } => "CUSTOM_RULE",
        }
    }
}

fn active() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusinessRule {
    pub id: String,
    pub entity: String,
    pub field: String,
    #[serde(flatten)]
    pub kind: RuleKind,
    pub error_code: String,
    pub error_message: String,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default = "active")]
    pub is_active: bool,
    /// `None`: applies to every tenant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<TenantId>,
}

impl BusinessRule {
    pub fn new(
        id: impl Into<String>,
        entity: impl Into<String>,
        field: impl Into<String>,
        kind: RuleKind,
        error_code: impl Into<String>,
        error_message: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            entity: entity.into(),
            field: field.into(),
            kind,
            error_code: error_code.into(),
            error_message: error_message.into(),
            severity: Severity::Error,
            is_active: true,
            tenant_id: None,
        }
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn for_tenant(mut self, tenant_id: TenantId) -> Self {
        self.tenant_id = Some(tenant_id);
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }

    pub fn stage(&self) -> Stage {
        self.kind.stage()
    }

    /// Active, for `entity`, and either global or owned by `tenant`.
    pub fn applies_to(&self, entity: &str, tenant: Option<TenantId>) -> bool {
        self.is_active
            && self.entity == entity
            && self.tenant_id.is_none_or(|owner| Some(owner) == tenant)
    }

    fn check(
        &self,
        catalog: &PermissionCatalog,
        registry: &CustomRuleRegistry,
    ) -> Result<(), RuleConfigError> {
        let invalid = |reason: String| RuleConfigError::InvalidCondition {
            rule: self.id.clone(),
            reason,
        };

        if self.field.trim().is_empty() {
            return Err(invalid("field must not be empty".to_string()));
        }
        if self.error_code.trim().is_empty() {
            return Err(invalid("errorCode must not be empty".to_string()));
        }

        match &self.kind {
            RuleKind::RequiredField => Ok(()),
            RuleKind::UniqueConstraint { table } => {
                ensure_identifier(table).map_err(|e| invalid(format!("table: {e}")))
            }
            RuleKind::RangeConstraint(condition) => condition.check().map_err(invalid),
            RuleKind::PermissionConstraint {
                required_permission,
                resource_type,
            } => {
                if !catalog.contains_permission(required_permission) {
                    return Err(RuleConfigError::UnknownPermission {
                        rule: self.id.clone(),
                        permission: required_permission.to_string(),
                    });
                }
                ensure_identifier(resource_type).map_err(|e| invalid(format!("resourceType: {e}")))
            }
            RuleKind::CustomRule { predicate, .. } => {
                if registry.contains(predicate) {
                    Ok(())
                } else {
                    Err(RuleConfigError::UnregisteredPredicate {
                        rule: self.id.clone(),
                        predicate: predicate.clone(),
                    })
                }
            }
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RuleDocument {
    rules: Vec<BusinessRule>,
}

/// Validated, immutable set of business rules in declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleSet {
    rules: Vec<BusinessRule>,
}

impl RuleSet {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Validate every rule against the catalog and predicate registry.
    pub fn new(
        rules: Vec<BusinessRule>,
        catalog: &PermissionCatalog,
        registry: &CustomRuleRegistry,
    ) -> Result<Self, RuleConfigError> {
        let mut seen = HashSet::new();
        for rule in &rules {
            if !seen.insert(rule.id.as_str()) {
                return Err(RuleConfigError::DuplicateRule(rule.id.clone()));
            }
            if let Err(err) = rule.check(catalog, registry) {
                tracing::error!(rule_id = %rule.id, code = err.code(), error = %err, "rejecting rule set");
                return Err(err);
            }
        }

        Ok(Self { rules })
    }

    /// Parse a `{ "rules": [...] }` document.
    pub fn from_json(
        json: &str,
        catalog: &PermissionCatalog,
        registry: &CustomRuleRegistry,
    ) -> Result<Self, RuleConfigError> {
        let doc: RuleDocument =
            serde_json::from_str(json).map_err(|e| RuleConfigError::Parse(e.to_string()))?;
        Self::new(doc.rules, catalog, registry)
    }

    pub fn rules(&self) -> &[BusinessRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&BusinessRule> {
        self.rules.iter().find(|r| r.id == id)
    }

    /// Rules to evaluate for `entity` in `tenant`, in declaration order.
    pub fn applicable<'a>(
        &'a self,
        entity: &'a str,
        tenant: Option<TenantId>,
    ) -> impl Iterator<Item = &'a BusinessRule> + 'a {
        self.rules.iter().filter(move |r| r.applies_to(entity, tenant))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn catalog() -> PermissionCatalog {
        PermissionCatalog::embedded().unwrap()
    }

    fn registry() -> CustomRuleRegistry {
        CustomRuleRegistry::new().with("workingDay", |_, _, _, _| Ok(true))
    }

    const DOCUMENT: &str = r#"{
        "rules": [
            {"id": "user-email-required", "entity": "User", "field": "email",
             "type": "REQUIRED_FIELD", "errorCode": "EMAIL_REQUIRED",
             "errorMessage": "Email is required"},
            {"id": "user-email-unique", "entity": "User", "field": "email",
             "type": "UNIQUE_CONSTRAINT", "table": "User",
             "errorCode": "DUPLICATE_EMAIL", "errorMessage": "Email already in use"},
            {"id": "timesheet-hours", "entity": "Timesheet", "field": "hours",
             "type": "RANGE_CONSTRAINT", "min": 0, "max": 24, "minExclusive": true,
             "errorCode": "HOURS_OUT_OF_RANGE", "errorMessage": "Hours must be in (0, 24]"},
            {"id": "invoice-approve", "entity": "Invoice", "field": "status",
             "type": "PERMISSION_CONSTRAINT", "requiredPermission": "Invoice.approve",
             "resourceType": "Invoice", "errorCode": "APPROVAL_REQUIRED",
             "errorMessage": "Only approvers may set status", "severity": "WARNING"},
            {"id": "timesheet-day", "entity": "Timesheet", "field": "workedOn",
             "type": "CUSTOM_RULE", "predicate": "workingDay", "params": {"allowWeekend": false},
             "errorCode": "NOT_A_WORKING_DAY", "errorMessage": "Not a working day",
             "isActive": false}
        ]
    }"#;

    #[test]
    fn parses_every_rule_type() {
        let set = RuleSet::from_json(DOCUMENT, &catalog(), &registry()).unwrap();
        assert_eq!(set.len(), 5);

        let range = set.get("timesheet-hours").unwrap();
        assert_eq!(
            range.kind,
            RuleKind::RangeConstraint(RangeCondition {
                min: Some(RangeBound::Number(0.0)),
                max: Some(RangeBound::Number(24.0)),
                min_exclusive: true,
                max_exclusive: false,
            })
        );
        assert_eq!(range.stage(), Stage::Semantic);

        let approve = set.get("invoice-approve").unwrap();
        assert_eq!(approve.severity, Severity::Warning);
        assert_eq!(approve.kind.issue_kind(), IssueKind::PermissionDenied);

        assert!(!set.get("timesheet-day").unwrap().is_active);
    }

    #[test]
    fn filters_by_entity_activity_and_tenant() {
        let tenant = TenantId::new();
        let rules = vec![
            BusinessRule::new("a", "User", "email", RuleKind::RequiredField, "A", "a"),
            BusinessRule::new("b", "User", "email", RuleKind::RequiredField, "B", "b").inactive(),
            BusinessRule::new("c", "User", "email", RuleKind::RequiredField, "C", "c")
                .for_tenant(tenant),
            BusinessRule::new("d", "Project", "name", RuleKind::RequiredField, "D", "d"),
        ];
        let set = RuleSet::new(rules, &catalog(), &registry()).unwrap();

        let ids = |t| set.applicable("User", t).map(|r| r.id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids(Some(tenant)), vec!["a", "c"]);
        assert_eq!(ids(Some(TenantId::new())), vec!["a"]);
        assert_eq!(ids(None), vec!["a"]);
    }

    #[test]
    fn rejects_unknown_permissions_and_predicates() {
        let perm = BusinessRule::new(
            "r1",
            "Invoice",
            "status",
            RuleKind::PermissionConstraint {
                required_permission: Permission::parse("Invoice.publish").unwrap(),
                resource_type: "Invoice".to_string(),
            },
            "X",
            "x",
        );
        let err = RuleSet::new(vec![perm], &catalog(), &registry()).unwrap_err();
        assert!(matches!(err, RuleConfigError::UnknownPermission { .. }));
        assert_eq!(err.code(), "RULE_CONFIGURATION_INVALID");

        let custom = BusinessRule::new(
            "r2",
            "Task",
            "title",
            RuleKind::CustomRule {
                predicate: "noSuchPredicate".to_string(),
                params: Value::Null,
            },
            "X",
            "x",
        );
        assert_eq!(
            RuleSet::new(vec![custom], &catalog(), &registry()),
            Err(RuleConfigError::UnregisteredPredicate {
                rule: "r2".to_string(),
                predicate: "noSuchPredicate".to_string(),
            })
        );
    }

    #[test]
    fn rejects_malformed_documents() {
        let unknown_type = r#"{"rules": [{"id": "x", "entity": "User", "field": "f",
            "type": "REGEX", "errorCode": "X", "errorMessage": "x"}]}"#;
        assert!(matches!(
            RuleSet::from_json(unknown_type, &catalog(), &registry()),
            Err(RuleConfigError::Parse(_))
        ));

        let duplicate = vec![
            BusinessRule::new("same", "User", "a", RuleKind::RequiredField, "A", "a"),
            BusinessRule::new("same", "User", "b", RuleKind::RequiredField, "B", "b"),
        ];
        assert_eq!(
            RuleSet::new(duplicate, &catalog(), &registry()),
            Err(RuleConfigError::DuplicateRule("same".to_string()))
        );

        let bad_table = BusinessRule::new(
            "t",
            "User",
            "email",
            RuleKind::UniqueConstraint { table: "users; drop".to_string() },
            "X",
            "x",
        );
        assert!(matches!(
            RuleSet::new(vec![bad_table], &catalog(), &registry()),
            Err(RuleConfigError::InvalidCondition { .. })
        ));
    }

    #[test]
    fn rejects_empty_or_mixed_ranges() {
        let range = |condition| {
            BusinessRule::new("r", "Project", "budget", RuleKind::RangeConstraint(condition), "X", "x")
        };
        let cases = [
            RangeCondition::default(),
            RangeCondition {
                min: Some(RangeBound::Number(10.0)),
                max: Some(RangeBound::Number(1.0)),
                ..Default::default()
            },
            RangeCondition {
                min: Some(RangeBound::Number(5.0)),
                max: Some(RangeBound::Number(5.0)),
                max_exclusive: true,
                ..Default::default()
            },
            RangeCondition {
                min: Some(RangeBound::Number(0.0)),
                max: Some(RangeBound::Text("2025-01-01".to_string())),
                ..Default::default()
            },
            RangeCondition {
                min: Some(RangeBound::Text("next week".to_string())),
                ..Default::default()
            },
        ];
        for condition in cases {
            assert!(RuleSet::new(vec![range(condition)], &catalog(), &registry()).is_err());
        }
    }

    #[test]
    fn ranges_compare_numbers_and_dates() {
        let hours = RangeCondition {
            min: Some(RangeBound::Number(0.0)),
            max: Some(RangeBound::Number(24.0)),
            min_exclusive: true,
            max_exclusive: false,
        };
        assert!(!hours.admits(&json!(0)));
        assert!(hours.admits(&json!(7.5)));
        assert!(hours.admits(&json!(24)));
        assert!(!hours.admits(&json!(24.01)));
        assert!(!hours.admits(&json!("8")));

        let fiscal_year = RangeCondition {
            min: Some(RangeBound::Text("2024-01-01".to_string())),
            max: Some(RangeBound::Text("2025-01-01".to_string())),
            max_exclusive: true,
            ..Default::default()
        };
        assert!(fiscal_year.admits(&json!("2024-06-30")));
        assert!(fiscal_year.admits(&json!("2024-12-31T23:59:59Z")));
        assert!(!fiscal_year.admits(&json!("2025-01-01")));
        assert!(!fiscal_year.admits(&json!(20240630)));
    }

    #[test]
    fn serializes_back_to_document_shape() {
        let rule = BusinessRule::new(
            "user-email-unique",
            "User",
            "email",
            RuleKind::UniqueConstraint { table: "User".to_string() },
            "DUPLICATE_EMAIL",
            "Email already in use",
        );
        let value = serde_json::to_value(&rule).unwrap();
        assert_eq!(value["type"], json!("UNIQUE_CONSTRAINT"));
        assert_eq!(value["table"], json!("User"));
        assert_eq!(value["errorCode"], json!("DUPLICATE_EMAIL"));
        assert_eq!(value["severity"], json!("ERROR"));
    }
}
