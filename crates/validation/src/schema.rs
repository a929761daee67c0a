//! Syntactic stage: shape and type checks on the raw payload.

use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use validator::ValidateEmail;

use erpguard_core::RecordId;

use crate::context::{Operation, ValidationContext};
use crate::entity::{EntitySnapshot, ID_FIELD};
use crate::issue::{ENTITY_FIELD, Issue, IssueKind, Stage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    String,
    Integer,
    Number,
    Boolean,
    /// `YYYY-MM-DD`
    Date,
    /// RFC 3339
    #[serde(rename = "datetime")]
    DateTime,
    Uuid,
    Email,
    Object,
    Array,
    Any,
}

impl FieldKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::String => "string",
            FieldKind::Integer => "integer",
            FieldKind::Number => "number",
            FieldKind::Boolean => "boolean",
            FieldKind::Date => "date",
            FieldKind::DateTime => "datetime",
            FieldKind::Uuid => "uuid",
            FieldKind::Email => "email",
            FieldKind::Object => "object",
            FieldKind::Array => "array",
            FieldKind::Any => "any",
        }
    }

    /// Whether a non-null `value` has this kind.
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            FieldKind::String => value.is_string(),
            FieldKind::Integer => value.is_i64() || value.is_u64(),
            FieldKind::Number => value.is_number(),
            FieldKind::Boolean => value.is_boolean(),
            FieldKind::Date => value
                .as_str()
                .is_some_and(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()),
            FieldKind::DateTime => value
                .as_str()
                .is_some_and(|s| DateTime::parse_from_rfc3339(s).is_ok()),
            FieldKind::Uuid => value
                .as_str()
                .is_some_and(|s| uuid::Uuid::parse_str(s).is_ok()),
            FieldKind::Email => value.as_str().is_some_and(|s| s.validate_email()),
            FieldKind::Object => value.is_object(),
            FieldKind::Array => value.is_array(),
            FieldKind::Any => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub nullable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    /// Table whose record id this field must resolve to (checked in the
    /// integrity stage).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub references: Option<String>,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
            nullable: false,
            max_length: None,
            references: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn max_length(mut self, max: usize) -> Self {
        self.max_length = Some(max);
        self
    }

    pub fn references(mut self, table: impl Into<String>) -> Self {
        self.references = Some(table.into());
        self
    }
}

/// Declared shape of one entity type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitySchema {
    /// Entity name rules are keyed by (e.g. `User`).
    pub entity: String,
    /// Catalog resource noun for operation permissions (e.g. `User` for
    /// `User.create`).
    pub resource: String,
    pub fields: Vec<FieldSpec>,
    #[serde(default)]
    pub allow_unknown_fields: bool,
}

impl EntitySchema {
    /// Schema whose resource noun equals the entity name.
    pub fn new(entity: impl Into<String>) -> Self {
        let entity = entity.into();
        Self {
            resource: entity.clone(),
            entity,
            fields: Vec::new(),
            allow_unknown_fields: false,
        }
    }

    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = resource.into();
        self
    }

    pub fn field(mut self, spec: FieldSpec) -> Self {
        self.fields.push(spec);
        self
    }

    pub fn allow_unknown_fields(mut self) -> Self {
        self.allow_unknown_fields = true;
        self
    }

    pub fn spec(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Check `input` and return it as a snapshot, or every schema issue found.
    pub fn check(
        &self,
        input: &Value,
        operation: Operation,
        ctx: &ValidationContext,
    ) -> Result<EntitySnapshot, Vec<Issue>> {
        let Some(object) = input.as_object() else {
            return Err(vec![schema_issue(
                ENTITY_FIELD,
                "NOT_AN_OBJECT",
                format!("{} payload must be a JSON object", self.entity),
            )]);
        };

        let mut issues = Vec::new();
        self.check_id(object, operation, ctx, &mut issues);

        for spec in &self.fields {
            match object.get(&spec.name) {
                None => {
                    if spec.required && operation != Operation::Delete {
                        issues.push(schema_issue(
                            &spec.name,
                            "FIELD_MISSING",
                            format!("{} is required", spec.name),
                        ));
                    }
                }
                Some(Value::Null) => {
                    if !spec.nullable {
                        issues.push(schema_issue(
                            &spec.name,
                            "FIELD_NULL",
                            format!("{} must not be null", spec.name),
                        ));
                    }
                }
                Some(value) => {
                    if !spec.kind.accepts(value) {
                        issues.push(
                            schema_issue(
                                &spec.name,
                                "INVALID_TYPE",
                                format!("{} must be a valid {}", spec.name, spec.kind.as_str()),
                            )
                            .with_value(Some(value.clone())),
                        );
                    } else if let (Some(max), Some(text)) = (spec.max_length, value.as_str()) {
                        if text.chars().count() > max {
                            issues.push(schema_issue(
                                &spec.name,
                                "TOO_LONG",
                                format!("{} must be at most {max} characters", spec.name),
                            ));
                        }
                    }
                }
            }
        }

        if !self.allow_unknown_fields {
            for key in object.keys() {
                if key != ID_FIELD && self.spec(key).is_none() {
                    issues.push(schema_issue(
                        key,
                        "UNKNOWN_FIELD",
                        format!("{key} is not a field of {}", self.entity),
                    ));
                }
            }
        }

        if issues.is_empty() {
            Ok(object.clone())
        } else {
            Err(issues)
        }
    }

    fn check_id(
        &self,
        object: &EntitySnapshot,
        operation: Operation,
        ctx: &ValidationContext,
        issues: &mut Vec<Issue>,
    ) {
        let payload_id = match object.get(ID_FIELD) {
            None | Some(Value::Null) => None,
            Some(value) => match value.as_str().map(str::parse::<RecordId>) {
                Some(Ok(id)) => Some(id),
                _ => {
                    issues.push(
                        schema_issue(ID_FIELD, "INVALID_ID", "id must be a UUID string")
                            .with_value(Some(value.clone())),
                    );
                    return;
                }
            },
        };

        match (payload_id, ctx.entity_id()) {
            (Some(payload), Some(target)) if payload != target => {
                issues.push(schema_issue(
                    ID_FIELD,
                    "ID_MISMATCH",
                    "payload id does not match the target record",
                ));
            }
            (None, None) if operation.targets_existing() => {
                issues.push(schema_issue(
                    ID_FIELD,
                    "ID_REQUIRED",
                    format!("{operation} requires the id of an existing {}", self.entity),
                ));
            }
            _ => {}
        }
    }
}

fn schema_issue(field: &str, code: &str, message: impl Into<String>) -> Issue {
    Issue::new(Stage::Syntactic, IssueKind::SchemaInvalid, field, code, message)
}
