//! Validation issues and the aggregated result returned to controllers.

use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

/// Field path used for issues about the entity as a whole.
pub const ENTITY_FIELD: &str = "";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    #[default]
    Error,
    Warning,
    Info,
}

/// Taxonomy class of an issue. Presentation layers switch on this (or on the
/// rule-specific `code`), never on the message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueKind {
    SchemaInvalid,
    FieldRequired,
    ValueOutOfRange,
    DuplicateValue,
    PermissionDenied,
    ReferenceNotFound,
    RuleViolated,
}

impl IssueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueKind::SchemaInvalid => "SCHEMA_INVALID",
            IssueKind::FieldRequired => "FIELD_REQUIRED",
            IssueKind::ValueOutOfRange => "VALUE_OUT_OF_RANGE",
            IssueKind::DuplicateValue => "DUPLICATE_VALUE",
            IssueKind::PermissionDenied => "PERMISSION_DENIED",
            IssueKind::ReferenceNotFound => "REFERENCE_NOT_FOUND",
            IssueKind::RuleViolated => "RULE_VIOLATED",
        }
    }
}

/// Pipeline stage, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Syntactic,
    Semantic,
    Security,
    Integrity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub field: String,
    pub code: String,
    pub kind: IssueKind,
    pub stage: Stage,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    pub severity: Severity,
}

impl Issue {
    /// ERROR-severity issue without a value.
    pub fn new(
        stage: Stage,
        kind: IssueKind,
        field: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            code: code.into(),
            kind,
            stage,
            message: message.into(),
            value: None,
            severity: Severity::Error,
        }
    }

    pub fn with_value(mut self, value: Option<Value>) -> Self {
        self.value = value;
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

/// Outcome of a validation call.
///
/// `Valid` never carries an ERROR-severity issue: build results through
/// [`ValidationResult::from_issues`] and the invariant holds by construction.
/// `Invalid` keeps every issue the call produced, warnings included.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationResult<T> {
    Valid { data: T, warnings: Vec<Issue> },
    Invalid { errors: Vec<Issue> },
}

impl<T> ValidationResult<T> {
    pub fn from_issues(data: T, issues: Vec<Issue>) -> Self {
        if issues.iter().any(Issue::is_error) {
            ValidationResult::Invalid { errors: issues }
        } else {
            ValidationResult::Valid {
                data,
                warnings: issues,
            }
        }
    }

    pub fn invalid(errors: Vec<Issue>) -> Self {
        ValidationResult::Invalid { errors }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ValidationResult::Valid { .. })
    }

    /// All issues, whichever variant.
    pub fn issues(&self) -> &[Issue] {
        match self {
            ValidationResult::Valid { warnings, .. } => warnings,
            ValidationResult::Invalid { errors } => errors,
        }
    }

    pub fn issues_for<'a>(&'a self, field: &'a str) -> impl Iterator<Item = &'a Issue> + 'a {
        self.issues().iter().filter(move |i| i.field == field)
    }

    pub fn data(&self) -> Option<&T> {
        match self {
            ValidationResult::Valid { data, .. } => Some(data),
            ValidationResult::Invalid { .. } => None,
        }
    }

    pub fn into_data(self) -> Option<T> {
        match self {
            ValidationResult::Valid { data, .. } => Some(data),
            ValidationResult::Invalid { .. } => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ValidationResult<U> {
        match self {
            ValidationResult::Valid { data, warnings } => ValidationResult::Valid {
                data: f(data),
                warnings,
            },
            ValidationResult::Invalid { errors } => ValidationResult::Invalid { errors },
        }
    }
}

/// `{ "success": true, "data": .., "warnings": [..] }` or
/// `{ "success": false, "errors": [..] }`.
impl<T: Serialize> Serialize for ValidationResult<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ValidationResult::Valid { data, warnings } => {
                let mut s = serializer.serialize_struct("ValidationResult", 3)?;
                s.serialize_field("success", &true)?;
                s.serialize_field("data", data)?;
                s.serialize_field("warnings", warnings)?;
                s.end()
            }
            ValidationResult::Invalid { errors } => {
                let mut s = serializer.serialize_struct("ValidationResult", 2)?;
                s.serialize_field("success", &false)?;
                s.serialize_field("errors", errors)?;
                s.end()
            }
        }
    }
}
