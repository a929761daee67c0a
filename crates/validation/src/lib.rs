//! `erpguard-validation`: multi-stage validation of entity writes.
//!
//! Schema checks, configurable business rules, permission checks and
//! tenant-scoped integrity queries, aggregated into one [`ValidationResult`].

pub mod context;
pub mod engine;
pub mod entity;
pub mod issue;
pub mod pipeline;
pub mod registry;
pub mod rules;
pub mod schema;
pub mod store;

pub use context::{Operation, ValidationContext};
pub use engine::{BusinessRuleEngine, RuleEngineError};
pub use entity::{EntitySnapshot, ID_FIELD};
pub use issue::{ENTITY_FIELD, Issue, IssueKind, Severity, Stage, ValidationResult};
pub use pipeline::{PipelineConfig, PipelineError, ValidationPipeline, ValidationRequest};
pub use registry::{CustomRule, CustomRuleRegistry, RuleFailure};
pub use rules::{BusinessRule, RangeBound, RangeCondition, RuleConfigError, RuleKind, RuleSet};
pub use schema::{EntitySchema, FieldKind, FieldSpec};
pub use store::{
    Filter, FilterOp, InMemoryRecordStore, RecordQuery, StoreError, TenantQueryExecutor,
};
