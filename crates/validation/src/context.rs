use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use erpguard_auth::{Action, ActorContext};
use erpguard_core::{CorrelationId, RecordId, TenantId, UserId};

/// Write operation being validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operation {
    Create,
    Update,
    Delete,
}

impl Operation {
    /// Catalog action the actor needs to perform this operation.
    ///
    /// Deletes through the validation path are soft deletes; hard deletes are
    /// an administrative flow outside it.
    pub fn action(&self) -> Action {
        match self {
            Operation::Create => Action::Create,
            Operation::Update => Action::Update,
            Operation::Delete => Action::SoftDelete,
        }
    }

    pub fn targets_existing(&self) -> bool {
        matches!(self, Operation::Update | Operation::Delete)
    }
}

impl core::fmt::Display for Operation {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
        };
        f.write_str(s)
    }
}

/// Per-operation context for one validation call.
///
/// Built fresh for every operation and never reused across tenants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationContext {
    tenant_id: Option<TenantId>,
    entity: String,
    entity_id: Option<RecordId>,
    actor_id: Option<UserId>,
    correlation_id: CorrelationId,
    timestamp: DateTime<Utc>,
}

impl ValidationContext {
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            tenant_id: None,
            entity: entity.into(),
            entity_id: None,
            actor_id: None,
            correlation_id: CorrelationId::new(),
            timestamp: Utc::now(),
        }
    }

    /// Context for `actor` acting inside its own tenant.
    pub fn for_actor(actor: &ActorContext, entity: impl Into<String>) -> Self {
        Self::new(entity)
            .with_tenant(actor.tenant_id())
            .with_actor(actor.actor_id())
    }

    pub fn with_tenant(mut self, tenant_id: TenantId) -> Self {
        self.tenant_id = Some(tenant_id);
        self
    }

    pub fn with_entity_id(mut self, entity_id: RecordId) -> Self {
        self.entity_id = Some(entity_id);
        self
    }

    pub fn with_actor(mut self, actor_id: UserId) -> Self {
        self.actor_id = Some(actor_id);
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: CorrelationId) -> Self {
        self.correlation_id = correlation_id;
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn entity_id(&self) -> Option<RecordId> {
        self.entity_id
    }

    pub fn actor_id(&self) -> Option<UserId> {
        self.actor_id
    }

    pub fn correlation_id(&self) -> CorrelationId {
        self.correlation_id
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}
