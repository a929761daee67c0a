//! Tenant-scoped record lookups used by integrity and permission rules.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use erpguard_core::{TenantId, ensure_identifier};

use crate::entity::{EntitySnapshot, field_value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Ne,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

/// Count query over one table. Filters are ANDed.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordQuery {
    pub table: String,
    pub filters: Vec<Filter>,
}

impl RecordQuery {
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            filters: Vec::new(),
        }
    }

    pub fn where_eq(mut self, field: impl Into<String>, value: Value) -> Self {
        self.filters.push(Filter {
            field: field.into(),
            op: FilterOp::Eq,
            value,
        });
        self
    }

    pub fn where_ne(mut self, field: impl Into<String>, value: Value) -> Self {
        self.filters.push(Filter {
            field: field.into(),
            op: FilterOp::Ne,
            value,
        });
        self
    }

    /// SQL-like matching: a missing or null column equals only `null`, and is
    /// never "not equal" to anything.
    pub fn matches(&self, record: &EntitySnapshot) -> bool {
        self.filters.iter().all(|filter| {
            let actual = field_value(record, &filter.field).unwrap_or(&Value::Null);
            match filter.op {
                FilterOp::Eq => actual == &filter.value,
                FilterOp::Ne => !actual.is_null() && actual != &filter.value,
            }
        })
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("record store unavailable: {0}")]
    Unavailable(String),

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("record store error: {0}")]
    Backend(String),
}

/// Executes queries with row-level security bound to one tenant.
///
/// Implementations must make rows of other tenants invisible: the count for
/// `tenant_id` covers that tenant's rows only.
#[async_trait]
pub trait TenantQueryExecutor: Send + Sync {
    async fn with_tenant_rls(&self, tenant_id: TenantId, query: &RecordQuery) -> Result<u64, StoreError>;
}

#[async_trait]
impl<S: TenantQueryExecutor + ?Sized> TenantQueryExecutor for Arc<S> {
    async fn with_tenant_rls(&self, tenant_id: TenantId, query: &RecordQuery) -> Result<u64, StoreError> {
        (**self).with_tenant_rls(tenant_id, query).await
    }
}

type Partition = (TenantId, String);

/// In-process store partitioned by (tenant, table).
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    records: RwLock<HashMap<Partition, Vec<EntitySnapshot>>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &self,
        tenant_id: TenantId,
        table: impl Into<String>,
        record: EntitySnapshot,
    ) -> Result<(), StoreError> {
        let table = table.into();
        ensure_identifier(&table).map_err(|e| StoreError::InvalidQuery(e.to_string()))?;

        let mut records = self
            .records
            .write()
            .map_err(|_| StoreError::Unavailable("record store lock poisoned".to_string()))?;
        records.entry((tenant_id, table)).or_default().push(record);
        Ok(())
    }

    pub fn len(&self, tenant_id: TenantId, table: &str) -> usize {
        self.records
            .read()
            .ok()
            .and_then(|records| records.get(&(tenant_id, table.to_string())).map(Vec::len))
            .unwrap_or(0)
    }
}

#[async_trait]
impl TenantQueryExecutor for InMemoryRecordStore {
    async fn with_tenant_rls(&self, tenant_id: TenantId, query: &RecordQuery) -> Result<u64, StoreError> {
        ensure_identifier(&query.table).map_err(|e| StoreError::InvalidQuery(e.to_string()))?;

        let records = self
            .records
            .read()
            .map_err(|_| StoreError::Unavailable("record store lock poisoned".to_string()))?;

        let count = records
            .get(&(tenant_id, query.table.clone()))
            .map_or(0, |rows| rows.iter().filter(|r| query.matches(r)).count());
        Ok(count as u64)
    }
}
