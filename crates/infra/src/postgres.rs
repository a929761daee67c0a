//! Postgres-backed tenant query executor.
//!
//! Every query runs in its own transaction with `app.current_tenant` set via
//! `set_config(.., true)`, so row-level security policies of the form
//! `tenant_id = current_setting('app.current_tenant')::uuid` apply. The
//! setting is transaction-local and never leaks to other pool users.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (query canceled / statement timeout) | `57014` | `Unavailable` |
//! | Database (undefined table / column) | `42P01` / `42703` | `InvalidQuery` |
//! | Database (other) | Any other | `Backend` |
//! | PoolClosed / PoolTimedOut / Io | N/A | `Unavailable` |
//! | Other | N/A | `Backend` |

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::instrument;

use erpguard_core::{TenantId, ensure_identifier};
use erpguard_validation::{FilterOp, RecordQuery, StoreError, TenantQueryExecutor};

#[derive(Debug, Clone)]
pub struct PgTenantExecutor {
    pool: PgPool,
    statement_timeout: Option<Duration>,
}

impl PgTenantExecutor {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            statement_timeout: None,
        }
    }

    /// Lazily connecting pool for `url`; the first query opens a connection.
    pub fn connect_lazy(url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .connect_lazy(url)
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    pub fn with_statement_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.statement_timeout = timeout;
        self
    }
}

#[async_trait]
impl TenantQueryExecutor for PgTenantExecutor {
    #[instrument(skip(self, query), fields(tenant_id = %tenant_id, table = %query.table), err)]
    async fn with_tenant_rls(&self, tenant_id: TenantId, query: &RecordQuery) -> Result<u64, StoreError> {
        let CountStatement { sql, binds } = CountStatement::build(query)?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin", e))?;

        sqlx::query("SELECT set_config('app.current_tenant', $1, true)")
            .bind(tenant_id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("set_tenant", e))?;

        if let Some(timeout) = self.statement_timeout {
            sqlx::query("SELECT set_config('statement_timeout', $1, true)")
                .bind(timeout.as_millis().to_string())
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("set_timeout", e))?;
        }

        let mut count = sqlx::query_scalar::<_, i64>(&sql);
        for bind in binds {
            count = count.bind(bind);
        }
        let count = count
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("count", e))?;

        tx.rollback().await.map_err(|e| map_sqlx_error("rollback", e))?;

        Ok(u64::try_from(count).unwrap_or(0))
    }
}

/// `SELECT COUNT(*)` text and its positional text binds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountStatement {
    pub sql: String,
    pub binds: Vec<String>,
}

impl CountStatement {
    /// Identifiers are validated and quoted; values are compared as text
    /// (`::text`) so one statement shape serves uuid, text and numeric columns.
    pub fn build(query: &RecordQuery) -> Result<Self, StoreError> {
        ensure_identifier(&query.table).map_err(|e| StoreError::InvalidQuery(e.to_string()))?;

        let mut sql = format!("SELECT COUNT(*) FROM \"{}\"", query.table);
        let mut binds = Vec::new();

        for (i, filter) in query.filters.iter().enumerate() {
            ensure_identifier(&filter.field).map_err(|_| {
                StoreError::InvalidQuery(format!(
                    "field '{}' is not a plain column name (nested paths are not supported)",
                    filter.field
                ))
            })?;

            sql.push_str(if i == 0 { " WHERE " } else { " AND " });
            let column = format!("\"{}\"", filter.field);
            match (&filter.value, filter.op) {
                (Value::Null, FilterOp::Eq) => sql.push_str(&format!("{column} IS NULL")),
                (Value::Null, FilterOp::Ne) => sql.push_str(&format!("{column} IS NOT NULL")),
                (value, op) => {
                    binds.push(bind_text(value)?);
                    let operator = match op {
                        FilterOp::Eq => "=",
                        FilterOp::Ne => "<>",
                    };
                    sql.push_str(&format!("{column}::text {operator} ${}", binds.len()));
                }
            }
        }

        Ok(Self { sql, binds })
    }
}

fn bind_text(value: &Value) -> Result<String, StoreError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => Err(StoreError::InvalidQuery(
            "only scalar values can be compared".to_string(),
        )),
    }
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("57014") => StoreError::Unavailable(msg),
                Some("42P01") | Some("42703") => StoreError::InvalidQuery(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Unavailable(format!("connection pool closed in {}", operation))
        }
        sqlx::Error::PoolTimedOut => {
            StoreError::Unavailable(format!("connection pool timed out in {}", operation))
        }
        sqlx::Error::Io(e) => StoreError::Unavailable(format!("io error in {}: {}", operation, e)),
        _ => StoreError::Backend(format!("sqlx error in {}: {}", operation, err)),
    }
}
