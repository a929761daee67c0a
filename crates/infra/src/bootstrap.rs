//! Wiring of catalog, rules, engines and pipeline from configuration.

use std::sync::Arc;

use thiserror::Error;

use erpguard_auth::{AuthorizationEngine, PermissionCatalog};
use erpguard_validation::{
    BusinessRuleEngine, CustomRuleRegistry, InMemoryRecordStore, StoreError, TenantQueryExecutor,
    ValidationPipeline,
};

use crate::config::CoreConfig;
use crate::loader::{LoadError, load_catalog, load_rules};
use crate::postgres::PgTenantExecutor;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BootstrapError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Shared, immutable services for one process.
#[derive(Debug, Clone)]
pub struct Core {
    pub catalog: Arc<PermissionCatalog>,
    pub authz: Arc<AuthorizationEngine>,
    pub pipeline: ValidationPipeline,
}

/// Executor selected by configuration: Postgres when `DATABASE_URL` is set.
///
/// Must be called from within a Tokio runtime.
pub fn executor(config: &CoreConfig) -> Result<Arc<dyn TenantQueryExecutor>, BootstrapError> {
    match &config.database {
        Some(database) => {
            let executor = PgTenantExecutor::connect_lazy(&database.url)?
                .with_statement_timeout(database.statement_timeout);
            Ok(Arc::new(executor))
        }
        None => {
            tracing::warn!("DATABASE_URL not set; integrity checks use an empty in-memory store");
            Ok(Arc::new(InMemoryRecordStore::new()))
        }
    }
}

/// Load catalog and rules, then wire the engines around `executor`.
pub fn build(
    config: &CoreConfig,
    registry: CustomRuleRegistry,
    executor: Arc<dyn TenantQueryExecutor>,
) -> Result<Core, BootstrapError> {
    let catalog = Arc::new(load_catalog(config.catalog_path.as_deref())?);
    let rules = load_rules(config.rules_path.as_deref(), &catalog, &registry)?;

    let authz = Arc::new(AuthorizationEngine::new(catalog.clone()));
    let engine = BusinessRuleEngine::new(authz.clone(), executor, Arc::new(registry));
    let pipeline = ValidationPipeline::new(Arc::new(rules), engine, config.pipeline());

    Ok(Core {
        catalog,
        authz,
        pipeline,
    })
}
