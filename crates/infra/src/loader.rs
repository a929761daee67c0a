//! Catalog and rule document loading from disk.

use std::path::{Path, PathBuf};

use thiserror::Error;

use erpguard_auth::{CatalogError, PermissionCatalog};
use erpguard_validation::{CustomRuleRegistry, RuleConfigError, RuleSet};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LoadError {
    #[error("failed to read {path}: {reason}")]
    Io { path: PathBuf, reason: String },

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Rules(#[from] RuleConfigError),
}

fn read(path: &Path) -> Result<String, LoadError> {
    std::fs::read_to_string(path).map_err(|e| LoadError::Io {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Load the catalog at `path`, or the embedded default.
pub fn load_catalog(path: Option<&Path>) -> Result<PermissionCatalog, LoadError> {
    let catalog = match path {
        Some(path) => PermissionCatalog::from_json(&read(path)?)?,
        None => {
            tracing::debug!("no catalog path configured; using the embedded permission catalog");
            PermissionCatalog::embedded()?
        }
    };
    tracing::info!(
        version = catalog.version(),
        roles = catalog.roles().count(),
        source = %path.map_or_else(|| "embedded".to_string(), |p| p.display().to_string()),
        "permission catalog loaded"
    );
    Ok(catalog)
}

/// Load the rule document at `path`; no path means no rules.
pub fn load_rules(
    path: Option<&Path>,
    catalog: &PermissionCatalog,
    registry: &CustomRuleRegistry,
) -> Result<RuleSet, LoadError> {
    let Some(path) = path else {
        return Ok(RuleSet::empty());
    };
    let rules = RuleSet::from_json(&read(path)?, catalog, registry).inspect_err(|err| {
        tracing::error!(path = %path.display(), code = err.code(), error = %err, "rule document rejected");
    })?;
    tracing::info!(path = %path.display(), rules = rules.len(), "business rules loaded");
    Ok(rules)
}
