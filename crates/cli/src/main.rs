//! `erpguard` operator tool.

mod cli;
mod commands;

use std::sync::Arc;

use clap::Parser;

use erpguard_auth::AuthorizationEngine;
use erpguard_infra::{CoreConfig, build, executor, load_catalog};

use crate::cli::{Cli, Command};
use crate::commands::ValidateArgs;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = CoreConfig::from_env()?;
    erpguard_observability::init(&config.log);
    config.catalog_path = cli.catalog.or(config.catalog_path);
    config.rules_path = cli.rules.or(config.rules_path);

    let output = match cli.command {
        Command::Catalog => commands::catalog(&load_catalog(config.catalog_path.as_deref())?),
        Command::Roles { roles } => {
            let authz = AuthorizationEngine::new(Arc::new(load_catalog(config.catalog_path.as_deref())?));
            commands::roles(&authz, &roles)
        }
        Command::Explain {
            permission,
            roles,
            foreign_tenant,
        } => {
            let authz = AuthorizationEngine::new(Arc::new(load_catalog(config.catalog_path.as_deref())?));
            commands::explain(&authz, &permission, &roles, foreign_tenant)?
        }
        Command::Rules { predicates } => {
            let catalog = load_catalog(config.catalog_path.as_deref())?;
            commands::rules(&catalog, config.rules_path.as_deref(), &predicates)?
        }
        Command::Validate {
            schema,
            input,
            operation,
            roles,
            entity_id,
            predicates,
        } => {
            let registry = commands::placeholder_registry(&predicates);
            let core = build(&config, registry, executor(&config)?)?;
            commands::validate(
                &core,
                ValidateArgs {
                    schema: &schema,
                    input: &input,
                    operation: operation.into(),
                    roles: &roles,
                    entity_id: entity_id.as_deref(),
                },
            )
            .await?
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
