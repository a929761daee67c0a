use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use erpguard_validation::Operation;

#[derive(Parser, Debug)]
#[command(name = "erpguard")]
#[command(about = "Inspect permission catalogs, role assignments and validation rules")]
pub struct Cli {
    /// Permission catalog file (default: the embedded catalog)
    #[arg(long, global = true, env = "ERPGUARD_CATALOG_PATH")]
    pub catalog: Option<PathBuf>,

    /// Business rule document
    #[arg(long, global = true, env = "ERPGUARD_RULES_PATH")]
    pub rules: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Validate the catalog and list its roles
    Catalog,

    /// Check a role combination for conflicts and redundancies
    Roles {
        #[arg(required = true)]
        roles: Vec<String>,
    },

    /// Explain whether actors holding ROLES may perform PERMISSION
    Explain {
        permission: String,

        #[arg(long, value_delimiter = ',', required = true)]
        roles: Vec<String>,

        /// Check against a resource owned by another tenant
        #[arg(long)]
        foreign_tenant: bool,
    },

    /// Validate the rule document against the catalog
    Rules {
        /// Custom predicate names the host application registers
        #[arg(long = "predicate")]
        predicates: Vec<String>,
    },

    /// Run the validation pipeline over one payload
    Validate {
        /// Entity schema (JSON)
        #[arg(long)]
        schema: PathBuf,

        /// Candidate payload (JSON)
        #[arg(long)]
        input: PathBuf,

        #[arg(long, value_enum, default_value_t = OperationArg::Create)]
        operation: OperationArg,

        #[arg(long, value_delimiter = ',', required = true)]
        roles: Vec<String>,

        /// Target record id for update/delete
        #[arg(long)]
        entity_id: Option<String>,

        /// Custom predicate names the host application registers
        #[arg(long = "predicate")]
        predicates: Vec<String>,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationArg {
    Create,
    Update,
    Delete,
}

impl From<OperationArg> for Operation {
    fn from(arg: OperationArg) -> Self {
        match arg {
            OperationArg::Create => Operation::Create,
            OperationArg::Update => Operation::Update,
            OperationArg::Delete => Operation::Delete,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_explain_with_role_list() {
        let cli = Cli::try_parse_from([
            "erpguard",
            "explain",
            "Project.create",
            "--roles",
            "VIEWER,WORKER",
        ])
        .unwrap();
        match cli.command {
            Command::Explain {
                permission,
                roles,
                foreign_tenant,
            } => {
                assert_eq!(permission, "Project.create");
                assert_eq!(roles, vec!["VIEWER", "WORKER"]);
                assert!(!foreign_tenant);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn validate_defaults_to_create() {
        let cli = Cli::try_parse_from([
            "erpguard",
            "validate",
            "--schema",
            "user.schema.json",
            "--input",
            "user.json",
            "--roles",
            "ADMIN",
        ])
        .unwrap();
        let Command::Validate { operation, .. } = cli.command else {
            panic!("expected validate");
        };
        assert_eq!(Operation::from(operation), Operation::Create);
    }

    #[test]
    fn roles_requires_at_least_one_role() {
        assert!(Cli::try_parse_from(["erpguard", "roles"]).is_err());
    }
}
