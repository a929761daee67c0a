//! Infrastructure layer: configuration, file loading, Postgres, wiring.

pub mod bootstrap;
pub mod config;
pub mod loader;
pub mod postgres;

pub use bootstrap::{BootstrapError, Core, build, executor};
pub use config::{ConfigError, CoreConfig, DatabaseConfig};
pub use loader::{LoadError, load_catalog, load_rules};
pub use postgres::{CountStatement, PgTenantExecutor};
