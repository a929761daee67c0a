//! `erpguard-core`: identifiers and shared primitives.
//!
//! This crate contains no policy and no infrastructure concerns.

pub mod error;
pub mod id;

pub use error::{CoreError, CoreResult, ensure_identifier};
pub use id::{CorrelationId, RecordId, TenantId, UserId};
