use std::borrow::Cow;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Closed set of actions a permission can name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Read,
    List,
    Export,
    Create,
    Update,
    Duplicate,
    SoftDelete,
    Restore,
    HardDelete,
    Archive,
    Activate,
    Deactivate,
    Assign,
    Unassign,
    Transfer,
    Submit,
    Approve,
    Reject,
    Review,
    Send,
    Publish,
    Lock,
    Unlock,
    Sync,
}

impl Action {
    pub const ALL: [Action; 24] = [
        Action::Read,
        Action::List,
        Action::Export,
        Action::Create,
        Action::Update,
        Action::Duplicate,
        Action::SoftDelete,
        Action::Restore,
        Action::HardDelete,
        Action::Archive,
        Action::Activate,
        Action::Deactivate,
        Action::Assign,
        Action::Unassign,
        Action::Transfer,
        Action::Submit,
        Action::Approve,
        Action::Reject,
        Action::Review,
        Action::Send,
        Action::Publish,
        Action::Lock,
        Action::Unlock,
        Action::Sync,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Read => "read",
            Action::List => "list",
            Action::Export => "export",
            Action::Create => "create",
            Action::Update => "update",
            Action::Duplicate => "duplicate",
            Action::SoftDelete => "soft_delete",
            Action::Restore => "restore",
            Action::HardDelete => "hard_delete",
            Action::Archive => "archive",
            Action::Activate => "activate",
            Action::Deactivate => "deactivate",
            Action::Assign => "assign",
            Action::Unassign => "unassign",
            Action::Transfer => "transfer",
            Action::Submit => "submit",
            Action::Approve => "approve",
            Action::Reject => "reject",
            Action::Review => "review",
            Action::Send => "send",
            Action::Publish => "publish",
            Action::Lock => "lock",
            Action::Unlock => "unlock",
            Action::Sync => "sync",
        }
    }
}

impl core::fmt::Display for Action {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = PermissionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Action::ALL
            .iter()
            .copied()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| PermissionError::UnknownAction(s.to_string()))
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PermissionError {
    #[error("malformed permission '{0}' (expected '<Resource>.<action>')")]
    Malformed(String),

    #[error("unknown action '{0}'")]
    UnknownAction(String),
}

/// Permission identifier: `<Resource>.<action>` (e.g. `Project.create`).
///
/// Permissions are atomic. There is no wildcard: a role that should be able to
/// do everything lists every permission explicitly in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Permission {
    resource: Cow<'static, str>,
    action: Action,
}

impl Permission {
    pub fn new(resource: impl Into<Cow<'static, str>>, action: Action) -> Self {
        Self {
            resource: resource.into(),
            action,
        }
    }

    /// Parse `<Resource>.<action>`.
    pub fn parse(s: &str) -> Result<Self, PermissionError> {
        let (resource, action) = s
            .split_once('.')
            .ok_or_else(|| PermissionError::Malformed(s.to_string()))?;

        let resource_ok = !resource.is_empty()
            && resource
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !resource_ok {
            return Err(PermissionError::Malformed(s.to_string()));
        }

        Ok(Self::new(resource.to_string(), action.parse()?))
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn action(&self) -> Action {
        self.action
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}.{}", self.resource, self.action)
    }
}

impl FromStr for Permission {
    type Err = PermissionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Permission {
    type Error = PermissionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Permission> for String {
    fn from(value: Permission) -> Self {
        value.to_string()
    }
}
