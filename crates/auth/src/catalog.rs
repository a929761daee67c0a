//! Role→permission catalog.
//!
//! The catalog is generated from the declarative role/permission schema and
//! shipped as a versioned JSON document. It is parsed and validated once at
//! startup and is immutable afterwards; share it behind an `Arc`.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{Action, Permission, Role, RoleClassification, RoleScope};

/// Catalog generated for the current release, embedded at compile time.
pub const DEFAULT_CATALOG_JSON: &str = include_str!("../catalog/default.json");

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CatalogError {
    #[error("catalog document is invalid: {0}")]
    Parse(String),

    #[error("catalog version must not be empty")]
    EmptyVersion,

    #[error("catalog declares no roles")]
    NoRoles,

    #[error("role '{0}' is declared more than once")]
    DuplicateRole(String),

    #[error("role name '{0}' must be upper snake case")]
    InvalidRoleName(String),

    #[error("resource '{0}' is declared more than once")]
    DuplicateResource(String),

    #[error("resource name '{0}' is not a plain identifier")]
    InvalidResource(String),

    #[error("role '{role}' grants actions on undeclared resource '{resource}'")]
    UndeclaredResource { role: String, resource: String },

    #[error("permission '{0}' is not granted by any role in the catalog")]
    UnknownPermission(String),

    #[error("role '{0}' is not declared in the catalog")]
    UnknownRole(String),
}

/// Wire shape of the catalog document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CatalogDocument {
    pub version: String,
    pub resources: Vec<String>,
    pub roles: Vec<RoleDocument>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RoleDocument {
    pub name: String,
    pub level: u32,
    pub scope: RoleScope,
    pub classification: RoleClassification,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub grants: BTreeMap<String, Vec<Action>>,
}

/// A role as declared by the catalog, with its expanded permission set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleDefinition {
    pub role: Role,
    pub level: u32,
    pub scope: RoleScope,
    pub classification: RoleClassification,
    pub description: Option<String>,
    pub permissions: BTreeSet<Permission>,
}

/// Immutable, validated role→permission table.
#[derive(Debug, Clone)]
pub struct PermissionCatalog {
    version: String,
    resources: BTreeSet<String>,
    roles: Vec<RoleDefinition>,
    index: HashMap<Role, usize>,
    known_permissions: HashSet<Permission>,
}

impl PermissionCatalog {
    /// Parse and validate a catalog document.
    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let doc: CatalogDocument =
            serde_json::from_str(json).map_err(|e| CatalogError::Parse(e.to_string()))?;
        Self::from_document(doc)
    }

    /// The catalog embedded in this crate.
    pub fn embedded() -> Result<Self, CatalogError> {
        Self::from_json(DEFAULT_CATALOG_JSON)
    }

    pub fn from_document(doc: CatalogDocument) -> Result<Self, CatalogError> {
        if doc.version.trim().is_empty() {
            return Err(CatalogError::EmptyVersion);
        }
        if doc.roles.is_empty() {
            return Err(CatalogError::NoRoles);
        }

        let mut resources = BTreeSet::new();
        for resource in doc.resources {
            if !is_resource_name(&resource) {
                return Err(CatalogError::InvalidResource(resource));
            }
            if !resources.insert(resource.clone()) {
                return Err(CatalogError::DuplicateResource(resource));
            }
        }

        let mut roles = Vec::with_capacity(doc.roles.len());
        let mut index = HashMap::new();
        let mut known_permissions = HashSet::new();

        for role_doc in doc.roles {
            if !is_role_name(&role_doc.name) {
                return Err(CatalogError::InvalidRoleName(role_doc.name));
            }
            let role = Role::new(role_doc.name.clone());
            if index.contains_key(&role) {
                return Err(CatalogError::DuplicateRole(role_doc.name));
            }

            let mut permissions = BTreeSet::new();
            for (resource, actions) in role_doc.grants {
                if !resources.contains(&resource) {
                    return Err(CatalogError::UndeclaredResource {
                        role: role_doc.name.clone(),
                        resource,
                    });
                }
                for action in actions {
                    permissions.insert(Permission::new(resource.clone(), action));
                }
            }

            known_permissions.extend(permissions.iter().cloned());
            index.insert(role.clone(), roles.len());
            roles.push(RoleDefinition {
                role,
                level: role_doc.level,
                scope: role_doc.scope,
                classification: role_doc.classification,
                description: role_doc.description,
                permissions,
            });
        }

        Ok(Self {
            version: doc.version,
            resources,
            roles,
            index,
            known_permissions,
        })
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn resources(&self) -> impl Iterator<Item = &str> {
        self.resources.iter().map(String::as_str)
    }

    /// Roles in declaration order.
    pub fn roles(&self) -> impl Iterator<Item = &RoleDefinition> {
        self.roles.iter()
    }

    pub fn role(&self, role: &Role) -> Option<&RoleDefinition> {
        self.index.get(role).and_then(|&i| self.roles.get(i))
    }

    pub fn is_known_role(&self, role: &Role) -> bool {
        self.index.contains_key(role)
    }

    pub fn permissions_for(&self, role: &Role) -> Option<&BTreeSet<Permission>> {
        self.role(role).map(|def| &def.permissions)
    }

    /// Whether `role` grants `permission`. Unknown roles grant nothing.
    pub fn grants(&self, role: &Role, permission: &Permission) -> bool {
        self.permissions_for(role)
            .is_some_and(|perms| perms.contains(permission))
    }

    /// Whether some role grants `permission` (closed-world membership).
    pub fn contains_permission(&self, permission: &Permission) -> bool {
        self.known_permissions.contains(permission)
    }

    pub fn ensure_permission(&self, permission: &Permission) -> Result<(), CatalogError> {
        if self.contains_permission(permission) {
            Ok(())
        } else {
            Err(CatalogError::UnknownPermission(permission.to_string()))
        }
    }

    pub fn ensure_role(&self, role: &Role) -> Result<(), CatalogError> {
        if self.is_known_role(role) {
            Ok(())
        } else {
            Err(CatalogError::UnknownRole(role.to_string()))
        }
    }

    /// Roles that grant `permission`, in declaration order.
    pub fn roles_granting(&self, permission: &Permission) -> Vec<&Role> {
        self.roles
            .iter()
            .filter(|def| def.permissions.contains(permission))
            .map(|def| &def.role)
            .collect()
    }

    /// Union of the permission sets of `roles`. Unknown roles contribute nothing.
    pub fn union_of<'a>(&self, roles: impl IntoIterator<Item = &'a Role>) -> HashSet<Permission> {
        roles
            .into_iter()
            .filter_map(|r| self.permissions_for(r))
            .flat_map(|perms| perms.iter().cloned())
            .collect()
    }
}

fn is_role_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_uppercase())
        && chars.all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

fn is_resource_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
