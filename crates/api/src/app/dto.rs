use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use authgate_auth::{Permission, PermissionQuery};
use authgate_core::{OrganizationId, ResourceId, RoleId, UserId};
use authgate_events::PermissionMutation;
use authgate_infra::{InMemoryPermissionStore, PermissionStoreError, RoleDefinition};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct CreateArticleRequest {
    pub title: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ScopeQuery {
    pub organization_id: Option<OrganizationId>,
}

/// `GET /admin/explain` query string. Permission lists are comma-separated.
#[derive(Debug, Deserialize)]
pub struct ExplainRequest {
    pub user_id: UserId,
    pub organization_id: Option<OrganizationId>,
    #[serde(default)]
    pub all: Option<String>,
    #[serde(default)]
    pub any: Option<String>,
    #[serde(default)]
    pub none: Option<String>,
}

fn split_permissions(raw: Option<&str>) -> Vec<Permission> {
    raw.unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| Permission::new(p.to_string()))
        .collect()
}

impl ExplainRequest {
    pub fn query(&self) -> PermissionQuery {
        let query = PermissionQuery::new()
            .all(split_permissions(self.all.as_deref()))
            .any(split_permissions(self.any.as_deref()))
            .none(split_permissions(self.none.as_deref()));

        match self.organization_id {
            Some(org) => query.in_organization(org),
            None => query,
        }
    }
}

/// A change to role/grant state, applied to the reference store by
/// `POST /admin/mutations`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreChange {
    DefineRole {
        role_id: RoleId,
        name: String,
        #[serde(default)]
        organization_id: Option<OrganizationId>,
        #[serde(default)]
        permissions: BTreeSet<Permission>,
    },
    SetRolePermissions {
        role_id: RoleId,
        permissions: BTreeSet<Permission>,
    },
    AssignRole {
        user_id: UserId,
        role_id: RoleId,
    },
    RemoveRole {
        user_id: UserId,
        role_id: RoleId,
    },
    SetOverwrite {
        resource_id: ResourceId,
        organization_id: OrganizationId,
        user_id: UserId,
        #[serde(default)]
        allow: BTreeSet<Permission>,
        #[serde(default)]
        deny: BTreeSet<Permission>,
    },
    ClearOverwrite {
        resource_id: ResourceId,
        user_id: UserId,
    },
}

impl StoreChange {
    /// Commit the change and return the mutation event describing it.
    pub fn apply(
        self,
        store: &InMemoryPermissionStore,
    ) -> Result<PermissionMutation, PermissionStoreError> {
        match self {
            StoreChange::DefineRole {
                role_id,
                name,
                organization_id,
                permissions,
            } => {
                store.upsert_role(RoleDefinition {
                    id: role_id,
                    name,
                    organization_id,
                    permissions,
                })?;
                Ok(PermissionMutation::role_permissions_updated(role_id))
            }
            StoreChange::SetRolePermissions { role_id, permissions } => {
                store.set_role_permissions(role_id, permissions)?;
                Ok(PermissionMutation::role_permissions_updated(role_id))
            }
            StoreChange::AssignRole { user_id, role_id } => {
                store.assign_role(user_id, role_id)?;
                Ok(PermissionMutation::role_assigned(user_id, role_id))
            }
            StoreChange::RemoveRole { user_id, role_id } => {
                store.remove_role(user_id, role_id)?;
                Ok(PermissionMutation::role_removed(user_id, role_id))
            }
            StoreChange::SetOverwrite {
                resource_id,
                organization_id,
                user_id,
                allow,
                deny,
            } => {
                store.set_overwrite(resource_id, organization_id, user_id, allow, deny)?;
                Ok(PermissionMutation::resource_overwrite_changed(resource_id))
            }
            StoreChange::ClearOverwrite { resource_id, user_id } => {
                store.clear_overwrite(resource_id, user_id)?;
                Ok(PermissionMutation::resource_overwrite_changed(resource_id))
            }
        }
    }
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Clone, Serialize)]
pub struct Article {
    pub id: Uuid,
    pub title: String,
    pub author_id: UserId,
    pub created_at: DateTime<Utc>,
}
