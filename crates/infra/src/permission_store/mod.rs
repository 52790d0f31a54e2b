//! Permission store contract: resolves effective permission sets from
//! persisted roles and grants, and enumerates who a mutation affects.
//!
//! Persistence itself is owned elsewhere; this crate only consumes it.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use authgate_auth::ResolvedPermissionSet;
use authgate_core::{OrganizationId, ResourceId, RoleId, UserId};

mod in_memory;

pub use in_memory::{InMemoryPermissionStore, RoleDefinition};

/// One cached permission set: a user in a scope (`None` = global).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PermissionScope {
    pub user_id: UserId,
    pub organization_id: Option<OrganizationId>,
}

impl PermissionScope {
    pub fn new(user_id: UserId, organization_id: Option<OrganizationId>) -> Self {
        Self {
            user_id,
            organization_id,
        }
    }

    pub fn global(user_id: UserId) -> Self {
        Self::new(user_id, None)
    }
}

impl core::fmt::Display for PermissionScope {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self.organization_id {
            Some(org) => write!(f, "{}@{}", self.user_id, org),
            None => write!(f, "{}@global", self.user_id),
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum PermissionStoreError {
    #[error("role not found: {0}")]
    RoleNotFound(RoleId),

    #[error("resource not found: {0}")]
    ResourceNotFound(ResourceId),

    #[error("storage error: {0}")]
    Storage(String),
}

#[async_trait]
pub trait PermissionStore: Send + Sync {
    /// Effective permissions of `user_id` in `organization_id` (global when `None`).
    async fn resolve(
        &self,
        user_id: UserId,
        organization_id: Option<OrganizationId>,
    ) -> Result<ResolvedPermissionSet, PermissionStoreError>;

    /// Every scope `user_id` currently has a permission set in (always includes global).
    async fn scopes_of_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<PermissionScope>, PermissionStoreError>;

    /// Organization a role definition is scoped to (`None` for global roles).
    async fn role_organization(
        &self,
        role_id: RoleId,
    ) -> Result<Option<OrganizationId>, PermissionStoreError>;

    /// Users currently holding `role_id`.
    async fn role_holders(&self, role_id: RoleId) -> Result<Vec<UserId>, PermissionStoreError>;

    /// Scopes whose permission set depends on overwrites of `resource_id`.
    async fn resource_scopes(
        &self,
        resource_id: ResourceId,
    ) -> Result<Vec<PermissionScope>, PermissionStoreError>;
}

#[async_trait]
impl<S> PermissionStore for Arc<S>
where
    S: PermissionStore + ?Sized,
{
    async fn resolve(
        &self,
        user_id: UserId,
        organization_id: Option<OrganizationId>,
    ) -> Result<ResolvedPermissionSet, PermissionStoreError> {
        (**self).resolve(user_id, organization_id).await
    }

    async fn scopes_of_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<PermissionScope>, PermissionStoreError> {
        (**self).scopes_of_user(user_id).await
    }

    async fn role_organization(
        &self,
        role_id: RoleId,
    ) -> Result<Option<OrganizationId>, PermissionStoreError> {
        (**self).role_organization(role_id).await
    }

    async fn role_holders(&self, role_id: RoleId) -> Result<Vec<UserId>, PermissionStoreError> {
        (**self).role_holders(role_id).await
    }

    async fn resource_scopes(
        &self,
        resource_id: ResourceId,
    ) -> Result<Vec<PermissionScope>, PermissionStoreError> {
        (**self).resource_scopes(resource_id).await
    }
}
