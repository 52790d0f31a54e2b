use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use authgate_auth::{Permission, ResolvedPermissionSet};
use authgate_core::{OrganizationId, ResourceId, RoleId, UserId};

use super::{PermissionScope, PermissionStore, PermissionStoreError};

/// Persisted role definition: a named bundle of permissions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleDefinition {
    pub id: RoleId,
    pub name: String,
    /// Scoped roles only contribute to their organization; `None` = everywhere.
    pub organization_id: Option<OrganizationId>,
    pub permissions: BTreeSet<Permission>,
}

#[derive(Debug, Clone, Default)]
struct Overwrite {
    allow: BTreeSet<Permission>,
    deny: BTreeSet<Permission>,
}

#[derive(Debug, Clone)]
struct Resource {
    organization_id: OrganizationId,
    overwrites: BTreeMap<UserId, Overwrite>,
}

#[derive(Debug, Default)]
struct State {
    roles: HashMap<RoleId, RoleDefinition>,
    assignments: HashMap<UserId, BTreeSet<RoleId>>,
    grants: HashMap<(UserId, Option<OrganizationId>), BTreeSet<Permission>>,
    resources: HashMap<ResourceId, Resource>,
}

/// In-memory role/grant store for tests/dev.
///
/// Resolution for `(user, scope)`:
/// 1. permissions of assigned roles that are global or scoped to `scope`
/// 2. direct grants in the global scope and in `scope`
/// 3. for an organization scope: `allow` then `deny` overwrites of every
///    resource in that organization that names the user
///
/// Mutators only change stored state. Publishing the matching
/// `PermissionMutation` is the caller's job.
#[derive(Debug, Default)]
pub struct InMemoryPermissionStore {
    inner: RwLock<State>,
}

fn poisoned<T>(_: T) -> PermissionStoreError {
    PermissionStoreError::Storage("permission store lock poisoned".to_string())
}

impl InMemoryPermissionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert_role(&self, role: RoleDefinition) -> Result<(), PermissionStoreError> {
        let mut state = self.inner.write().map_err(poisoned)?;
        state.roles.insert(role.id, role);
        Ok(())
    }

    pub fn set_role_permissions(
        &self,
        role_id: RoleId,
        permissions: BTreeSet<Permission>,
    ) -> Result<(), PermissionStoreError> {
        let mut state = self.inner.write().map_err(poisoned)?;
        let role = state
            .roles
            .get_mut(&role_id)
            .ok_or(PermissionStoreError::RoleNotFound(role_id))?;
        role.permissions = permissions;
        Ok(())
    }

    pub fn assign_role(
        &self,
        user_id: UserId,
        role_id: RoleId,
    ) -> Result<(), PermissionStoreError> {
        let mut state = self.inner.write().map_err(poisoned)?;
        if !state.roles.contains_key(&role_id) {
            return Err(PermissionStoreError::RoleNotFound(role_id));
        }
        state.assignments.entry(user_id).or_default().insert(role_id);
        Ok(())
    }

    /// Returns whether the user held the role.
    pub fn remove_role(
        &self,
        user_id: UserId,
        role_id: RoleId,
    ) -> Result<bool, PermissionStoreError> {
        let mut state = self.inner.write().map_err(poisoned)?;
        Ok(state
            .assignments
            .get_mut(&user_id)
            .is_some_and(|roles| roles.remove(&role_id)))
    }

    pub fn grant(
        &self,
        user_id: UserId,
        organization_id: Option<OrganizationId>,
        permission: Permission,
    ) -> Result<(), PermissionStoreError> {
        let mut state = self.inner.write().map_err(poisoned)?;
        state
            .grants
            .entry((user_id, organization_id))
            .or_default()
            .insert(permission);
        Ok(())
    }

    pub fn set_overwrite(
        &self,
        resource_id: ResourceId,
        organization_id: OrganizationId,
        user_id: UserId,
        allow: BTreeSet<Permission>,
        deny: BTreeSet<Permission>,
    ) -> Result<(), PermissionStoreError> {
        let mut state = self.inner.write().map_err(poisoned)?;
        let resource = state.resources.entry(resource_id).or_insert_with(|| Resource {
            organization_id,
            overwrites: BTreeMap::new(),
        });
        resource.overwrites.insert(user_id, Overwrite { allow, deny });
        Ok(())
    }

    /// Empties the user's overwrite on a resource.
    ///
    /// The user stays listed on the resource so a later fan-out still reaches
    /// the permission set the overwrite used to shape.
    pub fn clear_overwrite(
        &self,
        resource_id: ResourceId,
        user_id: UserId,
    ) -> Result<(), PermissionStoreError> {
        let mut state = self.inner.write().map_err(poisoned)?;
        let resource = state
            .resources
            .get_mut(&resource_id)
            .ok_or(PermissionStoreError::ResourceNotFound(resource_id))?;
        if let Some(ow) = resource.overwrites.get_mut(&user_id) {
            *ow = Overwrite::default();
        }
        Ok(())
    }
}

impl State {
    fn role_applies(role: &RoleDefinition, organization_id: Option<OrganizationId>) -> bool {
        role.organization_id.is_none() || role.organization_id == organization_id
    }

    fn resolve(
        &self,
        user_id: UserId,
        organization_id: Option<OrganizationId>,
    ) -> ResolvedPermissionSet {
        let mut set = ResolvedPermissionSet::new();

        if let Some(role_ids) = self.assignments.get(&user_id) {
            for role in role_ids.iter().filter_map(|id| self.roles.get(id)) {
                if Self::role_applies(role, organization_id) {
                    set.extend(role.permissions.iter().cloned());
                }
            }
        }

        if let Some(global) = self.grants.get(&(user_id, None)) {
            set.extend(global.iter().cloned());
        }

        let Some(org) = organization_id else {
            return set;
        };

        if let Some(scoped) = self.grants.get(&(user_id, Some(org))) {
            set.extend(scoped.iter().cloned());
        }

        let overwrites: Vec<&Overwrite> = self
            .resources
            .values()
            .filter(|r| r.organization_id == org)
            .filter_map(|r| r.overwrites.get(&user_id))
            .collect();

        for ow in &overwrites {
            set.extend(ow.allow.iter().cloned());
        }
        for ow in &overwrites {
            for p in &ow.deny {
                set.remove(p);
            }
        }

        set
    }

    fn scopes_of_user(&self, user_id: UserId) -> BTreeSet<PermissionScope> {
        let mut scopes = BTreeSet::new();
        scopes.insert(PermissionScope::global(user_id));

        if let Some(role_ids) = self.assignments.get(&user_id) {
            for role in role_ids.iter().filter_map(|id| self.roles.get(id)) {
                if let Some(org) = role.organization_id {
                    scopes.insert(PermissionScope::new(user_id, Some(org)));
                }
            }
        }

        for (uid, org) in self.grants.keys() {
            if *uid == user_id && org.is_some() {
                scopes.insert(PermissionScope::new(user_id, *org));
            }
        }

        for resource in self.resources.values() {
            if resource.overwrites.contains_key(&user_id) {
                scopes.insert(PermissionScope::new(user_id, Some(resource.organization_id)));
            }
        }

        scopes
    }
}

#[async_trait]
impl PermissionStore for InMemoryPermissionStore {
    async fn resolve(
        &self,
        user_id: UserId,
        organization_id: Option<OrganizationId>,
    ) -> Result<ResolvedPermissionSet, PermissionStoreError> {
        let state = self.inner.read().map_err(poisoned)?;
        Ok(state.resolve(user_id, organization_id))
    }

    async fn scopes_of_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<PermissionScope>, PermissionStoreError> {
        let state = self.inner.read().map_err(poisoned)?;
        Ok(state.scopes_of_user(user_id).into_iter().collect())
    }

    async fn role_organization(
        &self,
        role_id: RoleId,
    ) -> Result<Option<OrganizationId>, PermissionStoreError> {
        let state = self.inner.read().map_err(poisoned)?;
        state
            .roles
            .get(&role_id)
            .map(|r| r.organization_id)
            .ok_or(PermissionStoreError::RoleNotFound(role_id))
    }

    async fn role_holders(&self, role_id: RoleId) -> Result<Vec<UserId>, PermissionStoreError> {
        let state = self.inner.read().map_err(poisoned)?;
        if !state.roles.contains_key(&role_id) {
            return Err(PermissionStoreError::RoleNotFound(role_id));
        }
        let mut holders: Vec<UserId> = state
            .assignments
            .iter()
            .filter(|(_, roles)| roles.contains(&role_id))
            .map(|(user_id, _)| *user_id)
            .collect();
        holders.sort();
        Ok(holders)
    }

    async fn resource_scopes(
        &self,
        resource_id: ResourceId,
    ) -> Result<Vec<PermissionScope>, PermissionStoreError> {
        let state = self.inner.read().map_err(poisoned)?;
        let resource = state
            .resources
            .get(&resource_id)
            .ok_or(PermissionStoreError::ResourceNotFound(resource_id))?;
        Ok(resource
            .overwrites
            .keys()
            .map(|user_id| PermissionScope::new(*user_id, Some(resource.organization_id)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn perms(names: &[&'static str]) -> BTreeSet<Permission> {
        names.iter().copied().map(Permission::new).collect()
    }

    fn role(name: &str, org: Option<OrganizationId>, names: &[&'static str]) -> RoleDefinition {
        RoleDefinition {
            id: RoleId::new(),
            name: name.to_string(),
            organization_id: org,
            permissions: perms(names),
        }
    }

    #[tokio::test]
    async fn global_roles_apply_everywhere_scoped_roles_only_in_their_org() {
        let store = InMemoryPermissionStore::new();
        let org = OrganizationId::new();
        let user = UserId::new();

        let writer = role("writer", None, &["ARTICLE_CREATE"]);
        let moderator = role("moderator", Some(org), &["ARTICLE_DELETE"]);
        store.upsert_role(writer.clone()).unwrap();
        store.upsert_role(moderator.clone()).unwrap();
        store.assign_role(user, writer.id).unwrap();
        store.assign_role(user, moderator.id).unwrap();

        let global = store.resolve(user, None).await.unwrap();
        assert!(global.contains(&Permission::new("ARTICLE_CREATE")));
        assert!(!global.contains(&Permission::new("ARTICLE_DELETE")));

        let scoped = store.resolve(user, Some(org)).await.unwrap();
        assert!(scoped.contains(&Permission::new("ARTICLE_CREATE")));
        assert!(scoped.contains(&Permission::new("ARTICLE_DELETE")));

        let scopes = store.scopes_of_user(user).await.unwrap();
        assert_eq!(
            scopes,
            vec![PermissionScope::global(user), PermissionScope::new(user, Some(org))]
        );
    }

    #[tokio::test]
    async fn overwrite_deny_wins_over_allow_and_roles() {
        let store = InMemoryPermissionStore::new();
        let org = OrganizationId::new();
        let user = UserId::new();
        let base = role("member", None, &["MESSAGE_SEND"]);
        store.upsert_role(base.clone()).unwrap();
        store.assign_role(user, base.id).unwrap();

        let channel = ResourceId::new();
        store
            .set_overwrite(channel, org, user, perms(&["MESSAGE_PIN"]), perms(&["MESSAGE_SEND"]))
            .unwrap();

        let scoped = store.resolve(user, Some(org)).await.unwrap();
        assert!(scoped.contains(&Permission::new("MESSAGE_PIN")));
        assert!(!scoped.contains(&Permission::new("MESSAGE_SEND")));

        store.clear_overwrite(channel, user).unwrap();
        let scoped = store.resolve(user, Some(org)).await.unwrap();
        assert!(scoped.contains(&Permission::new("MESSAGE_SEND")));
        assert_eq!(
            store.resource_scopes(channel).await.unwrap(),
            vec![PermissionScope::new(user, Some(org))]
        );
    }

    #[tokio::test]
    async fn unknown_role_is_reported() {
        let store = InMemoryPermissionStore::new();
        let missing = RoleId::new();
        assert!(matches!(
            store.assign_role(UserId::new(), missing),
            Err(PermissionStoreError::RoleNotFound(id)) if id == missing
        ));
        assert!(store.role_holders(missing).await.is_err());
    }
}
