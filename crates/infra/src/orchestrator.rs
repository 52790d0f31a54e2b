//! Keeps cached permission sets consistent with role/permission mutations.
//!
//! Every mutation is handled by eager enumeration: work out which
//! `(user, scope)` entries depend on the changed data, then recompute and
//! replace each of them before `handle` returns. Refreshes are fault-isolated
//! per scope; a failure is logged and counted, never propagated to the
//! mutation that triggered it.
//!
//! A user's affected scopes are the ones the store knows about plus every
//! scope recorded in the user's cache index, since global roles shape the
//! set cached for any organization a route happened to query.

use std::collections::BTreeSet;
use std::sync::Arc;

use futures::StreamExt;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};

use authgate_auth::ResolvedPermissionSet;
use authgate_core::{OrganizationId, ResourceId, RoleId, UserId};
use authgate_events::{Event, PermissionMutation};

use crate::cache::CacheError;
use crate::permission_cache::{PermissionCache, RefreshError};
use crate::permission_store::{PermissionScope, PermissionStore, PermissionStoreError};

/// Refreshes run concurrently up to this many at a time.
pub const DEFAULT_REFRESH_CONCURRENCY: usize = 16;

/// Outcome of handling one mutation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RefreshReport {
    /// Scopes whose cache entry now holds a freshly computed set.
    pub refreshed: Vec<PermissionScope>,
    /// Scopes (or users, with `organization_id: None`) that could not be refreshed.
    pub failed: Vec<PermissionScope>,
    /// The affected users could not be enumerated at all.
    pub enumeration_failed: bool,
}

impl RefreshReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && !self.enumeration_failed
    }
}

/// Scopes a mutation touches, as far as they could be enumerated.
#[derive(Debug, Default)]
struct Fanout {
    scopes: BTreeSet<PermissionScope>,
    failed: Vec<PermissionScope>,
    enumeration_failed: bool,
}

impl Fanout {
    fn unknown() -> Self {
        Self {
            enumeration_failed: true,
            ..Self::default()
        }
    }
}

pub struct InvalidationOrchestrator {
    cache: Arc<PermissionCache>,
    store: Arc<dyn PermissionStore>,
    concurrency: usize,
}

impl core::fmt::Debug for InvalidationOrchestrator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("InvalidationOrchestrator")
            .field("concurrency", &self.concurrency)
            .finish_non_exhaustive()
    }
}

impl InvalidationOrchestrator {
    pub fn new(cache: Arc<PermissionCache>, store: Arc<dyn PermissionStore>) -> Self {
        Self {
            cache,
            store,
            concurrency: DEFAULT_REFRESH_CONCURRENCY,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn permission_cache(&self) -> &Arc<PermissionCache> {
        &self.cache
    }

    /// Diagnostic: is a fresh permission set cached for this scope?
    pub async fn is_cached(
        &self,
        user_id: UserId,
        organization_id: Option<OrganizationId>,
    ) -> Result<bool, CacheError> {
        self.cache
            .is_cached(PermissionScope::new(user_id, organization_id))
            .await
    }

    /// Manual invalidation: recompute and replace one scope's entry.
    pub async fn force_refresh(
        &self,
        user_id: UserId,
        organization_id: Option<OrganizationId>,
    ) -> Result<ResolvedPermissionSet, RefreshError> {
        let scope = PermissionScope::new(user_id, organization_id);
        let set = self.cache.refresh(scope).await?;
        info!(%scope, permissions = set.len(), "permission cache force-refreshed");
        Ok(set)
    }

    /// Like [`handle`](Self::handle), on its own task.
    ///
    /// Dropping the caller (or the returned handle) does not stop the refresh,
    /// so a committed mutation always reaches the cache.
    pub fn handle_detached(
        self: &Arc<Self>,
        mutation: PermissionMutation,
    ) -> JoinHandle<RefreshReport> {
        let orchestrator = Arc::clone(self);
        tokio::spawn(async move { orchestrator.handle(&mutation).await })
    }

    /// Apply one mutation. Never fails; see the returned report.
    #[instrument(skip_all, fields(event = mutation.event_type()))]
    pub async fn handle(&self, mutation: &PermissionMutation) -> RefreshReport {
        let fanout = match mutation {
            PermissionMutation::RoleAssigned(e) => {
                self.user_role_scopes(e.user_id, e.role_id).await
            }
            PermissionMutation::RoleRemoved(e) => self.user_role_scopes(e.user_id, e.role_id).await,
            PermissionMutation::RolePermissionsUpdated(e) => {
                self.role_holder_scopes(e.role_id).await
            }
            PermissionMutation::ResourceOverwriteChanged(e) => {
                self.resource_scopes(e.resource_id).await
            }
        };

        let mut report = self.refresh_all(fanout.scopes).await;
        report.failed.extend(fanout.failed);
        report.failed.sort();
        report.failed.dedup();
        report.enumeration_failed = fanout.enumeration_failed;

        if report.is_complete() {
            info!(refreshed = report.refreshed.len(), "permission mutation applied to cache");
        } else {
            warn!(
                refreshed = report.refreshed.len(),
                failed = report.failed.len(),
                "permission mutation partially applied to cache"
            );
        }

        report
    }

    /// Every scope of `user_id` that may hold a set: the store's view plus
    /// the scopes already cached.
    async fn scopes_of_user(
        &self,
        user_id: UserId,
    ) -> Result<BTreeSet<PermissionScope>, RefreshError> {
        let mut scopes: BTreeSet<PermissionScope> =
            self.store.scopes_of_user(user_id).await?.into_iter().collect();
        scopes.extend(self.cache.cached_scopes(user_id).await?);
        Ok(scopes)
    }

    /// Scopes for a role assigned to / removed from one user: all of the
    /// user's scopes plus the role's own scope (which the user may just have
    /// left).
    async fn user_role_scopes(&self, user_id: UserId, role_id: RoleId) -> Fanout {
        let mut scopes = BTreeSet::new();
        scopes.insert(PermissionScope::global(user_id));

        match self.store.role_organization(role_id).await {
            Ok(org) => {
                scopes.insert(PermissionScope::new(user_id, org));
            }
            Err(PermissionStoreError::RoleNotFound(_)) => {}
            Err(err) => warn!(%role_id, error = %err, "could not look up role scope"),
        }

        match self.scopes_of_user(user_id).await {
            Ok(found) => {
                scopes.extend(found);
                Fanout {
                    scopes,
                    ..Fanout::default()
                }
            }
            Err(err) => {
                warn!(
                    %user_id,
                    error = %err,
                    "could not enumerate user scopes; refreshing known scopes only"
                );
                Fanout {
                    scopes,
                    failed: Vec::new(),
                    enumeration_failed: true,
                }
            }
        }
    }

    /// Fan-out for an edited role definition: every holder, in the role's
    /// scope only if it is organization-scoped, otherwise in all their scopes.
    async fn role_holder_scopes(&self, role_id: RoleId) -> Fanout {
        let org = match self.store.role_organization(role_id).await {
            Ok(org) => org,
            Err(err) => {
                error!(
                    %role_id,
                    error = %err,
                    "could not look up edited role; no cache entries refreshed"
                );
                return Fanout::unknown();
            }
        };

        let holders = match self.store.role_holders(role_id).await {
            Ok(holders) => holders,
            Err(err) => {
                error!(
                    %role_id,
                    error = %err,
                    "could not enumerate role holders; no cache entries refreshed"
                );
                return Fanout::unknown();
            }
        };

        let mut fanout = Fanout::default();

        for user_id in holders {
            if org.is_some() {
                fanout.scopes.insert(PermissionScope::new(user_id, org));
                continue;
            }

            match self.scopes_of_user(user_id).await {
                Ok(found) => fanout.scopes.extend(found),
                Err(err) => {
                    warn!(%user_id, error = %err, "could not enumerate scopes of role holder");
                    fanout.failed.push(PermissionScope::global(user_id));
                }
            }
        }

        fanout
    }

    async fn resource_scopes(&self, resource_id: ResourceId) -> Fanout {
        match self.store.resource_scopes(resource_id).await {
            Ok(found) => Fanout {
                scopes: found.into_iter().collect(),
                ..Fanout::default()
            },
            Err(err) => {
                error!(
                    %resource_id,
                    error = %err,
                    "could not enumerate resource scopes; no cache entries refreshed"
                );
                Fanout::unknown()
            }
        }
    }

    async fn refresh_all(&self, scopes: BTreeSet<PermissionScope>) -> RefreshReport {
        let refreshes: Vec<_> = scopes
            .into_iter()
            .map(|scope| async move { (scope, self.cache.refresh(scope).await) })
            .collect();
        let results: Vec<(PermissionScope, Result<ResolvedPermissionSet, RefreshError>)> =
            futures::stream::iter(refreshes)
                .buffer_unordered(self.concurrency)
                .collect()
                .await;

        let mut report = RefreshReport::default();
        for (scope, result) in results {
            match result {
                Ok(_) => report.refreshed.push(scope),
                Err(err) => {
                    warn!(%scope, error = %err, "permission cache refresh failed");
                    report.failed.push(scope);
                }
            }
        }

        report.refreshed.sort();
        report.failed.sort();
        report
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::watch;

    use authgate_auth::{Permission, PermissionQuery, evaluate};

    use super::*;
    use crate::cache::{CacheStore, InMemoryCacheStore};
    use crate::permission_store::{InMemoryPermissionStore, RoleDefinition};

    /// Delegates to an in-memory store but fails `resolve` for chosen users.
    struct FlakyStore {
        inner: InMemoryPermissionStore,
        failing: Mutex<HashSet<UserId>>,
    }

    #[async_trait]
    impl PermissionStore for FlakyStore {
        async fn resolve(
            &self,
            user_id: UserId,
            organization_id: Option<OrganizationId>,
        ) -> Result<ResolvedPermissionSet, PermissionStoreError> {
            if self.failing.lock().unwrap().contains(&user_id) {
                return Err(PermissionStoreError::Storage("connection reset".to_string()));
            }
            self.inner.resolve(user_id, organization_id).await
        }

        async fn scopes_of_user(
            &self,
            user_id: UserId,
        ) -> Result<Vec<PermissionScope>, PermissionStoreError> {
            self.inner.scopes_of_user(user_id).await
        }

        async fn role_organization(
            &self,
            role_id: RoleId,
        ) -> Result<Option<OrganizationId>, PermissionStoreError> {
            self.inner.role_organization(role_id).await
        }

        async fn role_holders(&self, role_id: RoleId) -> Result<Vec<UserId>, PermissionStoreError> {
            self.inner.role_holders(role_id).await
        }

        async fn resource_scopes(
            &self,
            resource_id: ResourceId,
        ) -> Result<Vec<PermissionScope>, PermissionStoreError> {
            self.inner.resource_scopes(resource_id).await
        }
    }

    /// In-memory cache whose writes wait until the gate is opened.
    struct GatedCache {
        inner: InMemoryCacheStore,
        open: watch::Sender<bool>,
    }

    #[async_trait]
    impl CacheStore for GatedCache {
        async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
            let mut open = self.open.subscribe();
            open.wait_for(|open| *open)
                .await
                .map_err(|_| CacheError::Connection("gate closed".to_string()))?;
            self.inner.set(key, value, ttl).await
        }

        async fn delete(&self, key: &str) -> Result<bool, CacheError> {
            self.inner.delete(key).await
        }

        async fn ttl(&self, key: &str) -> Result<Option<Duration>, CacheError> {
            self.inner.ttl(key).await
        }
    }

    struct Harness {
        store: Arc<FlakyStore>,
        orchestrator: InvalidationOrchestrator,
    }

    impl Harness {
        fn new() -> Self {
            let cache = Arc::new(InMemoryCacheStore::new());
            let store = Arc::new(FlakyStore {
                inner: InMemoryPermissionStore::new(),
                failing: Mutex::new(HashSet::new()),
            });
            let pc = Arc::new(PermissionCache::new(
                cache,
                store.clone(),
                Duration::from_secs(3600),
            ));
            let orchestrator = InvalidationOrchestrator::new(pc, store.clone()).with_concurrency(4);
            Self { store, orchestrator }
        }

        fn role(&self, org: Option<OrganizationId>, names: &[&'static str]) -> RoleId {
            let id = RoleId::new();
            self.store
                .inner
                .upsert_role(RoleDefinition {
                    id,
                    name: format!("role-{id}"),
                    organization_id: org,
                    permissions: names.iter().copied().map(Permission::new).collect(),
                })
                .unwrap();
            id
        }

        async fn cached(&self, user: UserId, org: Option<OrganizationId>) -> ResolvedPermissionSet {
            self.orchestrator
                .permission_cache()
                .resolve(PermissionScope::new(user, org))
                .await
                .unwrap()
        }
    }

    #[tokio::test]
    async fn role_assignment_is_visible_immediately() {
        let h = Harness::new();
        let user = UserId::new();
        let role = h.role(None, &["A", "B"]);

        // Warm the cache with the pre-grant (empty) set.
        assert!(h.cached(user, None).await.is_empty());

        h.store.inner.assign_role(user, role).unwrap();
        let report = h
            .orchestrator
            .handle(&PermissionMutation::role_assigned(user, role))
            .await;

        assert!(report.is_complete());
        assert!(report.refreshed.contains(&PermissionScope::global(user)));
        let q = PermissionQuery::new().all(["A"]);
        assert!(evaluate(&q, &h.cached(user, None).await));
    }

    #[tokio::test]
    async fn global_role_grant_reaches_cached_org_scopes() {
        let h = Harness::new();
        let user = UserId::new();
        let org = OrganizationId::new();
        let role = h.role(None, &["REPORT_VIEW"]);

        // A route queried the org scope before the grant.
        assert!(h.cached(user, Some(org)).await.is_empty());

        h.store.inner.assign_role(user, role).unwrap();
        let report = h
            .orchestrator
            .handle(&PermissionMutation::role_assigned(user, role))
            .await;

        assert!(report.refreshed.contains(&PermissionScope::new(user, Some(org))));
        assert!(h.cached(user, Some(org)).await.contains(&Permission::new("REPORT_VIEW")));
    }

    #[tokio::test]
    async fn global_role_removal_revokes_in_cached_org_scopes() {
        let h = Harness::new();
        let user = UserId::new();
        let org = OrganizationId::new();
        let role = h.role(None, &["REPORT_VIEW"]);
        h.store.inner.assign_role(user, role).unwrap();
        assert!(h.cached(user, Some(org)).await.contains(&Permission::new("REPORT_VIEW")));

        h.store.inner.remove_role(user, role).unwrap();
        let report = h
            .orchestrator
            .handle(&PermissionMutation::role_removed(user, role))
            .await;

        assert!(report.is_complete());
        assert!(h.cached(user, Some(org)).await.is_empty());
    }

    #[tokio::test]
    async fn global_role_edit_reaches_cached_org_scopes() {
        let h = Harness::new();
        let user = UserId::new();
        let org = OrganizationId::new();
        let role = h.role(None, &["A"]);
        h.store.inner.assign_role(user, role).unwrap();
        assert!(!h.cached(user, Some(org)).await.contains(&Permission::new("B")));

        h.store
            .inner
            .set_role_permissions(role, BTreeSet::from([Permission::new("B")]))
            .unwrap();
        h.orchestrator
            .handle(&PermissionMutation::role_permissions_updated(role))
            .await;

        let set = h.cached(user, Some(org)).await;
        assert!(set.contains(&Permission::new("B")));
        assert!(!set.contains(&Permission::new("A")));
    }

    #[tokio::test]
    async fn detached_refresh_outlives_its_caller() {
        let (open, _) = watch::channel(true);
        let cache = Arc::new(GatedCache {
            inner: InMemoryCacheStore::new(),
            open,
        });
        let store = Arc::new(InMemoryPermissionStore::new());
        let pc = Arc::new(PermissionCache::new(
            cache.clone(),
            store.clone(),
            Duration::from_secs(3600),
        ));
        let orchestrator = Arc::new(InvalidationOrchestrator::new(pc.clone(), store.clone()));

        let user = UserId::new();
        let role = RoleId::new();
        store
            .upsert_role(RoleDefinition {
                id: role,
                name: "reader".to_string(),
                organization_id: None,
                permissions: BTreeSet::from([Permission::new("A")]),
            })
            .unwrap();
        let scope = PermissionScope::global(user);
        assert!(pc.resolve(scope).await.unwrap().is_empty());

        store.assign_role(user, role).unwrap();
        cache.open.send_replace(false);

        // The caller gives up while the refresh is stuck on the cache write.
        let caller = orchestrator.handle_detached(PermissionMutation::role_assigned(user, role));
        assert!(tokio::time::timeout(Duration::from_millis(20), caller).await.is_err());

        cache.open.send_replace(true);
        let mut refreshed = false;
        for _ in 0..100 {
            if pc.resolve(scope).await.unwrap().contains(&Permission::new("A")) {
                refreshed = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(refreshed);
    }

    #[tokio::test]
    async fn removing_last_org_role_refreshes_that_org_scope() {
        let h = Harness::new();
        let user = UserId::new();
        let org = OrganizationId::new();
        let role = h.role(Some(org), &["REPORT_VIEW"]);
        h.store.inner.assign_role(user, role).unwrap();
        assert!(h.cached(user, Some(org)).await.contains(&Permission::new("REPORT_VIEW")));

        h.store.inner.remove_role(user, role).unwrap();
        let report = h
            .orchestrator
            .handle(&PermissionMutation::role_removed(user, role))
            .await;

        assert!(report.refreshed.contains(&PermissionScope::new(user, Some(org))));
        assert!(h.cached(user, Some(org)).await.is_empty());
    }

    #[tokio::test]
    async fn role_edit_fans_out_to_every_holder() {
        let h = Harness::new();
        let role = h.role(None, &["A"]);
        let users: Vec<UserId> = (0..5).map(|_| UserId::new()).collect();
        for u in &users {
            h.store.inner.assign_role(*u, role).unwrap();
            assert!(!h.cached(*u, None).await.contains(&Permission::new("B")));
        }

        h.store
            .inner
            .set_role_permissions(role, ["A", "B"].into_iter().map(Permission::new).collect())
            .unwrap();
        let report = h
            .orchestrator
            .handle(&PermissionMutation::role_permissions_updated(role))
            .await;

        assert!(report.is_complete());
        assert_eq!(report.refreshed.len(), users.len());
        for u in &users {
            assert!(h.cached(*u, None).await.contains(&Permission::new("B")));
        }
    }

    #[tokio::test]
    async fn resource_overwrite_change_refreshes_listed_users() {
        let h = Harness::new();
        let org = OrganizationId::new();
        let channel = ResourceId::new();
        let user = UserId::new();

        h.store
            .inner
            .set_overwrite(channel, org, user, BTreeSet::new(), BTreeSet::new())
            .unwrap();
        assert!(h.cached(user, Some(org)).await.is_empty());

        h.store
            .inner
            .set_overwrite(
                channel,
                org,
                user,
                BTreeSet::from([Permission::new("MESSAGE_PIN")]),
                BTreeSet::new(),
            )
            .unwrap();
        let report = h
            .orchestrator
            .handle(&PermissionMutation::resource_overwrite_changed(channel))
            .await;

        assert_eq!(report.refreshed, vec![PermissionScope::new(user, Some(org))]);
        assert!(h.cached(user, Some(org)).await.contains(&Permission::new("MESSAGE_PIN")));
    }

    #[tokio::test]
    async fn one_failing_user_does_not_block_the_others() {
        let h = Harness::new();
        let role = h.role(None, &["A"]);
        let healthy = UserId::new();
        let broken = UserId::new();
        h.store.inner.assign_role(healthy, role).unwrap();
        h.store.inner.assign_role(broken, role).unwrap();
        h.store.failing.lock().unwrap().insert(broken);

        let report = h
            .orchestrator
            .handle(&PermissionMutation::role_permissions_updated(role))
            .await;

        assert!(!report.is_complete());
        assert_eq!(report.failed, vec![PermissionScope::global(broken)]);
        assert_eq!(report.refreshed, vec![PermissionScope::global(healthy)]);
        assert!(h.cached(healthy, None).await.contains(&Permission::new("A")));
    }

    #[tokio::test]
    async fn unknown_resource_is_reported_not_raised() {
        let h = Harness::new();
        let report = h
            .orchestrator
            .handle(&PermissionMutation::resource_overwrite_changed(ResourceId::new()))
            .await;

        assert!(report.enumeration_failed);
        assert!(report.refreshed.is_empty());
    }

    #[tokio::test]
    async fn force_refresh_is_idempotent() {
        let h = Harness::new();
        let user = UserId::new();
        let org = OrganizationId::new();
        let role = h.role(Some(org), &["A", "B"]);
        h.store.inner.assign_role(user, role).unwrap();

        assert!(!h.orchestrator.is_cached(user, Some(org)).await.unwrap());
        let first = h.orchestrator.force_refresh(user, Some(org)).await.unwrap();
        let second = h.orchestrator.force_refresh(user, Some(org)).await.unwrap();

        assert_eq!(first, second);
        assert!(h.orchestrator.is_cached(user, Some(org)).await.unwrap());
        assert!(!h.orchestrator.is_cached(user, None).await.unwrap());
    }
}
