//! Cached resolved permission sets.
//!
//! Each `(user, scope)` entry is either **Fresh** (within TTL) or **Expired**
//! (absent; recomputed lazily on the next read). Refreshes replace the whole
//! serialized set in one `set`, so readers see either the old or the new set,
//! never a mix.
//!
//! Within one process, fills and refreshes of the same scope are serialized
//! through a striped lock, so a lazy fill that read the store before a
//! mutation cannot overwrite the refresh that mutation triggered.
//!
//! Every scope written for a user is also recorded in the user's scope index
//! (`auth:user:<userId>:permissions:scopes`). A route may query any
//! organization, and global roles apply in all of them, so the index is the
//! only complete list of entries a mutation has to refresh. The index is
//! written before the entry and outlives it.

use std::collections::BTreeSet;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

use authgate_auth::ResolvedPermissionSet;
use authgate_core::{OrganizationId, UserId};

use crate::cache::{CacheError, CacheStore};
use crate::permission_store::{PermissionScope, PermissionStore, PermissionStoreError};

const LOCK_STRIPES: usize = 64;

/// Default lifetime of a cached permission set.
pub const DEFAULT_PERMISSION_TTL: Duration = Duration::from_secs(300);

/// Cache key of a user's scope index: `auth:user:<userId>:permissions:scopes`.
pub fn scope_index_key(user_id: UserId) -> String {
    format!("auth:user:{user_id}:permissions:scopes")
}

/// Cache key of a permission set: `auth:user:<userId>:permissions:<orgId|global>`.
pub fn permission_key(user_id: UserId, organization_id: Option<OrganizationId>) -> String {
    match organization_id {
        Some(org) => format!("auth:user:{user_id}:permissions:{org}"),
        None => format!("auth:user:{user_id}:permissions:global"),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RefreshError {
    #[error("permission store failed: {0}")]
    Store(#[from] PermissionStoreError),

    #[error("cache failed: {0}")]
    Cache(#[from] CacheError),

    #[error("permission set could not be serialized: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub struct PermissionCache {
    cache: Arc<dyn CacheStore>,
    store: Arc<dyn PermissionStore>,
    ttl: Duration,
    locks: Vec<Mutex<()>>,
    index_locks: Vec<Mutex<()>>,
}

impl core::fmt::Debug for PermissionCache {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PermissionCache")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl PermissionCache {
    pub fn new(cache: Arc<dyn CacheStore>, store: Arc<dyn PermissionStore>, ttl: Duration) -> Self {
        Self {
            cache,
            store,
            ttl,
            locks: (0..LOCK_STRIPES).map(|_| Mutex::new(())).collect(),
            index_locks: (0..LOCK_STRIPES).map(|_| Mutex::new(())).collect(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn lock_for(&self, scope: &PermissionScope) -> &Mutex<()> {
        &self.locks[stripe(scope)]
    }

    fn index_lock_for(&self, user_id: UserId) -> &Mutex<()> {
        &self.index_locks[stripe(&user_id)]
    }

    async fn read_index(
        &self,
        user_id: UserId,
    ) -> Result<BTreeSet<Option<OrganizationId>>, CacheError> {
        let key = scope_index_key(user_id);
        let Some(raw) = self.cache.get(&key).await? else {
            return Ok(BTreeSet::new());
        };

        match serde_json::from_str(&raw) {
            Ok(orgs) => Ok(orgs),
            Err(err) => {
                warn!(key, error = %err, "discarding undecodable scope index");
                Ok(BTreeSet::new())
            }
        }
    }

    /// Add `scope` to its user's index and push the index expiry past the
    /// entry about to be written.
    async fn remember_scope(&self, scope: PermissionScope) -> Result<(), RefreshError> {
        let _guard = self.index_lock_for(scope.user_id).lock().await;

        let mut orgs = self.read_index(scope.user_id).await?;
        orgs.insert(scope.organization_id);
        let payload = serde_json::to_string(&orgs)?;
        self.cache
            .set(&scope_index_key(scope.user_id), payload, self.ttl.saturating_mul(2))
            .await?;
        Ok(())
    }

    async fn read_cached(&self, key: &str) -> Result<Option<ResolvedPermissionSet>, CacheError> {
        let Some(raw) = self.cache.get(key).await? else {
            return Ok(None);
        };

        match serde_json::from_str(&raw) {
            Ok(set) => Ok(Some(set)),
            Err(err) => {
                warn!(key, error = %err, "discarding undecodable cached permission set");
                Ok(None)
            }
        }
    }

    async fn recompute(
        &self,
        scope: PermissionScope,
    ) -> Result<ResolvedPermissionSet, RefreshError> {
        let set = self.store.resolve(scope.user_id, scope.organization_id).await?;
        self.remember_scope(scope).await?;
        let payload = serde_json::to_string(&set)?;
        self.cache
            .set(&permission_key(scope.user_id, scope.organization_id), payload, self.ttl)
            .await?;
        Ok(set)
    }

    /// Read-through lookup: cached set if fresh, otherwise recompute and cache.
    #[instrument(level = "debug", skip(self), fields(scope = %scope))]
    pub async fn resolve(
        &self,
        scope: PermissionScope,
    ) -> Result<ResolvedPermissionSet, RefreshError> {
        let key = permission_key(scope.user_id, scope.organization_id);

        if let Some(set) = self.read_cached(&key).await? {
            return Ok(set);
        }

        let _guard = self.lock_for(&scope).lock().await;

        // A concurrent fill or refresh may have landed while we waited.
        if let Some(set) = self.read_cached(&key).await? {
            return Ok(set);
        }

        debug!("permission cache miss; recomputing");
        self.recompute(scope).await
    }

    /// Unconditionally recompute from the store and replace the cached entry.
    #[instrument(level = "debug", skip(self), fields(scope = %scope))]
    pub async fn refresh(
        &self,
        scope: PermissionScope,
    ) -> Result<ResolvedPermissionSet, RefreshError> {
        let _guard = self.lock_for(&scope).lock().await;
        self.recompute(scope).await
    }

    /// Whether a fresh entry exists for the scope.
    pub async fn is_cached(&self, scope: PermissionScope) -> Result<bool, CacheError> {
        Ok(self
            .cache
            .ttl(&permission_key(scope.user_id, scope.organization_id))
            .await?
            .is_some())
    }

    /// Every scope a permission set may currently be cached in for `user_id`.
    pub async fn cached_scopes(&self, user_id: UserId) -> Result<Vec<PermissionScope>, CacheError> {
        Ok(self
            .read_index(user_id)
            .await?
            .into_iter()
            .map(|org| PermissionScope::new(user_id, org))
            .collect())
    }
}

fn stripe<T: Hash + ?Sized>(value: &T) -> usize {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    usize::try_from(hasher.finish() % LOCK_STRIPES as u64).unwrap_or(0)
}
