//! Infrastructure layer: cache backends, permission storage, session
//! liveness and the permission cache invalidation machinery.

pub mod cache;
pub mod orchestrator;
pub mod permission_cache;
pub mod permission_store;
pub mod session;
pub mod workers;

pub use cache::{CacheError, CacheStore, InMemoryCacheStore};
#[cfg(feature = "redis")]
pub use cache::RedisCacheStore;
pub use orchestrator::{DEFAULT_REFRESH_CONCURRENCY, InvalidationOrchestrator, RefreshReport};
pub use permission_cache::{
    DEFAULT_PERMISSION_TTL, PermissionCache, RefreshError, permission_key, scope_index_key,
};
pub use permission_store::{
    InMemoryPermissionStore, PermissionScope, PermissionStore, PermissionStoreError, RoleDefinition,
};
pub use session::{SessionError, SessionRegistry, session_key};
pub use workers::{MutationWorker, WorkerHandle};
