//! Infrastructure wiring shared by the router and the binary.

use std::io;
use std::sync::{Arc, RwLock};

use tracing::info;

use authgate_auth::{CodecError, Hs256TokenCodec, TokenCodec};
use authgate_events::InMemoryMutationBus;
use authgate_infra::{
    CacheError, CacheStore, InMemoryCacheStore, InMemoryPermissionStore, InvalidationOrchestrator,
    MutationWorker, PermissionCache, SessionRegistry, WorkerHandle,
};

use crate::app::dto::Article;
use crate::config::ApiConfig;

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("token codec: {0}")]
    Codec(#[from] CodecError),

    #[error("cache: {0}")]
    Cache(#[from] CacheError),
}

pub struct AppServices {
    pub codec: Arc<dyn TokenCodec>,
    pub cache: Arc<dyn CacheStore>,
    pub sessions: SessionRegistry,
    pub permission_store: Arc<InMemoryPermissionStore>,
    pub permissions: Arc<PermissionCache>,
    pub orchestrator: Arc<InvalidationOrchestrator>,
    /// Mutations committed elsewhere arrive here and are drained by the
    /// mutation worker.
    pub mutations: InMemoryMutationBus,
    pub articles: RwLock<Vec<Article>>,
}

impl core::fmt::Debug for AppServices {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AppServices")
            .field("permissions", &self.permissions)
            .field("orchestrator", &self.orchestrator)
            .finish_non_exhaustive()
    }
}

impl AppServices {
    /// Wire services over the given cache backend.
    pub fn with_cache(
        config: &ApiConfig,
        cache: Arc<dyn CacheStore>,
    ) -> Result<Arc<Self>, StartupError> {
        let codec: Arc<dyn TokenCodec> = Arc::new(Hs256TokenCodec::new(&config.jwt_secret)?);
        let permission_store = Arc::new(InMemoryPermissionStore::new());
        let permissions = Arc::new(PermissionCache::new(
            cache.clone(),
            permission_store.clone(),
            config.permission_cache_ttl,
        ));
        let orchestrator = Arc::new(InvalidationOrchestrator::new(
            permissions.clone(),
            permission_store.clone(),
        ));

        Ok(Arc::new(Self {
            codec,
            sessions: SessionRegistry::new(cache.clone()),
            cache,
            permission_store,
            permissions,
            orchestrator,
            mutations: InMemoryMutationBus::new(),
            articles: RwLock::new(Vec::new()),
        }))
    }

    /// In-memory cache (dev/test).
    pub fn in_memory(config: &ApiConfig) -> Result<Arc<Self>, StartupError> {
        Self::with_cache(config, Arc::new(InMemoryCacheStore::new()))
    }

    /// Redis when configured and compiled in, in-memory otherwise.
    pub async fn from_config(config: &ApiConfig) -> Result<Arc<Self>, StartupError> {
        #[cfg(feature = "redis")]
        if let Some(url) = config.redis_url.as_deref() {
            let cache = authgate_infra::RedisCacheStore::connect(url).await?;
            info!("using redis cache store");
            return Self::with_cache(config, Arc::new(cache));
        }

        if config.redis_url.is_some() {
            tracing::warn!(
                "AUTHGATE_REDIS_URL is set but the `redis` feature is disabled; using in-memory cache"
            );
        }
        info!("using in-memory cache store");
        Self::in_memory(config)
    }

    /// Start draining `mutations` into the orchestrator.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn_mutation_worker(&self) -> io::Result<WorkerHandle> {
        let runtime = tokio::runtime::Handle::try_current().map_err(io::Error::other)?;
        MutationWorker::spawn(
            "permission-mutation-worker",
            &self.mutations,
            self.orchestrator.clone(),
            runtime,
        )
    }
}
