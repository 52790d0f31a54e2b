//! Composable request authorization pipeline.
//!
//! A pipeline is an ordered list of independent [`AuthStep`]s. Each step either
//! lets the request continue or rejects it with an [`AuthError`]; the first
//! rejection wins. Steps share one [`AuthContext`], through which the token
//! verification step hands the verified identity to the steps after it.
//!
//! ```text
//! VerifyToken → SessionLiveness → RoleGuard → PermissionGuard
//! ```
//!
//! Every step runs under a timeout. A step that does not finish in time fails
//! the request closed as `Unauthenticated`, and whatever it was doing is
//! dropped unapplied.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::HeaderMap;
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use authgate_auth::{AuthError, Principal, TokenCodec};
use authgate_infra::{PermissionCache, SessionRegistry};

use crate::policy::RoutePolicy;

mod steps;

pub use steps::{PermissionGuard, RoleGuard, SessionLiveness, VerifyToken, extract_bearer};

/// Per-request state shared by the steps of a pipeline.
#[derive(Debug)]
pub struct AuthContext<'a> {
    pub headers: &'a HeaderMap,
    pub policy: &'a RoutePolicy,
    pub now: DateTime<Utc>,
    /// Set by the verification step; `None` until then.
    pub principal: Option<Principal>,
}

impl<'a> AuthContext<'a> {
    pub fn new(headers: &'a HeaderMap, policy: &'a RoutePolicy, now: DateTime<Utc>) -> Self {
        Self {
            headers,
            policy,
            now,
            principal: None,
        }
    }
}

/// One independent check in the pipeline.
#[async_trait]
pub trait AuthStep: Send + Sync {
    /// Short name for logs and wiring errors.
    fn name(&self) -> &'static str;

    /// Whether the step reads the identity attached by an earlier step.
    fn requires_identity(&self) -> bool {
        true
    }

    /// Whether the step attaches the identity.
    fn provides_identity(&self) -> bool {
        false
    }

    async fn check(&self, ctx: &mut AuthContext<'_>) -> Result<(), AuthError>;
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PipelineError {
    #[error("step `{step}` needs an identity but runs before token verification")]
    IdentityRequiredBeforeVerification { step: &'static str },

    #[error("pipeline has no token verification step")]
    MissingVerification,
}

pub struct AuthPipeline {
    steps: Vec<Arc<dyn AuthStep>>,
    step_timeout: Duration,
}

impl core::fmt::Debug for AuthPipeline {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AuthPipeline")
            .field("steps", &self.steps.iter().map(|s| s.name()).collect::<Vec<_>>())
            .field("step_timeout", &self.step_timeout)
            .finish()
    }
}

impl AuthPipeline {
    /// Default bound on a single step.
    pub const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_millis(250);

    pub fn builder() -> AuthPipelineBuilder {
        AuthPipelineBuilder {
            steps: Vec::new(),
            step_timeout: Self::DEFAULT_STEP_TIMEOUT,
        }
    }

    /// Token verification, session liveness, role guard, permission guard.
    pub fn standard(
        codec: Arc<dyn TokenCodec>,
        sessions: SessionRegistry,
        permissions: Arc<PermissionCache>,
        step_timeout: Duration,
    ) -> Result<Self, PipelineError> {
        Self::builder()
            .step(VerifyToken::new(codec))
            .step(SessionLiveness::new(sessions))
            .step(RoleGuard)
            .step(PermissionGuard::new(permissions))
            .step_timeout(step_timeout)
            .build()
    }

    pub fn step_names(&self) -> Vec<&'static str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    /// Run every step in order against one request.
    ///
    /// Returns the verified principal when all steps pass.
    pub async fn authorize(
        &self,
        headers: &HeaderMap,
        policy: &RoutePolicy,
        now: DateTime<Utc>,
    ) -> Result<Principal, AuthError> {
        let mut ctx = AuthContext::new(headers, policy, now);

        for step in &self.steps {
            match tokio::time::timeout(self.step_timeout, step.check(&mut ctx)).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    debug!(step = step.name(), key = err.message_key(), "request rejected");
                    return Err(err);
                }
                Err(_) => {
                    warn!(
                        step = step.name(),
                        timeout_ms = self.step_timeout.as_millis() as u64,
                        "authorization step timed out; failing closed"
                    );
                    return Err(AuthError::unauthenticated());
                }
            }
        }

        ctx.principal.ok_or_else(AuthError::unauthenticated)
    }
}

pub struct AuthPipelineBuilder {
    steps: Vec<Arc<dyn AuthStep>>,
    step_timeout: Duration,
}

impl AuthPipelineBuilder {
    pub fn step(mut self, step: impl AuthStep + 'static) -> Self {
        self.steps.push(Arc::new(step));
        self
    }

    pub fn step_timeout(mut self, timeout: Duration) -> Self {
        self.step_timeout = timeout;
        self
    }

    /// Check the composition order and build the pipeline.
    pub fn build(self) -> Result<AuthPipeline, PipelineError> {
        let mut verified = false;

        for step in &self.steps {
            if step.requires_identity() && !verified {
                return Err(PipelineError::IdentityRequiredBeforeVerification { step: step.name() });
            }
            verified |= step.provides_identity();
        }

        if !verified {
            return Err(PipelineError::MissingVerification);
        }

        Ok(AuthPipeline {
            steps: self.steps,
            step_timeout: self.step_timeout,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use axum::http::{HeaderValue, header::AUTHORIZATION};
    use chrono::Duration as ChronoDuration;

    use authgate_auth::{
        AuthClaims, CodecError, Hs256TokenCodec, PermissionQuery, Role, UnauthenticatedCode,
    };
    use authgate_core::{SessionId, UserId};
    use authgate_infra::{CacheStore, InMemoryCacheStore, InMemoryPermissionStore};

    use super::*;

    const SECRET: &str = "pipeline-test-secret";

    /// Wraps the real codec and counts verification attempts.
    struct CountingCodec {
        inner: Hs256TokenCodec,
        verified: AtomicUsize,
    }

    impl TokenCodec for CountingCodec {
        fn encode(&self, claims: &AuthClaims) -> Result<String, CodecError> {
            self.inner.encode(claims)
        }

        fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<AuthClaims, CodecError> {
            self.verified.fetch_add(1, Ordering::SeqCst);
            self.inner.verify(token, now)
        }
    }

    /// Never finishes within any reasonable timeout.
    struct StallingStep;

    #[async_trait]
    impl AuthStep for StallingStep {
        fn name(&self) -> &'static str {
            "stalling"
        }

        async fn check(&self, _ctx: &mut AuthContext<'_>) -> Result<(), AuthError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }
    }

    struct Fixture {
        codec: Arc<CountingCodec>,
        cache: Arc<InMemoryCacheStore>,
        sessions: SessionRegistry,
        pipeline: AuthPipeline,
    }

    fn fixture() -> Fixture {
        let codec = Arc::new(CountingCodec {
            inner: Hs256TokenCodec::new(SECRET).unwrap(),
            verified: AtomicUsize::new(0),
        });
        let cache = Arc::new(InMemoryCacheStore::new());
        let sessions = SessionRegistry::new(cache.clone());
        let store = Arc::new(InMemoryPermissionStore::new());
        let permissions =
            Arc::new(PermissionCache::new(cache.clone(), store, Duration::from_secs(60)));
        let pipeline = AuthPipeline::standard(
            codec.clone(),
            sessions.clone(),
            permissions,
            Duration::from_millis(250),
        )
        .unwrap();

        Fixture {
            codec,
            cache,
            sessions,
            pipeline,
        }
    }

    fn claims(role: &'static str) -> AuthClaims {
        let now = Utc::now();
        AuthClaims {
            user_id: UserId::new(),
            session_id: SessionId::new(),
            role: Role::new(role),
            issued_at: now,
            expires_at: now + ChronoDuration::hours(1),
        }
    }

    fn bearer(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn builder_rejects_guard_before_verification() {
        let err = AuthPipeline::builder()
            .step(RoleGuard)
            .step(VerifyToken::new(Arc::new(Hs256TokenCodec::new(SECRET).unwrap())))
            .build()
            .unwrap_err();

        assert_eq!(err, PipelineError::IdentityRequiredBeforeVerification { step: "role_guard" });
    }

    #[test]
    fn builder_rejects_pipeline_without_verification() {
        assert_eq!(
            AuthPipeline::builder().build().unwrap_err(),
            PipelineError::MissingVerification
        );
    }

    #[test]
    fn standard_pipeline_order() {
        let f = fixture();
        assert_eq!(
            f.pipeline.step_names(),
            vec!["verify_token", "session_liveness", "role_guard", "permission_guard"]
        );
    }

    #[tokio::test]
    async fn live_session_is_accepted() {
        let f = fixture();
        let c = claims("member");
        f.sessions.register(&c, Utc::now()).await.unwrap();
        let token = f.codec.encode(&c).unwrap();

        let principal = f
            .pipeline
            .authorize(
                &bearer(&format!("Bearer {token}")),
                &RoutePolicy::authenticated(),
                Utc::now(),
            )
            .await
            .unwrap();

        assert_eq!(principal.user_id, c.user_id);
        assert_eq!(principal.session_id, c.session_id);
    }

    #[tokio::test]
    async fn non_bearer_headers_never_reach_the_codec() {
        let f = fixture();
        let token = f.codec.encode(&claims("member")).unwrap();

        for header in [
            format!("Basic {token}"),
            format!("bearer {token}"),
            format!("Token {token}"),
            "Bearer ".to_string(),
            token.clone(),
        ] {
            let err = f
                .pipeline
                .authorize(&bearer(&header), &RoutePolicy::authenticated(), Utc::now())
                .await
                .unwrap_err();
            assert_eq!(err, AuthError::unauthenticated());
        }

        let err = f
            .pipeline
            .authorize(&HeaderMap::new(), &RoutePolicy::authenticated(), Utc::now())
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::unauthenticated());
        assert_eq!(f.codec.verified.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn revoked_session_is_invalid_token() {
        let f = fixture();
        let c = claims("member");
        f.sessions.register(&c, Utc::now()).await.unwrap();
        let headers = bearer(&format!("Bearer {}", f.codec.encode(&c).unwrap()));

        f.sessions.revoke(c.user_id, c.session_id).await.unwrap();
        let err = f
            .pipeline
            .authorize(&headers, &RoutePolicy::authenticated(), Utc::now())
            .await
            .unwrap_err();

        assert_eq!(err, AuthError::Unauthenticated(UnauthenticatedCode::InvalidToken));
        assert_eq!(err.message_key(), "auth.INVALID_TOKEN");
    }

    #[tokio::test]
    async fn tampered_signature_is_unauthorized() {
        let f = fixture();
        let c = claims("member");
        f.sessions.register(&c, Utc::now()).await.unwrap();
        let other = Hs256TokenCodec::new("some-other-secret").unwrap();
        let headers = bearer(&format!("Bearer {}", other.encode(&c).unwrap()));

        let err = f
            .pipeline
            .authorize(&headers, &RoutePolicy::authenticated(), Utc::now())
            .await
            .unwrap_err();
        assert_eq!(err.message_key(), "auth.UNAUTHORIZED");
    }

    #[tokio::test]
    async fn role_and_permission_policies_forbid() {
        let f = fixture();
        let c = claims("member");
        f.sessions.register(&c, Utc::now()).await.unwrap();
        let headers = bearer(&format!("Bearer {}", f.codec.encode(&c).unwrap()));

        let admin_only = RoutePolicy::role(Role::new("admin"));
        assert_eq!(
            f.pipeline.authorize(&headers, &admin_only, Utc::now()).await,
            Err(AuthError::Forbidden)
        );

        let needs_read = RoutePolicy::permissions(PermissionQuery::new().all(["ARTICLE_READ"]));
        assert_eq!(
            f.pipeline.authorize(&headers, &needs_read, Utc::now()).await,
            Err(AuthError::Forbidden)
        );

        let vacuous = RoutePolicy::permissions(PermissionQuery::new().none(["ARTICLE_BANNED"]));
        assert!(f.pipeline.authorize(&headers, &vacuous, Utc::now()).await.is_ok());
    }

    #[tokio::test]
    async fn entry_without_positive_ttl_is_not_live() {
        let f = fixture();
        let c = claims("member");
        f.cache
            .set(
                &authgate_infra::session_key(c.user_id, c.session_id),
                "0".to_string(),
                Duration::ZERO,
            )
            .await
            .unwrap();
        let headers = bearer(&format!("Bearer {}", f.codec.encode(&c).unwrap()));

        assert_eq!(
            f.pipeline
                .authorize(&headers, &RoutePolicy::authenticated(), Utc::now())
                .await,
            Err(AuthError::invalid_token())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_step_fails_closed() {
        let codec: Arc<dyn TokenCodec> = Arc::new(Hs256TokenCodec::new(SECRET).unwrap());
        let pipeline = AuthPipeline::builder()
            .step(VerifyToken::new(codec.clone()))
            .step(StallingStep)
            .step_timeout(Duration::from_millis(50))
            .build()
            .unwrap();
        let headers = bearer(&format!("Bearer {}", codec.encode(&claims("member")).unwrap()));

        let err = pipeline
            .authorize(&headers, &RoutePolicy::authenticated(), Utc::now())
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::unauthenticated());
    }
}
