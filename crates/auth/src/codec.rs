//! Signed token encoding/verification.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use thiserror::Error;

use crate::{AuthClaims, TokenValidationError, validate_claims};

#[derive(Debug, Error)]
pub enum CodecError {
    /// No (or an empty) signing secret was configured. Fatal at startup.
    #[error("token signing secret is missing or empty")]
    MissingSecret,

    /// Signature mismatch, malformed token or payload.
    #[error("token could not be decoded: {0}")]
    Malformed(#[from] jsonwebtoken::errors::Error),

    /// Signature verified, but the claim time window is invalid.
    #[error(transparent)]
    Claims(#[from] TokenValidationError),
}

/// Signs and verifies access tokens.
///
/// Verification never reports *why* a token was rejected beyond the error
/// value; callers must collapse every failure into one outward outcome.
pub trait TokenCodec: Send + Sync {
    /// Sign `claims` into a compact token.
    fn encode(&self, claims: &AuthClaims) -> Result<String, CodecError>;

    /// Verify signature and time window of `token` at `now`.
    fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<AuthClaims, CodecError>;
}

/// HS256 JWT codec backed by a shared secret.
pub struct Hs256TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    leeway: Duration,
}

impl Hs256TokenCodec {
    /// Build a codec from a raw secret. An empty secret is a configuration error.
    pub fn new(secret: impl AsRef<[u8]>) -> Result<Self, CodecError> {
        let secret = secret.as_ref();
        if secret.is_empty() {
            return Err(CodecError::MissingSecret);
        }

        // Expiry is checked by `validate_claims` against the caller's clock.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "iat", "sub"]);

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            leeway: Duration::zero(),
        })
    }

    /// Tolerate issuer clocks running up to `leeway` ahead of ours.
    pub fn with_leeway(mut self, leeway: Duration) -> Self {
        self.leeway = leeway;
        self
    }
}

impl core::fmt::Debug for Hs256TokenCodec {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Hs256TokenCodec")
            .field("leeway", &self.leeway)
            .finish_non_exhaustive()
    }
}

impl TokenCodec for Hs256TokenCodec {
    fn encode(&self, claims: &AuthClaims) -> Result<String, CodecError> {
        Ok(jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            claims,
            &self.encoding_key,
        )?)
    }

    fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<AuthClaims, CodecError> {
        let data = jsonwebtoken::decode::<AuthClaims>(token, &self.decoding_key, &self.validation)?;
        validate_claims(&data.claims, now, self.leeway)?;
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use authgate_core::{SessionId, UserId};

    use super::*;
    use crate::Role;

    fn claims(now: DateTime<Utc>, ttl: Duration) -> AuthClaims {
        AuthClaims {
            user_id: UserId::new(),
            session_id: SessionId::new(),
            role: Role::new("member"),
            issued_at: now,
            expires_at: now + ttl,
        }
    }

    #[test]
    fn empty_secret_is_a_configuration_error() {
        assert!(matches!(Hs256TokenCodec::new(""), Err(CodecError::MissingSecret)));
    }

    #[test]
    fn verifies_token_it_signed() {
        let codec = Hs256TokenCodec::new("secret").unwrap();
        let now = Utc::now();
        let c = claims(now, Duration::minutes(10));

        let token = codec.encode(&c).unwrap();
        let decoded = codec.verify(&token, now).unwrap();

        assert_eq!(decoded.user_id, c.user_id);
        assert_eq!(decoded.session_id, c.session_id);
        assert_eq!(decoded.role, c.role);
        assert_eq!(decoded.expires_at.timestamp(), c.expires_at.timestamp());
    }

    #[test]
    fn rejects_foreign_signature() {
        let issuer = Hs256TokenCodec::new("issuer-secret").unwrap();
        let verifier = Hs256TokenCodec::new("other-secret").unwrap();
        let now = Utc::now();

        let token = issuer.encode(&claims(now, Duration::minutes(10))).unwrap();
        assert!(matches!(verifier.verify(&token, now), Err(CodecError::Malformed(_))));
    }

    #[test]
    fn rejects_expired_token() {
        let codec = Hs256TokenCodec::new("secret").unwrap();
        let now = Utc::now();
        let token = codec.encode(&claims(now, Duration::minutes(1))).unwrap();

        let later = now + Duration::minutes(2);
        assert!(matches!(
            codec.verify(&token, later),
            Err(CodecError::Claims(TokenValidationError::Expired))
        ));
    }

    #[test]
    fn rejects_garbage() {
        let codec = Hs256TokenCodec::new("secret").unwrap();
        assert!(codec.verify("not.a.jwt", Utc::now()).is_err());
        assert!(codec.verify("", Utc::now()).is_err());
    }
}
