//! `authgate-auth`: pure authentication/authorization boundary.
//!
//! This crate is intentionally decoupled from HTTP and storage: it verifies
//! tokens, and evaluates role and permission policy against values that the
//! caller has already resolved.

pub mod authorize;
pub mod claims;
pub mod codec;
pub mod error;
pub mod permissions;
pub mod principal;
pub mod roles;

pub use authorize::{
    AuthorizationExplanation, DenialKind, DenialReason, authorize_query, check_role, evaluate,
    explain,
};
pub use claims::{AuthClaims, TokenValidationError, validate_claims};
pub use codec::{CodecError, Hs256TokenCodec, TokenCodec};
pub use error::{AuthError, UnauthenticatedCode};
pub use permissions::{Permission, PermissionQuery, ResolvedPermissionSet};
pub use principal::Principal;
pub use roles::Role;
