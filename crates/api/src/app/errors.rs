use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::IntoResponse;
use serde_json::json;

use authgate_auth::AuthError;
use authgate_infra::{PermissionStoreError, RefreshError};

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

// ─────────────────────────────────────────────────────────────────────────────
// Authorization failures
// ─────────────────────────────────────────────────────────────────────────────

/// Languages the message catalog ships.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    En,
    De,
    Fr,
}

/// First supported primary language tag in `Accept-Language`, in header order.
pub fn preferred_language(headers: &HeaderMap) -> Language {
    let Some(value) = headers
        .get(header::ACCEPT_LANGUAGE)
        .and_then(|v| v.to_str().ok())
    else {
        return Language::En;
    };

    value
        .split(',')
        .filter_map(|item| item.split(';').next())
        .map(|tag| tag.trim().split('-').next().unwrap_or("").to_ascii_lowercase())
        .find_map(|primary| match primary.as_str() {
            "en" => Some(Language::En),
            "de" => Some(Language::De),
            "fr" => Some(Language::Fr),
            _ => None,
        })
        .unwrap_or(Language::En)
}

/// Localized text for an auth message key.
pub fn localized_message(err: AuthError, lang: Language) -> &'static str {
    match (err.message_key(), lang) {
        ("auth.INVALID_TOKEN", Language::En) => "The session for this token is no longer valid.",
        ("auth.INVALID_TOKEN", Language::De) => "Die Sitzung dieses Tokens ist nicht mehr gültig.",
        ("auth.INVALID_TOKEN", Language::Fr) => "La session associée à ce jeton n'est plus valide.",
        ("auth.FORBIDDEN", Language::En) => "You do not have permission to access this resource.",
        ("auth.FORBIDDEN", Language::De) => "Sie haben keine Berechtigung für diese Ressource.",
        ("auth.FORBIDDEN", Language::Fr) => "Vous n'avez pas l'autorisation d'accéder à cette ressource.",
        (_, Language::De) => "Anmeldung erforderlich.",
        (_, Language::Fr) => "Authentification requise.",
        (_, Language::En) => "Authentication is required.",
    }
}

/// 401 for `Unauthenticated`, 403 for `Forbidden`; body carries the stable
/// message key plus text in the caller's language.
pub fn auth_error_response(err: AuthError, headers: &HeaderMap) -> axum::response::Response {
    let status = if err.is_unauthenticated() {
        StatusCode::UNAUTHORIZED
    } else {
        StatusCode::FORBIDDEN
    };

    let mut response = json_error(
        status,
        err.message_key(),
        localized_message(err, preferred_language(headers)),
    );
    if status == StatusCode::UNAUTHORIZED {
        response
            .headers_mut()
            .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
    }
    response
}

// ─────────────────────────────────────────────────────────────────────────────
// Operator route failures
// ─────────────────────────────────────────────────────────────────────────────

pub fn store_error_to_response(err: PermissionStoreError) -> axum::response::Response {
    match err {
        PermissionStoreError::RoleNotFound(id) => {
            json_error(StatusCode::NOT_FOUND, "role_not_found", format!("role {id} not found"))
        }
        PermissionStoreError::ResourceNotFound(id) => json_error(
            StatusCode::NOT_FOUND,
            "resource_not_found",
            format!("resource {id} not found"),
        ),
        PermissionStoreError::Storage(msg) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", msg)
        }
    }
}

pub fn refresh_error_to_response(err: RefreshError) -> axum::response::Response {
    match err {
        RefreshError::Store(e) => store_error_to_response(e),
        RefreshError::Cache(e) => {
            json_error(StatusCode::SERVICE_UNAVAILABLE, "cache_error", e.to_string())
        }
        RefreshError::Serialization(e) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "serialization_error", e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn accept(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT_LANGUAGE, HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn language_negotiation() {
        assert_eq!(preferred_language(&HeaderMap::new()), Language::En);
        assert_eq!(preferred_language(&accept("de-CH, en;q=0.8")), Language::De);
        assert_eq!(preferred_language(&accept("es, fr;q=0.5")), Language::Fr);
        assert_eq!(preferred_language(&accept("ja")), Language::En);
    }

    #[test]
    fn status_and_headers_follow_error_kind() {
        let unauth = auth_error_response(AuthError::invalid_token(), &HeaderMap::new());
        assert_eq!(unauth.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(unauth.headers()[header::WWW_AUTHENTICATE], "Bearer");

        let forbidden = auth_error_response(AuthError::Forbidden, &accept("fr"));
        assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);
        assert!(forbidden.headers().get(header::WWW_AUTHENTICATE).is_none());
    }

    #[test]
    fn every_key_is_translated() {
        for err in [
            AuthError::unauthenticated(),
            AuthError::invalid_token(),
            AuthError::Forbidden,
        ] {
            let en = localized_message(err, Language::En);
            assert_ne!(en, localized_message(err, Language::De));
            assert_ne!(en, localized_message(err, Language::Fr));
        }
    }
}
