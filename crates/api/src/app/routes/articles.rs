//! Demo content routes gated by permission queries.

use std::sync::Arc;

use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use chrono::Utc;
use uuid::Uuid;

use crate::app::dto::{Article, CreateArticleRequest};
use crate::app::{errors, services::AppServices};
use crate::context::PrincipalContext;

/// GET /articles
pub async fn list_articles(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    match services.articles.read() {
        Ok(articles) => {
            (StatusCode::OK, Json(serde_json::json!({ "articles": *articles }))).into_response()
        }
        Err(_) => poisoned(),
    }
}

/// POST /articles
pub async fn create_article(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<CreateArticleRequest>,
) -> axum::response::Response {
    let title = body.title.trim();
    if title.is_empty() {
        return errors::json_error(
            StatusCode::BAD_REQUEST,
            "validation_error",
            "title must not be empty",
        );
    }

    let article = Article {
        id: Uuid::now_v7(),
        title: title.to_string(),
        author_id: principal.user_id(),
        created_at: Utc::now(),
    };

    match services.articles.write() {
        Ok(mut articles) => {
            articles.push(article.clone());
            (StatusCode::CREATED, Json(article)).into_response()
        }
        Err(_) => poisoned(),
    }
}

fn poisoned() -> axum::response::Response {
    errors::json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal", "article store poisoned")
}
