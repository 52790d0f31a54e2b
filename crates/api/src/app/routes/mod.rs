use axum::{http::Method, routing::get, Router};

use authgate_auth::{PermissionQuery, Role};
use authgate_core::OrganizationId;

use crate::policy::{RoutePolicies, RoutePolicy};

pub mod admin;
pub mod articles;
pub mod reports;
pub mod system;

pub const ADMIN_ROLE: &str = "admin";

/// Router for all authenticated endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .route("/articles", get(articles::list_articles).post(articles::create_article))
        .route("/reports", get(reports::list_reports))
        .merge(admin::router())
}

/// Policy table for [`router`].
///
/// `reports_organization` scopes the reports permission check; the global
/// permission set is used when it is `None`.
pub fn policies(reports_organization: Option<OrganizationId>) -> RoutePolicies {
    let admin = || RoutePolicy::role(Role::new(ADMIN_ROLE));

    let reports = PermissionQuery::new().all(["REPORT_VIEW"]);
    let reports = match reports_organization {
        Some(org) => reports.in_organization(org),
        None => reports,
    };

    RoutePolicies::new()
        .with(
            Method::GET,
            "/articles",
            RoutePolicy::permissions(PermissionQuery::new().all(["ARTICLE_READ"])),
        )
        .with(
            Method::POST,
            "/articles",
            RoutePolicy::permissions(
                PermissionQuery::new()
                    .all(["ARTICLE_CREATE"])
                    .none(["ARTICLE_BANNED"]),
            ),
        )
        .with(Method::GET, "/reports", RoutePolicy::permissions(reports))
        .with(Method::DELETE, admin::SESSION_PATH, admin())
        .with(Method::POST, admin::REFRESH_PATH, admin())
        .with(Method::GET, admin::CACHED_PATH, admin())
        .with(Method::POST, admin::MUTATIONS_PATH, admin())
        .with(Method::POST, admin::PUBLISH_PATH, admin())
        .with(Method::GET, admin::EXPLAIN_PATH, admin())
}
