//! Route policy table.
//!
//! Built once at startup and handed to the auth middleware, which looks up the
//! policy of each request by its route identifier `"<METHOD> <matched path>"`.

use std::collections::HashMap;

use axum::http::Method;

use authgate_auth::{PermissionQuery, Role};

/// Authorization requirements of one route.
///
/// The default policy requires an authenticated caller with a live session and
/// nothing else.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoutePolicy {
    pub required_role: Option<Role>,
    pub permission_query: Option<PermissionQuery>,
}

impl RoutePolicy {
    pub fn authenticated() -> Self {
        Self::default()
    }

    pub fn role(role: Role) -> Self {
        Self {
            required_role: Some(role),
            permission_query: None,
        }
    }

    pub fn permissions(query: PermissionQuery) -> Self {
        Self {
            required_role: None,
            permission_query: Some(query),
        }
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.required_role = Some(role);
        self
    }

    pub fn with_permissions(mut self, query: PermissionQuery) -> Self {
        self.permission_query = Some(query);
        self
    }
}

/// Route identifier → policy.
#[derive(Debug, Clone, Default)]
pub struct RoutePolicies {
    policies: HashMap<String, RoutePolicy>,
    fallback: RoutePolicy,
}

impl RoutePolicies {
    pub fn new() -> Self {
        Self::default()
    }

    /// Identifier of a route, e.g. `"GET /orgs/:org_id/reports"`.
    pub fn route_id(method: &Method, path: &str) -> String {
        format!("{method} {path}")
    }

    /// Attach a policy to a route. A later call for the same route replaces it.
    pub fn with(mut self, method: Method, path: &str, policy: RoutePolicy) -> Self {
        self.policies.insert(Self::route_id(&method, path), policy);
        self
    }

    /// Policy of a route; routes without an entry only require authentication.
    pub fn policy_for(&self, method: &Method, path: &str) -> &RoutePolicy {
        self.policies
            .get(&Self::route_id(method, path))
            .unwrap_or(&self.fallback)
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_matches_method_and_path() {
        let policies = RoutePolicies::new()
            .with(
                Method::GET,
                "/articles",
                RoutePolicy::permissions(PermissionQuery::new().all(["ARTICLE_READ"])),
            )
            .with(
                Method::DELETE,
                "/admin/sessions/:user_id/:session_id",
                RoutePolicy::role(Role::new("admin")),
            );

        assert_eq!(policies.len(), 2);
        assert!(policies.policy_for(&Method::GET, "/articles").permission_query.is_some());
        assert_eq!(
            policies
                .policy_for(&Method::DELETE, "/admin/sessions/:user_id/:session_id")
                .required_role,
            Some(Role::new("admin"))
        );
    }

    #[test]
    fn unknown_routes_only_require_authentication() {
        let policies = RoutePolicies::new()
            .with(Method::POST, "/articles", RoutePolicy::role(Role::new("editor")));

        assert_eq!(policies.policy_for(&Method::GET, "/articles"), &RoutePolicy::authenticated());
        assert_eq!(policies.policy_for(&Method::GET, "/whoami"), &RoutePolicy::authenticated());
    }
}
