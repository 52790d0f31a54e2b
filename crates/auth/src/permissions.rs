use std::borrow::Cow;
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use authgate_core::OrganizationId;

/// Permission identifier.
///
/// Permissions are modeled as opaque capability names (e.g. `ARTICLE_CREATE`)
/// and compared exactly.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&'static str> for Permission {
    fn from(value: &'static str) -> Self {
        Self::new(value)
    }
}

/// Effective permission set of a user within one scope.
///
/// Computed by a permission store, cached as a whole and replaced as a whole.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResolvedPermissionSet(BTreeSet<Permission>);

impl ResolvedPermissionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, permission: &Permission) -> bool {
        self.0.contains(permission)
    }

    pub fn insert(&mut self, permission: Permission) -> bool {
        self.0.insert(permission)
    }

    pub fn remove(&mut self, permission: &Permission) -> bool {
        self.0.remove(permission)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Permission> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<P: Into<Permission>> FromIterator<P> for ResolvedPermissionSet {
    fn from_iter<I: IntoIterator<Item = P>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl Extend<Permission> for ResolvedPermissionSet {
    fn extend<I: IntoIterator<Item = Permission>>(&mut self, iter: I) {
        self.0.extend(iter);
    }
}

/// Route-level permission policy: `all` AND `any` AND NOT `none`.
///
/// An empty clause places no constraint. `organization_id` selects the scope
/// the caller's permission set is resolved in (global scope when absent).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PermissionQuery {
    pub all: BTreeSet<Permission>,
    pub any: BTreeSet<Permission>,
    pub none: BTreeSet<Permission>,
    pub organization_id: Option<OrganizationId>,
}

impl PermissionQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all<I, P>(mut self, permissions: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Permission>,
    {
        self.all.extend(permissions.into_iter().map(Into::into));
        self
    }

    pub fn any<I, P>(mut self, permissions: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Permission>,
    {
        self.any.extend(permissions.into_iter().map(Into::into));
        self
    }

    pub fn none<I, P>(mut self, permissions: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Permission>,
    {
        self.none.extend(permissions.into_iter().map(Into::into));
        self
    }

    pub fn in_organization(mut self, organization_id: OrganizationId) -> Self {
        self.organization_id = Some(organization_id);
        self
    }

    /// True when no clause constrains anything.
    pub fn is_unconstrained(&self) -> bool {
        self.all.is_empty() && self.any.is_empty() && self.none.is_empty()
    }
}
