use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Role identifier used for coarse RBAC route gating.
///
/// Roles are opaque strings at this layer and are compared exactly. A route
/// requires at most one role; the mapping from persisted role definitions to
/// fine-grained permissions belongs to the permission store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(Cow<'static, str>);

impl Role {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
