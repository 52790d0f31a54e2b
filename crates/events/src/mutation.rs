//! Role/permission mutations that invalidate cached permission sets.
//!
//! These are emitted by whatever owns role and grant persistence, after the
//! change has been committed. Consumers must treat them as at-least-once.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use authgate_core::{ResourceId, RoleId, UserId};

use crate::Event;

/// A role was assigned to a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleAssigned {
    pub user_id: UserId,
    pub role_id: RoleId,
    #[serde(default = "Utc::now")]
    pub occurred_at: DateTime<Utc>,
}

/// A role was removed from a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleRemoved {
    pub user_id: UserId,
    pub role_id: RoleId,
    #[serde(default = "Utc::now")]
    pub occurred_at: DateTime<Utc>,
}

/// The permission list of a role definition was edited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolePermissionsUpdated {
    pub role_id: RoleId,
    #[serde(default = "Utc::now")]
    pub occurred_at: DateTime<Utc>,
}

/// Permission overwrites on a resource (e.g. a channel) changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceOverwriteChanged {
    pub resource_id: ResourceId,
    #[serde(default = "Utc::now")]
    pub occurred_at: DateTime<Utc>,
}

/// All mutation events consumed by the permission cache orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PermissionMutation {
    RoleAssigned(RoleAssigned),
    RoleRemoved(RoleRemoved),
    RolePermissionsUpdated(RolePermissionsUpdated),
    ResourceOverwriteChanged(ResourceOverwriteChanged),
}

impl PermissionMutation {
    pub fn role_assigned(user_id: UserId, role_id: RoleId) -> Self {
        Self::RoleAssigned(RoleAssigned {
            user_id,
            role_id,
            occurred_at: Utc::now(),
        })
    }

    pub fn role_removed(user_id: UserId, role_id: RoleId) -> Self {
        Self::RoleRemoved(RoleRemoved {
            user_id,
            role_id,
            occurred_at: Utc::now(),
        })
    }

    pub fn role_permissions_updated(role_id: RoleId) -> Self {
        Self::RolePermissionsUpdated(RolePermissionsUpdated {
            role_id,
            occurred_at: Utc::now(),
        })
    }

    pub fn resource_overwrite_changed(resource_id: ResourceId) -> Self {
        Self::ResourceOverwriteChanged(ResourceOverwriteChanged {
            resource_id,
            occurred_at: Utc::now(),
        })
    }
}

impl Event for PermissionMutation {
    fn event_type(&self) -> &'static str {
        match self {
            PermissionMutation::RoleAssigned(_) => "authz.role.assigned",
            PermissionMutation::RoleRemoved(_) => "authz.role.removed",
            PermissionMutation::RolePermissionsUpdated(_) => "authz.role.permissions_updated",
            PermissionMutation::ResourceOverwriteChanged(_) => "authz.resource.overwrite_changed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            PermissionMutation::RoleAssigned(e) => e.occurred_at,
            PermissionMutation::RoleRemoved(e) => e.occurred_at,
            PermissionMutation::RolePermissionsUpdated(e) => e.occurred_at,
            PermissionMutation::ResourceOverwriteChanged(e) => e.occurred_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_tagged_payload_without_timestamp() {
        let role_id = RoleId::new();
        let json = format!(r#"{{"type":"role_permissions_updated","role_id":"{role_id}"}}"#);

        let event: PermissionMutation = serde_json::from_str(&json).unwrap();
        let PermissionMutation::RolePermissionsUpdated(e) = &event else {
            panic!("expected RolePermissionsUpdated");
        };
        assert_eq!(e.role_id, role_id);
        assert_eq!(event.event_type(), "authz.role.permissions_updated");
    }
}
