use authgate_auth::{Principal, Role};
use authgate_core::{SessionId, UserId};

/// Principal context for a request (verified identity with a live session).
///
/// Inserted by the auth middleware; present for every protected route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalContext {
    principal: Principal,
}

impl PrincipalContext {
    pub fn new(principal: Principal) -> Self {
        Self { principal }
    }

    pub fn user_id(&self) -> UserId {
        self.principal.user_id
    }

    pub fn session_id(&self) -> SessionId {
        self.principal.session_id
    }

    pub fn role(&self) -> &Role {
        &self.principal.role
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }
}
