use serde::Serialize;

use crate::{AuthError, Permission, PermissionQuery, Principal, ResolvedPermissionSet, Role};

/// Coarse role gate.
///
/// - No required role: any authenticated caller passes.
/// - No identity attached: `Unauthenticated` (the guard ran before verification).
/// - Role mismatch: `Forbidden`.
pub fn check_role(principal: Option<&Principal>, required: Option<&Role>) -> Result<(), AuthError> {
    let principal = principal.ok_or_else(AuthError::unauthenticated)?;

    match required {
        None => Ok(()),
        Some(role) if principal.has_role(role) => Ok(()),
        Some(_) => Err(AuthError::Forbidden),
    }
}

/// Evaluate a permission query against an already-resolved permission set.
///
/// ```text
/// allowed = (all ⊆ granted) AND (any ∩ granted ≠ ∅ OR any = ∅) AND (none ∩ granted = ∅)
/// ```
///
/// - No IO
/// - No panics
pub fn evaluate(query: &PermissionQuery, granted: &ResolvedPermissionSet) -> bool {
    let all = query.all.iter().all(|p| granted.contains(p));
    let any = query.any.is_empty() || query.any.iter().any(|p| granted.contains(p));
    let none = !query.none.iter().any(|p| granted.contains(p));

    all && any && none
}

/// [`evaluate`] as a pipeline verdict.
pub fn authorize_query(
    query: &PermissionQuery,
    granted: &ResolvedPermissionSet,
) -> Result<(), AuthError> {
    if evaluate(query, granted) {
        Ok(())
    } else {
        Err(AuthError::Forbidden)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Authorization Explanation (Audit Trail)
// ─────────────────────────────────────────────────────────────────────────────

/// Detailed explanation of a permission decision.
///
/// Meant for operators and logs. It must never be sent to the denied caller.
#[derive(Debug, Clone, Serialize)]
pub struct AuthorizationExplanation {
    /// Whether the query allowed access.
    pub granted: bool,

    /// Human-readable reason for the decision.
    pub reason: String,

    /// Permissions from `all` the caller lacks.
    pub missing_all: Vec<String>,

    /// Permissions from `any` the caller holds.
    pub matched_any: Vec<String>,

    /// Permissions from `none` the caller holds.
    pub forbidden_present: Vec<String>,

    /// The caller's effective permissions in the evaluated scope.
    pub effective_permissions: Vec<String>,

    /// If denied, which clause(s) failed.
    pub denial_reasons: Vec<DenialReason>,
}

/// Reason one clause denied the query.
#[derive(Debug, Clone, Serialize)]
pub struct DenialReason {
    pub kind: DenialKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialKind {
    MissingRequired,
    NoAlternativeGranted,
    ForbiddenPresent,
}

fn names<'a>(perms: impl Iterator<Item = &'a Permission>) -> Vec<String> {
    perms.map(|p| p.as_str().to_string()).collect()
}

/// Explain why a permission query was (or would be) allowed or denied.
///
/// Always agrees with [`evaluate`].
pub fn explain(
    query: &PermissionQuery,
    granted: &ResolvedPermissionSet,
) -> AuthorizationExplanation {
    let missing_all = names(query.all.iter().filter(|p| !granted.contains(p)));
    let matched_any = names(query.any.iter().filter(|p| granted.contains(p)));
    let forbidden_present = names(query.none.iter().filter(|p| granted.contains(p)));

    let mut denial_reasons = Vec::new();

    if !missing_all.is_empty() {
        denial_reasons.push(DenialReason {
            kind: DenialKind::MissingRequired,
            message: format!("Missing required permissions: {:?}", missing_all),
        });
    }

    if !query.any.is_empty() && matched_any.is_empty() {
        denial_reasons.push(DenialReason {
            kind: DenialKind::NoAlternativeGranted,
            message: format!(
                "None of the alternative permissions are granted: {:?}",
                names(query.any.iter())
            ),
        });
    }

    if !forbidden_present.is_empty() {
        denial_reasons.push(DenialReason {
            kind: DenialKind::ForbiddenPresent,
            message: format!("Holds excluded permissions: {:?}", forbidden_present),
        });
    }

    let granted_flag = denial_reasons.is_empty();
    let reason = if query.is_unconstrained() {
        "Query has no clauses; any authenticated caller is allowed".to_string()
    } else if granted_flag {
        "All permission clauses are satisfied".to_string()
    } else {
        denial_reasons
            .iter()
            .map(|r| r.message.as_str())
            .collect::<Vec<_>>()
            .join("; ")
    };

    AuthorizationExplanation {
        granted: granted_flag,
        reason,
        missing_all,
        matched_any,
        forbidden_present,
        effective_permissions: names(granted.iter()),
        denial_reasons,
    }
}
