use serde::Serialize;
use thiserror::Error;

use risknexus_core::{RoleId, TenantId, UserId};

use crate::{LookupError, Permission, PermissionSet};

/// A resolved principal for authorization decisions.
///
/// `active_tenant_id` is the tenant the request acts within; `tenant_id` is
/// the tenant the credential was issued for. They must match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: UserId,
    pub active_tenant_id: TenantId,
    pub tenant_id: TenantId,
    pub roles: Vec<RoleId>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("tenant mismatch")]
    TenantMismatch,

    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),

    #[error("permissions could not be established: {0}")]
    Unavailable(String),
}

impl From<LookupError> for AuthzError {
    fn from(value: LookupError) -> Self {
        match value {
            LookupError::Unavailable(msg) => AuthzError::Unavailable(msg),
        }
    }
}

/// Reject a principal acting outside the tenant its credential was issued for.
///
/// - No IO
/// - No panics
pub fn ensure_tenant(principal: &Principal) -> Result<(), AuthzError> {
    if principal.active_tenant_id != principal.tenant_id {
        return Err(AuthzError::TenantMismatch);
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Authorization Explanation (Audit Trail)
// ─────────────────────────────────────────────────────────────────────────────

/// Detailed explanation of an authorization decision.
///
/// Answers "why was this request allowed/denied?" for debugging and audit.
#[derive(Debug, Clone, Serialize)]
pub struct AuthorizationExplanation {
    pub required_permission: String,
    pub granted: bool,
    pub reason: String,
    pub principal: PrincipalState,
    pub denial_reason: Option<DenialReason>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PrincipalState {
    pub user_id: UserId,
    pub active_tenant_id: TenantId,
    pub credential_tenant_id: TenantId,
    pub roles: Vec<RoleGrant>,
    pub effective_permissions: Vec<String>,
    pub has_wildcard: bool,
}

/// Permissions contributed by a single role.
#[derive(Debug, Clone, Serialize)]
pub struct RoleGrant {
    pub role_id: RoleId,
    pub permissions: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DenialReason {
    pub kind: DenialKind,
    pub message: String,
    pub suggestions: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialKind {
    TenantMismatch,
    MissingPermission,
}

/// Explain an authorization decision from already-resolved role sets.
///
/// `role_sets` pairs each of the principal's roles with its permission set;
/// fetching them is the caller's job (see `PermissionChecker::explain`).
pub fn explain_authorization(
    principal: &Principal,
    required: &Permission,
    role_sets: &[(RoleId, PermissionSet)],
) -> AuthorizationExplanation {
    let required_str = required.as_str().to_string();

    let effective = role_sets
        .iter()
        .fold(PermissionSet::empty(), |acc, (_, set)| acc.union(set));

    let state = PrincipalState {
        user_id: principal.user_id,
        active_tenant_id: principal.active_tenant_id,
        credential_tenant_id: principal.tenant_id,
        roles: role_sets
            .iter()
            .map(|(role_id, set)| RoleGrant {
                role_id: *role_id,
                permissions: set.codes(),
            })
            .collect(),
        effective_permissions: effective.codes(),
        has_wildcard: effective.has_wildcard(),
    };

    if ensure_tenant(principal).is_err() {
        return AuthorizationExplanation {
            required_permission: required_str,
            granted: false,
            reason: format!(
                "Tenant mismatch: request targets tenant {} but the credential was issued for tenant {}",
                principal.active_tenant_id, principal.tenant_id
            ),
            principal: state,
            denial_reason: Some(DenialReason {
                kind: DenialKind::TenantMismatch,
                message: "Principal is acting in a different tenant than its credential".to_string(),
                suggestions: vec![
                    "Drop the tenant override header or obtain a token for the target tenant".to_string(),
                ],
            }),
        };
    }

    if effective.grants(required) {
        let reason = if effective.contains(required) {
            let granting: Vec<String> = role_sets
                .iter()
                .filter(|(_, set)| set.contains(required))
                .map(|(role_id, _)| role_id.to_string())
                .collect();
            format!("Permission '{}' granted by role(s) {:?}", required_str, granting)
        } else {
            "Principal holds the wildcard permission '*'".to_string()
        };

        return AuthorizationExplanation {
            required_permission: required_str,
            granted: true,
            reason,
            principal: state,
            denial_reason: None,
        };
    }

    let mut suggestions = vec![format!(
        "Assign a role that grants the '{}' permission",
        required_str
    )];
    if role_sets.is_empty() {
        suggestions.push("The principal holds no roles in this tenant".to_string());
    } else {
        suggestions.push(format!(
            "Grant '{}' to one of the principal's roles: {:?}",
            required_str,
            role_sets.iter().map(|(id, _)| id.to_string()).collect::<Vec<_>>()
        ));
    }

    AuthorizationExplanation {
        reason: format!(
            "Principal does not have permission '{}'. Current permissions: {:?}",
            required_str, state.effective_permissions
        ),
        required_permission: required_str.clone(),
        granted: false,
        principal: state,
        denial_reason: Some(DenialReason {
            kind: DenialKind::MissingPermission,
            message: format!("Missing required permission: '{}'", required_str),
            suggestions,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog;

    fn principal(roles: Vec<RoleId>) -> Principal {
        let tenant = TenantId::new();
        Principal {
            user_id: UserId::new(),
            active_tenant_id: tenant,
            tenant_id: tenant,
            roles,
        }
    }

    #[test]
    fn explanation_names_granting_role() {
        let role = RoleId::new();
        let p = principal(vec![role]);
        let sets = vec![(role, [catalog::RISK_VIEW].into_iter().collect())];

        let e = explain_authorization(&p, &catalog::RISK_VIEW, &sets);
        assert!(e.granted);
        assert!(e.reason.contains(&role.to_string()));
        assert!(e.denial_reason.is_none());
    }

    #[test]
    fn explanation_reports_missing_permission() {
        let role = RoleId::new();
        let p = principal(vec![role]);
        let sets = vec![(role, [catalog::RISK_VIEW].into_iter().collect())];

        let e = explain_authorization(&p, &catalog::RISK_EDIT, &sets);
        assert!(!e.granted);
        let denial = e.denial_reason.unwrap();
        assert_eq!(denial.kind, DenialKind::MissingPermission);
        assert_eq!(e.principal.effective_permissions, vec!["risk.view"]);
    }

    #[test]
    fn tenant_mismatch_denies_even_with_wildcard() {
        let role = RoleId::new();
        let mut p = principal(vec![role]);
        p.active_tenant_id = TenantId::new();
        let sets = vec![(role, [Permission::WILDCARD].into_iter().collect())];

        let e = explain_authorization(&p, &catalog::ASSET_VIEW, &sets);
        assert!(!e.granted);
        assert_eq!(e.denial_reason.unwrap().kind, DenialKind::TenantMismatch);
        assert_eq!(ensure_tenant(&p), Err(AuthzError::TenantMismatch));
    }
}
