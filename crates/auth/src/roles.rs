use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use risknexus_core::{DomainError, RoleId, TenantId};

use crate::PermissionSet;

/// Longest accepted role name (after trimming).
pub const MAX_ROLE_NAME_LEN: usize = 100;

/// Longest accepted role description.
pub const MAX_ROLE_DESCRIPTION_LEN: usize = 500;

/// A tenant-scoped, named bundle of permission codes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    pub tenant_id: TenantId,
    pub name: String,
    pub description: Option<String>,
    pub permissions: PermissionSet,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Normalize and validate a role name. Returns the trimmed name.
pub fn validate_role_name(name: &str) -> Result<String, DomainError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(DomainError::validation("role name cannot be empty"));
    }
    if trimmed.chars().count() > MAX_ROLE_NAME_LEN {
        return Err(DomainError::validation(format!(
            "role name cannot exceed {MAX_ROLE_NAME_LEN} characters"
        )));
    }
    Ok(trimmed.to_string())
}

pub fn validate_role_description(description: &str) -> Result<(), DomainError> {
    if description.chars().count() > MAX_ROLE_DESCRIPTION_LEN {
        return Err(DomainError::validation(format!(
            "role description cannot exceed {MAX_ROLE_DESCRIPTION_LEN} characters"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_is_trimmed() {
        assert_eq!(validate_role_name("  Auditor ").unwrap(), "Auditor");
    }

    #[test]
    fn blank_name_rejected() {
        assert!(matches!(validate_role_name("   "), Err(DomainError::Validation(_))));
    }

    #[test]
    fn limits_count_characters_not_bytes() {
        let cyrillic = "Я".repeat(MAX_ROLE_NAME_LEN);
        assert!(validate_role_name(&cyrillic).is_ok());
        assert!(validate_role_name(&format!("{cyrillic}Я")).is_err());
        assert!(validate_role_description(&"x".repeat(MAX_ROLE_DESCRIPTION_LEN + 1)).is_err());
    }
}
