//! Role repository contract shared by every storage backend and the cache decorator.

use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;

use risknexus_auth::roles::{validate_role_description, validate_role_name};
use risknexus_auth::{LookupError, Permission, PermissionSet, Role, RoleLookup, catalog};
use risknexus_core::{DomainError, RoleId, TenantId, UserId};

/// Input for [`RoleRepository::create`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewRole {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
}

/// Partial update for [`RoleRepository::update`]. `None` leaves a field as is.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RoleUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub permissions: Option<Vec<String>>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RoleStoreError {
    #[error("role not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("role is assigned to {0} user(s)")]
    InUse(usize),

    #[error("storage error: {0}")]
    Storage(String),
}

impl From<DomainError> for RoleStoreError {
    fn from(value: DomainError) -> Self {
        RoleStoreError::Validation(value.to_string())
    }
}

impl From<RoleStoreError> for LookupError {
    fn from(value: RoleStoreError) -> Self {
        LookupError::Unavailable(value.to_string())
    }
}

/// Tenant-scoped role storage.
///
/// Every operation takes the tenant explicitly; a role id that belongs to a
/// different tenant behaves exactly like a missing one.
#[async_trait::async_trait]
pub trait RoleRepository: RoleLookup {
    async fn create(&self, tenant_id: TenantId, new: NewRole) -> Result<Role, RoleStoreError>;

    async fn get(&self, tenant_id: TenantId, role_id: RoleId) -> Result<Option<Role>, RoleStoreError>;

    /// Roles of a tenant, ordered by name.
    async fn list(&self, tenant_id: TenantId) -> Result<Vec<Role>, RoleStoreError>;

    async fn update(
        &self,
        tenant_id: TenantId,
        role_id: RoleId,
        update: RoleUpdate,
    ) -> Result<Role, RoleStoreError>;

    /// Fails with `InUse` while any user holds the role.
    async fn delete(&self, tenant_id: TenantId, role_id: RoleId) -> Result<(), RoleStoreError>;

    /// Replace the role's permission set.
    async fn set_permissions(
        &self,
        tenant_id: TenantId,
        role_id: RoleId,
        codes: Vec<String>,
    ) -> Result<PermissionSet, RoleStoreError>;

    async fn grant_permission(
        &self,
        tenant_id: TenantId,
        role_id: RoleId,
        code: &str,
    ) -> Result<PermissionSet, RoleStoreError>;

    async fn revoke_permission(
        &self,
        tenant_id: TenantId,
        role_id: RoleId,
        code: &str,
    ) -> Result<PermissionSet, RoleStoreError>;

    async fn assign_to_user(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        role_id: RoleId,
    ) -> Result<(), RoleStoreError>;

    async fn unassign_from_user(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        role_id: RoleId,
    ) -> Result<(), RoleStoreError>;

    async fn users_with_role(
        &self,
        tenant_id: TenantId,
        role_id: RoleId,
    ) -> Result<Vec<UserId>, RoleStoreError>;

    async fn roles_for_user(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
    ) -> Result<Vec<RoleId>, RoleStoreError>;
}

#[async_trait::async_trait]
impl<R> RoleRepository for Arc<R>
where
    R: RoleRepository + ?Sized,
{
    async fn create(&self, tenant_id: TenantId, new: NewRole) -> Result<Role, RoleStoreError> {
        (**self).create(tenant_id, new).await
    }

    async fn get(&self, tenant_id: TenantId, role_id: RoleId) -> Result<Option<Role>, RoleStoreError> {
        (**self).get(tenant_id, role_id).await
    }

    async fn list(&self, tenant_id: TenantId) -> Result<Vec<Role>, RoleStoreError> {
        (**self).list(tenant_id).await
    }

    async fn update(
        &self,
        tenant_id: TenantId,
        role_id: RoleId,
        update: RoleUpdate,
    ) -> Result<Role, RoleStoreError> {
        (**self).update(tenant_id, role_id, update).await
    }

    async fn delete(&self, tenant_id: TenantId, role_id: RoleId) -> Result<(), RoleStoreError> {
        (**self).delete(tenant_id, role_id).await
    }

    async fn set_permissions(
        &self,
        tenant_id: TenantId,
        role_id: RoleId,
        codes: Vec<String>,
    ) -> Result<PermissionSet, RoleStoreError> {
        (**self).set_permissions(tenant_id, role_id, codes).await
    }

    async fn grant_permission(
        &self,
        tenant_id: TenantId,
        role_id: RoleId,
        code: &str,
    ) -> Result<PermissionSet, RoleStoreError> {
        (**self).grant_permission(tenant_id, role_id, code).await
    }

    async fn revoke_permission(
        &self,
        tenant_id: TenantId,
        role_id: RoleId,
        code: &str,
    ) -> Result<PermissionSet, RoleStoreError> {
        (**self).revoke_permission(tenant_id, role_id, code).await
    }

    async fn assign_to_user(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        role_id: RoleId,
    ) -> Result<(), RoleStoreError> {
        (**self).assign_to_user(tenant_id, user_id, role_id).await
    }

    async fn unassign_from_user(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        role_id: RoleId,
    ) -> Result<(), RoleStoreError> {
        (**self).unassign_from_user(tenant_id, user_id, role_id).await
    }

    async fn users_with_role(
        &self,
        tenant_id: TenantId,
        role_id: RoleId,
    ) -> Result<Vec<UserId>, RoleStoreError> {
        (**self).users_with_role(tenant_id, role_id).await
    }

    async fn roles_for_user(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
    ) -> Result<Vec<RoleId>, RoleStoreError> {
        (**self).roles_for_user(tenant_id, user_id).await
    }
}

/// A [`NewRole`] that passed validation.
#[derive(Debug, Clone)]
pub(crate) struct ValidRole {
    pub name: String,
    pub description: Option<String>,
    pub permissions: PermissionSet,
}

pub(crate) fn validate_new_role(new: NewRole) -> Result<ValidRole, RoleStoreError> {
    let name = validate_role_name(&new.name)?;
    if let Some(description) = &new.description {
        validate_role_description(description)?;
    }
    let permissions = parse_permission_codes(&new.permissions)?;
    Ok(ValidRole {
        name,
        description: new.description,
        permissions,
    })
}

/// [`RoleUpdate`] with every present field validated.
#[derive(Debug, Clone, Default)]
pub(crate) struct ValidUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub permissions: Option<PermissionSet>,
}

pub(crate) fn validate_update(update: RoleUpdate) -> Result<ValidUpdate, RoleStoreError> {
    let name = update.name.as_deref().map(validate_role_name).transpose()?;
    if let Some(description) = &update.description {
        validate_role_description(description)?;
    }
    let permissions = update
        .permissions
        .as_deref()
        .map(parse_permission_codes)
        .transpose()?;
    Ok(ValidUpdate {
        name,
        description: update.description,
        permissions,
    })
}

/// Resolve permission codes against the catalog. Duplicates collapse.
pub(crate) fn parse_permission_codes<S: AsRef<str>>(codes: &[S]) -> Result<PermissionSet, RoleStoreError> {
    codes.iter().map(|code| parse_permission_code(code.as_ref())).collect()
}

pub(crate) fn parse_permission_code(code: &str) -> Result<Permission, RoleStoreError> {
    let code = code.trim();
    if code.is_empty() {
        return Err(RoleStoreError::Validation("permission code cannot be empty".to_string()));
    }
    if !catalog::is_known(code) {
        return Err(RoleStoreError::Validation(format!("unknown permission code '{code}'")));
    }
    Ok(Permission::new(code.to_string()))
}
