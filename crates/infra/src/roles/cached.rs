//! Caching decorator over any [`RoleRepository`].

use std::sync::Arc;
use std::time::Duration;

use risknexus_auth::{LookupError, PermissionSet, Role, RoleLookup};
use risknexus_core::{RoleId, TenantId, UserId};

use super::repository::{NewRole, RoleRepository, RoleStoreError, RoleUpdate};
use crate::cache::{SweeperHandle, TtlCache, spawn_sweeper};

type PermissionCache = TtlCache<(TenantId, RoleId), PermissionSet>;

/// Role repository that serves permission sets from an in-process cache.
///
/// Misses fall through to the inner repository and are stored for `ttl`.
/// Every mutation routed through the decorator invalidates the affected role
/// before returning, so the next lookup observes the write. Writers that go
/// around it must call [`CachedRoleRepository::invalidate_role`] or accept up
/// to `ttl` of staleness.
#[derive(Debug)]
pub struct CachedRoleRepository<R> {
    inner: R,
    cache: Arc<PermissionCache>,
    ttl: Duration,
}

impl<R> CachedRoleRepository<R> {
    pub fn new(inner: R, ttl: Duration) -> Self {
        Self {
            inner,
            cache: Arc::new(TtlCache::new()),
            ttl,
        }
    }

    pub fn inner(&self) -> &R {
        &self.inner
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Number of cached entries, including expired ones not yet purged.
    pub fn cached_entries(&self) -> usize {
        self.cache.len()
    }

    pub fn invalidate_role(&self, tenant_id: TenantId, role_id: RoleId) {
        self.cache.remove(&(tenant_id, role_id));
        tracing::debug!(%tenant_id, %role_id, "role permissions invalidated");
    }

    pub fn invalidate_all(&self) {
        self.cache.clear();
        tracing::debug!("role permission cache cleared");
    }

    /// Start a background purge of expired entries. Requires a tokio runtime.
    pub fn spawn_sweeper(&self, every: Duration) -> SweeperHandle {
        spawn_sweeper(&self.cache, every)
    }
}

#[async_trait::async_trait]
impl<R> RoleLookup for CachedRoleRepository<R>
where
    R: RoleRepository,
{
    async fn role_permissions(
        &self,
        tenant_id: TenantId,
        role_id: RoleId,
    ) -> Result<PermissionSet, LookupError> {
        let key = (tenant_id, role_id);
        if let Some(hit) = self.cache.get(&key) {
            tracing::trace!(%tenant_id, %role_id, "role permissions cache hit");
            return Ok(hit);
        }

        // Taken before the fetch so an invalidation racing it wins.
        let ticket = self.cache.ticket();
        let fetched = self.inner.role_permissions(tenant_id, role_id).await?;
        let stored = self
            .cache
            .insert_if_fresh(key, fetched.clone(), self.ttl, ticket);
        tracing::debug!(%tenant_id, %role_id, stored, "role permissions cache miss");
        Ok(fetched)
    }
}

impl<R> CachedRoleRepository<R> {
    // Runs whether or not the write succeeded: a failed write may still
    // have committed.
    fn after_write<T>(
        &self,
        tenant_id: TenantId,
        role_id: RoleId,
        result: Result<T, RoleStoreError>,
    ) -> Result<T, RoleStoreError> {
        self.invalidate_role(tenant_id, role_id);
        result
    }
}

#[async_trait::async_trait]
impl<R> RoleRepository for CachedRoleRepository<R>
where
    R: RoleRepository,
{
    async fn create(&self, tenant_id: TenantId, new: NewRole) -> Result<Role, RoleStoreError> {
        // A new id has nothing cached under it.
        self.inner.create(tenant_id, new).await
    }

    async fn get(&self, tenant_id: TenantId, role_id: RoleId) -> Result<Option<Role>, RoleStoreError> {
        self.inner.get(tenant_id, role_id).await
    }

    async fn list(&self, tenant_id: TenantId) -> Result<Vec<Role>, RoleStoreError> {
        self.inner.list(tenant_id).await
    }

    async fn update(
        &self,
        tenant_id: TenantId,
        role_id: RoleId,
        update: RoleUpdate,
    ) -> Result<Role, RoleStoreError> {
        let result = self.inner.update(tenant_id, role_id, update).await;
        self.after_write(tenant_id, role_id, result)
    }

    async fn delete(&self, tenant_id: TenantId, role_id: RoleId) -> Result<(), RoleStoreError> {
        let result = self.inner.delete(tenant_id, role_id).await;
        self.after_write(tenant_id, role_id, result)
    }

    async fn set_permissions(
        &self,
        tenant_id: TenantId,
        role_id: RoleId,
        codes: Vec<String>,
    ) -> Result<PermissionSet, RoleStoreError> {
        let result = self.inner.set_permissions(tenant_id, role_id, codes).await;
        self.after_write(tenant_id, role_id, result)
    }

    async fn grant_permission(
        &self,
        tenant_id: TenantId,
        role_id: RoleId,
        code: &str,
    ) -> Result<PermissionSet, RoleStoreError> {
        let result = self.inner.grant_permission(tenant_id, role_id, code).await;
        self.after_write(tenant_id, role_id, result)
    }

    async fn revoke_permission(
        &self,
        tenant_id: TenantId,
        role_id: RoleId,
        code: &str,
    ) -> Result<PermissionSet, RoleStoreError> {
        let result = self.inner.revoke_permission(tenant_id, role_id, code).await;
        self.after_write(tenant_id, role_id, result)
    }

    // User assignments do not change any role's permission set.

    async fn assign_to_user(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        role_id: RoleId,
    ) -> Result<(), RoleStoreError> {
        self.inner.assign_to_user(tenant_id, user_id, role_id).await
    }

    async fn unassign_from_user(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        role_id: RoleId,
    ) -> Result<(), RoleStoreError> {
        self.inner.unassign_from_user(tenant_id, user_id, role_id).await
    }

    async fn users_with_role(
        &self,
        tenant_id: TenantId,
        role_id: RoleId,
    ) -> Result<Vec<UserId>, RoleStoreError> {
        self.inner.users_with_role(tenant_id, role_id).await
    }

    async fn roles_for_user(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
    ) -> Result<Vec<RoleId>, RoleStoreError> {
        self.inner.roles_for_user(tenant_id, user_id).await
    }
}
