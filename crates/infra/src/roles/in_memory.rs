use std::collections::{BTreeSet, HashMap};
use std::sync::{PoisonError, RwLock};

use chrono::Utc;

use risknexus_auth::{LookupError, PermissionSet, Role, RoleLookup};
use risknexus_core::{RoleId, TenantId, UserId};

use super::repository::{
    NewRole, RoleRepository, RoleStoreError, RoleUpdate, parse_permission_code,
    parse_permission_codes, validate_new_role, validate_update,
};

#[derive(Debug, Default)]
struct State {
    roles: HashMap<(TenantId, RoleId), Role>,
    assignments: BTreeSet<(TenantId, UserId, RoleId)>,
}

impl State {
    fn role_mut(&mut self, tenant_id: TenantId, role_id: RoleId) -> Result<&mut Role, RoleStoreError> {
        self.roles
            .get_mut(&(tenant_id, role_id))
            .ok_or(RoleStoreError::NotFound)
    }

    fn name_taken(&self, tenant_id: TenantId, name: &str, except: Option<RoleId>) -> bool {
        self.roles
            .values()
            .any(|r| r.tenant_id == tenant_id && r.name == name && Some(r.id) != except)
    }
}

/// In-memory role store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryRoleRepository {
    state: RwLock<State>,
}

impl InMemoryRoleRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn read<T>(&self, f: impl FnOnce(&State) -> T) -> T {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        f(&state)
    }

    fn write<T>(&self, f: impl FnOnce(&mut State) -> T) -> T {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut state)
    }

    fn replace_permissions(
        &self,
        tenant_id: TenantId,
        role_id: RoleId,
        change: impl FnOnce(&PermissionSet) -> PermissionSet,
    ) -> Result<PermissionSet, RoleStoreError> {
        self.write(|state| {
            let role = state.role_mut(tenant_id, role_id)?;
            role.permissions = change(&role.permissions);
            role.updated_at = Utc::now();
            Ok(role.permissions.clone())
        })
    }
}

#[async_trait::async_trait]
impl RoleLookup for InMemoryRoleRepository {
    async fn role_permissions(
        &self,
        tenant_id: TenantId,
        role_id: RoleId,
    ) -> Result<PermissionSet, LookupError> {
        Ok(self.read(|state| {
            state
                .roles
                .get(&(tenant_id, role_id))
                .map(|r| r.permissions.clone())
                .unwrap_or_default()
        }))
    }
}

#[async_trait::async_trait]
impl RoleRepository for InMemoryRoleRepository {
    async fn create(&self, tenant_id: TenantId, new: NewRole) -> Result<Role, RoleStoreError> {
        let valid = validate_new_role(new)?;
        self.write(|state| {
            if state.name_taken(tenant_id, &valid.name, None) {
                return Err(RoleStoreError::Conflict(format!(
                    "role '{}' already exists",
                    valid.name
                )));
            }
            let now = Utc::now();
            let role = Role {
                id: RoleId::new(),
                tenant_id,
                name: valid.name,
                description: valid.description,
                permissions: valid.permissions,
                created_at: now,
                updated_at: now,
            };
            state.roles.insert((tenant_id, role.id), role.clone());
            Ok(role)
        })
    }

    async fn get(&self, tenant_id: TenantId, role_id: RoleId) -> Result<Option<Role>, RoleStoreError> {
        Ok(self.read(|state| state.roles.get(&(tenant_id, role_id)).cloned()))
    }

    async fn list(&self, tenant_id: TenantId) -> Result<Vec<Role>, RoleStoreError> {
        let mut roles: Vec<Role> = self.read(|state| {
            state
                .roles
                .values()
                .filter(|r| r.tenant_id == tenant_id)
                .cloned()
                .collect()
        });
        roles.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(roles)
    }

    async fn update(
        &self,
        tenant_id: TenantId,
        role_id: RoleId,
        update: RoleUpdate,
    ) -> Result<Role, RoleStoreError> {
        let valid = validate_update(update)?;
        self.write(|state| {
            if !state.roles.contains_key(&(tenant_id, role_id)) {
                return Err(RoleStoreError::NotFound);
            }
            if let Some(name) = &valid.name {
                if state.name_taken(tenant_id, name, Some(role_id)) {
                    return Err(RoleStoreError::Conflict(format!("role '{name}' already exists")));
                }
            }
            let role = state.role_mut(tenant_id, role_id)?;
            if let Some(name) = valid.name {
                role.name = name;
            }
            if let Some(description) = valid.description {
                role.description = Some(description);
            }
            if let Some(permissions) = valid.permissions {
                role.permissions = permissions;
            }
            role.updated_at = Utc::now();
            Ok(role.clone())
        })
    }

    async fn delete(&self, tenant_id: TenantId, role_id: RoleId) -> Result<(), RoleStoreError> {
        self.write(|state| {
            if !state.roles.contains_key(&(tenant_id, role_id)) {
                return Err(RoleStoreError::NotFound);
            }
            let holders = state
                .assignments
                .iter()
                .filter(|(t, _, r)| *t == tenant_id && *r == role_id)
                .count();
            if holders > 0 {
                return Err(RoleStoreError::InUse(holders));
            }
            state.roles.remove(&(tenant_id, role_id));
            Ok(())
        })
    }

    async fn set_permissions(
        &self,
        tenant_id: TenantId,
        role_id: RoleId,
        codes: Vec<String>,
    ) -> Result<PermissionSet, RoleStoreError> {
        let permissions = parse_permission_codes(&codes)?;
        self.replace_permissions(tenant_id, role_id, |_| permissions)
    }

    async fn grant_permission(
        &self,
        tenant_id: TenantId,
        role_id: RoleId,
        code: &str,
    ) -> Result<PermissionSet, RoleStoreError> {
        let permission = parse_permission_code(code)?;
        self.replace_permissions(tenant_id, role_id, |current| {
            current.iter().cloned().chain([permission]).collect()
        })
    }

    async fn revoke_permission(
        &self,
        tenant_id: TenantId,
        role_id: RoleId,
        code: &str,
    ) -> Result<PermissionSet, RoleStoreError> {
        let permission = parse_permission_code(code)?;
        self.replace_permissions(tenant_id, role_id, |current| {
            current.iter().filter(|p| **p != permission).cloned().collect()
        })
    }

    async fn assign_to_user(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        role_id: RoleId,
    ) -> Result<(), RoleStoreError> {
        self.write(|state| {
            if !state.roles.contains_key(&(tenant_id, role_id)) {
                return Err(RoleStoreError::NotFound);
            }
            state.assignments.insert((tenant_id, user_id, role_id));
            Ok(())
        })
    }

    async fn unassign_from_user(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        role_id: RoleId,
    ) -> Result<(), RoleStoreError> {
        self.write(|state| {
            if state.assignments.remove(&(tenant_id, user_id, role_id)) {
                Ok(())
            } else {
                Err(RoleStoreError::NotFound)
            }
        })
    }

    async fn users_with_role(
        &self,
        tenant_id: TenantId,
        role_id: RoleId,
    ) -> Result<Vec<UserId>, RoleStoreError> {
        Ok(self.read(|state| {
            state
                .assignments
                .iter()
                .filter(|(t, _, r)| *t == tenant_id && *r == role_id)
                .map(|(_, u, _)| *u)
                .collect()
        }))
    }

    async fn roles_for_user(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
    ) -> Result<Vec<RoleId>, RoleStoreError> {
        Ok(self.read(|state| {
            state
                .assignments
                .iter()
                .filter(|(t, u, _)| *t == tenant_id && *u == user_id)
                .map(|(_, _, r)| *r)
                .collect()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_role(name: &str, permissions: &[&str]) -> NewRole {
        NewRole {
            name: name.to_string(),
            description: None,
            permissions: permissions.iter().map(|p| p.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn role_names_are_unique_per_tenant() {
        let repo = InMemoryRoleRepository::new();
        let (t1, t2) = (TenantId::new(), TenantId::new());

        repo.create(t1, new_role("Auditor", &[])).await.unwrap();
        let dup = repo.create(t1, new_role(" Auditor ", &[])).await;
        assert!(matches!(dup, Err(RoleStoreError::Conflict(_))));

        // Same name in another tenant is fine.
        repo.create(t2, new_role("Auditor", &[])).await.unwrap();
    }

    #[tokio::test]
    async fn roles_are_invisible_across_tenants() {
        let repo = InMemoryRoleRepository::new();
        let (t1, t2) = (TenantId::new(), TenantId::new());
        let role = repo.create(t1, new_role("Viewer", &["asset.view"])).await.unwrap();

        assert!(repo.get(t2, role.id).await.unwrap().is_none());
        assert!(repo.role_permissions(t2, role.id).await.unwrap().is_empty());
        assert!(matches!(
            repo.grant_permission(t2, role.id, "asset.edit").await,
            Err(RoleStoreError::NotFound)
        ));
        assert_eq!(repo.role_permissions(t1, role.id).await.unwrap().codes(), vec!["asset.view"]);
    }

    #[tokio::test]
    async fn grant_and_revoke_change_the_set() {
        let repo = InMemoryRoleRepository::new();
        let tenant = TenantId::new();
        let role = repo.create(tenant, new_role("Analyst", &["risk.view"])).await.unwrap();

        let set = repo.grant_permission(tenant, role.id, "risk.edit").await.unwrap();
        assert_eq!(set.codes(), vec!["risk.edit", "risk.view"]);

        let set = repo.revoke_permission(tenant, role.id, "risk.view").await.unwrap();
        assert_eq!(set.codes(), vec!["risk.edit"]);

        let set = repo.set_permissions(tenant, role.id, vec![]).await.unwrap();
        assert!(set.is_empty());
    }

    #[tokio::test]
    async fn assigned_role_cannot_be_deleted() {
        let repo = InMemoryRoleRepository::new();
        let tenant = TenantId::new();
        let user = UserId::new();
        let role = repo.create(tenant, new_role("Owner", &["*"])).await.unwrap();

        repo.assign_to_user(tenant, user, role.id).await.unwrap();
        assert_eq!(repo.users_with_role(tenant, role.id).await.unwrap(), vec![user]);
        assert_eq!(repo.roles_for_user(tenant, user).await.unwrap(), vec![role.id]);
        assert_eq!(repo.delete(tenant, role.id).await, Err(RoleStoreError::InUse(1)));

        repo.unassign_from_user(tenant, user, role.id).await.unwrap();
        repo.delete(tenant, role.id).await.unwrap();
        assert!(repo.get(tenant, role.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_keeps_unset_fields() {
        let repo = InMemoryRoleRepository::new();
        let tenant = TenantId::new();
        let other = repo.create(tenant, new_role("Other", &[])).await.unwrap();
        let role = repo.create(tenant, new_role("Clerk", &["document.read"])).await.unwrap();

        let updated = repo
            .update(
                tenant,
                role.id,
                RoleUpdate {
                    description: Some("front office".to_string()),
                    ..RoleUpdate::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.name, "Clerk");
        assert_eq!(updated.permissions.codes(), vec!["document.read"]);

        let clash = repo
            .update(
                tenant,
                role.id,
                RoleUpdate {
                    name: Some(other.name.clone()),
                    ..RoleUpdate::default()
                },
            )
            .await;
        assert!(matches!(clash, Err(RoleStoreError::Conflict(_))));
    }
}
