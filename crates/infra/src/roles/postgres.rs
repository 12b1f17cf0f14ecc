//! Postgres-backed role store.
//!
//! Tenant isolation is enforced in SQL: every statement filters on
//! `roles.tenant_id`, and tables keyed only by role id are reached through a
//! join on `roles`.
//!
//! ## Error Mapping
//!
//! | PostgreSQL Error Code | RoleStoreError | Scenario |
//! |-----------------------|----------------|----------|
//! | `23505` | `Conflict` | Duplicate role name within a tenant |
//! | `23503` | `Validation` | Permission code missing from `permissions` |
//! | other / pool / IO | `Storage` | Anything else |

use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{FromRow, PgPool, Postgres, Row, Transaction};
use tracing::instrument;
use uuid::Uuid;

use risknexus_auth::{LookupError, Permission, PermissionSet, Role, RoleLookup, catalog};
use risknexus_core::{RoleId, TenantId, UserId};

use super::repository::{
    NewRole, RoleRepository, RoleStoreError, RoleUpdate, parse_permission_code,
    parse_permission_codes, validate_new_role, validate_update,
};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS roles (
        id          UUID PRIMARY KEY,
        tenant_id   UUID NOT NULL,
        name        TEXT NOT NULL,
        description TEXT NULL,
        created_at  TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at  TIMESTAMPTZ NOT NULL DEFAULT now(),
        UNIQUE (tenant_id, name)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS permissions (
        code        TEXT PRIMARY KEY,
        module      TEXT NOT NULL,
        description TEXT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS role_permissions (
        role_id         UUID NOT NULL REFERENCES roles (id) ON DELETE CASCADE,
        permission_code TEXT NOT NULL REFERENCES permissions (code),
        PRIMARY KEY (role_id, permission_code)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS user_roles (
        tenant_id UUID NOT NULL,
        user_id   UUID NOT NULL,
        role_id   UUID NOT NULL REFERENCES roles (id),
        PRIMARY KEY (user_id, role_id)
    )
    "#,
];

const SELECT_ROLE: &str = r#"
    SELECT
        r.id,
        r.tenant_id,
        r.name,
        r.description,
        r.created_at,
        r.updated_at,
        COALESCE(
            array_agg(rp.permission_code ORDER BY rp.permission_code)
                FILTER (WHERE rp.permission_code IS NOT NULL),
            '{}'
        ) AS permissions
    FROM roles r
    LEFT JOIN role_permissions rp ON rp.role_id = r.id
"#;

/// Role repository over a shared sqlx pool. Cheap to clone.
#[derive(Debug, Clone)]
pub struct PostgresRoleRepository {
    pool: PgPool,
}

impl PostgresRoleRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the role tables if missing and load the permission catalog.
    #[instrument(skip(self), err)]
    pub async fn ensure_schema(&self) -> Result<(), RoleStoreError> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        }

        let (codes, modules, descriptions) = catalog_seed_columns();

        sqlx::query(
            r#"
            INSERT INTO permissions (code, module, description)
            SELECT * FROM UNNEST($1::text[], $2::text[], $3::text[])
            ON CONFLICT (code) DO NOTHING
            "#,
        )
        .bind(&codes)
        .bind(&modules)
        .bind(&descriptions)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("seed_permissions", e))?;

        // The wildcard is not a catalog entry but must satisfy the FK.
        sqlx::query(
            "INSERT INTO permissions (code, module, description) VALUES ($1, '*', 'All permissions') ON CONFLICT (code) DO NOTHING",
        )
        .bind(Permission::WILDCARD.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("seed_permissions", e))?;

        Ok(())
    }

    async fn fetch_role<'e, E>(
        executor: E,
        tenant_id: TenantId,
        role_id: RoleId,
    ) -> Result<Option<Role>, RoleStoreError>
    where
        E: sqlx::Executor<'e, Database = Postgres>,
    {
        let sql = format!("{SELECT_ROLE} WHERE r.tenant_id = $1 AND r.id = $2 GROUP BY r.id");
        let row = sqlx::query(&sql)
            .bind(tenant_id.as_uuid())
            .bind(role_id.as_uuid())
            .fetch_optional(executor)
            .await
            .map_err(|e| map_sqlx_error("fetch_role", e))?;

        row.map(|row| RoleRow::from_row(&row).map(Role::from))
            .transpose()
            .map_err(|e| RoleStoreError::Storage(format!("failed to decode role row: {e}")))
    }

    /// Lock the role row, failing with `NotFound` outside its tenant.
    async fn lock_role(
        tx: &mut Transaction<'_, Postgres>,
        tenant_id: TenantId,
        role_id: RoleId,
    ) -> Result<(), RoleStoreError> {
        let found = sqlx::query("SELECT 1 FROM roles WHERE tenant_id = $1 AND id = $2 FOR UPDATE")
            .bind(tenant_id.as_uuid())
            .bind(role_id.as_uuid())
            .fetch_optional(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("lock_role", e))?;
        found.map(|_| ()).ok_or(RoleStoreError::NotFound)
    }

    async fn replace_permissions(
        tx: &mut Transaction<'_, Postgres>,
        role_id: RoleId,
        permissions: &PermissionSet,
    ) -> Result<(), RoleStoreError> {
        sqlx::query("DELETE FROM role_permissions WHERE role_id = $1")
            .bind(role_id.as_uuid())
            .execute(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("clear_role_permissions", e))?;

        if permissions.is_empty() {
            return Ok(());
        }
        sqlx::query(
            "INSERT INTO role_permissions (role_id, permission_code) SELECT $1, UNNEST($2::text[])",
        )
        .bind(role_id.as_uuid())
        .bind(permissions.codes())
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("insert_role_permissions", e))?;
        Ok(())
    }

    async fn touch(
        tx: &mut Transaction<'_, Postgres>,
        role_id: RoleId,
    ) -> Result<(), RoleStoreError> {
        sqlx::query("UPDATE roles SET updated_at = now() WHERE id = $1")
            .bind(role_id.as_uuid())
            .execute(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("touch_role", e))?;
        Ok(())
    }

    async fn permissions_in<'e, E>(
        executor: E,
        tenant_id: TenantId,
        role_id: RoleId,
    ) -> Result<PermissionSet, sqlx::Error>
    where
        E: sqlx::Executor<'e, Database = Postgres>,
    {
        let codes: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT rp.permission_code
            FROM role_permissions rp
            JOIN roles r ON r.id = rp.role_id
            WHERE r.tenant_id = $1 AND r.id = $2
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(role_id.as_uuid())
        .fetch_all(executor)
        .await?;
        Ok(codes.into_iter().map(Permission::new).collect())
    }

    async fn begin(&self, operation: &str) -> Result<Transaction<'static, Postgres>, RoleStoreError> {
        self.pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error(operation, e))
    }
}

#[async_trait::async_trait]
impl RoleLookup for PostgresRoleRepository {
    #[instrument(skip(self), fields(tenant_id = %tenant_id, role_id = %role_id), err)]
    async fn role_permissions(
        &self,
        tenant_id: TenantId,
        role_id: RoleId,
    ) -> Result<PermissionSet, LookupError> {
        Self::permissions_in(&self.pool, tenant_id, role_id)
            .await
            .map_err(|e| map_sqlx_error("role_permissions", e).into())
    }
}

#[async_trait::async_trait]
impl RoleRepository for PostgresRoleRepository {
    #[instrument(skip(self, new), fields(tenant_id = %tenant_id), err)]
    async fn create(&self, tenant_id: TenantId, new: NewRole) -> Result<Role, RoleStoreError> {
        let valid = validate_new_role(new)?;
        let role_id = RoleId::new();

        let mut tx = self.begin("create_role").await?;
        sqlx::query("INSERT INTO roles (id, tenant_id, name, description) VALUES ($1, $2, $3, $4)")
            .bind(role_id.as_uuid())
            .bind(tenant_id.as_uuid())
            .bind(&valid.name)
            .bind(valid.description.as_deref())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("create_role", e))?;
        Self::replace_permissions(&mut tx, role_id, &valid.permissions).await?;

        let role = Self::fetch_role(&mut *tx, tenant_id, role_id)
            .await?
            .ok_or_else(|| RoleStoreError::Storage("created role vanished".to_string()))?;
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(role)
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, role_id = %role_id), err)]
    async fn get(&self, tenant_id: TenantId, role_id: RoleId) -> Result<Option<Role>, RoleStoreError> {
        Self::fetch_role(&self.pool, tenant_id, role_id).await
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id), err)]
    async fn list(&self, tenant_id: TenantId) -> Result<Vec<Role>, RoleStoreError> {
        let sql = format!("{SELECT_ROLE} WHERE r.tenant_id = $1 GROUP BY r.id ORDER BY r.name");
        let rows = sqlx::query(&sql)
            .bind(tenant_id.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_roles", e))?;

        let mut roles = Vec::with_capacity(rows.len());
        for row in rows {
            let role = RoleRow::from_row(&row)
                .map_err(|e| RoleStoreError::Storage(format!("failed to decode role row: {e}")))?;
            roles.push(role.into());
        }
        Ok(roles)
    }

    #[instrument(skip(self, update), fields(tenant_id = %tenant_id, role_id = %role_id), err)]
    async fn update(
        &self,
        tenant_id: TenantId,
        role_id: RoleId,
        update: RoleUpdate,
    ) -> Result<Role, RoleStoreError> {
        let valid = validate_update(update)?;

        let mut tx = self.begin("update_role").await?;
        Self::lock_role(&mut tx, tenant_id, role_id).await?;
        sqlx::query(
            r#"
            UPDATE roles
            SET name = COALESCE($3, name),
                description = COALESCE($4, description),
                updated_at = now()
            WHERE tenant_id = $1 AND id = $2
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(role_id.as_uuid())
        .bind(valid.name.as_deref())
        .bind(valid.description.as_deref())
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("update_role", e))?;

        if let Some(permissions) = &valid.permissions {
            Self::replace_permissions(&mut tx, role_id, permissions).await?;
        }

        let role = Self::fetch_role(&mut *tx, tenant_id, role_id)
            .await?
            .ok_or(RoleStoreError::NotFound)?;
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(role)
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, role_id = %role_id), err)]
    async fn delete(&self, tenant_id: TenantId, role_id: RoleId) -> Result<(), RoleStoreError> {
        let mut tx = self.begin("delete_role").await?;
        Self::lock_role(&mut tx, tenant_id, role_id).await?;

        let holders: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM user_roles WHERE role_id = $1")
            .bind(role_id.as_uuid())
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("count_role_holders", e))?;
        if holders > 0 {
            return Err(RoleStoreError::InUse(holders as usize));
        }

        sqlx::query("DELETE FROM roles WHERE tenant_id = $1 AND id = $2")
            .bind(tenant_id.as_uuid())
            .bind(role_id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_role", e))?;
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(())
    }

    #[instrument(skip(self, codes), fields(tenant_id = %tenant_id, role_id = %role_id), err)]
    async fn set_permissions(
        &self,
        tenant_id: TenantId,
        role_id: RoleId,
        codes: Vec<String>,
    ) -> Result<PermissionSet, RoleStoreError> {
        let permissions = parse_permission_codes(&codes)?;

        let mut tx = self.begin("set_permissions").await?;
        Self::lock_role(&mut tx, tenant_id, role_id).await?;
        Self::replace_permissions(&mut tx, role_id, &permissions).await?;
        Self::touch(&mut tx, role_id).await?;
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(permissions)
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, role_id = %role_id), err)]
    async fn grant_permission(
        &self,
        tenant_id: TenantId,
        role_id: RoleId,
        code: &str,
    ) -> Result<PermissionSet, RoleStoreError> {
        let permission = parse_permission_code(code)?;

        let mut tx = self.begin("grant_permission").await?;
        Self::lock_role(&mut tx, tenant_id, role_id).await?;
        sqlx::query(
            "INSERT INTO role_permissions (role_id, permission_code) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(role_id.as_uuid())
        .bind(permission.as_str())
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("grant_permission", e))?;
        Self::touch(&mut tx, role_id).await?;

        let permissions = Self::permissions_in(&mut *tx, tenant_id, role_id)
            .await
            .map_err(|e| map_sqlx_error("grant_permission", e))?;
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(permissions)
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, role_id = %role_id), err)]
    async fn revoke_permission(
        &self,
        tenant_id: TenantId,
        role_id: RoleId,
        code: &str,
    ) -> Result<PermissionSet, RoleStoreError> {
        let permission = parse_permission_code(code)?;

        let mut tx = self.begin("revoke_permission").await?;
        Self::lock_role(&mut tx, tenant_id, role_id).await?;
        sqlx::query("DELETE FROM role_permissions WHERE role_id = $1 AND permission_code = $2")
            .bind(role_id.as_uuid())
            .bind(permission.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("revoke_permission", e))?;
        Self::touch(&mut tx, role_id).await?;

        let permissions = Self::permissions_in(&mut *tx, tenant_id, role_id)
            .await
            .map_err(|e| map_sqlx_error("revoke_permission", e))?;
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(permissions)
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, user_id = %user_id, role_id = %role_id), err)]
    async fn assign_to_user(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        role_id: RoleId,
    ) -> Result<(), RoleStoreError> {
        let mut tx = self.begin("assign_role").await?;
        Self::lock_role(&mut tx, tenant_id, role_id).await?;
        sqlx::query(
            "INSERT INTO user_roles (tenant_id, user_id, role_id) VALUES ($1, $2, $3) ON CONFLICT DO NOTHING",
        )
        .bind(tenant_id.as_uuid())
        .bind(user_id.as_uuid())
        .bind(role_id.as_uuid())
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("assign_role", e))?;
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, user_id = %user_id, role_id = %role_id), err)]
    async fn unassign_from_user(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        role_id: RoleId,
    ) -> Result<(), RoleStoreError> {
        let result = sqlx::query(
            "DELETE FROM user_roles WHERE tenant_id = $1 AND user_id = $2 AND role_id = $3",
        )
        .bind(tenant_id.as_uuid())
        .bind(user_id.as_uuid())
        .bind(role_id.as_uuid())
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("unassign_role", e))?;

        if result.rows_affected() == 0 {
            return Err(RoleStoreError::NotFound);
        }
        Ok(())
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, role_id = %role_id), err)]
    async fn users_with_role(
        &self,
        tenant_id: TenantId,
        role_id: RoleId,
    ) -> Result<Vec<UserId>, RoleStoreError> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            "SELECT user_id FROM user_roles WHERE tenant_id = $1 AND role_id = $2 ORDER BY user_id",
        )
        .bind(tenant_id.as_uuid())
        .bind(role_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("users_with_role", e))?;
        Ok(ids.into_iter().map(UserId::from_uuid).collect())
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, user_id = %user_id), err)]
    async fn roles_for_user(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
    ) -> Result<Vec<RoleId>, RoleStoreError> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            "SELECT role_id FROM user_roles WHERE tenant_id = $1 AND user_id = $2 ORDER BY role_id",
        )
        .bind(tenant_id.as_uuid())
        .bind(user_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("roles_for_user", e))?;
        Ok(ids.into_iter().map(RoleId::from_uuid).collect())
    }
}

/// Column arrays for the `UNNEST` catalog seed: codes, modules, descriptions.
fn catalog_seed_columns() -> (Vec<String>, Vec<String>, Vec<Option<String>>) {
    let definitions = catalog::definitions();
    let codes = definitions.iter().map(|d| d.code.as_str().to_string()).collect();
    let modules = definitions.iter().map(|d| d.module.clone()).collect();
    let descriptions = definitions.iter().map(|d| d.description.clone()).collect();
    (codes, modules, descriptions)
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> RoleStoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            error_for_sqlstate(operation, db_err.code().as_deref(), db_err.message())
        }
        sqlx::Error::PoolClosed => {
            RoleStoreError::Storage(format!("connection pool closed in {}", operation))
        }
        _ => RoleStoreError::Storage(format!("sqlx error in {}: {}", operation, err)),
    }
}

fn error_for_sqlstate(operation: &str, code: Option<&str>, message: &str) -> RoleStoreError {
    let msg = format!("database error in {}: {}", operation, message);
    match code {
        Some("23505") => RoleStoreError::Conflict("a role with this name already exists".to_string()),
        Some("23503") => RoleStoreError::Validation(msg),
        _ => RoleStoreError::Storage(msg),
    }
}

// SQLx row types

#[derive(Debug)]
struct RoleRow {
    id: Uuid,
    tenant_id: Uuid,
    name: String,
    description: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    permissions: Vec<String>,
}

impl<'r> FromRow<'r, PgRow> for RoleRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(RoleRow {
            id: row.try_get("id")?,
            tenant_id: row.try_get("tenant_id")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            permissions: row.try_get("permissions")?,
        })
    }
}

impl From<RoleRow> for Role {
    fn from(row: RoleRow) -> Self {
        Role {
            id: RoleId::from_uuid(row.id),
            tenant_id: TenantId::from_uuid(row.tenant_id),
            name: row.name,
            description: row.description,
            permissions: row.permissions.into_iter().map(Permission::new).collect(),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_violation_is_a_conflict() {
        let err = error_for_sqlstate("create", Some("23505"), "duplicate key value");
        assert!(matches!(err, RoleStoreError::Conflict(_)));
    }

    #[test]
    fn foreign_key_violation_is_a_validation_error() {
        let err = error_for_sqlstate("set_permissions", Some("23503"), "violates foreign key");
        match err {
            RoleStoreError::Validation(msg) => {
                assert!(msg.contains("set_permissions"));
                assert!(msg.contains("violates foreign key"));
            }
            other => panic!("expected Validation, got {other:?}"),
        }
    }

    #[test]
    fn other_failures_are_storage_errors() {
        assert!(matches!(
            error_for_sqlstate("list", Some("40P01"), "deadlock detected"),
            RoleStoreError::Storage(_)
        ));
        assert!(matches!(
            error_for_sqlstate("list", None, "no code"),
            RoleStoreError::Storage(_)
        ));
        assert!(matches!(
            map_sqlx_error("get", sqlx::Error::PoolClosed),
            RoleStoreError::Storage(msg) if msg.contains("pool closed")
        ));
        assert!(matches!(
            map_sqlx_error("get", sqlx::Error::RowNotFound),
            RoleStoreError::Storage(_)
        ));
    }

    #[test]
    fn catalog_seed_columns_line_up() {
        let (codes, modules, descriptions) = catalog_seed_columns();
        assert_eq!(codes.len(), catalog::definitions().len());
        assert_eq!(codes.len(), modules.len());
        assert_eq!(codes.len(), descriptions.len());
        assert!(codes.iter().all(|c| catalog::is_known(c)));
        assert!(!codes.iter().any(|c| c == Permission::WILDCARD.as_str()));
    }

    #[test]
    fn row_maps_to_role() {
        let now = Utc::now();
        let (id, tenant_id) = (Uuid::now_v7(), Uuid::now_v7());
        let role: Role = RoleRow {
            id,
            tenant_id,
            name: "Auditor".to_string(),
            description: None,
            created_at: now,
            updated_at: now,
            permissions: vec!["risk.view".to_string(), "asset.view".to_string()],
        }
        .into();

        assert_eq!(role.id, RoleId::from_uuid(id));
        assert_eq!(role.tenant_id, TenantId::from_uuid(tenant_id));
        assert_eq!(role.permissions.codes(), vec!["asset.view", "risk.view"]);
    }
}
