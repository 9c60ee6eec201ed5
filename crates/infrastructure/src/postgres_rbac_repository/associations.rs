use tracing::debug;
use uuid::Uuid;

use tollgate_core::{AppError, AppResult};
use tollgate_domain::UserId;

use super::PostgresRbacRepository;
use crate::postgres_errors::{read_error, write_error};

/// Association tables keyed by `(parent, child)`.
#[derive(Debug, Clone, Copy)]
pub(super) enum AssociationTable {
    UserRoles,
    UserPermissions,
    RolePermissions,
    ProductRoles,
    ProductPermissions,
}

impl AssociationTable {
    fn table(self) -> &'static str {
        match self {
            Self::UserRoles => "user_roles",
            Self::UserPermissions => "user_permissions",
            Self::RolePermissions => "role_permissions",
            Self::ProductRoles => "product_roles",
            Self::ProductPermissions => "product_permissions",
        }
    }

    fn parent_column(self) -> &'static str {
        match self {
            Self::UserRoles | Self::UserPermissions => "user_id",
            Self::RolePermissions => "role_id",
            Self::ProductRoles | Self::ProductPermissions => "product_id",
        }
    }

    fn child_column(self) -> &'static str {
        match self {
            Self::UserRoles | Self::ProductRoles => "role_id",
            Self::UserPermissions | Self::RolePermissions | Self::ProductPermissions => {
                "permission_id"
            }
        }
    }

    fn label(self) -> String {
        self.table().replace('_', " ")
    }
}

impl PostgresRbacRepository {
    /// Inserts every `(parent, child)` pair in one statement. Pairs that
    /// already exist are left untouched.
    pub(super) async fn create_links(
        &self,
        table: AssociationTable,
        parent_id: Uuid,
        child_ids: Vec<Uuid>,
    ) -> AppResult<()> {
        if child_ids.is_empty() {
            return Ok(());
        }

        let statement = format!(
            "INSERT INTO {} ({}, {}) \
             SELECT $1, child_id FROM UNNEST($2::uuid[]) AS child_id \
             ON CONFLICT DO NOTHING",
            table.table(),
            table.parent_column(),
            table.child_column()
        );

        let result = self
            .handle
            .execute(sqlx::query(statement.as_str()).bind(parent_id).bind(child_ids))
            .await
            .map_err(|error| write_error(error, format!("create {}", table.label()).as_str()))?;

        debug!(
            table = table.table(),
            inserted = result.rows_affected(),
            "association links created"
        );
        Ok(())
    }

    pub(super) async fn delete_links(
        &self,
        table: AssociationTable,
        parent_id: Uuid,
        child_ids: Vec<Uuid>,
    ) -> AppResult<u64> {
        if child_ids.is_empty() {
            return Ok(0);
        }

        let statement = format!(
            "DELETE FROM {} WHERE {} = $1 AND {} = ANY($2::uuid[])",
            table.table(),
            table.parent_column(),
            table.child_column()
        );

        let result = self
            .handle
            .execute(sqlx::query(statement.as_str()).bind(parent_id).bind(child_ids))
            .await
            .map_err(|error| write_error(error, format!("delete {}", table.label()).as_str()))?;

        Ok(result.rows_affected())
    }

    pub(super) async fn assign_user_roles_impl(
        &self,
        user_id: UserId,
        role_names: &[String],
    ) -> AppResult<()> {
        if role_names.is_empty() {
            return Ok(());
        }

        let user_exists = self
            .handle
            .fetch_one(
                sqlx::query_as::<_, (bool,)>("SELECT EXISTS (SELECT 1 FROM users WHERE id = $1)")
                    .bind(user_id.as_uuid()),
            )
            .await
            .map_err(|error| read_error(error, "check user before assigning roles"))?
            .0;

        if !user_exists {
            return Err(AppError::NotFound(format!("user '{user_id}' does not exist")));
        }

        let names = role_names
            .iter()
            .map(|name| name.trim().to_owned())
            .collect::<Vec<_>>();

        let result = self
            .handle
            .execute(
                sqlx::query(
                    r#"
                    INSERT INTO user_roles (user_id, role_id)
                    SELECT $1, roles.id
                    FROM roles
                    WHERE roles.name = ANY($2::text[])
                    ON CONFLICT DO NOTHING
                    "#,
                )
                .bind(user_id.as_uuid())
                .bind(names),
            )
            .await
            .map_err(|error| write_error(error, "assign user roles"))?;

        debug!(
            user_id = %user_id,
            requested = role_names.len(),
            assigned = result.rows_affected(),
            "roles assigned by name"
        );
        Ok(())
    }
}
