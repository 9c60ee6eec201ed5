use serde::de::DeserializeOwned;
use sqlx::FromRow;
use tracing::debug;
use uuid::Uuid;

use tollgate_application::{align_groups, distinct_keys};
use tollgate_core::{AppError, AppResult};
use tollgate_domain::{Permission, Role, RoleId, UserId, uuids_of};

use super::PostgresRbacRepository;
use crate::postgres_errors::read_error;

const USER_ROLES_BY_USER: &str = r#"
    SELECT user_roles.user_id AS parent_id,
           json_agg(
               jsonb_build_object(
                   'id', roles.id,
                   'name', roles.name,
                   'description', roles.description,
                   'created_at', roles.created_at,
                   'updated_at', roles.updated_at
               )
               ORDER BY roles.name, roles.id
           ) AS items
    FROM user_roles
    INNER JOIN roles ON roles.id = user_roles.role_id
    WHERE user_roles.user_id = ANY($1::uuid[])
    GROUP BY user_roles.user_id
"#;

const USER_PERMISSIONS_BY_USER: &str = r#"
    SELECT user_permissions.user_id AS parent_id,
           json_agg(
               jsonb_build_object(
                   'id', permissions.id,
                   'name', permissions.name,
                   'description', permissions.description,
                   'created_at', permissions.created_at,
                   'updated_at', permissions.updated_at
               )
               ORDER BY permissions.name, permissions.id
           ) AS items
    FROM user_permissions
    INNER JOIN permissions ON permissions.id = user_permissions.permission_id
    WHERE user_permissions.user_id = ANY($1::uuid[])
    GROUP BY user_permissions.user_id
"#;

const ROLE_PERMISSIONS_BY_ROLE: &str = r#"
    SELECT role_permissions.role_id AS parent_id,
           json_agg(
               jsonb_build_object(
                   'id', permissions.id,
                   'name', permissions.name,
                   'description', permissions.description,
                   'created_at', permissions.created_at,
                   'updated_at', permissions.updated_at
               )
               ORDER BY permissions.name, permissions.id
           ) AS items
    FROM role_permissions
    INNER JOIN permissions ON permissions.id = role_permissions.permission_id
    WHERE role_permissions.role_id = ANY($1::uuid[])
    GROUP BY role_permissions.role_id
"#;

#[derive(Debug, FromRow)]
struct GroupRow {
    parent_id: Uuid,
    items: serde_json::Value,
}

impl PostgresRbacRepository {
    pub(super) async fn load_user_roles_impl(
        &self,
        user_ids: &[UserId],
    ) -> AppResult<Vec<Vec<Role>>> {
        self.load_groups(
            USER_ROLES_BY_USER,
            uuids_of(user_ids, UserId::as_uuid),
            "user roles",
        )
        .await
    }

    pub(super) async fn load_user_permissions_impl(
        &self,
        user_ids: &[UserId],
    ) -> AppResult<Vec<Vec<Permission>>> {
        self.load_groups(
            USER_PERMISSIONS_BY_USER,
            uuids_of(user_ids, UserId::as_uuid),
            "user permissions",
        )
        .await
    }

    pub(super) async fn load_role_permissions_impl(
        &self,
        role_ids: &[RoleId],
    ) -> AppResult<Vec<Vec<Permission>>> {
        self.load_groups(
            ROLE_PERMISSIONS_BY_ROLE,
            uuids_of(role_ids, RoleId::as_uuid),
            "role permissions",
        )
        .await
    }

    /// Runs one grouped query for all keys and aligns the groups with `keys`.
    ///
    /// Duplicate keys are sent once. An empty key list issues no query.
    async fn load_groups<V>(
        &self,
        statement: &'static str,
        keys: Vec<Uuid>,
        label: &str,
    ) -> AppResult<Vec<Vec<V>>>
    where
        V: DeserializeOwned + Clone,
    {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let rows = self
            .handle
            .fetch_all(sqlx::query_as::<_, GroupRow>(statement).bind(distinct_keys(&keys)))
            .await
            .map_err(|error| read_error(error, format!("load {label}").as_str()))?;

        let grouped = rows
            .into_iter()
            .map(|row| {
                let items = serde_json::from_value::<Vec<V>>(row.items).map_err(|error| {
                    AppError::Internal(format!(
                        "failed to decode {label} for '{}': {error}",
                        row.parent_id
                    ))
                })?;
                Ok((row.parent_id, items))
            })
            .collect::<AppResult<Vec<_>>>()?;

        debug!(keys = keys.len(), groups = grouped.len(), "loaded {label}");
        Ok(align_groups(&keys, grouped))
    }
}
