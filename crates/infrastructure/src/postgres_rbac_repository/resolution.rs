//! Effective-permission queries.
//!
//! Every query starts from the same `grant_candidates` CTE: one row per
//! association that grants a permission to the user, concatenated with
//! `UNION ALL`. The list and count variants of a query also share their
//! `FROM ... WHERE` fragment, so a count always equals the length of the
//! unpaged list.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, Postgres, QueryBuilder};
use tracing::debug;
use uuid::Uuid;

use tollgate_application::{PermissionSource, ResolutionOptions};
use tollgate_core::AppResult;
use tollgate_domain::{
    Filter, Page, Permission, PermissionColumn, PermissionId, ProductId, RoleId, UserId,
    validate_filters,
};

use super::PostgresRbacRepository;
use crate::postgres_errors::{read_error, row_count};
use crate::postgres_filter::{push_filters, push_page};

const ENTITLED_STATUSES: &str = "('active', 'trialing')";

const PERMISSION_COLUMNS: &str = "permissions.id, permissions.name, permissions.description, \
     permissions.created_at, permissions.updated_at";

#[derive(Debug, FromRow)]
struct PermissionSourceRow {
    id: Uuid,
    name: String,
    description: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    role_ids: Vec<Uuid>,
    product_ids: Vec<Uuid>,
    is_directly_assigned: bool,
}

impl PermissionSourceRow {
    fn into_source(self) -> AppResult<PermissionSource> {
        Ok(PermissionSource {
            permission: Permission::new(
                PermissionId::from_uuid(self.id),
                self.name,
                self.description,
                self.created_at,
                self.updated_at,
            )?,
            role_ids: self.role_ids.into_iter().map(RoleId::from_uuid).collect(),
            product_ids: self
                .product_ids
                .into_iter()
                .map(ProductId::from_uuid)
                .collect(),
            is_directly_assigned: self.is_directly_assigned,
        })
    }
}

fn push_grant_candidates(
    builder: &mut QueryBuilder<'_, Postgres>,
    user_id: Uuid,
    options: ResolutionOptions,
) {
    builder.push(
        "WITH grant_candidates AS (\
         SELECT role_permissions.permission_id, user_roles.role_id, \
         NULL::uuid AS product_id, NULL::boolean AS direct_assignment \
         FROM user_roles \
         INNER JOIN role_permissions ON role_permissions.role_id = user_roles.role_id \
         WHERE user_roles.user_id = ",
    );
    builder.push_bind(user_id);

    builder.push(
        " UNION ALL \
         SELECT user_permissions.permission_id, NULL::uuid, NULL::uuid, TRUE \
         FROM user_permissions \
         WHERE user_permissions.user_id = ",
    );
    builder.push_bind(user_id);

    if options.entitlement_grants {
        builder.push(
            " UNION ALL \
             SELECT product_permissions.permission_id, NULL::uuid, subscriptions.product_id, \
             NULL::boolean \
             FROM subscriptions \
             INNER JOIN product_permissions \
             ON product_permissions.product_id = subscriptions.product_id \
             WHERE subscriptions.user_id = ",
        );
        builder.push_bind(user_id);
        builder.push(" AND subscriptions.status IN ");
        builder.push(ENTITLED_STATUSES);

        builder.push(
            " UNION ALL \
             SELECT role_permissions.permission_id, NULL::uuid, subscriptions.product_id, \
             NULL::boolean \
             FROM subscriptions \
             INNER JOIN product_roles ON product_roles.product_id = subscriptions.product_id \
             INNER JOIN role_permissions ON role_permissions.role_id = product_roles.role_id \
             WHERE subscriptions.user_id = ",
        );
        builder.push_bind(user_id);
        builder.push(" AND subscriptions.status IN ");
        builder.push(ENTITLED_STATUSES);
    }

    builder.push(") ");
}

fn push_granted_scope(
    builder: &mut QueryBuilder<'_, Postgres>,
    filters: &[Filter<PermissionColumn>],
) {
    builder.push(
        " FROM grant_candidates \
         INNER JOIN permissions ON permissions.id = grant_candidates.permission_id \
         WHERE TRUE",
    );
    push_filters(builder, "permissions", filters);
}

fn push_missing_scope(
    builder: &mut QueryBuilder<'_, Postgres>,
    filters: &[Filter<PermissionColumn>],
) {
    builder.push(
        " FROM permissions \
         WHERE NOT EXISTS (\
         SELECT 1 FROM grant_candidates \
         WHERE grant_candidates.permission_id = permissions.id)",
    );
    push_filters(builder, "permissions", filters);
}

pub(super) fn granted_list_query(
    user_id: Uuid,
    options: ResolutionOptions,
    filters: &[Filter<PermissionColumn>],
    page: Page,
) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new("");
    push_grant_candidates(&mut builder, user_id, options);
    builder.push("SELECT ");
    builder.push(PERMISSION_COLUMNS);
    builder.push(
        ", COALESCE(array_agg(DISTINCT grant_candidates.role_id ORDER BY grant_candidates.role_id) \
         FILTER (WHERE grant_candidates.role_id IS NOT NULL), '{}'::uuid[]) AS role_ids, \
         COALESCE(array_agg(DISTINCT grant_candidates.product_id ORDER BY grant_candidates.product_id) \
         FILTER (WHERE grant_candidates.product_id IS NOT NULL), '{}'::uuid[]) AS product_ids, \
         COALESCE(bool_or(grant_candidates.direct_assignment), FALSE) AS is_directly_assigned",
    );
    push_granted_scope(&mut builder, filters);
    builder.push(" GROUP BY permissions.id ORDER BY permissions.name, permissions.id");
    push_page(&mut builder, page);
    builder
}

pub(super) fn granted_count_query(
    user_id: Uuid,
    options: ResolutionOptions,
    filters: &[Filter<PermissionColumn>],
) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new("");
    push_grant_candidates(&mut builder, user_id, options);
    builder.push("SELECT COUNT(DISTINCT permissions.id)");
    push_granted_scope(&mut builder, filters);
    builder
}

pub(super) fn missing_list_query(
    user_id: Uuid,
    options: ResolutionOptions,
    filters: &[Filter<PermissionColumn>],
    page: Page,
) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new("");
    push_grant_candidates(&mut builder, user_id, options);
    builder.push("SELECT ");
    builder.push(PERMISSION_COLUMNS);
    builder.push(
        ", '{}'::uuid[] AS role_ids, '{}'::uuid[] AS product_ids, \
         FALSE AS is_directly_assigned",
    );
    push_missing_scope(&mut builder, filters);
    builder.push(" ORDER BY permissions.name, permissions.id");
    push_page(&mut builder, page);
    builder
}

pub(super) fn missing_count_query(
    user_id: Uuid,
    options: ResolutionOptions,
    filters: &[Filter<PermissionColumn>],
) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new("");
    push_grant_candidates(&mut builder, user_id, options);
    builder.push("SELECT COUNT(*)");
    push_missing_scope(&mut builder, filters);
    builder
}

impl PostgresRbacRepository {
    pub(super) async fn list_user_permission_sources_impl(
        &self,
        user_id: UserId,
        filters: &[Filter<PermissionColumn>],
        page: Page,
    ) -> AppResult<Vec<PermissionSource>> {
        validate_filters(filters)?;
        let mut builder = granted_list_query(user_id.as_uuid(), self.options, filters, page);
        let rows = self
            .handle
            .fetch_all(builder.build_query_as::<PermissionSourceRow>())
            .await
            .map_err(|error| read_error(error, "list user permission sources"))?;

        debug!(
            user_id = %user_id,
            rows = rows.len(),
            entitlement_grants = self.options.entitlement_grants,
            "resolved granted permissions"
        );
        rows.into_iter().map(PermissionSourceRow::into_source).collect()
    }

    pub(super) async fn count_user_permission_sources_impl(
        &self,
        user_id: UserId,
        filters: &[Filter<PermissionColumn>],
    ) -> AppResult<u64> {
        validate_filters(filters)?;
        let mut builder = granted_count_query(user_id.as_uuid(), self.options, filters);
        let (count,) = self
            .handle
            .fetch_one(builder.build_query_as::<(i64,)>())
            .await
            .map_err(|error| read_error(error, "count user permission sources"))?;

        row_count(count, "count user permission sources")
    }

    pub(super) async fn list_user_missing_permissions_impl(
        &self,
        user_id: UserId,
        filters: &[Filter<PermissionColumn>],
        page: Page,
    ) -> AppResult<Vec<PermissionSource>> {
        validate_filters(filters)?;
        let mut builder = missing_list_query(user_id.as_uuid(), self.options, filters, page);
        let rows = self
            .handle
            .fetch_all(builder.build_query_as::<PermissionSourceRow>())
            .await
            .map_err(|error| read_error(error, "list user missing permissions"))?;

        debug!(user_id = %user_id, rows = rows.len(), "resolved missing permissions");
        rows.into_iter().map(PermissionSourceRow::into_source).collect()
    }

    pub(super) async fn count_user_missing_permissions_impl(
        &self,
        user_id: UserId,
        filters: &[Filter<PermissionColumn>],
    ) -> AppResult<u64> {
        validate_filters(filters)?;
        let mut builder = missing_count_query(user_id.as_uuid(), self.options, filters);
        let (count,) = self
            .handle
            .fetch_one(builder.build_query_as::<(i64,)>())
            .await
            .map_err(|error| read_error(error, "count user missing permissions"))?;

        row_count(count, "count user missing permissions")
    }
}
