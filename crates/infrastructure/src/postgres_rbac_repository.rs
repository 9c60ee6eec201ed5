//! PostgreSQL-backed role and permission repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use tollgate_application::{
    CreatePermissionInput, CreateRoleInput, PermissionSource, RbacRepository, ResolutionOptions,
    UpdatePermissionInput, UpdateRoleInput,
};
use tollgate_core::AppResult;
use tollgate_domain::{
    Filter, Page, Permission, PermissionColumn, PermissionId, ProductId, Role, RoleColumn, RoleId,
    UserId, uuids_of,
};

use crate::postgres_handle::PgHandle;

mod associations;
mod catalog;
mod loaders;
mod resolution;


use associations::AssociationTable;
use catalog::CatalogTable;

/// PostgreSQL implementation of the RBAC repository port.
#[derive(Clone)]
pub struct PostgresRbacRepository {
    handle: PgHandle,
    options: ResolutionOptions,
}

impl PostgresRbacRepository {
    /// Creates a repository that issues statements through `handle`.
    #[must_use]
    pub fn new(handle: PgHandle, options: ResolutionOptions) -> Self {
        Self { handle, options }
    }
}

/// Column set shared by the `roles` and `permissions` tables.
#[derive(Debug, FromRow)]
struct CatalogRow {
    id: Uuid,
    name: String,
    description: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl CatalogRow {
    fn into_role(self) -> AppResult<Role> {
        Role::new(
            RoleId::from_uuid(self.id),
            self.name,
            self.description,
            self.created_at,
            self.updated_at,
        )
    }

    fn into_permission(self) -> AppResult<Permission> {
        Permission::new(
            PermissionId::from_uuid(self.id),
            self.name,
            self.description,
            self.created_at,
            self.updated_at,
        )
    }
}

#[async_trait]
impl RbacRepository for PostgresRbacRepository {
    async fn create_role(&self, input: CreateRoleInput) -> AppResult<Role> {
        self.create_entry(CatalogTable::Roles, input.name, input.description)
            .await?
            .into_role()
    }

    async fn find_role_by_id(&self, role_id: RoleId) -> AppResult<Option<Role>> {
        self.find_entry_by_id(CatalogTable::Roles, role_id.as_uuid())
            .await?
            .map(CatalogRow::into_role)
            .transpose()
    }

    async fn find_role_by_name(&self, name: &str) -> AppResult<Option<Role>> {
        self.find_entry_by_name(CatalogTable::Roles, name)
            .await?
            .map(CatalogRow::into_role)
            .transpose()
    }

    async fn find_or_create_role(&self, input: CreateRoleInput) -> AppResult<Role> {
        self.find_or_create_entry(CatalogTable::Roles, input.name, input.description)
            .await?
            .into_role()
    }

    async fn update_role(
        &self,
        role_id: RoleId,
        input: UpdateRoleInput,
    ) -> AppResult<Option<Role>> {
        self.update_entry(
            CatalogTable::Roles,
            role_id.as_uuid(),
            input.name,
            input.description,
        )
        .await?
        .map(CatalogRow::into_role)
        .transpose()
    }

    async fn delete_role(&self, role_id: RoleId) -> AppResult<bool> {
        self.delete_entry(CatalogTable::Roles, role_id.as_uuid())
            .await
    }

    async fn list_roles(&self, filters: &[Filter<RoleColumn>], page: Page) -> AppResult<Vec<Role>> {
        self.list_entries(CatalogTable::Roles, filters, page)
            .await?
            .into_iter()
            .map(CatalogRow::into_role)
            .collect()
    }

    async fn count_roles(&self, filters: &[Filter<RoleColumn>]) -> AppResult<u64> {
        self.count_entries(CatalogTable::Roles, filters).await
    }

    async fn create_permission(&self, input: CreatePermissionInput) -> AppResult<Permission> {
        self.create_entry(CatalogTable::Permissions, input.name, input.description)
            .await?
            .into_permission()
    }

    async fn find_permission_by_id(
        &self,
        permission_id: PermissionId,
    ) -> AppResult<Option<Permission>> {
        self.find_entry_by_id(CatalogTable::Permissions, permission_id.as_uuid())
            .await?
            .map(CatalogRow::into_permission)
            .transpose()
    }

    async fn find_permission_by_name(&self, name: &str) -> AppResult<Option<Permission>> {
        self.find_entry_by_name(CatalogTable::Permissions, name)
            .await?
            .map(CatalogRow::into_permission)
            .transpose()
    }

    async fn find_or_create_permission(
        &self,
        input: CreatePermissionInput,
    ) -> AppResult<Permission> {
        self.find_or_create_entry(CatalogTable::Permissions, input.name, input.description)
            .await?
            .into_permission()
    }

    async fn update_permission(
        &self,
        permission_id: PermissionId,
        input: UpdatePermissionInput,
    ) -> AppResult<Option<Permission>> {
        self.update_entry(
            CatalogTable::Permissions,
            permission_id.as_uuid(),
            input.name,
            input.description,
        )
        .await?
        .map(CatalogRow::into_permission)
        .transpose()
    }

    async fn delete_permission(&self, permission_id: PermissionId) -> AppResult<bool> {
        self.delete_entry(CatalogTable::Permissions, permission_id.as_uuid())
            .await
    }

    async fn list_permissions(
        &self,
        filters: &[Filter<PermissionColumn>],
        page: Page,
    ) -> AppResult<Vec<Permission>> {
        self.list_entries(CatalogTable::Permissions, filters, page)
            .await?
            .into_iter()
            .map(CatalogRow::into_permission)
            .collect()
    }

    async fn count_permissions(&self, filters: &[Filter<PermissionColumn>]) -> AppResult<u64> {
        self.count_entries(CatalogTable::Permissions, filters).await
    }

    async fn create_user_roles(&self, user_id: UserId, role_ids: &[RoleId]) -> AppResult<()> {
        self.create_links(
            AssociationTable::UserRoles,
            user_id.as_uuid(),
            uuids_of(role_ids, RoleId::as_uuid),
        )
        .await
    }

    async fn create_user_permissions(
        &self,
        user_id: UserId,
        permission_ids: &[PermissionId],
    ) -> AppResult<()> {
        self.create_links(
            AssociationTable::UserPermissions,
            user_id.as_uuid(),
            uuids_of(permission_ids, PermissionId::as_uuid),
        )
        .await
    }

    async fn create_role_permissions(
        &self,
        role_id: RoleId,
        permission_ids: &[PermissionId],
    ) -> AppResult<()> {
        self.create_links(
            AssociationTable::RolePermissions,
            role_id.as_uuid(),
            uuids_of(permission_ids, PermissionId::as_uuid),
        )
        .await
    }

    async fn create_product_roles(
        &self,
        product_id: ProductId,
        role_ids: &[RoleId],
    ) -> AppResult<()> {
        self.create_links(
            AssociationTable::ProductRoles,
            product_id.as_uuid(),
            uuids_of(role_ids, RoleId::as_uuid),
        )
        .await
    }

    async fn create_product_permissions(
        &self,
        product_id: ProductId,
        permission_ids: &[PermissionId],
    ) -> AppResult<()> {
        self.create_links(
            AssociationTable::ProductPermissions,
            product_id.as_uuid(),
            uuids_of(permission_ids, PermissionId::as_uuid),
        )
        .await
    }

    async fn delete_user_roles(&self, user_id: UserId, role_ids: &[RoleId]) -> AppResult<u64> {
        self.delete_links(
            AssociationTable::UserRoles,
            user_id.as_uuid(),
            uuids_of(role_ids, RoleId::as_uuid),
        )
        .await
    }

    async fn delete_user_permissions(
        &self,
        user_id: UserId,
        permission_ids: &[PermissionId],
    ) -> AppResult<u64> {
        self.delete_links(
            AssociationTable::UserPermissions,
            user_id.as_uuid(),
            uuids_of(permission_ids, PermissionId::as_uuid),
        )
        .await
    }

    async fn delete_role_permissions(
        &self,
        role_id: RoleId,
        permission_ids: &[PermissionId],
    ) -> AppResult<u64> {
        self.delete_links(
            AssociationTable::RolePermissions,
            role_id.as_uuid(),
            uuids_of(permission_ids, PermissionId::as_uuid),
        )
        .await
    }

    async fn delete_product_roles(
        &self,
        product_id: ProductId,
        role_ids: &[RoleId],
    ) -> AppResult<u64> {
        self.delete_links(
            AssociationTable::ProductRoles,
            product_id.as_uuid(),
            uuids_of(role_ids, RoleId::as_uuid),
        )
        .await
    }

    async fn delete_product_permissions(
        &self,
        product_id: ProductId,
        permission_ids: &[PermissionId],
    ) -> AppResult<u64> {
        self.delete_links(
            AssociationTable::ProductPermissions,
            product_id.as_uuid(),
            uuids_of(permission_ids, PermissionId::as_uuid),
        )
        .await
    }

    async fn assign_user_roles(&self, user_id: UserId, role_names: &[String]) -> AppResult<()> {
        self.assign_user_roles_impl(user_id, role_names).await
    }

    async fn load_user_roles(&self, user_ids: &[UserId]) -> AppResult<Vec<Vec<Role>>> {
        self.load_user_roles_impl(user_ids).await
    }

    async fn load_user_permissions(&self, user_ids: &[UserId]) -> AppResult<Vec<Vec<Permission>>> {
        self.load_user_permissions_impl(user_ids).await
    }

    async fn load_role_permissions(&self, role_ids: &[RoleId]) -> AppResult<Vec<Vec<Permission>>> {
        self.load_role_permissions_impl(role_ids).await
    }

    async fn list_user_permission_sources(
        &self,
        user_id: UserId,
        filters: &[Filter<PermissionColumn>],
        page: Page,
    ) -> AppResult<Vec<PermissionSource>> {
        self.list_user_permission_sources_impl(user_id, filters, page)
            .await
    }

    async fn count_user_permission_sources(
        &self,
        user_id: UserId,
        filters: &[Filter<PermissionColumn>],
    ) -> AppResult<u64> {
        self.count_user_permission_sources_impl(user_id, filters)
            .await
    }

    async fn list_user_missing_permissions(
        &self,
        user_id: UserId,
        filters: &[Filter<PermissionColumn>],
        page: Page,
    ) -> AppResult<Vec<PermissionSource>> {
        self.list_user_missing_permissions_impl(user_id, filters, page)
            .await
    }

    async fn count_user_missing_permissions(
        &self,
        user_id: UserId,
        filters: &[Filter<PermissionColumn>],
    ) -> AppResult<u64> {
        self.count_user_missing_permissions_impl(user_id, filters)
            .await
    }
}
