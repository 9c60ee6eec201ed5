use async_trait::async_trait;

use tollgate_core::AppResult;
use tollgate_domain::{
    Filter, Page, Permission, PermissionColumn, PermissionId, ProductId, Role, RoleColumn, RoleId,
    UserId,
};

/// Input payload for creating roles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateRoleInput {
    /// Unique role name.
    pub name: String,
    /// Optional human-readable description.
    pub description: Option<String>,
}

impl CreateRoleInput {
    /// Creates an input with a name and no description.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
        }
    }
}

/// Input payload for creating permissions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatePermissionInput {
    /// Unique permission name.
    pub name: String,
    /// Optional human-readable description.
    pub description: Option<String>,
}

impl CreatePermissionInput {
    /// Creates an input with a name and no description.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
        }
    }
}

/// Partial update for a role. `None` keeps the stored value; a blank
/// description clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateRoleInput {
    /// Replacement name.
    pub name: Option<String>,
    /// Replacement description.
    pub description: Option<String>,
}

/// Partial update for a permission. `None` keeps the stored value; a blank
/// description clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdatePermissionInput {
    /// Replacement name.
    pub name: Option<String>,
    /// Replacement description.
    pub description: Option<String>,
}

/// Permission currently granted to a user, with the grants that justify it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionSource {
    /// Granted permission.
    pub permission: Permission,
    /// Distinct roles granting the permission, ordered by id.
    pub role_ids: Vec<RoleId>,
    /// Distinct products granting the permission, ordered by id.
    pub product_ids: Vec<ProductId>,
    /// Whether the permission is also assigned to the user directly.
    pub is_directly_assigned: bool,
}

impl PermissionSource {
    /// Returns a row with no provenance, as reported for permissions the
    /// user does not hold.
    #[must_use]
    pub fn ungranted(permission: Permission) -> Self {
        Self {
            permission,
            role_ids: Vec::new(),
            product_ids: Vec::new(),
            is_directly_assigned: false,
        }
    }
}

/// One page of permission sources with the total across all pages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionSourcePage {
    /// Rows in the requested window.
    pub items: Vec<PermissionSource>,
    /// Number of rows matching the filters regardless of paging.
    pub total: u64,
}

/// Switches for the optional permission sources.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolutionOptions {
    /// Grants permissions reachable through products of active subscriptions.
    pub entitlement_grants: bool,
}

/// Repository port for roles, permissions, their associations and
/// effective-permission resolution.
#[async_trait]
pub trait RbacRepository: Send + Sync {
    /// Creates a role.
    async fn create_role(&self, input: CreateRoleInput) -> AppResult<Role>;

    /// Finds a role by identifier.
    async fn find_role_by_id(&self, role_id: RoleId) -> AppResult<Option<Role>>;

    /// Finds a role by unique name.
    async fn find_role_by_name(&self, name: &str) -> AppResult<Option<Role>>;

    /// Returns the role with the given name, creating it when missing.
    async fn find_or_create_role(&self, input: CreateRoleInput) -> AppResult<Role>;

    /// Updates a role. Returns `None` when the role does not exist.
    async fn update_role(&self, role_id: RoleId, input: UpdateRoleInput)
    -> AppResult<Option<Role>>;

    /// Deletes a role. Returns whether a row was removed.
    async fn delete_role(&self, role_id: RoleId) -> AppResult<bool>;

    /// Lists roles matching all filters, ordered by name.
    async fn list_roles(&self, filters: &[Filter<RoleColumn>], page: Page) -> AppResult<Vec<Role>>;

    /// Counts roles matching all filters.
    async fn count_roles(&self, filters: &[Filter<RoleColumn>]) -> AppResult<u64>;

    /// Creates a permission.
    async fn create_permission(&self, input: CreatePermissionInput) -> AppResult<Permission>;

    /// Finds a permission by identifier.
    async fn find_permission_by_id(
        &self,
        permission_id: PermissionId,
    ) -> AppResult<Option<Permission>>;

    /// Finds a permission by unique name.
    async fn find_permission_by_name(&self, name: &str) -> AppResult<Option<Permission>>;

    /// Returns the permission with the given name, creating it when missing.
    async fn find_or_create_permission(
        &self,
        input: CreatePermissionInput,
    ) -> AppResult<Permission>;

    /// Updates a permission. Returns `None` when the permission does not exist.
    async fn update_permission(
        &self,
        permission_id: PermissionId,
        input: UpdatePermissionInput,
    ) -> AppResult<Option<Permission>>;

    /// Deletes a permission. Returns whether a row was removed.
    async fn delete_permission(&self, permission_id: PermissionId) -> AppResult<bool>;

    /// Lists permissions matching all filters, ordered by name.
    async fn list_permissions(
        &self,
        filters: &[Filter<PermissionColumn>],
        page: Page,
    ) -> AppResult<Vec<Permission>>;

    /// Counts permissions matching all filters.
    async fn count_permissions(&self, filters: &[Filter<PermissionColumn>]) -> AppResult<u64>;

    /// Links roles to a user. Existing links are kept.
    async fn create_user_roles(&self, user_id: UserId, role_ids: &[RoleId]) -> AppResult<()>;

    /// Grants permissions directly to a user. Existing grants are kept.
    async fn create_user_permissions(
        &self,
        user_id: UserId,
        permission_ids: &[PermissionId],
    ) -> AppResult<()>;

    /// Links permissions to a role. Existing links are kept.
    async fn create_role_permissions(
        &self,
        role_id: RoleId,
        permission_ids: &[PermissionId],
    ) -> AppResult<()>;

    /// Links roles to a product. Existing links are kept.
    async fn create_product_roles(&self, product_id: ProductId, role_ids: &[RoleId])
    -> AppResult<()>;

    /// Links permissions to a product. Existing links are kept.
    async fn create_product_permissions(
        &self,
        product_id: ProductId,
        permission_ids: &[PermissionId],
    ) -> AppResult<()>;

    /// Unlinks roles from a user. Returns the number of removed links.
    async fn delete_user_roles(&self, user_id: UserId, role_ids: &[RoleId]) -> AppResult<u64>;

    /// Revokes direct permission grants. Returns the number of removed grants.
    async fn delete_user_permissions(
        &self,
        user_id: UserId,
        permission_ids: &[PermissionId],
    ) -> AppResult<u64>;

    /// Unlinks permissions from a role. Returns the number of removed links.
    async fn delete_role_permissions(
        &self,
        role_id: RoleId,
        permission_ids: &[PermissionId],
    ) -> AppResult<u64>;

    /// Unlinks roles from a product. Returns the number of removed links.
    async fn delete_product_roles(&self, product_id: ProductId, role_ids: &[RoleId])
    -> AppResult<u64>;

    /// Unlinks permissions from a product. Returns the number of removed links.
    async fn delete_product_permissions(
        &self,
        product_id: ProductId,
        permission_ids: &[PermissionId],
    ) -> AppResult<u64>;

    /// Assigns roles by name. Unknown role names are skipped; an unknown user
    /// is reported as [`tollgate_core::AppError::NotFound`].
    async fn assign_user_roles(&self, user_id: UserId, role_names: &[String]) -> AppResult<()>;

    /// Loads the roles of each user, aligned with `user_ids`.
    async fn load_user_roles(&self, user_ids: &[UserId]) -> AppResult<Vec<Vec<Role>>>;

    /// Loads the direct permission grants of each user, aligned with `user_ids`.
    async fn load_user_permissions(&self, user_ids: &[UserId]) -> AppResult<Vec<Vec<Permission>>>;

    /// Loads the permissions of each role, aligned with `role_ids`.
    async fn load_role_permissions(&self, role_ids: &[RoleId]) -> AppResult<Vec<Vec<Permission>>>;

    /// Lists permissions granted to a user with their provenance, ordered by
    /// `(name, id)`.
    async fn list_user_permission_sources(
        &self,
        user_id: UserId,
        filters: &[Filter<PermissionColumn>],
        page: Page,
    ) -> AppResult<Vec<PermissionSource>>;

    /// Counts distinct permissions granted to a user.
    async fn count_user_permission_sources(
        &self,
        user_id: UserId,
        filters: &[Filter<PermissionColumn>],
    ) -> AppResult<u64>;

    /// Lists permissions the user does not hold, ordered by `(name, id)`.
    async fn list_user_missing_permissions(
        &self,
        user_id: UserId,
        filters: &[Filter<PermissionColumn>],
        page: Page,
    ) -> AppResult<Vec<PermissionSource>>;

    /// Counts permissions the user does not hold.
    async fn count_user_missing_permissions(
        &self,
        user_id: UserId,
        filters: &[Filter<PermissionColumn>],
    ) -> AppResult<u64>;
}
