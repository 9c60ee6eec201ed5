use tollgate_core::AppResult;
use tollgate_domain::{EmailAddress, Filter, Page, Permission, PermissionColumn, Role, User, UserId};

use crate::{CreatePermissionInput, CreateRoleInput, PermissionSourcePage, StoreBundle};

/// Input payload for provisioning a role together with its permissions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionRoleInput {
    /// Role name; the role is created when missing.
    pub name: String,
    /// Description used only when the role is created.
    pub description: Option<String>,
    /// Permission names; missing permissions are created.
    pub permission_names: Vec<String>,
}

/// Role and permissions linked by [`RbacAdminService::provision_role`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionedRole {
    /// Provisioned role.
    pub role: Role,
    /// Permissions linked to the role, in input order.
    pub permissions: Vec<Permission>,
}

/// Application service for multi-store role administration.
#[derive(Clone)]
pub struct RbacAdminService<S> {
    store: S,
}

impl<S: StoreBundle> RbacAdminService<S> {
    /// Creates a service over a store bundle.
    #[must_use]
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Finds or creates a role and its permissions and links them atomically.
    pub async fn provision_role(&self, input: ProvisionRoleInput) -> AppResult<ProvisionedRole> {
        let mut permission_names = Vec::with_capacity(input.permission_names.len());
        for name in input.permission_names {
            let name = name.trim().to_owned();
            if !permission_names.contains(&name) {
                permission_names.push(name);
            }
        }

        self.store
            .run_in_tx(move |store| async move {
                let role = store
                    .rbac()
                    .find_or_create_role(CreateRoleInput {
                        name: input.name,
                        description: input.description,
                    })
                    .await?;

                let mut permissions = Vec::with_capacity(permission_names.len());
                for name in permission_names {
                    permissions.push(
                        store
                            .rbac()
                            .find_or_create_permission(CreatePermissionInput::named(name))
                            .await?,
                    );
                }

                let permission_ids = permissions.iter().map(Permission::id).collect::<Vec<_>>();
                store
                    .rbac()
                    .create_role_permissions(role.id(), &permission_ids)
                    .await?;

                Ok(ProvisionedRole { role, permissions })
            })
            .await
    }

    /// Creates a user and assigns roles by name in one unit of work.
    pub async fn register_user(
        &self,
        email: EmailAddress,
        role_names: Vec<String>,
    ) -> AppResult<User> {
        self.store
            .run_in_tx(move |store| async move {
                let user = store.users().create_user(email).await?;
                store
                    .rbac()
                    .assign_user_roles(user.id(), &role_names)
                    .await?;
                Ok(user)
            })
            .await
    }

    /// Returns one page of the user's granted permissions and the total,
    /// both read in the same unit of work.
    pub async fn permission_overview(
        &self,
        user_id: UserId,
        filters: &[Filter<PermissionColumn>],
        page: Page,
    ) -> AppResult<PermissionSourcePage> {
        self.store
            .run_in_tx(move |store| async move {
                let items = store
                    .rbac()
                    .list_user_permission_sources(user_id, filters, page)
                    .await?;
                let total = store
                    .rbac()
                    .count_user_permission_sources(user_id, filters)
                    .await?;
                Ok(PermissionSourcePage { items, total })
            })
            .await
    }

    /// Returns one page of permissions the user does not hold and the total.
    pub async fn grantable_permissions(
        &self,
        user_id: UserId,
        filters: &[Filter<PermissionColumn>],
        page: Page,
    ) -> AppResult<PermissionSourcePage> {
        self.store
            .run_in_tx(move |store| async move {
                let items = store
                    .rbac()
                    .list_user_missing_permissions(user_id, filters, page)
                    .await?;
                let total = store
                    .rbac()
                    .count_user_missing_permissions(user_id, filters)
                    .await?;
                Ok(PermissionSourcePage { items, total })
            })
            .await
    }

    /// Removes a role from a user by role name. Returns whether a link was
    /// removed; an unknown role name removes nothing.
    pub async fn revoke_user_role(&self, user_id: UserId, role_name: &str) -> AppResult<bool> {
        self.store
            .run_in_tx(move |store| async move {
                let Some(role) = store.rbac().find_role_by_name(role_name).await? else {
                    return Ok(false);
                };

                let removed = store
                    .rbac()
                    .delete_user_roles(user_id, &[role.id()])
                    .await?;
                Ok(removed > 0)
            })
            .await
    }
}
