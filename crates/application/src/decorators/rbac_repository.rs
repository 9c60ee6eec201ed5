use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tollgate_core::AppResult;
use tollgate_domain::{
    Filter, Page, Permission, PermissionColumn, PermissionId, ProductId, Role, RoleColumn, RoleId,
    UserId,
};

use crate::{
    CreatePermissionInput, CreateRoleInput, PermissionSource, RbacRepository, UpdatePermissionInput,
    UpdateRoleInput,
};

/// [`RbacRepository`] decorator with per-method stubs.
pub struct RbacRepositoryDecorator {
    delegate: Option<Arc<dyn RbacRepository>>,
    stubs: RwLock<RbacRepositoryStubs>,
}

impl RbacRepositoryDecorator {
    /// Wraps a real repository.
    #[must_use]
    pub fn new(delegate: Arc<dyn RbacRepository>) -> Self {
        Self {
            delegate: Some(delegate),
            stubs: RwLock::default(),
        }
    }

    /// Creates a decorator where every method must be stubbed before use.
    #[must_use]
    pub fn without_delegate() -> Self {
        Self {
            delegate: None,
            stubs: RwLock::default(),
        }
    }
}

impl Default for RbacRepositoryDecorator {
    fn default() -> Self {
        Self::without_delegate()
    }
}

define_stubs! {
    RbacRepositoryDecorator, RbacRepositoryStubs, RbacRepository;
    create_role => stub_create_role(CreateRoleInput) -> Role;
    find_role_by_id => stub_find_role_by_id(RoleId) -> Option<Role>;
    find_role_by_name => stub_find_role_by_name(&str) -> Option<Role>;
    find_or_create_role => stub_find_or_create_role(CreateRoleInput) -> Role;
    update_role => stub_update_role(RoleId, UpdateRoleInput) -> Option<Role>;
    delete_role => stub_delete_role(RoleId) -> bool;
    list_roles => stub_list_roles(&[Filter<RoleColumn>], Page) -> Vec<Role>;
    count_roles => stub_count_roles(&[Filter<RoleColumn>]) -> u64;
    create_permission => stub_create_permission(CreatePermissionInput) -> Permission;
    find_permission_by_id => stub_find_permission_by_id(PermissionId) -> Option<Permission>;
    find_permission_by_name => stub_find_permission_by_name(&str) -> Option<Permission>;
    find_or_create_permission =>
        stub_find_or_create_permission(CreatePermissionInput)
        -> Permission;
    update_permission =>
        stub_update_permission(PermissionId, UpdatePermissionInput)
        -> Option<Permission>;
    delete_permission => stub_delete_permission(PermissionId) -> bool;
    list_permissions => stub_list_permissions(&[Filter<PermissionColumn>], Page) -> Vec<Permission>;
    count_permissions => stub_count_permissions(&[Filter<PermissionColumn>]) -> u64;
    create_user_roles => stub_create_user_roles(UserId, &[RoleId]) -> ();
    create_user_permissions => stub_create_user_permissions(UserId, &[PermissionId]) -> ();
    create_role_permissions => stub_create_role_permissions(RoleId, &[PermissionId]) -> ();
    create_product_roles => stub_create_product_roles(ProductId, &[RoleId]) -> ();
    create_product_permissions => stub_create_product_permissions(ProductId, &[PermissionId]) -> ();
    delete_user_roles => stub_delete_user_roles(UserId, &[RoleId]) -> u64;
    delete_user_permissions => stub_delete_user_permissions(UserId, &[PermissionId]) -> u64;
    delete_role_permissions => stub_delete_role_permissions(RoleId, &[PermissionId]) -> u64;
    delete_product_roles => stub_delete_product_roles(ProductId, &[RoleId]) -> u64;
    delete_product_permissions =>
        stub_delete_product_permissions(ProductId, &[PermissionId])
        -> u64;
    assign_user_roles => stub_assign_user_roles(UserId, &[String]) -> ();
    load_user_roles => stub_load_user_roles(&[UserId]) -> Vec<Vec<Role>>;
    load_user_permissions => stub_load_user_permissions(&[UserId]) -> Vec<Vec<Permission>>;
    load_role_permissions => stub_load_role_permissions(&[RoleId]) -> Vec<Vec<Permission>>;
    list_user_permission_sources =>
        stub_list_user_permission_sources(UserId, &[Filter<PermissionColumn>], Page)
        -> Vec<PermissionSource>;
    count_user_permission_sources =>
        stub_count_user_permission_sources(UserId, &[Filter<PermissionColumn>])
        -> u64;
    list_user_missing_permissions =>
        stub_list_user_missing_permissions(UserId, &[Filter<PermissionColumn>], Page)
        -> Vec<PermissionSource>;
    count_user_missing_permissions =>
        stub_count_user_missing_permissions(UserId, &[Filter<PermissionColumn>])
        -> u64;
}

#[async_trait]
impl RbacRepository for RbacRepositoryDecorator {
    async fn create_role(&self, input: CreateRoleInput) -> AppResult<Role> {
        if let Some(stub) = self.stub(|stubs| stubs.create_role.clone()) {
            return stub(input);
        }
        self.delegate("create_role")?.create_role(input).await
    }

    async fn find_role_by_id(&self, role_id: RoleId) -> AppResult<Option<Role>> {
        if let Some(stub) = self.stub(|stubs| stubs.find_role_by_id.clone()) {
            return stub(role_id);
        }
        self.delegate("find_role_by_id")?
            .find_role_by_id(role_id)
            .await
    }

    async fn find_role_by_name(&self, name: &str) -> AppResult<Option<Role>> {
        if let Some(stub) = self.stub(|stubs| stubs.find_role_by_name.clone()) {
            return stub(name);
        }
        self.delegate("find_role_by_name")?
            .find_role_by_name(name)
            .await
    }

    async fn find_or_create_role(&self, input: CreateRoleInput) -> AppResult<Role> {
        if let Some(stub) = self.stub(|stubs| stubs.find_or_create_role.clone()) {
            return stub(input);
        }
        self.delegate("find_or_create_role")?
            .find_or_create_role(input)
            .await
    }

    async fn update_role(
        &self,
        role_id: RoleId,
        input: UpdateRoleInput,
    ) -> AppResult<Option<Role>> {
        if let Some(stub) = self.stub(|stubs| stubs.update_role.clone()) {
            return stub(role_id, input);
        }
        self.delegate("update_role")?
            .update_role(role_id, input)
            .await
    }

    async fn delete_role(&self, role_id: RoleId) -> AppResult<bool> {
        if let Some(stub) = self.stub(|stubs| stubs.delete_role.clone()) {
            return stub(role_id);
        }
        self.delegate("delete_role")?.delete_role(role_id).await
    }

    async fn list_roles(&self, filters: &[Filter<RoleColumn>], page: Page) -> AppResult<Vec<Role>> {
        if let Some(stub) = self.stub(|stubs| stubs.list_roles.clone()) {
            return stub(filters, page);
        }
        self.delegate("list_roles")?.list_roles(filters, page).await
    }

    async fn count_roles(&self, filters: &[Filter<RoleColumn>]) -> AppResult<u64> {
        if let Some(stub) = self.stub(|stubs| stubs.count_roles.clone()) {
            return stub(filters);
        }
        self.delegate("count_roles")?.count_roles(filters).await
    }

    async fn create_permission(&self, input: CreatePermissionInput) -> AppResult<Permission> {
        if let Some(stub) = self.stub(|stubs| stubs.create_permission.clone()) {
            return stub(input);
        }
        self.delegate("create_permission")?
            .create_permission(input)
            .await
    }

    async fn find_permission_by_id(
        &self,
        permission_id: PermissionId,
    ) -> AppResult<Option<Permission>> {
        if let Some(stub) = self.stub(|stubs| stubs.find_permission_by_id.clone()) {
            return stub(permission_id);
        }
        self.delegate("find_permission_by_id")?
            .find_permission_by_id(permission_id)
            .await
    }

    async fn find_permission_by_name(&self, name: &str) -> AppResult<Option<Permission>> {
        if let Some(stub) = self.stub(|stubs| stubs.find_permission_by_name.clone()) {
            return stub(name);
        }
        self.delegate("find_permission_by_name")?
            .find_permission_by_name(name)
            .await
    }

    async fn find_or_create_permission(
        &self,
        input: CreatePermissionInput,
    ) -> AppResult<Permission> {
        if let Some(stub) = self.stub(|stubs| stubs.find_or_create_permission.clone()) {
            return stub(input);
        }
        self.delegate("find_or_create_permission")?
            .find_or_create_permission(input)
            .await
    }

    async fn update_permission(
        &self,
        permission_id: PermissionId,
        input: UpdatePermissionInput,
    ) -> AppResult<Option<Permission>> {
        if let Some(stub) = self.stub(|stubs| stubs.update_permission.clone()) {
            return stub(permission_id, input);
        }
        self.delegate("update_permission")?
            .update_permission(permission_id, input)
            .await
    }

    async fn delete_permission(&self, permission_id: PermissionId) -> AppResult<bool> {
        if let Some(stub) = self.stub(|stubs| stubs.delete_permission.clone()) {
            return stub(permission_id);
        }
        self.delegate("delete_permission")?
            .delete_permission(permission_id)
            .await
    }

    async fn list_permissions(
        &self,
        filters: &[Filter<PermissionColumn>],
        page: Page,
    ) -> AppResult<Vec<Permission>> {
        if let Some(stub) = self.stub(|stubs| stubs.list_permissions.clone()) {
            return stub(filters, page);
        }
        self.delegate("list_permissions")?
            .list_permissions(filters, page)
            .await
    }

    async fn count_permissions(&self, filters: &[Filter<PermissionColumn>]) -> AppResult<u64> {
        if let Some(stub) = self.stub(|stubs| stubs.count_permissions.clone()) {
            return stub(filters);
        }
        self.delegate("count_permissions")?
            .count_permissions(filters)
            .await
    }

    async fn create_user_roles(&self, user_id: UserId, role_ids: &[RoleId]) -> AppResult<()> {
        if let Some(stub) = self.stub(|stubs| stubs.create_user_roles.clone()) {
            return stub(user_id, role_ids);
        }
        self.delegate("create_user_roles")?
            .create_user_roles(user_id, role_ids)
            .await
    }

    async fn create_user_permissions(
        &self,
        user_id: UserId,
        permission_ids: &[PermissionId],
    ) -> AppResult<()> {
        if let Some(stub) = self.stub(|stubs| stubs.create_user_permissions.clone()) {
            return stub(user_id, permission_ids);
        }
        self.delegate("create_user_permissions")?
            .create_user_permissions(user_id, permission_ids)
            .await
    }

    async fn create_role_permissions(
        &self,
        role_id: RoleId,
        permission_ids: &[PermissionId],
    ) -> AppResult<()> {
        if let Some(stub) = self.stub(|stubs| stubs.create_role_permissions.clone()) {
            return stub(role_id, permission_ids);
        }
        self.delegate("create_role_permissions")?
            .create_role_permissions(role_id, permission_ids)
            .await
    }

    async fn create_product_roles(
        &self,
        product_id: ProductId,
        role_ids: &[RoleId],
    ) -> AppResult<()> {
        if let Some(stub) = self.stub(|stubs| stubs.create_product_roles.clone()) {
            return stub(product_id, role_ids);
        }
        self.delegate("create_product_roles")?
            .create_product_roles(product_id, role_ids)
            .await
    }

    async fn create_product_permissions(
        &self,
        product_id: ProductId,
        permission_ids: &[PermissionId],
    ) -> AppResult<()> {
        if let Some(stub) = self.stub(|stubs| stubs.create_product_permissions.clone()) {
            return stub(product_id, permission_ids);
        }
        self.delegate("create_product_permissions")?
            .create_product_permissions(product_id, permission_ids)
            .await
    }

    async fn delete_user_roles(&self, user_id: UserId, role_ids: &[RoleId]) -> AppResult<u64> {
        if let Some(stub) = self.stub(|stubs| stubs.delete_user_roles.clone()) {
            return stub(user_id, role_ids);
        }
        self.delegate("delete_user_roles")?
            .delete_user_roles(user_id, role_ids)
            .await
    }

    async fn delete_user_permissions(
        &self,
        user_id: UserId,
        permission_ids: &[PermissionId],
    ) -> AppResult<u64> {
        if let Some(stub) = self.stub(|stubs| stubs.delete_user_permissions.clone()) {
            return stub(user_id, permission_ids);
        }
        self.delegate("delete_user_permissions")?
            .delete_user_permissions(user_id, permission_ids)
            .await
    }

    async fn delete_role_permissions(
        &self,
        role_id: RoleId,
        permission_ids: &[PermissionId],
    ) -> AppResult<u64> {
        if let Some(stub) = self.stub(|stubs| stubs.delete_role_permissions.clone()) {
            return stub(role_id, permission_ids);
        }
        self.delegate("delete_role_permissions")?
            .delete_role_permissions(role_id, permission_ids)
            .await
    }

    async fn delete_product_roles(
        &self,
        product_id: ProductId,
        role_ids: &[RoleId],
    ) -> AppResult<u64> {
        if let Some(stub) = self.stub(|stubs| stubs.delete_product_roles.clone()) {
            return stub(product_id, role_ids);
        }
        self.delegate("delete_product_roles")?
            .delete_product_roles(product_id, role_ids)
            .await
    }

    async fn delete_product_permissions(
        &self,
        product_id: ProductId,
        permission_ids: &[PermissionId],
    ) -> AppResult<u64> {
        if let Some(stub) = self.stub(|stubs| stubs.delete_product_permissions.clone()) {
            return stub(product_id, permission_ids);
        }
        self.delegate("delete_product_permissions")?
            .delete_product_permissions(product_id, permission_ids)
            .await
    }

    async fn assign_user_roles(&self, user_id: UserId, role_names: &[String]) -> AppResult<()> {
        if let Some(stub) = self.stub(|stubs| stubs.assign_user_roles.clone()) {
            return stub(user_id, role_names);
        }
        self.delegate("assign_user_roles")?
            .assign_user_roles(user_id, role_names)
            .await
    }

    async fn load_user_roles(&self, user_ids: &[UserId]) -> AppResult<Vec<Vec<Role>>> {
        if let Some(stub) = self.stub(|stubs| stubs.load_user_roles.clone()) {
            return stub(user_ids);
        }
        self.delegate("load_user_roles")?
            .load_user_roles(user_ids)
            .await
    }

    async fn load_user_permissions(&self, user_ids: &[UserId]) -> AppResult<Vec<Vec<Permission>>> {
        if let Some(stub) = self.stub(|stubs| stubs.load_user_permissions.clone()) {
            return stub(user_ids);
        }
        self.delegate("load_user_permissions")?
            .load_user_permissions(user_ids)
            .await
    }

    async fn load_role_permissions(&self, role_ids: &[RoleId]) -> AppResult<Vec<Vec<Permission>>> {
        if let Some(stub) = self.stub(|stubs| stubs.load_role_permissions.clone()) {
            return stub(role_ids);
        }
        self.delegate("load_role_permissions")?
            .load_role_permissions(role_ids)
            .await
    }

    async fn list_user_permission_sources(
        &self,
        user_id: UserId,
        filters: &[Filter<PermissionColumn>],
        page: Page,
    ) -> AppResult<Vec<PermissionSource>> {
        if let Some(stub) = self.stub(|stubs| stubs.list_user_permission_sources.clone()) {
            return stub(user_id, filters, page);
        }
        self.delegate("list_user_permission_sources")?
            .list_user_permission_sources(user_id, filters, page)
            .await
    }

    async fn count_user_permission_sources(
        &self,
        user_id: UserId,
        filters: &[Filter<PermissionColumn>],
    ) -> AppResult<u64> {
        if let Some(stub) = self.stub(|stubs| stubs.count_user_permission_sources.clone()) {
            return stub(user_id, filters);
        }
        self.delegate("count_user_permission_sources")?
            .count_user_permission_sources(user_id, filters)
            .await
    }

    async fn list_user_missing_permissions(
        &self,
        user_id: UserId,
        filters: &[Filter<PermissionColumn>],
        page: Page,
    ) -> AppResult<Vec<PermissionSource>> {
        if let Some(stub) = self.stub(|stubs| stubs.list_user_missing_permissions.clone()) {
            return stub(user_id, filters, page);
        }
        self.delegate("list_user_missing_permissions")?
            .list_user_missing_permissions(user_id, filters, page)
            .await
    }

    async fn count_user_missing_permissions(
        &self,
        user_id: UserId,
        filters: &[Filter<PermissionColumn>],
    ) -> AppResult<u64> {
        if let Some(stub) = self.stub(|stubs| stubs.count_user_missing_permissions.clone()) {
            return stub(user_id, filters);
        }
        self.delegate("count_user_missing_permissions")?
            .count_user_missing_permissions(user_id, filters)
            .await
    }
}
