use std::collections::HashSet;
use std::hash::Hash;

use async_trait::async_trait;
use chrono::Utc;

use tollgate_application::{
    CreatePermissionInput, CreateRoleInput, GrantCandidate, PermissionSource, RbacRepository,
    ResolutionOptions, UpdatePermissionInput, UpdateRoleInput, align_groups, distinct_keys,
    resolve_missing_permissions, resolve_permission_sources,
};
use tollgate_core::{AppError, AppResult};
use tollgate_domain::{
    Filter, Page, Permission, PermissionColumn, PermissionId, ProductId, Role, RoleColumn, RoleId,
    UserId, matches_all, validate_filters,
};

use super::{InMemoryTables, SharedTables};

/// In-memory RBAC repository sharing its bundle's tables.
#[derive(Clone)]
pub struct InMemoryRbacRepository {
    tables: SharedTables,
    options: ResolutionOptions,
}

impl InMemoryRbacRepository {
    pub(super) fn new(tables: SharedTables, options: ResolutionOptions) -> Self {
        Self { tables, options }
    }
}

fn by_name_then_id<T, I: Ord>(entries: &mut [T], name: impl Fn(&T) -> &str, id: impl Fn(&T) -> I) {
    entries.sort_by(|left, right| {
        name(left)
            .cmp(name(right))
            .then_with(|| id(left).cmp(&id(right)))
    });
}

fn sorted_roles<'a>(roles: impl Iterator<Item = &'a Role>) -> Vec<Role> {
    let mut roles = roles.cloned().collect::<Vec<_>>();
    by_name_then_id(&mut roles, Role::name, Role::id);
    roles
}

fn sorted_permissions<'a>(permissions: impl Iterator<Item = &'a Permission>) -> Vec<Permission> {
    let mut permissions = permissions.cloned().collect::<Vec<_>>();
    by_name_then_id(&mut permissions, Permission::name, Permission::id);
    permissions
}

fn missing_reference(kind: &str, id: impl std::fmt::Display) -> AppError {
    AppError::Validation(format!("{kind} '{id}' does not exist"))
}

/// Merged description for an update: `None` keeps, blank clears.
fn updated_description(current: Option<&str>, replacement: Option<String>) -> Option<String> {
    match replacement {
        Some(value) => Some(value),
        None => current.map(str::to_owned),
    }
}

fn insert_links<P, C>(links: &mut HashSet<(P, C)>, parent: P, children: &[C])
where
    P: Copy + Eq + Hash,
    C: Copy + Eq + Hash,
{
    links.extend(children.iter().map(|child| (parent, *child)));
}

fn remove_links<P, C>(links: &mut HashSet<(P, C)>, parent: P, children: &[C]) -> u64
where
    P: Copy + Eq + Hash,
    C: Copy + Eq + Hash,
{
    let targets = children.iter().copied().collect::<HashSet<_>>();
    let before = links.len();
    links.retain(|(linked_parent, child)| {
        *linked_parent != parent || !targets.contains(child)
    });
    (before - links.len()) as u64
}

fn grant_candidates(
    tables: &InMemoryTables,
    user_id: UserId,
    options: ResolutionOptions,
) -> Vec<GrantCandidate> {
    let mut candidates = Vec::new();

    for (_, role_id) in tables
        .user_roles
        .iter()
        .filter(|(user, _)| *user == user_id)
    {
        candidates.extend(
            tables
                .role_permissions
                .iter()
                .filter(|(role, _)| role == role_id)
                .map(|(_, permission_id)| GrantCandidate::via_role(*permission_id, *role_id)),
        );
    }

    candidates.extend(
        tables
            .user_permissions
            .iter()
            .filter(|(user, _)| *user == user_id)
            .map(|(_, permission_id)| GrantCandidate::direct(*permission_id)),
    );

    if options.entitlement_grants {
        for (_, product_id) in tables
            .active_subscriptions
            .iter()
            .filter(|(user, _)| *user == user_id)
        {
            candidates.extend(
                tables
                    .product_permissions
                    .iter()
                    .filter(|(product, _)| product == product_id)
                    .map(|(_, permission_id)| {
                        GrantCandidate::via_product(*permission_id, *product_id)
                    }),
            );

            for (_, role_id) in tables
                .product_roles
                .iter()
                .filter(|(product, _)| product == product_id)
            {
                candidates.extend(
                    tables
                        .role_permissions
                        .iter()
                        .filter(|(role, _)| role == role_id)
                        .map(|(_, permission_id)| {
                            GrantCandidate::via_product(*permission_id, *product_id)
                        }),
                );
            }
        }
    }

    candidates
}

fn filtered_permissions(
    tables: &InMemoryTables,
    filters: &[Filter<PermissionColumn>],
) -> Vec<Permission> {
    tables
        .permissions
        .values()
        .filter(|permission| matches_all(filters, *permission))
        .cloned()
        .collect()
}

impl InMemoryRbacRepository {
    async fn granted_sources(
        &self,
        user_id: UserId,
        filters: &[Filter<PermissionColumn>],
    ) -> AppResult<Vec<PermissionSource>> {
        validate_filters(filters)?;
        let tables = self.tables.read().await;
        let candidates = grant_candidates(&tables, user_id, self.options);
        Ok(resolve_permission_sources(&filtered_permissions(&tables, filters), &candidates))
    }

    async fn missing_sources(
        &self,
        user_id: UserId,
        filters: &[Filter<PermissionColumn>],
    ) -> AppResult<Vec<PermissionSource>> {
        validate_filters(filters)?;
        let tables = self.tables.read().await;
        let candidates = grant_candidates(&tables, user_id, self.options);
        Ok(resolve_missing_permissions(&filtered_permissions(&tables, filters), &candidates))
    }
}

#[async_trait]
impl RbacRepository for InMemoryRbacRepository {
    async fn create_role(&self, input: CreateRoleInput) -> AppResult<Role> {
        let now = Utc::now();
        let role = Role::new(RoleId::new(), input.name, input.description, now, now)?;

        let mut tables = self.tables.write().await;
        if tables
            .roles
            .values()
            .any(|stored| stored.name() == role.name())
        {
            return Err(AppError::Conflict(format!(
                "role '{}' already exists",
                role.name()
            )));
        }

        tables.roles.insert(role.id(), role.clone());
        Ok(role)
    }

    async fn find_role_by_id(&self, role_id: RoleId) -> AppResult<Option<Role>> {
        Ok(self.tables.read().await.roles.get(&role_id).cloned())
    }

    async fn find_role_by_name(&self, name: &str) -> AppResult<Option<Role>> {
        let name = name.trim();
        Ok(self
            .tables
            .read()
            .await
            .roles
            .values()
            .find(|role| role.name() == name)
            .cloned())
    }

    async fn find_or_create_role(&self, input: CreateRoleInput) -> AppResult<Role> {
        let now = Utc::now();
        let candidate = Role::new(RoleId::new(), input.name, input.description, now, now)?;

        let mut tables = self.tables.write().await;
        if let Some(existing) = tables
            .roles
            .values()
            .find(|stored| stored.name() == candidate.name())
        {
            return Ok(existing.clone());
        }

        tables.roles.insert(candidate.id(), candidate.clone());
        Ok(candidate)
    }

    async fn update_role(
        &self,
        role_id: RoleId,
        input: UpdateRoleInput,
    ) -> AppResult<Option<Role>> {
        let mut tables = self.tables.write().await;
        let Some(current) = tables.roles.get(&role_id) else {
            return Ok(None);
        };

        let updated = Role::new(
            role_id,
            input.name.unwrap_or_else(|| current.name().to_owned()),
            updated_description(current.description(), input.description),
            current.created_at(),
            Utc::now(),
        )?;

        if tables
            .roles
            .values()
            .any(|stored| stored.id() != role_id && stored.name() == updated.name())
        {
            return Err(AppError::Conflict(format!(
                "role '{}' already exists",
                updated.name()
            )));
        }

        tables.roles.insert(role_id, updated.clone());
        Ok(Some(updated))
    }

    async fn delete_role(&self, role_id: RoleId) -> AppResult<bool> {
        Ok(self.tables.write().await.remove_role(role_id))
    }

    async fn list_roles(&self, filters: &[Filter<RoleColumn>], page: Page) -> AppResult<Vec<Role>> {
        validate_filters(filters)?;
        let tables = self.tables.read().await;
        let roles = sorted_roles(
            tables
                .roles
                .values()
                .filter(|role| matches_all(filters, *role)),
        );
        Ok(page.slice(roles))
    }

    async fn count_roles(&self, filters: &[Filter<RoleColumn>]) -> AppResult<u64> {
        validate_filters(filters)?;
        let tables = self.tables.read().await;
        Ok(tables
            .roles
            .values()
            .filter(|role| matches_all(filters, *role))
            .count() as u64)
    }

    async fn create_permission(&self, input: CreatePermissionInput) -> AppResult<Permission> {
        let now = Utc::now();
        let permission =
            Permission::new(PermissionId::new(), input.name, input.description, now, now)?;

        let mut tables = self.tables.write().await;
        if tables
            .permissions
            .values()
            .any(|stored| stored.name() == permission.name())
        {
            return Err(AppError::Conflict(format!(
                "permission '{}' already exists",
                permission.name()
            )));
        }

        tables
            .permissions
            .insert(permission.id(), permission.clone());
        Ok(permission)
    }

    async fn find_permission_by_id(
        &self,
        permission_id: PermissionId,
    ) -> AppResult<Option<Permission>> {
        Ok(self
            .tables
            .read()
            .await
            .permissions
            .get(&permission_id)
            .cloned())
    }

    async fn find_permission_by_name(&self, name: &str) -> AppResult<Option<Permission>> {
        let name = name.trim();
        Ok(self
            .tables
            .read()
            .await
            .permissions
            .values()
            .find(|permission| permission.name() == name)
            .cloned())
    }

    async fn find_or_create_permission(
        &self,
        input: CreatePermissionInput,
    ) -> AppResult<Permission> {
        let now = Utc::now();
        let candidate =
            Permission::new(PermissionId::new(), input.name, input.description, now, now)?;

        let mut tables = self.tables.write().await;
        if let Some(existing) = tables
            .permissions
            .values()
            .find(|stored| stored.name() == candidate.name())
        {
            return Ok(existing.clone());
        }

        tables
            .permissions
            .insert(candidate.id(), candidate.clone());
        Ok(candidate)
    }

    async fn update_permission(
        &self,
        permission_id: PermissionId,
        input: UpdatePermissionInput,
    ) -> AppResult<Option<Permission>> {
        let mut tables = self.tables.write().await;
        let Some(current) = tables.permissions.get(&permission_id) else {
            return Ok(None);
        };

        let updated = Permission::new(
            permission_id,
            input.name.unwrap_or_else(|| current.name().to_owned()),
            updated_description(current.description(), input.description),
            current.created_at(),
            Utc::now(),
        )?;

        if tables
            .permissions
            .values()
            .any(|stored| stored.id() != permission_id && stored.name() == updated.name())
        {
            return Err(AppError::Conflict(format!(
                "permission '{}' already exists",
                updated.name()
            )));
        }

        tables.permissions.insert(permission_id, updated.clone());
        Ok(Some(updated))
    }

    async fn delete_permission(&self, permission_id: PermissionId) -> AppResult<bool> {
        Ok(self.tables.write().await.remove_permission(permission_id))
    }

    async fn list_permissions(
        &self,
        filters: &[Filter<PermissionColumn>],
        page: Page,
    ) -> AppResult<Vec<Permission>> {
        validate_filters(filters)?;
        let tables = self.tables.read().await;
        let permissions = sorted_permissions(
            tables
                .permissions
                .values()
                .filter(|permission| matches_all(filters, *permission)),
        );
        Ok(page.slice(permissions))
    }

    async fn count_permissions(&self, filters: &[Filter<PermissionColumn>]) -> AppResult<u64> {
        validate_filters(filters)?;
        let tables = self.tables.read().await;
        Ok(tables
            .permissions
            .values()
            .filter(|permission| matches_all(filters, *permission))
            .count() as u64)
    }

    async fn create_user_roles(&self, user_id: UserId, role_ids: &[RoleId]) -> AppResult<()> {
        if role_ids.is_empty() {
            return Ok(());
        }

        let mut tables = self.tables.write().await;
        if !tables.users.contains_key(&user_id) {
            return Err(missing_reference("user", user_id));
        }
        if let Some(role_id) = role_ids.iter().find(|id| !tables.roles.contains_key(*id)) {
            return Err(missing_reference("role", role_id));
        }

        insert_links(&mut tables.user_roles, user_id, role_ids);
        Ok(())
    }

    async fn create_user_permissions(
        &self,
        user_id: UserId,
        permission_ids: &[PermissionId],
    ) -> AppResult<()> {
        if permission_ids.is_empty() {
            return Ok(());
        }

        let mut tables = self.tables.write().await;
        if !tables.users.contains_key(&user_id) {
            return Err(missing_reference("user", user_id));
        }
        if let Some(permission_id) = permission_ids
            .iter()
            .find(|id| !tables.permissions.contains_key(*id))
        {
            return Err(missing_reference("permission", permission_id));
        }

        insert_links(&mut tables.user_permissions, user_id, permission_ids);
        Ok(())
    }

    async fn create_role_permissions(
        &self,
        role_id: RoleId,
        permission_ids: &[PermissionId],
    ) -> AppResult<()> {
        if permission_ids.is_empty() {
            return Ok(());
        }

        let mut tables = self.tables.write().await;
        if !tables.roles.contains_key(&role_id) {
            return Err(missing_reference("role", role_id));
        }
        if let Some(permission_id) = permission_ids
            .iter()
            .find(|id| !tables.permissions.contains_key(*id))
        {
            return Err(missing_reference("permission", permission_id));
        }

        insert_links(&mut tables.role_permissions, role_id, permission_ids);
        Ok(())
    }

    async fn create_product_roles(
        &self,
        product_id: ProductId,
        role_ids: &[RoleId],
    ) -> AppResult<()> {
        if role_ids.is_empty() {
            return Ok(());
        }

        let mut tables = self.tables.write().await;
        if let Some(role_id) = role_ids.iter().find(|id| !tables.roles.contains_key(*id)) {
            return Err(missing_reference("role", role_id));
        }

        insert_links(&mut tables.product_roles, product_id, role_ids);
        Ok(())
    }

    async fn create_product_permissions(
        &self,
        product_id: ProductId,
        permission_ids: &[PermissionId],
    ) -> AppResult<()> {
        if permission_ids.is_empty() {
            return Ok(());
        }

        let mut tables = self.tables.write().await;
        if let Some(permission_id) = permission_ids
            .iter()
            .find(|id| !tables.permissions.contains_key(*id))
        {
            return Err(missing_reference("permission", permission_id));
        }

        insert_links(&mut tables.product_permissions, product_id, permission_ids);
        Ok(())
    }

    async fn delete_user_roles(&self, user_id: UserId, role_ids: &[RoleId]) -> AppResult<u64> {
        if role_ids.is_empty() {
            return Ok(0);
        }

        let mut tables = self.tables.write().await;
        Ok(remove_links(&mut tables.user_roles, user_id, role_ids))
    }

    async fn delete_user_permissions(
        &self,
        user_id: UserId,
        permission_ids: &[PermissionId],
    ) -> AppResult<u64> {
        if permission_ids.is_empty() {
            return Ok(0);
        }

        let mut tables = self.tables.write().await;
        Ok(remove_links(
            &mut tables.user_permissions,
            user_id,
            permission_ids,
        ))
    }

    async fn delete_role_permissions(
        &self,
        role_id: RoleId,
        permission_ids: &[PermissionId],
    ) -> AppResult<u64> {
        if permission_ids.is_empty() {
            return Ok(0);
        }

        let mut tables = self.tables.write().await;
        Ok(remove_links(
            &mut tables.role_permissions,
            role_id,
            permission_ids,
        ))
    }

    async fn delete_product_roles(
        &self,
        product_id: ProductId,
        role_ids: &[RoleId],
    ) -> AppResult<u64> {
        if role_ids.is_empty() {
            return Ok(0);
        }

        let mut tables = self.tables.write().await;
        Ok(remove_links(&mut tables.product_roles, product_id, role_ids))
    }

    async fn delete_product_permissions(
        &self,
        product_id: ProductId,
        permission_ids: &[PermissionId],
    ) -> AppResult<u64> {
        if permission_ids.is_empty() {
            return Ok(0);
        }

        let mut tables = self.tables.write().await;
        Ok(remove_links(
            &mut tables.product_permissions,
            product_id,
            permission_ids,
        ))
    }

    async fn assign_user_roles(&self, user_id: UserId, role_names: &[String]) -> AppResult<()> {
        if role_names.is_empty() {
            return Ok(());
        }

        let mut tables = self.tables.write().await;
        if !tables.users.contains_key(&user_id) {
            return Err(AppError::NotFound(format!("user '{user_id}' does not exist")));
        }

        let names = role_names
            .iter()
            .map(|name| name.trim())
            .collect::<HashSet<_>>();
        let role_ids = tables
            .roles
            .values()
            .filter(|role| names.contains(role.name()))
            .map(Role::id)
            .collect::<Vec<_>>();

        insert_links(&mut tables.user_roles, user_id, &role_ids);
        Ok(())
    }

    async fn load_user_roles(&self, user_ids: &[UserId]) -> AppResult<Vec<Vec<Role>>> {
        let tables = self.tables.read().await;
        let groups = distinct_keys(user_ids).into_iter().map(|user_id| {
            let roles = sorted_roles(
                tables
                    .user_roles
                    .iter()
                    .filter(|(user, _)| *user == user_id)
                    .filter_map(|(_, role_id)| tables.roles.get(role_id)),
            );
            (user_id, roles)
        });

        Ok(align_groups(user_ids, groups))
    }

    async fn load_user_permissions(&self, user_ids: &[UserId]) -> AppResult<Vec<Vec<Permission>>> {
        let tables = self.tables.read().await;
        let groups = distinct_keys(user_ids).into_iter().map(|user_id| {
            let permissions = sorted_permissions(
                tables
                    .user_permissions
                    .iter()
                    .filter(|(user, _)| *user == user_id)
                    .filter_map(|(_, permission_id)| tables.permissions.get(permission_id)),
            );
            (user_id, permissions)
        });

        Ok(align_groups(user_ids, groups))
    }

    async fn load_role_permissions(&self, role_ids: &[RoleId]) -> AppResult<Vec<Vec<Permission>>> {
        let tables = self.tables.read().await;
        let groups = distinct_keys(role_ids).into_iter().map(|role_id| {
            let permissions = sorted_permissions(
                tables
                    .role_permissions
                    .iter()
                    .filter(|(role, _)| *role == role_id)
                    .filter_map(|(_, permission_id)| tables.permissions.get(permission_id)),
            );
            (role_id, permissions)
        });

        Ok(align_groups(role_ids, groups))
    }

    async fn list_user_permission_sources(
        &self,
        user_id: UserId,
        filters: &[Filter<PermissionColumn>],
        page: Page,
    ) -> AppResult<Vec<PermissionSource>> {
        Ok(page.slice(self.granted_sources(user_id, filters).await?))
    }

    async fn count_user_permission_sources(
        &self,
        user_id: UserId,
        filters: &[Filter<PermissionColumn>],
    ) -> AppResult<u64> {
        Ok(self.granted_sources(user_id, filters).await?.len() as u64)
    }

    async fn list_user_missing_permissions(
        &self,
        user_id: UserId,
        filters: &[Filter<PermissionColumn>],
        page: Page,
    ) -> AppResult<Vec<PermissionSource>> {
        Ok(page.slice(self.missing_sources(user_id, filters).await?))
    }

    async fn count_user_missing_permissions(
        &self,
        user_id: UserId,
        filters: &[Filter<PermissionColumn>],
    ) -> AppResult<u64> {
        Ok(self.missing_sources(user_id, filters).await?.len() as u64)
    }
}
