//! In-process store bundle for tests and local tooling.
//!
//! All stores of a bundle share one table set. A unit of work runs against a
//! private copy of the tables, so a failed or cancelled callback leaves no
//! trace. On success only the unit's own changes are merged into the live
//! tables; writes committed elsewhere in the meantime are kept. A merge that
//! would break name or email uniqueness, or link a row deleted in the
//! meantime, fails the unit instead. Units of work on the same bundle are
//! serialized.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use tollgate_application::{RbacRepository, ResolutionOptions, StoreBundle, UserRepository};
use tollgate_core::{AppError, AppResult};
use tollgate_domain::{Permission, PermissionId, ProductId, Role, RoleId, User, UserId};

mod rbac;
mod users;

#[cfg(test)]
mod tests;

pub use rbac::InMemoryRbacRepository;
pub use users::InMemoryUserRepository;

#[derive(Debug, Clone, Default)]
struct InMemoryTables {
    users: HashMap<UserId, User>,
    roles: HashMap<RoleId, Role>,
    permissions: HashMap<PermissionId, Permission>,
    user_roles: HashSet<(UserId, RoleId)>,
    user_permissions: HashSet<(UserId, PermissionId)>,
    role_permissions: HashSet<(RoleId, PermissionId)>,
    product_roles: HashSet<(ProductId, RoleId)>,
    product_permissions: HashSet<(ProductId, PermissionId)>,
    active_subscriptions: HashSet<(UserId, ProductId)>,
}

impl InMemoryTables {
    fn remove_user(&mut self, user_id: UserId) -> bool {
        if self.users.remove(&user_id).is_none() {
            return false;
        }

        self.user_roles.retain(|(user, _)| *user != user_id);
        self.user_permissions.retain(|(user, _)| *user != user_id);
        self.active_subscriptions.retain(|(user, _)| *user != user_id);
        true
    }

    fn remove_role(&mut self, role_id: RoleId) -> bool {
        if self.roles.remove(&role_id).is_none() {
            return false;
        }

        self.user_roles.retain(|(_, role)| *role != role_id);
        self.role_permissions.retain(|(role, _)| *role != role_id);
        self.product_roles.retain(|(_, role)| *role != role_id);
        true
    }

    fn remove_permission(&mut self, permission_id: PermissionId) -> bool {
        if self.permissions.remove(&permission_id).is_none() {
            return false;
        }

        self.user_permissions
            .retain(|(_, permission)| *permission != permission_id);
        self.role_permissions
            .retain(|(_, permission)| *permission != permission_id);
        self.product_permissions
            .retain(|(_, permission)| *permission != permission_id);
        true
    }

    /// Applies the changes `committed` made relative to `base`.
    fn merge_unit_of_work(
        &mut self,
        base: &InMemoryTables,
        committed: &InMemoryTables,
    ) -> AppResult<()> {
        let mut merged = self.clone();
        merge_rows(&mut merged.users, &base.users, &committed.users);
        merge_rows(&mut merged.roles, &base.roles, &committed.roles);
        merge_rows(
            &mut merged.permissions,
            &base.permissions,
            &committed.permissions,
        );
        merge_links(&mut merged.user_roles, &base.user_roles, &committed.user_roles);
        merge_links(
            &mut merged.user_permissions,
            &base.user_permissions,
            &committed.user_permissions,
        );
        merge_links(
            &mut merged.role_permissions,
            &base.role_permissions,
            &committed.role_permissions,
        );
        merge_links(
            &mut merged.product_roles,
            &base.product_roles,
            &committed.product_roles,
        );
        merge_links(
            &mut merged.product_permissions,
            &base.product_permissions,
            &committed.product_permissions,
        );
        merge_links(
            &mut merged.active_subscriptions,
            &base.active_subscriptions,
            &committed.active_subscriptions,
        );

        merged.check_unique_names()?;
        merged.check_added_links(base, committed)?;
        merged.prune_dangling_links();

        *self = merged;
        Ok(())
    }

    fn check_unique_names(&self) -> AppResult<()> {
        if has_duplicates(self.users.values().map(User::email)) {
            return Err(AppError::Conflict(
                "a user with this email was created concurrently".to_owned(),
            ));
        }
        if has_duplicates(self.roles.values().map(Role::name)) {
            return Err(AppError::Conflict(
                "a role with this name was created concurrently".to_owned(),
            ));
        }
        if has_duplicates(self.permissions.values().map(Permission::name)) {
            return Err(AppError::Conflict(
                "a permission with this name was created concurrently".to_owned(),
            ));
        }
        Ok(())
    }

    fn check_added_links(
        &self,
        base: &InMemoryTables,
        committed: &InMemoryTables,
    ) -> AppResult<()> {
        let dangling_user = committed
            .user_roles
            .difference(&base.user_roles)
            .map(|(user_id, _)| *user_id)
            .chain(
                committed
                    .user_permissions
                    .difference(&base.user_permissions)
                    .map(|(user_id, _)| *user_id),
            )
            .chain(
                committed
                    .active_subscriptions
                    .difference(&base.active_subscriptions)
                    .map(|(user_id, _)| *user_id),
            )
            .any(|user_id| !self.users.contains_key(&user_id));
        let dangling_role = committed
            .user_roles
            .difference(&base.user_roles)
            .map(|(_, role_id)| *role_id)
            .chain(
                committed
                    .role_permissions
                    .difference(&base.role_permissions)
                    .map(|(role_id, _)| *role_id),
            )
            .chain(
                committed
                    .product_roles
                    .difference(&base.product_roles)
                    .map(|(_, role_id)| *role_id),
            )
            .any(|role_id| !self.roles.contains_key(&role_id));
        let dangling_permission = committed
            .user_permissions
            .difference(&base.user_permissions)
            .map(|(_, permission_id)| *permission_id)
            .chain(
                committed
                    .role_permissions
                    .difference(&base.role_permissions)
                    .map(|(_, permission_id)| *permission_id),
            )
            .chain(
                committed
                    .product_permissions
                    .difference(&base.product_permissions)
                    .map(|(_, permission_id)| *permission_id),
            )
            .any(|permission_id| !self.permissions.contains_key(&permission_id));

        if dangling_user || dangling_role || dangling_permission {
            return Err(AppError::Validation(
                "unit of work links a row that was deleted concurrently".to_owned(),
            ));
        }
        Ok(())
    }

    fn prune_dangling_links(&mut self) {
        let Self {
            users,
            roles,
            permissions,
            user_roles,
            user_permissions,
            role_permissions,
            product_roles,
            product_permissions,
            active_subscriptions,
        } = self;

        user_roles.retain(|(user, role)| {
            users.contains_key(user) && roles.contains_key(role)
        });
        user_permissions.retain(|(user, permission)| {
            users.contains_key(user) && permissions.contains_key(permission)
        });
        role_permissions.retain(|(role, permission)| {
            roles.contains_key(role) && permissions.contains_key(permission)
        });
        product_roles.retain(|(_, role)| roles.contains_key(role));
        product_permissions.retain(|(_, permission)| permissions.contains_key(permission));
        active_subscriptions.retain(|(user, _)| users.contains_key(user));
    }
}

fn merge_rows<K, V>(live: &mut HashMap<K, V>, base: &HashMap<K, V>, committed: &HashMap<K, V>)
where
    K: Eq + Hash + Copy,
    V: Clone + PartialEq,
{
    for (key, value) in committed {
        if base.get(key) != Some(value) {
            live.insert(*key, value.clone());
        }
    }
    for key in base.keys().filter(|key| !committed.contains_key(*key)) {
        live.remove(key);
    }
}

fn merge_links<T>(live: &mut HashSet<T>, base: &HashSet<T>, committed: &HashSet<T>)
where
    T: Eq + Hash + Copy,
{
    live.extend(committed.difference(base).copied());
    for removed in base.difference(committed) {
        live.remove(removed);
    }
}

fn has_duplicates<T: Eq + Hash>(mut values: impl Iterator<Item = T>) -> bool {
    let mut seen = HashSet::new();
    values.any(|value| !seen.insert(value))
}

type SharedTables = Arc<RwLock<InMemoryTables>>;

/// In-memory implementation of every store, bundled like
/// [`crate::PostgresStore`].
#[derive(Clone)]
pub struct InMemoryStore {
    tables: SharedTables,
    unit_of_work_lock: Arc<Mutex<()>>,
    options: ResolutionOptions,
    users: InMemoryUserRepository,
    rbac: InMemoryRbacRepository,
}

impl InMemoryStore {
    /// Creates an empty store with default resolution options.
    #[must_use]
    pub fn new() -> Self {
        Self::with_options(ResolutionOptions::default())
    }

    /// Creates an empty store.
    #[must_use]
    pub fn with_options(options: ResolutionOptions) -> Self {
        Self::bound_to(SharedTables::default(), options)
    }

    /// Returns the concrete user repository.
    #[must_use]
    pub fn user_repository(&self) -> &InMemoryUserRepository {
        &self.users
    }

    /// Returns the concrete RBAC repository.
    #[must_use]
    pub fn rbac_repository(&self) -> &InMemoryRbacRepository {
        &self.rbac
    }

    /// Records an active subscription entitling the user to the product.
    pub async fn activate_subscription(
        &self,
        user_id: UserId,
        product_id: ProductId,
    ) -> AppResult<()> {
        let mut tables = self.tables.write().await;
        if !tables.users.contains_key(&user_id) {
            return Err(AppError::Validation(format!(
                "user '{user_id}' does not exist"
            )));
        }

        tables.active_subscriptions.insert((user_id, product_id));
        Ok(())
    }

    /// Ends the user's subscription to the product. Returns whether an
    /// active subscription existed.
    pub async fn cancel_subscription(&self, user_id: UserId, product_id: ProductId) -> bool {
        self.tables
            .write()
            .await
            .active_subscriptions
            .remove(&(user_id, product_id))
    }

    fn bound_to(tables: SharedTables, options: ResolutionOptions) -> Self {
        Self {
            users: InMemoryUserRepository::new(Arc::clone(&tables)),
            rbac: InMemoryRbacRepository::new(Arc::clone(&tables), options),
            unit_of_work_lock: Arc::default(),
            tables,
            options,
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StoreBundle for InMemoryStore {
    fn users(&self) -> &dyn UserRepository {
        &self.users
    }

    fn rbac(&self) -> &dyn RbacRepository {
        &self.rbac
    }

    async fn run_in_tx<T, F, Fut>(&self, operation: F) -> AppResult<T>
    where
        T: Send,
        F: FnOnce(Self) -> Fut + Send,
        Fut: Future<Output = AppResult<T>> + Send,
    {
        let _serialized = self.unit_of_work_lock.lock().await;

        let base = self.tables.read().await.clone();
        let scoped = Self::bound_to(Arc::new(RwLock::new(base.clone())), self.options);
        let scoped_tables = Arc::clone(&scoped.tables);

        let value = match operation(scoped).await {
            Ok(value) => value,
            Err(error) => {
                debug!("in-memory unit of work discarded");
                return Err(error);
            }
        };

        let committed = scoped_tables.read().await.clone();
        self.tables
            .write()
            .await
            .merge_unit_of_work(&base, &committed)?;
        debug!("in-memory unit of work committed");
        Ok(value)
    }
}
