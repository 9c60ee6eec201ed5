use std::future::Future;

use tollgate_core::AppResult;

use crate::{RbacRepository, UserRepository};

/// Bundle of domain stores bound to one database handle.
///
/// Every store obtained from the same bundle shares its handle, so writes
/// issued inside one [`StoreBundle::run_in_tx`] callback observe each other.
pub trait StoreBundle: Clone + Send + Sync {
    /// Returns the user store.
    fn users(&self) -> &dyn UserRepository;

    /// Returns the role and permission store.
    fn rbac(&self) -> &dyn RbacRepository;

    /// Runs `operation` against a bundle bound to a new unit of work.
    ///
    /// Commits when `operation` returns `Ok` and rolls back otherwise. The
    /// callback's error is returned unchanged. Calling this on a bundle that
    /// is already inside a unit of work opens a nested one: an inner failure
    /// discards only the inner writes.
    fn run_in_tx<T, F, Fut>(&self, operation: F) -> impl Future<Output = AppResult<T>> + Send
    where
        T: Send,
        F: FnOnce(Self) -> Fut + Send,
        Fut: Future<Output = AppResult<T>> + Send;
}
