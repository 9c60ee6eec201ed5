//! PostgreSQL store bundle.

use std::future::Future;

use sqlx::PgPool;
use tracing::warn;

use tollgate_application::{RbacRepository, ResolutionOptions, StoreBundle, UserRepository};
use tollgate_core::AppResult;

use crate::postgres_handle::PgHandle;
use crate::{PostgresRbacRepository, PostgresUserRepository};

/// Every PostgreSQL store bound to one [`PgHandle`].
#[derive(Clone)]
pub struct PostgresStore {
    handle: PgHandle,
    options: ResolutionOptions,
    users: PostgresUserRepository,
    rbac: PostgresRbacRepository,
}

impl PostgresStore {
    /// Creates a bundle running on the connection pool with default
    /// resolution options.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self::with_options(pool, ResolutionOptions::default())
    }

    /// Creates a bundle running on the connection pool.
    #[must_use]
    pub fn with_options(pool: PgPool, options: ResolutionOptions) -> Self {
        Self::bound_to(PgHandle::from_pool(pool), options)
    }

    /// Returns a bundle whose stores all use `handle`, keeping this bundle's
    /// options.
    #[must_use]
    pub fn with_handle(&self, handle: PgHandle) -> Self {
        Self::bound_to(handle, self.options)
    }

    /// Returns the handle shared by the stores of this bundle.
    #[must_use]
    pub fn handle(&self) -> &PgHandle {
        &self.handle
    }

    /// Returns the concrete user repository.
    #[must_use]
    pub fn user_repository(&self) -> &PostgresUserRepository {
        &self.users
    }

    /// Returns the concrete RBAC repository.
    #[must_use]
    pub fn rbac_repository(&self) -> &PostgresRbacRepository {
        &self.rbac
    }

    fn bound_to(handle: PgHandle, options: ResolutionOptions) -> Self {
        Self {
            users: PostgresUserRepository::new(handle.clone()),
            rbac: PostgresRbacRepository::new(handle.clone(), options),
            handle,
            options,
        }
    }
}

impl StoreBundle for PostgresStore {
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
        let unit_of_work = self.handle.begin().await?;
        let result = operation(self.with_handle(unit_of_work.handle())).await;

        match result {
            Ok(value) => {
                unit_of_work.commit().await?;
                Ok(value)
            }
            Err(error) => {
                if let Err(rollback_error) = unit_of_work.rollback().await {
                    warn!(
                        error = %rollback_error,
                        "rollback failed after unit of work error"
                    );
                }
                Err(error)
            }
        }
    }
}
