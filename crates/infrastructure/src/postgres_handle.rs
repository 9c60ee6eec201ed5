use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use sqlx::postgres::{PgArguments, PgPool, PgQueryResult, PgRow};
use sqlx::query::{Query, QueryAs};
use sqlx::{FromRow, Postgres, Transaction};
use tokio::sync::{Mutex, MutexGuard};
use tracing::debug;

use tollgate_core::{AppError, AppResult};

/// PostgreSQL handle shared by every store of one bundle.
///
/// A handle targets either the connection pool or one open transaction. All
/// clones of a transaction handle issue their statements on the same
/// connection, strictly in call order.
#[derive(Clone)]
pub struct PgHandle {
    target: HandleTarget,
}

#[derive(Clone)]
enum HandleTarget {
    Pool(PgPool),
    Transaction(Arc<SharedTransaction>),
}

struct SharedTransaction {
    transaction: Mutex<Transaction<'static, Postgres>>,
    savepoints: AtomicU32,
    abandoned: StdMutex<Vec<u32>>,
}

impl SharedTransaction {
    fn abandon(&self, savepoint: u32) {
        self.abandoned
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(savepoint);
    }

    /// Locks the connection after discarding every savepoint whose unit of
    /// work was dropped before it resolved.
    async fn connection(
        &self,
    ) -> Result<MutexGuard<'_, Transaction<'static, Postgres>>, sqlx::Error> {
        let mut transaction = self.transaction.lock().await;
        discard_abandoned(&self.abandoned, &mut transaction).await?;
        Ok(transaction)
    }
}

fn savepoint_name(savepoint: u32) -> String {
    format!("tollgate_savepoint_{savepoint}")
}

/// Rolls back to the outermost abandoned savepoint, which also discards every
/// savepoint opened after it.
async fn discard_abandoned(
    abandoned: &StdMutex<Vec<u32>>,
    transaction: &mut Transaction<'static, Postgres>,
) -> Result<(), sqlx::Error> {
    let outermost = abandoned
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .iter()
        .min()
        .copied();
    let Some(outermost) = outermost else {
        return Ok(());
    };

    let name = savepoint_name(outermost);
    let rollback = format!("ROLLBACK TO SAVEPOINT {name}");
    sqlx::query(&rollback).execute(&mut **transaction).await?;
    let release = format!("RELEASE SAVEPOINT {name}");
    sqlx::query(&release).execute(&mut **transaction).await?;

    abandoned
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .retain(|savepoint| *savepoint < outermost);
    debug!(savepoint = %name, "abandoned savepoint rolled back");
    Ok(())
}

impl PgHandle {
    /// Creates a handle that runs every statement on the pool.
    #[must_use]
    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            target: HandleTarget::Pool(pool),
        }
    }

    /// Returns whether statements run inside an open transaction.
    #[must_use]
    pub fn is_transaction(&self) -> bool {
        matches!(self.target, HandleTarget::Transaction(_))
    }

    /// Fetches every row produced by `query`.
    pub async fn fetch_all<'q, O>(
        &self,
        query: QueryAs<'q, Postgres, O, PgArguments>,
    ) -> Result<Vec<O>, sqlx::Error>
    where
        O: Send + Unpin + for<'r> FromRow<'r, PgRow>,
    {
        match &self.target {
            HandleTarget::Pool(pool) => query.fetch_all(pool).await,
            HandleTarget::Transaction(shared) => {
                let mut transaction = shared.connection().await?;
                query.fetch_all(&mut **transaction).await
            }
        }
    }

    /// Fetches at most one row produced by `query`.
    pub async fn fetch_optional<'q, O>(
        &self,
        query: QueryAs<'q, Postgres, O, PgArguments>,
    ) -> Result<Option<O>, sqlx::Error>
    where
        O: Send + Unpin + for<'r> FromRow<'r, PgRow>,
    {
        match &self.target {
            HandleTarget::Pool(pool) => query.fetch_optional(pool).await,
            HandleTarget::Transaction(shared) => {
                let mut transaction = shared.connection().await?;
                query.fetch_optional(&mut **transaction).await
            }
        }
    }

    /// Fetches exactly one row produced by `query`.
    pub async fn fetch_one<'q, O>(
        &self,
        query: QueryAs<'q, Postgres, O, PgArguments>,
    ) -> Result<O, sqlx::Error>
    where
        O: Send + Unpin + for<'r> FromRow<'r, PgRow>,
    {
        match &self.target {
            HandleTarget::Pool(pool) => query.fetch_one(pool).await,
            HandleTarget::Transaction(shared) => {
                let mut transaction = shared.connection().await?;
                query.fetch_one(&mut **transaction).await
            }
        }
    }

    /// Executes a statement and returns the affected row count.
    pub async fn execute<'q>(
        &self,
        query: Query<'q, Postgres, PgArguments>,
    ) -> Result<PgQueryResult, sqlx::Error> {
        match &self.target {
            HandleTarget::Pool(pool) => query.execute(pool).await,
            HandleTarget::Transaction(shared) => {
                let mut transaction = shared.connection().await?;
                query.execute(&mut **transaction).await
            }
        }
    }

    async fn execute_control(&self, statement: &str) -> Result<(), sqlx::Error> {
        match &self.target {
            HandleTarget::Pool(pool) => sqlx::query(statement).execute(pool).await.map(drop),
            HandleTarget::Transaction(shared) => {
                let mut transaction = shared.connection().await?;
                sqlx::query(statement)
                    .execute(&mut **transaction)
                    .await
                    .map(drop)
            }
        }
    }

    /// Opens a unit of work: a transaction on a pool handle, or a savepoint on
    /// a transaction handle.
    pub(crate) async fn begin(&self) -> AppResult<UnitOfWork> {
        match &self.target {
            HandleTarget::Pool(pool) => {
                let transaction = pool.begin().await.map_err(|error| {
                    AppError::Internal(format!("failed to begin transaction: {error}"))
                })?;
                debug!("transaction started");

                Ok(UnitOfWork {
                    handle: Self {
                        target: HandleTarget::Transaction(Arc::new(SharedTransaction {
                            transaction: Mutex::new(transaction),
                            savepoints: AtomicU32::new(0),
                            abandoned: StdMutex::default(),
                        })),
                    },
                    savepoint: None,
                })
            }
            HandleTarget::Transaction(shared) => {
                let savepoint = shared.savepoints.fetch_add(1, Ordering::SeqCst) + 1;
                let name = savepoint_name(savepoint);
                self.execute_control(format!("SAVEPOINT {name}").as_str())
                    .await
                    .map_err(|error| {
                        AppError::Internal(format!("failed to create savepoint: {error}"))
                    })?;
                debug!(savepoint = %name, "savepoint created");

                Ok(UnitOfWork {
                    handle: self.clone(),
                    savepoint: Some(savepoint),
                })
            }
        }
    }
}

/// Transaction or savepoint opened by [`PgHandle::begin`].
///
/// Dropping a root unit of work without committing rolls the transaction
/// back once every handle clone is gone. Dropping a nested one marks its
/// savepoint abandoned; the next statement on the transaction, or the root
/// commit, rolls back to it first.
pub(crate) struct UnitOfWork {
    handle: PgHandle,
    savepoint: Option<u32>,
}

impl Drop for UnitOfWork {
    fn drop(&mut self) {
        if let (Some(savepoint), HandleTarget::Transaction(shared)) =
            (self.savepoint.take(), &self.handle.target)
        {
            shared.abandon(savepoint);
            debug!(savepoint = %savepoint_name(savepoint), "savepoint abandoned");
        }
    }
}

impl UnitOfWork {
    /// Returns a handle bound to this unit of work.
    pub(crate) fn handle(&self) -> PgHandle {
        self.handle.clone()
    }

    /// Makes the unit's writes durable (or visible to the enclosing unit).
    pub(crate) async fn commit(mut self) -> AppResult<()> {
        if let Some(savepoint) = self.savepoint {
            let name = savepoint_name(savepoint);
            self.handle
                .execute_control(format!("RELEASE SAVEPOINT {name}").as_str())
                .await
                .map_err(|error| {
                    AppError::Internal(format!("failed to release savepoint: {error}"))
                })?;
            self.savepoint = None;
            debug!(savepoint = %name, "savepoint released");
            return Ok(());
        }

        let shared = self.into_exclusive_transaction()?;
        let mut transaction = shared.transaction.into_inner();
        discard_abandoned(&shared.abandoned, &mut transaction)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to roll back savepoint: {error}"))
            })?;
        transaction
            .commit()
            .await
            .map_err(|error| AppError::Internal(format!("failed to commit transaction: {error}")))?;
        debug!("transaction committed");
        Ok(())
    }

    /// Discards the unit's writes.
    pub(crate) async fn rollback(mut self) -> AppResult<()> {
        if let Some(savepoint) = self.savepoint {
            let name = savepoint_name(savepoint);
            self.handle
                .execute_control(format!("ROLLBACK TO SAVEPOINT {name}").as_str())
                .await
                .map_err(|error| {
                    AppError::Internal(format!("failed to roll back savepoint: {error}"))
                })?;
            self.savepoint = None;
            debug!(savepoint = %name, "savepoint rolled back");
            return Ok(());
        }

        let shared = self.into_exclusive_transaction()?;
        shared
            .transaction
            .into_inner()
            .rollback()
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to roll back transaction: {error}"))
            })?;
        debug!("transaction rolled back");
        Ok(())
    }

    fn into_exclusive_transaction(self) -> AppResult<SharedTransaction> {
        let handle = self.handle.clone();
        drop(self);
        let HandleTarget::Transaction(shared) = handle.target else {
            return Err(AppError::Internal(
                "unit of work is not bound to a transaction".to_owned(),
            ));
        };

        Arc::try_unwrap(shared).map_err(|_| {
            AppError::Internal(
                "transaction is still in use by a store outside its unit of work".to_owned(),
            )
        })
    }
}
