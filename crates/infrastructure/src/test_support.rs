use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

use tollgate_domain::EmailAddress;

use crate::store_config::MIGRATOR;

/// Connects to `DATABASE_URL` and migrates it, or returns `None` so that
/// database tests are skipped when no server is configured.
pub(crate) async fn test_pool() -> Option<PgPool> {
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        return None;
    };

    let pool = match PgPoolOptions::new()
        .max_connections(4)
        .connect(database_url.as_str())
        .await
    {
        Ok(pool) => pool,
        Err(error) => panic!("failed to connect to DATABASE_URL in test: {error}"),
    };

    if let Err(error) = MIGRATOR.run(&pool).await {
        panic!("failed to run migrations for postgres tests: {error}");
    }

    Some(pool)
}

/// Prefixes names so concurrent test runs never collide on unique columns.
pub(crate) fn unique(name: &str) -> String {
    format!("{}_{name}", Uuid::new_v4().simple())
}

pub(crate) fn unique_email() -> EmailAddress {
    EmailAddress::new(format!("{}@example.com", Uuid::new_v4().simple()))
        .unwrap_or_else(|_| unreachable!())
}
