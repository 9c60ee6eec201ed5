//! Environment-driven store configuration.

use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;
use tracing::info;

use tollgate_application::ResolutionOptions;
use tollgate_core::{AppError, AppResult};

use crate::PostgresStore;

pub(crate) static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

const DEFAULT_MAX_CONNECTIONS: u32 = 10;

/// Settings needed to open the PostgreSQL store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// PostgreSQL connection string.
    pub database_url: String,
    /// Upper bound on pooled connections.
    pub max_connections: u32,
    /// Optional permission sources.
    pub resolution: ResolutionOptions,
}

impl StoreConfig {
    /// Loads configuration from the process environment, reading a `.env`
    /// file first when present.
    ///
    /// `DATABASE_URL` is required. `DATABASE_MAX_CONNECTIONS` defaults to 10
    /// and `RBAC_ENTITLEMENT_GRANTS` defaults to `false`.
    pub fn from_env() -> AppResult<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Loads configuration from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> AppResult<Self> {
        let database_url = lookup("DATABASE_URL")
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty())
            .ok_or_else(|| AppError::Validation("DATABASE_URL is required".to_owned()))?;

        let max_connections = match lookup("DATABASE_MAX_CONNECTIONS") {
            Some(value) => {
                let parsed = value.trim().parse::<u32>().map_err(|error| {
                    AppError::Validation(format!(
                        "invalid DATABASE_MAX_CONNECTIONS '{value}': {error}"
                    ))
                })?;
                if parsed == 0 {
                    return Err(AppError::Validation(
                        "DATABASE_MAX_CONNECTIONS must be greater than zero".to_owned(),
                    ));
                }
                parsed
            }
            None => DEFAULT_MAX_CONNECTIONS,
        };

        let entitlement_grants = match lookup("RBAC_ENTITLEMENT_GRANTS") {
            Some(value) => parse_flag("RBAC_ENTITLEMENT_GRANTS", value.as_str())?,
            None => false,
        };

        Ok(Self {
            database_url,
            max_connections,
            resolution: ResolutionOptions { entitlement_grants },
        })
    }
}

fn parse_flag(name: &str, value: &str) -> AppResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(AppError::Validation(format!(
            "invalid {name} '{value}': expected a boolean"
        ))),
    }
}

/// Connects to PostgreSQL, applies pending migrations and returns a store
/// bundle bound to the pool.
pub async fn connect_and_migrate(config: &StoreConfig) -> AppResult<PostgresStore> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(config.database_url.as_str())
        .await
        .map_err(|error| AppError::Internal(format!("failed to connect to database: {error}")))?;

    MIGRATOR
        .run(&pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to run migrations: {error}")))?;

    info!(
        max_connections = config.max_connections,
        entitlement_grants = config.resolution.entitlement_grants,
        "store connected and migrated"
    );
    Ok(PostgresStore::with_options(pool, config.resolution))
}
