//! PostgreSQL-backed user repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, Postgres, QueryBuilder};
use uuid::Uuid;

use tollgate_application::UserRepository;
use tollgate_core::AppResult;
use tollgate_domain::{EmailAddress, Filter, Page, User, UserColumn, UserId, validate_filters};

use crate::postgres_errors::{read_error, row_count, write_error};
use crate::postgres_filter::{push_filters, push_page};
use crate::postgres_handle::PgHandle;


/// PostgreSQL implementation of the user repository port.
#[derive(Clone)]
pub struct PostgresUserRepository {
    handle: PgHandle,
}

impl PostgresUserRepository {
    /// Creates a repository that issues statements through `handle`.
    #[must_use]
    pub fn new(handle: PgHandle) -> Self {
        Self { handle }
    }
}

#[derive(Debug, FromRow)]
struct UserRow {
    id: Uuid,
    email: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = tollgate_core::AppError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(User::new(
            UserId::from_uuid(row.id),
            EmailAddress::new(row.email)?,
            row.created_at,
        ))
    }
}

#[async_trait]
impl UserRepository for PostgresUserRepository {
    async fn create_user(&self, email: EmailAddress) -> AppResult<User> {
        let row = self
            .handle
            .fetch_one(
                sqlx::query_as::<_, UserRow>(
                    r#"
                    INSERT INTO users (email)
                    VALUES ($1)
                    RETURNING id, email, created_at
                    "#,
                )
                .bind(email.as_str()),
            )
            .await
            .map_err(|error| write_error(error, "create user"))?;

        User::try_from(row)
    }

    async fn find_user_by_id(&self, user_id: UserId) -> AppResult<Option<User>> {
        let row = self
            .handle
            .fetch_optional(
                sqlx::query_as::<_, UserRow>(
                    r#"
                    SELECT id, email, created_at
                    FROM users
                    WHERE id = $1
                    "#,
                )
                .bind(user_id.as_uuid()),
            )
            .await
            .map_err(|error| read_error(error, "find user by id"))?;

        row.map(User::try_from).transpose()
    }

    async fn find_user_by_email(&self, email: &EmailAddress) -> AppResult<Option<User>> {
        let row = self
            .handle
            .fetch_optional(
                sqlx::query_as::<_, UserRow>(
                    r#"
                    SELECT id, email, created_at
                    FROM users
                    WHERE email = $1
                    "#,
                )
                .bind(email.as_str()),
            )
            .await
            .map_err(|error| read_error(error, "find user by email"))?;

        row.map(User::try_from).transpose()
    }

    async fn list_users(&self, filters: &[Filter<UserColumn>], page: Page) -> AppResult<Vec<User>> {
        validate_filters(filters)?;
        let mut builder = QueryBuilder::<Postgres>::new(
            "SELECT users.id, users.email, users.created_at FROM users AS users WHERE TRUE",
        );
        push_filters(&mut builder, "users", filters);
        builder.push(" ORDER BY users.email, users.id");
        push_page(&mut builder, page);

        let rows = self
            .handle
            .fetch_all(builder.build_query_as::<UserRow>())
            .await
            .map_err(|error| read_error(error, "list users"))?;

        rows.into_iter().map(User::try_from).collect()
    }

    async fn count_users(&self, filters: &[Filter<UserColumn>]) -> AppResult<u64> {
        validate_filters(filters)?;
        let mut builder =
            QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM users AS users WHERE TRUE");
        push_filters(&mut builder, "users", filters);

        let (count,) = self
            .handle
            .fetch_one(builder.build_query_as::<(i64,)>())
            .await
            .map_err(|error| read_error(error, "count users"))?;

        row_count(count, "count users")
    }

    async fn delete_user(&self, user_id: UserId) -> AppResult<bool> {
        let result = self
            .handle
            .execute(sqlx::query("DELETE FROM users WHERE id = $1").bind(user_id.as_uuid()))
            .await
            .map_err(|error| write_error(error, "delete user"))?;

        Ok(result.rows_affected() > 0)
    }
}
