use async_trait::async_trait;
use chrono::Utc;

use tollgate_application::UserRepository;
use tollgate_core::{AppError, AppResult};
use tollgate_domain::{
    EmailAddress, Filter, Page, User, UserColumn, UserId, matches_all, validate_filters,
};

use super::SharedTables;

/// In-memory user repository sharing its bundle's tables.
#[derive(Clone)]
pub struct InMemoryUserRepository {
    tables: SharedTables,
}

impl InMemoryUserRepository {
    pub(super) fn new(tables: SharedTables) -> Self {
        Self { tables }
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn create_user(&self, email: EmailAddress) -> AppResult<User> {
        let mut tables = self.tables.write().await;
        if tables.users.values().any(|user| user.email() == &email) {
            return Err(AppError::Conflict(format!(
                "user with email '{}' already exists",
                email.as_str()
            )));
        }

        let user = User::new(UserId::new(), email, Utc::now());
        tables.users.insert(user.id(), user.clone());
        Ok(user)
    }

    async fn find_user_by_id(&self, user_id: UserId) -> AppResult<Option<User>> {
        Ok(self.tables.read().await.users.get(&user_id).cloned())
    }

    async fn find_user_by_email(&self, email: &EmailAddress) -> AppResult<Option<User>> {
        Ok(self
            .tables
            .read()
            .await
            .users
            .values()
            .find(|user| user.email() == email)
            .cloned())
    }

    async fn list_users(&self, filters: &[Filter<UserColumn>], page: Page) -> AppResult<Vec<User>> {
        validate_filters(filters)?;
        let tables = self.tables.read().await;
        let mut users = tables
            .users
            .values()
            .filter(|user| matches_all(filters, *user))
            .cloned()
            .collect::<Vec<_>>();
        users.sort_by(|left, right| {
            left.email()
                .as_str()
                .cmp(right.email().as_str())
                .then_with(|| left.id().cmp(&right.id()))
        });

        Ok(page.slice(users))
    }

    async fn count_users(&self, filters: &[Filter<UserColumn>]) -> AppResult<u64> {
        validate_filters(filters)?;
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .values()
            .filter(|user| matches_all(filters, *user))
            .count() as u64)
    }

    async fn delete_user(&self, user_id: UserId) -> AppResult<bool> {
        Ok(self.tables.write().await.remove_user(user_id))
    }
}
