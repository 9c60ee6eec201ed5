use async_trait::async_trait;

use tollgate_core::AppResult;
use tollgate_domain::{EmailAddress, Filter, Page, User, UserColumn, UserId};

/// Repository port for user accounts.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Creates a user with a unique email address.
    async fn create_user(&self, email: EmailAddress) -> AppResult<User>;

    /// Finds a user by identifier.
    async fn find_user_by_id(&self, user_id: UserId) -> AppResult<Option<User>>;

    /// Finds a user by email address.
    async fn find_user_by_email(&self, email: &EmailAddress) -> AppResult<Option<User>>;

    /// Lists users matching all filters, ordered by email.
    async fn list_users(&self, filters: &[Filter<UserColumn>], page: Page) -> AppResult<Vec<User>>;

    /// Counts users matching all filters.
    async fn count_users(&self, filters: &[Filter<UserColumn>]) -> AppResult<u64>;

    /// Deletes a user and its associations. Returns whether a row was removed.
    async fn delete_user(&self, user_id: UserId) -> AppResult<bool>;
}
