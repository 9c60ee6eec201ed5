use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tollgate_core::AppResult;
use tollgate_domain::{EmailAddress, Filter, Page, User, UserColumn, UserId};

use crate::UserRepository;

/// [`UserRepository`] decorator with per-method stubs.
pub struct UserRepositoryDecorator {
    delegate: Option<Arc<dyn UserRepository>>,
    stubs: RwLock<UserRepositoryStubs>,
}

impl UserRepositoryDecorator {
    /// Wraps a real repository.
    #[must_use]
    pub fn new(delegate: Arc<dyn UserRepository>) -> Self {
        Self {
            delegate: Some(delegate),
            stubs: RwLock::default(),
        }
    }

    /// Creates a decorator where every method must be stubbed before use.
    #[must_use]
    pub fn without_delegate() -> Self {
        Self {
            delegate: None,
            stubs: RwLock::default(),
        }
    }
}

impl Default for UserRepositoryDecorator {
    fn default() -> Self {
        Self::without_delegate()
    }
}

define_stubs! {
    UserRepositoryDecorator, UserRepositoryStubs, UserRepository;
    create_user => stub_create_user(EmailAddress) -> User;
    find_user_by_id => stub_find_user_by_id(UserId) -> Option<User>;
    find_user_by_email => stub_find_user_by_email(&EmailAddress) -> Option<User>;
    list_users => stub_list_users(&[Filter<UserColumn>], Page) -> Vec<User>;
    count_users => stub_count_users(&[Filter<UserColumn>]) -> u64;
    delete_user => stub_delete_user(UserId) -> bool;
}

#[async_trait]
impl UserRepository for UserRepositoryDecorator {
    async fn create_user(&self, email: EmailAddress) -> AppResult<User> {
        if let Some(stub) = self.stub(|stubs| stubs.create_user.clone()) {
            return stub(email);
        }
        self.delegate("create_user")?.create_user(email).await
    }

    async fn find_user_by_id(&self, user_id: UserId) -> AppResult<Option<User>> {
        if let Some(stub) = self.stub(|stubs| stubs.find_user_by_id.clone()) {
            return stub(user_id);
        }
        self.delegate("find_user_by_id")?
            .find_user_by_id(user_id)
            .await
    }

    async fn find_user_by_email(&self, email: &EmailAddress) -> AppResult<Option<User>> {
        if let Some(stub) = self.stub(|stubs| stubs.find_user_by_email.clone()) {
            return stub(email);
        }
        self.delegate("find_user_by_email")?
            .find_user_by_email(email)
            .await
    }

    async fn list_users(&self, filters: &[Filter<UserColumn>], page: Page) -> AppResult<Vec<User>> {
        if let Some(stub) = self.stub(|stubs| stubs.list_users.clone()) {
            return stub(filters, page);
        }
        self.delegate("list_users")?.list_users(filters, page).await
    }

    async fn count_users(&self, filters: &[Filter<UserColumn>]) -> AppResult<u64> {
        if let Some(stub) = self.stub(|stubs| stubs.count_users.clone()) {
            return stub(filters);
        }
        self.delegate("count_users")?.count_users(filters).await
    }

    async fn delete_user(&self, user_id: UserId) -> AppResult<bool> {
        if let Some(stub) = self.stub(|stubs| stubs.delete_user.clone()) {
            return stub(user_id);
        }
        self.delegate("delete_user")?.delete_user(user_id).await
    }
}
