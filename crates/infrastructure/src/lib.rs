//! Storage adapters for the application ports.
//!
//! [`PostgresStore`] is the production bundle; [`InMemoryStore`] implements
//! the same ports in process for tests and local tooling.

#![forbid(unsafe_code)]

mod in_memory_store;
mod postgres_errors;
mod postgres_filter;
mod postgres_handle;
mod postgres_rbac_repository;
mod postgres_store;
mod postgres_user_repository;
mod store_config;

#[cfg(test)]
mod test_support;

pub use in_memory_store::{InMemoryRbacRepository, InMemoryStore, InMemoryUserRepository};
pub use postgres_handle::PgHandle;
pub use postgres_rbac_repository::PostgresRbacRepository;
pub use postgres_store::PostgresStore;
pub use postgres_user_repository::PostgresUserRepository;
pub use store_config::{StoreConfig, connect_and_migrate};
