//! Application services and ports.

#![forbid(unsafe_code)]

pub mod association_loader;
pub mod decorators;
pub mod permission_resolution;

mod rbac_admin_service;
mod rbac_ports;
mod store_ports;
mod user_ports;

pub use association_loader::{align_groups, distinct_keys};
pub use decorators::{RbacRepositoryDecorator, UserRepositoryDecorator};
pub use permission_resolution::{
    GrantCandidate, resolve_missing_permissions, resolve_permission_sources,
};
pub use rbac_admin_service::{ProvisionRoleInput, ProvisionedRole, RbacAdminService};
pub use rbac_ports::{
    CreatePermissionInput, CreateRoleInput, PermissionSource, PermissionSourcePage, RbacRepository,
    ResolutionOptions, UpdatePermissionInput, UpdateRoleInput,
};
pub use store_ports::StoreBundle;
pub use user_ports::UserRepository;
