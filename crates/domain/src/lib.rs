//! Domain entities and invariants.

#![forbid(unsafe_code)]

mod filter;
mod ids;
mod page;
mod rbac;
mod user;

pub use filter::{
    Filter, FilterColumn, FilterTarget, FilterValue, PermissionColumn, RoleColumn, UserColumn,
    like_matches, matches_all, validate_filters,
};
pub use ids::{PermissionId, ProductId, RoleId, UserId, uuids_of};
pub use page::Page;
pub use rbac::{Permission, Role, normalize_description};
pub use user::{EmailAddress, User};
