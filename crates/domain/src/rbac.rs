//! Role and permission catalog entities.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tollgate_core::{AppResult, NonEmptyString};

use crate::{PermissionId, RoleId};

/// Named bundle of permissions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    id: RoleId,
    name: String,
    description: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Role {
    /// Creates a role from persisted values.
    pub fn new(
        id: RoleId,
        name: impl Into<String>,
        description: Option<String>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> AppResult<Self> {
        Ok(Self {
            id,
            name: NonEmptyString::new(name)?.into(),
            description: normalize_description(description),
            created_at,
            updated_at,
        })
    }

    /// Returns the role identifier.
    #[must_use]
    pub fn id(&self) -> RoleId {
        self.id
    }

    /// Returns the unique role name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Returns the optional description.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the last update timestamp.
    #[must_use]
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

/// Atomic grantable capability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    id: PermissionId,
    name: String,
    description: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Permission {
    /// Creates a permission from persisted values.
    pub fn new(
        id: PermissionId,
        name: impl Into<String>,
        description: Option<String>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> AppResult<Self> {
        Ok(Self {
            id,
            name: NonEmptyString::new(name)?.into(),
            description: normalize_description(description),
            created_at,
            updated_at,
        })
    }

    /// Returns the permission identifier.
    #[must_use]
    pub fn id(&self) -> PermissionId {
        self.id
    }

    /// Returns the unique permission name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Returns the optional description.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the last update timestamp.
    #[must_use]
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

/// Trims a description and collapses blank values to `None`.
#[must_use]
pub fn normalize_description(description: Option<String>) -> Option<String> {
    description.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_owned())
    })
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::{Permission, Role, normalize_description};
    use crate::{PermissionId, RoleId};

    #[test]
    fn role_name_is_trimmed() {
        let now = Utc::now();
        let role = Role::new(RoleId::new(), " admin ", None, now, now);
        assert_eq!(
            role.map(|role| role.name().to_owned()).unwrap_or_default(),
            "admin"
        );
    }

    #[test]
    fn blank_permission_name_is_rejected() {
        let now = Utc::now();
        assert!(Permission::new(PermissionId::new(), "  ", None, now, now).is_err());
    }

    #[test]
    fn blank_description_collapses_to_none() {
        assert_eq!(normalize_description(Some("   ".to_owned())), None);
        assert_eq!(
            normalize_description(Some(" manage users ".to_owned())),
            Some("manage users".to_owned())
        );
    }

    #[test]
    fn permission_deserializes_from_aggregated_json() {
        let permission_id = PermissionId::new();
        let payload = format!(
            r#"{{"id":"{permission_id}","name":"manage_users","description":null,"created_at":"2024-05-01T10:00:00.123456+00:00","updated_at":"2024-05-01T10:00:00+00:00"}}"#
        );
        let decoded = serde_json::from_str::<Permission>(payload.as_str());
        assert!(decoded.is_ok());
        let decoded = decoded.unwrap_or_else(|_| unreachable!());
        assert_eq!(decoded.id(), permission_id);
        assert_eq!(decoded.name(), "manage_users");
    }
}
