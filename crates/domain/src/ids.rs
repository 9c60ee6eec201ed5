use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random identifier.
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Creates an identifier from an existing UUID value.
            #[must_use]
            pub fn from_uuid(value: Uuid) -> Self {
                Self(value)
            }

            /// Returns the underlying UUID value.
            #[must_use]
            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(formatter, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }
    };
}

entity_id!(
    /// Unique identifier for a user account.
    UserId
);
entity_id!(
    /// Unique identifier for a role.
    RoleId
);
entity_id!(
    /// Unique identifier for a grantable permission.
    PermissionId
);
entity_id!(
    /// Unique identifier for a purchasable product.
    ProductId
);

/// Collects the raw UUID values of a slice of identifiers.
pub fn uuids_of<T, F>(ids: &[T], as_uuid: F) -> Vec<Uuid>
where
    F: Fn(&T) -> Uuid,
{
    ids.iter().map(as_uuid).collect()
}

#[cfg(test)]
mod tests {
    use super::{RoleId, UserId, uuids_of};

    #[test]
    fn ids_format_as_uuid() {
        assert_eq!(UserId::new().to_string().len(), 36);
    }

    #[test]
    fn ids_serialize_as_bare_uuid_strings() {
        let role_id = RoleId::new();
        let encoded = serde_json::to_string(&role_id).unwrap_or_default();
        assert_eq!(encoded, format!("\"{role_id}\""));
    }

    #[test]
    fn uuids_of_preserves_order() {
        let first = RoleId::new();
        let second = RoleId::new();
        let values = uuids_of(&[first, second, first], RoleId::as_uuid);
        assert_eq!(
            values,
            vec![first.as_uuid(), second.as_uuid(), first.as_uuid()]
        );
    }
}
