//! Effective-permission resolution over in-process grant rows.
//!
//! Backends without server-side aggregation collect one [`GrantCandidate`]
//! per contributing association row (role-based, direct, and
//! entitlement-based rows concatenated without deduplication) and fold them
//! here. The result matches the SQL resolution: one row per granted
//! permission, provenance deduplicated, ordered by `(name, id)`.

use std::collections::{BTreeSet, HashMap};

use tollgate_domain::{Permission, PermissionId, ProductId, RoleId};

use crate::PermissionSource;

/// One association row contributing a permission to a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GrantCandidate {
    /// Granted permission.
    pub permission_id: PermissionId,
    /// Role the grant flows through, if any.
    pub role_id: Option<RoleId>,
    /// Product the grant flows through, if any.
    pub product_id: Option<ProductId>,
    /// Set when the row is a direct user grant.
    pub direct_assignment: bool,
}

impl GrantCandidate {
    /// Row for a permission reached through one of the user's roles.
    #[must_use]
    pub fn via_role(permission_id: PermissionId, role_id: RoleId) -> Self {
        Self {
            permission_id,
            role_id: Some(role_id),
            product_id: None,
            direct_assignment: false,
        }
    }

    /// Row for a permission assigned straight to the user.
    #[must_use]
    pub fn direct(permission_id: PermissionId) -> Self {
        Self {
            permission_id,
            role_id: None,
            product_id: None,
            direct_assignment: true,
        }
    }

    /// Row for a permission reached through an entitled product.
    #[must_use]
    pub fn via_product(permission_id: PermissionId, product_id: ProductId) -> Self {
        Self {
            permission_id,
            role_id: None,
            product_id: Some(product_id),
            direct_assignment: false,
        }
    }
}

#[derive(Default)]
struct Provenance {
    role_ids: BTreeSet<RoleId>,
    product_ids: BTreeSet<ProductId>,
    is_directly_assigned: bool,
}

fn fold_candidates(candidates: &[GrantCandidate]) -> HashMap<PermissionId, Provenance> {
    let mut by_permission: HashMap<PermissionId, Provenance> = HashMap::new();
    for candidate in candidates {
        let provenance = by_permission.entry(candidate.permission_id).or_default();
        if let Some(role_id) = candidate.role_id {
            provenance.role_ids.insert(role_id);
        }
        if let Some(product_id) = candidate.product_id {
            provenance.product_ids.insert(product_id);
        }
        provenance.is_directly_assigned |= candidate.direct_assignment;
    }
    by_permission
}

fn sort_by_name_then_id(sources: &mut [PermissionSource]) {
    sources.sort_by(|left, right| {
        left.permission
            .name()
            .cmp(right.permission.name())
            .then_with(|| left.permission.id().cmp(&right.permission.id()))
    });
}

/// Returns the permissions of `catalog` granted by `candidates`, with
/// provenance. Candidates for permissions outside `catalog` are ignored.
pub fn resolve_permission_sources(
    catalog: &[Permission],
    candidates: &[GrantCandidate],
) -> Vec<PermissionSource> {
    let mut by_permission = fold_candidates(candidates);

    let mut sources = catalog
        .iter()
        .filter_map(|permission| {
            by_permission
                .remove(&permission.id())
                .map(|provenance| PermissionSource {
                    permission: permission.clone(),
                    role_ids: provenance.role_ids.into_iter().collect(),
                    product_ids: provenance.product_ids.into_iter().collect(),
                    is_directly_assigned: provenance.is_directly_assigned,
                })
        })
        .collect::<Vec<_>>();

    sort_by_name_then_id(&mut sources);
    sources
}

/// Returns the permissions of `catalog` not granted by any candidate.
pub fn resolve_missing_permissions(
    catalog: &[Permission],
    candidates: &[GrantCandidate],
) -> Vec<PermissionSource> {
    let granted = candidates
        .iter()
        .map(|candidate| candidate.permission_id)
        .collect::<BTreeSet<_>>();

    let mut missing = catalog
        .iter()
        .filter(|permission| !granted.contains(&permission.id()))
        .cloned()
        .map(PermissionSource::ungranted)
        .collect::<Vec<_>>();

    sort_by_name_then_id(&mut missing);
    missing
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use chrono::Utc;
    use proptest::prelude::*;
    use tollgate_domain::{Permission, PermissionId, ProductId, RoleId};

    use super::{GrantCandidate, resolve_missing_permissions, resolve_permission_sources};

    fn permission(name: &str) -> Permission {
        let now = Utc::now();
        Permission::new(PermissionId::new(), name, None, now, now)
            .unwrap_or_else(|_| unreachable!())
    }

    #[test]
    fn no_grants_means_nothing_granted_and_everything_missing() {
        let catalog = vec![permission("b.read"), permission("a.read")];

        assert!(resolve_permission_sources(&catalog, &[]).is_empty());

        let missing = resolve_missing_permissions(&catalog, &[]);
        let names = missing
            .iter()
            .map(|source| source.permission.name())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["a.read", "b.read"]);
        assert!(missing.iter().all(|source| source.role_ids.is_empty()
            && source.product_ids.is_empty()
            && !source.is_directly_assigned));
    }

    #[test]
    fn role_only_grant_is_not_direct() {
        let manage_users = permission("manage_users");
        let admin = RoleId::new();
        let candidates = [GrantCandidate::via_role(manage_users.id(), admin)];

        let sources = resolve_permission_sources(std::slice::from_ref(&manage_users), &candidates);
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].role_ids, vec![admin]);
        assert!(sources[0].product_ids.is_empty());
        assert!(!sources[0].is_directly_assigned);
    }

    #[test]
    fn role_and_direct_grants_merge_into_one_row() {
        let manage_users = permission("manage_users");
        let admin = RoleId::new();
        let support = RoleId::new();
        let candidates = [
            GrantCandidate::via_role(manage_users.id(), admin),
            GrantCandidate::direct(manage_users.id()),
            GrantCandidate::via_role(manage_users.id(), support),
            GrantCandidate::via_role(manage_users.id(), admin),
        ];

        let sources = resolve_permission_sources(std::slice::from_ref(&manage_users), &candidates);
        assert_eq!(sources.len(), 1);
        let mut expected_roles = vec![admin, support];
        expected_roles.sort();
        assert_eq!(sources[0].role_ids, expected_roles);
        assert!(sources[0].is_directly_assigned);
    }

    #[test]
    fn product_grants_report_product_provenance() {
        let export = permission("reports.export");
        let product = ProductId::new();
        let candidates = [GrantCandidate::via_product(export.id(), product)];

        let sources = resolve_permission_sources(std::slice::from_ref(&export), &candidates);
        assert_eq!(sources[0].product_ids, vec![product]);
        assert!(sources[0].role_ids.is_empty());
    }

    #[test]
    fn candidates_outside_catalog_are_ignored() {
        let catalog = vec![permission("a.read")];
        let candidates = [GrantCandidate::direct(PermissionId::new())];

        assert!(resolve_permission_sources(&catalog, &candidates).is_empty());
        assert_eq!(resolve_missing_permissions(&catalog, &candidates).len(), 1);
    }

    fn arbitrary_grants() -> impl Strategy<Value = (usize, Vec<(usize, u8)>)> {
        (1_usize..8).prop_flat_map(|catalog_size| {
            (
                Just(catalog_size),
                proptest::collection::vec((0..catalog_size, 0_u8..3), 0..24),
            )
        })
    }

    proptest! {
        #[test]
        fn granted_and_missing_partition_the_catalog((catalog_size, grants) in arbitrary_grants()) {
            let catalog = (0..catalog_size)
                .map(|index| permission(format!("permission.{index}").as_str()))
                .collect::<Vec<_>>();
            let roles = [RoleId::new(), RoleId::new()];
            let product = ProductId::new();
            let candidates = grants
                .iter()
                .map(|(index, kind)| {
                    let permission_id = catalog[*index].id();
                    match *kind {
                        0 => GrantCandidate::via_role(permission_id, roles[index % 2]),
                        1 => GrantCandidate::direct(permission_id),
                        _ => GrantCandidate::via_product(permission_id, product),
                    }
                })
                .collect::<Vec<_>>();

            let granted = resolve_permission_sources(&catalog, &candidates);
            let missing = resolve_missing_permissions(&catalog, &candidates);

            let granted_ids = granted
                .iter()
                .map(|source| source.permission.id())
                .collect::<BTreeSet<_>>();
            let missing_ids = missing
                .iter()
                .map(|source| source.permission.id())
                .collect::<BTreeSet<_>>();
            let catalog_ids = catalog.iter().map(Permission::id).collect::<BTreeSet<_>>();

            prop_assert_eq!(granted_ids.len(), granted.len());
            prop_assert!(granted_ids.is_disjoint(&missing_ids));
            prop_assert_eq!(
                granted_ids.union(&missing_ids).copied().collect::<BTreeSet<_>>(),
                catalog_ids
            );

            let distinct_granted = candidates
                .iter()
                .map(|candidate| candidate.permission_id)
                .collect::<BTreeSet<_>>();
            prop_assert_eq!(granted.len(), distinct_granted.len());
        }
    }
}
