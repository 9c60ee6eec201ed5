use std::collections::BTreeSet;
use std::time::Duration;

use tokio::sync::oneshot;

use tollgate_application::{
    CreatePermissionInput, CreateRoleInput, PermissionSource, ProvisionRoleInput, RbacAdminService,
    RbacRepository, RbacRepositoryDecorator, ResolutionOptions, StoreBundle, UpdateRoleInput,
};
use tollgate_core::AppError;
use tollgate_domain::{
    EmailAddress, Filter, Page, Permission, PermissionColumn, ProductId, Role, RoleColumn, RoleId,
    User, UserColumn, UserId,
};

use super::InMemoryStore;

fn email(value: &str) -> EmailAddress {
    EmailAddress::new(value).unwrap_or_else(|_| unreachable!())
}

async fn create_user(store: &InMemoryStore, address: &str) -> User {
    let created = store.users().create_user(email(address)).await;
    assert!(created.is_ok());
    created.unwrap_or_else(|_| unreachable!())
}

async fn create_role(store: &InMemoryStore, name: &str) -> Role {
    let created = store.rbac().create_role(CreateRoleInput::named(name)).await;
    assert!(created.is_ok());
    created.unwrap_or_else(|_| unreachable!())
}

async fn create_permission(store: &InMemoryStore, name: &str) -> Permission {
    let created = store
        .rbac()
        .create_permission(CreatePermissionInput::named(name))
        .await;
    assert!(created.is_ok());
    created.unwrap_or_else(|_| unreachable!())
}

fn names(sources: &[PermissionSource]) -> Vec<String> {
    sources
        .iter()
        .map(|source| source.permission.name().to_owned())
        .collect()
}

#[tokio::test]
async fn assigned_role_grants_its_permissions_end_to_end() {
    let store = InMemoryStore::new();
    let admin = create_role(&store, "admin").await;
    let manage_users = create_permission(&store, "manage_users").await;
    create_permission(&store, "audit.read").await;
    create_permission(&store, "billing.export").await;

    let linked = store
        .rbac()
        .create_role_permissions(admin.id(), &[manage_users.id()])
        .await;
    assert!(linked.is_ok());

    let user = create_user(&store, "u@example.com").await;
    let assigned = store
        .rbac()
        .assign_user_roles(user.id(), &["admin".to_owned()])
        .await;
    assert!(assigned.is_ok());

    let sources = store
        .rbac()
        .list_user_permission_sources(user.id(), &[], Page::all())
        .await
        .unwrap_or_default();
    assert_eq!(sources.len(), 1);
    assert_eq!(sources[0].permission.name(), "manage_users");
    assert_eq!(sources[0].role_ids, vec![admin.id()]);
    assert!(sources[0].product_ids.is_empty());
    assert!(!sources[0].is_directly_assigned);

    let count = store
        .rbac()
        .count_user_permission_sources(user.id(), &[])
        .await;
    assert_eq!(count.unwrap_or_default(), 1);

    let missing = store
        .rbac()
        .list_user_missing_permissions(user.id(), &[], Page::all())
        .await
        .unwrap_or_default();
    assert_eq!(names(&missing), vec!["audit.read", "billing.export"]);
    assert!(missing.iter().all(|source| source.role_ids.is_empty()
        && source.product_ids.is_empty()
        && !source.is_directly_assigned));
}

#[tokio::test]
async fn direct_and_role_grants_merge_into_one_row() {
    let store = InMemoryStore::new();
    let user = create_user(&store, "merge@example.com").await;
    let editor = create_role(&store, "editor").await;
    let reviewer = create_role(&store, "reviewer").await;
    let publish = create_permission(&store, "content.publish").await;

    for role in [&editor, &reviewer] {
        let linked = store
            .rbac()
            .create_role_permissions(role.id(), &[publish.id()])
            .await;
        assert!(linked.is_ok());
    }
    let roles_linked = store
        .rbac()
        .create_user_roles(user.id(), &[editor.id(), reviewer.id()])
        .await;
    assert!(roles_linked.is_ok());
    let direct = store
        .rbac()
        .create_user_permissions(user.id(), &[publish.id()])
        .await;
    assert!(direct.is_ok());

    let sources = store
        .rbac()
        .list_user_permission_sources(user.id(), &[], Page::all())
        .await
        .unwrap_or_default();

    assert_eq!(sources.len(), 1);
    let mut expected_roles = vec![editor.id(), reviewer.id()];
    expected_roles.sort();
    assert_eq!(sources[0].role_ids, expected_roles);
    assert!(sources[0].is_directly_assigned);
}

#[tokio::test]
async fn granted_and_missing_partition_the_filtered_catalog() {
    let store = InMemoryStore::new();
    let user = create_user(&store, "partition@example.com").await;
    let role = create_role(&store, "ops").await;

    let mut all = Vec::new();
    for name in ["ops.deploy", "ops.restart", "ops.rollback", "sales.quote", "sales.close"] {
        all.push(create_permission(&store, name).await);
    }
    let linked = store
        .rbac()
        .create_role_permissions(role.id(), &[all[0].id(), all[3].id()])
        .await;
    assert!(linked.is_ok());
    let assigned = store.rbac().create_user_roles(user.id(), &[role.id()]).await;
    assert!(assigned.is_ok());
    let direct = store
        .rbac()
        .create_user_permissions(user.id(), &[all[1].id()])
        .await;
    assert!(direct.is_ok());

    let filters = [Filter::like(PermissionColumn::Name, "ops.%")];
    let granted = store
        .rbac()
        .list_user_permission_sources(user.id(), &filters, Page::all())
        .await
        .unwrap_or_default();
    let missing = store
        .rbac()
        .list_user_missing_permissions(user.id(), &filters, Page::all())
        .await
        .unwrap_or_default();

    assert_eq!(names(&granted), vec!["ops.deploy", "ops.restart"]);
    assert_eq!(names(&missing), vec!["ops.rollback"]);

    let granted_count = store
        .rbac()
        .count_user_permission_sources(user.id(), &filters)
        .await
        .unwrap_or_default();
    let missing_count = store
        .rbac()
        .count_user_missing_permissions(user.id(), &filters)
        .await
        .unwrap_or_default();
    assert_eq!(granted_count, granted.len() as u64);
    assert_eq!(missing_count, missing.len() as u64);
}

#[tokio::test]
async fn paging_keeps_name_order_and_total() {
    let store = InMemoryStore::new();
    let user = create_user(&store, "paging@example.com").await;
    let mut permission_ids = Vec::new();
    for name in ["e", "a", "d", "b", "c"] {
        permission_ids.push(create_permission(&store, name).await.id());
    }
    let direct = store
        .rbac()
        .create_user_permissions(user.id(), &permission_ids)
        .await;
    assert!(direct.is_ok());

    let second_page = store
        .rbac()
        .list_user_permission_sources(user.id(), &[], Page::new(2, 2))
        .await
        .unwrap_or_default();
    assert_eq!(names(&second_page), vec!["c", "d"]);

    let beyond = store
        .rbac()
        .list_user_permission_sources(user.id(), &[], Page::new(2, 10))
        .await
        .unwrap_or_default();
    assert!(beyond.is_empty());
    assert_eq!(
        store
            .rbac()
            .count_user_permission_sources(user.id(), &[])
            .await
            .unwrap_or_default(),
        5
    );
}

#[tokio::test]
async fn user_without_grants_holds_nothing() {
    let store = InMemoryStore::new();
    let user = create_user(&store, "empty@example.com").await;
    create_permission(&store, "a").await;
    create_permission(&store, "b").await;

    let granted = store
        .rbac()
        .list_user_permission_sources(user.id(), &[], Page::all())
        .await
        .unwrap_or_default();
    let missing_count = store
        .rbac()
        .count_user_missing_permissions(user.id(), &[])
        .await
        .unwrap_or_default();

    assert!(granted.is_empty());
    assert_eq!(missing_count, 2);
}

#[tokio::test]
async fn entitlement_grants_follow_active_subscriptions() {
    let store = InMemoryStore::with_options(ResolutionOptions {
        entitlement_grants: true,
    });
    let user = create_user(&store, "buyer@example.com").await;
    let product = ProductId::new();
    let reports = create_permission(&store, "reports.view").await;
    let exports = create_permission(&store, "reports.export").await;
    let analyst = create_role(&store, "analyst").await;

    assert!(
        store
            .rbac()
            .create_product_permissions(product, &[reports.id()])
            .await
            .is_ok()
    );
    assert!(
        store
            .rbac()
            .create_role_permissions(analyst.id(), &[exports.id()])
            .await
            .is_ok()
    );
    assert!(
        store
            .rbac()
            .create_product_roles(product, &[analyst.id()])
            .await
            .is_ok()
    );

    let before = store
        .rbac()
        .count_user_permission_sources(user.id(), &[])
        .await
        .unwrap_or_default();
    assert_eq!(before, 0);

    assert!(store.activate_subscription(user.id(), product).await.is_ok());
    let sources = store
        .rbac()
        .list_user_permission_sources(user.id(), &[], Page::all())
        .await
        .unwrap_or_default();
    assert_eq!(names(&sources), vec!["reports.export", "reports.view"]);
    assert!(sources.iter().all(|source| source.product_ids == vec![product]
        && source.role_ids.is_empty()
        && !source.is_directly_assigned));

    assert!(store.cancel_subscription(user.id(), product).await);
    let after = store
        .rbac()
        .count_user_permission_sources(user.id(), &[])
        .await
        .unwrap_or_default();
    assert_eq!(after, 0);
}

#[tokio::test]
async fn entitlement_grants_are_ignored_when_disabled() {
    let store = InMemoryStore::new();
    let user = create_user(&store, "plain@example.com").await;
    let product = ProductId::new();
    let reports = create_permission(&store, "reports.view").await;
    assert!(
        store
            .rbac()
            .create_product_permissions(product, &[reports.id()])
            .await
            .is_ok()
    );
    assert!(store.activate_subscription(user.id(), product).await.is_ok());

    let count = store
        .rbac()
        .count_user_permission_sources(user.id(), &[])
        .await
        .unwrap_or_default();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn failed_unit_of_work_discards_every_write() {
    let store = InMemoryStore::new();

    let result = store
        .run_in_tx(|tx| async move {
            tx.rbac()
                .create_role(CreateRoleInput::named("temporary"))
                .await?;
            tx.users().create_user(email("gone@example.com")).await?;
            Err::<(), _>(AppError::Validation("abort".to_owned()))
        })
        .await;

    assert!(matches!(result, Err(AppError::Validation(message)) if message == "abort"));
    assert_eq!(store.rbac().count_roles(&[]).await.unwrap_or(99), 0);
    assert_eq!(store.users().count_users(&[]).await.unwrap_or(99), 0);
}

#[tokio::test]
async fn committed_unit_of_work_is_visible_and_isolated_until_commit() {
    let store = InMemoryStore::new();
    let outside = store.clone();

    let result = store
        .run_in_tx(|tx| async move {
            let role = tx
                .rbac()
                .create_role(CreateRoleInput::named("visible"))
                .await?;
            let seen_inside = tx.rbac().find_role_by_id(role.id()).await?.is_some();
            let seen_outside = outside.rbac().find_role_by_id(role.id()).await?.is_some();
            Ok((role, seen_inside, seen_outside))
        })
        .await;

    assert!(result.is_ok());
    let (role, seen_inside, seen_outside) = result.unwrap_or_else(|_| unreachable!());
    assert!(seen_inside);
    assert!(!seen_outside);
    let after_commit = store.rbac().find_role_by_id(role.id()).await;
    assert!(matches!(after_commit, Ok(Some(found)) if found == role));
}

#[tokio::test]
async fn nested_failure_discards_only_inner_writes() {
    let store = InMemoryStore::new();

    let result = store
        .run_in_tx(|outer| async move {
            outer
                .rbac()
                .create_role(CreateRoleInput::named("kept"))
                .await?;

            let inner = outer
                .run_in_tx(|inner| async move {
                    inner
                        .rbac()
                        .create_role(CreateRoleInput::named("dropped"))
                        .await?;
                    Err::<(), _>(AppError::Conflict("inner".to_owned()))
                })
                .await;
            assert!(matches!(inner, Err(AppError::Conflict(_))));
            Ok(())
        })
        .await;

    assert!(result.is_ok());
    let names = store
        .rbac()
        .list_roles(&[], Page::all())
        .await
        .unwrap_or_default()
        .into_iter()
        .map(|role| role.name().to_owned())
        .collect::<Vec<_>>();
    assert_eq!(names, vec!["kept"]);
}

async fn role_names(store: &InMemoryStore) -> Vec<String> {
    store
        .rbac()
        .list_roles(&[], Page::all())
        .await
        .unwrap_or_default()
        .into_iter()
        .map(|role| role.name().to_owned())
        .collect()
}

/// Opens a unit of work that creates `inside`, waits until `outside` has
/// been created on the shared store, then commits.
async fn commit_around_outside_write(
    store: &InMemoryStore,
    inside: &'static str,
    outside: &'static str,
) -> Result<(), AppError> {
    let (opened_tx, opened_rx) = oneshot::channel::<()>();
    let (release_tx, release_rx) = oneshot::channel::<()>();
    let unit_store = store.clone();
    let unit = tokio::spawn(async move {
        unit_store
            .run_in_tx(|tx| async move {
                tx.rbac().create_role(CreateRoleInput::named(inside)).await?;
                let _ = opened_tx.send(());
                let _ = release_rx.await;
                Ok(())
            })
            .await
    });

    assert!(opened_rx.await.is_ok());
    let direct = store
        .rbac()
        .create_role(CreateRoleInput::named(outside))
        .await;
    assert!(direct.is_ok());
    assert!(release_tx.send(()).is_ok());

    unit.await.unwrap_or_else(|_| unreachable!())
}

#[tokio::test]
async fn commit_keeps_writes_made_outside_the_unit_of_work() {
    let store = InMemoryStore::new();

    let committed = commit_around_outside_write(&store, "inside", "outside").await;

    assert!(committed.is_ok());
    assert_eq!(role_names(&store).await, vec!["inside", "outside"]);
}

#[tokio::test]
async fn commit_colliding_with_outside_write_fails_with_conflict() {
    let store = InMemoryStore::new();

    let committed = commit_around_outside_write(&store, "shared", "shared").await;

    assert!(matches!(committed, Err(AppError::Conflict(_))));
    assert_eq!(role_names(&store).await, vec!["shared"]);
}

#[tokio::test]
async fn commit_linking_a_concurrently_deleted_role_is_rejected() {
    let store = InMemoryStore::new();
    let user_id = create_user(&store, "linker@example.com").await.id();
    let doomed_id = create_role(&store, "doomed").await.id();
    let (opened_tx, opened_rx) = oneshot::channel::<()>();
    let (release_tx, release_rx) = oneshot::channel::<()>();

    let unit_store = store.clone();
    let unit = tokio::spawn(async move {
        unit_store
            .run_in_tx(|tx| async move {
                tx.rbac().create_user_roles(user_id, &[doomed_id]).await?;
                let _ = opened_tx.send(());
                let _ = release_rx.await;
                Ok(())
            })
            .await
    });

    assert!(opened_rx.await.is_ok());
    assert_eq!(store.rbac().delete_role(doomed_id).await.ok(), Some(true));
    assert!(release_tx.send(()).is_ok());

    let committed = unit.await.unwrap_or_else(|_| unreachable!());
    assert!(matches!(committed, Err(AppError::Validation(_))));
    let loaded = store
        .rbac()
        .load_user_roles(&[user_id])
        .await
        .unwrap_or_default();
    assert_eq!(loaded, vec![Vec::<Role>::new()]);
}

#[tokio::test]
async fn cancelled_unit_of_work_leaves_no_trace() {
    let store = InMemoryStore::new();

    let cancelled = tokio::time::timeout(
        Duration::from_millis(50),
        store.run_in_tx(|tx| async move {
            tx.rbac()
                .create_role(CreateRoleInput::named("abandoned"))
                .await?;
            std::future::pending::<()>().await;
            Ok::<(), AppError>(())
        }),
    )
    .await;

    assert!(cancelled.is_err());
    assert!(role_names(&store).await.is_empty());

    let next = store
        .run_in_tx(|tx| async move {
            tx.rbac()
                .create_role(CreateRoleInput::named("after"))
                .await
                .map(drop)
        })
        .await;
    assert!(next.is_ok());
    assert_eq!(role_names(&store).await, vec!["after"]);
}

#[tokio::test]
async fn cancelled_nested_unit_is_discarded_when_outer_commits() {
    let store = InMemoryStore::new();

    let result = store
        .run_in_tx(|outer| async move {
            outer
                .rbac()
                .create_role(CreateRoleInput::named("kept"))
                .await?;

            let cancelled = tokio::time::timeout(
                Duration::from_millis(50),
                outer.run_in_tx(|inner| async move {
                    inner
                        .rbac()
                        .create_role(CreateRoleInput::named("abandoned"))
                        .await?;
                    std::future::pending::<()>().await;
                    Ok::<(), AppError>(())
                }),
            )
            .await;
            assert!(cancelled.is_err());
            Ok(())
        })
        .await;

    assert!(result.is_ok());
    assert_eq!(role_names(&store).await, vec!["kept"]);
}

#[tokio::test]
async fn loaders_align_groups_with_requested_keys() {
    let store = InMemoryStore::new();
    let first = create_user(&store, "first@example.com").await;
    let second = create_user(&store, "second@example.com").await;
    let zeta = create_role(&store, "zeta").await;
    let alpha = create_role(&store, "alpha").await;
    assert!(
        store
            .rbac()
            .create_user_roles(first.id(), &[zeta.id(), alpha.id()])
            .await
            .is_ok()
    );
    assert!(
        store
            .rbac()
            .create_user_roles(second.id(), &[zeta.id()])
            .await
            .is_ok()
    );

    let unknown = UserId::new();
    let groups = store
        .rbac()
        .load_user_roles(&[first.id(), unknown, second.id(), first.id()])
        .await
        .unwrap_or_default();

    let group_names = groups
        .iter()
        .map(|group| group.iter().map(Role::name).collect::<Vec<_>>())
        .collect::<Vec<_>>();
    assert_eq!(
        group_names,
        vec![
            vec!["alpha", "zeta"],
            Vec::new(),
            vec!["zeta"],
            vec!["alpha", "zeta"],
        ]
    );

    let empty = store.rbac().load_user_roles(&[]).await.unwrap_or_default();
    assert!(empty.is_empty());
}

#[tokio::test]
async fn permission_loaders_return_sorted_groups() {
    let store = InMemoryStore::new();
    let user = create_user(&store, "loader@example.com").await;
    let role = create_role(&store, "viewer").await;
    let b = create_permission(&store, "b").await;
    let a = create_permission(&store, "a").await;
    assert!(
        store
            .rbac()
            .create_role_permissions(role.id(), &[b.id(), a.id()])
            .await
            .is_ok()
    );
    assert!(
        store
            .rbac()
            .create_user_permissions(user.id(), &[b.id()])
            .await
            .is_ok()
    );

    let by_role = store
        .rbac()
        .load_role_permissions(&[role.id()])
        .await
        .unwrap_or_default();
    assert_eq!(by_role, vec![vec![a.clone(), b.clone()]]);

    let by_user = store
        .rbac()
        .load_user_permissions(&[user.id(), UserId::new()])
        .await
        .unwrap_or_default();
    assert_eq!(by_user, vec![vec![b], Vec::new()]);
}

#[tokio::test]
async fn assigning_roles_to_unknown_user_is_not_found() {
    let store = InMemoryStore::new();
    create_role(&store, "admin").await;

    let result = store
        .rbac()
        .assign_user_roles(UserId::new(), &["admin".to_owned()])
        .await;
    assert!(matches!(result, Err(AppError::NotFound(_))));

    let empty = store.rbac().assign_user_roles(UserId::new(), &[]).await;
    assert!(empty.is_ok());
}

#[tokio::test]
async fn unknown_role_names_are_skipped() {
    let store = InMemoryStore::new();
    let user = create_user(&store, "skip@example.com").await;
    let admin = create_role(&store, "admin").await;

    let result = store
        .rbac()
        .assign_user_roles(user.id(), &[" admin ".to_owned(), "ghost".to_owned()])
        .await;
    assert!(result.is_ok());

    let roles = store
        .rbac()
        .load_user_roles(&[user.id()])
        .await
        .unwrap_or_default();
    assert_eq!(roles, vec![vec![admin]]);
}

#[tokio::test]
async fn association_writes_are_idempotent_and_deletes_report_counts() {
    let store = InMemoryStore::new();
    let user = create_user(&store, "links@example.com").await;
    let first = create_role(&store, "first").await;
    let second = create_role(&store, "second").await;

    for _ in 0..2 {
        assert!(
            store
                .rbac()
                .create_user_roles(user.id(), &[first.id(), second.id()])
                .await
                .is_ok()
        );
    }
    assert!(store.rbac().create_user_roles(user.id(), &[]).await.is_ok());

    let removed = store
        .rbac()
        .delete_user_roles(user.id(), &[first.id(), first.id()])
        .await;
    assert_eq!(removed.unwrap_or_default(), 1);
    let none = store.rbac().delete_user_roles(user.id(), &[]).await;
    assert_eq!(none.unwrap_or(99), 0);
}

#[tokio::test]
async fn links_to_missing_rows_are_rejected() {
    let store = InMemoryStore::new();
    let role = create_role(&store, "orphan").await;

    let result = store
        .rbac()
        .create_user_roles(UserId::new(), &[role.id()])
        .await;
    assert!(matches!(result, Err(AppError::Validation(_))));
}

#[tokio::test]
async fn duplicate_names_conflict() {
    let store = InMemoryStore::new();
    create_role(&store, "admin").await;
    let duplicate = store
        .rbac()
        .create_role(CreateRoleInput::named("admin"))
        .await;
    assert!(matches!(duplicate, Err(AppError::Conflict(_))));

    create_user(&store, "dup@example.com").await;
    let duplicate_user = store.users().create_user(email("DUP@example.com")).await;
    assert!(matches!(duplicate_user, Err(AppError::Conflict(_))));

    let other = create_role(&store, "other").await;
    let renamed = store
        .rbac()
        .update_role(
            other.id(),
            UpdateRoleInput {
                name: Some("admin".to_owned()),
                description: None,
            },
        )
        .await;
    assert!(matches!(renamed, Err(AppError::Conflict(_))));
}

#[tokio::test]
async fn find_or_create_returns_existing_entry_without_overwriting() {
    let store = InMemoryStore::new();
    let first = store
        .rbac()
        .find_or_create_permission(CreatePermissionInput {
            name: "reports.view".to_owned(),
            description: Some("original".to_owned()),
        })
        .await;
    assert!(first.is_ok());
    let first = first.unwrap_or_else(|_| unreachable!());

    let second = store
        .rbac()
        .find_or_create_permission(CreatePermissionInput {
            name: " reports.view ".to_owned(),
            description: Some("replacement".to_owned()),
        })
        .await;

    assert!(matches!(second, Ok(ref found) if found == &first));
    assert_eq!(
        store.rbac().count_permissions(&[]).await.unwrap_or_default(),
        1
    );
}

#[tokio::test]
async fn update_keeps_unset_fields_and_clears_blank_description() {
    let store = InMemoryStore::new();
    let created = store
        .rbac()
        .create_role(CreateRoleInput {
            name: "support".to_owned(),
            description: Some("Tier one".to_owned()),
        })
        .await
        .unwrap_or_else(|_| unreachable!());

    let renamed = store
        .rbac()
        .update_role(
            created.id(),
            UpdateRoleInput {
                name: Some("helpdesk".to_owned()),
                description: None,
            },
        )
        .await
        .unwrap_or_default();
    let Some(renamed) = renamed else {
        panic!("expected role to be updated");
    };
    assert_eq!(renamed.name(), "helpdesk");
    assert_eq!(renamed.description(), Some("Tier one"));
    assert_eq!(renamed.created_at(), created.created_at());

    let cleared = store
        .rbac()
        .update_role(
            created.id(),
            UpdateRoleInput {
                name: None,
                description: Some("  ".to_owned()),
            },
        )
        .await
        .unwrap_or_default();
    assert!(matches!(cleared, Some(ref role) if role.description().is_none()));

    let missing = store
        .rbac()
        .update_role(RoleId::new(), UpdateRoleInput::default())
        .await;
    assert!(matches!(missing, Ok(None)));
}

#[tokio::test]
async fn deleting_a_role_removes_its_grants() {
    let store = InMemoryStore::new();
    let user = create_user(&store, "cascade@example.com").await;
    let role = create_role(&store, "temp").await;
    let permission = create_permission(&store, "temp.use").await;
    assert!(
        store
            .rbac()
            .create_role_permissions(role.id(), &[permission.id()])
            .await
            .is_ok()
    );
    assert!(
        store
            .rbac()
            .create_user_roles(user.id(), &[role.id()])
            .await
            .is_ok()
    );

    assert!(store.rbac().delete_role(role.id()).await.unwrap_or_default());
    assert!(!store.rbac().delete_role(role.id()).await.unwrap_or(true));

    let count = store
        .rbac()
        .count_user_permission_sources(user.id(), &[])
        .await
        .unwrap_or(99);
    assert_eq!(count, 0);
}

#[tokio::test]
async fn list_and_count_apply_the_same_filters() {
    let store = InMemoryStore::new();
    for name in ["alpha", "beta", "gamma", "delta"] {
        create_role(&store, name).await;
    }
    create_user(&store, "a@example.com").await;
    create_user(&store, "b@example.org").await;

    let filters = [Filter::or(vec![
        vec![Filter::like(RoleColumn::Name, "%a")],
        vec![Filter::eq(RoleColumn::Name, "beta")],
    ])];
    let roles = store
        .rbac()
        .list_roles(&filters, Page::all())
        .await
        .unwrap_or_default();
    let role_names = roles.iter().map(Role::name).collect::<Vec<_>>();
    assert_eq!(role_names, vec!["alpha", "beta", "delta", "gamma"]);

    let narrowed = [Filter::ilike(RoleColumn::Name, "%L%")];
    let narrowed_roles = store
        .rbac()
        .list_roles(&narrowed, Page::all())
        .await
        .unwrap_or_default();
    assert_eq!(
        store.rbac().count_roles(&narrowed).await.unwrap_or_default(),
        narrowed_roles.len() as u64
    );

    let user_filters = [Filter::like(UserColumn::Email, "%.org")];
    let users = store
        .users()
        .list_users(&user_filters, Page::all())
        .await
        .unwrap_or_default();
    assert_eq!(users.len(), 1);
    assert_eq!(
        store.users().count_users(&user_filters).await.unwrap_or_default(),
        1
    );
}

#[tokio::test]
async fn pattern_ending_in_escape_is_a_validation_error() {
    let store = InMemoryStore::new();
    let user = create_user(&store, "escape@example.com").await;
    create_role(&store, "admin").await;

    let roles = store
        .rbac()
        .list_roles(&[Filter::like(RoleColumn::Name, "admin\\")], Page::all())
        .await;
    assert!(matches!(roles, Err(AppError::Validation(_))));

    let dangling = [Filter::ilike(PermissionColumn::Name, "%\\")];
    let missing = store
        .rbac()
        .count_user_missing_permissions(user.id(), &dangling)
        .await;
    assert!(matches!(missing, Err(AppError::Validation(_))));

    let escaped = store
        .rbac()
        .count_roles(&[Filter::like(RoleColumn::Name, "admin\\\\")])
        .await;
    assert_eq!(escaped.ok(), Some(0));
}

#[tokio::test]
async fn deleting_a_user_drops_its_associations() {
    let store = InMemoryStore::new();
    let user = create_user(&store, "leaver@example.com").await;
    let role = create_role(&store, "member").await;
    assert!(
        store
            .rbac()
            .create_user_roles(user.id(), &[role.id()])
            .await
            .is_ok()
    );

    assert!(store.users().delete_user(user.id()).await.unwrap_or_default());
    let lookup = store.users().find_user_by_email(&email("leaver@example.com")).await;
    assert!(matches!(lookup, Ok(None)));
    let groups = store
        .rbac()
        .load_user_roles(&[user.id()])
        .await
        .unwrap_or_default();
    assert_eq!(groups, vec![Vec::new()]);
}

#[tokio::test]
async fn admin_service_provisions_and_reports_through_units_of_work() {
    let store = InMemoryStore::new();
    create_permission(&store, "billing.refund").await;
    let service = RbacAdminService::new(store.clone());

    let provisioned = service
        .provision_role(ProvisionRoleInput {
            name: "support".to_owned(),
            description: Some("Support staff".to_owned()),
            permission_names: vec![
                "tickets.read".to_owned(),
                "tickets.reply".to_owned(),
                " tickets.read ".to_owned(),
            ],
        })
        .await;
    assert!(provisioned.is_ok());
    let provisioned = provisioned.unwrap_or_else(|_| unreachable!());
    assert_eq!(provisioned.permissions.len(), 2);

    let user = service
        .register_user(email("agent@example.com"), vec!["support".to_owned()])
        .await;
    assert!(user.is_ok());
    let user = user.unwrap_or_else(|_| unreachable!());

    let overview = service
        .permission_overview(user.id(), &[], Page::new(1, 0))
        .await;
    assert!(overview.is_ok());
    let overview = overview.unwrap_or_else(|_| unreachable!());
    assert_eq!(overview.total, 2);
    assert_eq!(names(&overview.items), vec!["tickets.read"]);
    assert_eq!(overview.items[0].role_ids, vec![provisioned.role.id()]);

    let grantable = service
        .grantable_permissions(user.id(), &[], Page::all())
        .await
        .unwrap_or_else(|_| unreachable!());
    assert_eq!(names(&grantable.items), vec!["billing.refund"]);
    assert_eq!(grantable.total, 1);

    assert!(service.revoke_user_role(user.id(), "support").await.unwrap_or_default());
    let after = service
        .permission_overview(user.id(), &[], Page::all())
        .await
        .unwrap_or_else(|_| unreachable!());
    assert_eq!(after.total, 0);
}

#[tokio::test]
async fn failed_registration_leaves_no_user_behind() {
    let store = InMemoryStore::new();
    create_user(&store, "taken@example.com").await;
    let service = RbacAdminService::new(store.clone());

    let result = service
        .register_user(email("taken@example.com"), vec!["admin".to_owned()])
        .await;

    assert!(matches!(result, Err(AppError::Conflict(_))));
    assert_eq!(store.users().count_users(&[]).await.unwrap_or_default(), 1);
}

#[tokio::test]
async fn decorator_wraps_in_memory_repository() {
    let store = InMemoryStore::new();
    let delegate: std::sync::Arc<dyn RbacRepository> =
        std::sync::Arc::new(store.rbac_repository().clone());
    let decorator = RbacRepositoryDecorator::new(delegate);
    create_role(&store, "real").await;

    let real = decorator.count_roles(&[]).await;
    assert_eq!(real.unwrap_or_default(), 1);

    decorator.stub_count_roles(|_| Ok(42));
    assert_eq!(decorator.count_roles(&[]).await.unwrap_or_default(), 42);

    decorator.cleanup();
    assert_eq!(decorator.count_roles(&[]).await.unwrap_or_default(), 1);
}

#[tokio::test]
async fn concurrent_find_or_create_yields_one_entry() {
    let store = InMemoryStore::new();
    let mut handles = Vec::new();
    for _ in 0..8 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store
                .rbac()
                .find_or_create_role(CreateRoleInput::named("shared"))
                .await
        }));
    }

    let mut ids = BTreeSet::new();
    for handle in handles {
        let joined = handle.await;
        assert!(joined.is_ok());
        let role = joined.unwrap_or_else(|_| unreachable!());
        assert!(role.is_ok());
        ids.insert(role.unwrap_or_else(|_| unreachable!()).id());
    }

    assert_eq!(ids.len(), 1);
}
