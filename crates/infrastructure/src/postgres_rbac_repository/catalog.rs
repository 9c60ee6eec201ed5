use sqlx::{Postgres, QueryBuilder};
use tracing::debug;

use tollgate_core::{AppResult, NonEmptyString};
use tollgate_domain::{Filter, FilterColumn, Page, normalize_description, validate_filters};

use super::{CatalogRow, PostgresRbacRepository};
use crate::postgres_errors::{read_error, row_count, write_error};
use crate::postgres_filter::{push_filters, push_page};

const CATALOG_COLUMNS: &str = "id, name, description, created_at, updated_at";

/// Catalog tables sharing the named-entry layout.
#[derive(Debug, Clone, Copy)]
pub(super) enum CatalogTable {
    Roles,
    Permissions,
}

impl CatalogTable {
    fn table(self) -> &'static str {
        match self {
            Self::Roles => "roles",
            Self::Permissions => "permissions",
        }
    }

    fn noun(self) -> &'static str {
        match self {
            Self::Roles => "role",
            Self::Permissions => "permission",
        }
    }
}

impl PostgresRbacRepository {
    pub(super) async fn create_entry(
        &self,
        table: CatalogTable,
        name: String,
        description: Option<String>,
    ) -> AppResult<CatalogRow> {
        let name = NonEmptyString::new(name)?;
        let statement = format!(
            "INSERT INTO {} (name, description) VALUES ($1, $2) RETURNING {CATALOG_COLUMNS}",
            table.table()
        );

        self.handle
            .fetch_one(
                sqlx::query_as::<_, CatalogRow>(statement.as_str())
                    .bind(name.as_str())
                    .bind(normalize_description(description)),
            )
            .await
            .map_err(|error| write_error(error, format!("create {}", table.noun()).as_str()))
    }

    pub(super) async fn find_entry_by_id(
        &self,
        table: CatalogTable,
        id: uuid::Uuid,
    ) -> AppResult<Option<CatalogRow>> {
        let statement = format!(
            "SELECT {CATALOG_COLUMNS} FROM {} WHERE id = $1",
            table.table()
        );

        self.handle
            .fetch_optional(sqlx::query_as::<_, CatalogRow>(statement.as_str()).bind(id))
            .await
            .map_err(|error| read_error(error, format!("find {} by id", table.noun()).as_str()))
    }

    pub(super) async fn find_entry_by_name(
        &self,
        table: CatalogTable,
        name: &str,
    ) -> AppResult<Option<CatalogRow>> {
        let statement = format!(
            "SELECT {CATALOG_COLUMNS} FROM {} WHERE name = $1",
            table.table()
        );

        self.handle
            .fetch_optional(sqlx::query_as::<_, CatalogRow>(statement.as_str()).bind(name.trim()))
            .await
            .map_err(|error| read_error(error, format!("find {} by name", table.noun()).as_str()))
    }

    /// Inserts the entry or returns the existing one with the same name.
    ///
    /// The no-op `DO UPDATE` makes `RETURNING` yield the existing row, so
    /// concurrent callers all receive the single stored entry. An existing
    /// description is never overwritten.
    pub(super) async fn find_or_create_entry(
        &self,
        table: CatalogTable,
        name: String,
        description: Option<String>,
    ) -> AppResult<CatalogRow> {
        let name = NonEmptyString::new(name)?;
        let statement = format!(
            "INSERT INTO {} (name, description) VALUES ($1, $2) \
             ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name \
             RETURNING {CATALOG_COLUMNS}",
            table.table()
        );

        let row = self
            .handle
            .fetch_one(
                sqlx::query_as::<_, CatalogRow>(statement.as_str())
                    .bind(name.as_str())
                    .bind(normalize_description(description)),
            )
            .await
            .map_err(|error| {
                write_error(error, format!("find or create {}", table.noun()).as_str())
            })?;

        debug!(table = table.table(), name = %name.as_str(), "catalog entry ensured");
        Ok(row)
    }

    pub(super) async fn update_entry(
        &self,
        table: CatalogTable,
        id: uuid::Uuid,
        name: Option<String>,
        description: Option<String>,
    ) -> AppResult<Option<CatalogRow>> {
        let name = name.map(NonEmptyString::new).transpose()?.map(String::from);
        let replaces_description = description.is_some();
        let statement = format!(
            "UPDATE {} SET name = COALESCE($2, name), \
             description = CASE WHEN $3 THEN $4 ELSE description END, \
             updated_at = now() \
             WHERE id = $1 RETURNING {CATALOG_COLUMNS}",
            table.table()
        );

        self.handle
            .fetch_optional(
                sqlx::query_as::<_, CatalogRow>(statement.as_str())
                    .bind(id)
                    .bind(name)
                    .bind(replaces_description)
                    .bind(normalize_description(description)),
            )
            .await
            .map_err(|error| write_error(error, format!("update {}", table.noun()).as_str()))
    }

    pub(super) async fn delete_entry(
        &self,
        table: CatalogTable,
        id: uuid::Uuid,
    ) -> AppResult<bool> {
        let statement = format!("DELETE FROM {} WHERE id = $1", table.table());

        let result = self
            .handle
            .execute(sqlx::query(statement.as_str()).bind(id))
            .await
            .map_err(|error| write_error(error, format!("delete {}", table.noun()).as_str()))?;

        Ok(result.rows_affected() > 0)
    }

    pub(super) async fn list_entries<C: FilterColumn>(
        &self,
        table: CatalogTable,
        filters: &[Filter<C>],
        page: Page,
    ) -> AppResult<Vec<CatalogRow>> {
        validate_filters(filters)?;
        let mut builder = QueryBuilder::<Postgres>::new(format!(
            "SELECT catalog.id, catalog.name, catalog.description, catalog.created_at, \
             catalog.updated_at FROM {} AS catalog WHERE TRUE",
            table.table()
        ));
        push_filters(&mut builder, "catalog", filters);
        builder.push(" ORDER BY catalog.name, catalog.id");
        push_page(&mut builder, page);

        self.handle
            .fetch_all(builder.build_query_as::<CatalogRow>())
            .await
            .map_err(|error| read_error(error, format!("list {}s", table.noun()).as_str()))
    }

    pub(super) async fn count_entries<C: FilterColumn>(
        &self,
        table: CatalogTable,
        filters: &[Filter<C>],
    ) -> AppResult<u64> {
        validate_filters(filters)?;
        let operation = format!("count {}s", table.noun());
        let mut builder = QueryBuilder::<Postgres>::new(format!(
            "SELECT COUNT(*) FROM {} AS catalog WHERE TRUE",
            table.table()
        ));
        push_filters(&mut builder, "catalog", filters);

        let (count,) = self
            .handle
            .fetch_one(builder.build_query_as::<(i64,)>())
            .await
            .map_err(|error| read_error(error, operation.as_str()))?;

        row_count(count, operation.as_str())
    }
}
