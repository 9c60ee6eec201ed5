//! Compiles typed filters into parameterized SQL predicates.
//!
//! Every value is bound as a parameter; only column names, which come from a
//! closed set of enums, are written into the statement text.

use sqlx::{Postgres, QueryBuilder};

use tollgate_domain::{Filter, FilterColumn, FilterValue, Page};

/// Appends ` AND <predicate>` for each filter, qualifying columns with
/// `table_alias`.
pub(crate) fn push_filters<C: FilterColumn>(
    builder: &mut QueryBuilder<'_, Postgres>,
    table_alias: &str,
    filters: &[Filter<C>],
) {
    for filter in filters {
        builder.push(" AND ");
        push_filter(builder, table_alias, filter);
    }
}

/// Appends ` LIMIT $n OFFSET $m`. A missing limit binds `NULL`, which
/// PostgreSQL treats as no limit.
pub(crate) fn push_page(builder: &mut QueryBuilder<'_, Postgres>, page: Page) {
    builder.push(" LIMIT ");
    builder.push_bind(page.limit.map(i64::from));
    builder.push(" OFFSET ");
    builder.push_bind(i64::from(page.offset));
}

fn push_filter<C: FilterColumn>(
    builder: &mut QueryBuilder<'_, Postgres>,
    table_alias: &str,
    filter: &Filter<C>,
) {
    match filter {
        Filter::Eq(column, value) => push_comparison(builder, table_alias, *column, " = ", value),
        Filter::Gt(column, value) => push_comparison(builder, table_alias, *column, " > ", value),
        Filter::Gte(column, value) => {
            push_comparison(builder, table_alias, *column, " >= ", value);
        }
        Filter::In(column, values) => {
            if values.is_empty() {
                builder.push("FALSE");
                return;
            }

            push_column(builder, table_alias, *column);
            builder.push(" IN (");
            for (index, value) in values.iter().enumerate() {
                if index > 0 {
                    builder.push(", ");
                }
                push_value(builder, value);
            }
            builder.push(")");
        }
        Filter::Like(column, pattern) => {
            push_column(builder, table_alias, *column);
            builder.push(" LIKE ");
            builder.push_bind(pattern.clone());
        }
        Filter::ILike(column, pattern) => {
            push_column(builder, table_alias, *column);
            builder.push(" ILIKE ");
            builder.push_bind(pattern.clone());
        }
        Filter::Or(groups) => {
            if groups.is_empty() {
                builder.push("FALSE");
                return;
            }

            builder.push("(");
            for (index, group) in groups.iter().enumerate() {
                if index > 0 {
                    builder.push(" OR ");
                }
                builder.push("(TRUE");
                push_filters(builder, table_alias, group);
                builder.push(")");
            }
            builder.push(")");
        }
    }
}

fn push_comparison<C: FilterColumn>(
    builder: &mut QueryBuilder<'_, Postgres>,
    table_alias: &str,
    column: C,
    operator: &str,
    value: &FilterValue,
) {
    push_column(builder, table_alias, column);
    builder.push(operator);
    push_value(builder, value);
}

fn push_column<C: FilterColumn>(
    builder: &mut QueryBuilder<'_, Postgres>,
    table_alias: &str,
    column: C,
) {
    builder.push(table_alias);
    builder.push(".");
    builder.push(column.column_name());
}

fn push_value(builder: &mut QueryBuilder<'_, Postgres>, value: &FilterValue) {
    match value {
        FilterValue::Text(value) => builder.push_bind(value.clone()),
        FilterValue::Uuid(value) => builder.push_bind(*value),
        FilterValue::Integer(value) => builder.push_bind(*value),
        FilterValue::Boolean(value) => builder.push_bind(*value),
        FilterValue::Timestamp(value) => builder.push_bind(*value),
    };
}
