//! Typed filter vocabulary shared by every list and count query.
//!
//! The operator set is closed: equality, membership, pattern matching
//! (`LIKE`/`ILIKE`), lower bounds (`>`/`>=`) and a logical OR of sibling
//! filter groups. A slice of filters is interpreted as a conjunction.
//! Storage adapters compile filters into parameterized SQL; in-process
//! backends evaluate them with [`Filter::matches`].

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use tollgate_core::{AppError, AppResult};
use uuid::Uuid;

use crate::{Permission, PermissionId, ProductId, Role, RoleId, User, UserId};

/// Column that can be referenced by a filter.
pub trait FilterColumn: Copy + std::fmt::Debug + Send + Sync + 'static {
    /// Returns the unqualified storage column name.
    fn column_name(self) -> &'static str;
}

/// Value that can be read from an entity for in-process filter evaluation.
pub trait FilterTarget<C: FilterColumn> {
    /// Returns the value stored in `column`, or `None` when it is null.
    fn filter_value(&self, column: C) -> Option<FilterValue>;
}

/// Scalar operand of a filter condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterValue {
    /// Text value.
    Text(String),
    /// UUID value.
    Uuid(Uuid),
    /// Signed integer value.
    Integer(i64),
    /// Boolean value.
    Boolean(bool),
    /// Timestamp value.
    Timestamp(DateTime<Utc>),
}

impl FilterValue {
    /// Compares two values of the same kind; values of different kinds are
    /// incomparable.
    #[must_use]
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Text(left), Self::Text(right)) => Some(left.cmp(right)),
            (Self::Uuid(left), Self::Uuid(right)) => Some(left.cmp(right)),
            (Self::Integer(left), Self::Integer(right)) => Some(left.cmp(right)),
            (Self::Boolean(left), Self::Boolean(right)) => Some(left.cmp(right)),
            (Self::Timestamp(left), Self::Timestamp(right)) => Some(left.cmp(right)),
            _ => None,
        }
    }
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for FilterValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Uuid> for FilterValue {
    fn from(value: Uuid) -> Self {
        Self::Uuid(value)
    }
}

impl From<i64> for FilterValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<bool> for FilterValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<DateTime<Utc>> for FilterValue {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Timestamp(value)
    }
}

impl From<UserId> for FilterValue {
    fn from(value: UserId) -> Self {
        Self::Uuid(value.as_uuid())
    }
}

impl From<RoleId> for FilterValue {
    fn from(value: RoleId) -> Self {
        Self::Uuid(value.as_uuid())
    }
}

impl From<PermissionId> for FilterValue {
    fn from(value: PermissionId) -> Self {
        Self::Uuid(value.as_uuid())
    }
}

impl From<ProductId> for FilterValue {
    fn from(value: ProductId) -> Self {
        Self::Uuid(value.as_uuid())
    }
}

/// One filter condition over columns of type `C`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter<C> {
    /// `column = value`.
    Eq(C, FilterValue),
    /// `column` equals any of the values. An empty list matches nothing.
    In(C, Vec<FilterValue>),
    /// Case-sensitive SQL `LIKE` pattern.
    Like(C, String),
    /// Case-insensitive SQL `ILIKE` pattern.
    ILike(C, String),
    /// `column > value`.
    Gt(C, FilterValue),
    /// `column >= value`.
    Gte(C, FilterValue),
    /// Any of the groups matches; each group is a conjunction. No groups
    /// matches nothing.
    Or(Vec<Vec<Filter<C>>>),
}

impl<C: FilterColumn> Filter<C> {
    /// Builds an equality condition.
    pub fn eq(column: C, value: impl Into<FilterValue>) -> Self {
        Self::Eq(column, value.into())
    }

    /// Builds a membership condition.
    pub fn is_in<I, V>(column: C, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<FilterValue>,
    {
        Self::In(column, values.into_iter().map(Into::into).collect())
    }

    /// Builds a case-sensitive pattern condition.
    pub fn like(column: C, pattern: impl Into<String>) -> Self {
        Self::Like(column, pattern.into())
    }

    /// Builds a case-insensitive pattern condition.
    pub fn ilike(column: C, pattern: impl Into<String>) -> Self {
        Self::ILike(column, pattern.into())
    }

    /// Builds a strict lower-bound condition.
    pub fn gt(column: C, value: impl Into<FilterValue>) -> Self {
        Self::Gt(column, value.into())
    }

    /// Builds an inclusive lower-bound condition.
    pub fn gte(column: C, value: impl Into<FilterValue>) -> Self {
        Self::Gte(column, value.into())
    }

    /// Builds a disjunction of filter groups.
    #[must_use]
    pub fn or(groups: Vec<Vec<Filter<C>>>) -> Self {
        Self::Or(groups)
    }

    /// Evaluates the condition against an entity. Null columns never match,
    /// mirroring SQL three-valued logic.
    pub fn matches<T: FilterTarget<C>>(&self, target: &T) -> bool {
        match self {
            Self::Eq(column, expected) => target
                .filter_value(*column)
                .is_some_and(|actual| actual.compare(expected) == Some(Ordering::Equal)),
            Self::In(column, candidates) => target.filter_value(*column).is_some_and(|actual| {
                candidates
                    .iter()
                    .any(|candidate| actual.compare(candidate) == Some(Ordering::Equal))
            }),
            Self::Like(column, pattern) => match target.filter_value(*column) {
                Some(FilterValue::Text(actual)) => like_matches(actual.as_str(), pattern.as_str()),
                _ => false,
            },
            Self::ILike(column, pattern) => match target.filter_value(*column) {
                Some(FilterValue::Text(actual)) => like_matches(
                    actual.to_lowercase().as_str(),
                    pattern.to_lowercase().as_str(),
                ),
                _ => false,
            },
            Self::Gt(column, bound) => target
                .filter_value(*column)
                .is_some_and(|actual| actual.compare(bound) == Some(Ordering::Greater)),
            Self::Gte(column, bound) => target.filter_value(*column).is_some_and(|actual| {
                matches!(
                    actual.compare(bound),
                    Some(Ordering::Greater | Ordering::Equal)
                )
            }),
            Self::Or(groups) => groups.iter().any(|group| matches_all(group, target)),
        }
    }

    /// Rejects pattern conditions that end in an unescaped backslash, which
    /// PostgreSQL refuses to evaluate.
    pub fn validate(&self) -> AppResult<()> {
        match self {
            Self::Like(_, pattern) | Self::ILike(_, pattern) if ends_with_escape(pattern) => {
                Err(AppError::Validation(format!(
                    "LIKE pattern '{pattern}' must not end with an escape character"
                )))
            }
            Self::Or(groups) => groups.iter().try_for_each(|group| validate_filters(group)),
            _ => Ok(()),
        }
    }
}

/// Evaluates a conjunction of filters against an entity.
pub fn matches_all<C: FilterColumn, T: FilterTarget<C>>(filters: &[Filter<C>], target: &T) -> bool {
    filters.iter().all(|filter| filter.matches(target))
}

/// Validates every condition of a filter conjunction.
pub fn validate_filters<C: FilterColumn>(filters: &[Filter<C>]) -> AppResult<()> {
    filters.iter().try_for_each(Filter::validate)
}

fn ends_with_escape(pattern: &str) -> bool {
    let mut escaped = false;
    for current in pattern.chars() {
        escaped = !escaped && current == '\\';
    }
    escaped
}

enum LikeToken {
    AnySequence,
    AnyChar,
    Literal(char),
}

fn like_tokens(pattern: &str) -> Vec<LikeToken> {
    let mut tokens = Vec::new();
    let mut chars = pattern.chars();
    while let Some(current) = chars.next() {
        match current {
            '%' => tokens.push(LikeToken::AnySequence),
            '_' => tokens.push(LikeToken::AnyChar),
            '\\' => tokens.push(LikeToken::Literal(chars.next().unwrap_or('\\'))),
            other => tokens.push(LikeToken::Literal(other)),
        }
    }
    tokens
}

/// Matches `value` against a SQL `LIKE` pattern (`%`, `_`, backslash escape).
#[must_use]
pub fn like_matches(value: &str, pattern: &str) -> bool {
    let value = value.chars().collect::<Vec<_>>();
    let mut reachable = vec![false; value.len() + 1];
    reachable[0] = true;

    for token in like_tokens(pattern) {
        let mut next = vec![false; value.len() + 1];
        match token {
            LikeToken::AnySequence => {
                let mut seen = false;
                for (index, state) in reachable.iter().enumerate() {
                    seen |= *state;
                    next[index] = seen;
                }
            }
            LikeToken::AnyChar => {
                for index in 0..value.len() {
                    if reachable[index] {
                        next[index + 1] = true;
                    }
                }
            }
            LikeToken::Literal(expected) => {
                for index in 0..value.len() {
                    if reachable[index] && value[index] == expected {
                        next[index + 1] = true;
                    }
                }
            }
        }
        reachable = next;
    }

    reachable[value.len()]
}

/// Filterable user columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UserColumn {
    /// User identifier.
    Id,
    /// Email address.
    Email,
    /// Creation timestamp.
    CreatedAt,
}

impl FilterColumn for UserColumn {
    fn column_name(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Email => "email",
            Self::CreatedAt => "created_at",
        }
    }
}

/// Filterable role columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoleColumn {
    /// Role identifier.
    Id,
    /// Role name.
    Name,
    /// Role description.
    Description,
    /// Creation timestamp.
    CreatedAt,
    /// Last update timestamp.
    UpdatedAt,
}

impl FilterColumn for RoleColumn {
    fn column_name(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Name => "name",
            Self::Description => "description",
            Self::CreatedAt => "created_at",
            Self::UpdatedAt => "updated_at",
        }
    }
}

/// Filterable permission columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PermissionColumn {
    /// Permission identifier.
    Id,
    /// Permission name.
    Name,
    /// Permission description.
    Description,
    /// Creation timestamp.
    CreatedAt,
    /// Last update timestamp.
    UpdatedAt,
}

impl FilterColumn for PermissionColumn {
    fn column_name(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Name => "name",
            Self::Description => "description",
            Self::CreatedAt => "created_at",
            Self::UpdatedAt => "updated_at",
        }
    }
}

impl FilterTarget<UserColumn> for User {
    fn filter_value(&self, column: UserColumn) -> Option<FilterValue> {
        Some(match column {
            UserColumn::Id => self.id().into(),
            UserColumn::Email => self.email().as_str().into(),
            UserColumn::CreatedAt => self.created_at().into(),
        })
    }
}

impl FilterTarget<RoleColumn> for Role {
    fn filter_value(&self, column: RoleColumn) -> Option<FilterValue> {
        match column {
            RoleColumn::Id => Some(self.id().into()),
            RoleColumn::Name => Some(self.name().into()),
            RoleColumn::Description => self.description().map(Into::into),
            RoleColumn::CreatedAt => Some(self.created_at().into()),
            RoleColumn::UpdatedAt => Some(self.updated_at().into()),
        }
    }
}

impl FilterTarget<PermissionColumn> for Permission {
    fn filter_value(&self, column: PermissionColumn) -> Option<FilterValue> {
        match column {
            PermissionColumn::Id => Some(self.id().into()),
            PermissionColumn::Name => Some(self.name().into()),
            PermissionColumn::Description => self.description().map(Into::into),
            PermissionColumn::CreatedAt => Some(self.created_at().into()),
            PermissionColumn::UpdatedAt => Some(self.updated_at().into()),
        }
    }
}
