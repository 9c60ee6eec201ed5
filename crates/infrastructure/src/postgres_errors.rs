use tollgate_core::AppError;

const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";

/// Maps a failed write to an application error.
///
/// Unique violations become conflicts and foreign-key violations become
/// validation errors; everything else is internal.
pub(crate) fn write_error(error: sqlx::Error, operation: &str) -> AppError {
    if let sqlx::Error::Database(ref database_error) = error {
        match database_error.code().as_deref() {
            Some(UNIQUE_VIOLATION) => {
                return AppError::Conflict(format!(
                    "failed to {operation}: {}",
                    database_error.message()
                ));
            }
            Some(FOREIGN_KEY_VIOLATION) => {
                return AppError::Validation(format!(
                    "failed to {operation}: {}",
                    database_error.message()
                ));
            }
            _ => {}
        }
    }

    AppError::Internal(format!("failed to {operation}: {error}"))
}

/// Maps a failed read to an internal error.
pub(crate) fn read_error(error: sqlx::Error, operation: &str) -> AppError {
    AppError::Internal(format!("failed to {operation}: {error}"))
}

/// Converts a SQL `COUNT` result to the port's unsigned count.
pub(crate) fn row_count(count: i64, operation: &str) -> Result<u64, AppError> {
    u64::try_from(count).map_err(|error| {
        AppError::Internal(format!("failed to {operation}: negative count {count}: {error}"))
    })
}
