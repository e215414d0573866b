//! Translation of driver errors into the catalog's error kinds.
//!
//! Constraint violations are recognised by SQLite extended result code so
//! that races lost at the storage level surface with the same kind as the
//! application-level checks in front of them.

use madden_core::Error;
use rusqlite::ffi;

/// Build a `map_err` adapter that wraps a driver error as [`Error::Storage`].
pub(crate) fn storage(context: impl Into<String>) -> impl FnOnce(rusqlite::Error) -> Error {
    let context = context.into();
    move |e| Error::storage(context, e)
}

/// Wrap an r2d2 checkout failure.
pub(crate) fn pool(e: r2d2::Error) -> Error {
    Error::storage("failed to get connection from pool", e)
}

fn extended_code(e: &rusqlite::Error) -> Option<i32> {
    match e {
        rusqlite::Error::SqliteFailure(err, _) if err.code == rusqlite::ErrorCode::ConstraintViolation => {
            Some(err.extended_code)
        }
        _ => None,
    }
}

/// UNIQUE or PRIMARY KEY constraint violation.
pub(crate) fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        extended_code(e),
        Some(ffi::SQLITE_CONSTRAINT_UNIQUE) | Some(ffi::SQLITE_CONSTRAINT_PRIMARYKEY)
    )
}

pub(crate) fn is_foreign_key_violation(e: &rusqlite::Error) -> bool {
    extended_code(e) == Some(ffi::SQLITE_CONSTRAINT_FOREIGNKEY)
}
