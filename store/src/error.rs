//! Typed errors for the store layer.
//!
//! Read operations that find no matching row return `Ok(None)` / an empty
//! collection — absence is a normal outcome, not an error. The variants
//! here cover the failure modes the caller must distinguish: a mutation
//! referencing a missing entity, a uniqueness violation, and arguments
//! rejected before any store access.

use std::fmt;

use thiserror::Error;

/// The kind of entity a mutation referenced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Client,
    Group,
    Secret,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Client => write!(f, "client"),
            EntityKind::Group => write!(f, "group"),
            EntityKind::Secret => write!(f, "secret"),
        }
    }
}

/// Failure modes of the store layer.
///
/// `ReferenceNotFound` and `ConstraintViolation` are caller errors; a
/// failed transaction is rolled back entirely, so no partial writes
/// survive. `Database` wraps everything else from SQLite and is the
/// retryable infrastructure case.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} {id} doesn't exist")]
    ReferenceNotFound { kind: EntityKind, id: i64 },

    #[error("uniqueness constraint violated: {0}")]
    ConstraintViolation(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("database error")]
    Database(#[source] rusqlite::Error),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(code, message)
                if code.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                StoreError::ConstraintViolation(
                    message.unwrap_or_else(|| "constraint violation".to_string()),
                )
            }
            other => StoreError::Database(other),
        }
    }
}

/// Gate an externally-supplied 64-bit identifier to the 32-bit range the
/// storage contract allows. Rejected before any store access.
pub(crate) fn checked_id(kind: EntityKind, id: i64) -> Result<i64, StoreError> {
    if i32::try_from(id).is_ok() {
        Ok(id)
    } else {
        Err(StoreError::InvalidArgument(format!(
            "{kind} id {id} is outside the 32-bit identifier range"
        )))
    }
}

/// Reject an empty secret name before any store access.
pub(crate) fn checked_name(name: &str) -> Result<&str, StoreError> {
    if name.is_empty() {
        Err(StoreError::InvalidArgument(
            "secret name must not be empty".to_string(),
        ))
    } else {
        Ok(name)
    }
}

#[cfg(test)]
mod tests {
    use super::{EntityKind, StoreError, checked_id, checked_name};

    #[test]
    fn id_outside_i32_range_is_rejected() {
        let err = checked_id(EntityKind::Group, i64::from(i32::MAX) + 1)
            .expect_err("id past i32::MAX must be rejected");
        assert!(matches!(err, StoreError::InvalidArgument(_)));

        checked_id(EntityKind::Group, i64::from(i32::MAX)).expect("i32::MAX is representable");
        checked_id(EntityKind::Client, i64::from(i32::MIN)).expect("i32::MIN is representable");
    }

    #[test]
    fn empty_name_is_rejected() {
        assert!(matches!(
            checked_name(""),
            Err(StoreError::InvalidArgument(_))
        ));
        assert_eq!(checked_name("db-pass").expect("valid name"), "db-pass");
    }

    #[test]
    fn constraint_failures_map_to_constraint_violation() {
        let db = crate::db::open_in_memory().expect("open");
        db.execute(
            "INSERT INTO clients (name, created_at) VALUES ('c1', 't')",
            [],
        )
        .expect("first insert");
        let err: StoreError = db
            .execute(
                "INSERT INTO clients (name, created_at) VALUES ('c1', 't')",
                [],
            )
            .expect_err("duplicate name must fail")
            .into();
        assert!(matches!(err, StoreError::ConstraintViolation(_)));
    }
}
