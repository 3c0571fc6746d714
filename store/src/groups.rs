//! Group store — persistence for named collections of clients.

use rusqlite::{Connection, OptionalExtension, Row};

use keyrack_types::Group;

use crate::db::now_rfc3339;
use crate::error::StoreError;

/// Transaction-scoped handle over the `groups` table.
pub struct GroupStore<'conn> {
    conn: &'conn Connection,
}

impl<'conn> GroupStore<'conn> {
    #[must_use]
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    /// Create a group. Names are unique; a duplicate surfaces as
    /// [`StoreError::ConstraintViolation`].
    pub fn create_group(&self, name: &str) -> Result<i64, StoreError> {
        self.conn.execute(
            "INSERT INTO groups (name, created_at) VALUES (?1, ?2)",
            (name, now_rfc3339()),
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn group_by_id(&self, id: i64) -> Result<Option<Group>, StoreError> {
        let group = self
            .conn
            .query_row(
                "SELECT id, name, created_at FROM groups WHERE id = ?1",
                [id],
                row_to_group,
            )
            .optional()?;
        Ok(group)
    }

    pub fn group_by_name(&self, name: &str) -> Result<Option<Group>, StoreError> {
        let group = self
            .conn
            .query_row(
                "SELECT id, name, created_at FROM groups WHERE name = ?1",
                [name],
                row_to_group,
            )
            .optional()?;
        Ok(group)
    }
}

pub(crate) fn row_to_group(row: &Row<'_>) -> rusqlite::Result<Group> {
    Ok(Group {
        id: row.get(0)?,
        name: row.get(1)?,
        created_at: row.get(2)?,
    })
}

#[cfg(test)]
mod tests {
    use super::GroupStore;
    use crate::db::open_in_memory;
    use crate::error::StoreError;

    #[test]
    fn create_and_fetch_group() {
        let db = open_in_memory().expect("open");
        let store = GroupStore::new(&db);

        let id = store.create_group("security-team").expect("create");
        let group = store.group_by_id(id).expect("query").expect("present");
        assert_eq!(group.name, "security-team");
    }

    #[test]
    fn duplicate_group_name_is_a_constraint_violation() {
        let db = open_in_memory().expect("open");
        let store = GroupStore::new(&db);

        store.create_group("security-team").expect("create");
        let err = store
            .create_group("security-team")
            .expect_err("duplicate must fail");
        assert!(matches!(err, StoreError::ConstraintViolation(_)));
    }
}
