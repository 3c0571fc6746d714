//! Client store — persistence for authenticated identities.
//!
//! A transaction-scoped handle: construct one against whatever connection
//! (or live transaction) the current operation runs under. The
//! access-control layer builds one of these per transaction to verify a
//! client exists before mutating a membership.

use rusqlite::{Connection, OptionalExtension, Row};

use keyrack_types::Client;

use crate::db::now_rfc3339;
use crate::error::StoreError;

pub struct ClientStore<'conn> {
    conn: &'conn Connection,
}

impl<'conn> ClientStore<'conn> {
    #[must_use]
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    /// Register a new client. Names are unique; a duplicate surfaces as
    /// [`StoreError::ConstraintViolation`].
    pub fn create_client(&self, name: &str) -> Result<i64, StoreError> {
        self.conn.execute(
            "INSERT INTO clients (name, created_at) VALUES (?1, ?2)",
            (name, now_rfc3339()),
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn client_by_id(&self, id: i64) -> Result<Option<Client>, StoreError> {
        let client = self
            .conn
            .query_row(
                "SELECT id, name, created_at FROM clients WHERE id = ?1",
                [id],
                row_to_client,
            )
            .optional()?;
        Ok(client)
    }

    pub fn client_by_name(&self, name: &str) -> Result<Option<Client>, StoreError> {
        let client = self
            .conn
            .query_row(
                "SELECT id, name, created_at FROM clients WHERE name = ?1",
                [name],
                row_to_client,
            )
            .optional()?;
        Ok(client)
    }
}

pub(crate) fn row_to_client(row: &Row<'_>) -> rusqlite::Result<Client> {
    Ok(Client {
        id: row.get(0)?,
        name: row.get(1)?,
        created_at: row.get(2)?,
    })
}
