//! Secret series store — the durable, named identity of each secret.
//!
//! A series row carries everything about a secret except its payload
//! versions, which live in [`contents`](crate::contents). `generation_options`
//! is an opaque key/value map stored as a JSON column.

use std::collections::BTreeMap;

use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row};

use keyrack_types::SecretSeries;

use crate::db::now_rfc3339;
use crate::error::StoreError;

/// Transaction-scoped handle over the `secrets` table.
pub struct SecretSeriesStore<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SecretSeriesStore<'conn> {
    #[must_use]
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    /// Create a series. Names are globally unique; a duplicate surfaces as
    /// [`StoreError::ConstraintViolation`]. Returns the new series id.
    pub fn create_series(
        &self,
        name: &str,
        created_by: &str,
        description: &str,
        type_tag: Option<&str>,
        generation_options: Option<&BTreeMap<String, String>>,
    ) -> Result<i64, StoreError> {
        let options_json = generation_options
            .map(serde_json::to_string)
            .transpose()
            .map_err(|err| {
                StoreError::InvalidArgument(format!("unencodable generation options: {err}"))
            })?;
        self.conn.execute(
            "INSERT INTO secrets (name, created_at, created_by, description, type, generation_options)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            (name, now_rfc3339(), created_by, description, type_tag, options_json),
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn series_by_id(&self, id: i64) -> Result<Option<SecretSeries>, StoreError> {
        let series = self
            .conn
            .query_row(
                "SELECT id, name, created_at, created_by, description, type, generation_options
                 FROM secrets WHERE id = ?1",
                [id],
                row_to_series,
            )
            .optional()?;
        Ok(series)
    }

    pub fn series_by_name(&self, name: &str) -> Result<Option<SecretSeries>, StoreError> {
        let series = self
            .conn
            .query_row(
                "SELECT id, name, created_at, created_by, description, type, generation_options
                 FROM secrets WHERE name = ?1",
                [name],
                row_to_series,
            )
            .optional()?;
        Ok(series)
    }

    /// Every series in the store, unfiltered.
    pub fn list_all(&self) -> Result<Vec<SecretSeries>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, created_at, created_by, description, type, generation_options
             FROM secrets ORDER BY id ASC",
        )?;
        let series = stmt
            .query_map([], row_to_series)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(series)
    }

    /// Delete a series by id. Content rows cascade. No-op if absent.
    pub fn delete_by_id(&self, id: i64) -> Result<(), StoreError> {
        self.conn
            .execute("DELETE FROM secrets WHERE id = ?1", [id])?;
        Ok(())
    }

    /// Delete a series by name. Content rows cascade. No-op if absent.
    pub fn delete_by_name(&self, name: &str) -> Result<(), StoreError> {
        self.conn
            .execute("DELETE FROM secrets WHERE name = ?1", [name])?;
        Ok(())
    }
}

pub(crate) fn row_to_series(row: &Row<'_>) -> rusqlite::Result<SecretSeries> {
    let options_json: Option<String> = row.get(6)?;
    let generation_options = options_json
        .map(|json| {
            serde_json::from_str(&json).map_err(|err| {
                rusqlite::Error::FromSqlConversionFailure(6, Type::Text, Box::new(err))
            })
        })
        .transpose()?;
    Ok(SecretSeries {
        id: row.get(0)?,
        name: row.get(1)?,
        created_at: row.get(2)?,
        created_by: row.get(3)?,
        description: row.get(4)?,
        type_tag: row.get(5)?,
        generation_options,
    })
}
