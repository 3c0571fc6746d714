//! Secret content store — immutable payload versions under a series.
//!
//! Content rows are append-only: created once, fetched by (series,
//! version), and deleted individually. The (series, version) pair is
//! unique, so re-creating an existing version label surfaces a
//! [`StoreError::ConstraintViolation`].

use std::collections::BTreeMap;

use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row};

use keyrack_types::SecretContent;

use crate::db::now_rfc3339;
use crate::error::StoreError;

/// Transaction-scoped handle over the `secrets_content` table.
pub struct SecretContentStore<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SecretContentStore<'conn> {
    #[must_use]
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    /// Append one content version under a series. Returns the new row id.
    pub fn create_content(
        &self,
        series_id: i64,
        encrypted_content: &str,
        version: &str,
        created_by: &str,
        metadata: &BTreeMap<String, String>,
    ) -> Result<i64, StoreError> {
        let metadata_json = serde_json::to_string(metadata)
            .map_err(|err| StoreError::InvalidArgument(format!("unencodable metadata: {err}")))?;
        self.conn.execute(
            "INSERT INTO secrets_content
             (secret_id, encrypted_content, version, created_at, created_by, metadata)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            (
                series_id,
                encrypted_content,
                version,
                now_rfc3339(),
                created_by,
                metadata_json,
            ),
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// All content versions of a series, oldest first. Empty if the series
    /// is unknown or has no versions.
    pub fn contents_by_series(&self, series_id: i64) -> Result<Vec<SecretContent>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, secret_id, encrypted_content, version, created_at, created_by, metadata
             FROM secrets_content WHERE secret_id = ?1 ORDER BY id ASC",
        )?;
        let contents = stmt
            .query_map([series_id], row_to_content)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(contents)
    }

    pub fn content_by_series_and_version(
        &self,
        series_id: i64,
        version: &str,
    ) -> Result<Option<SecretContent>, StoreError> {
        let content = self
            .conn
            .query_row(
                "SELECT id, secret_id, encrypted_content, version, created_at, created_by, metadata
                 FROM secrets_content WHERE secret_id = ?1 AND version = ?2",
                (series_id, version),
                row_to_content,
            )
            .optional()?;
        Ok(content)
    }

    /// Version labels known for a series.
    pub fn versions(&self, series_id: i64) -> Result<Vec<String>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT version FROM secrets_content WHERE secret_id = ?1 ORDER BY id ASC",
        )?;
        let versions = stmt
            .query_map([series_id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(versions)
    }

    /// Delete one content version. No-op if absent.
    pub fn delete_by_series_and_version(
        &self,
        series_id: i64,
        version: &str,
    ) -> Result<(), StoreError> {
        self.conn.execute(
            "DELETE FROM secrets_content WHERE secret_id = ?1 AND version = ?2",
            (series_id, version),
        )?;
        Ok(())
    }
}

pub(crate) fn row_to_content(row: &Row<'_>) -> rusqlite::Result<SecretContent> {
    let metadata_json: String = row.get(6)?;
    let metadata = serde_json::from_str(&metadata_json)
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(6, Type::Text, Box::new(err)))?;
    Ok(SecretContent {
        id: row.get(0)?,
        series_id: row.get(1)?,
        encrypted_content: row.get(2)?,
        version: row.get(3)?,
        created_at: row.get(4)?,
        created_by: row.get(5)?,
        metadata,
    })
}
