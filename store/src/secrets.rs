//! Versioned secret lifecycle.
//!
//! [`SecretVersions`] does not map to a table of its own; it composes the
//! series and content stores into the secret abstraction callers work
//! with: a named series plus an ordered set of immutable content versions.
//! Every multi-step operation runs inside one transaction, so the
//! create-or-append decision and the cascade delete of an emptied series
//! are atomic with the reads that justify them.
//!
//! Results here are unfiltered by authorization — callers compose with
//! [`AccessControl`](crate::AccessControl) before disclosing anything.

use std::collections::BTreeMap;
use std::path::Path;

use rusqlite::Connection;
use tracing::debug;

use keyrack_types::SecretSeriesAndContent;

use crate::contents::SecretContentStore;
use crate::db;
use crate::error::{EntityKind, StoreError, checked_id, checked_name};
use crate::series::SecretSeriesStore;

/// Request to create a secret, or a new version of an existing one.
///
/// The caller never states which of the two it wants: the distinction is
/// made internally by whether a series with this name already exists. The
/// series-level fields (`description`, `type_tag`, `generation_options`)
/// only take effect when the series is created.
#[derive(Debug, Clone, Default)]
pub struct NewSecret<'a> {
    pub name: &'a str,
    pub encrypted_content: &'a str,
    /// Version label; may be empty, denoting the unversioned default.
    pub version: &'a str,
    pub created_by: &'a str,
    pub metadata: BTreeMap<String, String>,
    pub description: &'a str,
    pub type_tag: Option<&'a str>,
    pub generation_options: Option<BTreeMap<String, String>>,
}

/// Manager for secret series and their content versions.
pub struct SecretVersions {
    db: Connection,
}

impl SecretVersions {
    /// Open or create the keyrack database at the given path.
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        Ok(Self {
            db: db::open_connection(path)?,
        })
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> anyhow::Result<Self> {
        Ok(Self {
            db: db::open_in_memory()?,
        })
    }

    /// Atomic create-or-append. Resolves the series by name, creating it
    /// if absent, then appends one content version under it. Returns the
    /// series id. A duplicate version label within the series surfaces as
    /// [`StoreError::ConstraintViolation`].
    pub fn create_secret(&mut self, secret: &NewSecret<'_>) -> Result<i64, StoreError> {
        let name = checked_name(secret.name)?;

        let tx = self.db.transaction()?;
        let series = SecretSeriesStore::new(&tx);
        let series_id = match series.series_by_name(name)? {
            Some(existing) => existing.id,
            None => series.create_series(
                name,
                secret.created_by,
                secret.description,
                secret.type_tag,
                secret.generation_options.as_ref(),
            )?,
        };
        SecretContentStore::new(&tx).create_content(
            series_id,
            secret.encrypted_content,
            secret.version,
            secret.created_by,
            &secret.metadata,
        )?;
        tx.commit()?;
        Ok(series_id)
    }

    /// The full version history of a series: every (series, content) pair.
    /// Empty if the series does not exist.
    pub fn secrets_by_id(
        &mut self,
        series_id: i64,
    ) -> Result<Vec<SecretSeriesAndContent>, StoreError> {
        let series_id = checked_id(EntityKind::Secret, series_id)?;

        let tx = self.db.transaction()?;
        let secrets = match SecretSeriesStore::new(&tx).series_by_id(series_id)? {
            Some(series) => SecretContentStore::new(&tx)
                .contents_by_series(series_id)?
                .into_iter()
                .map(|content| SecretSeriesAndContent::of(series.clone(), content))
                .collect(),
            None => Vec::new(),
        };
        tx.commit()?;
        Ok(secrets)
    }

    /// One secret version by series id. Empty if the series or that
    /// version is missing.
    pub fn secret_by_id_and_version(
        &mut self,
        series_id: i64,
        version: &str,
    ) -> Result<Option<SecretSeriesAndContent>, StoreError> {
        let series_id = checked_id(EntityKind::Secret, series_id)?;

        let tx = self.db.transaction()?;
        let secret = match SecretSeriesStore::new(&tx).series_by_id(series_id)? {
            Some(series) => SecretContentStore::new(&tx)
                .content_by_series_and_version(series_id, version)?
                .map(|content| SecretSeriesAndContent::of(series, content)),
            None => None,
        };
        tx.commit()?;
        Ok(secret)
    }

    /// One secret version by series name. Empty if the series or that
    /// version is missing.
    pub fn secret_by_name_and_version(
        &mut self,
        name: &str,
        version: &str,
    ) -> Result<Option<SecretSeriesAndContent>, StoreError> {
        let name = checked_name(name)?;

        let tx = self.db.transaction()?;
        let secret = match SecretSeriesStore::new(&tx).series_by_name(name)? {
            Some(series) => SecretContentStore::new(&tx)
                .content_by_series_and_version(series.id, version)?
                .map(|content| SecretSeriesAndContent::of(series, content)),
            None => None,
        };
        tx.commit()?;
        Ok(secret)
    }

    /// Version labels known for a series name; empty if the series does
    /// not exist.
    pub fn versions_for_name(&mut self, name: &str) -> Result<Vec<String>, StoreError> {
        let name = checked_name(name)?;

        let tx = self.db.transaction()?;
        let versions = match SecretSeriesStore::new(&tx).series_by_name(name)? {
            Some(series) => SecretContentStore::new(&tx).versions(series.id)?,
            None => Vec::new(),
        };
        tx.commit()?;
        Ok(versions)
    }

    /// Every (series, content) pair in the store, unfiltered and
    /// unauthorized.
    pub fn all_secrets(&mut self) -> Result<Vec<SecretSeriesAndContent>, StoreError> {
        let tx = self.db.transaction()?;
        let mut secrets = Vec::new();
        {
            let contents = SecretContentStore::new(&tx);
            for series in SecretSeriesStore::new(&tx).list_all()? {
                for content in contents.contents_by_series(series.id)? {
                    secrets.push(SecretSeriesAndContent::of(series.clone(), content));
                }
            }
        }
        tx.commit()?;
        Ok(secrets)
    }

    /// Delete a series and all of its versions. No-op if the name does not
    /// exist.
    pub fn delete_secrets_by_name(&mut self, name: &str) -> Result<(), StoreError> {
        let name = checked_name(name)?;
        SecretSeriesStore::new(&self.db).delete_by_name(name)?;
        Ok(())
    }

    /// Delete exactly one content version. If it was the last remaining
    /// version, the series itself is deleted in the same transaction, so
    /// an empty series is never observable. No-op if the series or the
    /// version does not exist.
    pub fn delete_secret_by_name_and_version(
        &mut self,
        name: &str,
        version: &str,
    ) -> Result<(), StoreError> {
        let name = checked_name(name)?;

        let tx = self.db.transaction()?;
        {
            let series = SecretSeriesStore::new(&tx);
            let Some(existing) = series.series_by_name(name)? else {
                return Ok(());
            };

            let contents = SecretContentStore::new(&tx);
            contents.delete_by_series_and_version(existing.id, version)?;

            if contents.contents_by_series(existing.id)?.is_empty() {
                debug!(series_id = existing.id, secret = name, "deleting emptied series");
                series.delete_by_id(existing.id)?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{NewSecret, SecretVersions};
    use crate::error::StoreError;
    use std::collections::{BTreeMap, HashSet};

    fn new_secret<'a>(name: &'a str, payload: &'a str, version: &'a str) -> NewSecret<'a> {
        NewSecret {
            name,
            encrypted_content: payload,
            version,
            created_by: "ops",
            metadata: BTreeMap::new(),
            description: "test secret",
            type_tag: None,
            generation_options: None,
        }
    }

    #[test]
    fn create_twice_appends_to_one_series() {
        let mut secrets = SecretVersions::open_in_memory().expect("open");

        let first = secrets
            .create_secret(&new_secret("db-pass", "cGF5bG9hZDE=", "v1"))
            .expect("create v1");
        let second = secrets
            .create_secret(&new_secret("db-pass", "cGF5bG9hZDI=", "v2"))
            .expect("create v2");
        assert_eq!(first, second, "same name must resolve to one series");

        let history = secrets.secrets_by_id(first).expect("history");
        assert_eq!(history.len(), 2);
        assert!(history.iter().all(|s| s.series.name == "db-pass"));

        let versions: HashSet<String> = secrets
            .versions_for_name("db-pass")
            .expect("versions")
            .into_iter()
            .collect();
        assert_eq!(
            versions,
            HashSet::from(["v1".to_string(), "v2".to_string()])
        );
    }

    #[test]
    fn duplicate_version_in_series_is_a_constraint_violation() {
        let mut secrets = SecretVersions::open_in_memory().expect("open");

        secrets
            .create_secret(&new_secret("db-pass", "cGF5bG9hZA==", "v1"))
            .expect("create v1");
        let err = secrets
            .create_secret(&new_secret("db-pass", "b3RoZXI=", "v1"))
            .expect_err("duplicate version must fail");
        assert!(matches!(err, StoreError::ConstraintViolation(_)));
    }

    #[test]
    fn lookups_by_id_and_name() {
        let mut secrets = SecretVersions::open_in_memory().expect("open");
        let id = secrets
            .create_secret(&new_secret("api-key", "cGF5bG9hZA==", "v1"))
            .expect("create");

        let by_id = secrets
            .secret_by_id_and_version(id, "v1")
            .expect("query")
            .expect("present");
        assert_eq!(by_id.content.encrypted_content, "cGF5bG9hZA==");

        let by_name = secrets
            .secret_by_name_and_version("api-key", "v1")
            .expect("query")
            .expect("present");
        assert_eq!(by_name.series.id, id);

        assert!(
            secrets
                .secret_by_id_and_version(id, "v2")
                .expect("query")
                .is_none()
        );
        assert!(
            secrets
                .secret_by_name_and_version("unknown", "v1")
                .expect("query")
                .is_none()
        );
        assert!(secrets.secrets_by_id(999).expect("query").is_empty());
    }

    #[test]
    fn empty_name_is_rejected() {
        let mut secrets = SecretVersions::open_in_memory().expect("open");
        let err = secrets
            .create_secret(&new_secret("", "cGF5bG9hZA==", "v1"))
            .expect_err("empty name must fail");
        assert!(matches!(err, StoreError::InvalidArgument(_)));
    }

    #[test]
    fn oversized_series_id_is_rejected() {
        let mut secrets = SecretVersions::open_in_memory().expect("open");
        let err = secrets
            .secrets_by_id(i64::from(i32::MAX) + 1)
            .expect_err("oversized id must fail");
        assert!(matches!(err, StoreError::InvalidArgument(_)));
    }

    #[test]
    fn versions_for_unknown_name_is_empty_not_an_error() {
        let mut secrets = SecretVersions::open_in_memory().expect("open");
        assert!(secrets.versions_for_name("ghost").expect("query").is_empty());
    }

    #[test]
    fn all_secrets_enumerates_every_version() {
        let mut secrets = SecretVersions::open_in_memory().expect("open");
        secrets
            .create_secret(&new_secret("db-pass", "cGF5bG9hZDE=", "v1"))
            .expect("create");
        secrets
            .create_secret(&new_secret("db-pass", "cGF5bG9hZDI=", "v2"))
            .expect("create");
        secrets
            .create_secret(&new_secret("api-key", "cGF5bG9hZA==", ""))
            .expect("create");

        let all = secrets.all_secrets().expect("all");
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn deleting_one_version_keeps_the_series() {
        let mut secrets = SecretVersions::open_in_memory().expect("open");
        let id = secrets
            .create_secret(&new_secret("db-pass", "cGF5bG9hZDE=", "v1"))
            .expect("create v1");
        secrets
            .create_secret(&new_secret("db-pass", "cGF5bG9hZDI=", "v2"))
            .expect("create v2");

        secrets
            .delete_secret_by_name_and_version("db-pass", "v1")
            .expect("delete v1");

        let history = secrets.secrets_by_id(id).expect("history");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].content.version, "v2");
    }

    #[test]
    fn deleting_the_last_version_deletes_the_series() {
        let mut secrets = SecretVersions::open_in_memory().expect("open");
        let id = secrets
            .create_secret(&new_secret("db-pass", "cGF5bG9hZA==", "v1"))
            .expect("create");

        secrets
            .delete_secret_by_name_and_version("db-pass", "v1")
            .expect("delete last version");

        assert!(secrets.secrets_by_id(id).expect("query").is_empty());
        assert!(
            secrets
                .versions_for_name("db-pass")
                .expect("query")
                .is_empty()
        );

        // The name is free again: re-creating starts a fresh series.
        secrets
            .create_secret(&new_secret("db-pass", "bmV3", "v1"))
            .expect("recreate");
    }

    #[test]
    fn delete_by_name_removes_all_versions() {
        let mut secrets = SecretVersions::open_in_memory().expect("open");
        let id = secrets
            .create_secret(&new_secret("db-pass", "cGF5bG9hZDE=", "v1"))
            .expect("create");
        secrets
            .create_secret(&new_secret("db-pass", "cGF5bG9hZDI=", "v2"))
            .expect("create");

        secrets
            .delete_secrets_by_name("db-pass")
            .expect("delete all");
        assert!(secrets.secrets_by_id(id).expect("query").is_empty());

        // Unknown name: no-op.
        secrets
            .delete_secrets_by_name("db-pass")
            .expect("delete again");
    }

    #[test]
    fn delete_of_unknown_version_is_a_noop() {
        let mut secrets = SecretVersions::open_in_memory().expect("open");
        secrets
            .create_secret(&new_secret("db-pass", "cGF5bG9hZA==", "v1"))
            .expect("create");

        secrets
            .delete_secret_by_name_and_version("db-pass", "v9")
            .expect("unknown version");
        secrets
            .delete_secret_by_name_and_version("ghost", "v1")
            .expect("unknown series");

        assert_eq!(
            secrets.versions_for_name("db-pass").expect("versions"),
            vec!["v1"]
        );
    }
}
