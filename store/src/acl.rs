//! Access control over the client/group/secret authorization graph.
//!
//! [`AccessControl`] owns the two bipartite relations: memberships
//! (client ↔ group) and access grants (group ↔ secret series). Every
//! mutation validates that both referenced entities exist and performs the
//! write inside one transaction, so a concurrent delete of a referenced
//! entity cannot slip between the check and the write.
//!
//! The single-secret lookup ([`AccessControl::sanitized_secret_for`])
//! deliberately conflates "secret does not exist", "client is not
//! authorized", and "no such version" into one empty result. Callers that
//! may disclose existence information must consult the secret store
//! directly; this layer never leaks it.

use std::collections::HashSet;
use std::path::Path;

use rusqlite::Connection;
use tracing::info;

use keyrack_types::{Client, Group, SanitizedSecret, SecretSeries};

use crate::clients::{ClientStore, row_to_client};
use crate::contents::SecretContentStore;
use crate::db;
use crate::error::{EntityKind, StoreError, checked_id, checked_name};
use crate::groups::{GroupStore, row_to_group};
use crate::series::{SecretSeriesStore, row_to_series};

/// Manager for memberships and access grants.
pub struct AccessControl {
    db: Connection,
}

impl AccessControl {
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

    /// Grant a group access to a secret series.
    ///
    /// Both entities must exist at transaction time; otherwise
    /// [`StoreError::ReferenceNotFound`] names the missing one and nothing
    /// is written. Granting an already-granted pair surfaces the store's
    /// uniqueness violation.
    pub fn allow_access(&mut self, secret_id: i64, group_id: i64) -> Result<(), StoreError> {
        let secret_id = checked_id(EntityKind::Secret, secret_id)?;
        let group_id = checked_id(EntityKind::Group, group_id)?;

        let tx = self.db.transaction()?;
        require_group(&tx, group_id, "allow access")?;
        require_secret(&tx, secret_id, "allow access")?;
        tx.execute(
            "INSERT INTO accessgrants (group_id, secret_id) VALUES (?1, ?2)",
            (group_id, secret_id),
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Revoke a group's access to a secret series. Idempotent: revoking an
    /// absent grant succeeds, but both entities must still exist.
    pub fn revoke_access(&mut self, secret_id: i64, group_id: i64) -> Result<(), StoreError> {
        let secret_id = checked_id(EntityKind::Secret, secret_id)?;
        let group_id = checked_id(EntityKind::Group, group_id)?;

        let tx = self.db.transaction()?;
        require_group(&tx, group_id, "revoke access")?;
        require_secret(&tx, secret_id, "revoke access")?;
        tx.execute(
            "DELETE FROM accessgrants WHERE group_id = ?1 AND secret_id = ?2",
            (group_id, secret_id),
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Enroll a client in a group. Duplicate memberships surface the
    /// store's uniqueness violation.
    pub fn enroll_client(&mut self, client_id: i64, group_id: i64) -> Result<(), StoreError> {
        let client_id = checked_id(EntityKind::Client, client_id)?;
        let group_id = checked_id(EntityKind::Group, group_id)?;

        let tx = self.db.transaction()?;
        require_client(&tx, client_id, "enroll client")?;
        require_group(&tx, group_id, "enroll client")?;
        tx.execute(
            "INSERT INTO memberships (client_id, group_id) VALUES (?1, ?2)",
            (client_id, group_id),
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Remove a client from a group. Idempotent like
    /// [`AccessControl::revoke_access`].
    pub fn evict_client(&mut self, client_id: i64, group_id: i64) -> Result<(), StoreError> {
        let client_id = checked_id(EntityKind::Client, client_id)?;
        let group_id = checked_id(EntityKind::Group, group_id)?;

        let tx = self.db.transaction()?;
        require_client(&tx, client_id, "evict client")?;
        require_group(&tx, group_id, "evict client")?;
        tx.execute(
            "DELETE FROM memberships WHERE client_id = ?1 AND group_id = ?2",
            (client_id, group_id),
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Every sanitized secret version reachable by a group through its
    /// access grants — one entry per (series, version).
    pub fn sanitized_secrets_for_group(
        &mut self,
        group: &Group,
    ) -> Result<HashSet<SanitizedSecret>, StoreError> {
        let tx = self.db.transaction()?;
        let set = sanitize_all(&tx, series_for_group(&tx, &group.name)?)?;
        tx.commit()?;
        Ok(set)
    }

    /// Every sanitized secret version reachable by a client through its
    /// group memberships. Secrets reachable through several groups
    /// collapse naturally under set semantics.
    pub fn sanitized_secrets_for_client(
        &mut self,
        client: &Client,
    ) -> Result<HashSet<SanitizedSecret>, StoreError> {
        let tx = self.db.transaction()?;
        let set = sanitize_all(&tx, series_for_client(&tx, &client.name)?)?;
        tx.commit()?;
        Ok(set)
    }

    /// Single-secret lookup scoped to a client's authorization.
    ///
    /// Returns `Ok(None)` when the secret does not exist, when the client's
    /// groups hold no grant to it, or when the named version is missing —
    /// these cases are intentionally indistinguishable here.
    pub fn sanitized_secret_for(
        &mut self,
        client: &Client,
        name: &str,
        version: &str,
    ) -> Result<Option<SanitizedSecret>, StoreError> {
        let name = checked_name(name)?;

        let tx = self.db.transaction()?;
        let sanitized = match series_for_client_and_name(&tx, &client.name, name)? {
            Some(series) => SecretContentStore::new(&tx)
                .content_by_series_and_version(series.id, version)?
                .map(|content| SanitizedSecret::from_parts(&series, &content)),
            None => None,
        };
        tx.commit()?;
        Ok(sanitized)
    }

    /// Groups holding a grant on the given secret.
    pub fn groups_for_secret(&self, secret: &SecretSeries) -> Result<HashSet<Group>, StoreError> {
        let mut stmt = self.db.prepare(
            "SELECT g.id, g.name, g.created_at
             FROM groups g
             JOIN accessgrants ag ON g.id = ag.group_id
             JOIN secrets s ON ag.secret_id = s.id
             WHERE s.name = ?1",
        )?;
        let groups = stmt
            .query_map([&secret.name], row_to_group)?
            .collect::<rusqlite::Result<HashSet<_>>>()?;
        Ok(groups)
    }

    /// Groups the given client belongs to.
    pub fn groups_for_client(&self, client: &Client) -> Result<HashSet<Group>, StoreError> {
        let mut stmt = self.db.prepare(
            "SELECT g.id, g.name, g.created_at
             FROM groups g
             JOIN memberships m ON g.id = m.group_id
             JOIN clients c ON c.id = m.client_id
             WHERE c.name = ?1",
        )?;
        let groups = stmt
            .query_map([&client.name], row_to_group)?
            .collect::<rusqlite::Result<HashSet<_>>>()?;
        Ok(groups)
    }

    /// Clients directly enrolled in the given group.
    pub fn clients_for_group(&self, group: &Group) -> Result<HashSet<Client>, StoreError> {
        let mut stmt = self.db.prepare(
            "SELECT c.id, c.name, c.created_at
             FROM clients c
             JOIN memberships m ON c.id = m.client_id
             JOIN groups g ON g.id = m.group_id
             WHERE g.name = ?1",
        )?;
        let clients = stmt
            .query_map([&group.name], row_to_client)?
            .collect::<rusqlite::Result<HashSet<_>>>()?;
        Ok(clients)
    }

    /// Clients reachable to the given secret through membership → grant.
    pub fn clients_for_secret(&self, secret: &SecretSeries) -> Result<HashSet<Client>, StoreError> {
        let mut stmt = self.db.prepare(
            "SELECT DISTINCT c.id, c.name, c.created_at
             FROM clients c
             JOIN memberships m ON c.id = m.client_id
             JOIN accessgrants ag ON m.group_id = ag.group_id
             JOIN secrets s ON s.id = ag.secret_id
             WHERE s.name = ?1",
        )?;
        let clients = stmt
            .query_map([&secret.name], row_to_client)?
            .collect::<rusqlite::Result<HashSet<_>>>()?;
        Ok(clients)
    }
}

fn require_client(conn: &Connection, client_id: i64, action: &str) -> Result<(), StoreError> {
    if ClientStore::new(conn).client_by_id(client_id)?.is_none() {
        info!(client_id, action, "refusing mutation: client not found");
        return Err(StoreError::ReferenceNotFound {
            kind: EntityKind::Client,
            id: client_id,
        });
    }
    Ok(())
}

fn require_group(conn: &Connection, group_id: i64, action: &str) -> Result<(), StoreError> {
    if GroupStore::new(conn).group_by_id(group_id)?.is_none() {
        info!(group_id, action, "refusing mutation: group not found");
        return Err(StoreError::ReferenceNotFound {
            kind: EntityKind::Group,
            id: group_id,
        });
    }
    Ok(())
}

fn require_secret(conn: &Connection, secret_id: i64, action: &str) -> Result<(), StoreError> {
    if SecretSeriesStore::new(conn)
        .series_by_id(secret_id)?
        .is_none()
    {
        info!(secret_id, action, "refusing mutation: secret not found");
        return Err(StoreError::ReferenceNotFound {
            kind: EntityKind::Secret,
            id: secret_id,
        });
    }
    Ok(())
}

/// Expand a set of reachable series into one sanitized secret per content
/// version, against the same transaction the series were read under.
fn sanitize_all(
    conn: &Connection,
    series: Vec<SecretSeries>,
) -> Result<HashSet<SanitizedSecret>, StoreError> {
    let contents = SecretContentStore::new(conn);
    let mut set = HashSet::new();
    for series in series {
        for content in contents.contents_by_series(series.id)? {
            set.insert(SanitizedSecret::from_parts(&series, &content));
        }
    }
    Ok(set)
}

fn series_for_group(conn: &Connection, group_name: &str) -> Result<Vec<SecretSeries>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT s.id, s.name, s.created_at, s.created_by, s.description, s.type, s.generation_options
         FROM secrets s
         JOIN accessgrants ag ON s.id = ag.secret_id
         JOIN groups g ON g.id = ag.group_id
         WHERE g.name = ?1",
    )?;
    let series = stmt
        .query_map([group_name], row_to_series)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(series)
}

fn series_for_client(
    conn: &Connection,
    client_name: &str,
) -> Result<Vec<SecretSeries>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT s.id, s.name, s.created_at, s.created_by, s.description, s.type, s.generation_options
         FROM secrets s
         JOIN accessgrants ag ON s.id = ag.secret_id
         JOIN memberships m ON ag.group_id = m.group_id
         JOIN clients c ON c.id = m.client_id
         WHERE c.name = ?1",
    )?;
    let series = stmt
        .query_map([client_name], row_to_series)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(series)
}

/// The conflated lookup behind [`AccessControl::sanitized_secret_for`]:
/// absent when the secret is unauthorized or does not exist, and the query
/// doesn't distinguish between those cases. The join through the content
/// table also hides a series that currently has zero versions.
fn series_for_client_and_name(
    conn: &Connection,
    client_name: &str,
    secret_name: &str,
) -> Result<Option<SecretSeries>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT s.id, s.name, s.created_at, s.created_by, s.description, s.type, s.generation_options
         FROM secrets s
         JOIN secrets_content sc ON s.id = sc.secret_id
         JOIN accessgrants ag ON s.id = ag.secret_id
         JOIN memberships m ON ag.group_id = m.group_id
         JOIN clients c ON c.id = m.client_id
         WHERE s.name = ?1 AND c.name = ?2
         LIMIT 1",
    )?;
    let mut rows = stmt.query_map((secret_name, client_name), row_to_series)?;
    rows.next().transpose().map_err(StoreError::from)
}
