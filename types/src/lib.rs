//! Core domain types for keyrack.
//!
//! This crate contains pure domain types with no IO, no async, and minimal
//! dependencies. Everything here can be used from any layer of the
//! application.
//!
//! Key/value maps (`metadata`, `generation_options`) are `BTreeMap` so the
//! types stay `Hash`/`Eq` (the ACL query layer returns sets) and their JSON
//! encoding is deterministic.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// An identity allowed to authenticate to the system.
///
/// Owned and mutated by the client store; the access-control layer only
/// reads it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Client {
    pub id: i64,
    pub name: String,
    pub created_at: String,
}

/// A named collection of clients granted access to secrets.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Group {
    pub id: i64,
    pub name: String,
    pub created_at: String,
}

/// The durable identity of a secret, independent of any particular version
/// of its content.
///
/// A series is created once per unique name and destroyed only when it has
/// zero content versions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SecretSeries {
    pub id: i64,
    pub name: String,
    pub created_at: String,
    pub created_by: String,
    pub description: String,
    /// Optional type tag (e.g. a file-format hint for consumers).
    pub type_tag: Option<String>,
    /// Opaque options recorded when the secret was generated.
    pub generation_options: Option<BTreeMap<String, String>>,
}

/// One immutable payload snapshot under a series, identified by a version
/// label. The label may be the empty string, denoting "the" unversioned
/// default.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SecretContent {
    pub id: i64,
    pub series_id: i64,
    pub encrypted_content: String,
    pub version: String,
    pub created_at: String,
    pub created_by: String,
    pub metadata: BTreeMap<String, String>,
}

/// A series paired with one of its content versions — the full shape of a
/// single secret version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SecretSeriesAndContent {
    pub series: SecretSeries,
    pub content: SecretContent,
}

impl SecretSeriesAndContent {
    #[must_use]
    pub fn of(series: SecretSeries, content: SecretContent) -> Self {
        Self { series, content }
    }
}

/// A disclosure-safe projection of series + content metadata.
///
/// The encrypted payload is stripped entirely; everything else survives.
/// Two sanitized secrets are equal exactly when they describe the same
/// (series, version) pair with the same metadata, so set deduplication
/// across multiple authorization paths falls out of `Hash`/`Eq`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SanitizedSecret {
    pub series_id: i64,
    pub name: String,
    pub version: String,
    pub description: String,
    pub created_at: String,
    pub created_by: String,
    pub type_tag: Option<String>,
    pub metadata: BTreeMap<String, String>,
    pub generation_options: Option<BTreeMap<String, String>>,
}

impl SanitizedSecret {
    /// Build the redacted view of one secret version.
    #[must_use]
    pub fn from_parts(series: &SecretSeries, content: &SecretContent) -> Self {
        Self {
            series_id: series.id,
            name: series.name.clone(),
            version: content.version.clone(),
            description: series.description.clone(),
            created_at: content.created_at.clone(),
            created_by: content.created_by.clone(),
            type_tag: series.type_tag.clone(),
            metadata: content.metadata.clone(),
            generation_options: series.generation_options.clone(),
        }
    }
}
