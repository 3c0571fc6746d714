//! SQLite-backed access control and versioned secret storage.
//!
//! This crate provides:
//! - The authorization graph: memberships (client ↔ group) and access
//!   grants (group ↔ secret series), queried and mutated through
//!   [`AccessControl`]
//! - The secret lifecycle: named series with append-only content
//!   versions, managed through [`SecretVersions`]
//! - The four leaf stores the managers compose, usable as
//!   transaction-scoped handles against any connection
//!
//! # Architecture
//!
//! ```text
//! AccessControl                     SecretVersions
//! ├── ClientStore    (clients)      ├── SecretSeriesStore  (secrets)
//! ├── GroupStore     (groups)       └── SecretContentStore (secrets_content)
//! ├── SecretSeriesStore
//! └── SecretContentStore
//! ```
//!
//! Each manager owns one connection; every multi-step operation opens a
//! transaction on it and rebuilds the leaf stores against that
//! transaction, so the existence check and the write observe the same
//! snapshot. There is no caching and no application-level locking — the
//! schema's unique keys arbitrate races.

mod acl;
mod clients;
mod contents;
mod db;
mod error;
mod groups;
mod secrets;
mod series;

pub use acl::AccessControl;
pub use clients::ClientStore;
pub use contents::SecretContentStore;
pub use db::{open_connection, open_in_memory};
pub use error::{EntityKind, StoreError};
pub use groups::GroupStore;
pub use secrets::{NewSecret, SecretVersions};
pub use series::SecretSeriesStore;
