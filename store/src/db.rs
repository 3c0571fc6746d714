//! Shared SQLite bootstrap for the keyrack stores.
//!
//! Both managers ([`AccessControl`](crate::AccessControl) and
//! [`SecretVersions`](crate::SecretVersions)) open connections through this
//! module so they see one schema and one set of pragmas. All uniqueness is
//! enforced here with `UNIQUE`/composite primary keys, and referential
//! cleanup with `ON DELETE CASCADE` — never with application-level locks.

use std::fs::OpenOptions;
use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::Connection;

/// Relational schema for the authorization graph and the secret series /
/// content tables.
///
/// `memberships` and `accessgrants` use composite primary keys so a
/// duplicate pair is a constraint violation, not a silent second row.
/// `secrets_content` is unique per (series, version label).
const SCHEMA: &str = r"
    CREATE TABLE IF NOT EXISTS clients (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL UNIQUE,
        created_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS groups (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL UNIQUE,
        created_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS secrets (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL UNIQUE,
        created_at TEXT NOT NULL,
        created_by TEXT NOT NULL,
        description TEXT NOT NULL,
        type TEXT,
        generation_options TEXT
    );

    CREATE TABLE IF NOT EXISTS secrets_content (
        id INTEGER PRIMARY KEY,
        secret_id INTEGER NOT NULL,
        encrypted_content TEXT NOT NULL,
        version TEXT NOT NULL,
        created_at TEXT NOT NULL,
        created_by TEXT NOT NULL,
        metadata TEXT NOT NULL,
        UNIQUE (secret_id, version),
        FOREIGN KEY (secret_id) REFERENCES secrets(id) ON DELETE CASCADE
    );

    CREATE TABLE IF NOT EXISTS memberships (
        client_id INTEGER NOT NULL,
        group_id INTEGER NOT NULL,
        PRIMARY KEY (client_id, group_id),
        FOREIGN KEY (client_id) REFERENCES clients(id) ON DELETE CASCADE,
        FOREIGN KEY (group_id) REFERENCES groups(id) ON DELETE CASCADE
    );

    CREATE TABLE IF NOT EXISTS accessgrants (
        group_id INTEGER NOT NULL,
        secret_id INTEGER NOT NULL,
        PRIMARY KEY (group_id, secret_id),
        FOREIGN KEY (group_id) REFERENCES groups(id) ON DELETE CASCADE,
        FOREIGN KEY (secret_id) REFERENCES secrets(id) ON DELETE CASCADE
    );

    CREATE INDEX IF NOT EXISTS idx_secrets_content_secret
    ON secrets_content(secret_id);

    CREATE INDEX IF NOT EXISTS idx_memberships_group
    ON memberships(group_id);

    CREATE INDEX IF NOT EXISTS idx_accessgrants_secret
    ON accessgrants(secret_id);
";

/// Open (or create) the keyrack database at `path`.
///
/// Performs the shared preamble:
/// 1. Creates the parent directory if it doesn't exist
/// 2. Tightens directory permissions (Unix: 0o700, owner-only)
/// 3. Creates the DB file with secure permissions (Unix: 0o600)
/// 4. Opens the connection, sets pragmas, creates the schema
pub fn open_connection(path: impl AsRef<Path>) -> Result<Connection> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        ensure_secure_dir(parent)?;
    }
    ensure_secure_db_file(path)?;

    let db = Connection::open(path)
        .with_context(|| format!("Failed to open keyrack database at {}", path.display()))?;
    initialize(db)
}

/// Open an in-memory database (for testing).
pub fn open_in_memory() -> Result<Connection> {
    let db = Connection::open_in_memory().context("Failed to open in-memory database")?;
    initialize(db)
}

fn initialize(db: Connection) -> Result<Connection> {
    db.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=FULL; PRAGMA foreign_keys=ON;")
        .context("Failed to set database pragmas")?;
    db.execute_batch(SCHEMA)
        .context("Failed to create database schema")?;
    Ok(db)
}

/// Ensure a directory exists with secure permissions.
///
/// Creates the directory (and parents) if missing, then on Unix tightens
/// permissions to 0o700 if the directory is owned by the current user.
fn ensure_secure_dir(path: &Path) -> Result<()> {
    if path.as_os_str().is_empty() {
        return Ok(());
    }
    std::fs::create_dir_all(path)
        .with_context(|| format!("Failed to create directory: {}", path.display()))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::{MetadataExt, PermissionsExt};
        let metadata = std::fs::metadata(path)
            .with_context(|| format!("Failed to read directory metadata: {}", path.display()))?;

        let our_uid = unsafe { libc::getuid() };
        if metadata.uid() != our_uid {
            return Ok(());
        }

        let current_mode = metadata.permissions().mode() & 0o777;
        if current_mode & 0o077 != 0 {
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700)).with_context(
                || format!("Failed to set directory permissions: {}", path.display()),
            )?;
        }
    }
    Ok(())
}

/// Ensure the database file exists with owner-only permissions.
///
/// The file holds encrypted payloads and the full authorization graph, so
/// it is created atomically with 0o600 on Unix and tightened if it already
/// exists.
fn ensure_secure_db_file(path: &Path) -> Result<()> {
    if !path.exists() {
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            let _file = OpenOptions::new()
                .create(true)
                .truncate(false)
                .read(true)
                .write(true)
                .mode(0o600)
                .open(path)
                .with_context(|| format!("Failed to create database file: {}", path.display()))?;
        }
        #[cfg(not(unix))]
        {
            let _file = OpenOptions::new()
                .create(true)
                .truncate(false)
                .read(true)
                .write(true)
                .open(path)
                .with_context(|| format!("Failed to create database file: {}", path.display()))?;
        }
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .with_context(|| format!("Failed to set database permissions: {}", path.display()))?;
    }
    Ok(())
}

/// Current time as an RFC 3339 UTC string, the format used for every
/// `created_at` column.
pub(crate) fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}
