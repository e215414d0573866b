//! Embedded SQL migrations and runner.
//!
//! Migrations are stored as `&str` constants and executed in order.  A
//! `schema_migrations` table tracks which versions have been applied.

use madden_core::Result;
use rusqlite::{Connection, Transaction, TransactionBehavior};

use crate::error;

/// V1: the five catalog entities.
///
/// Item times are epoch seconds. The item tuple and the live image filename
/// are unique at the storage level so that concurrent check-then-insert
/// races still end in a constraint violation. Image files are soft-deleted
/// so that associations pointing at them survive.
const V1_INITIAL: &str = r#"
CREATE TABLE image_files (
    id         TEXT PRIMARY KEY,
    filename   TEXT NOT NULL CHECK (length(filename) > 0),
    thumbnail  TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    deleted_at TEXT
);

CREATE UNIQUE INDEX idx_image_files_live_filename
    ON image_files(filename) WHERE deleted_at IS NULL;

CREATE TABLE content_items (
    id            TEXT PRIMARY KEY,
    begin_time    INTEGER NOT NULL,
    end_time      INTEGER NOT NULL,
    summary       TEXT NOT NULL,
    details       TEXT NOT NULL,
    is_historical INTEGER NOT NULL DEFAULT 0,
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL,
    UNIQUE (begin_time, end_time, summary, details)
);

CREATE TABLE item_images (
    id            TEXT PRIMARY KEY,
    item_id       TEXT NOT NULL REFERENCES content_items(id) ON DELETE CASCADE,
    image_file_id TEXT NOT NULL REFERENCES image_files(id),
    status        TEXT NOT NULL CHECK (status IN ('FMC', 'PMC', 'NMC')),
    created_at    TEXT NOT NULL
);

CREATE TABLE summaries (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    summary    TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE published_states (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    published  INTEGER NOT NULL,
    created_at TEXT NOT NULL
);
"#;

/// V2: search and association lookup indexes.
const V2_SEARCH_INDEXES: &str = r#"
CREATE INDEX idx_content_items_begin ON content_items(is_historical, begin_time, end_time);
CREATE INDEX idx_content_items_end ON content_items(is_historical, end_time, begin_time);
CREATE INDEX idx_item_images_item ON item_images(item_id);
CREATE INDEX idx_item_images_file ON item_images(image_file_id);
"#;

/// Ordered list of (version, sql) pairs.
const MIGRATIONS: &[(i64, &str)] = &[(1, V1_INITIAL), (2, V2_SEARCH_INDEXES)];

/// Highest version this build knows about.
pub fn latest_version() -> i64 {
    MIGRATIONS.last().map(|&(v, _)| v).unwrap_or(0)
}

/// Run all pending migrations on `conn`, returning how many were applied.
///
/// Creates the `schema_migrations` tracking table if it does not exist,
/// then applies each outstanding migration inside an immediate transaction.
/// The "already applied" check happens inside that transaction, so two
/// processes bootstrapping the same file do not both apply a version.
pub fn run_migrations(conn: &Connection) -> Result<usize> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version    INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
    )
    .map_err(error::storage("failed to create schema_migrations"))?;

    let mut applied = 0;
    for &(version, sql) in MIGRATIONS {
        let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)
            .map_err(error::storage("failed to begin migration transaction"))?;

        let already: bool = tx
            .query_row(
                "SELECT COUNT(*) > 0 FROM schema_migrations WHERE version = ?1",
                [version],
                |row| row.get(0),
            )
            .map_err(error::storage("failed to read schema_migrations"))?;

        if already {
            continue;
        }

        tx.execute_batch(sql)
            .map_err(error::storage(format!("migration V{version} failed")))?;

        tx.execute(
            "INSERT INTO schema_migrations (version) VALUES (?1)",
            [version],
        )
        .map_err(error::storage("failed to record migration"))?;

        tx.commit()
            .map_err(error::storage(format!("failed to commit migration V{version}")))?;

        tracing::info!(version, "Applied schema migration");
        applied += 1;
    }

    Ok(applied)
}

/// Highest applied migration version, or 0 on a fresh database.
pub fn current_version(conn: &Connection) -> Result<i64> {
    let exists: bool = conn
        .query_row(
            "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type = 'table' AND name = 'schema_migrations'",
            [],
            |row| row.get(0),
        )
        .map_err(error::storage("failed to inspect schema"))?;
    if !exists {
        return Ok(0);
    }

    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )
    .map_err(error::storage("failed to read schema version"))
}
