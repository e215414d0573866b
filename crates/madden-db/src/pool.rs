//! Connection pool management for SQLite via r2d2.
//!
//! Every pooled connection is configured identically: foreign keys on, a busy
//! timeout so concurrent writers queue instead of failing, and a `regexp`
//! SQL function backing `filename REGEXP ?` searches.

use std::sync::Arc;
use std::time::Duration;

use madden_core::{Error, Result};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use regex::Regex;
use rusqlite::functions::FunctionFlags;
use rusqlite::Connection;

use crate::{error, migrations};

/// Type alias for the database connection pool.
pub type DbPool = Pool<SqliteConnectionManager>;

/// Type alias for a pooled database connection.
pub type PooledConnection = r2d2::PooledConnection<SqliteConnectionManager>;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Tuning knobs for a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolOptions {
    pub max_size: u32,
    pub busy_timeout: Duration,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            max_size: 4,
            busy_timeout: Duration::from_secs(5),
        }
    }
}

/// Initialize a database pool backed by a file on disk with default options.
///
/// Creates the SQLite file if it does not exist and runs pending migrations.
pub fn init_pool(db_path: &str) -> Result<DbPool> {
    init_pool_with(db_path, PoolOptions::default())
}

/// Initialize a file-backed pool with explicit options and run migrations.
pub fn init_pool_with(db_path: &str, options: PoolOptions) -> Result<DbPool> {
    let pool = open_pool(db_path, options)?;
    let conn = get_conn(&pool)?;
    migrations::run_migrations(&conn)?;
    Ok(pool)
}

/// Open a file-backed pool without touching the schema.
///
/// Callers that use this must run [`migrations::run_migrations`] (or
/// [`crate::SchemaManager::ensure_schema`]) before any other operation.
pub fn open_pool(db_path: &str, options: PoolOptions) -> Result<DbPool> {
    let busy_timeout = options.busy_timeout;
    let manager = SqliteConnectionManager::file(db_path).with_init(move |conn| {
        configure_connection(conn, busy_timeout)?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")
    });

    Pool::builder()
        .max_size(options.max_size)
        .build(manager)
        .map_err(|e| Error::storage(format!("failed to create connection pool for {db_path}"), e))
}

/// Initialize an in-memory database pool (useful for tests).
///
/// Each call creates a uniquely-named database on SQLite's `memdb` VFS so
/// that parallel tests do not interfere with each other, while all
/// connections *within* a single pool still share state. `memdb` uses
/// ordinary database locking, so concurrent writers wait out the busy
/// timeout instead of failing with `SQLITE_LOCKED` as shared-cache
/// connections do.
///
/// The database lives only while a connection is open, so pooled
/// connections are never retired.
pub fn init_memory_pool() -> Result<DbPool> {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    let uri = format!("file:/madden_memdb_{n}?vfs=memdb");

    let options = PoolOptions::default();
    let busy_timeout = options.busy_timeout;
    let manager = SqliteConnectionManager::file(uri)
        .with_init(move |conn| configure_connection(conn, busy_timeout));

    let pool = Pool::builder()
        .max_size(options.max_size)
        .min_idle(Some(1))
        .max_lifetime(None)
        .idle_timeout(None)
        .build(manager)
        .map_err(|e| Error::storage("failed to create in-memory pool", e))?;

    let conn = get_conn(&pool)?;
    migrations::run_migrations(&conn)?;

    Ok(pool)
}

/// Convenience helper to get a connection from the pool.
pub fn get_conn(pool: &DbPool) -> Result<PooledConnection> {
    pool.get().map_err(error::pool)
}

fn configure_connection(conn: &mut Connection, busy_timeout: Duration) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(busy_timeout)?;
    register_regexp(conn)
}

/// Register `regexp(pattern, text)`, which SQLite calls for `text REGEXP pattern`.
///
/// The compiled pattern is cached per statement as auxiliary data.
fn register_regexp(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        "regexp",
        2,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let pattern: Arc<Regex> = ctx.get_or_create_aux(0, |vr| -> std::result::Result<_, BoxError> {
                Ok(Regex::new(vr.as_str()?)?)
            })?;
            let text = ctx
                .get_raw(1)
                .as_str()
                .map_err(|e| rusqlite::Error::UserFunctionError(e.into()))?;
            Ok(pattern.is_match(text))
        },
    )
}
