//! Append-only singleton logs: the rolling summary and the published flag.
//!
//! Reading a log returns its most recently appended record. An empty log
//! reads as the record type's zero value.

use chrono::{DateTime, Utc};
use madden_core::{PublishedRecord, Result, SummaryRecord};
use rusqlite::types::{FromSql, ToSql};
use rusqlite::{Connection, OptionalExtension};

use crate::error;
use crate::models::{now, parse_timestamp};

/// A record type stored in its own append-only table.
pub trait LogRecord: Default + Sized {
    /// The single payload column's value type.
    type Value: ToSql + FromSql;

    const TABLE: &'static str;
    const COLUMN: &'static str;

    fn from_parts(id: i64, value: Self::Value, created_at: DateTime<Utc>) -> Self;
}

impl LogRecord for SummaryRecord {
    type Value = String;

    const TABLE: &'static str = "summaries";
    const COLUMN: &'static str = "summary";

    fn from_parts(id: i64, summary: String, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            summary,
            created_at: Some(created_at),
        }
    }
}

impl LogRecord for PublishedRecord {
    type Value = bool;

    const TABLE: &'static str = "published_states";
    const COLUMN: &'static str = "published";

    fn from_parts(id: i64, published: bool, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            published,
            created_at: Some(created_at),
        }
    }
}

/// Append a new record and return it.
pub fn append<R: LogRecord>(conn: &Connection, value: R::Value) -> Result<R> {
    let ts = now();
    let q = format!(
        "INSERT INTO {table} ({column}, created_at) VALUES (?1, ?2) RETURNING id, {column}, created_at",
        table = R::TABLE,
        column = R::COLUMN,
    );
    let record = conn
        .query_row(&q, rusqlite::params![value, ts], |row| {
            Ok(R::from_parts(row.get(0)?, row.get(1)?, parse_timestamp(row, 2)?))
        })
        .map_err(error::storage(format!("failed to append to {}", R::TABLE)))?;

    tracing::debug!(table = R::TABLE, "Appended log record");
    Ok(record)
}

/// The most recently appended record, or the zero value when none exists.
pub fn current<R: LogRecord>(conn: &Connection) -> Result<R> {
    let q = format!(
        "SELECT id, {column}, created_at FROM {table} ORDER BY id DESC LIMIT 1",
        table = R::TABLE,
        column = R::COLUMN,
    );
    let record = conn
        .query_row(&q, [], |row| {
            Ok(R::from_parts(row.get(0)?, row.get(1)?, parse_timestamp(row, 2)?))
        })
        .optional()
        .map_err(error::storage(format!("failed to read current {}", R::TABLE)))?;

    Ok(record.unwrap_or_default())
}
