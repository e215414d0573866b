//! Row mapping between SQLite rows and catalog records.
//!
//! Each model implements `from_row` for constructing itself from a
//! `rusqlite::Row` whose columns follow the matching `COLS` constant in
//! [`crate::queries`].

use chrono::{DateTime, Utc};
use madden_core::{
    AssociationId, ContentItem, ImageAssociation, ImageFile, ImageStatus, ItemId,
};
use rusqlite::types::Type;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// helpers
// ---------------------------------------------------------------------------

/// Parse a UUID-based ID from a text column.
pub(crate) fn parse_id<T: From<Uuid>>(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<T> {
    let s: String = row.get(idx)?;
    let uuid = Uuid::parse_str(&s)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))?;
    Ok(T::from(uuid))
}

/// Read an epoch-seconds column as a UTC instant.
pub(crate) fn parse_epoch(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let secs: i64 = row.get(idx)?;
    DateTime::from_timestamp(secs, 0).ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, secs))
}

/// Read an RFC 3339 text column.
pub(crate) fn parse_timestamp(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let s: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_status(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<ImageStatus> {
    let s: String = row.get(idx)?;
    s.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Current time in the stored text format.
pub(crate) fn now() -> String {
    Utc::now().to_rfc3339()
}

// ---------------------------------------------------------------------------
// ImageFile
// ---------------------------------------------------------------------------

/// Columns: id, filename, thumbnail.
pub(crate) fn image_file_from_row(row: &rusqlite::Row) -> rusqlite::Result<ImageFile> {
    image_file_at(row, 0)
}

fn image_file_at(row: &rusqlite::Row, start: usize) -> rusqlite::Result<ImageFile> {
    Ok(ImageFile {
        id: parse_id(row, start)?,
        filename: row.get(start + 1)?,
        thumbnail: row.get(start + 2)?,
    })
}

// ---------------------------------------------------------------------------
// Content items
// ---------------------------------------------------------------------------

/// Scalar columns of a content item, before its associations are attached.
#[derive(Debug, Clone)]
pub(crate) struct ItemRow {
    pub id: ItemId,
    pub begin_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub summary: String,
    pub details: String,
    pub is_historical: bool,
}

impl ItemRow {
    /// Columns: id, begin_time, end_time, summary, details, is_historical.
    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: parse_id(row, 0)?,
            begin_time: parse_epoch(row, 1)?,
            end_time: parse_epoch(row, 2)?,
            summary: row.get(3)?,
            details: row.get(4)?,
            is_historical: row.get(5)?,
        })
    }

    pub fn into_item(self, images: Vec<ImageAssociation>) -> ContentItem {
        ContentItem {
            id: self.id,
            begin_time: self.begin_time,
            end_time: self.end_time,
            summary: self.summary,
            details: self.details,
            is_historical: self.is_historical,
            images,
        }
    }
}

/// An association joined with its image file, tagged with the owning item.
#[derive(Debug, Clone)]
pub(crate) struct AssociationRow {
    pub item_id: ItemId,
    pub association: ImageAssociation,
}

impl AssociationRow {
    /// Columns: ii.id, ii.item_id, ii.status, f.id, f.filename, f.thumbnail.
    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        let id: AssociationId = parse_id(row, 0)?;
        Ok(Self {
            item_id: parse_id(row, 1)?,
            association: ImageAssociation {
                id,
                status: parse_status(row, 2)?,
                image_file: image_file_at(row, 3)?,
            },
        })
    }
}
