//! Catalog domain model: content items, image files, associations, and the
//! singleton log records, plus the closed enums used to query them.
//!
//! Closed enums implement `FromStr` so a request layer can validate
//! free-form parameters once at its boundary and hand typed values inward.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::ids::{AssociationId, ImageFileId, ItemId};

/// Epoch seconds of the earliest instant an unfiltered search should cover
/// (1971-01-01T15:00:00Z).
pub const START_OF_TIME_SECS: i64 = 31_590_000;

/// Epoch seconds of the latest instant an unfiltered search should cover
/// (2230-01-01T15:00:00Z).
pub const END_OF_TIME_SECS: i64 = 8_204_857_200;

/// Default page size applied by request layers when none is given.
pub const DEFAULT_PAGE_SIZE: u32 = 25;

// ---------------------------------------------------------------------------
// ImageStatus
// ---------------------------------------------------------------------------

/// Status tag carried by an item-to-image association.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ImageStatus {
    Fmc,
    Pmc,
    Nmc,
}

impl ImageStatus {
    /// Canonical stored form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fmc => "FMC",
            Self::Pmc => "PMC",
            Self::Nmc => "NMC",
        }
    }
}

impl fmt::Display for ImageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImageStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "FMC" => Ok(Self::Fmc),
            "PMC" => Ok(Self::Pmc),
            "NMC" => Ok(Self::Nmc),
            other => Err(ParseEnumError::new("image status", other)),
        }
    }
}

// ---------------------------------------------------------------------------
// SortField
// ---------------------------------------------------------------------------

/// Primary ordering key for item searches. Ordering is always ascending and
/// ties are broken by the other time field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortField {
    #[default]
    BeginTime,
    EndTime,
}

impl SortField {
    /// The field used to break ties on this one.
    pub fn tie_breaker(&self) -> SortField {
        match self {
            Self::BeginTime => Self::EndTime,
            Self::EndTime => Self::BeginTime,
        }
    }
}

impl fmt::Display for SortField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BeginTime => write!(f, "beginTime"),
            Self::EndTime => write!(f, "endTime"),
        }
    }
}

impl FromStr for SortField {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "beginTime" | "startDate" => Ok(Self::BeginTime),
            "endTime" | "endDate" => Ok(Self::EndTime),
            other => Err(ParseEnumError::new("sort field", other)),
        }
    }
}

// ---------------------------------------------------------------------------
// HistoryFilter
// ---------------------------------------------------------------------------

/// Hard partition applied by searches on the historical flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HistoryFilter {
    Historic,
    #[default]
    NonHistoric,
}

impl HistoryFilter {
    /// The `is_historical` value an item must carry to match.
    pub fn is_historical(&self) -> bool {
        matches!(self, Self::Historic)
    }
}

impl From<bool> for HistoryFilter {
    fn from(historic: bool) -> Self {
        if historic {
            Self::Historic
        } else {
            Self::NonHistoric
        }
    }
}

impl fmt::Display for HistoryFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Historic => write!(f, "historic"),
            Self::NonHistoric => write!(f, "non-historic"),
        }
    }
}

impl FromStr for HistoryFilter {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "historic" => Ok(Self::Historic),
            "non-historic" => Ok(Self::NonHistoric),
            other => Err(ParseEnumError::new("historic filter", other)),
        }
    }
}

/// Returned when a boundary string does not name a known variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {what} `{value}`")]
pub struct ParseEnumError {
    what: &'static str,
    value: String,
}

impl ParseEnumError {
    fn new(what: &'static str, value: &str) -> Self {
        Self {
            what,
            value: value.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Paging and windows
// ---------------------------------------------------------------------------

/// Zero-indexed offset/limit page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub number: u32,
    pub size: u32,
}

impl Page {
    pub fn new(number: u32, size: u32) -> Self {
        Self { number, size }
    }

    /// Rows to skip: `number * size`.
    pub fn offset(&self) -> i64 {
        i64::from(self.number) * i64::from(self.size)
    }

    pub fn limit(&self) -> i64 {
        i64::from(self.size)
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(0, DEFAULT_PAGE_SIZE)
    }
}

/// Query window. An item is active in the window when
/// `begin_time < end AND end_time > start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// The widest window a request layer should default to.
    pub fn all_time() -> Self {
        Self {
            start: DateTime::from_timestamp(START_OF_TIME_SECS, 0).unwrap_or_default(),
            end: DateTime::from_timestamp(END_OF_TIME_SECS, 0).unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    /// Half-open overlap test used by searches.
    pub fn overlaps(&self, begin_time: DateTime<Utc>, end_time: DateTime<Utc>) -> bool {
        begin_time < self.end && end_time > self.start
    }
}

impl Default for TimeWindow {
    fn default() -> Self {
        Self::all_time()
    }
}

/// Parameters of an item search. Values are assumed to be already defaulted
/// and range-checked by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ItemQuery {
    pub page: Page,
    pub window: TimeWindow,
    pub sort: SortField,
    pub history: HistoryFilter,
}

// ---------------------------------------------------------------------------
// Image files
// ---------------------------------------------------------------------------

/// A catalogued image file. `filename` is unique across the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageFile {
    pub id: ImageFileId,
    pub filename: String,
    pub thumbnail: String,
}

/// Input for creating an image file; the store assigns the id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewImageFile {
    pub filename: String,
    pub thumbnail: String,
}

impl NewImageFile {
    pub fn new(filename: impl Into<String>, thumbnail: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            thumbnail: thumbnail.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Content items
// ---------------------------------------------------------------------------

/// Requested link from an item to an image file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageLink {
    pub image_file_id: ImageFileId,
    pub status: ImageStatus,
}

impl ImageLink {
    pub fn new(image_file_id: ImageFileId, status: ImageStatus) -> Self {
        Self {
            image_file_id,
            status,
        }
    }
}

/// A stored association, with the referenced image file populated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageAssociation {
    pub id: AssociationId,
    pub status: ImageStatus,
    pub image_file: ImageFile,
}

impl ImageAssociation {
    /// The link this association was created from.
    pub fn link(&self) -> ImageLink {
        ImageLink::new(self.image_file.id, self.status)
    }
}

/// Writable fields of a content item.
///
/// Times are persisted as epoch seconds; sub-second precision is dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemDraft {
    pub begin_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub summary: String,
    pub details: String,
    pub is_historical: bool,
    pub images: Vec<ImageLink>,
}

/// A stored content item with its associations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: ItemId,
    pub begin_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub summary: String,
    pub details: String,
    pub is_historical: bool,
    pub images: Vec<ImageAssociation>,
}

impl ContentItem {
    /// The writable view of this item, e.g. as the basis of an update.
    pub fn to_draft(&self) -> ItemDraft {
        ItemDraft {
            begin_time: self.begin_time,
            end_time: self.end_time,
            summary: self.summary.clone(),
            details: self.details.clone(),
            is_historical: self.is_historical,
            images: self.images.iter().map(ImageAssociation::link).collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Singleton log records
// ---------------------------------------------------------------------------

/// One entry of the rolling summary log. The default value is what an empty
/// log reads as.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SummaryRecord {
    pub id: i64,
    pub summary: String,
    pub created_at: Option<DateTime<Utc>>,
}

/// One entry of the published-flag log. The default value is what an empty
/// log reads as.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PublishedRecord {
    pub id: i64,
    pub published: bool,
    pub created_at: Option<DateTime<Utc>>,
}
