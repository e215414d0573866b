//! Pool-owning catalog components.
//!
//! Each component holds a clone of one [`DbPool`] built at startup, checks
//! out a connection per call, and delegates to the free functions in
//! [`crate::queries`]. Components are cheap to clone and safe to share
//! across threads.

use std::marker::PhantomData;

use madden_core::{
    ContentItem, Error, ImageFile, ImageFileId, ItemDraft, ItemId, ItemQuery, NewImageFile, Page,
    PublishedRecord, Result, SummaryRecord,
};

use crate::migrations;
use crate::pool::{self, get_conn, DbPool};
use crate::queries::logs::{self, LogRecord};
use crate::queries::{images, items};

/// CRUD over catalogued image files.
#[derive(Clone)]
pub struct ImageStore {
    pool: DbPool,
}

impl ImageStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Fails with [`Error::Conflict`] when the filename is taken.
    pub fn create(&self, file: &NewImageFile) -> Result<ImageFile> {
        let conn = get_conn(&self.pool)?;
        images::create_image_file(&conn, file)
    }

    pub fn get(&self, id: ImageFileId) -> Result<Option<ImageFile>> {
        let conn = get_conn(&self.pool)?;
        images::get_image_file(&conn, id)
    }

    /// Returns the record before and after the update.
    pub fn update(&self, file: &ImageFile) -> Result<(ImageFile, ImageFile)> {
        let conn = get_conn(&self.pool)?;
        images::update_image_file(&conn, file)
    }

    /// Deleting an unknown id is not an error.
    pub fn delete(&self, id: ImageFileId) -> Result<()> {
        let conn = get_conn(&self.pool)?;
        images::delete_image_file(&conn, id).map(|_| ())
    }

    pub fn list(&self, page: Page) -> Result<Vec<ImageFile>> {
        let conn = get_conn(&self.pool)?;
        images::list_image_files(&conn, page)
    }

    pub fn find_by_name_pattern(&self, page: Page, pattern: &str) -> Result<Vec<ImageFile>> {
        let conn = get_conn(&self.pool)?;
        images::find_image_files_by_name(&conn, page, pattern)
    }
}

/// CRUD and windowed search over content items and their associations.
#[derive(Clone)]
pub struct ItemRepository {
    pool: DbPool,
}

impl ItemRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn create(&self, draft: &ItemDraft) -> Result<ContentItem> {
        let conn = get_conn(&self.pool)?;
        items::create_item(&conn, draft)
    }

    /// Overwrites every field and replaces all associations.
    pub fn update(&self, id: ItemId, draft: &ItemDraft) -> Result<ContentItem> {
        let conn = get_conn(&self.pool)?;
        items::update_item(&conn, id, draft)
    }

    /// Deleting an unknown id is not an error.
    pub fn delete(&self, id: ItemId) -> Result<()> {
        let conn = get_conn(&self.pool)?;
        items::delete_item(&conn, id).map(|_| ())
    }

    pub fn get_by_id(&self, id: ItemId) -> Result<ContentItem> {
        let conn = get_conn(&self.pool)?;
        items::get_item(&conn, id)?
            .ok_or_else(|| Error::not_found("content item", id))
    }

    pub fn search(&self, query: &ItemQuery) -> Result<Vec<ContentItem>> {
        let conn = get_conn(&self.pool)?;
        items::search_items(&conn, query)
    }
}

/// An append-only log whose current value is its latest record.
pub struct SingletonLog<R> {
    pool: DbPool,
    _record: PhantomData<fn() -> R>,
}

impl<R> Clone for SingletonLog<R> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            _record: PhantomData,
        }
    }
}

impl<R: LogRecord> SingletonLog<R> {
    pub fn new(pool: DbPool) -> Self {
        Self {
            pool,
            _record: PhantomData,
        }
    }

    pub fn append(&self, value: R::Value) -> Result<R> {
        let conn = get_conn(&self.pool)?;
        logs::append(&conn, value)
    }

    /// The latest record, or the zero value if nothing was ever appended.
    pub fn current(&self) -> Result<R> {
        let conn = get_conn(&self.pool)?;
        logs::current(&conn)
    }
}

pub type SummaryLog = SingletonLog<SummaryRecord>;
pub type PublishedLog = SingletonLog<PublishedRecord>;

/// Creates and migrates the physical layout.
#[derive(Clone)]
pub struct SchemaManager {
    pool: DbPool,
}

impl SchemaManager {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Apply any pending migrations. Safe to call repeatedly.
    pub fn ensure_schema(&self) -> Result<usize> {
        let conn = get_conn(&self.pool)?;
        migrations::run_migrations(&conn)
    }

    pub fn current_version(&self) -> Result<i64> {
        let conn = get_conn(&self.pool)?;
        migrations::current_version(&conn)
    }
}

/// Every catalog component, built from one pool.
#[derive(Clone)]
pub struct Catalog {
    pub images: ImageStore,
    pub items: ItemRepository,
    pub summaries: SummaryLog,
    pub published: PublishedLog,
    pub schema: SchemaManager,
}

impl Catalog {
    /// Wrap an existing pool. The schema is not touched; call
    /// `schema.ensure_schema()` first if the pool was not built by
    /// [`pool::init_pool`].
    pub fn new(pool: DbPool) -> Self {
        Self {
            images: ImageStore::new(pool.clone()),
            items: ItemRepository::new(pool.clone()),
            summaries: SummaryLog::new(pool.clone()),
            published: PublishedLog::new(pool.clone()),
            schema: SchemaManager::new(pool),
        }
    }

    /// Open (creating if needed) and migrate an on-disk catalog.
    pub fn open(path: &str) -> Result<Self> {
        let pool = pool::init_pool(path)?;
        tracing::info!(path, "Opened catalog");
        Ok(Self::new(pool))
    }

    /// A fresh, migrated, private in-memory catalog.
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::new(pool::init_memory_pool()?))
    }
}
