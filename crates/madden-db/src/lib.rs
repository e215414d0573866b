//! madden-db: persistence and query layer for the madden catalog.
//!
//! SQLite-backed storage with r2d2 connection pooling, embedded migrations,
//! and query modules for image files, content items, and the singleton logs.
//!
//! # Modules
//!
//! - `pool` - Connection pool management
//! - `migrations` - Embedded schema migrations
//! - `queries` - Free functions over a `rusqlite::Connection`
//! - `store` - Pool-owning components handed to request layers
//!
//! # Example
//!
//! ```
//! use madden_core::NewImageFile;
//! use madden_db::Catalog;
//!
//! let catalog = Catalog::open_in_memory().unwrap();
//! let file = catalog.images.create(&NewImageFile::new("f1.png", "f1_thumb.png")).unwrap();
//! assert_eq!(file.filename, "f1.png");
//! ```

mod error;
pub mod migrations;
mod models;
pub mod pool;
pub mod queries;
pub mod store;

pub use queries::logs::LogRecord;
pub use store::{
    Catalog, ImageStore, ItemRepository, PublishedLog, SchemaManager, SingletonLog, SummaryLog,
};
