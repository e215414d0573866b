//! Database query modules.
//!
//! Free functions over a borrowed `rusqlite::Connection`. Writes that must
//! be atomic open their own immediate transaction.

pub mod images;
pub mod items;
pub mod logs;
