//! madden-core: shared ids, domain model, and the unified error type.
//!
//! This crate is the foundational dependency for `madden-db` and the
//! `maddenctl` binary. It has no storage dependencies: everything here is
//! plain data plus the closed enums that callers parse at their boundary.

pub mod error;
pub mod ids;
pub mod model;

// Re-export the most commonly used items at the crate root.
pub use error::{Error, ErrorKind, Result};
pub use ids::*;
pub use model::*;
