//! madden: configuration for the catalog and its `maddenctl` operator tool.
//!
//! Storage lives in `madden-db`; the shared model and error type in
//! `madden-core`.

pub mod config;
