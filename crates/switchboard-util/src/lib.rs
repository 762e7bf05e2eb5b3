//! Shared utilities for switchboard.
//!
//! - Logging setup with tracing
//! - Config and data directory resolution
//! - Slug generation for workspace identifiers

pub mod log;
pub mod path;
pub mod slug;

pub use slug::{slugify, unique_slug};
