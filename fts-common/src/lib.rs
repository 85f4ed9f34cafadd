//! # FTS Common Library
//!
//! Shared code for the facial trust study analysis workspace:
//! - Canonical response model (`Version`, `Question`, `ResponseRecord`)
//! - Alias tables mapping historical column and value spellings onto the model
//! - Configuration loading and data directory resolution
//! - Error types
//! - Timestamp helpers

pub mod config;
pub mod error;
pub mod model;
pub mod schema;
pub mod time;

pub use error::{Error, Result};
pub use model::{Choice, Question, ResponseRecord, Version, ViewMode};
