//! Utilities for schema_diff
//!
//! This module provides utility functions used across the library.

pub mod logging;
pub mod naming;

// Re-export key utility functions
pub use logging::init_logging;
pub use naming::{escape_identifier, quote_identifier, scratch_database_name};
