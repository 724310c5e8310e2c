//! Utility functions for string and date formatting.

pub mod format;

pub use format::{format_optional, format_relative, truncate_string};
