//! Reporting utilities: formatted terminal output for batch results.

mod format;

pub use format::*;
