//! Domain types used throughout the fitting engine.
//!
//! This module defines:
//!
//! - configuration (`Binning`, `MinimizerOptions`, `FitterConfig`, `InitialEstimator`,
//!   `Truncation`)
//! - fit outputs (`FitResult`, `FitScores`, `ResultsTable`)

pub mod types;

pub use types::*;
