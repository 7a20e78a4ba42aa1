//! Fitting: single-unit minimization and camera-level batches.
//!
//! Responsibilities:
//!
//! - map bounded parameters to an unconstrained space (`transform`)
//! - minimize a cost function and estimate uncertainties (`minimizer`)
//! - derive advisory starting values from charge moments (`estimate`) or
//!   from the histogram's peaks (`peaks`)
//! - fit many units sequentially or on a worker pool (`batch`)

pub mod batch;
pub mod estimate;
pub mod minimizer;
pub mod peaks;
pub mod transform;

pub use batch::*;
pub use estimate::*;
pub use minimizer::*;
pub use peaks::*;
pub use transform::*;
