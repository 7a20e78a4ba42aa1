//! Mathematical utilities: stable probability primitives and covariance
//! estimation.

pub mod linalg;
pub mod stats;

pub use linalg::*;
pub use stats::*;
