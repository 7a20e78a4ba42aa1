//! Charge data: per-illumination histograms and synthetic sample generation.

pub mod charge;
pub mod synth;

pub use charge::*;
pub use synth::*;
