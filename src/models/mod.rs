//! SPE spectrum models.
//!
//! Each spectrum is a small `SpectrumPdf` implementation (parameter table +
//! density); [`Spectrum`] adds the per-illumination bookkeeping so cost
//! functions and the minimizer can stay generic.

pub mod parameter;
pub mod pmt;
pub mod registry;
pub mod sipm;
pub mod spectrum;

pub use parameter::*;
pub use pmt::*;
pub use registry::*;
pub use sipm::*;
pub use spectrum::*;
