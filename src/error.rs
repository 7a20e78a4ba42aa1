//! Error types.
//!
//! - [`FitError`]: everything the fitting engine can reject. Construction
//!   errors are raised at the boundary where the contract is violated and
//!   name the offending parameter, bound, or length.
//! - [`AppError`]: the binary boundary (exit code + message).

use thiserror::Error;

/// Errors raised by the fitting engine.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FitError {
    #[error("invalid binning: n_bins must be > 0 (got {n_bins})")]
    InvalidBinning { n_bins: usize },

    #[error("invalid charge range: ({low}, {high}) must be finite with low < high")]
    InvalidRange { low: f64, high: f64 },

    #[error("invalid pre-binned spectrum: {0}")]
    InvalidPrebinned(String),

    #[error("n_illuminations must be >= 1 (got {n})")]
    InvalidIlluminations { n: usize },

    #[error("expected {expected} charge datasets (one per illumination), got {found}")]
    IlluminationMismatch { expected: usize, found: usize },

    #[error("parameter vector has length {found}, spectrum declares {expected} parameters")]
    ParameterLength { expected: usize, found: usize },

    #[error("illumination index {index} out of range for {n_illuminations} illuminations")]
    IlluminationIndex { index: usize, n_illuminations: usize },

    #[error("no parameter named `{name}`")]
    UnknownParameter { name: String },

    #[error("invalid limits for `{name}`: ({low}, {high})")]
    InvalidLimits { name: String, low: f64, high: f64 },

    #[error("initial value {value} of `{name}` lies outside its limits ({low}, {high})")]
    InitialOutOfBounds {
        name: String,
        value: f64,
        low: f64,
        high: f64,
    },

    #[error("no spectrum named `{name}`")]
    UnknownSpectrum { name: String },

    #[error("no cost function named `{name}`")]
    UnknownCost { name: String },

    #[error("illumination {illumination} has no raw charge values (pre-binned data cannot be fit unbinned)")]
    MissingRawValues { illumination: usize },

    #[error("chi2 is not defined for {cost}")]
    Chi2Undefined { cost: &'static str },

    #[error("degrees of freedom must be positive (got {dof})")]
    NonPositiveDof { dof: i64 },

    #[error("degenerate charge data in illumination {illumination}: {reason}")]
    DegenerateData { illumination: usize, reason: String },

    #[error("invalid option `{name}`: {reason}")]
    InvalidOption { name: &'static str, reason: String },

    #[error("inconsistent charge array shape: {0}")]
    InconsistentShape(String),

    #[error("worker count must be >= 1")]
    InvalidWorkers,

    #[error("minimizer did not converge ({status})")]
    NotConverged { status: String },

    #[error("minimizer failure: {0}")]
    Solver(String),

    #[error("worker pool failure: {0}")]
    WorkerPool(String),
}

impl From<argmin::core::Error> for FitError {
    fn from(err: argmin::core::Error) -> Self {
        FitError::Solver(err.to_string())
    }
}

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }
}

impl From<FitError> for AppError {
    fn from(err: FitError) -> Self {
        AppError::new(4, err.to_string())
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}
