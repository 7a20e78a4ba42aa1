//! Shared domain types.
//!
//! These types are kept lightweight and serializable so they can be:
//!
//! - passed around during fitting (configuration)
//! - printed as text or JSON by the binary (results)

use serde::{Deserialize, Serialize};

use crate::error::FitError;

/// Where to stop summing photoelectron peaks.
///
/// Peaks are added until the photoelectron count probability not yet covered
/// drops below `min_probability`, or after `max_pe` peaks, whichever comes
/// first. With crosstalk the count distribution has a long tail (mean
/// `λ/(1-opct)` for the generalized Poisson).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Truncation {
    pub max_pe: usize,
    pub min_probability: f64,
}

impl Default for Truncation {
    fn default() -> Self {
        Self {
            max_pe: 2000,
            min_probability: 1e-7,
        }
    }
}

impl Truncation {
    pub fn validate(&self) -> Result<(), FitError> {
        if self.max_pe == 0 {
            return Err(FitError::InvalidOption {
                name: "max_pe",
                reason: "must be >= 1".to_string(),
            });
        }
        if !(self.min_probability >= 0.0 && self.min_probability < 1.0) {
            return Err(FitError::InvalidOption {
                name: "min_probability",
                reason: format!("must lie in [0, 1) (got {})", self.min_probability),
            });
        }
        Ok(())
    }
}

/// Histogram layout shared by every dataset of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Binning {
    pub n_bins: usize,
    pub range: (f64, f64),
}

impl Default for Binning {
    fn default() -> Self {
        Self {
            n_bins: 100,
            range: (-3.0, 6.0),
        }
    }
}

impl Binning {
    pub fn new(n_bins: usize, range: (f64, f64)) -> Result<Self, FitError> {
        let binning = Self { n_bins, range };
        binning.validate()?;
        Ok(binning)
    }

    pub fn validate(&self) -> Result<(), FitError> {
        if self.n_bins == 0 {
            return Err(FitError::InvalidBinning { n_bins: 0 });
        }
        let (low, high) = self.range;
        if !(low.is_finite() && high.is_finite() && low < high) {
            return Err(FitError::InvalidRange { low, high });
        }
        Ok(())
    }
}

/// Options for a single minimization.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MinimizerOptions {
    pub max_iters: u64,
    pub tol_grad: f64,
    pub tol_cost: f64,
    pub lbfgs_memory: usize,
    /// Turn a non-converged fit into `FitError::NotConverged`.
    pub require_success: bool,
}

impl Default for MinimizerOptions {
    fn default() -> Self {
        Self {
            max_iters: 500,
            tol_grad: 1e-6,
            tol_cost: 1e-9,
            lbfgs_memory: 7,
            require_success: false,
        }
    }
}

impl MinimizerOptions {
    pub fn validate(&self) -> Result<(), FitError> {
        if self.max_iters == 0 {
            return Err(FitError::InvalidOption {
                name: "max_iters",
                reason: "must be >= 1".to_string(),
            });
        }
        if !(self.tol_grad.is_finite() && self.tol_grad >= 0.0) {
            return Err(FitError::InvalidOption {
                name: "tol_grad",
                reason: format!("must be finite and >= 0 (got {})", self.tol_grad),
            });
        }
        if !(self.tol_cost.is_finite() && self.tol_cost >= 0.0) {
            return Err(FitError::InvalidOption {
                name: "tol_cost",
                reason: format!("must be finite and >= 0 (got {})", self.tol_cost),
            });
        }
        if self.lbfgs_memory == 0 {
            return Err(FitError::InvalidOption {
                name: "lbfgs_memory",
                reason: "must be >= 1".to_string(),
            });
        }
        Ok(())
    }
}

/// How initial values are estimated from a unit's charges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitialEstimator {
    /// Moments when the spectrum has a pedestal, peaks otherwise.
    #[default]
    Auto,
    /// Pedestal fraction and charge moments.
    Moments,
    /// Peak positions, widths, and height ratios of the histogram.
    Peaks,
}

impl std::str::FromStr for InitialEstimator {
    type Err = FitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(Self::Auto),
            "moments" => Ok(Self::Moments),
            "peaks" => Ok(Self::Peaks),
            _ => Err(FitError::InvalidOption {
                name: "estimator",
                reason: format!("`{s}` is not one of auto, moments, peaks"),
            }),
        }
    }
}

/// Batch fitter configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct FitterConfig {
    pub minimizer: MinimizerOptions,
    /// Seed initial values from the charges of each unit.
    pub estimate_initial: bool,
    /// Which estimate `estimate_initial` runs.
    pub estimator: InitialEstimator,
}

impl FitterConfig {
    pub fn validate(&self) -> Result<(), FitError> {
        self.minimizer.validate()
    }
}

/// One fitted parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedParameter {
    pub name: String,
    pub value: f64,
    /// One-sigma uncertainty (`NaN` when unavailable, `0` for fixed parameters).
    pub error: f64,
    pub fixed: bool,
}

/// Goodness-of-fit scores. Undefined scores are `NaN`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitScores {
    pub cost: f64,
    pub chi2: f64,
    pub reduced_chi2: f64,
    pub p_value: f64,
    pub dof: i64,
}

impl FitScores {
    pub fn undefined() -> Self {
        Self {
            cost: f64::NAN,
            chi2: f64::NAN,
            reduced_chi2: f64::NAN,
            p_value: f64::NAN,
            dof: 0,
        }
    }
}

/// Outcome of fitting one unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitResult {
    pub parameters: Vec<FittedParameter>,
    pub scores: FitScores,
    pub success: bool,
    pub iterations: u64,
    /// Failure reason or solver termination status.
    pub message: Option<String>,
}

impl FitResult {
    /// A failed row: every value and error is `NaN`.
    pub fn failed(names: &[String], reason: impl Into<String>) -> Self {
        Self {
            parameters: names
                .iter()
                .map(|name| FittedParameter {
                    name: name.clone(),
                    value: f64::NAN,
                    error: f64::NAN,
                    fixed: false,
                })
                .collect(),
            scores: FitScores::undefined(),
            success: false,
            iterations: 0,
            message: Some(reason.into()),
        }
    }

    pub fn value(&self, name: &str) -> Option<f64> {
        self.parameters.iter().find(|p| p.name == name).map(|p| p.value)
    }

    pub fn error(&self, name: &str) -> Option<f64> {
        self.parameters.iter().find(|p| p.name == name).map(|p| p.error)
    }

    pub fn values(&self) -> Vec<f64> {
        self.parameters.iter().map(|p| p.value).collect()
    }
}

/// One row per unit, indexed by unit id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultsTable {
    pub parameter_names: Vec<String>,
    pub rows: Vec<FitResult>,
}

impl ResultsTable {
    pub fn get(&self, unit: usize) -> Option<&FitResult> {
        self.rows.get(unit)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn n_failed(&self) -> usize {
        self.rows.iter().filter(|r| !r.success).count()
    }

    /// Column names: values, then `<name>_error`, then the scores.
    pub fn columns(&self) -> Vec<String> {
        let mut cols = self.parameter_names.clone();
        cols.extend(self.parameter_names.iter().map(|n| format!("{n}_error")));
        cols.extend(
            ["chi2", "reduced_chi2", "p_value", "success"]
                .iter()
                .map(|s| s.to_string()),
        );
        cols
    }

    /// A column across all units (`success` as 0/1).
    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        let pick: Box<dyn Fn(&FitResult) -> f64> = match name {
            "chi2" => Box::new(|r| r.scores.chi2),
            "reduced_chi2" => Box::new(|r| r.scores.reduced_chi2),
            "p_value" => Box::new(|r| r.scores.p_value),
            "success" => Box::new(|r| if r.success { 1.0 } else { 0.0 }),
            _ => {
                if let Some(idx) = self.parameter_names.iter().position(|n| n == name) {
                    Box::new(move |r| r.parameters.get(idx).map_or(f64::NAN, |p| p.value))
                } else {
                    let base = name.strip_suffix("_error")?;
                    let idx = self.parameter_names.iter().position(|n| n == base)?;
                    Box::new(move |r| r.parameters.get(idx).map_or(f64::NAN, |p| p.error))
                }
            }
        };
        Some(self.rows.iter().map(|r| pick(r)).collect())
    }
}
