//! Cost functions: how well a spectrum explains the charge data of every
//! illumination of one unit.
//!
//! `errordef` is the cost increment above the minimum that corresponds to one
//! standard deviation: 0.5 for negative log-likelihoods, 1.0 for least
//! squares.

pub mod binned;
pub mod least_squares;
pub mod unbinned;

pub use binned::*;
pub use least_squares::*;
pub use unbinned::*;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use statrs::distribution::{ChiSquared, ContinuousCDF};

use crate::data::ChargeDataset;
use crate::error::FitError;
use crate::models::Spectrum;

/// Smallest expected count / density fed to a logarithm.
pub const DENSITY_FLOOR: f64 = 1e-300;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostKind {
    BinnedNll,
    UnbinnedNll,
    LeastSquares,
}

impl CostKind {
    pub const ALL: [CostKind; 3] = [
        CostKind::BinnedNll,
        CostKind::UnbinnedNll,
        CostKind::LeastSquares,
    ];

    pub fn name(self) -> &'static str {
        match self {
            CostKind::BinnedNll => "binned_nll",
            CostKind::UnbinnedNll => "unbinned_nll",
            CostKind::LeastSquares => "least_squares",
        }
    }
}

impl fmt::Display for CostKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CostKind {
    type Err = FitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "binned_nll" | "BinnedNLL" => Ok(CostKind::BinnedNll),
            "unbinned_nll" | "UnbinnedNLL" => Ok(CostKind::UnbinnedNll),
            "least_squares" | "LeastSquares" => Ok(CostKind::LeastSquares),
            _ => Err(FitError::UnknownCost {
                name: s.to_string(),
            }),
        }
    }
}

pub trait CostFunction: Send + Sync {
    fn kind(&self) -> CostKind;

    fn spectrum(&self) -> &Spectrum;

    fn datasets(&self) -> &[ChargeDataset];

    /// Cost at `parameters` (ordered as `spectrum().parameter_names()`).
    fn evaluate(&self, parameters: &[f64]) -> Result<f64, FitError>;

    /// Data points minus free parameters.
    fn dof(&self) -> i64;

    fn errordef(&self) -> f64;

    fn chi2(&self, parameters: &[f64]) -> Result<f64, FitError>;

    fn reduced_chi2(&self, parameters: &[f64]) -> Result<f64, FitError> {
        let dof = positive_dof(self.dof())?;
        Ok(self.chi2(parameters)? / dof)
    }

    /// χ² survival probability.
    fn p_value(&self, parameters: &[f64]) -> Result<f64, FitError> {
        let dof = positive_dof(self.dof())?;
        let chi2 = self.chi2(parameters)?;
        let dist = ChiSquared::new(dof).map_err(|e| FitError::InvalidOption {
            name: "dof",
            reason: e.to_string(),
        })?;
        Ok(dist.sf(chi2))
    }

    fn parameter_names(&self) -> &[String] {
        self.spectrum().parameter_names()
    }

    fn initial_values(&self) -> Vec<f64> {
        self.spectrum().initial_values()
    }

    fn limits(&self) -> Vec<(f64, f64)> {
        self.spectrum().limits()
    }

    fn fixed(&self) -> Vec<bool> {
        self.spectrum().fixed()
    }
}

fn positive_dof(dof: i64) -> Result<f64, FitError> {
    if dof > 0 {
        Ok(dof as f64)
    } else {
        Err(FitError::NonPositiveDof { dof })
    }
}

pub(crate) fn check_datasets(
    spectrum: &Spectrum,
    datasets: &[ChargeDataset],
) -> Result<(), FitError> {
    if datasets.len() != spectrum.n_illuminations() {
        return Err(FitError::IlluminationMismatch {
            expected: spectrum.n_illuminations(),
            found: datasets.len(),
        });
    }
    Ok(())
}

pub(crate) fn check_parameters(spectrum: &Spectrum, parameters: &[f64]) -> Result<(), FitError> {
    if parameters.len() != spectrum.n_parameters() {
        return Err(FitError::ParameterLength {
            expected: spectrum.n_parameters(),
            found: parameters.len(),
        });
    }
    Ok(())
}

/// Density at the bin centres scaled so the expected total equals the
/// observed total.
pub(crate) fn expected_counts(
    spectrum: &Spectrum,
    parameters: &[f64],
    dataset: &ChargeDataset,
    illumination: usize,
) -> Result<Vec<f64>, FitError> {
    let mut f = spectrum.evaluate(dataset.centers(), parameters, illumination)?;
    let model_total: f64 = f.iter().sum();
    let data_total = dataset.total();
    if model_total > 0.0 && model_total.is_finite() {
        let scale = data_total / model_total;
        f.iter_mut().for_each(|v| *v *= scale);
    } else {
        f.iter_mut().for_each(|v| *v = 0.0);
    }
    Ok(f)
}

pub struct CostEntry {
    pub name: &'static str,
    pub kind: CostKind,
    pub build: fn(Spectrum, Vec<ChargeDataset>) -> Result<Box<dyn CostFunction>, FitError>,
}

pub const COSTS: &[CostEntry] = &[
    CostEntry {
        name: "binned_nll",
        kind: CostKind::BinnedNll,
        build: build_binned_nll,
    },
    CostEntry {
        name: "unbinned_nll",
        kind: CostKind::UnbinnedNll,
        build: build_unbinned_nll,
    },
    CostEntry {
        name: "least_squares",
        kind: CostKind::LeastSquares,
        build: build_least_squares,
    },
];

fn build_binned_nll(
    spectrum: Spectrum,
    datasets: Vec<ChargeDataset>,
) -> Result<Box<dyn CostFunction>, FitError> {
    Ok(Box::new(BinnedNll::new(spectrum, datasets)?))
}

fn build_unbinned_nll(
    spectrum: Spectrum,
    datasets: Vec<ChargeDataset>,
) -> Result<Box<dyn CostFunction>, FitError> {
    Ok(Box::new(UnbinnedNll::new(spectrum, datasets)?))
}

fn build_least_squares(
    spectrum: Spectrum,
    datasets: Vec<ChargeDataset>,
) -> Result<Box<dyn CostFunction>, FitError> {
    Ok(Box::new(LeastSquares::new(spectrum, datasets)?))
}

pub fn build(
    kind: CostKind,
    spectrum: Spectrum,
    datasets: Vec<ChargeDataset>,
) -> Result<Box<dyn CostFunction>, FitError> {
    let entry = COSTS
        .iter()
        .find(|e| e.kind == kind)
        .ok_or_else(|| FitError::UnknownCost {
            name: kind.name().to_string(),
        })?;
    (entry.build)(spectrum, datasets)
}

/// Build a cost by name (`binned_nll` or `BinnedNLL`, …).
pub fn from_name(
    name: &str,
    spectrum: Spectrum,
    datasets: Vec<ChargeDataset>,
) -> Result<Box<dyn CostFunction>, FitError> {
    build(name.parse()?, spectrum, datasets)
}

#[cfg(test)]
pub(crate) mod test_support {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use crate::data::{simulate_pmt, ChargeDataset, PmtTruth};
    use crate::models::Spectrum;

    pub fn pmt_truth() -> PmtTruth {
        PmtTruth {
            eped: 0.0,
            eped_sigma: 0.2,
            pe: 1.0,
            pe_sigma: 0.15,
            lambda: 1.2,
        }
    }

    pub fn pmt_dataset(n: usize, seed: u64) -> ChargeDataset {
        let mut rng = StdRng::seed_from_u64(seed);
        let values = simulate_pmt(&pmt_truth(), n, &mut rng);
        ChargeDataset::new(values, 80, (-2.0, 6.0)).unwrap()
    }

    pub fn pmt_spectrum() -> Spectrum {
        Spectrum::from_name("pmt_single_gaussian", 1, false).unwrap()
    }

    /// Generating parameters in spectrum order.
    pub fn truth_vector() -> Vec<f64> {
        let t = pmt_truth();
        vec![t.eped, t.eped_sigma, t.pe, t.pe_sigma, t.lambda]
    }
}
