//! Unbinned negative log-likelihood over the in-range samples.
//!
//! Only samples inside the histogram range enter, so the density is divided
//! by its integral over that range (trapezoid rule on a fixed grid). Without
//! it a spectrum whose mass depends on the parameters, such as one with the
//! pedestal disabled, would pull λ upwards.

use crate::cost::{check_datasets, check_parameters, CostFunction, CostKind, DENSITY_FLOOR};
use crate::data::ChargeDataset;
use crate::error::FitError;
use crate::math::{linspace, trapezoid};
use crate::models::Spectrum;

/// Grid points of the normalization integral.
const NORM_POINTS: usize = 1024;

#[derive(Debug, Clone)]
pub struct UnbinnedNll {
    spectrum: Spectrum,
    datasets: Vec<ChargeDataset>,
}

impl UnbinnedNll {
    /// Pre-binned datasets carry no samples and are rejected.
    pub fn new(spectrum: Spectrum, datasets: Vec<ChargeDataset>) -> Result<Self, FitError> {
        check_datasets(&spectrum, &datasets)?;
        if let Some(illumination) = datasets.iter().position(|d| !d.has_raw()) {
            return Err(FitError::MissingRawValues { illumination });
        }
        Ok(Self { spectrum, datasets })
    }

    fn norm(&self, parameters: &[f64], illumination: usize) -> Result<f64, FitError> {
        let (low, high) = self.datasets[illumination].range();
        let grid = linspace(low, high, NORM_POINTS);
        let f = self.spectrum.evaluate(&grid, parameters, illumination)?;
        Ok(trapezoid(&grid, &f).max(DENSITY_FLOOR))
    }
}

impl CostFunction for UnbinnedNll {
    fn kind(&self) -> CostKind {
        CostKind::UnbinnedNll
    }

    fn spectrum(&self) -> &Spectrum {
        &self.spectrum
    }

    fn datasets(&self) -> &[ChargeDataset] {
        &self.datasets
    }

    fn evaluate(&self, parameters: &[f64]) -> Result<f64, FitError> {
        check_parameters(&self.spectrum, parameters)?;
        let mut total = 0.0;
        for (illumination, dataset) in self.datasets.iter().enumerate() {
            let f = self
                .spectrum
                .evaluate(dataset.values(), parameters, illumination)?;
            total -= f.iter().map(|v| v.max(DENSITY_FLOOR).ln()).sum::<f64>();
            total += dataset.values().len() as f64 * self.norm(parameters, illumination)?.ln();
        }
        Ok(total)
    }

    fn dof(&self) -> i64 {
        let n: usize = self.datasets.iter().map(|d| d.values().len()).sum();
        n as i64 - self.spectrum.n_free_parameters() as i64
    }

    fn errordef(&self) -> f64 {
        0.5
    }

    /// Goodness of fit has no meaning for an unbinned likelihood.
    fn chi2(&self, _parameters: &[f64]) -> Result<f64, FitError> {
        Err(FitError::Chi2Undefined {
            cost: "unbinned_nll",
        })
    }
}
