//! Binned Poisson negative log-likelihood (likelihood-ratio form).
//!
//! Per bin: `f` when `d == 0`, else `f - d - d·ln(f/d)`. Twice the minimum is
//! χ²-distributed with `bins - free` degrees of freedom.

use crate::cost::{
    check_datasets, check_parameters, expected_counts, CostFunction, CostKind, DENSITY_FLOOR,
};
use crate::data::ChargeDataset;
use crate::error::FitError;
use crate::math::xlogy;
use crate::models::Spectrum;

#[derive(Debug, Clone)]
pub struct BinnedNll {
    spectrum: Spectrum,
    datasets: Vec<ChargeDataset>,
}

impl BinnedNll {
    pub fn new(spectrum: Spectrum, datasets: Vec<ChargeDataset>) -> Result<Self, FitError> {
        check_datasets(&spectrum, &datasets)?;
        Ok(Self { spectrum, datasets })
    }
}

pub(crate) fn bin_nll(f: f64, d: f64) -> f64 {
    if d == 0.0 {
        f
    } else {
        let f = f.max(DENSITY_FLOOR);
        f - d - xlogy(d, f / d)
    }
}

impl CostFunction for BinnedNll {
    fn kind(&self) -> CostKind {
        CostKind::BinnedNll
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
            let f = expected_counts(&self.spectrum, parameters, dataset, illumination)?;
            total += f
                .iter()
                .zip(dataset.counts())
                .map(|(&f, &d)| bin_nll(f, d))
                .sum::<f64>();
        }
        Ok(total)
    }

    fn dof(&self) -> i64 {
        let n: usize = self.datasets.iter().map(ChargeDataset::n_bins).sum();
        n as i64 - self.spectrum.n_free_parameters() as i64
    }

    fn errordef(&self) -> f64 {
        0.5
    }

    fn chi2(&self, parameters: &[f64]) -> Result<f64, FitError> {
        Ok(2.0 * self.evaluate(parameters)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cost::test_support::*;

    #[test]
    fn bin_nll_is_zero_at_perfect_agreement() {
        assert_eq!(bin_nll(4.0, 4.0), 0.0);
        assert_eq!(bin_nll(0.3, 0.0), 0.3);
        assert!(bin_nll(3.0, 4.0) > 0.0);
        assert!(bin_nll(0.0, 2.0).is_finite());
    }

    #[test]
    fn truth_beats_perturbed_parameters() {
        let cost = BinnedNll::new(pmt_spectrum(), vec![pmt_dataset(20_000, 11)]).unwrap();
        let truth = truth_vector();
        let at_truth = cost.evaluate(&truth).unwrap();
        for (i, delta) in [(2, 0.1), (4, 0.2), (1, 0.1)] {
            let mut p = truth.clone();
            p[i] += delta;
            assert!(cost.evaluate(&p).unwrap() > at_truth, "parameter {i}");
        }
    }

    #[test]
    fn dof_counts_bins_minus_free() {
        let mut spectrum = pmt_spectrum();
        let cost = BinnedNll::new(spectrum.clone(), vec![pmt_dataset(100, 5)]).unwrap();
        assert_eq!(cost.dof(), 80 - 5);
        spectrum.update_fixed("eped", true).unwrap();
        let cost = BinnedNll::new(spectrum, vec![pmt_dataset(100, 5)]).unwrap();
        assert_eq!(cost.dof(), 80 - 4);
    }

    #[test]
    fn wrong_parameter_length_is_rejected() {
        let cost = BinnedNll::new(pmt_spectrum(), vec![pmt_dataset(100, 6)]).unwrap();
        assert!(matches!(
            cost.evaluate(&[1.0, 2.0]),
            Err(FitError::ParameterLength { expected: 5, found: 2 })
        ));
    }
}
