//! Neyman χ² over bins with more than five counts.

use crate::cost::{check_datasets, check_parameters, expected_counts, CostFunction, CostKind};
use crate::data::ChargeDataset;
use crate::error::FitError;
use crate::models::Spectrum;

/// Bins at or below this count are outside the Gaussian regime and skipped.
pub const MIN_BIN_COUNT: f64 = 5.0;

#[derive(Debug, Clone)]
pub struct LeastSquares {
    spectrum: Spectrum,
    datasets: Vec<ChargeDataset>,
}

impl LeastSquares {
    pub fn new(spectrum: Spectrum, datasets: Vec<ChargeDataset>) -> Result<Self, FitError> {
        check_datasets(&spectrum, &datasets)?;
        Ok(Self { spectrum, datasets })
    }
}

impl CostFunction for LeastSquares {
    fn kind(&self) -> CostKind {
        CostKind::LeastSquares
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
                .filter(|(_, d)| **d > MIN_BIN_COUNT)
                .map(|(&f, &d)| (d - f) * (d - f) / d)
                .sum::<f64>();
        }
        Ok(total)
    }

    fn dof(&self) -> i64 {
        let n: usize = self
            .datasets
            .iter()
            .map(|d| d.counts().iter().filter(|c| **c > MIN_BIN_COUNT).count())
            .sum();
        n as i64 - self.spectrum.n_free_parameters() as i64
    }

    fn errordef(&self) -> f64 {
        1.0
    }

    fn chi2(&self, parameters: &[f64]) -> Result<f64, FitError> {
        self.evaluate(parameters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cost::test_support::*;

    #[test]
    fn sparse_bins_do_not_contribute() {
        let ds = ChargeDataset::from_prebinned(vec![0.0, 1.0, 2.0], vec![100.0, 5.0, 0.0]).unwrap();
        let cost = LeastSquares::new(pmt_spectrum(), vec![ds]).unwrap();
        assert_eq!(cost.dof(), 1 - 5);
        assert!(cost.reduced_chi2(&truth_vector()).is_err());
    }

    #[test]
    fn chi2_equals_cost_and_is_near_dof_at_truth() {
        let cost = LeastSquares::new(pmt_spectrum(), vec![pmt_dataset(50_000, 9)]).unwrap();
        let truth = truth_vector();
        let chi2 = cost.chi2(&truth).unwrap();
        assert_eq!(chi2, cost.evaluate(&truth).unwrap());
        let reduced = cost.reduced_chi2(&truth).unwrap();
        assert!(reduced > 0.3 && reduced < 3.0, "reduced chi2 {reduced}");
    }
}
