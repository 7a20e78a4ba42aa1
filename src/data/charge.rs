//! Charge dataset: raw samples plus their fixed-range histogram.
//!
//! Binned costs read `counts()`/`centers()`, unbinned costs read `values()`.
//! Both views are computed once at construction; the dataset is immutable
//! afterwards.

use serde::{Deserialize, Serialize};

use crate::error::FitError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargeDataset {
    raw: Option<Vec<f64>>,
    values: Vec<f64>,
    edges: Vec<f64>,
    counts: Vec<f64>,
    centers: Vec<f64>,
}

impl ChargeDataset {
    /// Histogram `values` into `n_bins` equal-width bins over `range`.
    ///
    /// Bins are half-open `[e_i, e_{i+1})` except the last, which also
    /// includes `range.1`. Values outside the range and non-finite values are
    /// kept in `raw()` but dropped from `values()` and `counts()`.
    pub fn new(values: Vec<f64>, n_bins: usize, range: (f64, f64)) -> Result<Self, FitError> {
        let edges = bin_edges(n_bins, range)?;
        let (low, high) = range;

        let in_range: Vec<f64> = values
            .iter()
            .copied()
            .filter(|v| v.is_finite() && *v >= low && *v <= high)
            .collect();

        let width = (high - low) / n_bins as f64;
        let mut counts = vec![0.0; n_bins];
        for &v in &in_range {
            let mut idx = ((v - low) / width).floor() as usize;
            // Float division can land one bin off near an edge.
            if idx >= n_bins {
                idx = n_bins - 1;
            }
            if idx + 1 < n_bins && v >= edges[idx + 1] {
                idx += 1;
            } else if idx > 0 && v < edges[idx] {
                idx -= 1;
            }
            counts[idx] += 1.0;
        }

        let centers = centers_from_edges(&edges);
        Ok(Self {
            raw: Some(values),
            values: in_range,
            edges,
            counts,
            centers,
        })
    }

    /// Build a dataset from an already binned spectrum.
    ///
    /// Centres must be strictly increasing and equally spaced; counts must be
    /// finite and non-negative. The result has no raw samples.
    pub fn from_prebinned(centers: Vec<f64>, counts: Vec<f64>) -> Result<Self, FitError> {
        if centers.len() != counts.len() {
            return Err(FitError::InvalidPrebinned(format!(
                "{} centres but {} counts",
                centers.len(),
                counts.len()
            )));
        }
        if centers.len() < 2 {
            return Err(FitError::InvalidPrebinned(
                "need at least two bins".to_string(),
            ));
        }
        if centers.iter().any(|c| !c.is_finite()) {
            return Err(FitError::InvalidPrebinned(
                "bin centres must be finite".to_string(),
            ));
        }
        if counts.iter().any(|c| !c.is_finite() || *c < 0.0) {
            return Err(FitError::InvalidPrebinned(
                "counts must be finite and non-negative".to_string(),
            ));
        }

        let width = centers[1] - centers[0];
        if !(width > 0.0) {
            return Err(FitError::InvalidPrebinned(
                "bin centres must be strictly increasing".to_string(),
            ));
        }
        let tol = 1e-6 * width.max(1e-12);
        for pair in centers.windows(2) {
            let step = pair[1] - pair[0];
            if (step - width).abs() > tol.max(1e-9 * pair[1].abs()) {
                return Err(FitError::InvalidPrebinned(
                    "bin centres must be equally spaced".to_string(),
                ));
            }
        }

        let mut edges: Vec<f64> = centers.iter().map(|c| c - 0.5 * width).collect();
        edges.push(centers[centers.len() - 1] + 0.5 * width);

        Ok(Self {
            raw: None,
            values: Vec::new(),
            edges,
            counts,
            centers,
        })
    }

    /// The untouched input samples (`None` for pre-binned data).
    pub fn raw(&self) -> Option<&[f64]> {
        self.raw.as_deref()
    }

    /// Finite samples inside the histogram range.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn edges(&self) -> &[f64] {
        &self.edges
    }

    pub fn counts(&self) -> &[f64] {
        &self.counts
    }

    pub fn centers(&self) -> &[f64] {
        &self.centers
    }

    pub fn n_bins(&self) -> usize {
        self.counts.len()
    }

    pub fn bin_width(&self) -> f64 {
        self.edges[1] - self.edges[0]
    }

    pub fn range(&self) -> (f64, f64) {
        (self.edges[0], self.edges[self.edges.len() - 1])
    }

    pub fn total(&self) -> f64 {
        self.counts.iter().sum()
    }

    pub fn has_raw(&self) -> bool {
        self.raw.is_some()
    }
}

fn bin_edges(n_bins: usize, (low, high): (f64, f64)) -> Result<Vec<f64>, FitError> {
    if n_bins == 0 {
        return Err(FitError::InvalidBinning { n_bins });
    }
    if !(low.is_finite() && high.is_finite() && low < high) {
        return Err(FitError::InvalidRange { low, high });
    }
    let width = (high - low) / n_bins as f64;
    let mut edges: Vec<f64> = (0..n_bins).map(|i| low + width * i as f64).collect();
    edges.push(high);
    Ok(edges)
}

fn centers_from_edges(edges: &[f64]) -> Vec<f64> {
    edges.windows(2).map(|e| 0.5 * (e[0] + e[1])).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn histogram_excludes_out_of_range_and_closes_last_bin() {
        let values = vec![-1.0, 0.0, 0.5, 1.0, 2.0, 3.0, f64::NAN];
        let ds = ChargeDataset::new(values, 2, (0.0, 2.0)).unwrap();

        assert_eq!(ds.edges(), &[0.0, 1.0, 2.0]);
        assert_eq!(ds.counts(), &[2.0, 2.0]);
        assert_eq!(ds.centers(), &[0.5, 1.5]);
        assert_eq!(ds.values(), &[0.0, 0.5, 1.0, 2.0]);
        assert_eq!(ds.raw().unwrap().len(), 7);
        assert_relative_eq!(ds.total(), ds.values().len() as f64);
    }

    #[test]
    fn value_on_inner_edge_goes_to_upper_bin() {
        let ds = ChargeDataset::new(vec![1.0, 2.0, 3.0], 4, (0.0, 4.0)).unwrap();
        assert_eq!(ds.counts(), &[0.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn all_values_out_of_range_gives_empty_histogram() {
        let ds = ChargeDataset::new(vec![10.0, 11.0], 4, (0.0, 1.0)).unwrap();
        assert_eq!(ds.total(), 0.0);
        assert!(ds.values().is_empty());
    }

    #[test]
    fn rejects_bad_binning_and_range() {
        assert_eq!(
            ChargeDataset::new(vec![0.0], 0, (0.0, 1.0)),
            Err(FitError::InvalidBinning { n_bins: 0 })
        );
        assert!(matches!(
            ChargeDataset::new(vec![0.0], 10, (1.0, 1.0)),
            Err(FitError::InvalidRange { .. })
        ));
        assert!(matches!(
            ChargeDataset::new(vec![0.0], 10, (0.0, f64::INFINITY)),
            Err(FitError::InvalidRange { .. })
        ));
    }

    #[test]
    fn prebinned_reconstructs_edges() {
        let ds = ChargeDataset::from_prebinned(vec![0.5, 1.5, 2.5], vec![1.0, 4.0, 2.0]).unwrap();
        assert!(!ds.has_raw());
        assert!(ds.raw().is_none());
        assert_relative_eq!(ds.bin_width(), 1.0);
        assert_eq!(ds.range(), (0.0, 3.0));
        assert_relative_eq!(ds.total(), 7.0);
    }

    #[test]
    fn prebinned_rejects_uneven_centres() {
        assert!(matches!(
            ChargeDataset::from_prebinned(vec![0.0, 1.0, 3.0], vec![1.0, 1.0, 1.0]),
            Err(FitError::InvalidPrebinned(_))
        ));
        assert!(matches!(
            ChargeDataset::from_prebinned(vec![0.0, 1.0], vec![1.0, -1.0]),
            Err(FitError::InvalidPrebinned(_))
        ));
    }
}
