//! Peak-based starting values.
//!
//! The histogram's photoelectron peaks are located by prominence. A straight
//! line through their positions gives the gain (slope) and pedestal
//! (intercept); a line through their squared widths gives `pe_sigma²` and
//! `eped_sigma²`. The Poisson mean follows from the ratios of neighbouring
//! peak heights, `H(k-1)/H(k) = (k/λ)·sqrt(σ_k² / σ_{k-1}²)`, fitted over λ
//! with Brent's method.
//!
//! Unlike the moment estimate this needs no pedestal: with
//! `disable_pedestal` the first peak found is taken as 1 p.e.

use argmin::core::{CostFunction as ArgminCost, Error as ArgminError, Executor, State};
use argmin::solver::brent::BrentOpt;

use crate::fit::estimate::SpeEstimate;
use crate::math::linear_fit;

/// Peaks wanted before the prominence search stops lowering its threshold.
const MAX_PEAKS: usize = 5;
/// Peaks needed for an estimate.
const MIN_PEAKS: usize = 2;
/// Prominence thresholds tried, from `y_max` down to `y_max / PROMINENCE_STEPS`.
const PROMINENCE_STEPS: usize = 50;
const LAMBDA_BOUNDS: (f64, f64) = (1e-6, 5.0);

/// One peak of a binned spectrum.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpePeak {
    pub x: f64,
    pub height: f64,
    pub sigma: f64,
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    index: usize,
    prominence: f64,
    /// Width in samples at half the prominence.
    width: f64,
    width_height: f64,
}

/// Local maxima; the middle sample of a flat top counts once.
fn local_maxima(y: &[f64]) -> Vec<usize> {
    let mut peaks = Vec::new();
    let n = y.len();
    let mut i = 1;
    while i + 1 < n {
        if y[i - 1] < y[i] {
            let mut ahead = i + 1;
            while ahead + 1 < n && y[ahead] == y[i] {
                ahead += 1;
            }
            if y[ahead] < y[i] {
                peaks.push((i + ahead - 1) / 2);
                i = ahead;
                continue;
            }
        }
        i += 1;
    }
    peaks
}

fn candidate(y: &[f64], peak: usize) -> Candidate {
    let top = y[peak];

    let (mut left_min, mut left_base) = (top, peak);
    let mut i = peak;
    loop {
        if y[i] > top {
            break;
        }
        if y[i] < left_min {
            left_min = y[i];
            left_base = i;
        }
        if i == 0 {
            break;
        }
        i -= 1;
    }

    let (mut right_min, mut right_base) = (top, peak);
    for (j, &v) in y.iter().enumerate().skip(peak) {
        if v > top {
            break;
        }
        if v < right_min {
            right_min = v;
            right_base = j;
        }
    }

    let prominence = top - left_min.max(right_min);
    let width_height = top - 0.5 * prominence;

    let mut i = peak;
    while left_base < i && y[i] > width_height {
        i -= 1;
    }
    let mut left = i as f64;
    if y[i] < width_height {
        left += (width_height - y[i]) / (y[i + 1] - y[i]);
    }

    let mut i = peak;
    while i < right_base && y[i] > width_height {
        i += 1;
    }
    let mut right = i as f64;
    if y[i] < width_height {
        right -= (width_height - y[i]) / (y[i - 1] - y[i]);
    }

    Candidate {
        index: peak,
        prominence,
        width: right - left,
        width_height,
    }
}

/// Find the photoelectron peaks of a binned spectrum with equally spaced `x`.
///
/// Peaks must reach a tenth of the highest count and be at least one bin
/// wide. The required prominence starts at the highest count and is lowered
/// until [`MAX_PEAKS`] peaks are found; `None` if fewer than two remain.
pub fn find_spe_peaks(x: &[f64], y: &[f64]) -> Option<Vec<SpePeak>> {
    if x.len() != y.len() || x.len() < 3 || y.iter().any(|v| !v.is_finite()) {
        return None;
    }
    let dx = x[1] - x[0];
    let y_max = y.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !(y_max > 0.0) {
        return None;
    }

    let candidates: Vec<Candidate> = local_maxima(y)
        .into_iter()
        .map(|peak| candidate(y, peak))
        .filter(|c| y[c.index] >= y_max / 10.0 && c.width >= 1.0)
        .collect();

    let above = |step: usize| -> Vec<Candidate> {
        let threshold = y_max * (1.0 - step as f64 / PROMINENCE_STEPS as f64);
        candidates
            .iter()
            .copied()
            .filter(|c| c.prominence >= threshold)
            .collect()
    };
    let found = (0..PROMINENCE_STEPS)
        .map(&above)
        .find(|f| f.len() >= MAX_PEAKS)
        .unwrap_or_else(|| above(PROMINENCE_STEPS - 1));
    if found.len() < MIN_PEAKS {
        return None;
    }

    Some(
        found
            .into_iter()
            .map(|c| {
                let height = y[c.index];
                // Half-prominence width of a Gaussian on a zero baseline.
                let ratio = 2.0 * (2.0 * (height / c.width_height).ln()).sqrt();
                SpePeak {
                    x: x[c.index],
                    height,
                    sigma: c.width * dx / ratio,
                }
            })
            .collect(),
    )
}

/// Expected `H(k-1)/H(k)` for Poisson-weighted Gaussian peaks.
pub fn peak_ratio(k: f64, lambda: f64, sigma0: f64, sigma1: f64) -> f64 {
    let r = k / lambda;
    let num = sigma0 * sigma0 + k * sigma1 * sigma1;
    let den = sigma0 * sigma0 + (k - 1.0) * sigma1 * sigma1;
    if num > 0.0 && den > 0.0 {
        r * (num / den).sqrt()
    } else {
        r
    }
}

struct RatioFit<'a> {
    k: &'a [f64],
    ratio: &'a [f64],
    sigma0: f64,
    sigma1: f64,
}

impl ArgminCost for RatioFit<'_> {
    type Param = f64;
    type Output = f64;

    fn cost(&self, lambda: &f64) -> Result<f64, ArgminError> {
        Ok(self
            .k
            .iter()
            .zip(self.ratio)
            .map(|(&k, &r)| {
                let d = peak_ratio(k, *lambda, self.sigma0, self.sigma1) - r;
                d * d
            })
            .sum())
    }
}

fn fit_lambda(k: &[f64], ratio: &[f64], sigma0: f64, sigma1: f64) -> Option<f64> {
    let problem = RatioFit {
        k,
        ratio,
        sigma0,
        sigma1,
    };
    let result = Executor::new(problem, BrentOpt::new(LAMBDA_BOUNDS.0, LAMBDA_BOUNDS.1))
        .configure(|state| state.max_iters(200))
        .run()
        .ok()?;
    result
        .state()
        .get_best_param()
        .copied()
        .filter(|l| l.is_finite() && *l > 0.0)
}

/// Estimate the SPE parameters from a binned spectrum.
pub fn estimate_from_peaks(centers: &[f64], counts: &[f64], disable_pedestal: bool) -> SpeEstimate {
    let Some(peaks) = find_spe_peaks(centers, counts) else {
        return SpeEstimate::default();
    };
    let first = if disable_pedestal { 1.0 } else { 0.0 };
    let pe_number: Vec<f64> = (0..peaks.len()).map(|i| first + i as f64).collect();
    let position: Vec<f64> = peaks.iter().map(|p| p.x).collect();
    let variance: Vec<f64> = peaks.iter().map(|p| p.sigma * p.sigma).collect();

    let (pe, eped) = match linear_fit(&pe_number, &position) {
        Some((slope, intercept)) => (Some(slope), Some(intercept)),
        None => (None, None),
    };
    let (pe_sigma, eped_sigma) = match linear_fit(&pe_number, &variance) {
        Some((slope, intercept)) => (root(slope), root(intercept)),
        None => (None, None),
    };

    let ratio: Vec<f64> = peaks.windows(2).map(|w| w[0].height / w[1].height).collect();
    let lambda = fit_lambda(
        &pe_number[1..],
        &ratio,
        eped_sigma.unwrap_or(0.0),
        pe_sigma.unwrap_or(0.0),
    );

    SpeEstimate {
        eped,
        eped_sigma,
        pe,
        pe_sigma,
        lambda,
    }
}

fn root(v: f64) -> Option<f64> {
    (v.is_finite() && v > 0.0).then(|| v.sqrt())
}
