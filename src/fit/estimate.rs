//! Moment-based starting values.
//!
//! The pedestal is taken as the samples within half a gain of the expected
//! pedestal position; its share of the events gives the Poisson mean
//! (`P(0) = e^{-λ}`), and the remaining moments give the gain and its width
//! through `mean = eped + λ·pe` and
//! `var = eped_sigma² + λ·(pe² + pe_sigma²)`.
//!
//! Estimates are advisory: anything that cannot be derived is `None` and the
//! spectrum's static initial values stay in place.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::data::ChargeDataset;
use crate::domain::InitialEstimator;
use crate::error::FitError;
use crate::fit::peaks::estimate_from_peaks;
use crate::math::mean_variance;
use crate::models::{ParameterRole, Spectrum};

/// Where to look for the pedestal, and how far apart the peaks are roughly.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EstimateHints {
    pub pedestal: f64,
    pub gain: f64,
}

impl Default for EstimateHints {
    fn default() -> Self {
        Self {
            pedestal: 0.0,
            gain: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SpeEstimate {
    pub eped: Option<f64>,
    pub eped_sigma: Option<f64>,
    pub pe: Option<f64>,
    pub pe_sigma: Option<f64>,
    pub lambda: Option<f64>,
}

impl SpeEstimate {
    pub fn for_role(&self, role: ParameterRole) -> Option<f64> {
        match role {
            ParameterRole::PedestalMean => self.eped,
            ParameterRole::PedestalSigma => self.eped_sigma,
            ParameterRole::Gain => self.pe,
            ParameterRole::GainSigma => self.pe_sigma,
            ParameterRole::Illumination => self.lambda,
            ParameterRole::Crosstalk => None,
        }
    }
}

fn positive(v: f64) -> Option<f64> {
    (v.is_finite() && v > 0.0).then_some(v)
}

pub fn estimate_from_moments(values: &[f64], hints: &EstimateHints) -> SpeEstimate {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    let Some((mean, var)) = mean_variance(&finite) else {
        return SpeEstimate::default();
    };
    if !(var > 0.0) || !(hints.gain.is_finite() && hints.gain != 0.0) {
        return SpeEstimate::default();
    }

    let half_gain = 0.5 * hints.gain.abs();
    let pedestal: Vec<f64> = finite
        .iter()
        .copied()
        .filter(|v| (v - hints.pedestal).abs() < half_gain)
        .collect();
    let Some((eped, ped_var)) = mean_variance(&pedestal) else {
        return SpeEstimate::default();
    };

    let eped_sigma = positive(ped_var.sqrt());
    let lambda = -(pedestal.len() as f64 / finite.len() as f64).ln();
    let lambda = (lambda.is_finite() && lambda >= 0.0).then_some(lambda);

    let pe = lambda.filter(|l| *l > 0.0).map(|l| (mean - eped) / l).filter(|v| v.is_finite());
    let pe_sigma = match (lambda, pe) {
        (Some(l), Some(pe)) if l > 0.0 => {
            let gain_var = (var - ped_var) / l - pe * pe;
            positive(gain_var).map(f64::sqrt)
        }
        _ => None,
    };

    SpeEstimate {
        eped: Some(eped),
        eped_sigma,
        pe,
        pe_sigma,
        lambda,
    }
}

impl Spectrum {
    /// Copy the available estimates into the initial values (clamped into the
    /// limits). Shared parameters are updated once; the illumination
    /// parameter only for `illumination`.
    pub fn apply_estimate(
        &mut self,
        estimate: &SpeEstimate,
        illumination: usize,
    ) -> Result<(), FitError> {
        let lookup = self.lookup(illumination)?.to_vec();
        let roles: Vec<ParameterRole> = self.base_parameters().iter().map(|d| d.role).collect();
        for (base, index) in lookup.into_iter().enumerate() {
            if let Some(value) = estimate.for_role(roles[base]) {
                self.set_initial_clamped(index, value);
            }
        }
        Ok(())
    }
}

/// Seed the spectrum's initial values from the charges of every illumination.
///
/// Shared parameters get the mean of the per-illumination estimates; each
/// illumination keeps its own λ. `Auto` uses the moments when the spectrum
/// has a pedestal and the peaks otherwise. The moment estimate is anchored
/// on the pedestal fraction, so asking for it on a spectrum without a
/// pedestal leaves the static initial values alone.
pub fn refine_initial(
    spectrum: &mut Spectrum,
    datasets: &[ChargeDataset],
    estimator: InitialEstimator,
) -> Result<(), FitError> {
    if datasets.len() != spectrum.n_illuminations() {
        return Err(FitError::IlluminationMismatch {
            expected: spectrum.n_illuminations(),
            found: datasets.len(),
        });
    }
    let has_pedestal = spectrum.pdf().has_pedestal();
    let estimator = match estimator {
        InitialEstimator::Auto if has_pedestal => InitialEstimator::Moments,
        InitialEstimator::Auto => InitialEstimator::Peaks,
        other => other,
    };

    let estimates: Vec<SpeEstimate> = match estimator {
        InitialEstimator::Moments if !has_pedestal => {
            debug!(spectrum = spectrum.name(), "no pedestal; keeping static initial values");
            return Ok(());
        }
        InitialEstimator::Peaks => datasets
            .iter()
            .map(|d| estimate_from_peaks(d.centers(), d.counts(), !has_pedestal))
            .collect(),
        _ => {
            let hints = hints_from(spectrum);
            datasets
                .iter()
                .map(|d| estimate_from_moments(d.values(), &hints))
                .collect()
        }
    };

    let average = |pick: fn(&SpeEstimate) -> Option<f64>| -> Option<f64> {
        let found: Vec<f64> = estimates.iter().filter_map(pick).collect();
        (!found.is_empty()).then(|| found.iter().sum::<f64>() / found.len() as f64)
    };
    let shared = SpeEstimate {
        eped: average(|e| e.eped),
        eped_sigma: average(|e| e.eped_sigma),
        pe: average(|e| e.pe),
        pe_sigma: average(|e| e.pe_sigma),
        lambda: None,
    };

    for (illumination, estimate) in estimates.iter().enumerate() {
        let per_illumination = SpeEstimate {
            lambda: estimate.lambda,
            ..shared
        };
        spectrum.apply_estimate(&per_illumination, illumination)?;
    }
    debug!(?estimator, ?shared, "refined initial values");
    Ok(())
}

fn hints_from(spectrum: &Spectrum) -> EstimateHints {
    let mut hints = EstimateHints::default();
    for p in spectrum.parameters() {
        match p.role {
            ParameterRole::PedestalMean => hints.pedestal = p.initial,
            ParameterRole::Gain if p.initial != 0.0 => hints.gain = p.initial,
            _ => {}
        }
    }
    hints
}
