//! Silicon photomultiplier spectra.
//!
//! All three variants share the PMT peak shape; they differ in how optical
//! crosstalk redistributes the Poisson photoelectron counts:
//!
//! - [`SipmGentile`]: each initially fired cell triggers a geometric chain of
//!   crosstalk cells (Gentile 2010).
//! - [`SipmGeneralizedPoisson`] / [`SipmModifiedPoisson`]: the generalized
//!   Poisson (Consul–Jain) distribution with branching ratio `opct`.

use crate::domain::Truncation;
use crate::math::{ln_binom, poisson_ln_pmf, xlogy};
use crate::models::parameter::{ParameterDef, ParameterRole};
use crate::models::pmt::{common_parameters, lambda_parameter};
use crate::models::spectrum::{sum_peaks, PeakShape, SpectrumPdf};

/// Upper limit of the crosstalk probability. Above it the generalized Poisson
/// tail outruns the default `Truncation::max_pe`.
const MAX_OPCT: f64 = 0.9;

fn opct_parameter() -> ParameterDef {
    ParameterDef::new("opct", 0.2, (0.0, MAX_OPCT), ParameterRole::Crosstalk)
}

fn shape_of(params: &[f64]) -> PeakShape {
    PeakShape {
        pedestal: params[0],
        pedestal_sigma: params[1],
        gain: params[2],
        gain_sigma: params[3],
    }
}

/// Generalized Poisson probability of `k >= 1` detected photoelectrons.
///
/// `P(k) = λ (λ + kθ)^{k-1} e^{-(λ + kθ)} / k!`
pub fn generalized_poisson(k: usize, lambda: f64, opct: f64) -> f64 {
    if k == 0 {
        return (-lambda).exp();
    }
    let mu_dash = lambda + k as f64 * opct;
    let ln_p = xlogy((k - 1) as f64, mu_dash) - mu_dash
        - statrs::function::gamma::ln_gamma(k as f64 + 1.0);
    lambda * ln_p.exp()
}

/// Gentile probability of `k >= 1` fired cells.
struct GentileWeights {
    lambda: f64,
    opct: f64,
    ln_poisson: Vec<f64>,
}

impl GentileWeights {
    fn new(lambda: f64, opct: f64) -> Self {
        Self {
            lambda,
            opct,
            ln_poisson: vec![poisson_ln_pmf(0, lambda)],
        }
    }

    fn weight(&mut self, k: usize) -> f64 {
        if k == 0 {
            return (-self.lambda).exp();
        }
        while self.ln_poisson.len() <= k {
            let j = self.ln_poisson.len();
            self.ln_poisson.push(poisson_ln_pmf(j, self.lambda));
        }
        (1..=k)
            .map(|j| {
                (self.ln_poisson[j]
                    + xlogy(j as f64, 1.0 - self.opct)
                    + xlogy((k - j) as f64, self.opct)
                    + ln_binom(k - 1, j - 1))
                .exp()
            })
            .sum()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SipmGentile {
    pub disable_pedestal: bool,
}

impl SpectrumPdf for SipmGentile {
    fn name(&self) -> &'static str {
        "sipm_gentile"
    }

    fn parameters(&self) -> Vec<ParameterDef> {
        let mut params = common_parameters("eped", "eped_sigma", (-2.0, 3.0));
        params.push(opct_parameter());
        params.push(lambda_parameter());
        params
    }

    fn has_pedestal(&self) -> bool {
        !self.disable_pedestal
    }

    fn density(&self, x: &[f64], params: &[f64], truncation: &Truncation, out: &mut [f64]) {
        let &[_, _, _, _, opct, lambda] = params else {
            return;
        };
        let mut weights = GentileWeights::new(lambda, opct);
        sum_peaks(
            x,
            shape_of(params),
            truncation,
            !self.disable_pedestal,
            |k| weights.weight(k),
            out,
        );
    }
}

/// Generalized Poisson spectrum; the pedestal is the `k = 0` term and is
/// always present.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SipmGeneralizedPoisson;

impl SpectrumPdf for SipmGeneralizedPoisson {
    fn name(&self) -> &'static str {
        "sipm_generalized_poisson"
    }

    fn parameters(&self) -> Vec<ParameterDef> {
        let mut params = common_parameters("pe0", "pe0_sigma", (-2.0, 3.0));
        params.push(opct_parameter());
        params.push(lambda_parameter());
        params
    }

    fn has_pedestal(&self) -> bool {
        true
    }

    fn density(&self, x: &[f64], params: &[f64], truncation: &Truncation, out: &mut [f64]) {
        let &[_, _, _, _, opct, lambda] = params else {
            return;
        };
        sum_peaks(
            x,
            shape_of(params),
            truncation,
            true,
            |k| generalized_poisson(k, lambda, opct),
            out,
        );
    }
}

/// Generalized Poisson spectrum with an optional pedestal and a positive gain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SipmModifiedPoisson {
    pub disable_pedestal: bool,
}

impl SpectrumPdf for SipmModifiedPoisson {
    fn name(&self) -> &'static str {
        "sipm_modified_poisson"
    }

    fn parameters(&self) -> Vec<ParameterDef> {
        let mut params = common_parameters("eped", "eped_sigma", (0.0, 3.0));
        params.push(opct_parameter());
        params.push(lambda_parameter());
        params
    }

    fn has_pedestal(&self) -> bool {
        !self.disable_pedestal
    }

    fn density(&self, x: &[f64], params: &[f64], truncation: &Truncation, out: &mut [f64]) {
        let &[_, _, _, _, opct, lambda] = params else {
            return;
        };
        sum_peaks(
            x,
            shape_of(params),
            truncation,
            !self.disable_pedestal,
            |k| generalized_poisson(k, lambda, opct),
            out,
        );
    }
}
