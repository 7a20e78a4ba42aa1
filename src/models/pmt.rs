//! Photomultiplier spectrum with Gaussian photoelectron peaks.

use crate::domain::Truncation;
use crate::math::poisson_pmf;
use crate::models::parameter::{ParameterDef, ParameterRole};
use crate::models::spectrum::{sum_peaks, PeakShape, SpectrumPdf};

/// Base parameters shared by the PMT and SiPM spectra (pedestal, gain,
/// illumination), before any crosstalk term.
pub(crate) fn common_parameters(pedestal: &str, pedestal_sigma: &str, gain_limits: (f64, f64)) -> Vec<ParameterDef> {
    vec![
        ParameterDef::new(pedestal, 0.0, (-2.0, 2.0), ParameterRole::PedestalMean),
        ParameterDef::new(pedestal_sigma, 0.1, (0.0, 2.0), ParameterRole::PedestalSigma),
        ParameterDef::new("pe", 1.0, gain_limits, ParameterRole::Gain),
        ParameterDef::new("pe_sigma", 0.1, (0.0, 2.0), ParameterRole::GainSigma),
    ]
}

pub(crate) fn lambda_parameter() -> ParameterDef {
    ParameterDef::new("lambda_", 0.7, (0.0, 5.0), ParameterRole::Illumination).multi()
}

/// Poisson-distributed photoelectrons, each peak a Gaussian whose width grows
/// as `sqrt(eped_sigma² + k·pe_sigma²)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PmtSingleGaussian {
    pub disable_pedestal: bool,
}

impl SpectrumPdf for PmtSingleGaussian {
    fn name(&self) -> &'static str {
        "pmt_single_gaussian"
    }

    fn parameters(&self) -> Vec<ParameterDef> {
        let mut params = common_parameters("eped", "eped_sigma", (-2.0, 3.0));
        params.push(lambda_parameter());
        params
    }

    fn has_pedestal(&self) -> bool {
        !self.disable_pedestal
    }

    fn density(&self, x: &[f64], params: &[f64], truncation: &Truncation, out: &mut [f64]) {
        let &[eped, eped_sigma, pe, pe_sigma, lambda] = params else {
            return;
        };
        let shape = PeakShape {
            pedestal: eped,
            pedestal_sigma: eped_sigma,
            gain: pe,
            gain_sigma: pe_sigma,
        };
        sum_peaks(
            x,
            shape,
            truncation,
            !self.disable_pedestal,
            |k| if k == 0 { (-lambda).exp() } else { poisson_pmf(k, lambda) },
            out,
        );
    }
}
