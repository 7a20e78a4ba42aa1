//! Name → spectrum constructor table.

use std::sync::Arc;

use tracing::warn;

use crate::error::FitError;
use crate::models::pmt::PmtSingleGaussian;
use crate::models::sipm::{SipmGentile, SipmGeneralizedPoisson, SipmModifiedPoisson};
use crate::models::spectrum::SpectrumPdf;

pub struct SpectrumEntry {
    pub name: &'static str,
    /// `disable_pedestal` is ignored by spectra whose pedestal is built in.
    pub build: fn(bool) -> Arc<dyn SpectrumPdf>,
}

pub const SPECTRA: &[SpectrumEntry] = &[
    SpectrumEntry {
        name: "pmt_single_gaussian",
        build: pmt_single_gaussian,
    },
    SpectrumEntry {
        name: "sipm_gentile",
        build: sipm_gentile,
    },
    SpectrumEntry {
        name: "sipm_generalized_poisson",
        build: sipm_generalized_poisson,
    },
    SpectrumEntry {
        name: "sipm_modified_poisson",
        build: sipm_modified_poisson,
    },
];

fn pmt_single_gaussian(disable_pedestal: bool) -> Arc<dyn SpectrumPdf> {
    Arc::new(PmtSingleGaussian { disable_pedestal })
}

fn sipm_gentile(disable_pedestal: bool) -> Arc<dyn SpectrumPdf> {
    Arc::new(SipmGentile { disable_pedestal })
}

fn sipm_generalized_poisson(disable_pedestal: bool) -> Arc<dyn SpectrumPdf> {
    if disable_pedestal {
        warn!("sipm_generalized_poisson always has a pedestal; ignoring disable_pedestal");
    }
    Arc::new(SipmGeneralizedPoisson)
}

fn sipm_modified_poisson(disable_pedestal: bool) -> Arc<dyn SpectrumPdf> {
    Arc::new(SipmModifiedPoisson { disable_pedestal })
}

pub fn spectrum_names() -> impl Iterator<Item = &'static str> {
    SPECTRA.iter().map(|e| e.name)
}

pub fn build_pdf(name: &str, disable_pedestal: bool) -> Result<Arc<dyn SpectrumPdf>, FitError> {
    SPECTRA
        .iter()
        .find(|e| e.name == name)
        .map(|e| (e.build)(disable_pedestal))
        .ok_or_else(|| FitError::UnknownSpectrum {
            name: name.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Spectrum;

    #[test]
    fn every_entry_builds_under_its_own_name() {
        for name in spectrum_names() {
            let spectrum = Spectrum::from_name(name, 2, false).unwrap();
            assert_eq!(spectrum.name(), name);
            assert!(spectrum.n_parameters() > 0);
        }
    }

    #[test]
    fn generalized_poisson_uses_pe0_names() {
        let spectrum = Spectrum::from_name("sipm_generalized_poisson", 1, false).unwrap();
        assert_eq!(spectrum.parameter_names()[0], "pe0");
    }

    #[test]
    fn generalized_poisson_keeps_its_pedestal() {
        let kept = build_pdf("sipm_generalized_poisson", true).unwrap();
        assert!(kept.has_pedestal());
        for name in ["pmt_single_gaussian", "sipm_gentile", "sipm_modified_poisson"] {
            assert!(!build_pdf(name, true).unwrap().has_pedestal(), "{name}");
        }
    }

    #[test]
    fn unknown_name_is_an_error() {
        assert!(matches!(
            build_pdf("hamamatsu_magic", false),
            Err(FitError::UnknownSpectrum { .. })
        ));
    }
}
