//! Parameter declarations.
//!
//! A spectrum declares *base* parameters; `multi` ones are replicated per
//! illumination by [`crate::models::Spectrum`].

use serde::{Deserialize, Serialize};

/// Physical meaning of a parameter, used to map moment estimates onto
/// spectra whose parameter names differ (`eped` vs `pe0`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterRole {
    PedestalMean,
    PedestalSigma,
    Gain,
    GainSigma,
    Crosstalk,
    Illumination,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDef {
    pub name: String,
    pub initial: f64,
    pub limits: (f64, f64),
    pub fixed: bool,
    /// One copy per illumination.
    pub multi: bool,
    pub role: ParameterRole,
}

impl ParameterDef {
    pub fn new(name: &str, initial: f64, limits: (f64, f64), role: ParameterRole) -> Self {
        Self {
            name: name.to_string(),
            initial,
            limits,
            fixed: false,
            multi: false,
            role,
        }
    }

    pub fn multi(mut self) -> Self {
        self.multi = true;
        self
    }
}

/// Expanded parameter as seen by costs and the minimizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    /// Index of the declaring [`ParameterDef`].
    pub base: usize,
    /// Illumination this copy belongs to (`None` for shared parameters).
    pub illumination: Option<usize>,
    pub initial: f64,
    pub limits: (f64, f64),
    pub fixed: bool,
    pub role: ParameterRole,
}

/// Expanded name of a multi parameter copy (`lambda_` + `1` → `lambda_1`).
pub fn expanded_name(base: &str, illumination: usize) -> String {
    format!("{base}{illumination}")
}
