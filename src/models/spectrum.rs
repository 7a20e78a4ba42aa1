//! Spectrum model: a [`SpectrumPdf`] bound to a number of illuminations.
//!
//! The PDF only knows its base parameters. [`Spectrum`] expands the `multi`
//! ones into one copy per illumination, owns initial values/limits/fixed
//! flags, and maps an expanded parameter vector back to the base vector the
//! PDF evaluates for a given illumination.

use std::fmt;
use std::sync::Arc;

use crate::domain::Truncation;
use crate::error::FitError;
use crate::math::add_weighted_normal;
use crate::models::parameter::{expanded_name, Parameter, ParameterDef};

/// A normalized charge density with declared base parameters.
pub trait SpectrumPdf: Send + Sync + fmt::Debug {
    /// Registry name.
    fn name(&self) -> &'static str;

    /// Base parameters in evaluation order.
    fn parameters(&self) -> Vec<ParameterDef>;

    /// Whether the zero-photoelectron peak contributes.
    fn has_pedestal(&self) -> bool;

    /// Accumulate the density at every `x` into `out` (zeroed by the caller).
    /// `params` is in [`SpectrumPdf::parameters`] order.
    fn density(&self, x: &[f64], params: &[f64], truncation: &Truncation, out: &mut [f64]);
}

#[derive(Clone)]
pub struct Spectrum {
    pdf: Arc<dyn SpectrumPdf>,
    n_illuminations: usize,
    defs: Vec<ParameterDef>,
    parameters: Vec<Parameter>,
    names: Vec<String>,
    lookups: Vec<Vec<usize>>,
    truncation: Truncation,
}

impl fmt::Debug for Spectrum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Spectrum")
            .field("pdf", &self.pdf.name())
            .field("n_illuminations", &self.n_illuminations)
            .field("parameters", &self.names)
            .finish()
    }
}

impl Spectrum {
    pub fn new(pdf: Arc<dyn SpectrumPdf>, n_illuminations: usize) -> Result<Self, FitError> {
        if n_illuminations == 0 {
            return Err(FitError::InvalidIlluminations { n: 0 });
        }
        let defs = pdf.parameters();
        for def in &defs {
            check_limits(&def.name, def.initial, def.limits)?;
        }

        let mut parameters = Vec::new();
        let mut lookups = vec![vec![0; defs.len()]; n_illuminations];
        for (base, def) in defs.iter().enumerate() {
            if def.multi {
                for (illumination, lookup) in lookups.iter_mut().enumerate() {
                    lookup[base] = parameters.len();
                    parameters.push(Parameter {
                        name: expanded_name(&def.name, illumination),
                        base,
                        illumination: Some(illumination),
                        initial: def.initial,
                        limits: def.limits,
                        fixed: def.fixed,
                        role: def.role,
                    });
                }
            } else {
                for lookup in lookups.iter_mut() {
                    lookup[base] = parameters.len();
                }
                parameters.push(Parameter {
                    name: def.name.clone(),
                    base,
                    illumination: None,
                    initial: def.initial,
                    limits: def.limits,
                    fixed: def.fixed,
                    role: def.role,
                });
            }
        }
        let names = parameters.iter().map(|p| p.name.clone()).collect();

        Ok(Self {
            pdf,
            n_illuminations,
            defs,
            parameters,
            names,
            lookups,
            truncation: Truncation::default(),
        })
    }

    /// Build a registered spectrum by name.
    pub fn from_name(
        name: &str,
        n_illuminations: usize,
        disable_pedestal: bool,
    ) -> Result<Self, FitError> {
        let pdf = crate::models::registry::build_pdf(name, disable_pedestal)?;
        Self::new(pdf, n_illuminations)
    }

    pub fn with_truncation(mut self, truncation: Truncation) -> Result<Self, FitError> {
        truncation.validate()?;
        self.truncation = truncation;
        Ok(self)
    }

    pub fn name(&self) -> &'static str {
        self.pdf.name()
    }

    pub fn pdf(&self) -> &dyn SpectrumPdf {
        self.pdf.as_ref()
    }

    pub fn n_illuminations(&self) -> usize {
        self.n_illuminations
    }

    pub fn truncation(&self) -> Truncation {
        self.truncation
    }

    pub fn base_parameters(&self) -> &[ParameterDef] {
        &self.defs
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    pub fn parameter_names(&self) -> &[String] {
        &self.names
    }

    /// Ordered `(name, initial value)` pairs.
    pub fn initial(&self) -> Vec<(&str, f64)> {
        self.parameters
            .iter()
            .map(|p| (p.name.as_str(), p.initial))
            .collect()
    }

    pub fn initial_values(&self) -> Vec<f64> {
        self.parameters.iter().map(|p| p.initial).collect()
    }

    pub fn limits(&self) -> Vec<(f64, f64)> {
        self.parameters.iter().map(|p| p.limits).collect()
    }

    pub fn fixed(&self) -> Vec<bool> {
        self.parameters.iter().map(|p| p.fixed).collect()
    }

    pub fn n_parameters(&self) -> usize {
        self.parameters.len()
    }

    pub fn n_free_parameters(&self) -> usize {
        self.parameters.iter().filter(|p| !p.fixed).count()
    }

    /// Expanded index of every base parameter for one illumination.
    pub fn lookup(&self, illumination: usize) -> Result<&[usize], FitError> {
        self.lookups
            .get(illumination)
            .map(Vec::as_slice)
            .ok_or(FitError::IlluminationIndex {
                index: illumination,
                n_illuminations: self.n_illuminations,
            })
    }

    /// Density at each `x` for one illumination.
    pub fn evaluate(
        &self,
        x: &[f64],
        parameters: &[f64],
        illumination: usize,
    ) -> Result<Vec<f64>, FitError> {
        if parameters.len() != self.parameters.len() {
            return Err(FitError::ParameterLength {
                expected: self.parameters.len(),
                found: parameters.len(),
            });
        }
        let base: Vec<f64> = self
            .lookup(illumination)?
            .iter()
            .map(|&i| parameters[i])
            .collect();
        let mut out = vec![0.0; x.len()];
        self.pdf.density(x, &base, &self.truncation, &mut out);
        Ok(out)
    }

    /// Set the initial value of one parameter, or of every copy when `name`
    /// is the base name of a multi parameter.
    pub fn update_initial(&mut self, name: &str, value: f64) -> Result<(), FitError> {
        let indices = self.resolve(name)?;
        for &i in &indices {
            let p = &self.parameters[i];
            check_limits(&p.name, value, p.limits)?;
        }
        for i in indices {
            self.parameters[i].initial = value;
        }
        Ok(())
    }

    pub fn update_limits(&mut self, name: &str, limits: (f64, f64)) -> Result<(), FitError> {
        let indices = self.resolve(name)?;
        for &i in &indices {
            let p = &self.parameters[i];
            check_limits(&p.name, p.initial, limits)?;
        }
        for i in indices {
            self.parameters[i].limits = limits;
        }
        Ok(())
    }

    pub fn update_fixed(&mut self, name: &str, fixed: bool) -> Result<(), FitError> {
        for i in self.resolve(name)? {
            self.parameters[i].fixed = fixed;
        }
        Ok(())
    }

    /// Clamp `value` into the parameter's limits and store it as the initial
    /// value. Fixed parameters are left alone.
    pub(crate) fn set_initial_clamped(&mut self, index: usize, value: f64) {
        let p = &mut self.parameters[index];
        if p.fixed || !value.is_finite() {
            return;
        }
        p.initial = value.clamp(p.limits.0, p.limits.1);
    }

    fn resolve(&self, name: &str) -> Result<Vec<usize>, FitError> {
        if let Some(i) = self.names.iter().position(|n| n == name) {
            return Ok(vec![i]);
        }
        let copies: Vec<usize> = self
            .parameters
            .iter()
            .enumerate()
            .filter(|(_, p)| p.illumination.is_some() && self.defs[p.base].name == name)
            .map(|(i, _)| i)
            .collect();
        if copies.is_empty() {
            Err(FitError::UnknownParameter {
                name: name.to_string(),
            })
        } else {
            Ok(copies)
        }
    }
}

fn check_limits(name: &str, initial: f64, (low, high): (f64, f64)) -> Result<(), FitError> {
    if low.is_nan() || high.is_nan() || low > high {
        return Err(FitError::InvalidLimits {
            name: name.to_string(),
            low,
            high,
        });
    }
    if !(initial >= low && initial <= high) {
        return Err(FitError::InitialOutOfBounds {
            name: name.to_string(),
            value: initial,
            low,
            high,
        });
    }
    Ok(())
}

/// Position and width of the photoelectron peaks.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PeakShape {
    pub pedestal: f64,
    pub pedestal_sigma: f64,
    pub gain: f64,
    pub gain_sigma: f64,
}

impl PeakShape {
    fn mean(&self, k: usize) -> f64 {
        self.pedestal + k as f64 * self.gain
    }

    fn sigma(&self, k: usize) -> f64 {
        (self.pedestal_sigma * self.pedestal_sigma + k as f64 * self.gain_sigma * self.gain_sigma)
            .sqrt()
    }
}

/// Sum Gaussian peaks `k = 0, 1, …` weighted by `weight(k)` into `out`.
///
/// `weight` is the full photoelectron count distribution, `k = 0` included;
/// the `k = 0` peak is only drawn when `pedestal` is set. Summation stops once
/// the count probability not yet visited falls below
/// `truncation.min_probability`, or after `truncation.max_pe` peaks.
pub(crate) fn sum_peaks(
    x: &[f64],
    shape: PeakShape,
    truncation: &Truncation,
    pedestal: bool,
    mut weight: impl FnMut(usize) -> f64,
    out: &mut [f64],
) {
    let mut covered = 0.0_f64;
    for k in 0..=truncation.max_pe {
        let p = weight(k);
        if p.is_nan() {
            break;
        }
        if p > 0.0 {
            covered += p;
            if k > 0 || pedestal {
                add_weighted_normal(x, shape.mean(k), shape.sigma(k), p, out);
            }
        }
        if 1.0 - covered < truncation.min_probability {
            break;
        }
    }
}
