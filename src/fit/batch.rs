//! Camera-level batch fitting: one independent fit per unit (pixel).
//!
//! Units share only immutable configuration. `process` fits them in order on
//! the calling thread; `multiprocess` spreads them over a dedicated rayon
//! pool and collects `(unit, result)` pairs over a channel, so both produce
//! the same table.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;

use tracing::{debug, error, info, warn};

use crate::cost::{self, CostKind};
use crate::data::ChargeDataset;
use crate::domain::{Binning, FitResult, FitterConfig, ResultsTable};
use crate::error::FitError;
use crate::fit::estimate::refine_initial;
use crate::fit::minimizer::minimize;
use crate::math::mean_variance;
use crate::models::Spectrum;

/// Charge samples of one unit, one vector per illumination.
pub type UnitCharges = Vec<Vec<f64>>;

/// Reshape illumination-major `[illumination][event][pixel]` arrays into one
/// [`UnitCharges`] per pixel.
pub fn units_from_pixel_major(arrays: &[Vec<Vec<f64>>]) -> Result<Vec<UnitCharges>, FitError> {
    let n_pixels = arrays
        .iter()
        .flat_map(|events| events.first())
        .map(Vec::len)
        .next()
        .unwrap_or(0);

    for (illumination, events) in arrays.iter().enumerate() {
        if let Some(event) = events.iter().position(|row| row.len() != n_pixels) {
            return Err(FitError::InconsistentShape(format!(
                "illumination {illumination}, event {event}: expected {n_pixels} pixels, found {}",
                events[event].len()
            )));
        }
    }

    Ok((0..n_pixels)
        .map(|pixel| {
            arrays
                .iter()
                .map(|events| events.iter().map(|row| row[pixel]).collect())
                .collect()
        })
        .collect())
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[derive(Debug)]
pub struct CameraFitter {
    spectrum: Spectrum,
    binning: Binning,
    cost_kind: CostKind,
    config: FitterConfig,
    completed: AtomicUsize,
}

impl CameraFitter {
    pub fn new(
        spectrum: Spectrum,
        binning: Binning,
        cost_kind: CostKind,
        config: FitterConfig,
    ) -> Result<Self, FitError> {
        binning.validate()?;
        config.validate()?;
        debug!(
            spectrum = spectrum.name(),
            max_pe = spectrum.truncation().max_pe,
            min_probability = spectrum.truncation().min_probability,
            "camera fitter ready"
        );
        Ok(Self {
            spectrum,
            binning,
            cost_kind,
            config,
            completed: AtomicUsize::new(0),
        })
    }

    pub fn from_names(
        spectrum_name: &str,
        n_illuminations: usize,
        disable_pedestal: bool,
        cost_name: &str,
        binning: Binning,
        config: FitterConfig,
    ) -> Result<Self, FitError> {
        let spectrum = Spectrum::from_name(spectrum_name, n_illuminations, disable_pedestal)?;
        Self::new(spectrum, binning, cost_name.parse()?, config)
    }

    pub fn spectrum(&self) -> &Spectrum {
        &self.spectrum
    }

    pub fn cost_kind(&self) -> CostKind {
        self.cost_kind
    }

    /// Units finished in the current batch (advisory).
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Relaxed)
    }

    /// Fit one unit. Never fails: problems become a failed row.
    pub fn fit_unit(&self, unit: usize, charges: &UnitCharges) -> FitResult {
        debug!(unit, "fitting unit");
        let result = match self.try_fit_unit(charges) {
            Ok(result) => {
                if !result.success {
                    warn!(unit, status = ?result.message, "fit did not converge");
                }
                result
            }
            Err(err) => {
                warn!(unit, error = %err, "unit fit failed");
                FitResult::failed(self.spectrum.parameter_names(), err.to_string())
            }
        };
        let done = self.completed.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(unit, completed = done, success = result.success, "unit finished");
        result
    }

    fn try_fit_unit(&self, charges: &UnitCharges) -> Result<FitResult, FitError> {
        let n_illuminations = self.spectrum.n_illuminations();
        if charges.len() != n_illuminations {
            return Err(FitError::IlluminationMismatch {
                expected: n_illuminations,
                found: charges.len(),
            });
        }

        let datasets = charges
            .iter()
            .map(|values| ChargeDataset::new(values.clone(), self.binning.n_bins, self.binning.range))
            .collect::<Result<Vec<_>, _>>()?;
        self.check_degenerate(&datasets)?;

        let mut spectrum = self.spectrum.clone();
        if self.config.estimate_initial {
            refine_initial(&mut spectrum, &datasets, self.config.estimator)?;
        }
        let cost = cost::build(self.cost_kind, spectrum, datasets)?;
        minimize(cost.as_ref(), &self.config.minimizer)
    }

    fn check_degenerate(&self, datasets: &[ChargeDataset]) -> Result<(), FitError> {
        let n_free = self.spectrum.n_free_parameters();
        for (illumination, dataset) in datasets.iter().enumerate() {
            let values = dataset.values();
            if values.is_empty() {
                return Err(FitError::DegenerateData {
                    illumination,
                    reason: "no charge values inside the fit range".to_string(),
                });
            }
            if values.len() < n_free {
                return Err(FitError::DegenerateData {
                    illumination,
                    reason: format!(
                        "{} values for {n_free} free parameters",
                        values.len()
                    ),
                });
            }
            if let Some((_, var)) = mean_variance(values) {
                if !(var > 0.0) {
                    return Err(FitError::DegenerateData {
                        illumination,
                        reason: "charge values have zero variance".to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    fn table(&self, rows: Vec<FitResult>) -> ResultsTable {
        let table = ResultsTable {
            parameter_names: self.spectrum.parameter_names().to_vec(),
            rows,
        };
        info!(
            units = table.len(),
            failed = table.n_failed(),
            spectrum = self.spectrum.name(),
            cost = %self.cost_kind,
            "batch fit finished"
        );
        table
    }

    /// [`fit_unit`](Self::fit_unit) with panics turned into a failed row.
    fn fit_unit_guarded(&self, unit: usize, charges: &UnitCharges) -> FitResult {
        panic::catch_unwind(AssertUnwindSafe(|| self.fit_unit(unit, charges))).unwrap_or_else(
            |payload| {
                let reason = panic_message(payload.as_ref());
                error!(unit, reason = %reason, "unit fit panicked");
                FitResult::failed(
                    self.spectrum.parameter_names(),
                    format!("worker panicked: {reason}"),
                )
            },
        )
    }

    /// Fit every unit in order on the calling thread.
    pub fn process(&self, units: &[UnitCharges]) -> ResultsTable {
        self.completed.store(0, Ordering::Relaxed);
        let rows = units
            .iter()
            .enumerate()
            .map(|(unit, charges)| self.fit_unit_guarded(unit, charges))
            .collect();
        self.table(rows)
    }

    /// Fit every unit on a pool of `n_workers` threads.
    pub fn multiprocess(
        &self,
        units: &[UnitCharges],
        n_workers: usize,
    ) -> Result<ResultsTable, FitError> {
        if n_workers == 0 {
            return Err(FitError::InvalidWorkers);
        }
        self.completed.store(0, Ordering::Relaxed);
        info!(units = units.len(), n_workers, "multiprocessing unit fits");

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(n_workers)
            .thread_name(|i| format!("spe-fit-{i}"))
            .build()
            .map_err(|e| FitError::WorkerPool(format!("failed to create thread pool: {e}")))?;

        let (tx, rx) = mpsc::channel::<(usize, FitResult)>();
        pool.scope(|scope| {
            for (unit, charges) in units.iter().enumerate() {
                let tx = tx.clone();
                scope.spawn(move |_| {
                    let result = self.fit_unit_guarded(unit, charges);
                    // The receiver outlives the scope.
                    let _ = tx.send((unit, result));
                });
            }
        });
        drop(tx);

        let rows = self.collect_rows(units.len(), rx);
        Ok(self.table(rows))
    }

    /// Order reported results by unit; units that never reported become
    /// failed rows.
    fn collect_rows(
        &self,
        n_units: usize,
        rx: mpsc::Receiver<(usize, FitResult)>,
    ) -> Vec<FitResult> {
        let mut slots: Vec<Option<FitResult>> = vec![None; n_units];
        for (unit, result) in rx {
            if let Some(slot) = slots.get_mut(unit) {
                *slot = Some(result);
            }
        }
        slots
            .into_iter()
            .enumerate()
            .map(|(unit, slot)| {
                slot.unwrap_or_else(|| {
                    error!(unit, "worker did not report");
                    FitResult::failed(self.spectrum.parameter_names(), "worker did not report")
                })
            })
            .collect()
    }
}
