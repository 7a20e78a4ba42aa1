//! Minimizer adapter: runs `argmin` on a [`CostFunction`] and turns the
//! optimum into a [`FitResult`] with uncertainties and goodness-of-fit scores.
//!
//! The solver works on the free parameters only, each mapped to an
//! unconstrained coordinate by [`Transform`]. L-BFGS with a More–Thuente line
//! search and central finite-difference gradients is tried first; Nelder–Mead
//! takes over when L-BFGS errors out or ends on a non-finite cost.

use argmin::core::{
    CostFunction as ArgminCost, Error as ArgminError, Executor, Gradient, State,
    TerminationReason, TerminationStatus,
};
use argmin::solver::linesearch::MoreThuenteLineSearch;
use argmin::solver::neldermead::NelderMead;
use argmin::solver::quasinewton::LBFGS;
use finitediff::FiniteDiff;
use nalgebra::DMatrix;
use tracing::{debug, warn};

use crate::cost::CostFunction;
use crate::domain::{FitResult, FitScores, FittedParameter, MinimizerOptions};
use crate::error::FitError;
use crate::fit::transform::Transform;
use crate::math::covariance_from_hessian;

/// Step in unconstrained space for the Hessian.
const HESSIAN_STEP: f64 = 1e-3;
/// Initial simplex size for Nelder–Mead.
const SIMPLEX_STEP: f64 = 0.5;

type Theta = Vec<f64>;
type LbfgsMoreThuente = LBFGS<MoreThuenteLineSearch<Theta, Theta, f64>, Theta, Theta, f64>;

/// The cost seen from unconstrained space.
#[derive(Clone, Copy)]
struct Problem<'a> {
    cost: &'a dyn CostFunction,
    start: &'a [f64],
    free: &'a [usize],
    transforms: &'a [Transform],
}

impl Problem<'_> {
    fn parameters(&self, u: &[f64]) -> Vec<f64> {
        let mut p = self.start.to_vec();
        for ((&i, t), &ui) in self.free.iter().zip(self.transforms).zip(u) {
            p[i] = t.to_bounded(ui);
        }
        p
    }

    fn value(&self, u: &[f64]) -> Result<f64, FitError> {
        self.cost.evaluate(&self.parameters(u))
    }
}

impl ArgminCost for Problem<'_> {
    type Param = Theta;
    type Output = f64;

    fn cost(&self, u: &Self::Param) -> Result<Self::Output, ArgminError> {
        let value = self.value(u)?;
        if !value.is_finite() {
            return Err(FitError::Solver(format!("non-finite cost {value}")).into());
        }
        Ok(value)
    }
}

impl Gradient for Problem<'_> {
    type Param = Theta;
    type Gradient = Theta;

    fn gradient(&self, u: &Self::Param) -> Result<Self::Gradient, ArgminError> {
        let grad = u.central_diff(&|p: &Theta| self.value(p).unwrap_or(f64::NAN));
        if grad.iter().any(|g| !g.is_finite()) {
            return Err(FitError::Solver("non-finite gradient".to_string()).into());
        }
        Ok(grad)
    }
}

struct SolverOutcome {
    best: Theta,
    cost: f64,
    iterations: u64,
    converged: bool,
    status: String,
}

fn converged(status: &TerminationStatus) -> bool {
    matches!(
        status,
        TerminationStatus::Terminated(
            TerminationReason::SolverConverged | TerminationReason::TargetCostReached
        )
    )
}

fn run_lbfgs(
    problem: Problem<'_>,
    u0: Theta,
    options: &MinimizerOptions,
) -> Result<SolverOutcome, FitError> {
    let solver: LbfgsMoreThuente = LBFGS::new(MoreThuenteLineSearch::new(), options.lbfgs_memory)
        .with_tolerance_grad(options.tol_grad)?
        .with_tolerance_cost(options.tol_cost)?;
    let result = Executor::new(problem, solver)
        .configure(|state| state.param(u0).max_iters(options.max_iters))
        .run()?;
    let state = result.state();
    let best = state
        .get_best_param()
        .cloned()
        .ok_or_else(|| FitError::Solver("L-BFGS returned no parameters".to_string()))?;
    Ok(SolverOutcome {
        best,
        cost: state.get_best_cost(),
        iterations: state.get_iter(),
        converged: converged(state.get_termination_status()),
        status: format!("{:?}", state.get_termination_status()),
    })
}

fn run_nelder_mead(
    problem: Problem<'_>,
    u0: &[f64],
    options: &MinimizerOptions,
) -> Result<SolverOutcome, FitError> {
    let mut simplex = vec![u0.to_vec()];
    for i in 0..u0.len() {
        let mut vertex = u0.to_vec();
        vertex[i] += SIMPLEX_STEP;
        simplex.push(vertex);
    }
    let solver = NelderMead::new(simplex).with_sd_tolerance(options.tol_cost.max(f64::EPSILON))?;
    let result = Executor::new(problem, solver)
        .configure(|state| state.max_iters(options.max_iters.saturating_mul(u0.len().max(1) as u64)))
        .run()?;
    let state = result.state();
    let best = state
        .get_best_param()
        .cloned()
        .ok_or_else(|| FitError::Solver("Nelder-Mead returned no parameters".to_string()))?;
    Ok(SolverOutcome {
        best,
        cost: state.get_best_cost(),
        iterations: state.get_iter(),
        converged: converged(state.get_termination_status()),
        status: format!("{:?}", state.get_termination_status()),
    })
}

/// Central-difference Hessian of the cost in unconstrained space.
fn hessian(problem: &Problem<'_>, u: &[f64]) -> Result<DMatrix<f64>, FitError> {
    let n = u.len();
    let h = HESSIAN_STEP;
    let f0 = problem.value(u)?;
    let at = |shifts: &[(usize, f64)]| -> Result<f64, FitError> {
        let mut v = u.to_vec();
        for &(i, d) in shifts {
            v[i] += d;
        }
        problem.value(&v)
    };

    let mut hess = DMatrix::zeros(n, n);
    for i in 0..n {
        let fp = at(&[(i, h)])?;
        let fm = at(&[(i, -h)])?;
        hess[(i, i)] = (fp - 2.0 * f0 + fm) / (h * h);
        for j in 0..i {
            let fpp = at(&[(i, h), (j, h)])?;
            let fpm = at(&[(i, h), (j, -h)])?;
            let fmp = at(&[(i, -h), (j, h)])?;
            let fmm = at(&[(i, -h), (j, -h)])?;
            let v = (fpp - fpm - fmp + fmm) / (4.0 * h * h);
            hess[(i, j)] = v;
            hess[(j, i)] = v;
        }
    }
    Ok(hess)
}

/// Minimize `cost` starting from its spectrum's initial values.
pub fn minimize(cost: &dyn CostFunction, options: &MinimizerOptions) -> Result<FitResult, FitError> {
    options.validate()?;

    let start = cost.initial_values();
    let limits = cost.limits();
    let fixed = cost.fixed();
    let free: Vec<usize> = (0..start.len())
        .filter(|&i| !fixed[i] && limits[i].0 < limits[i].1)
        .collect();
    let transforms: Vec<Transform> = free.iter().map(|&i| Transform::for_limits(limits[i])).collect();
    let problem = Problem {
        cost,
        start: &start,
        free: &free,
        transforms: &transforms,
    };
    let u0: Theta = free
        .iter()
        .zip(&transforms)
        .map(|(&i, t)| t.to_unbounded(start[i]))
        .collect();

    let outcome = if free.is_empty() {
        let value = cost.evaluate(&start)?;
        SolverOutcome {
            best: Vec::new(),
            cost: value,
            iterations: 0,
            converged: value.is_finite(),
            status: "no free parameters".to_string(),
        }
    } else {
        match run_lbfgs(problem, u0.clone(), options) {
            Ok(outcome) if outcome.cost.is_finite() => outcome,
            Ok(outcome) => {
                warn!(status = %outcome.status, "L-BFGS ended on a non-finite cost; retrying with Nelder-Mead");
                run_nelder_mead(problem, &u0, options)?
            }
            Err(err) => {
                warn!(error = %err, "L-BFGS failed; retrying with Nelder-Mead");
                run_nelder_mead(problem, &u0, options)?
            }
        }
    };

    let values = problem.parameters(&outcome.best);
    let mut errors = vec![0.0; values.len()];
    if !free.is_empty() {
        let covariance = hessian(&problem, &outcome.best)
            .ok()
            .and_then(|h| covariance_from_hessian(&h, cost.errordef()));
        for (k, (&i, t)) in free.iter().zip(&transforms).enumerate() {
            errors[i] = match &covariance {
                Some(cov) if cov[(k, k)] >= 0.0 => t.derivative(outcome.best[k]).abs() * cov[(k, k)].sqrt(),
                _ => f64::NAN,
            };
        }
    }

    let scores = FitScores {
        cost: outcome.cost,
        chi2: cost.chi2(&values).unwrap_or(f64::NAN),
        reduced_chi2: cost.reduced_chi2(&values).unwrap_or(f64::NAN),
        p_value: cost.p_value(&values).unwrap_or(f64::NAN),
        dof: cost.dof(),
    };
    let success = outcome.converged && outcome.cost.is_finite();
    debug!(
        cost = outcome.cost,
        iterations = outcome.iterations,
        success,
        status = %outcome.status,
        "minimization finished"
    );

    if !success && options.require_success {
        return Err(FitError::NotConverged {
            status: outcome.status,
        });
    }

    let parameters = cost
        .parameter_names()
        .iter()
        .zip(values)
        .zip(errors)
        .zip(fixed)
        .map(|(((name, value), error), fixed)| FittedParameter {
            name: name.clone(),
            value,
            error,
            fixed,
        })
        .collect();

    Ok(FitResult {
        parameters,
        scores,
        success,
        iterations: outcome.iterations,
        message: Some(outcome.status),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cost::test_support::*;
    use crate::cost::{BinnedNll, LeastSquares};

    #[test]
    fn recovers_pmt_parameters_with_binned_nll() {
        let cost = BinnedNll::new(pmt_spectrum(), vec![pmt_dataset(20_000, 21)]).unwrap();
        let result = minimize(&cost, &MinimizerOptions::default()).unwrap();

        assert!(result.success, "{:?}", result.message);
        let truth = pmt_truth();
        assert!((result.value("pe").unwrap() - truth.pe).abs() < 0.05);
        assert!((result.value("lambda_0").unwrap() - truth.lambda).abs() < 0.1);
        let err = result.error("lambda_0").unwrap();
        assert!(err.is_finite() && err > 0.0 && err < 0.1, "error {err}");
        assert!(result.scores.p_value.is_finite());
        assert_eq!(result.scores.dof, 80 - 5);
    }

    #[test]
    fn fixed_parameters_stay_put() {
        let mut spectrum = pmt_spectrum();
        spectrum.update_initial("eped_sigma", 0.2).unwrap();
        spectrum.update_fixed("eped_sigma", true).unwrap();
        let cost = LeastSquares::new(spectrum, vec![pmt_dataset(20_000, 22)]).unwrap();
        let result = minimize(&cost, &MinimizerOptions::default()).unwrap();

        assert_eq!(result.value("eped_sigma"), Some(0.2));
        assert_eq!(result.error("eped_sigma"), Some(0.0));
        assert!(result.parameters[1].fixed);
        assert!(result.values().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn values_respect_limits() {
        let cost = BinnedNll::new(pmt_spectrum(), vec![pmt_dataset(2_000, 23)]).unwrap();
        let result = minimize(&cost, &MinimizerOptions::default()).unwrap();
        for (p, (lo, hi)) in result.parameters.iter().zip(cost.limits()) {
            assert!(p.value >= lo && p.value <= hi, "{} = {}", p.name, p.value);
        }
    }

    #[test]
    fn iteration_cap_with_require_success_is_an_error() {
        let cost = BinnedNll::new(pmt_spectrum(), vec![pmt_dataset(5_000, 24)]).unwrap();
        let options = MinimizerOptions {
            max_iters: 1,
            require_success: true,
            ..MinimizerOptions::default()
        };
        assert!(matches!(
            minimize(&cost, &options),
            Err(FitError::NotConverged { .. })
        ));

        let lenient = MinimizerOptions {
            max_iters: 1,
            ..MinimizerOptions::default()
        };
        let result = minimize(&cost, &lenient).unwrap();
        assert!(!result.success);
    }

    #[test]
    fn invalid_options_are_rejected() {
        let cost = BinnedNll::new(pmt_spectrum(), vec![pmt_dataset(100, 25)]).unwrap();
        let options = MinimizerOptions {
            tol_grad: -1.0,
            ..MinimizerOptions::default()
        };
        assert!(matches!(
            minimize(&cost, &options),
            Err(FitError::InvalidOption { name: "tol_grad", .. })
        ));
    }
}
