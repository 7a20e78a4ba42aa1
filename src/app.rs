//! Top-level application orchestration.
//!
//! `src/main.rs` stays tiny; this module is the real main: it parses the CLI,
//! installs the log subscriber, simulates a camera, fits it, and prints the
//! results.

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command, FitArgs};
use crate::cost::{COSTS, CostKind};
use crate::data::{PmtTruth, simulate_camera};
use crate::domain::{Binning, FitterConfig, MinimizerOptions, ResultsTable};
use crate::error::AppError;
use crate::fit::CameraFitter;
use crate::models::{Spectrum, spectrum_names};

/// Entry point for the `spe` binary.
pub fn run() -> Result<(), AppError> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Command::Fit(args) => handle_fit(&args),
        Command::List => {
            println!("{}", format_registry());
            Ok(())
        }
    }
}

/// Logs go to stderr so `--json` output stays machine readable.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn handle_fit(args: &FitArgs) -> Result<(), AppError> {
    if args.lambdas.is_empty() {
        return Err(AppError::new(2, "--lambdas needs at least one value"));
    }
    if args.events == 0 {
        return Err(AppError::new(2, "--events must be > 0"));
    }
    if args.workers == 0 {
        return Err(AppError::new(2, "--workers must be > 0"));
    }

    let table = run_fit(args)?;
    if args.json {
        let json = serde_json::to_string_pretty(&table)
            .map_err(|e| AppError::new(4, format!("failed to serialize results: {e}")))?;
        println!("{json}");
    } else {
        println!("{}", crate::report::format_summary(&table));
        println!("{}", crate::report::format_results_table(&table));
    }
    Ok(())
}

/// Simulate and fit a camera as described by `args`.
pub fn run_fit(args: &FitArgs) -> Result<ResultsTable, AppError> {
    let binning = Binning::new(args.bins, (args.range_low, args.range_high))?;
    let cost_kind: CostKind = args.cost.parse()?;
    let spectrum = Spectrum::from_name(&args.spectrum, args.lambdas.len(), args.disable_pedestal)?;
    let fitter = CameraFitter::new(spectrum, binning, cost_kind, fitter_config_from_args(args)?)?;

    let truth = truth_from_args(args);
    info!(
        units = args.units,
        events = args.events,
        illuminations = args.lambdas.len(),
        seed = args.seed,
        "simulating camera"
    );
    let units = simulate_camera(&truth, &args.lambdas, args.units, args.events, args.seed);

    let table = if args.workers > 1 {
        fitter.multiprocess(&units, args.workers)?
    } else {
        fitter.process(&units)
    };
    Ok(table)
}

pub fn fitter_config_from_args(args: &FitArgs) -> Result<FitterConfig, AppError> {
    Ok(FitterConfig {
        minimizer: MinimizerOptions {
            max_iters: args.max_iters,
            require_success: args.require_success,
            ..MinimizerOptions::default()
        },
        estimate_initial: args.estimate,
        estimator: args.estimator.parse()?,
    })
}

fn truth_from_args(args: &FitArgs) -> PmtTruth {
    PmtTruth {
        eped: args.eped,
        eped_sigma: args.eped_sigma,
        pe: args.pe,
        pe_sigma: args.pe_sigma,
        lambda: args.lambdas[0],
    }
}

fn format_registry() -> String {
    let mut out = String::from("Spectra:\n");
    for name in spectrum_names() {
        out.push_str(&format!("  {name}\n"));
    }
    out.push_str("\nCost functions:\n");
    for entry in COSTS {
        out.push_str(&format!("  {}\n", entry.name));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::InitialEstimator;

    fn args(extra: &[&str]) -> FitArgs {
        let mut argv = vec!["spe", "fit"];
        argv.extend_from_slice(extra);
        match Cli::parse_from(argv).command {
            Command::Fit(args) => args,
            Command::List => unreachable!(),
        }
    }

    #[test]
    fn config_from_args() {
        let config = fitter_config_from_args(&args(&["--max-iters", "50", "--estimate"])).unwrap();
        assert_eq!(config.minimizer.max_iters, 50);
        assert!(config.estimate_initial);
        assert_eq!(config.estimator, InitialEstimator::Auto);
        let config = fitter_config_from_args(&args(&["--estimator", "peaks"])).unwrap();
        assert_eq!(config.estimator, InitialEstimator::Peaks);
        assert!(!config.minimizer.require_success);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn registry_listing_names_everything() {
        let text = format_registry();
        for name in spectrum_names() {
            assert!(text.contains(name));
        }
        assert!(text.contains("unbinned_nll"));
    }

    #[test]
    fn bad_inputs_map_to_exit_codes() {
        let err = run_fit(&args(&["--cost", "nope"])).unwrap_err();
        assert_eq!(err.exit_code(), 4);
        let err = run_fit(&args(&["--range-low", "5", "--range-high", "1"])).unwrap_err();
        assert_eq!(err.exit_code(), 4);
        let err = handle_fit(&args(&["--events", "0"])).unwrap_err();
        assert_eq!(err.exit_code(), 2);
        let err = handle_fit(&args(&["--workers", "0"])).unwrap_err();
        assert_eq!(err.exit_code(), 2);
        let err = run_fit(&args(&["--estimator", "median"])).unwrap_err();
        assert_eq!(err.exit_code(), 4);
    }

    #[test]
    fn small_camera_fits() {
        let table = run_fit(&args(&["--units", "2", "--events", "5000", "--workers", "2"])).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.n_failed(), 0);
    }
}
