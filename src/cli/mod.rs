//! Command-line parsing for the `spe` binary.
//!
//! Argument parsing and command dispatch stay separate from the fitting code;
//! `app` maps these structs into the library's typed configuration.

use clap::{Args, Parser, Subcommand};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "spe", version, about = "Single-photoelectron spectrum fitter")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Simulate a camera of PMT units, fit every unit, and print the results.
    Fit(FitArgs),
    /// List the registered spectra and cost functions.
    List,
}

/// Options for `spe fit`.
#[derive(Debug, Args, Clone)]
pub struct FitArgs {
    /// Spectrum model to fit (see `spe list`).
    #[arg(short = 's', long, default_value = "pmt_single_gaussian")]
    pub spectrum: String,

    /// Cost function (binned_nll, unbinned_nll, least_squares).
    #[arg(short = 'c', long, default_value = "binned_nll")]
    pub cost: String,

    /// Drop the pedestal peak from the spectrum.
    #[arg(long)]
    pub disable_pedestal: bool,

    /// Number of units (pixels) to simulate.
    #[arg(short = 'u', long, default_value_t = 4)]
    pub units: usize,

    /// Events per unit and illumination.
    #[arg(short = 'n', long, default_value_t = 20_000)]
    pub events: usize,

    /// Mean photoelectrons per illumination (comma separated).
    #[arg(long, value_delimiter = ',', default_value = "1.5")]
    pub lambdas: Vec<f64>,

    /// Simulated pedestal position.
    #[arg(long, default_value_t = 0.0)]
    pub eped: f64,

    /// Simulated pedestal width.
    #[arg(long, default_value_t = 0.2)]
    pub eped_sigma: f64,

    /// Simulated single-photoelectron gain.
    #[arg(long, default_value_t = 1.0)]
    pub pe: f64,

    /// Simulated gain spread.
    #[arg(long, default_value_t = 0.1)]
    pub pe_sigma: f64,

    /// Random seed for the simulation (unit `i` uses `seed + i`).
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Number of histogram bins.
    #[arg(long, default_value_t = 100)]
    pub bins: usize,

    /// Lower edge of the fit range.
    #[arg(long, default_value_t = -3.0, allow_negative_numbers = true)]
    pub range_low: f64,

    /// Upper edge of the fit range.
    #[arg(long, default_value_t = 6.0, allow_negative_numbers = true)]
    pub range_high: f64,

    /// Worker threads; 1 fits the units sequentially.
    #[arg(short = 'w', long, default_value_t = 1)]
    pub workers: usize,

    /// Seed initial values from the charges of each unit.
    #[arg(long)]
    pub estimate: bool,

    /// Estimate used by `--estimate`: auto, moments or peaks.
    #[arg(long, default_value = "auto")]
    pub estimator: String,

    /// Minimizer iteration cap.
    #[arg(long, default_value_t = 500)]
    pub max_iters: u64,

    /// Treat non-convergence as a failed unit.
    #[arg(long)]
    pub require_success: bool,

    /// Print the results table as JSON instead of text.
    #[arg(long)]
    pub json: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn fit_defaults_and_lists() {
        let cli = Cli::parse_from(["spe", "fit", "--lambdas", "0.5,1.5", "--range-low", "-2"]);
        let Command::Fit(args) = cli.command else {
            panic!("expected fit");
        };
        assert_eq!(args.lambdas, vec![0.5, 1.5]);
        assert_eq!(args.range_low, -2.0);
        assert_eq!(args.spectrum, "pmt_single_gaussian");
        assert_eq!(args.workers, 1);
        assert_eq!(args.estimator, "auto");
        assert!(!args.json);
    }

    #[test]
    fn list_subcommand() {
        let cli = Cli::parse_from(["spe", "list"]);
        assert!(matches!(cli.command, Command::List));
    }
}
