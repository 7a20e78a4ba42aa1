use rand::SeedableRng;
use rand::rngs::StdRng;

use spe_fit::cost;
use spe_fit::data::{ChargeDataset, PmtTruth, simulate_camera, simulate_pmt};
use spe_fit::domain::{Binning, FitterConfig, MinimizerOptions};
use spe_fit::fit::{CameraFitter, minimize};
use spe_fit::models::Spectrum;

fn pmt_truth() -> PmtTruth {
    PmtTruth {
        eped: 0.0,
        eped_sigma: 0.2,
        pe: 1.0,
        pe_sigma: 0.1,
        lambda: 1.5,
    }
}

#[test]
fn binned_nll_recovers_pmt_example() {
    let mut rng = StdRng::seed_from_u64(2024);
    let values = simulate_pmt(&pmt_truth(), 20_000, &mut rng);
    let dataset = ChargeDataset::new(values, 100, (-3.0, 6.0)).unwrap();
    let spectrum = Spectrum::from_name("pmt_single_gaussian", 1, false).unwrap();

    let cost = cost::from_name("binned_nll", spectrum, vec![dataset]).unwrap();
    let result = minimize(cost.as_ref(), &MinimizerOptions::default()).unwrap();

    assert!(result.success, "{:?}", result.message);
    let lambda = result.value("lambda_0").unwrap();
    let pe = result.value("pe").unwrap();
    assert!((lambda - 1.5).abs() < 0.1, "lambda_0 = {lambda}");
    assert!((pe - 1.0).abs() < 0.05, "pe = {pe}");
    assert!(result.error("pe").unwrap() > 0.0);
    assert!(result.scores.dof > 0);
    assert!(result.scores.p_value >= 0.0 && result.scores.p_value <= 1.0);
}

#[test]
fn shared_gain_across_two_illuminations() {
    let lambdas = [0.8, 2.0];
    let units = simulate_camera(&pmt_truth(), &lambdas, 1, 15_000, 9);
    let fitter = CameraFitter::from_names(
        "pmt_single_gaussian",
        lambdas.len(),
        false,
        "binned_nll",
        Binning::new(100, (-3.0, 8.0)).unwrap(),
        FitterConfig::default(),
    )
    .unwrap();

    let table = fitter.process(&units);
    let row = table.get(0).unwrap();
    assert!(row.success, "{:?}", row.message);
    assert_eq!(
        table.parameter_names,
        ["eped", "eped_sigma", "pe", "pe_sigma", "lambda_0", "lambda_1"]
    );
    assert!((row.value("lambda_0").unwrap() - 0.8).abs() < 0.1);
    assert!((row.value("lambda_1").unwrap() - 2.0).abs() < 0.1);
    assert!((row.value("pe").unwrap() - 1.0).abs() < 0.05);
}

#[test]
fn moment_estimate_starts_close_and_converges_to_same_minimum() {
    let units = simulate_camera(&pmt_truth(), &[1.5], 1, 20_000, 77);
    let binning = Binning::new(100, (-3.0, 6.0)).unwrap();
    let plain = CameraFitter::from_names(
        "pmt_single_gaussian",
        1,
        false,
        "binned_nll",
        binning,
        FitterConfig::default(),
    )
    .unwrap();
    let estimated = CameraFitter::from_names(
        "pmt_single_gaussian",
        1,
        false,
        "binned_nll",
        binning,
        FitterConfig {
            estimate_initial: true,
            ..FitterConfig::default()
        },
    )
    .unwrap();

    let a = plain.process(&units);
    let b = estimated.process(&units);
    let (a, b) = (a.get(0).unwrap(), b.get(0).unwrap());
    assert!(a.success && b.success);
    assert!((a.scores.cost - b.scores.cost).abs() < 2e-2);
    assert!((a.value("lambda_0").unwrap() - b.value("lambda_0").unwrap()).abs() < 2e-2);
}
