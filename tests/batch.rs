use spe_fit::data::{PmtTruth, simulate_camera};
use spe_fit::domain::{Binning, FitterConfig};
use spe_fit::error::FitError;
use spe_fit::fit::{CameraFitter, units_from_pixel_major};

fn fitter(cost: &str) -> CameraFitter {
    CameraFitter::from_names(
        "pmt_single_gaussian",
        1,
        false,
        cost,
        Binning::new(80, (-2.0, 6.0)).unwrap(),
        FitterConfig::default(),
    )
    .unwrap()
}

#[test]
fn process_and_multiprocess_agree() {
    let mut units = simulate_camera(&PmtTruth::default(), &[1.2], 5, 4_000, 31);
    // A unit with no charges inside the range still gets its row.
    units.insert(2, vec![vec![50.0; 100]]);

    let f = fitter("binned_nll");
    let sequential = f.process(&units);
    let parallel = f.multiprocess(&units, 3).unwrap();

    assert_eq!(sequential.len(), 6);
    assert_eq!(parallel.len(), 6);
    assert_eq!(sequential.parameter_names, parallel.parameter_names);
    // Bitwise comparison; NaN errors compare equal through Debug.
    assert_eq!(format!("{sequential:?}"), format!("{parallel:?}"));
    assert!(!sequential.rows[2].success);
    assert_eq!(sequential.n_failed(), 1);
    assert_eq!(f.completed(), 6);
}

#[test]
fn every_cost_runs_through_the_batch() {
    let units = simulate_camera(&PmtTruth::default(), &[1.0], 2, 4_000, 3);
    for cost in ["binned_nll", "unbinned_nll", "least_squares"] {
        let table = fitter(cost).process(&units);
        assert_eq!(table.len(), 2, "{cost}");
        for row in &table.rows {
            assert!(row.success, "{cost}: {:?}", row.message);
            assert!((row.value("pe").unwrap() - 1.0).abs() < 0.1, "{cost}");
        }
        let chi2 = table.column("chi2").unwrap();
        if cost == "unbinned_nll" {
            assert!(chi2.iter().all(|v| v.is_nan()));
        } else {
            assert!(chi2.iter().all(|v| v.is_finite()));
        }
    }
}

#[test]
fn pixel_major_arrays_feed_the_fitter() {
    // One illumination, 3 000 events, 2 pixels.
    let camera = simulate_camera(&PmtTruth::default(), &[1.0], 2, 3_000, 12);
    let events: Vec<Vec<f64>> = (0..3_000)
        .map(|e| vec![camera[0][0][e], camera[1][0][e]])
        .collect();
    let units = units_from_pixel_major(&[events]).unwrap();
    assert_eq!(units, camera);

    assert!(matches!(
        fitter("binned_nll").multiprocess(&units, 0),
        Err(FitError::InvalidWorkers)
    ));
}
