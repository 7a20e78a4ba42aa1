//! Numerically stable probability primitives for the SPE spectra.
//!
//! The spectra sum many Gaussian peaks weighted by discrete photoelectron
//! probabilities. For large peak numbers the textbook forms
//! (`λ^k e^{-λ} / k!`, `n! / (k! (n-k)!)`) overflow long before the result
//! does, so everything is evaluated in log space via `lnΓ`.

use statrs::function::gamma::ln_gamma;

/// `sqrt(2π)`.
pub const SQRT_2PI: f64 = 2.506_628_274_631_000_2;

/// `x * ln(y)`, defined as `0` when `x == 0` (even for `y == 0`).
pub fn xlogy(x: f64, y: f64) -> f64 {
    if x == 0.0 && !y.is_nan() {
        0.0
    } else {
        x * y.ln()
    }
}

/// Poisson log-PMF `ln P(k; μ)`.
pub fn poisson_ln_pmf(k: usize, mu: f64) -> f64 {
    let k = k as f64;
    xlogy(k, mu) - ln_gamma(k + 1.0) - mu
}

/// Poisson PMF `P(k; μ)`.
pub fn poisson_pmf(k: usize, mu: f64) -> f64 {
    poisson_ln_pmf(k, mu).exp()
}

/// `ln C(n, k)`; `-inf` when `k > n`.
pub fn ln_binom(n: usize, k: usize) -> f64 {
    if k > n {
        return f64::NEG_INFINITY;
    }
    let (n, k) = (n as f64, k as f64);
    ln_gamma(n + 1.0) - ln_gamma(k + 1.0) - ln_gamma(n - k + 1.0)
}

/// Normal PDF. A non-positive (or NaN) sigma yields `0`.
pub fn normal_pdf(x: f64, mean: f64, sigma: f64) -> f64 {
    if !(sigma > 0.0) {
        return 0.0;
    }
    let u = (x - mean) / sigma;
    (-0.5 * u * u).exp() / (SQRT_2PI * sigma)
}

/// Accumulate `weight * N(x; mean, sigma)` into `out` for every `x`.
pub fn add_weighted_normal(x: &[f64], mean: f64, sigma: f64, weight: f64, out: &mut [f64]) {
    if weight == 0.0 || !(sigma > 0.0) {
        return;
    }
    let norm = weight / (SQRT_2PI * sigma);
    let inv_sigma = 1.0 / sigma;
    for (o, &xi) in out.iter_mut().zip(x) {
        let u = (xi - mean) * inv_sigma;
        *o += norm * (-0.5 * u * u).exp();
    }
}

/// Trapezoid integral of `y(x)` on a monotone grid.
pub fn trapezoid(x: &[f64], y: &[f64]) -> f64 {
    x.windows(2)
        .zip(y.windows(2))
        .map(|(xs, ys)| 0.5 * (xs[1] - xs[0]) * (ys[0] + ys[1]))
        .sum()
}

/// Evenly spaced grid over `[start, stop]` (inclusive, `n >= 2`).
pub fn linspace(start: f64, stop: f64, n: usize) -> Vec<f64> {
    if n < 2 {
        return vec![start; n];
    }
    let step = (stop - start) / (n as f64 - 1.0);
    (0..n).map(|i| start + step * i as f64).collect()
}

/// Mean and (population) variance of a sample, `None` when empty.
pub fn mean_variance(values: &[f64]) -> Option<(f64, f64)> {
    if values.is_empty() {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
    Some((mean, var))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn xlogy_zero_times_log_zero_is_zero() {
        assert_eq!(xlogy(0.0, 0.0), 0.0);
        assert_eq!(xlogy(0.0, -1.0), 0.0);
        assert!(xlogy(0.0, f64::NAN).is_nan());
        assert_relative_eq!(xlogy(2.0, 3.0), 2.0 * 3.0_f64.ln());
    }

    #[test]
    fn poisson_pmf_sums_to_one_and_survives_large_k() {
        let total: f64 = (0..200).map(|k| poisson_pmf(k, 4.2)).sum();
        assert_relative_eq!(total, 1.0, epsilon = 1e-12);
        let far = poisson_pmf(500, 3.0);
        assert!(far.is_finite() && far >= 0.0);
    }

    #[test]
    fn poisson_pmf_with_zero_mean() {
        assert_eq!(poisson_pmf(0, 0.0), 1.0);
        assert_eq!(poisson_pmf(3, 0.0), 0.0);
    }

    #[test]
    fn ln_binom_matches_small_cases() {
        assert_relative_eq!(ln_binom(5, 2).exp(), 10.0, epsilon = 1e-9);
        assert_relative_eq!(ln_binom(0, 0), 0.0, epsilon = 1e-12);
        assert_eq!(ln_binom(2, 3), f64::NEG_INFINITY);
        assert!(ln_binom(300, 150).is_finite());
    }

    #[test]
    fn normal_pdf_integrates_to_one() {
        let x = linspace(-10.0, 10.0, 4001);
        let y: Vec<f64> = x.iter().map(|&v| normal_pdf(v, 0.5, 1.3)).collect();
        assert_relative_eq!(trapezoid(&x, &y), 1.0, epsilon = 1e-9);
        assert_eq!(normal_pdf(0.0, 0.0, 0.0), 0.0);
    }

    #[test]
    fn weighted_normal_accumulates() {
        let x = [0.0, 1.0];
        let mut out = [1.0, 1.0];
        add_weighted_normal(&x, 0.0, 1.0, 2.0, &mut out);
        assert_relative_eq!(out[0], 1.0 + 2.0 * normal_pdf(0.0, 0.0, 1.0));
        assert_relative_eq!(out[1], 1.0 + 2.0 * normal_pdf(1.0, 0.0, 1.0));
    }

    #[test]
    fn mean_variance_of_constant_sample() {
        assert_eq!(mean_variance(&[]), None);
        let (m, v) = mean_variance(&[2.0, 2.0, 2.0]).unwrap();
        assert_relative_eq!(m, 2.0);
        assert_eq!(v, 0.0);
    }
}
