//! Maps between bounded parameter space and the unconstrained space the
//! minimizer works in.
//!
//! - two finite limits: `x = lo + (hi - lo)·σ(u)` (logistic)
//! - one finite limit: `x = lo + softplus(u)` or `x = hi - softplus(u)`
//! - no limits: identity

/// Keeps an initial value sitting exactly on a limit at a finite `u`.
const EDGE: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Transform {
    Identity,
    Lower(f64),
    Upper(f64),
    Logistic { low: f64, high: f64 },
}

impl Transform {
    pub fn for_limits((low, high): (f64, f64)) -> Self {
        match (low.is_finite(), high.is_finite()) {
            (true, true) => Transform::Logistic { low, high },
            (true, false) => Transform::Lower(low),
            (false, true) => Transform::Upper(high),
            (false, false) => Transform::Identity,
        }
    }

    /// Parameter value for an unconstrained coordinate.
    pub fn to_bounded(self, u: f64) -> f64 {
        match self {
            Transform::Identity => u,
            Transform::Lower(low) => low + safe_softplus(u),
            Transform::Upper(high) => high - safe_softplus(u),
            Transform::Logistic { low, high } => low + (high - low) * logistic(u),
        }
    }

    /// Unconstrained coordinate for a parameter value.
    pub fn to_unbounded(self, x: f64) -> f64 {
        match self {
            Transform::Identity => x,
            Transform::Lower(low) => safe_softplus_inv((x - low).max(EDGE)),
            Transform::Upper(high) => safe_softplus_inv((high - x).max(EDGE)),
            Transform::Logistic { low, high } => {
                let t = ((x - low) / (high - low)).clamp(EDGE, 1.0 - EDGE);
                (t / (1.0 - t)).ln()
            }
        }
    }

    /// `dx/du`, used to carry uncertainties back to parameter space.
    pub fn derivative(self, u: f64) -> f64 {
        match self {
            Transform::Identity => 1.0,
            Transform::Lower(_) => logistic(u),
            Transform::Upper(_) => -logistic(u),
            Transform::Logistic { low, high } => {
                let s = logistic(u);
                (high - low) * s * (1.0 - s)
            }
        }
    }
}

fn logistic(u: f64) -> f64 {
    if u >= 0.0 {
        1.0 / (1.0 + (-u).exp())
    } else {
        let e = u.exp();
        e / (1.0 + e)
    }
}

fn safe_softplus(x: f64) -> f64 {
    if x > 20.0 { x } else { x.exp().ln_1p() }
}

fn safe_softplus_inv(x: f64) -> f64 {
    if x > 20.0 { x } else { x.exp_m1().ln() }
}
