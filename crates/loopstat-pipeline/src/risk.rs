//! Glycemic risk indices
//!
//! Low/high blood glucose risk indices (Clarke & Kovatchev, 2009) and the
//! categorical scores derived from them, plus the DKA exposure index built
//! from insulin on board.
//!
//! All functions are total. `NaN` inputs propagate into the indices, and a
//! `NaN` index scores 0 since every threshold comparison fails.
//!
//! # Examples
//!
//! ```
//! use loopstat_pipeline::risk::{blood_glucose_risk, hbgi_risk_score, lbgi_risk_score};
//!
//! let risk = blood_glucose_risk(&[60.0, 100.0, 250.0]);
//! assert!(risk.lbgi > 0.0 && risk.hbgi > 0.0);
//! assert_eq!(risk.bgri, risk.lbgi + risk.hbgi);
//! assert_eq!(lbgi_risk_score(risk.lbgi), 2);
//! assert_eq!(hbgi_risk_score(risk.hbgi), 2);
//! ```

use loopstat_stats::descriptive;

use crate::series::TICK_MINUTES;

/// IOB at steady state per U/h of scheduled basal
pub const STEADY_STATE_IOB_FACTOR: f64 = 2.111_517;

/// Symmetrized glucose scale; negative below ~112.5 mg/dL, positive above.
#[must_use]
pub fn transform(mg_dl: f64) -> f64 {
    // `f64::max` would swallow NaN
    let clamped = if mg_dl < 1.0 { 1.0 } else { mg_dl };
    1.509 * (clamped.ln().powf(1.084) - 5.381)
}

/// Risk contribution of one reading, `10 * f²`.
#[must_use]
pub fn risk_power(mg_dl: f64) -> f64 {
    10.0 * transform(mg_dl).powi(2)
}

/// Risk power split into its low and high components.
///
/// At most one component is nonzero; both are `NaN` for a `NaN` reading.
#[must_use]
pub fn risk_components(mg_dl: f64) -> (f64, f64) {
    let f = transform(mg_dl);
    if f.is_nan() {
        return (f64::NAN, f64::NAN);
    }
    let power = 10.0 * f.powi(2);
    if f < 0.0 {
        (power, 0.0)
    } else {
        (0.0, power)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BgRisk {
    pub lbgi: f64,
    pub hbgi: f64,
    pub bgri: f64,
}

/// Risk indices of a set of readings; all `NaN` for an empty set.
#[must_use]
pub fn blood_glucose_risk(mg_dl: &[f64]) -> BgRisk {
    let (low, high): (Vec<f64>, Vec<f64>) = mg_dl.iter().map(|&v| risk_components(v)).unzip();
    let lbgi = descriptive::mean(&low);
    let hbgi = descriptive::mean(&high);
    BgRisk {
        lbgi,
        hbgi,
        bgri: lbgi + hbgi,
    }
}

#[must_use]
pub fn lbgi_risk_score(lbgi: f64) -> u8 {
    match lbgi {
        v if v > 10.0 => 4,
        v if v > 5.0 => 3,
        v if v > 2.5 => 2,
        v if v > 0.0 => 1,
        _ => 0,
    }
}

#[must_use]
pub fn hbgi_risk_score(hbgi: f64) -> u8 {
    match hbgi {
        v if v > 18.0 => 4,
        v if v > 9.0 => 3,
        v if v > 4.5 => 2,
        v if v > 0.0 => 1,
        _ => 0,
    }
}

/// IOB expected from running scheduled basal `sbr` (U/h) indefinitely.
#[must_use]
pub fn steady_state_iob(sbr: f64) -> f64 {
    sbr * STEADY_STATE_IOB_FACTOR
}

/// Whether an IOB value is below half the steady state for `sbr`.
///
/// `false` when either value is `NaN`.
#[must_use]
pub fn is_low_insulin(iob: f64, sbr: f64) -> bool {
    iob < steady_state_iob(sbr) / 2.0
}

/// Hours spent below half the steady-state IOB for `sbr`.
///
/// ```
/// # use loopstat_pipeline::risk::dka_risk_hours;
/// let iob = vec![0.0; 24];
/// assert_eq!(dka_risk_hours(&iob, 1.0), 2.0);
/// ```
#[expect(clippy::cast_precision_loss)]
#[must_use]
pub fn dka_risk_hours(iob: &[f64], sbr: f64) -> f64 {
    let low_ticks = iob.iter().filter(|&&v| is_low_insulin(v, sbr)).count();
    low_ticks as f64 * TICK_MINUTES as f64 / 60.0
}

#[must_use]
pub fn dka_risk_score(hours: f64) -> u8 {
    match hours {
        h if h >= 21.0 => 4,
        h if h >= 14.0 => 3,
        h if h >= 8.0 => 2,
        h if h >= 2.0 => 1,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transform_sign() {
        assert!(transform(70.0) < 0.0);
        assert!(transform(112.0) < 0.0);
        assert!(transform(113.0) > 0.0);
        assert!(transform(250.0) > 0.0);
        // clamped below 1 mg/dL
        assert_eq!(transform(0.0), transform(1.0));
    }

    #[test]
    fn test_flat_100_is_low_risk() {
        let risk = blood_glucose_risk(&[100.0; 100]);
        assert!(lbgi_risk_score(risk.lbgi) <= 1);
        assert!(hbgi_risk_score(risk.hbgi) <= 1);
        assert_eq!(risk.hbgi, 0.0);
    }

    #[test]
    fn test_nan_propagates() {
        let risk = blood_glucose_risk(&[100.0, f64::NAN]);
        assert!(risk.lbgi.is_nan());
        assert!(risk.bgri.is_nan());
        assert_eq!(lbgi_risk_score(risk.lbgi), 0);
        assert!(blood_glucose_risk(&[]).bgri.is_nan());
    }

    #[test]
    fn test_score_boundaries() {
        assert_eq!(lbgi_risk_score(2.5), 1);
        assert_eq!(lbgi_risk_score(2.51), 2);
        assert_eq!(lbgi_risk_score(10.01), 4);
        assert_eq!(hbgi_risk_score(0.0), 0);
        assert_eq!(hbgi_risk_score(18.0), 3);
        assert_eq!(dka_risk_score(2.0), 1);
        assert_eq!(dka_risk_score(1.99), 0);
        assert_eq!(dka_risk_score(21.0), 4);
    }

    #[test]
    fn test_dka_threshold_is_half_steady_state() {
        let sbr = 1.0;
        let half = steady_state_iob(sbr) / 2.0;
        assert!(is_low_insulin(half - 1e-9, sbr));
        assert!(!is_low_insulin(half, sbr));
        assert!(!is_low_insulin(f64::NAN, sbr));
        assert_eq!(dka_risk_hours(&[half; 12], sbr), 0.0);
    }
}
