//! Glucose unit handling
//!
//! Settings and CGM readings arrive in either mg/dL or mmol/L. Everything
//! downstream of the loaders works in mg/dL.

/// mg/dL per mmol/L of glucose
pub const GLUCOSE_CONVERSION_FACTOR: f64 = 18.015_59;

/// Decimal places kept when converting settings values
pub const ROUND_PRECISION: i32 = 4;

/// Unit a glucose-valued setting is expressed in
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, derive_more::IsVariant)]
pub enum GlucoseUnit {
    #[default]
    MgDl,
    Mmol,
}

impl GlucoseUnit {
    /// Interprets a free-text unit label; anything mentioning `mmol` is mmol/L.
    ///
    /// ```
    /// # use loopstat_pipeline::units::GlucoseUnit;
    /// assert_eq!(GlucoseUnit::from_label(Some("mmol/L")), GlucoseUnit::Mmol);
    /// assert_eq!(GlucoseUnit::from_label(Some("mg/dL")), GlucoseUnit::MgDl);
    /// assert_eq!(GlucoseUnit::from_label(None), GlucoseUnit::MgDl);
    /// ```
    #[must_use]
    pub fn from_label(label: Option<&str>) -> Self {
        match label {
            Some(label) if label.contains("mmol") => Self::Mmol,
            _ => Self::MgDl,
        }
    }

    /// Converts a settings value to mg/dL, rounded to [`ROUND_PRECISION`] places.
    #[must_use]
    pub fn setting_to_mg_dl(self, value: f64) -> f64 {
        match self {
            Self::MgDl => value,
            Self::Mmol => round_to(value * GLUCOSE_CONVERSION_FACTOR, ROUND_PRECISION),
        }
    }
}

/// Converts a raw CGM reading (mmol/L) to whole mg/dL.
///
/// ```
/// # use loopstat_pipeline::units::cgm_to_mg_dl;
/// assert_eq!(cgm_to_mg_dl(5.55), 100.0);
/// ```
#[must_use]
pub fn cgm_to_mg_dl(mmol: f64) -> f64 {
    (mmol * GLUCOSE_CONVERSION_FACTOR).round_ties_even()
}

/// Rounds half-to-even at `digits` decimal places.
#[must_use]
pub fn round_to(value: f64, digits: i32) -> f64 {
    let scale = 10_f64.powi(digits);
    (value * scale).round_ties_even() / scale
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mmol_setting_conversion() {
        assert_eq!(GlucoseUnit::Mmol.setting_to_mg_dl(5.5), 99.0857);
        assert_eq!(GlucoseUnit::MgDl.setting_to_mg_dl(5.5), 5.5);
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(1.234_56, 4), 1.2346);
        assert_eq!(round_to(2.5, 0), 2.0);
    }
}
