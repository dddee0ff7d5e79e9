//! Rolling window aggregation over series with missing values
//!
//! A rolling aggregation library conventionally looks *backward*: the value
//! at index `t` summarizes `[t - len + 1, t]`. The pipeline needs the value
//! at `t` to summarize the *forward* window `[t, t + len - 1]` instead.
//! [`RollingWindow::forward`] gets there in two explicit steps:
//!
//! 1. [`RollingWindow::backward`] computes the conventional backward
//!    aggregate, honoring the minimum-coverage rule
//! 2. [`shift_to_window_start`] moves every value `len - 1` positions
//!    earlier, so it lands on the index where its window begins
//!
//! The last `len - 1` positions of a forward result are always unset, since
//! their forward window runs past the end of the series.
//!
//! # Coverage rule
//!
//! Missing values (`None`) are skipped by the aggregator. A window with fewer
//! than `min_periods` present values yields `None`. An aggregate of `NaN` is
//! also reported as `None`.

/// Window geometry for a rolling aggregation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RollingWindow {
    len: usize,
    min_periods: usize,
}

impl RollingWindow {
    /// Creates a window of `len` positions requiring `min_periods` present values.
    ///
    /// # Panics
    ///
    /// Panics if `len` is zero.
    #[must_use]
    pub fn new(len: usize, min_periods: usize) -> Self {
        assert!(len > 0, "rolling window length must be positive");
        Self { len, min_periods }
    }

    /// Creates a window requiring `floor(len * coverage)` present values.
    ///
    /// ```
    /// # use loopstat_stats::rolling::RollingWindow;
    /// let window = RollingWindow::with_coverage(12, 0.7);
    /// assert_eq!(window.min_periods(), 8);
    /// ```
    #[expect(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    #[must_use]
    pub fn with_coverage(len: usize, coverage: f64) -> Self {
        let min_periods = (len as f64 * coverage.clamp(0.0, 1.0)).floor() as usize;
        Self::new(len, min_periods)
    }

    /// Number of positions covered by one window.
    #[must_use]
    pub fn size(&self) -> usize {
        self.len
    }

    /// Minimum number of present values for a defined result.
    #[must_use]
    pub fn min_periods(&self) -> usize {
        self.min_periods
    }

    /// Backward-looking aggregate: position `t` summarizes `[t - len + 1, t]`.
    ///
    /// Windows near the start are truncated at index 0, and are defined as
    /// long as they meet the coverage rule.
    pub fn backward<F>(&self, values: &[Option<f64>], mut aggregate: F) -> Vec<Option<f64>>
    where
        F: FnMut(&[f64]) -> f64,
    {
        let mut present = Vec::with_capacity(self.len);
        (0..values.len())
            .map(|t| {
                let start = (t + 1).saturating_sub(self.len);
                present.clear();
                present.extend(values[start..=t].iter().flatten().copied());
                if present.len() < self.min_periods {
                    return None;
                }
                Some(aggregate(&present)).filter(|v| !v.is_nan())
            })
            .collect()
    }

    /// Forward-looking aggregate: position `t` summarizes `[t, t + len - 1]`.
    ///
    /// Equivalent to [`backward`](Self::backward) followed by
    /// [`shift_to_window_start`].
    pub fn forward<F>(&self, values: &[Option<f64>], aggregate: F) -> Vec<Option<f64>>
    where
        F: FnMut(&[f64]) -> f64,
    {
        shift_to_window_start(self.backward(values, aggregate), self.len)
    }
}

/// Moves each value of a backward rolling column `window_len - 1` positions
/// earlier; the vacated tail is unset.
///
/// ```
/// # use loopstat_stats::rolling::shift_to_window_start;
/// let shifted = shift_to_window_start(vec![None, Some(1.0), Some(2.0)], 2);
/// assert_eq!(shifted, vec![Some(1.0), Some(2.0), None]);
/// ```
#[must_use]
pub fn shift_to_window_start(column: Vec<Option<f64>>, window_len: usize) -> Vec<Option<f64>> {
    let shift = window_len.saturating_sub(1);
    let n = column.len();
    let mut shifted = column.into_iter().skip(shift).collect::<Vec<_>>();
    shifted.resize(n, None);
    shifted
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::descriptive;

    fn brute_force_forward_mean(values: &[f64], t: usize, len: usize) -> Option<f64> {
        let window = values.get(t..t + len)?;
        Some(window.iter().sum::<f64>() / window.len() as f64)
    }

    #[test]
    fn test_backward_coverage_rule() {
        let values = [Some(1.0), None, None, Some(4.0)];
        let window = RollingWindow::new(3, 2);
        let sums = window.backward(&values, |v| v.iter().sum());
        assert_eq!(sums, vec![None, None, None, None]);

        let window = RollingWindow::new(4, 2);
        let sums = window.backward(&values, |v| v.iter().sum());
        assert_eq!(sums, vec![None, None, None, Some(5.0)]);
    }

    #[test]
    fn test_forward_tail_is_unset() {
        let values = vec![Some(1.0); 10];
        let window = RollingWindow::new(4, 4);
        let counts = window.forward(&values, |v| v.len() as f64);
        assert!(counts[..7].iter().all(|c| *c == Some(4.0)));
        assert!(counts[7..].iter().all(Option::is_none));
    }

    #[test]
    fn test_nan_aggregate_is_unset() {
        let values = [Some(1.0), Some(2.0)];
        let window = RollingWindow::new(1, 1);
        let std = window.backward(&values, descriptive::sample_std);
        assert_eq!(std, vec![None, None]);
    }

    #[test]
    fn test_shift_of_window_one_is_identity() {
        let column = vec![Some(1.0), None, Some(3.0)];
        assert_eq!(shift_to_window_start(column.clone(), 1), column);
    }

    proptest! {
        #[test]
        fn forward_mean_matches_brute_force(
            len in 1_usize..30,
            seed_values in prop::collection::vec(40.0_f64..400.0, 150),
        ) {
            let series = &seed_values[..(5 * len).min(seed_values.len())];
            let values = series.iter().copied().map(Some).collect::<Vec<_>>();
            let window = RollingWindow::new(len, len);
            let means = window.forward(&values, descriptive::mean);
            for (t, actual) in means.iter().enumerate() {
                let expected = brute_force_forward_mean(series, t, len);
                match (actual, expected) {
                    (Some(a), Some(e)) => prop_assert!((a - e).abs() <= 1e-9 * e.abs()),
                    (None, None) => {}
                    _ => prop_assert!(false, "mismatch at {t}: {actual:?} vs {expected:?}"),
                }
            }
        }
    }
}
