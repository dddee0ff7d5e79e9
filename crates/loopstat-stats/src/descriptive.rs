//! Descriptive statistics over `f64` samples.
//!
//! The free functions return `f64::NAN` for an empty input instead of
//! failing, so they can be used directly as rolling-window aggregators.
//! Non-positive values make the geometric measures `NaN` (through `ln`);
//! callers that need a defined result must filter beforehand.

/// Descriptive statistics summarizing a dataset.
///
/// This structure contains common measures of central tendency and
/// dispersion for a dataset of `f64` values.
#[derive(Debug, Clone)]
pub struct DescriptiveStats {
    /// The number of values in the dataset.
    pub count: usize,
    /// The minimum value in the dataset.
    pub min: f64,
    /// The maximum value in the dataset.
    pub max: f64,
    /// The arithmetic mean (average) of the dataset.
    pub mean: f64,
    /// The median value of the dataset (midpoint average for even counts).
    pub median: f64,
    /// The population standard deviation (divisor `n`).
    pub std_dev: f64,
    /// The geometric mean, `exp(mean(ln v))`.
    pub geometric_mean: f64,
    /// The geometric standard deviation, `exp(std(ln v))`.
    pub geometric_std_dev: f64,
}

impl DescriptiveStats {
    /// Computes descriptive statistics from unsorted values.
    ///
    /// This method will sort the values internally before computing statistics.
    ///
    /// # Returns
    ///
    /// * `Some(DescriptiveStats)` - if the dataset contains at least one value
    /// * `None` - if the dataset is empty
    ///
    /// # Examples
    ///
    /// ```
    /// # use loopstat_stats::descriptive::DescriptiveStats;
    /// let values = [5.0, 2.0, 4.0, 1.0, 3.0];
    /// let stats = DescriptiveStats::new(values).unwrap();
    /// assert_eq!(stats.min, 1.0);
    /// assert_eq!(stats.max, 5.0);
    /// assert_eq!(stats.mean, 3.0);
    /// assert_eq!(stats.median, 3.0);
    /// ```
    #[must_use]
    pub fn new<I>(values: I) -> Option<Self>
    where
        I: IntoIterator<Item = f64>,
    {
        let mut values = values.into_iter().collect::<Vec<_>>();
        values.sort_by(f64::total_cmp);
        Self::from_sorted(&values)
    }

    /// Computes descriptive statistics from pre-sorted values.
    ///
    /// # Panics
    ///
    /// Panics if `sorted_values` is not sorted in ascending order.
    #[must_use]
    pub fn from_sorted(sorted_values: &[f64]) -> Option<Self> {
        assert!(
            sorted_values.is_sorted_by(|a, b| a <= b),
            "values must be sorted in ascending order"
        );

        let min = *sorted_values.first()?;
        let max = *sorted_values.last()?;

        Some(Self {
            count: sorted_values.len(),
            min,
            max,
            mean: mean(sorted_values),
            median: median_of_sorted(sorted_values),
            std_dev: population_std(sorted_values),
            geometric_mean: geometric_mean(sorted_values),
            geometric_std_dev: geometric_std(sorted_values),
        })
    }
}

/// Arithmetic mean; `NaN` for an empty slice.
#[expect(clippy::cast_precision_loss)]
#[must_use]
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Median of unsorted values; `NaN` for an empty slice.
///
/// ```
/// # use loopstat_stats::descriptive::median;
/// assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), 2.5);
/// ```
#[must_use]
pub fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    median_of_sorted(&sorted)
}

fn median_of_sorted(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    match n {
        0 => f64::NAN,
        _ if n % 2 == 1 => sorted[n / 2],
        _ => f64::midpoint(sorted[n / 2 - 1], sorted[n / 2]),
    }
}

/// Population standard deviation (divisor `n`).
#[expect(clippy::cast_precision_loss)]
#[must_use]
pub fn population_std(values: &[f64]) -> f64 {
    let m = mean(values);
    let ss = values.iter().map(|v| (v - m).powi(2)).sum::<f64>();
    (ss / values.len() as f64).sqrt()
}

/// Sample standard deviation (divisor `n - 1`); `NaN` below two values.
#[expect(clippy::cast_precision_loss)]
#[must_use]
pub fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return f64::NAN;
    }
    let m = mean(values);
    let ss = values.iter().map(|v| (v - m).powi(2)).sum::<f64>();
    (ss / (values.len() - 1) as f64).sqrt()
}

/// Geometric mean, `exp(mean(ln v))`.
///
/// ```
/// # use loopstat_stats::descriptive::geometric_mean;
/// let g = geometric_mean(&[2.0, 8.0]);
/// assert!((g - 4.0).abs() < 1e-12);
/// ```
#[must_use]
pub fn geometric_mean(values: &[f64]) -> f64 {
    let logs = values.iter().map(|v| v.ln()).collect::<Vec<_>>();
    mean(&logs).exp()
}

/// Geometric standard deviation, `exp(std(ln v))` with divisor `n`.
#[must_use]
pub fn geometric_std(values: &[f64]) -> f64 {
    let logs = values.iter().map(|v| v.ln()).collect::<Vec<_>>();
    population_std(&logs).exp()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_values() {
        assert!(DescriptiveStats::new([]).is_none());
        assert!(mean(&[]).is_nan());
        assert!(median(&[]).is_nan());
    }

    #[test]
    fn test_even_median_interpolates() {
        let stats = DescriptiveStats::new([1.0, 2.0, 3.0, 10.0]).unwrap();
        assert_eq!(stats.median, 2.5);
        assert_eq!(stats.mean, 4.0);
    }

    #[test]
    fn test_std_divisors() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert!((population_std(&values) - 2.0).abs() < 1e-12);
        assert!((sample_std(&values) - 2.138_089_935_299_395).abs() < 1e-12);
        assert!(sample_std(&[1.0]).is_nan());
    }

    #[test]
    fn test_geometric_mean_of_constant_is_identity() {
        for v in [0.05, 0.8, 1.0, 45.0, 180.0] {
            let values = vec![v; 288];
            assert!((geometric_mean(&values) - v).abs() < 1e-9 * v);
            assert!((geometric_std(&values) - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_geometric_mean_non_positive_is_undefined() {
        // ln(0) is -inf, which collapses the mean to zero
        assert_eq!(geometric_mean(&[1.0, 0.0]), 0.0);
        assert!(geometric_mean(&[1.0, -1.0]).is_nan());
    }
}
