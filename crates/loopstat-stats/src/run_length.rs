//! Run-length encoding
//!
//! Collapses a sequence into maximal runs of equal consecutive values. The
//! pipeline uses it to find sustained glycemic excursions: a boolean
//! "in range" series is encoded, and runs of `true` that are long enough
//! count as events.
//!
//! # Examples
//!
//! ```
//! use loopstat_stats::run_length::{Run, run_lengths};
//!
//! let runs = run_lengths(&[1, 1, 2, 2, 2, 1]);
//! assert_eq!(
//!     runs,
//!     vec![
//!         Run { value: 1, start: 0, len: 2 },
//!         Run { value: 2, start: 2, len: 3 },
//!         Run { value: 1, start: 5, len: 1 },
//!     ]
//! );
//! ```

/// A maximal run of equal consecutive values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Run<T> {
    /// The repeated value
    pub value: T,
    /// Index of the first element of the run
    pub start: usize,
    /// Number of elements in the run (always at least 1)
    pub len: usize,
}

/// Encodes `values` as a list of runs, in order.
///
/// Returns an empty vector for empty input.
#[must_use]
pub fn run_lengths<T>(values: &[T]) -> Vec<Run<T>>
where
    T: PartialEq + Copy,
{
    let mut runs: Vec<Run<T>> = Vec::new();
    for (i, &value) in values.iter().enumerate() {
        match runs.last_mut() {
            Some(run) if run.value == value => run.len += 1,
            _ => runs.push(Run {
                value,
                start: i,
                len: 1,
            }),
        }
    }
    runs
}

/// Returns the runs of `true` that are at least `min_len` long.
///
/// ```
/// # use loopstat_stats::run_length::true_runs_at_least;
/// let flags = [false, true, true, false, true, true, true, false];
/// let events = true_runs_at_least(&flags, 3);
/// assert_eq!(events.len(), 1);
/// assert_eq!(events[0].start, 4);
/// ```
#[must_use]
pub fn true_runs_at_least(flags: &[bool], min_len: usize) -> Vec<Run<bool>> {
    run_lengths(flags)
        .into_iter()
        .filter(|run| run.value && run.len >= min_len)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_values() {
        let runs = run_lengths::<bool>(&[]);
        assert!(runs.is_empty());
    }

    #[test]
    fn test_single_run() {
        let runs = run_lengths(&[true; 5]);
        assert_eq!(
            runs,
            vec![Run {
                value: true,
                start: 0,
                len: 5
            }]
        );
    }

    #[test]
    fn test_run_lengths_cover_input() {
        let values = [0, 0, 1, 0, 2, 2, 2, 2, 0];
        let runs = run_lengths(&values);
        assert_eq!(runs.iter().map(|r| r.len).sum::<usize>(), values.len());
        for pair in runs.windows(2) {
            assert_eq!(pair[0].start + pair[0].len, pair[1].start);
            assert_ne!(pair[0].value, pair[1].value);
        }
    }

    #[test]
    fn test_exactly_three_is_an_event() {
        let flags = [false, false, true, true, true, false, false];
        let events = true_runs_at_least(&flags, 3);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].start, 2);
        assert_eq!(events[0].len * 5, 15);
    }

    #[test]
    fn test_two_is_not_an_event() {
        let flags = [false, true, true, false];
        assert!(true_runs_at_least(&flags, 3).is_empty());
    }

    #[test]
    fn test_run_at_boundaries() {
        let flags = [true, true, true, false, true, true, true, true];
        let events = true_runs_at_least(&flags, 3);
        assert_eq!(events.len(), 2);
        assert_eq!((events[0].start, events[0].len), (0, 3));
        assert_eq!((events[1].start, events[1].len), (4, 4));
    }
}
