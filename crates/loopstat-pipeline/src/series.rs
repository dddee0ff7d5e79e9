//! Five-minute tick grid and regularized series

use chrono::{DateTime, DurationRound as _, TimeDelta, Utc};

/// Minutes between consecutive ticks
pub const TICK_MINUTES: i64 = 5;

/// Ticks per hour
pub const TICKS_PER_HOUR: usize = 12;

#[must_use]
pub fn tick() -> TimeDelta {
    TimeDelta::minutes(TICK_MINUTES)
}

/// Rounds `timestamp` up to the next five-minute tick (unchanged if already on one).
///
/// ```
/// # use chrono::{TimeZone, Utc};
/// # use loopstat_pipeline::series::ceil_to_tick;
/// let t = Utc.with_ymd_and_hms(2020, 1, 1, 10, 1, 0).unwrap();
/// assert_eq!(ceil_to_tick(t), Utc.with_ymd_and_hms(2020, 1, 1, 10, 5, 0).unwrap());
/// let on_tick = Utc.with_ymd_and_hms(2020, 1, 1, 10, 5, 0).unwrap();
/// assert_eq!(ceil_to_tick(on_tick), on_tick);
/// ```
#[must_use]
pub fn ceil_to_tick(timestamp: DateTime<Utc>) -> DateTime<Utc> {
    // rounding only fails outside the nanosecond-representable range (years 1677..2262)
    timestamp.duration_round_up(tick()).unwrap_or(timestamp)
}

/// A contiguous run of ticks starting at `start`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickRange {
    start: DateTime<Utc>,
    len: usize,
}

impl TickRange {
    #[must_use]
    pub fn new(start: DateTime<Utc>, len: usize) -> Self {
        Self { start, len }
    }

    /// Ticks from `start` through `end`, both inclusive.
    #[must_use]
    pub fn inclusive(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        let len = usize::try_from((end - start).num_minutes() / TICK_MINUTES + 1).unwrap_or(0);
        Self { start, len }
    }

    #[must_use]
    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    /// The last tick of the range.
    #[must_use]
    pub fn end(&self) -> DateTime<Utc> {
        self.tick(self.len.saturating_sub(1))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[expect(clippy::cast_possible_wrap)]
    #[must_use]
    pub fn tick(&self, index: usize) -> DateTime<Utc> {
        self.start + TimeDelta::minutes(TICK_MINUTES * index as i64)
    }

    /// Position of `timestamp` in the range, if it is one of its ticks.
    #[must_use]
    pub fn index_of(&self, timestamp: DateTime<Utc>) -> Option<usize> {
        let offset = timestamp - self.start;
        if offset < TimeDelta::zero() || offset.num_seconds() % (TICK_MINUTES * 60) != 0 {
            return None;
        }
        usize::try_from(offset.num_minutes() / TICK_MINUTES)
            .ok()
            .filter(|&i| i < self.len)
    }

    pub fn ticks(&self) -> impl Iterator<Item = DateTime<Utc>> + '_ {
        (0..self.len).map(|i| self.tick(i))
    }
}

/// Values at consecutive ticks; `None` marks a tick without data
#[derive(Debug, Clone, PartialEq)]
pub struct RegularizedSeries {
    range: TickRange,
    values: Vec<Option<f64>>,
}

impl RegularizedSeries {
    /// # Panics
    ///
    /// Panics if `values` does not cover `range` exactly.
    #[must_use]
    pub fn new(range: TickRange, values: Vec<Option<f64>>) -> Self {
        assert_eq!(range.len(), values.len(), "series must cover its range");
        Self { range, values }
    }

    #[must_use]
    pub fn unset(range: TickRange) -> Self {
        Self::new(range, vec![None; range.len()])
    }

    #[must_use]
    pub fn range(&self) -> TickRange {
        self.range
    }

    #[must_use]
    pub fn values(&self) -> &[Option<f64>] {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut [Option<f64>] {
        &mut self.values
    }

    /// Value at `timestamp`; `None` if unset or outside the series.
    #[must_use]
    pub fn get(&self, timestamp: DateTime<Utc>) -> Option<f64> {
        self.range.index_of(timestamp).and_then(|i| self.values[i])
    }

    /// The part of the series from `start` onwards.
    #[must_use]
    pub fn since(&self, start: DateTime<Utc>) -> Self {
        let skip = self.range.index_of(start).unwrap_or(0);
        let range = TickRange::new(self.range.tick(skip), self.range.len() - skip);
        Self::new(range, self.values[skip..].to_vec())
    }

    /// Combines two series on the same range tick by tick.
    ///
    /// # Panics
    ///
    /// Panics if the ranges differ.
    #[must_use]
    pub fn zip_with<F>(&self, other: &Self, mut f: F) -> Self
    where
        F: FnMut(Option<f64>, Option<f64>) -> Option<f64>,
    {
        assert_eq!(self.range, other.range, "series ranges must match");
        let values = self
            .values
            .iter()
            .zip(&other.values)
            .map(|(&a, &b)| f(a, b))
            .collect();
        Self::new(self.range, values)
    }
}

/// Carries each value forward over at most `limit` following unset positions.
///
/// ```
/// # use loopstat_pipeline::series::forward_fill;
/// let mut values = [Some(1.0), None, None, None, Some(2.0), None];
/// forward_fill(&mut values, 2);
/// assert_eq!(values, [Some(1.0), Some(1.0), Some(1.0), None, Some(2.0), Some(2.0)]);
/// ```
pub fn forward_fill(values: &mut [Option<f64>], limit: usize) {
    let mut last = None;
    let mut filled = 0;
    for value in values {
        match *value {
            Some(v) => {
                last = Some(v);
                filled = 0;
            }
            None if filled < limit => {
                *value = last;
                if last.is_some() {
                    filled += 1;
                }
            }
            None => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone as _;

    use super::*;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2020, 3, 1, h, m, s).unwrap()
    }

    #[test]
    fn test_ceil_rounds_up_partial_ticks() {
        assert_eq!(ceil_to_tick(at(10, 0, 1)), at(10, 5, 0));
        assert_eq!(ceil_to_tick(at(10, 4, 59)), at(10, 5, 0));
        assert_eq!(ceil_to_tick(at(23, 58, 0)), Utc.with_ymd_and_hms(2020, 3, 2, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_tick_range_index() {
        let range = TickRange::inclusive(at(0, 0, 0), at(1, 0, 0));
        assert_eq!(range.len(), 13);
        assert_eq!(range.end(), at(1, 0, 0));
        assert_eq!(range.index_of(at(0, 35, 0)), Some(7));
        assert_eq!(range.index_of(at(0, 36, 0)), None);
        assert_eq!(range.index_of(at(1, 5, 0)), None);
        assert_eq!(range.index_of(Utc.with_ymd_and_hms(2020, 2, 29, 23, 55, 0).unwrap()), None);
    }

    #[test]
    fn test_since_truncates_front() {
        let range = TickRange::new(at(0, 0, 0), 4);
        let series = RegularizedSeries::new(range, vec![Some(1.0), Some(2.0), None, Some(4.0)]);
        let tail = series.since(at(0, 10, 0));
        assert_eq!(tail.range().start(), at(0, 10, 0));
        assert_eq!(tail.values(), &[None, Some(4.0)]);
        assert_eq!(tail.get(at(0, 15, 0)), Some(4.0));
    }

    #[test]
    fn test_forward_fill_limit_resets_on_value() {
        let mut values = vec![None, Some(1.0), None, Some(2.0), None, None, None];
        forward_fill(&mut values, 2);
        assert_eq!(
            values,
            vec![None, Some(1.0), Some(1.0), Some(2.0), Some(2.0), Some(2.0), None]
        );
    }
}
