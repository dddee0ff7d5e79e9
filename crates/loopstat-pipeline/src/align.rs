//! Event deduplication and alignment onto the tick grid
//!
//! Event timestamps are irregular; every stream is rounded up to the
//! five-minute grid, deduplicated, and placed into a [`RegularizedSeries`].
//!
//! # Deduplication
//!
//! Exports frequently contain the same event from several uploads. Events
//! sharing a key are sorted by `(key ascending, upload id descending)` and the
//! first of each key is kept, so the lexicographically greatest upload id
//! wins. Basal and CGM events share a key when they round to the same tick;
//! boluses and carbs only when their exact instants match, since several
//! doses within five minutes are all real and are summed per tick instead.
//!
//! # Per-stream policy
//!
//! | stream | value at a tick | gaps |
//! |---|---|---|
//! | basal | set rate (U/h) and delivered pulse (rate / 12) | held forward at most `fill_limit` ticks |
//! | bolus | sum of doses (U) | unset |
//! | carb | sum of net carbs (g), absorption time of the last entry | unset |
//! | cgm | reading converted to whole mg/dL | unset |

use chrono::{DateTime, Utc};

use crate::{
    event::{EventKind, RawEvent},
    series::{RegularizedSeries, TickRange, TICKS_PER_HOUR, ceil_to_tick, forward_fill},
    units,
};

/// What two events must share to be considered duplicates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupKey {
    /// The rounded-up tick
    Tick,
    /// The exact recorded instant
    Instant,
}

impl DedupKey {
    fn of(self, event: &RawEvent) -> DateTime<Utc> {
        match self {
            Self::Tick => ceil_to_tick(event.timestamp),
            Self::Instant => event.timestamp,
        }
    }
}

/// Events surviving deduplication, in key order
#[derive(Debug, Clone)]
pub struct Deduplicated<'a> {
    pub kept: Vec<&'a RawEvent>,
    pub dropped: usize,
}

/// Keeps one event per key, preferring the greatest upload id.
///
/// ```
/// # use chrono::{TimeZone, Utc};
/// # use loopstat_pipeline::{align::{DedupKey, deduplicate}, event::{EventKind, RawEvent}};
/// let t = Utc.with_ymd_and_hms(2020, 1, 1, 0, 2, 0).unwrap();
/// let events = [
///     RawEvent::new(t, EventKind::Cgm, Some(5.0), "A"),
///     RawEvent::new(t, EventKind::Cgm, Some(6.0), "B"),
/// ];
/// let result = deduplicate(&events, DedupKey::Tick);
/// assert_eq!(result.kept.len(), 1);
/// assert_eq!(result.kept[0].upload_id, "B");
/// assert_eq!(result.dropped, 1);
/// ```
pub fn deduplicate<'a, I>(events: I, key: DedupKey) -> Deduplicated<'a>
where
    I: IntoIterator<Item = &'a RawEvent>,
{
    let mut kept = events.into_iter().collect::<Vec<_>>();
    let total = kept.len();
    kept.sort_by(|a, b| {
        key.of(a)
            .cmp(&key.of(b))
            .then_with(|| b.upload_id.cmp(&a.upload_id))
    });
    kept.dedup_by_key(|event| key.of(event));
    Deduplicated {
        dropped: total - kept.len(),
        kept,
    }
}

fn events_of(events: &[RawEvent], kind: EventKind) -> impl Iterator<Item = &RawEvent> {
    events.iter().filter(move |event| event.kind == kind)
}

/// Adds `amount` to the tick of `timestamp`, ignoring ticks outside `series`.
fn accumulate(series: &mut RegularizedSeries, timestamp: DateTime<Utc>, amount: f64) {
    if let Some(i) = series.range().index_of(ceil_to_tick(timestamp)) {
        let slot = &mut series.values_mut()[i];
        *slot = Some(slot.unwrap_or(0.0) + amount);
    }
}

/// A single aligned stream
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedStream {
    pub series: RegularizedSeries,
    pub deduplicated: usize,
}

/// Basal rate as set on the pump and the insulin it delivers per tick
#[derive(Debug, Clone, PartialEq)]
pub struct BasalAlignment {
    pub set_rate: RegularizedSeries,
    pub pulse_delivered: RegularizedSeries,
    pub deduplicated: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CarbAlignment {
    pub carbs: RegularizedSeries,
    pub absorption_minutes: RegularizedSeries,
    pub deduplicated: usize,
}

/// Aligns basal rate changes; each rate holds until superseded, for at most
/// `fill_limit` ticks.
///
/// Returns `None` when there are no basal events.
#[expect(clippy::cast_precision_loss)]
#[must_use]
pub fn align_basal(events: &[RawEvent], range: TickRange, fill_limit: usize) -> Option<BasalAlignment> {
    let dedup = deduplicate(events_of(events, EventKind::Basal), DedupKey::Tick);
    if dedup.kept.is_empty() {
        return None;
    }
    let mut set_rate = RegularizedSeries::unset(range);
    for event in &dedup.kept {
        if let (Some(i), Some(rate)) = (range.index_of(ceil_to_tick(event.timestamp)), event.value) {
            set_rate.values_mut()[i] = Some(rate);
        }
    }
    let mut pulse_delivered = RegularizedSeries::new(
        range,
        set_rate
            .values()
            .iter()
            .map(|rate| rate.map(|r| r / TICKS_PER_HOUR as f64))
            .collect(),
    );
    forward_fill(set_rate.values_mut(), fill_limit);
    forward_fill(pulse_delivered.values_mut(), fill_limit);
    Some(BasalAlignment {
        set_rate,
        pulse_delivered,
        deduplicated: dedup.dropped,
    })
}

/// Aligns bolus doses, summing every dose that lands on the same tick.
#[must_use]
pub fn align_bolus(events: &[RawEvent], range: TickRange) -> Option<AlignedStream> {
    let dedup = deduplicate(events_of(events, EventKind::Bolus), DedupKey::Instant);
    if dedup.kept.is_empty() {
        return None;
    }
    let mut series = RegularizedSeries::unset(range);
    for event in &dedup.kept {
        if let Some(amount) = event.value {
            accumulate(&mut series, event.timestamp, amount);
        }
    }
    Some(AlignedStream {
        series,
        deduplicated: dedup.dropped,
    })
}

/// Aligns carb entries, summing grams per tick.
#[must_use]
pub fn align_carbs(events: &[RawEvent], range: TickRange) -> Option<CarbAlignment> {
    let dedup = deduplicate(events_of(events, EventKind::Carb), DedupKey::Instant);
    if dedup.kept.is_empty() {
        return None;
    }
    let mut carbs = RegularizedSeries::unset(range);
    let mut absorption_minutes = RegularizedSeries::unset(range);
    for event in &dedup.kept {
        if let Some(grams) = event.carbs.grams() {
            accumulate(&mut carbs, event.timestamp, grams);
        }
        // kept events are in time order, so the last write wins
        if let Some(i) = range.index_of(ceil_to_tick(event.timestamp)) {
            absorption_minutes.values_mut()[i] = event.carbs.absorption_minutes;
        }
    }
    Some(CarbAlignment {
        carbs,
        absorption_minutes,
        deduplicated: dedup.dropped,
    })
}

/// Aligns CGM readings, converted to whole mg/dL.
#[must_use]
pub fn align_cgm(events: &[RawEvent], range: TickRange) -> Option<AlignedStream> {
    let dedup = deduplicate(events_of(events, EventKind::Cgm), DedupKey::Tick);
    if dedup.kept.is_empty() {
        return None;
    }
    let mut series = RegularizedSeries::unset(range);
    for event in &dedup.kept {
        if let (Some(i), Some(mmol)) = (range.index_of(ceil_to_tick(event.timestamp)), event.value) {
            series.values_mut()[i] = Some(units::cgm_to_mg_dl(mmol));
        }
    }
    Some(AlignedStream {
        series,
        deduplicated: dedup.dropped,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{TimeDelta, TimeZone as _};

    use super::*;
    use crate::event::CarbPayload;

    fn at(minutes: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2020, 6, 1, 0, 0, 0).unwrap() + TimeDelta::minutes(minutes)
    }

    fn range(len: usize) -> TickRange {
        TickRange::new(at(0), len)
    }

    fn event(kind: EventKind, minutes: i64, value: f64, upload: &str) -> RawEvent {
        RawEvent::new(at(minutes), kind, Some(value), upload)
    }

    #[test]
    fn test_dedup_prefers_greater_upload_id() {
        for order in [["A", "B"], ["B", "A"]] {
            let events = order.map(|id| event(EventKind::Cgm, 2, 5.0, id));
            let result = deduplicate(&events, DedupKey::Tick);
            assert_eq!(result.kept.len(), 1);
            assert_eq!(result.kept[0].upload_id, "B");
        }
    }

    #[test]
    fn test_dedup_count_is_input_minus_distinct_ticks() {
        let events = [
            event(EventKind::Cgm, 1, 5.0, "A"),
            event(EventKind::Cgm, 3, 5.1, "B"),
            event(EventKind::Cgm, 5, 5.2, "A"),
            event(EventKind::Cgm, 6, 5.3, "C"),
            event(EventKind::Cgm, 20, 5.4, "A"),
        ];
        // ticks: 5, 5, 5, 10, 20
        let result = deduplicate(&events, DedupKey::Tick);
        assert_eq!(result.dropped, events.len() - 3);
        assert_eq!(result.kept[0].upload_id, "B");
    }

    #[test]
    fn test_basal_holds_and_converts_to_pulse() {
        let events = [event(EventKind::Basal, 0, 1.5, "u"), event(EventKind::Basal, 28, 0.75, "u")];
        let basal = align_basal(&events, range(12), 288).unwrap();
        let rates = basal.set_rate.values();
        assert!(rates[..6].iter().all(|r| *r == Some(1.5)));
        assert!(rates[6..].iter().all(|r| *r == Some(0.75)));
        assert_eq!(basal.pulse_delivered.values()[0], Some(0.125));
        assert_eq!(basal.pulse_delivered.values()[11], Some(0.0625));
    }

    #[test]
    fn test_basal_fill_stops_after_limit() {
        let events = [event(EventKind::Basal, 0, 1.0, "u")];
        let basal = align_basal(&events, range(10), 4).unwrap();
        assert!(basal.set_rate.values()[..5].iter().all(Option::is_some));
        assert!(basal.set_rate.values()[5..].iter().all(Option::is_none));
        assert!(basal.pulse_delivered.values()[5..].iter().all(Option::is_none));
    }

    #[test]
    fn test_boluses_within_a_tick_are_summed() {
        let events = [
            event(EventKind::Bolus, 1, 1.0, "u"),
            event(EventKind::Bolus, 4, 2.0, "u"),
            // same instant from another upload
            event(EventKind::Bolus, 4, 2.0, "v"),
        ];
        let bolus = align_bolus(&events, range(4)).unwrap();
        assert_eq!(bolus.deduplicated, 1);
        assert_eq!(bolus.series.values(), &[None, Some(3.0), None, None]);
    }

    #[test]
    fn test_carbs_sum_payload_fields() {
        let mut first = event(EventKind::Carb, 6, 0.0, "u");
        first.value = None;
        first.carbs = CarbPayload {
            carbohydrates_net: Some(30.0),
            carbohydrate_net: None,
            absorption_minutes: Some(180.0),
        };
        let mut second = first.clone();
        second.timestamp = at(8);
        second.carbs = CarbPayload {
            carbohydrates_net: None,
            carbohydrate_net: Some(12.0),
            absorption_minutes: Some(120.0),
        };
        let carbs = align_carbs(&[second, first], range(4)).unwrap();
        assert_eq!(carbs.carbs.values()[2], Some(42.0));
        assert_eq!(carbs.absorption_minutes.values()[2], Some(120.0));
    }

    #[test]
    fn test_cgm_converted_to_whole_mg_dl() {
        let events = [event(EventKind::Cgm, 5, 5.55, "u"), event(EventKind::Cgm, 10, 10.0, "u")];
        let cgm = align_cgm(&events, range(3)).unwrap();
        assert_eq!(cgm.series.values(), &[None, Some(100.0), Some(180.0)]);
    }

    #[test]
    fn test_absent_streams() {
        let events = [event(EventKind::Cgm, 5, 5.55, "u")];
        assert!(align_basal(&events, range(3), 288).is_none());
        assert!(align_bolus(&events, range(3)).is_none());
        assert!(align_carbs(&events, range(3)).is_none());
    }
}
