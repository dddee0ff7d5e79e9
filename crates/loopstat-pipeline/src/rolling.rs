//! Multi-window rolling statistics over a composed timeline
//!
//! For each window size `h` hours (`W = 12h` ticks), [`roll`] appends a
//! [`RollingColumns`] whose value at tick `t` summarizes the forward window
//! `[t, t + W - 1]`. Every column is first aggregated backward with
//! [`RollingWindow::backward`] and then moved to the window start with
//! [`shift_to_window_start`]; the last `W - 1` ticks are therefore unset.
//!
//! A window needs `floor(min_coverage * W)` present inputs for a defined
//! value. CGM-derived columns count present CGM readings; the event, range
//! and DKA columns work on flags that are defined at every tick.
//!
//! # Events
//!
//! A glycemic event is a run of at least `event_min_ticks` consecutive
//! readings inside one of [`CgmRange::EVENTS`]. The whole run is credited to
//! its first tick: a count of 1 and a length of `5 * run` minutes. Windows
//! therefore count the events that *start* inside them.

use loopstat_stats::{
    descriptive,
    rolling::{RollingWindow, shift_to_window_start},
    run_length::true_runs_at_least,
};

use crate::{
    config::PipelineConfig,
    risk,
    series::{TICK_MINUTES, TICKS_PER_HOUR},
    timeline::Timeline,
};

/// Glucose bands tracked by the rolling statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CgmRange {
    Lt40,
    Lt54,
    Lt70,
    Gt180,
    Gt250,
    Range54To70,
    Range70To140,
    Range70To180,
}

impl CgmRange {
    pub const ALL: [Self; 8] = [
        Self::Lt40,
        Self::Lt54,
        Self::Lt70,
        Self::Gt180,
        Self::Gt250,
        Self::Range54To70,
        Self::Range70To140,
        Self::Range70To180,
    ];

    /// Bands in which sustained excursions count as events
    pub const EVENTS: [Self; 5] = [Self::Lt40, Self::Lt54, Self::Lt70, Self::Gt180, Self::Gt250];

    /// Column-name suffix.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Lt40 => "lt40",
            Self::Lt54 => "lt54",
            Self::Lt70 => "lt70",
            Self::Gt180 => "gt180",
            Self::Gt250 => "gt250",
            Self::Range54To70 => "54-70",
            Self::Range70To140 => "70-140",
            Self::Range70To180 => "70-180",
        }
    }

    /// Closed bands include both bounds; open bands exclude theirs.
    ///
    /// ```
    /// # use loopstat_pipeline::rolling::CgmRange;
    /// assert!(CgmRange::Range54To70.contains(70.0));
    /// assert!(!CgmRange::Lt70.contains(70.0));
    /// assert!(!CgmRange::Gt180.contains(f64::NAN));
    /// ```
    #[must_use]
    pub fn contains(self, mg_dl: f64) -> bool {
        match self {
            Self::Lt40 => mg_dl < 40.0,
            Self::Lt54 => mg_dl < 54.0,
            Self::Lt70 => mg_dl < 70.0,
            Self::Gt180 => mg_dl > 180.0,
            Self::Gt250 => mg_dl > 250.0,
            Self::Range54To70 => (54.0..=70.0).contains(&mg_dl),
            Self::Range70To140 => (70.0..=140.0).contains(&mg_dl),
            Self::Range70To180 => (70.0..=180.0).contains(&mg_dl),
        }
    }
}

/// Rolling event statistics for one band
#[derive(Debug, Clone, PartialEq)]
pub struct EventColumns {
    pub range: CgmRange,
    pub count: Vec<Option<f64>>,
    /// Unset where the count is zero
    pub avg_length_minutes: Vec<Option<f64>>,
}

/// Columns appended for one rolling window size
#[derive(Debug, Clone, PartialEq)]
pub struct RollingColumns {
    pub hours: u32,
    pub n_cgm_points: Vec<Option<f64>>,
    /// Percent of the window's ticks with a CGM reading (0-100)
    pub perc_cgm_available: Vec<Option<f64>>,
    pub cgm_mean: Vec<Option<f64>>,
    /// Sample standard deviation
    pub cgm_std: Vec<Option<f64>>,
    pub cgm_median: Vec<Option<f64>>,
    pub cgm_geomean: Vec<Option<f64>>,
    pub cgm_geostd: Vec<Option<f64>>,
    pub lbgi: Vec<Option<f64>>,
    pub hbgi: Vec<Option<f64>>,
    pub bgri: Vec<Option<f64>>,
    pub lbgi_rs: Vec<Option<f64>>,
    pub hbgi_rs: Vec<Option<f64>>,
    /// Hours with IOB below half the scheduled-basal steady state
    pub dkai: Vec<Option<f64>>,
    pub dkai_rs: Vec<Option<f64>>,
    /// Percent of CGM readings in each band (0-100), in [`CgmRange::ALL`] order
    pub perc_cgm: Vec<(CgmRange, Vec<Option<f64>>)>,
    /// In [`CgmRange::EVENTS`] order
    pub events: Vec<EventColumns>,
}

impl RollingColumns {
    /// Columns with their exported names, e.g. `4hr_cgm_mean`.
    #[must_use]
    pub fn named_columns(&self) -> Vec<(String, &[Option<f64>])> {
        let h = self.hours;
        let general = [
            ("n_cgm_points", &self.n_cgm_points),
            ("perc_cgm_available", &self.perc_cgm_available),
            ("cgm_mean", &self.cgm_mean),
            ("cgm_std", &self.cgm_std),
            ("cgm_median", &self.cgm_median),
            ("cgm_geomean", &self.cgm_geomean),
            ("cgm_geostd", &self.cgm_geostd),
            ("LBGI", &self.lbgi),
            ("HBGI", &self.hbgi),
            ("BGRI", &self.bgri),
            ("LBGI_RS", &self.lbgi_rs),
            ("HBGI_RS", &self.hbgi_rs),
            ("DKAI", &self.dkai),
            ("DKAI_RS", &self.dkai_rs),
        ];
        let mut columns = general
            .into_iter()
            .map(|(name, values)| (format!("{h}hr_{name}"), values.as_slice()))
            .collect::<Vec<_>>();
        for (range, values) in &self.perc_cgm {
            columns.push((format!("{h}hr_perc_cgm_{}", range.label()), values.as_slice()));
        }
        for event in &self.events {
            let label = event.range.label();
            columns.push((format!("{h}hr_{label}_event_count"), event.count.as_slice()));
            columns.push((
                format!("{h}hr_cgm_{label}_avg_event_length_minutes"),
                event.avg_length_minutes.as_slice(),
            ));
        }
        columns
    }
}

/// Per-tick inputs shared by every window size
struct TickInputs {
    cgm: Vec<Option<f64>>,
    low_risk_power: Vec<Option<f64>>,
    high_risk_power: Vec<Option<f64>>,
    in_range: Vec<(CgmRange, Vec<Option<f64>>)>,
    /// Event start flag and event length at each tick, per event band
    event_starts: Vec<(CgmRange, Vec<Option<f64>>, Vec<Option<f64>>)>,
    low_insulin: Vec<Option<f64>>,
}

fn flag(value: bool) -> Option<f64> {
    Some(if value { 1.0 } else { 0.0 })
}

impl TickInputs {
    #[expect(clippy::cast_precision_loss)]
    fn new(timeline: &Timeline, event_min_ticks: usize) -> Self {
        let n = timeline.len();
        let cgm = timeline
            .cgm
            .values()
            .map_or_else(|| vec![None; n], <[_]>::to_vec);
        let (low_risk_power, high_risk_power): (Vec<_>, Vec<_>) = cgm
            .iter()
            .map(|v| match v {
                Some(v) => {
                    let (low, high) = risk::risk_components(*v);
                    (Some(low), Some(high))
                }
                None => (None, None),
            })
            .unzip();
        let membership = |range: CgmRange| {
            cgm.iter()
                .map(|v| v.is_some_and(|v| range.contains(v)))
                .collect::<Vec<_>>()
        };
        let in_range = CgmRange::ALL
            .into_iter()
            .map(|range| (range, membership(range).into_iter().map(flag).collect()))
            .collect();
        let event_starts = CgmRange::EVENTS
            .into_iter()
            .map(|range| {
                let mut starts = vec![Some(0.0); n];
                let mut lengths = vec![Some(0.0); n];
                for run in true_runs_at_least(&membership(range), event_min_ticks) {
                    starts[run.start] = Some(1.0);
                    lengths[run.start] = Some(run.len as f64 * TICK_MINUTES as f64);
                }
                (range, starts, lengths)
            })
            .collect();
        let low_insulin = (0..n)
            .map(|i| match (timeline.iob.get(i), timeline.sbr.get(i)) {
                (Some(iob), Some(sbr)) => flag(risk::is_low_insulin(iob, sbr)),
                _ => flag(false),
            })
            .collect();
        Self {
            cgm,
            low_risk_power,
            high_risk_power,
            in_range,
            event_starts,
            low_insulin,
        }
    }
}

fn sum(values: &[f64]) -> f64 {
    values.iter().sum()
}

#[expect(clippy::cast_precision_loss)]
fn count(values: &[f64]) -> f64 {
    values.len() as f64
}

/// Applies `f` to pairs that are both set.
fn zip_defined<F>(a: &[Option<f64>], b: &[Option<f64>], f: F) -> Vec<Option<f64>>
where
    F: Fn(f64, f64) -> Option<f64>,
{
    a.iter()
        .zip(b)
        .map(|(a, b)| f((*a)?, (*b)?).filter(|v| !v.is_nan()))
        .collect()
}

fn score(values: &[Option<f64>], scale: fn(f64) -> u8) -> Vec<Option<f64>> {
    values.iter().map(|v| v.map(|v| f64::from(scale(v)))).collect()
}

/// Percentage `100 * part / whole`, unset when `whole` is zero.
fn percent(part: &[Option<f64>], whole: &[Option<f64>]) -> Vec<Option<f64>> {
    zip_defined(part, whole, |p, w| (w > 0.0).then(|| 100.0 * p / w))
}

#[expect(clippy::cast_precision_loss)]
fn roll_window(inputs: &TickInputs, hours: u32, min_coverage: f64) -> RollingColumns {
    let len = hours as usize * TICKS_PER_HOUR;
    let window = RollingWindow::with_coverage(len, min_coverage);
    let backward = |values: &[Option<f64>], f: fn(&[f64]) -> f64| window.backward(values, f);

    let n_cgm_points = backward(&inputs.cgm, count);
    let perc_cgm_available = n_cgm_points
        .iter()
        .map(|n| n.map(|n| 100.0 * n / len as f64))
        .collect();
    let lbgi = backward(&inputs.low_risk_power, descriptive::mean);
    let hbgi = backward(&inputs.high_risk_power, descriptive::mean);
    let bgri = zip_defined(&lbgi, &hbgi, |l, h| Some(l + h));
    let dkai = backward(&inputs.low_insulin, sum)
        .into_iter()
        .map(|ticks| ticks.map(|t| t / TICKS_PER_HOUR as f64))
        .collect::<Vec<_>>();
    let perc_cgm = inputs
        .in_range
        .iter()
        .map(|(range, flags)| (*range, percent(&backward(flags, sum), &n_cgm_points)))
        .collect();
    let events = inputs
        .event_starts
        .iter()
        .map(|(range, starts, lengths)| {
            let count = backward(starts, sum);
            let total_length = backward(lengths, sum);
            EventColumns {
                range: *range,
                avg_length_minutes: zip_defined(&total_length, &count, |t, c| (c > 0.0).then(|| t / c)),
                count,
            }
        })
        .collect();

    RollingColumns {
        hours,
        perc_cgm_available,
        cgm_mean: backward(&inputs.cgm, descriptive::mean),
        cgm_std: backward(&inputs.cgm, descriptive::sample_std),
        cgm_median: backward(&inputs.cgm, descriptive::median),
        cgm_geomean: backward(&inputs.cgm, descriptive::geometric_mean),
        cgm_geostd: backward(&inputs.cgm, descriptive::geometric_std),
        lbgi_rs: score(&lbgi, risk::lbgi_risk_score),
        hbgi_rs: score(&hbgi, risk::hbgi_risk_score),
        dkai_rs: score(&dkai, risk::dka_risk_score),
        n_cgm_points,
        lbgi,
        hbgi,
        bgri,
        dkai,
        perc_cgm,
        events,
    }
    .shifted_to_window_start(len)
}

impl RollingColumns {
    /// Moves every column from the end of its window to the start.
    fn shifted_to_window_start(self, len: usize) -> Self {
        let shift = |column| shift_to_window_start(column, len);
        Self {
            hours: self.hours,
            n_cgm_points: shift(self.n_cgm_points),
            perc_cgm_available: shift(self.perc_cgm_available),
            cgm_mean: shift(self.cgm_mean),
            cgm_std: shift(self.cgm_std),
            cgm_median: shift(self.cgm_median),
            cgm_geomean: shift(self.cgm_geomean),
            cgm_geostd: shift(self.cgm_geostd),
            lbgi: shift(self.lbgi),
            hbgi: shift(self.hbgi),
            bgri: shift(self.bgri),
            lbgi_rs: shift(self.lbgi_rs),
            hbgi_rs: shift(self.hbgi_rs),
            dkai: shift(self.dkai),
            dkai_rs: shift(self.dkai_rs),
            perc_cgm: self
                .perc_cgm
                .into_iter()
                .map(|(range, values)| (range, shift(values)))
                .collect(),
            events: self
                .events
                .into_iter()
                .map(|event| EventColumns {
                    range: event.range,
                    count: shift(event.count),
                    avg_length_minutes: shift(event.avg_length_minutes),
                })
                .collect(),
        }
    }
}

/// Appends rolling statistics for every configured window size.
pub fn roll(timeline: &mut Timeline, config: &PipelineConfig) {
    let inputs = TickInputs::new(timeline, config.event_min_ticks);
    let columns = config
        .rolling_hours
        .iter()
        .filter(|&&hours| hours > 0)
        .map(|&hours| roll_window(&inputs, hours, config.min_coverage))
        .collect::<Vec<_>>();
    timeline.rolling.extend(columns);
}
