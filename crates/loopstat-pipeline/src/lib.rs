//! Reconstruction of pump and CGM time series around issue reports
//!
//! This crate turns an irregular event log (basal rate changes, boluses,
//! carb entries, CGM readings) and the settings schedules captured in an
//! issue report into a regular five-minute timeline, annotated with
//! insulin on board, glycemic risk indices and multi-window rolling
//! statistics, plus one flat summary record per analysis window.
//!
//! # Overview
//!
//! For each issue report, [`pipeline::Pipeline::process_window`] runs:
//!
//! 1. **Window** ([`window::AnalysisWindow`]): local timezone
//!    ([`timezone::resolve_timezone`]) and the ±7 day window around the report
//!    day, with a one-day lookback for IOB run-in
//! 2. **Settings** ([`settings::expand_settings`]): each 24-hour schedule
//!    expanded to 288 slots ([`schedule::Schedule::expand`]) and normalized
//!    to mg/dL ([`units`])
//! 3. **Alignment** ([`align`]): events deduplicated and placed on the
//!    five-minute grid with a per-stream policy
//! 4. **Insulin on board** ([`iob::convolve`]): total insulin convolved with
//!    a decay kernel over the buffered window
//! 5. **Timeline** ([`timeline::compose`]): streams and schedules merged onto
//!    the window's tick skeleton
//! 6. **Rolling statistics** ([`rolling::roll`]): forward-window glucose,
//!    risk and DKA statistics for every configured window size
//! 7. **Summary** ([`summary::WindowSummary`]): window-level statistics
//!
//! # Modules
//!
//! - [`config`]: Pipeline thresholds and window sizes
//! - [`event`]: Raw events and participant data
//! - [`units`]: mg/dL and mmol/L conversion
//! - [`schedule`]: Settings schedules and their dense 288-slot profiles
//! - [`series`]: The five-minute tick grid and regularized series
//! - [`align`]: Deduplication and grid alignment
//! - [`iob`]: Decay kernels and IOB convolution
//! - [`risk`]: LBGI/HBGI/BGRI and DKA risk
//! - [`timezone`]: UTC offset to IANA timezone resolution
//! - [`window`]: Issue reports and analysis windows
//! - [`timeline`]: The composed per-window timeline
//! - [`rolling`]: Rolling statistics
//! - [`settings`]: Schedule expansion and the settings check
//! - [`summary`]: The per-window summary record
//! - [`pipeline`]: Window and participant processing
//!
//! # Examples
//!
//! ```
//! use chrono::{TimeDelta, TimeZone, Utc};
//! use loopstat_pipeline::{
//!     event::{EventKind, ParticipantData, RawEvent},
//!     pipeline::Pipeline,
//!     window::IssueReport,
//! };
//!
//! let report_time = Utc.with_ymd_and_hms(2020, 6, 15, 12, 0, 0).unwrap();
//! let mut report = IssueReport::new("LOOP-0001", report_time);
//! report.basal_rate_utc_offset_seconds = Some(0);
//! report.basal_rate_schedule = Some("[{'startTime': 0, 'value': 1.0}]".to_owned());
//!
//! let events = (0..12)
//!     .map(|i| {
//!         let t = report_time - TimeDelta::hours(i);
//!         RawEvent::new(t, EventKind::Cgm, Some(6.0), "upload-1")
//!     })
//!     .collect();
//! let data = ParticipantData::new("LOOP-0001", events);
//!
//! let output = Pipeline::default().process_window(&data, 0, report).unwrap();
//! assert!(output.summary.surrounding_data_available);
//! assert_eq!(output.summary.scheduled_basal_rate_median, Some(1.0));
//! let timeline = output.timeline.unwrap();
//! assert_eq!(timeline.len(), 14 * 288);
//! assert_eq!(timeline.cgm.present_values().len(), 12);
//! ```

pub mod align;
pub mod config;
pub mod event;
pub mod iob;
pub mod pipeline;
pub mod risk;
pub mod rolling;
pub mod schedule;
pub mod series;
pub mod settings;
pub mod summary;
pub mod timeline;
pub mod timezone;
pub mod units;
pub mod window;
