use std::{
    collections::BTreeMap,
    fs,
    num::NonZeroUsize,
    path::{Path, PathBuf},
    sync::atomic::{AtomicUsize, Ordering},
    thread,
    time::Instant,
};

use anyhow::Context;
use loopstat_pipeline::{
    config::PipelineConfig,
    iob::DecayKernel,
    pipeline::{ParticipantOutcome, Pipeline},
    window::IssueReport,
};
use tracing::{error, info, warn};

use crate::{export, load, util};

#[derive(Debug, Clone, clap::Args)]
pub(crate) struct ProcessArg {
    /// Directory holding one event table per participant
    #[arg(long)]
    events_dir: PathBuf,
    /// Issue report table (CSV)
    #[arg(long)]
    issue_reports: PathBuf,
    /// Directory to write summaries and time series into
    #[arg(long)]
    output_dir: PathBuf,
    /// Decay kernel JSON (built-in exponential kernel if omitted)
    #[arg(long)]
    kernel: Option<PathBuf>,
    /// Pipeline configuration JSON (defaults if omitted)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Number of worker threads (available parallelism if omitted)
    #[arg(long)]
    jobs: Option<NonZeroUsize>,
    /// Only process these participants
    #[arg(long = "participant")]
    participants: Vec<String>,
}

struct Job {
    participant_id: String,
    reports: Vec<IssueReport>,
}

pub(crate) fn run(arg: &ProcessArg) -> anyhow::Result<()> {
    let ProcessArg {
        events_dir,
        issue_reports,
        output_dir,
        kernel,
        config,
        jobs,
        participants,
    } = arg;

    let config = match config {
        Some(path) => util::read_json_file::<PipelineConfig, _>("config", path)?,
        None => PipelineConfig::default(),
    };
    let kernel = match kernel {
        Some(path) => util::read_json_file::<DecayKernel, _>("kernel", path)?,
        None => DecayKernel::default(),
    };
    let pipeline = Pipeline::new(config, kernel);

    for subdir in [export::SUMMARIES_DIR, export::TIME_SERIES_DIR] {
        let dir = output_dir.join(subdir);
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create output directory: {}", dir.display()))?;
    }

    let mut grouped = BTreeMap::<String, Vec<IssueReport>>::new();
    for report in load::read_issue_reports(issue_reports)? {
        grouped.entry(report.participant_id.clone()).or_default().push(report);
    }
    if !participants.is_empty() {
        grouped.retain(|id, _| participants.contains(id));
    }
    let jobs_list: Vec<Job> = grouped
        .into_iter()
        .map(|(participant_id, reports)| Job {
            participant_id,
            reports,
        })
        .collect();

    let workers = jobs
        .or_else(|| thread::available_parallelism().ok())
        .map_or(1, NonZeroUsize::get)
        .min(jobs_list.len().max(1));
    info!(
        participants = jobs_list.len(),
        workers, "processing issue reports"
    );

    let start = Instant::now();
    let totals = run_workers(&pipeline, &jobs_list, events_dir, output_dir, workers);
    info!(
        processed = totals.processed,
        failed = totals.failed,
        elapsed_secs = start.elapsed().as_secs_f64(),
        "done"
    );
    Ok(())
}

fn run_workers(
    pipeline: &Pipeline,
    jobs: &[Job],
    events_dir: &Path,
    output_dir: &Path,
    workers: usize,
) -> ParticipantOutcome {
    let cursor = AtomicUsize::new(0);
    thread::scope(|s| {
        let handles: Vec<_> = (0..workers)
            .map(|_| {
                s.spawn(|| {
                    let mut outcome = ParticipantOutcome::default();
                    loop {
                        let index = cursor.fetch_add(1, Ordering::Relaxed);
                        let Some(job) = jobs.get(index) else {
                            break;
                        };
                        match process_job(pipeline, job, events_dir, output_dir) {
                            Ok(o) => {
                                outcome.processed += o.processed;
                                outcome.failed += o.failed;
                            }
                            Err(e) => {
                                error!(participant = %job.participant_id, "{e:#}");
                            }
                        }
                    }
                    outcome
                })
            })
            .collect();

        let mut totals = ParticipantOutcome::default();
        for handle in handles {
            match handle.join() {
                Ok(o) => {
                    totals.processed += o.processed;
                    totals.failed += o.failed;
                }
                Err(_) => error!("worker thread panicked"),
            }
        }
        totals
    })
}

fn process_job(
    pipeline: &Pipeline,
    job: &Job,
    events_dir: &Path,
    output_dir: &Path,
) -> anyhow::Result<ParticipantOutcome> {
    let Some(event_file) = load::find_event_file(events_dir, &job.participant_id)? else {
        return Ok(ParticipantOutcome::default());
    };
    let data = load::read_events(&job.participant_id, &event_file)?;
    if data.events.is_empty() {
        warn!(participant = %job.participant_id, "event table has no usable rows");
    }

    let outcome = pipeline.process_participant(&data, job.reports.clone(), |output| {
        if let Err(e) = export::write_window(output_dir, &output) {
            error!(
                participant = %output.summary.loop_id,
                window = output.summary.report_num,
                "{e:#}"
            );
        }
    });
    info!(
        participant = %job.participant_id,
        processed = outcome.processed,
        failed = outcome.failed,
        "participant finished"
    );
    Ok(outcome)
}
