use std::path::PathBuf;

use loopstat_pipeline::iob::{DecayKernel, ExponentialInsulinModel};

use crate::util::Output;

#[derive(Debug, Clone, clap::Args)]
pub(crate) struct KernelArg {
    /// Minutes until a dose has no effect left
    #[arg(long, default_value_t = ExponentialInsulinModel::default().action_duration_minutes)]
    action_duration_minutes: f64,
    /// Minutes until a dose reaches peak activity
    #[arg(long, default_value_t = ExponentialInsulinModel::default().peak_activity_minutes)]
    peak_activity_minutes: f64,
    /// Output file path (stdout if omitted)
    #[arg(long)]
    output: Option<PathBuf>,
}

pub(crate) fn run(arg: &KernelArg) -> anyhow::Result<()> {
    let KernelArg {
        action_duration_minutes,
        peak_activity_minutes,
        output,
    } = arg;
    anyhow::ensure!(
        *peak_activity_minutes > 0.0 && peak_activity_minutes * 2.0 < *action_duration_minutes,
        "peak activity must be positive and less than half the action duration"
    );
    let model = ExponentialInsulinModel {
        action_duration_minutes: *action_duration_minutes,
        peak_activity_minutes: *peak_activity_minutes,
    };
    let kernel = DecayKernel::exponential(&model);
    Output::save_json(&kernel, output.clone())
}
