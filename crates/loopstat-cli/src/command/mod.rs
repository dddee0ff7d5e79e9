use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use self::{combine::CombineArg, kernel::KernelArg, process::ProcessArg};

mod combine;
mod kernel;
mod process;

#[derive(Debug, Clone, Parser)]
#[command(author, version, about, long_about = None)]
pub struct CommandArgs {
    /// Log filter (e.g. `info`, `loopstat_pipeline=debug`); `RUST_LOG` takes precedence
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Debug, Clone, Subcommand)]
enum Mode {
    /// Build time series and summaries around every issue report
    Process(#[clap(flatten)] ProcessArg),
    /// Concatenate per-window summaries into one table
    Combine(#[clap(flatten)] CombineArg),
    /// Write the built-in insulin decay kernel as JSON
    Kernel(#[clap(flatten)] KernelArg),
}

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

pub fn run() -> anyhow::Result<()> {
    let args = CommandArgs::parse();
    init_tracing(&args.log_level);
    match args.mode {
        Mode::Process(arg) => process::run(&arg)?,
        Mode::Combine(arg) => combine::run(&arg)?,
        Mode::Kernel(arg) => kernel::run(&arg)?,
    }
    Ok(())
}
