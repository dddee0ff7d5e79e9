use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::Context;
use tracing::info;

use crate::util::Output;

#[derive(Debug, Clone, clap::Args)]
pub(crate) struct CombineArg {
    /// Directory holding `*-summary.csv` files
    #[arg(long)]
    summaries_dir: PathBuf,
    /// Output file path (stdout if omitted)
    #[arg(long)]
    output: Option<PathBuf>,
}

pub(crate) fn run(arg: &CombineArg) -> anyhow::Result<()> {
    let CombineArg {
        summaries_dir,
        output,
    } = arg;
    let files = summary_files(summaries_dir)?;
    let output = Output::from_output_path(output.clone())?;
    let display_path = output.display_path();
    let rows = combine(&files, output)?;
    info!(files = files.len(), rows, "combined summaries into {display_path}");
    Ok(())
}

fn summary_files(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir)
        .with_context(|| format!("Failed to read summaries directory: {}", dir.display()))?;
    let mut files = Vec::new();
    for entry in entries {
        let path = entry
            .with_context(|| format!("Failed to read summaries directory: {}", dir.display()))?
            .path();
        if path
            .file_name()
            .is_some_and(|name| name.to_string_lossy().ends_with("-summary.csv"))
        {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Concatenates the rows of `files`, which must all share one header.
fn combine<W>(files: &[PathBuf], writer: W) -> anyhow::Result<usize>
where
    W: Write,
{
    let mut writer = csv::Writer::from_writer(writer);
    let mut header: Option<csv::StringRecord> = None;
    let mut rows = 0;
    for path in files {
        let mut reader = csv::Reader::from_path(path)
            .with_context(|| format!("Failed to open summary file: {}", path.display()))?;
        let file_header = reader
            .headers()
            .with_context(|| format!("Failed to read summary header: {}", path.display()))?
            .clone();
        match &header {
            None => {
                writer.write_record(&file_header)?;
                header = Some(file_header);
            }
            Some(expected) => anyhow::ensure!(
                *expected == file_header,
                "Summary columns differ from the first file: {}",
                path.display()
            ),
        }
        for record in reader.records() {
            let record =
                record.with_context(|| format!("Failed to read summary row: {}", path.display()))?;
            writer.write_record(&record)?;
            rows += 1;
        }
    }
    writer.flush().context("Failed to flush combined summaries")?;
    Ok(rows)
}
