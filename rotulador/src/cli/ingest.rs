//! `ingest`: flatten folders of images into one folder named by hash

use anyhow::{bail, Result};
use clap::Args;
use std::path::PathBuf;

use crate::ingest::ingest;

#[derive(Debug, Clone, Args)]
pub struct IngestArgs {
    /// Input folders followed by the output folder
    #[arg(required = true, num_args = 2.., value_name = "INPUT... OUTPUT")]
    pub paths: Vec<PathBuf>,

    /// Files processed concurrently
    #[arg(short, long, default_value_t = 1)]
    pub jobs: usize,
}

impl IngestArgs {
    /// Split positional paths into (inputs, output)
    pub fn split(&self) -> Result<(&[PathBuf], &PathBuf)> {
        match self.paths.split_last() {
            Some((output, inputs)) if !inputs.is_empty() => Ok((inputs, output)),
            _ => bail!("ingest needs at least one input folder and an output folder"),
        }
    }
}

pub async fn run(args: IngestArgs) -> Result<()> {
    let (inputs, output) = args.split()?;
    let report = ingest(inputs, output, args.jobs).await?;

    println!(
        "{} copied, {} duplicates, {} skipped, {} failed",
        report.copied, report.duplicates, report.skipped, report.failed
    );
    Ok(())
}
