//! Command line: `driveup <FILE> [--fresh]`.

use std::path::PathBuf;

use clap::Parser;

/// Resumable chunked upload of one file.
#[derive(Debug, Clone, PartialEq, Eq, Parser)]
#[command(name = "driveup")]
#[command(version)]
#[command(about = "Upload a file in resumable chunks, resuming an interrupted upload")]
pub struct Args {
    /// File to upload.
    pub file: PathBuf,

    /// Ignore any checkpoint and open a new session.
    #[arg(long)]
    pub fresh: bool,
}
