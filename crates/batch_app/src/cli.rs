//! Command-line arguments.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Run a table of rows against one API endpoint and download what comes back.
///
/// Settings are layered: built-in defaults, then the RON settings file, then
/// the environment (`.env` is read first), then these flags.
#[derive(Parser, Debug)]
#[command(name = "batch")]
#[command(author, version, about)]
pub struct Args {
    /// JSON file holding the row table: an array of objects
    pub rows: PathBuf,

    /// Endpoint path, relative to the API base URL (e.g. api/v1/sct/consulta)
    #[arg(short, long)]
    pub endpoint: String,

    /// RON settings file
    #[arg(short, long)]
    pub settings: Option<PathBuf>,

    /// Maximum rows processed at the same time
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// API base URL
    #[arg(long)]
    pub base_url: Option<String>,

    /// Batch-wide download folder; a row's own folder column wins
    #[arg(short, long)]
    pub download_dir: Option<String>,

    /// Root of the fallback download folders
    #[arg(long)]
    pub downloads_root: Option<PathBuf>,

    /// Service name used for fallback folders and the results report
    #[arg(short, long)]
    pub module: Option<String>,

    /// Folder for the JSON results report (defaults to the downloads root)
    #[arg(long)]
    pub report_dir: Option<PathBuf>,

    /// Where log output goes
    #[arg(long, value_enum, default_value_t = LogTarget::Both)]
    pub log: LogTarget,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogTarget {
    File,
    Terminal,
    Both,
}

impl Args {
    pub fn log_level(&self) -> log::LevelFilter {
        if self.quiet {
            return log::LevelFilter::Error;
        }
        match self.verbose {
            0 => log::LevelFilter::Info,
            1 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    }
}
