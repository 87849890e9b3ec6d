//! Command-line interface for vbitext
//!
//! Provides argument parsing using clap derive macros.

use crate::defaults;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Recover teletext packets and pages from raw VBI sample captures
#[derive(Parser, Debug)]
#[command(
    name = "vbitext",
    version,
    about = "Recover teletext packets and pages from raw VBI sample captures"
)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Suppress the end-of-run summary
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose output (-v: run summary, -vv: per-stage diagnostics)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Deconvolve a .vbi sample capture into .t42 packets
    Deconvolve(DeconvolveArgs),

    /// Filter a .t42 packet stream by page, magazine, or row
    Filter(FilterArgs),

    /// Record raw VBI samples from a capture device into a .vbi file
    Record(RecordArgs),
}

/// Parses a full page address in hex, e.g. `100` for page 1.00.
fn parse_page(s: &str) -> Result<u16, String> {
    let value =
        u16::from_str_radix(s, 16).map_err(|_| format!("'{s}' is not a hex page number"))?;
    if (0x100..=0x8ff).contains(&value) {
        Ok(value)
    } else {
        Err(format!("page {s} is outside 100..8FF"))
    }
}

#[derive(Args, Debug)]
pub struct DeconvolveArgs {
    /// Input .vbi file ('-' or absent reads stdin)
    pub input: Option<PathBuf>,

    /// Start at the Nth frame of the input
    #[arg(long, value_name = "N", default_value_t = 0)]
    pub start: u64,

    /// Stop before the Nth frame of the input
    #[arg(long, value_name = "N")]
    pub stop: Option<u64>,

    /// Process every Nth frame
    #[arg(long, value_name = "N", default_value_t = 1)]
    pub step: u64,

    /// Stop after processing N frames
    #[arg(long, value_name = "N")]
    pub limit: Option<u64>,

    /// Print decoded header rows as text instead of binary output
    #[arg(short = 'H', long)]
    pub headers: bool,

    /// Skip N header prints between displayed ones (with -H)
    #[arg(short = 'S', long, value_name = "N", default_value_t = 0)]
    pub skip: usize,

    /// Capture device profile
    #[arg(long, value_name = "PROFILE", default_value = defaults::DEVICE_PROFILE)]
    pub device: String,

    /// Load the device profile from a TOML file instead of the registry
    #[arg(long, value_name = "PATH", conflicts_with = "device")]
    pub profile_file: Option<PathBuf>,

    /// Override the profile's sample rate (Hz)
    #[arg(long, value_name = "HZ")]
    pub sample_rate: Option<f64>,

    /// Override the profile's samples per line
    #[arg(long, value_name = "N")]
    pub line_length: Option<usize>,

    /// Deconvolver worker threads (default: all cores)
    #[arg(long, value_name = "N")]
    pub threads: Option<usize>,

    /// Use the batching backend, optionally with a batch size
    #[arg(long, value_name = "N", num_args = 0..=1, default_missing_value = "256")]
    pub batch: Option<usize>,

    /// Force the progress bar on
    #[arg(long, overrides_with = "no_progress")]
    pub progress: bool,

    /// Force the progress bar off
    #[arg(long)]
    pub no_progress: bool,

    /// Output file (default: stdout)
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct FilterArgs {
    /// Input .t42 file ('-' or absent reads stdin)
    pub input: Option<PathBuf>,

    /// Limit output to a page (hex, e.g. 100); repeatable
    #[arg(short = 'p', long = "page", value_name = "NNN", value_parser = parse_page)]
    pub pages: Vec<u16>,

    /// Limit output to a magazine; repeatable
    #[arg(short = 'm', long = "mag", value_name = "MAG",
          value_parser = clap::value_parser!(u8).range(1..=8))]
    pub magazines: Vec<u8>,

    /// Limit output to a row; repeatable
    #[arg(short = 'r', long = "row", value_name = "ROW",
          value_parser = clap::value_parser!(u8).range(0..=31))]
    pub rows: Vec<u8>,

    /// Deduplicate repeated subpages by confidence-weighted voting
    #[arg(long)]
    pub squash: bool,

    /// Merged copies after which a subpage is flushed (with --squash)
    #[arg(long, value_name = "N", default_value_t = defaults::SQUASH_MAX_OBSERVATIONS)]
    pub max_obs: u32,

    /// Frames of silence after which a subpage is flushed (with --squash)
    #[arg(long, value_name = "N", default_value_t = defaults::SQUASH_QUIET_FRAMES)]
    pub quiet_frames: u64,

    /// Input is 43 bytes per packet (WST capture card format)
    #[arg(long)]
    pub wst: bool,

    /// Output file (default: stdout)
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct RecordArgs {
    /// Capture device to read raw VBI samples from
    #[arg(short = 'd', long, value_name = "DEV")]
    pub device: PathBuf,

    /// Device profile that defines the frame geometry
    #[arg(long, value_name = "PROFILE", default_value = defaults::DEVICE_PROFILE)]
    pub profile: String,

    /// Stop after recording N frames
    #[arg(long, value_name = "N")]
    pub limit: Option<u64>,

    /// Output file (default: stdout)
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}
