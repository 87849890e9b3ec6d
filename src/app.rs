//! Command drivers: wire CLI arguments into pipeline runs.

use crate::cli::{Cli, Commands, DeconvolveArgs, FilterArgs, RecordArgs};
use crate::config::{self, DeviceProfile, GeometryOverrides, LineConfig};
use crate::defaults;
use crate::error::{Result, VbitextError};
use crate::filter::{PassFilter, Predicate, SquashConfig, SquashFilter};
use crate::io::{ChunkerConfig, FileChunker, HeaderTextWriter, PacketSink, T42Writer};
use crate::packet::{decode_bytes, Packet};
use crate::pipeline::{
    run_deconvolve, run_packets, CancelToken, FilterMode, PipelineConfig, StderrReporter,
};
use crate::vbi::{BatchDeconvolver, CpuDeconvolver, Deconvolve, SampleFrame};
use indicatif::ProgressBar;
use std::fs::File;
use std::io::{self, BufWriter, IsTerminal, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Runs the parsed command line to completion.
pub fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Deconvolve(args) => deconvolve(args, cli.quiet, cli.verbose),
        Commands::Filter(args) => filter(args, cli.quiet, cli.verbose),
        Commands::Record(args) => record(args, cli.quiet),
    }
}

/// Opens an input stream; `None` or `-` reads stdin.
///
/// The byte length comes back for regular files so that progress bars and
/// up-front structure checks have something to work with.
fn open_input(path: &Option<PathBuf>) -> Result<(Box<dyn Read + Send>, Option<u64>)> {
    match path {
        Some(path) if path != Path::new("-") => {
            let file = File::open(path)?;
            let len = file.metadata().ok().map(|m| m.len());
            Ok((Box::new(file), len))
        }
        _ => Ok((Box::new(io::stdin()), None)),
    }
}

fn open_output(path: &Option<PathBuf>) -> Result<Box<dyn Write + Send>> {
    match path {
        Some(path) if path != Path::new("-") => {
            Ok(Box::new(BufWriter::new(File::create(path)?)))
        }
        _ => Ok(Box::new(BufWriter::new(io::stdout()))),
    }
}

fn resolve_profile(name: &str, profile_file: &Option<PathBuf>) -> Result<DeviceProfile> {
    match profile_file {
        Some(path) => config::profile_from_file(path),
        None => config::profile_by_name(name),
    }
}

fn deconvolve(args: DeconvolveArgs, quiet: bool, verbose: u8) -> Result<()> {
    let profile = resolve_profile(&args.device, &args.profile_file)?;
    let line_config = LineConfig::from_profile(
        &profile,
        GeometryOverrides {
            sample_rate: args.sample_rate,
            samples_per_line: args.line_length,
        },
    )?;

    let (reader, input_len) = open_input(&args.input)?;
    let samples_per_line = line_config.samples_per_line;

    let chunker = FileChunker::new(
        reader,
        samples_per_line,
        ChunkerConfig {
            start: args.start,
            stop: args.stop,
            step: args.step,
            limit: args.limit,
            strict: false,
        },
    );

    let show_progress = if args.no_progress {
        false
    } else {
        args.progress || io::stderr().is_terminal()
    };
    let progress = if show_progress {
        match input_len {
            Some(len) => ProgressBar::new(len / samples_per_line as u64),
            None => ProgressBar::new_spinner(),
        }
    } else {
        ProgressBar::hidden()
    };

    let frame_progress = progress.clone();
    let frames = chunker.map(move |item| {
        frame_progress.inc(1);
        item.map(|(index, samples)| SampleFrame::new(index, samples))
    });

    let backend: Arc<dyn Deconvolve> = match args.batch {
        Some(batch_size) => Arc::new(BatchDeconvolver::with_batch_size(
            line_config.clone(),
            batch_size,
        )),
        None => Arc::new(CpuDeconvolver::new(line_config.clone())),
    };

    let output = open_output(&args.output)?;
    let sink: Box<dyn PacketSink> = if args.headers {
        Box::new(HeaderTextWriter::new(output, args.skip))
    } else {
        Box::new(T42Writer::new(output))
    };

    let pipeline_config = PipelineConfig {
        workers: args.threads.unwrap_or(0),
        ..Default::default()
    };

    let stats = run_deconvolve(
        frames,
        backend,
        &pipeline_config,
        sink,
        Arc::new(StderrReporter),
        CancelToken::new(),
    );
    progress.finish_and_clear();
    let stats = stats?;

    if !quiet && verbose >= 1 {
        eprintln!("vbitext: {stats}");
    }
    Ok(())
}

/// Record stride for `.t42` input; WST captures carry a leading status
/// byte per packet.
fn t42_record_size(wst: bool) -> usize {
    if wst {
        defaults::LINE_BYTES + 1
    } else {
        defaults::LINE_BYTES
    }
}

fn filter(args: FilterArgs, quiet: bool, verbose: u8) -> Result<()> {
    let record_size = t42_record_size(args.wst);

    let (reader, input_len) = open_input(&args.input)?;
    // Structure check at stage entry: a seekable input of the wrong shape
    // fails before any output is produced.
    if let Some(len) = input_len {
        if len % record_size as u64 != 0 {
            return Err(VbitextError::MalformedInput {
                message: format!(
                    "input length {len} is not a multiple of {record_size}"
                ),
            });
        }
    }

    let chunker = FileChunker::new(
        reader,
        record_size,
        ChunkerConfig {
            strict: true,
            ..Default::default()
        },
    );

    let wst = args.wst;
    let packets = chunker.filter_map(move |item| -> Option<Result<Packet>> {
        match item {
            Ok((index, record)) => {
                let payload = if wst {
                    // Status byte zero means no teletext on this line.
                    if record[0] == 0 {
                        return None;
                    }
                    &record[1..]
                } else {
                    &record[..]
                };
                let mut bytes = [0u8; defaults::LINE_BYTES];
                bytes.copy_from_slice(payload);
                Some(Ok(decode_bytes(bytes, index)))
            }
            Err(e) => Some(Err(e)),
        }
    });

    let predicate = Predicate {
        pages: args.pages.iter().copied().collect(),
        magazines: args.magazines.iter().copied().collect(),
        rows: args.rows.iter().copied().collect(),
    };

    let mode = if args.squash {
        FilterMode::Squash {
            predicate: (!predicate.is_empty()).then(|| PassFilter::new(predicate)),
            squash: SquashFilter::new(SquashConfig {
                max_observations: args.max_obs,
                quiet_frames: args.quiet_frames,
            }),
        }
    } else {
        FilterMode::Pass(PassFilter::new(predicate))
    };

    let sink = Box::new(T42Writer::new(open_output(&args.output)?));

    let stats = run_packets(
        packets,
        mode,
        &PipelineConfig::default(),
        sink,
        Arc::new(StderrReporter),
        CancelToken::new(),
    )?;

    if !quiet && verbose >= 1 {
        eprintln!("vbitext: {stats}");
    }
    Ok(())
}

fn record(args: RecordArgs, quiet: bool) -> Result<()> {
    let profile = config::profile_by_name(&args.profile)?;
    let samples_per_line = profile.samples_per_line;

    let device = File::open(&args.device).map_err(|e| VbitextError::CaptureDevice {
        device: args.device.display().to_string(),
        message: e.to_string(),
    })?;

    let mut output = open_output(&args.output)?;

    let chunker = FileChunker::new(
        device,
        samples_per_line,
        ChunkerConfig {
            limit: args.limit,
            strict: false,
            ..Default::default()
        },
    );

    let mut frames = 0u64;
    for item in chunker {
        let (_, samples) = item?;
        output.write_all(&samples)?;
        frames += 1;
    }
    output.flush()?;

    if !quiet {
        eprintln!("vbitext: recorded {frames} frames of {samples_per_line} samples");
    }
    Ok(())
}
