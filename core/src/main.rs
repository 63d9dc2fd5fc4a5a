//! POSEFILTER: command line front end for the particle-filter pose estimator.
//!
//! The tool can operate in four modes:
//!
//! - `replay`: run the estimator over a recorded CSV trace as fast as possible and write one
//!   output row per cycle.
//! - `run`: publish a recorded trace into the input registers in real time and run the
//!   fixed-rate estimator loop against it, logging every published particle set.
//! - `synthesize`: generate a noisy straight-line input trace.
//! - `init-config`: write the default configuration (TOML/JSON/YAML) as a starting point.

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use log::{info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use posefilter::config::{EstimatorConfig, TrackingMode};
use posefilter::estimator::{Estimator, LogSink};
use posefilter::inputs::InputChannels;
use posefilter::sim::{
    InputRecord, OutputRecord, replay, spawn_feeder, synthesize_constant_velocity,
};

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Particle-filter pose estimator for a ground robot."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Log level (off, error, warn, info, debug, trace)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// Log file path (if not specified, logs to stderr)
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    #[command(about = "Replay a recorded input trace without sleeping")]
    Replay(ReplayArgs),
    #[command(about = "Replay a recorded input trace in real time through the estimator loop")]
    Run(RunArgs),
    #[command(about = "Generate a synthetic constant-velocity input trace")]
    Synthesize(SynthesizeArgs),
    #[command(about = "Write the default configuration file")]
    InitConfig(InitConfigArgs),
}

/// Options shared by every command that builds an estimator
#[derive(Args, Clone, Debug)]
struct EstimatorArgs {
    /// Estimator configuration file (TOML/JSON/YAML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// RNG seed (overrides the configuration file)
    #[arg(long)]
    seed: Option<u64>,

    /// Tracking mode (overrides the configuration file)
    #[arg(long, value_enum)]
    mode: Option<TrackingMode>,
}

impl EstimatorArgs {
    fn load(&self) -> anyhow::Result<EstimatorConfig> {
        let mut config = match &self.config {
            Some(path) => EstimatorConfig::from_file(path)
                .with_context(|| format!("failed to read config '{}'", path.display()))?,
            None => EstimatorConfig::default(),
        };
        if self.seed.is_some() {
            config.seed = self.seed;
        }
        if let Some(mode) = self.mode {
            config.mode = mode;
        }
        Ok(config)
    }
}

#[derive(Args, Clone, Debug)]
struct ReplayArgs {
    /// Input CSV file path
    #[arg(short, long)]
    input: PathBuf,

    /// Output CSV file path
    #[arg(short, long)]
    output: PathBuf,

    #[command(flatten)]
    estimator: EstimatorArgs,
}

#[derive(Args, Clone, Debug)]
struct RunArgs {
    /// Input CSV file path
    #[arg(short, long)]
    input: PathBuf,

    #[command(flatten)]
    estimator: EstimatorArgs,
}

#[derive(Args, Clone, Debug)]
struct SynthesizeArgs {
    /// Output CSV file path
    #[arg(short, long)]
    output: PathBuf,

    /// Number of records to generate
    #[arg(long, default_value_t = 200)]
    steps: usize,

    /// Forward velocity (m/s)
    #[arg(long, default_value_t = 0.3)]
    velocity: f64,

    /// Heading (rad)
    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    heading: f64,

    /// Time step between records (s)
    #[arg(long, default_value_t = 0.05)]
    dt: f64,

    /// Pose reading noise std dev (m)
    #[arg(long, default_value_t = 0.05)]
    noise: f64,

    /// RNG seed
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Args, Clone, Debug)]
struct InitConfigArgs {
    /// Output file path; the extension selects the format (.toml/.json/.yaml/.yml)
    #[arg(short, long, default_value = "posefilter.toml")]
    output: PathBuf,
}

/// Initialize the logger with the specified level and optional file target.
fn init_logger(log_level: &str, log_file: Option<&PathBuf>) -> anyhow::Result<()> {
    use std::io::Write;

    let level = log_level.parse::<log::LevelFilter>().unwrap_or_else(|_| {
        eprintln!("Invalid log level '{}', defaulting to 'info'", log_level);
        log::LevelFilter::Info
    });

    let mut builder = env_logger::Builder::new();
    builder.filter_level(level);
    builder.format(|buf, record| {
        writeln!(
            buf,
            "{} [{}] - {}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
            record.level(),
            record.args()
        )
    });

    if let Some(log_path) = log_file {
        if let Some(parent) = log_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let target = Box::new(
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(log_path)?,
        );
        builder.target(env_logger::Target::Pipe(target));
    }

    builder.try_init()?;
    Ok(())
}

fn read_inputs(path: &Path) -> anyhow::Result<Vec<InputRecord>> {
    let records = InputRecord::from_csv(path)
        .map_err(|e| anyhow::anyhow!("failed to read '{}': {e}", path.display()))?;
    if records.is_empty() {
        bail!("input file '{}' contains no records", path.display());
    }
    info!("Read {} records from {}", records.len(), path.display());
    Ok(records)
}

fn run_replay(args: &ReplayArgs) -> anyhow::Result<()> {
    let config = args.estimator.load()?;
    let records = read_inputs(&args.input)?;
    let mut estimator = Estimator::new(config)?;
    let outputs = replay(&mut estimator, &records)?;
    let rows: Vec<OutputRecord> = outputs.iter().map(OutputRecord::from_output).collect();
    OutputRecord::to_csv(&rows, &args.output)
        .with_context(|| format!("failed to write '{}'", args.output.display()))?;

    let stats = estimator.stats();
    info!(
        "Wrote {} cycles to {} ({} degenerate)",
        stats.cycles,
        args.output.display(),
        stats.degenerate_cycles
    );
    Ok(())
}

fn run_realtime(args: &RunArgs) -> anyhow::Result<()> {
    let config = args.estimator.load()?;
    let records = read_inputs(&args.input)?;
    let cycles = records.len() as u64;
    let mut estimator = Estimator::new(config)?;
    let period = Duration::from_secs_f64(estimator.config().period());

    let channels = InputChannels::new();
    let mut reader = channels.reader();
    let feeder_done = Arc::new(AtomicBool::new(false));
    let feeder = spawn_feeder(records, channels, period, Arc::clone(&feeder_done));

    // The first record is already published, so cycle 1 runs on it. The loop stops on its
    // own after one cycle per record.
    let stop = AtomicBool::new(false);
    let stats = estimator.run(&mut reader, &mut LogSink, &stop, Some(cycles))?;
    if !feeder_done.load(Ordering::Relaxed) {
        info!("Estimator finished before every input record was published");
    }
    if feeder.join().is_err() {
        warn!("input feeder thread panicked");
    }
    info!(
        "Completed {} cycles: {} degenerate, {} on stale input",
        stats.cycles, stats.degenerate_cycles, stats.stale_cycles
    );
    Ok(())
}

fn run_synthesize(args: &SynthesizeArgs) -> anyhow::Result<()> {
    let records = synthesize_constant_velocity(
        args.steps,
        args.velocity,
        args.heading,
        args.dt,
        args.noise,
        args.seed,
    )?;
    InputRecord::to_csv(&records, &args.output)
        .with_context(|| format!("failed to write '{}'", args.output.display()))?;
    info!("Wrote {} records to {}", records.len(), args.output.display());
    Ok(())
}

fn run_init_config(args: &InitConfigArgs) -> anyhow::Result<()> {
    EstimatorConfig::default()
        .to_file(&args.output)
        .with_context(|| format!("failed to write '{}'", args.output.display()))?;
    info!("Wrote default configuration to {}", args.output.display());
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logger(&cli.log_level, cli.log_file.as_ref())?;

    match &cli.command {
        Command::Replay(args) => run_replay(args),
        Command::Run(args) => run_realtime(args),
        Command::Synthesize(args) => run_synthesize(args),
        Command::InitConfig(args) => run_init_config(args),
    }
}
