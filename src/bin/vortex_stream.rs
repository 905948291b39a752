//! vortex-stream: consume a PF/PE detection stream, write per-frame vortex
//! lines and inter-frame transition matrices.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::filter::LevelFilter;

use vortex_track::pipeline::{
    Backpressure, FrameRegistry, PipelineConfig, StreamingPipeline, VtkLineSink,
};

#[derive(Parser, Debug)]
#[command(name = "vortex-stream")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Trace and track vortex lines from a punctured-face stream", long_about = None)]
struct Cli {
    /// Input stream (defaults to stdin)
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Directory for vlines-*.vtk and *.match.* files (defaults to the working directory)
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Worker threads (0 = one per core)
    #[arg(long)]
    workers: Option<usize>,

    /// Maximum number of frames being extracted at once
    #[arg(long)]
    max_in_flight: Option<usize>,

    /// What to do when all worker slots are busy (block, drop)
    #[arg(long)]
    backpressure: Option<Backpressure>,

    /// Prefix for transition matrix files
    #[arg(long)]
    dataname: Option<String>,

    /// JSON pipeline configuration; flags override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

fn level_filter(s: &str) -> LevelFilter {
    match s.to_lowercase().as_str() {
        "trace" => LevelFilter::TRACE,
        "debug" => LevelFilter::DEBUG,
        "info" => LevelFilter::INFO,
        "warn" => LevelFilter::WARN,
        "error" => LevelFilter::ERROR,
        "off" => LevelFilter::OFF,
        _ => LevelFilter::INFO,
    }
}

fn resolve_config(cli: &Cli) -> anyhow::Result<PipelineConfig> {
    let mut cfg = match &cli.config {
        Some(path) => PipelineConfig::from_json_file(path)
            .with_context(|| format!("reading config {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    if let Some(w) = cli.workers {
        cfg.workers = w;
    }
    if let Some(m) = cli.max_in_flight {
        cfg.max_in_flight = m;
    }
    if let Some(b) = cli.backpressure {
        cfg.backpressure = b;
    }
    if let Some(d) = &cli.dataname {
        cfg.dataname = d.clone();
    }
    if let Some(dir) = &cli.output_dir {
        cfg.output_dir = Some(dir.clone());
    }
    if cfg.output_dir.is_none() {
        cfg.output_dir = Some(PathBuf::from("."));
    }
    cfg.validate()?;
    Ok(cfg)
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(level_filter(&cli.log_level))
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("cannot install logger: {e}"))?;

    let cfg = resolve_config(&cli)?;
    let out_dir = cfg.output_dir.clone().unwrap_or_else(|| PathBuf::from("."));
    let sink = Arc::new(
        VtkLineSink::new(&out_dir)
            .with_context(|| format!("preparing output directory {}", out_dir.display()))?,
    );
    let pipeline = StreamingPipeline::new(cfg, Arc::new(FrameRegistry::new()), sink)?;

    let input: Box<dyn Read> = match &cli.input {
        Some(path) => Box::new(BufReader::new(
            File::open(path).with_context(|| format!("opening {}", path.display()))?,
        )),
        None => Box::new(BufReader::new(std::io::stdin().lock())),
    };

    let summary = pipeline.run(input)?;
    if let Some(err) = &summary.stopped_by {
        log::warn!("input ended early: {err}");
    }
    println!(
        "messages={} frames={} extracted={} failed={} dropped={} matrices={}",
        summary.messages,
        summary.frames,
        summary.extracted,
        summary.failed,
        summary.dropped,
        summary.matrices
    );
    Ok(())
}
