//! flowline - Main Entry Point
//!
//! Runs a pipeline described by a config file over standard input:
//!
//! ```text
//! flowline <pipeline.toml|pipeline.json> [--log-file <path>]
//! ```
//!
//! Every stdin line is pushed as a `String` message; every `String` reaching
//! the pipeline's exit is printed. The process exits non-zero if a node faults.

use anyhow::{bail, Context as _};
use flowline::config::PipelineConfig;
use flowline::pipeline::{PipelineBuilder, PipelineError};
use flowline::pipeline::registry::NodeRegistry;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

struct Args {
    config: PathBuf,
    log_file: Option<PathBuf>,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut config = None;
    let mut log_file = None;
    let mut args = std::env::args_os().skip(1);

    while let Some(arg) = args.next() {
        if arg == "--log-file" {
            let path = args.next().context("--log-file needs a path")?;
            log_file = Some(PathBuf::from(path));
        } else if config.is_none() {
            config = Some(PathBuf::from(arg));
        } else {
            bail!("unexpected argument {:?}", arg);
        }
    }

    Ok(Args {
        config: config.context("usage: flowline <config> [--log-file <path>]")?,
        log_file,
    })
}

fn main() -> anyhow::Result<()> {
    let args = parse_args()?;

    // Logs go to stderr (stdout carries pipeline output), plus an optional file.
    let (file_layer, _guard) = match &args.log_file {
        Some(path) => {
            let file = std::fs::File::create(path)
                .with_context(|| format!("Failed to create log file {:?}", path))?;
            let (writer, guard) = tracing_appender::non_blocking(file);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,flowline=debug")),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .init();

    let config = PipelineConfig::load(&args.config)?;
    let registry = NodeRegistry::with_builtins();
    let (builder, handler) = PipelineBuilder::from_config(&config, &registry)?.escalate_faults();
    let mut pipeline = builder.start()?;

    let exit_key = pipeline
        .output_keys()
        .next()
        .map(str::to_owned)
        .context("pipeline has no exit port")?;
    let output = pipeline
        .take_output(&exit_key)
        .context("exit port already taken")?;

    let printer = std::thread::Builder::new()
        .name("printer".to_string())
        .spawn(move || -> io::Result<u64> {
            let stdout = io::stdout();
            let mut out = stdout.lock();
            let mut printed = 0;
            for message in output {
                match message.unpack::<String>() {
                    Some(line) => {
                        writeln!(out, "{}", line)?;
                        printed += 1;
                    }
                    None => tracing::warn!("Skipping non-text output message"),
                }
            }
            out.flush()?;
            Ok(printed)
        })
        .context("Failed to spawn printer thread")?;

    for line in io::stdin().lock().lines() {
        let line = line.context("Failed to read stdin")?;
        match pipeline.push(line) {
            Ok(()) => {}
            Err(PipelineError::Aborted | PipelineError::ChannelClosed) => {
                tracing::warn!("Pipeline stopped accepting input");
                break;
            }
            Err(e) => return Err(e.into()),
        }
    }

    let report = pipeline.join();
    let printed = printer
        .join()
        .map_err(|_| anyhow::anyhow!("printer thread panicked"))??;
    tracing::info!("Printed {} messages", printed);

    if !report.is_success() {
        for fault in handler.faults() {
            eprintln!("node '{}' faulted: {}", fault.node, fault.message);
        }
        std::process::exit(1);
    }
    Ok(())
}
