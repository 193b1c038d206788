//! StreamRelay CLI - relay streams on a background worker
//!
//! Pipes files and child process output through a [`StreamRelay`].

use clap::Parser;
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use streamrelay::config::{CliArgs, Commands, LogFormat, PipeArgs, RelayArgs, RelayConfig};
use streamrelay::core::{RelayHandle, StreamRelay};
use streamrelay::endpoint::{Sink, Source, WriterSink};
use streamrelay::error::{IoResultExt, RelayError, Result};
use streamrelay::progress::ProgressReporter;
use tracing_subscriber::EnvFilter;

fn main() {
    // Parse CLI arguments
    let args = CliArgs::parse();

    init_logging(&args);

    // Handle result
    match run(args) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

fn init_logging(args: &CliArgs) {
    let default_level = match (args.quiet, args.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        (false, _) => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr);

    match args.log_format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn run(args: CliArgs) -> Result<i32> {
    match &args.command {
        Commands::Pipe(pipe) => cmd_pipe(pipe, args.quiet, args.verbose),
        Commands::Exec { relay, command } => cmd_exec(relay, command),
        Commands::Config { output } => cmd_config(output.as_deref()),
    }
}

fn relay_config(args: &RelayArgs) -> Result<RelayConfig> {
    RelayConfig::from_cli(args).map_err(RelayError::ConfigError)
}

fn cmd_pipe(args: &PipeArgs, quiet: bool, verbose: u8) -> Result<i32> {
    let config = relay_config(&args.relay)?;
    if config.non_blocking() {
        // Polling never sees end of stream on its own; only exec knows when to stop.
        return Err(RelayError::config(
            "pipe relays until end of input; --non-blocking is only supported by exec",
        ));
    }

    let source = open_source(args.input.as_deref())?;
    let sink = open_sink(args.output.as_deref())?;

    let relay = StreamRelay::from_config(source, sink, &config)?;
    relay.start()?;

    let progress = if quiet || !args.progress {
        ProgressReporter::disabled()
    } else {
        ProgressReporter::new()
    };
    let stats = progress.track(&relay.handle())?;

    if verbose > 0 && !quiet {
        stats.print_summary();
    }

    relay.join()?.into_result()?;
    Ok(0)
}

fn cmd_exec(args: &RelayArgs, command: &[String]) -> Result<i32> {
    let config = relay_config(args)?;
    let (program, rest) = command
        .split_first()
        .ok_or_else(|| RelayError::config("no command given"))?;

    let mut child = Command::new(program)
        .args(rest)
        .stdin(Stdio::inherit())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_path(program)?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| RelayError::config("child stdout was not captured"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| RelayError::config("child stderr was not captured"))?;

    let out_relay = StreamRelay::from_config(
        pipe_source(stdout),
        WriterSink::new(io::stdout()),
        &RelayConfig {
            autoflush: true,
            ..config.clone()
        },
    )?;
    let err_relay = StreamRelay::from_config(
        pipe_source(stderr),
        WriterSink::new(io::stderr()),
        &RelayConfig {
            autoflush: true,
            ..config
        },
    )?;

    out_relay.start()?;
    err_relay.start()?;
    tracing::info!(program = %program, pid = child.id(), "Relaying child output");

    let status = child.wait().with_path(program)?;
    tracing::debug!(%status, "Child exited");

    let handles = [out_relay.handle(), err_relay.handle()];
    for handle in &handles {
        handle.stop();
    }
    for handle in &handles {
        handle.wait_for()?;
        report_fault(handle);
    }

    Ok(status.code().unwrap_or(1))
}

fn cmd_config(output: Option<&Path>) -> Result<i32> {
    let config = RelayConfig::default();
    match output {
        Some(path) => {
            config.save(path)?;
            eprintln!("Wrote default configuration to {}", path.display());
        }
        None => println!("{}", serde_json::to_string_pretty(&config)?),
    }
    Ok(0)
}

fn report_fault(handle: &RelayHandle) {
    if let Some(fault) = handle.fault() {
        tracing::warn!(%fault, "Relay finished with a fault");
    }
}

fn is_stdio(path: Option<&Path>) -> bool {
    path.map_or(true, |p| p.as_os_str() == "-")
}

fn open_source(path: Option<&Path>) -> Result<Box<dyn Source>> {
    if is_stdio(path) {
        return Ok(pipe_source(io::stdin()));
    }
    let path = path.map(PathBuf::from).unwrap_or_default();
    let file = std::fs::File::open(&path).with_path(&path)?;
    Ok(pipe_source(file))
}

fn open_sink(path: Option<&Path>) -> Result<Box<dyn Sink>> {
    if is_stdio(path) {
        return Ok(Box::new(WriterSink::new(io::stdout())));
    }
    let path = path.map(PathBuf::from).unwrap_or_default();
    let file = std::fs::File::create(&path).with_path(&path)?;
    Ok(Box::new(WriterSink::new(BufWriter::new(file))))
}

#[cfg(unix)]
fn pipe_source<R>(reader: R) -> Box<dyn Source>
where
    R: io::Read + std::os::unix::io::AsRawFd + Send + 'static,
{
    Box::new(streamrelay::endpoint::FdSource::new(reader))
}

#[cfg(not(unix))]
fn pipe_source<R>(reader: R) -> Box<dyn Source>
where
    R: io::Read + Send + 'static,
{
    Box::new(streamrelay::endpoint::ReaderSource::new(reader))
}
