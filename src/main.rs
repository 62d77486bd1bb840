//! CLI entry point for the netbound tool.

use std::io::{self, IsTerminal, Read, Write};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use netbound_http::{
    DescriptorError, NetworkBoundHttp, PluginError, RequestDefaults, RequestDescriptor, RequestEvent,
    SystemConnectivity, event_channel,
};
use serde_json::Value;
use tracing::{debug, info, warn};

mod app_config;
mod cli;
mod progress;

use app_config::load_default_file_config;
use cli::Args;
use progress::TransferProgress;

/// Exit status after an interrupt, as shells report SIGINT.
const EXIT_INTERRUPTED: u8 = 130;

/// How long an interrupted request gets to clean up its partial output.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    let loaded = load_default_file_config().context("failed to load config file")?;

    // Priority: RUST_LOG env var > quiet flag > verbose flag > config verbosity > info
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => loaded.config.verbosity.map_or("info", |v| v.level()),
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    // stdout carries the event stream, so logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");
    if loaded.loaded_from_file {
        debug!(
            path = ?loaded.path,
            verbosity = loaded.config.verbosity.map(|v| v.as_str()),
            "Loaded config file"
        );
    }

    let defaults = loaded
        .config
        .request_defaults(args.timeout_ms, args.network);
    let options = loaded.config.executor_options(args.no_status);

    let service = NetworkBoundHttp::new(Arc::new(SystemConnectivity::new()))
        .with_executor_options(options)
        .with_defaults(defaults);

    let (sink, mut events) = event_channel();
    service.on_listen(Arc::new(sink));

    let mut task = if args.json {
        let arguments = read_json_arguments()?;
        service.send_request(&arguments)
    } else {
        build_descriptor(&args, &defaults)
            .map_err(PluginError::from)
            .and_then(|descriptor| service.submit(descriptor))
    }
    .map_err(|e| anyhow!("{}: {e}", e.code()))?;

    let progress = TransferProgress::new(!args.quiet && io::stderr().is_terminal());
    let mut stdout = io::stdout().lock();
    let mut failed = false;

    let interrupted = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };
    tokio::pin!(interrupted);

    loop {
        tokio::select! {
            () = &mut interrupted => {
                warn!("Interrupted, cancelling request");
                service.shutdown();
                // The task removes the partial output file before it ends
                match tokio::time::timeout(SHUTDOWN_GRACE, &mut task).await {
                    Ok(Err(e)) => warn!(error = %e, "Request task did not finish cleanly"),
                    Err(_) => warn!("Request task still running after cancellation"),
                    Ok(Ok(())) => {}
                }
                progress.finish();
                return Ok(ExitCode::from(EXIT_INTERRUPTED));
            }
            event = events.recv() => {
                let Some(event) = event else { break };
                progress.observe(&event);
                let line = serde_json::to_string(&event).context("failed to encode event")?;
                writeln!(stdout, "{line}").context("failed to write event")?;
                if event.is_terminal() {
                    failed = matches!(event, RequestEvent::Error { .. });
                    break;
                }
            }
        }
    }
    stdout.flush().context("failed to flush stdout")?;

    // The request task ends right after its terminal event
    if let Err(e) = task.await {
        warn!(error = %e, "Request task did not finish cleanly");
    }
    service.on_cancel();

    info!(failed, "Request finished");
    Ok(if failed { ExitCode::FAILURE } else { ExitCode::SUCCESS })
}

fn read_json_arguments() -> Result<Value> {
    let mut buffer = String::new();
    io::stdin()
        .read_to_string(&mut buffer)
        .context("failed to read request from stdin")?;
    serde_json::from_str(&buffer).context("stdin is not a valid JSON request map")
}

fn build_descriptor(
    args: &Args,
    defaults: &RequestDefaults,
) -> Result<RequestDescriptor, DescriptorError> {
    let uri = args.uri.clone().unwrap_or_default();
    let mut builder = RequestDescriptor::builder(&args.id, uri, &args.method)
        .transport(defaults.transport)
        .timeout(defaults.timeout);

    let headers = args
        .parsed_headers()
        .map_err(|reason| DescriptorError::invalid("headers", reason))?;
    for (name, value) in headers {
        builder = builder.header(name, value);
    }
    if let Some(data) = &args.data {
        builder = builder.body(data.as_bytes().to_vec());
    }
    if let Some(output) = &args.output {
        builder = builder.output_destination(output.clone());
    }
    builder.build()
}
