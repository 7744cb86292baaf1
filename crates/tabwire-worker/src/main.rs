//! Tabwire Worker - command worker process for a controlling host.
//!
//! The host listens on a local port and starts this binary with that port.
//! The worker connects back, announces its pid and serves control messages
//! until the host sends `shutdown` or the connection drops.

use anyhow::{Context, Result};
use clap::Parser;
use tabwire_core::{Connection, DebugBuffer, ProtocolConfig, Worker};
use tracing::{info, Level};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "tabwire-worker")]
#[command(about = "Command worker serving a controlling host")]
struct Args {
    /// Port the host is listening on
    port: u16,

    /// Pass `debug` to trace worker lifecycle into the debug buffer
    mode: Option<String>,

    /// Host to connect to
    #[arg(long, default_value = "localhost")]
    host: String,

    /// Write log lines to stderr instead of the debug buffer
    #[arg(long)]
    log_stderr: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    let debug = args.mode.as_deref() == Some(ProtocolConfig::DEBUG_LITERAL);

    // Set up logging. The host only sees what lands in the debug buffer.
    let debug_buffer = DebugBuffer::new();
    let writer = if args.log_stderr {
        BoxMakeWriter::new(std::io::stderr)
    } else {
        BoxMakeWriter::new(debug_buffer.clone())
    };
    let log_level = if debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(writer)
        .with_ansi(args.log_stderr)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    info!("Starting Tabwire worker");

    let conn = Connection::connect(&args.host, args.port)
        .await
        .with_context(|| format!("failed to connect to {}:{}", args.host, args.port))?;

    Worker::builder()
        .debug(debug)
        .with_debug_buffer(debug_buffer)
        .build(conn)?
        .run()
        .await?;

    info!("Worker exiting");
    Ok(())
}
