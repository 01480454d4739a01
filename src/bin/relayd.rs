//! relayd - MJPEG relay daemon
//!
//! This daemon:
//! 1. Builds the configured input and output modules from their spec strings
//! 2. Starts every input's capture thread and every output's consumer thread
//! 3. Serves snapshots, multipart streams, commands and JSON descriptors
//!    over HTTP
//! 4. Tears everything down cooperatively on Ctrl-C

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::mpsc;

use mjpeg_relay::{module, HttpServer, RelaydConfig, StreamerContext};

#[derive(Parser, Debug)]
#[command(author, version, about = "MJPEG streaming relay daemon")]
struct Args {
    /// Path to the JSON configuration file.
    #[arg(long, env = "RELAY_CONFIG")]
    config: Option<PathBuf>,

    /// Input module spec(s), e.g. `test_picture:fps=5` (repeatable,
    /// overrides the config file).
    #[arg(short, long)]
    input: Vec<String>,

    /// Output module spec(s), e.g. `file:folder=/tmp/frames` (repeatable,
    /// overrides the config file).
    #[arg(short, long)]
    output: Vec<String>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut config = RelaydConfig::load(args.config.as_deref())?;
    if !args.input.is_empty() {
        config.inputs = args.input;
    }
    if !args.output.is_empty() {
        config.outputs = args.output;
    }

    let mut builder = StreamerContext::builder();
    for spec in &config.inputs {
        let (params, module) =
            module::build_input(spec).with_context(|| format!("input spec '{}'", spec))?;
        builder = builder.input(params, module);
    }
    for spec in &config.outputs {
        let (params, module) =
            module::build_output(spec).with_context(|| format!("output spec '{}'", spec))?;
        builder = builder.output(params, module);
    }
    let ctx = builder.build();

    ctx.start_all()?;
    let http = HttpServer::new((&config.http).into(), ctx.clone()).spawn()?;
    for addr in &http.addrs {
        log::info!("http server listening on {}", addr);
    }
    if config.http.credentials.is_some() {
        log::info!("http basic authentication enabled");
    }

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .expect("error setting Ctrl-C handler");

    log::info!("relayd running. waiting for shutdown signal (Ctrl-C)...");
    let _ = rx.recv();
    log::info!("shutdown signal received, stopping...");
    ctx.shutdown();
    http.stop()?;

    Ok(())
}
