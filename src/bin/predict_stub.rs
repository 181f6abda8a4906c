//! predict_stub - local stand-in for the WaveTrack inference service
//!
//! This daemon:
//! 1. Serves `POST /predict/` and `GET /health`
//! 2. Answers with deterministic detections derived from the uploaded image
//! 3. Runs no model

use anyhow::{anyhow, Result};
use clap::Parser;
use std::sync::mpsc;

use wavetrack::{StubBehavior, StubConfig, StubServer};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Serve a fake ship detection endpoint for local testing"
)]
struct Args {
    /// Address to listen on.
    #[arg(long, env = "WAVETRACK_STUB_ADDR", default_value = "127.0.0.1:8000")]
    addr: String,

    /// Answer every request with this error message instead of detections.
    #[arg(long, value_name = "MESSAGE", conflicts_with = "fail_status")]
    report_error: Option<String>,

    /// Answer every request with this HTTP status instead of detections.
    #[arg(long, value_name = "CODE")]
    fail_status: Option<u16>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let behavior = match (args.report_error, args.fail_status) {
        (Some(message), _) => StubBehavior::ReportError(message),
        (None, Some(code)) if !(100..=599).contains(&code) => {
            return Err(anyhow!("--fail-status must be a valid HTTP status code"));
        }
        (None, Some(code)) => StubBehavior::FailStatus(code),
        (None, None) => StubBehavior::Detect,
    };

    let handle = StubServer::new(StubConfig {
        addr: args.addr,
        behavior: behavior.clone(),
    })
    .spawn()?;
    log::info!("predict stub listening on {}", handle.endpoint());
    if behavior != StubBehavior::Detect {
        log::warn!("predict stub will not detect anything: {:?}", behavior);
    }

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;

    log::info!("predict_stub waiting for shutdown signal (Ctrl-C)...");
    let _ = rx.recv();
    log::info!(
        "shutdown signal received after {} predict requests, stopping...",
        handle.request_count()?
    );
    handle.stop()?;

    Ok(())
}
