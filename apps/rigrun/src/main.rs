//! rigrun — pushes test artifacts to a test host and attaches to the run.
//!
//! Flow: reset the working directory, push {suite, config, image} through
//! the hash-addressed upload pipeline, then bridge stdin/stdout to the live
//! run over `/start`. SIGINT/SIGTERM notify the host via `/stop` and exit
//! with `128 + signal`.

mod cli;
mod config;

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use rigrun_pipeline::RunContext;
use rigrun_session::{LiveSession, interrupt_exit_code, notify_stop};
use rigrun_transfer::{ProgressCallback, TransferProgress};

/// Progress lines are logged at most this often (plus once at completion).
const PROGRESS_LOG_INTERVAL: Duration = Duration::from_secs(1);

fn init_tracing() {
    // Logs go to stderr: stdout belongs to the bridged session.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("RIGRUN_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    init_tracing();

    let args = cli::Args::parse();
    let ctx = config::run_context(&args);

    spawn_signal_watcher(ctx.host.clone());

    if let Err(e) = run(ctx).await {
        let chain = format!("{e:#}");
        error!(error = %chain, "run failed");
        std::process::exit(1);
    }
}

async fn run(ctx: RunContext) -> anyhow::Result<()> {
    info!(host = %ctx.host, workdir = %ctx.workdir.display(), "starting run");

    rigrun_pipeline::run(&ctx, progress_logger())
        .await
        .context("artifact pipeline failed")?;

    info!("all artifacts accepted, starting live session");
    let mut session = LiveSession::new(CancellationToken::new());
    session
        .run(&ctx.host)
        .await
        .context("live session failed")?;

    info!("live session closed");
    Ok(())
}

/// Watches for SIGINT/SIGTERM; on the first one, notifies `/stop` and exits
/// with the signal-derived code. The stop request is best-effort: the exit
/// happens whether or not it lands, and a signal arriving after the session
/// already closed just exits the same way.
fn spawn_signal_watcher(host: String) {
    tokio::spawn(async move {
        let signo = match wait_for_interrupt().await {
            Ok(signo) => signo,
            Err(e) => {
                warn!(error = %e, "signal handler unavailable");
                return;
            }
        };
        info!(signal = signo, "interrupted, stopping the remote run");
        notify_stop(&host).await;
        std::process::exit(interrupt_exit_code(signo));
    });
}

async fn wait_for_interrupt() -> std::io::Result<i32> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        _ = interrupt.recv() => Ok(SignalKind::interrupt().as_raw_value()),
        _ = terminate.recv() => Ok(SignalKind::terminate().as_raw_value()),
    }
}

/// Renders pipeline progress as throttled log lines.
fn progress_logger() -> ProgressCallback {
    let last: Mutex<Option<Instant>> = Mutex::new(None);
    Arc::new(move |p: TransferProgress| {
        let mut last = last.lock().unwrap();
        let completed = p.transferred >= p.total;
        let due = last.is_none_or(|at| at.elapsed() >= PROGRESS_LOG_INTERVAL);
        if !due && !completed {
            return;
        }
        *last = Some(Instant::now());

        let percent = format!("{:.1}", p.percentage);
        match p.eta {
            Some(eta) => info!(
                percent = %percent,
                transferred = p.transferred,
                total = p.total,
                eta_secs = eta.as_secs(),
                "transfer progress"
            ),
            None => info!(
                percent = %percent,
                transferred = p.transferred,
                total = p.total,
                "transfer progress"
            ),
        }
    })
}
