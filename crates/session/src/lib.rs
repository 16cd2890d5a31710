//! Live duplex session with the test host.
//!
//! Once every artifact is accepted, the run starts over a WebSocket at
//! `/start` and this crate bridges the local terminal to it: stdin bytes go
//! up the channel, channel bytes come back out on stdout, and keepalive
//! probes are answered in-line. The bridge ends when the channel closes or
//! the run is cancelled from outside; interruption additionally fires a
//! best-effort stop request at `/stop`.

mod bridge;
mod pumps;

pub use bridge::{LiveSession, SessionState};

use tracing::{debug, warn};

/// Errors from the live session bridge.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("WebSocket error: {0}")]
    Ws(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Exit code for a run terminated by a signal.
pub fn interrupt_exit_code(signo: i32) -> i32 {
    128 + signo
}

/// Fire-and-forget stop notification, used on interruption.
///
/// The remote end tears the run down on its own if this never arrives, so
/// delivery failure is logged and swallowed.
pub async fn notify_stop(host: &str) {
    let url = format!("http://{host}/stop");
    match reqwest::Client::new().post(&url).send().await {
        Ok(_) => debug!("stop request delivered"),
        Err(e) => warn!(error = %e, "stop request failed"),
    }
}
