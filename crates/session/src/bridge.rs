//! The live session bridge.

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use futures_util::StreamExt;
use tracing::{debug, info};

use crate::SessionError;
use crate::pumps;

/// Outbound frames queued between the pumps and the wire.
const WRITE_QUEUE_CAPACITY: usize = 64;

/// Lifecycle of the live channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Open,
    Closing,
    Closed,
}

/// Duplex bridge between the local terminal and a running test.
///
/// One instance exists per run, created only after every artifact has been
/// accepted. Cancelling the token tears the bridge down from outside; a
/// token cancelled after the session already closed is a no-op.
pub struct LiveSession {
    state: SessionState,
    cancel: CancellationToken,
}

impl LiveSession {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            state: SessionState::Connecting,
            cancel,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Bridges stdin/stdout to `ws://<host>/start` until the channel ends.
    pub async fn run(&mut self, host: &str) -> Result<(), SessionError> {
        self.run_with_io(host, tokio::io::stdin(), tokio::io::stdout())
            .await
    }

    /// [`run`](Self::run) with the local endpoints injected.
    pub async fn run_with_io<I, O>(
        &mut self,
        host: &str,
        input: I,
        mut output: O,
    ) -> Result<(), SessionError>
    where
        I: AsyncRead + Unpin + Send + 'static,
        O: AsyncWrite + Unpin,
    {
        let url = format!("ws://{host}/start");
        let (ws, _) = tokio_tungstenite::connect_async(url.as_str()).await?;
        self.state = SessionState::Open;
        info!(%url, "live session open");

        let (write, read) = ws.split();
        let (write_tx, write_rx) = mpsc::channel(WRITE_QUEUE_CAPACITY);

        let write_handle = tokio::spawn(pumps::write_pump(write, write_rx, self.cancel.clone()));
        let input_handle = tokio::spawn(pumps::input_pump(
            input,
            write_tx.clone(),
            self.cancel.clone(),
        ));

        // The inbound pump runs in place; when it finishes, the run is over
        // one way or another and the outbound side is wound down.
        let result = pumps::read_pump(read, &mut output, write_tx, self.cancel.clone()).await;

        self.state = SessionState::Closing;
        self.cancel.cancel();
        input_handle.abort();
        let _ = write_handle.await;
        self.state = SessionState::Closed;
        debug!("live session closed");

        result
    }
}
