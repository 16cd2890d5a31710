//! Outbound pumps — local input into the write queue, queue onto the wire.

use futures_util::SinkExt;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Serialises queued messages onto the WebSocket.
///
/// Runs until the queue closes, the bridge is cancelled, or the sink
/// errors; a close frame is sent on the way out.
pub(crate) async fn write_pump<S>(
    mut write: S,
    mut write_rx: mpsc::Receiver<tungstenite::Message>,
    cancel: CancellationToken,
) where
    S: SinkExt<tungstenite::Message, Error = tungstenite::Error> + Unpin,
{
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            msg = write_rx.recv() => {
                match msg {
                    Some(m) => {
                        if let Err(e) = write.send(m).await {
                            error!(error = %e, "session channel write failed");
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    }

    let _ = write.send(tungstenite::Message::Close(None)).await;
}

/// Reads local input and queues it for the host as binary frames.
///
/// Input EOF only stops this pump; the session stays open so the host can
/// keep streaming output for a run that needs no further input.
pub(crate) async fn input_pump<R>(
    mut input: R,
    write_tx: mpsc::Sender<tungstenite::Message>,
    cancel: CancellationToken,
) where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; 8192];
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            n = input.read(&mut buf) => {
                match n {
                    Ok(0) => {
                        debug!("local input closed");
                        break;
                    }
                    Ok(n) => {
                        let frame = tungstenite::Message::Binary(buf[..n].to_vec().into());
                        if write_tx.send(frame).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "local input read failed");
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::sink;

    fn capture_sink() -> (
        impl SinkExt<tungstenite::Message, Error = tungstenite::Error> + Unpin,
        mpsc::Receiver<tungstenite::Message>,
    ) {
        let (tx, rx) = mpsc::channel::<tungstenite::Message>(16);
        let sink = Box::pin(sink::unfold(
            tx,
            |tx, msg: tungstenite::Message| async move {
                let _ = tx.send(msg).await;
                Ok::<_, tungstenite::Error>(tx)
            },
        ));
        (sink, rx)
    }

    #[tokio::test]
    async fn write_pump_drains_queue_then_closes() {
        let (sink, mut seen) = capture_sink();
        let (write_tx, write_rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();

        write_tx
            .send(tungstenite::Message::Binary(b"hello".to_vec().into()))
            .await
            .unwrap();
        drop(write_tx);

        write_pump(sink, write_rx, cancel).await;

        let first = seen.recv().await.unwrap();
        assert!(matches!(first, tungstenite::Message::Binary(ref b) if b.as_ref() == b"hello"));
        let last = seen.recv().await.unwrap();
        assert!(matches!(last, tungstenite::Message::Close(_)));
    }

    #[tokio::test]
    async fn write_pump_stops_on_cancel() {
        let (sink, mut seen) = capture_sink();
        let (_write_tx, write_rx) = mpsc::channel::<tungstenite::Message>(16);
        let cancel = CancellationToken::new();
        cancel.cancel();

        tokio::time::timeout(
            std::time::Duration::from_secs(2),
            write_pump(sink, write_rx, cancel),
        )
        .await
        .expect("pump should stop");

        let close = seen.recv().await.unwrap();
        assert!(matches!(close, tungstenite::Message::Close(_)));
    }

    #[tokio::test]
    async fn input_pump_frames_bytes() {
        let (write_tx, mut write_rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();

        let input: &[u8] = b"run test 42\n";
        input_pump(input, write_tx, cancel).await;

        let frame = write_rx.recv().await.unwrap();
        match frame {
            tungstenite::Message::Binary(data) => assert_eq!(data.as_ref(), b"run test 42\n"),
            other => panic!("expected binary frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn input_pump_stops_on_eof_without_closing_queue_users() {
        let (write_tx, mut write_rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();

        let keepalive_tx = write_tx.clone();
        let empty: &[u8] = b"";
        input_pump(empty, write_tx, cancel).await;

        // Another holder of the queue can still send after input EOF.
        keepalive_tx
            .send(tungstenite::Message::Pong(b"x".to_vec().into()))
            .await
            .unwrap();
        assert!(write_rx.recv().await.is_some());
    }
}
