//! Inbound pump — channel bytes to local output, keepalive answered in-line.

use futures_util::StreamExt;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::SessionError;

/// Forwards channel traffic to `out` until the stream ends or the bridge is
/// cancelled.
///
/// Keepalive probes are answered immediately through the write queue with a
/// pong carrying the probe's payload. A transport error is ordinary stream
/// termination here: the run is over either way, so it is logged and the
/// pump returns cleanly.
pub(crate) async fn read_pump<S, W>(
    mut read: S,
    out: &mut W,
    write_tx: mpsc::Sender<tungstenite::Message>,
    cancel: CancellationToken,
) -> Result<(), SessionError>
where
    S: StreamExt<Item = Result<tungstenite::Message, tungstenite::Error>> + Unpin,
    W: AsyncWrite + Unpin,
{
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            msg = read.next() => {
                match msg {
                    Some(Ok(tungstenite::Message::Binary(data))) => {
                        out.write_all(&data).await?;
                        out.flush().await?;
                    }
                    Some(Ok(tungstenite::Message::Text(text))) => {
                        out.write_all(text.as_bytes()).await?;
                        out.flush().await?;
                    }
                    Some(Ok(tungstenite::Message::Ping(payload))) => {
                        trace!("keepalive probe, answering");
                        let _ = write_tx.send(tungstenite::Message::Pong(payload)).await;
                    }
                    Some(Ok(tungstenite::Message::Pong(_))) => {}
                    Some(Ok(tungstenite::Message::Close(_))) => {
                        debug!("host closed the session channel");
                        break;
                    }
                    Some(Ok(_)) => {} // Raw frames — not produced by this transport.
                    Some(Err(e)) => {
                        warn!(error = %e, "session channel dropped");
                        break;
                    }
                    None => {
                        debug!("session channel ended");
                        break;
                    }
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;
    use tokio::io::AsyncReadExt;

    fn msgs(
        items: Vec<tungstenite::Message>,
    ) -> impl StreamExt<Item = Result<tungstenite::Message, tungstenite::Error>> + Unpin {
        stream::iter(items.into_iter().map(Ok))
    }

    #[tokio::test]
    async fn forwards_binary_and_text_to_output() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        let (write_tx, _write_rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();

        let stream = msgs(vec![
            tungstenite::Message::Binary(b"binary ".to_vec().into()),
            tungstenite::Message::Text("text".into()),
        ]);
        read_pump(stream, &mut client, write_tx, cancel)
            .await
            .unwrap();
        drop(client);

        let mut seen = Vec::new();
        server.read_to_end(&mut seen).await.unwrap();
        assert_eq!(seen, b"binary text");
    }

    #[tokio::test]
    async fn answers_ping_with_matching_pong() {
        let (mut client, _server) = tokio::io::duplex(64);
        let (write_tx, mut write_rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();

        let stream = msgs(vec![tungstenite::Message::Ping(
            b"probe-7".to_vec().into(),
        )]);
        read_pump(stream, &mut client, write_tx, cancel)
            .await
            .unwrap();

        let reply = write_rx.recv().await.unwrap();
        match reply {
            tungstenite::Message::Pong(payload) => {
                assert_eq!(payload.as_ref(), b"probe-7");
            }
            other => panic!("expected pong, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn stops_on_close_frame() {
        let (mut client, mut server) = tokio::io::duplex(64);
        let (write_tx, _write_rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();

        let stream = msgs(vec![
            tungstenite::Message::Close(None),
            tungstenite::Message::Binary(b"never delivered".to_vec().into()),
        ]);
        read_pump(stream, &mut client, write_tx, cancel)
            .await
            .unwrap();
        drop(client);

        let mut seen = Vec::new();
        server.read_to_end(&mut seen).await.unwrap();
        assert!(seen.is_empty());
    }

    #[tokio::test]
    async fn transport_error_terminates_cleanly() {
        let (mut client, _server) = tokio::io::duplex(64);
        let (write_tx, _write_rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();

        let stream = stream::iter(vec![Err(tungstenite::Error::ConnectionClosed)]);
        let result = read_pump(stream, &mut client, write_tx, cancel).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn cancellation_stops_the_pump() {
        let (mut client, _server) = tokio::io::duplex(64);
        let (write_tx, _write_rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let pending =
            stream::pending::<Result<tungstenite::Message, tungstenite::Error>>();
        let result = tokio::time::timeout(
            std::time::Duration::from_secs(2),
            read_pump(pending, &mut client, write_tx, cancel),
        )
        .await;
        assert!(result.is_ok());
    }
}
