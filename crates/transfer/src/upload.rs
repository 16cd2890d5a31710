//! Hash-addressed upload protocol client.
//!
//! One request per artifact: the logical name and content hash travel as
//! headers, the gzip'd tar body streams up, and the host's inline
//! `key: value` response lines are interpreted as they arrive. The host may
//! short-circuit with a cache hit before the body finishes, in which case
//! the in-flight transfer is dropped.

use futures_util::StreamExt;
use reqwest::Body;
use tokio::sync::mpsc;
use tracing::{debug, info};

use rigrun_artifact::Artifact;

use crate::TransferError;
use crate::package::spawn_packager;
use crate::progress::ProgressCallback;
use crate::wire::LineDecoder;

/// Header carrying the artifact's logical name.
pub const HEADER_ARTIFACT: &str = "x-artifact";

/// Header carrying the artifact's content or aggregate hash.
pub const HEADER_ARTIFACT_HASH: &str = "x-artifact-hash";

/// Terminal result of one artifact's transfer.
#[derive(Debug)]
pub enum UploadOutcome {
    /// The host already holds this content under this hash; the body was
    /// not sent (or was cut short).
    Cached,
    /// The full body was received and stored.
    Uploaded,
    /// The transfer failed; the run cannot continue.
    Failed(TransferError),
}

/// Client for the host's `/upload` endpoint.
pub struct UploadClient {
    http: reqwest::Client,
    host: String,
}

impl UploadClient {
    /// Creates a client for `host` (`hostname` or `hostname:port`).
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            host: host.into(),
        }
    }

    /// Streams one artifact to the host and resolves exactly one outcome.
    ///
    /// The packager runs concurrently with response consumption; a cache
    /// hit or error line resolves immediately and drops the rest of the
    /// body, while `done` is confirmed once the response stream ends.
    pub async fn upload(
        &self,
        artifact: &Artifact,
        hash: &str,
        excludes: &[String],
        on_progress: ProgressCallback,
    ) -> UploadOutcome {
        let body_rx = spawn_packager(artifact.clone(), excludes.to_vec(), on_progress);

        let url = format!("http://{}/upload", self.host);
        info!(artifact = artifact.name(), %hash, "uploading");

        let request = self
            .http
            .post(&url)
            .header(HEADER_ARTIFACT, artifact.name())
            .header(HEADER_ARTIFACT_HASH, hash)
            .body(Body::wrap_stream(chunk_stream(body_rx)));

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => return UploadOutcome::Failed(TransferError::Transport(e)),
        };

        let mut stream = response.bytes_stream();
        let mut decoder = LineDecoder::new();
        let mut done = false;

        while let Some(next) = stream.next().await {
            let chunk = match next {
                Ok(chunk) => chunk,
                Err(e) => return UploadOutcome::Failed(TransferError::Transport(e)),
            };
            decoder.extend(&chunk);

            while let Some(line) = decoder.next_line() {
                match (line.key.as_str(), line.value.as_str()) {
                    ("upload", "cache") => {
                        info!(artifact = artifact.name(), "cache hit, transfer skipped");
                        return UploadOutcome::Cached;
                    }
                    ("upload", "done") => done = true,
                    ("error", _) => {
                        return UploadOutcome::Failed(TransferError::Server(line.value));
                    }
                    _ => {
                        debug!(key = %line.key, value = %line.value, "ignoring response line");
                    }
                }
            }
        }

        if done {
            UploadOutcome::Uploaded
        } else {
            UploadOutcome::Failed(TransferError::Server(
                "connection closed before the upload was acknowledged".into(),
            ))
        }
    }
}

/// Adapts the packager channel into a request body stream.
fn chunk_stream(
    rx: mpsc::Receiver<Vec<u8>>,
) -> impl futures_util::Stream<Item = Result<Vec<u8>, std::io::Error>> {
    futures_util::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|chunk| (Ok(chunk), rx))
    })
}
