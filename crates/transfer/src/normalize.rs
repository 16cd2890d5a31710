//! Image normalization.
//!
//! The host expects the OS image as a gzip stream. Images that already
//! carry the gzip magic pass through untouched; anything else is streamed
//! through the compressor into the working directory and the artifact is
//! rebound to the compressed copy.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use flate2::Compression;
use flate2::write::GzEncoder;
use tracing::{debug, info};

use rigrun_artifact::Artifact;

use crate::progress::{ProgressCallback, ProgressMeter};
use crate::{COPY_BUFFER_SIZE, GZIP_LEVEL, GZIP_MAGIC, TransferError};

/// Returns `true` if the file starts with [`GZIP_MAGIC`].
///
/// Files shorter than the magic are plain data, not gzip.
pub fn is_gzip(path: &Path) -> Result<bool, TransferError> {
    let mut file = File::open(path)?;
    let mut head = [0u8; 3];
    let mut filled = 0;
    while filled < head.len() {
        let n = file.read(&mut head[filled..])?;
        if n == 0 {
            return Ok(false);
        }
        filled += n;
    }
    Ok(head == GZIP_MAGIC)
}

/// Ensures an artifact's payload is a gzip stream.
///
/// Already-compressed sources are returned byte-identical. Otherwise the
/// source is compressed at the fixed level into `workdir/<name>` and the
/// returned artifact points at the new file. Compression runs on the
/// blocking pool; progress is reported through `on_progress`.
pub async fn ensure_gzip(
    artifact: Artifact,
    workdir: &Path,
    on_progress: ProgressCallback,
) -> Result<Artifact, TransferError> {
    let dest = workdir.join(artifact.name());

    let task = tokio::task::spawn_blocking(move || -> Result<Artifact, TransferError> {
        if is_gzip(artifact.source_path())? {
            debug!(
                artifact = artifact.name(),
                "source already compressed, leaving untouched"
            );
            return Ok(artifact);
        }

        let total = std::fs::metadata(artifact.source_path())?.len();
        info!(
            artifact = artifact.name(),
            bytes = total,
            "compressing image"
        );

        let mut source = File::open(artifact.source_path())?;
        let mut encoder = GzEncoder::new(File::create(&dest)?, Compression::new(GZIP_LEVEL));
        let mut meter = ProgressMeter::new(total, on_progress);

        let mut buf = vec![0u8; COPY_BUFFER_SIZE];
        loop {
            let n = source.read(&mut buf)?;
            if n == 0 {
                break;
            }
            encoder.write_all(&buf[..n])?;
            meter.add(n as u64);
        }
        encoder.finish()?.flush()?;
        meter.finish();

        Ok(artifact.with_source_path(dest))
    });

    match task.await {
        Ok(result) => result,
        Err(join_err) => Err(TransferError::Io(std::io::Error::other(join_err))),
    }
}
