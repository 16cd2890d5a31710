//! Streaming tar+gzip packaging.
//!
//! The upload body is produced on the blocking pool: a tar stream of the
//! artifact (entry names rooted at the logical name), gzip'd at the fixed
//! level, chunked into a bounded channel. `blocking_send` on a full channel
//! is the backpressure point; the whole pipeline stalls until the network
//! send drains a chunk, so memory stays bounded for payloads of any size.
//!
//! A dropped receiver is not a failure: it is how a cache hit cancels the
//! rest of the body.

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;

use flate2::Compression;
use flate2::write::GzEncoder;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use rigrun_artifact::{Artifact, ArtifactKind};

use crate::progress::{ProgressCallback, ProgressMeter};
use crate::{BODY_CHANNEL_CAPACITY, COPY_BUFFER_SIZE, GZIP_LEVEL};

/// Spawns the packaging task and returns the channel feeding the request
/// body.
pub(crate) fn spawn_packager(
    artifact: Artifact,
    excludes: Vec<String>,
    on_progress: ProgressCallback,
) -> mpsc::Receiver<Vec<u8>> {
    let (tx, rx) = mpsc::channel(BODY_CHANNEL_CAPACITY);
    tokio::task::spawn_blocking(move || {
        if let Err(e) = package(&artifact, &excludes, tx, on_progress) {
            if e.kind() == io::ErrorKind::BrokenPipe {
                debug!(
                    artifact = artifact.name(),
                    "body no longer consumed, packager stopping"
                );
            } else {
                warn!(artifact = artifact.name(), error = %e, "packaging failed");
            }
        }
    });
    rx
}

fn package(
    artifact: &Artifact,
    excludes: &[String],
    tx: mpsc::Sender<Vec<u8>>,
    on_progress: ProgressCallback,
) -> io::Result<()> {
    let total = payload_size(artifact, excludes)?;
    let mut meter = ProgressMeter::new(total, on_progress);

    let writer = ChannelWriter::new(tx);
    let encoder = GzEncoder::new(writer, Compression::new(GZIP_LEVEL));
    let mut builder = tar::Builder::new(encoder);

    match artifact.kind() {
        ArtifactKind::File => {
            append_file(
                &mut builder,
                artifact.source_path(),
                Path::new(artifact.name()),
                &mut meter,
            )?;
        }
        ArtifactKind::Directory => {
            builder.append_dir(artifact.name(), artifact.source_path())?;
            append_tree(
                &mut builder,
                artifact.source_path(),
                Path::new(artifact.name()),
                excludes,
                &mut meter,
            )?;
        }
    }

    let encoder = builder.into_inner()?;
    let mut writer = encoder.finish()?;
    writer.flush()?;
    meter.finish();
    Ok(())
}

/// Payload bytes the tar stream will carry, for progress reporting.
fn payload_size(artifact: &Artifact, excludes: &[String]) -> io::Result<u64> {
    fn dir_size(dir: &Path, excludes: &[String]) -> io::Result<u64> {
        let mut total = 0;
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name();
            if excludes.iter().any(|ex| name.to_string_lossy() == ex.as_str()) {
                continue;
            }
            let metadata = entry.metadata()?;
            if metadata.is_dir() {
                total += dir_size(&entry.path(), excludes)?;
            } else if metadata.is_file() {
                total += metadata.len();
            }
        }
        Ok(total)
    }

    match artifact.kind() {
        ArtifactKind::File => Ok(std::fs::metadata(artifact.source_path())?.len()),
        ArtifactKind::Directory => dir_size(artifact.source_path(), excludes),
    }
}

/// Recursively appends a directory's contents under `logical` entry names,
/// skipping excluded names at every depth.
fn append_tree<W: Write>(
    builder: &mut tar::Builder<W>,
    dir: &Path,
    logical: &Path,
    excludes: &[String],
    meter: &mut ProgressMeter,
) -> io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        if excludes.iter().any(|ex| name.to_string_lossy() == ex.as_str()) {
            continue;
        }

        let path = entry.path();
        let entry_name = logical.join(&name);
        let metadata = entry.metadata()?;

        if metadata.is_dir() {
            builder.append_dir(&entry_name, &path)?;
            append_tree(builder, &path, &entry_name, excludes, meter)?;
        } else if metadata.is_file() {
            append_file(builder, &path, &entry_name, meter)?;
        }
    }
    Ok(())
}

/// Appends one file, counting its bytes into the progress meter as they
/// move through the tar stream.
fn append_file<W: Write>(
    builder: &mut tar::Builder<W>,
    path: &Path,
    entry_name: &Path,
    meter: &mut ProgressMeter,
) -> io::Result<()> {
    let file = File::open(path)?;
    let metadata = file.metadata()?;

    let mut header = tar::Header::new_gnu();
    header.set_metadata(&metadata);

    builder.append_data(
        &mut header,
        entry_name,
        CountingReader {
            inner: file,
            meter,
        },
    )
}

/// Read adapter that reports bytes into a [`ProgressMeter`].
struct CountingReader<'a> {
    inner: File,
    meter: &'a mut ProgressMeter,
}

impl Read for CountingReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.meter.add(n as u64);
        Ok(n)
    }
}

/// Write half that turns packaged bytes into bounded channel chunks.
struct ChannelWriter {
    tx: mpsc::Sender<Vec<u8>>,
    buf: Vec<u8>,
}

impl ChannelWriter {
    fn new(tx: mpsc::Sender<Vec<u8>>) -> Self {
        Self {
            tx,
            buf: Vec::with_capacity(COPY_BUFFER_SIZE),
        }
    }

    fn send_buf(&mut self) -> io::Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let chunk = std::mem::replace(&mut self.buf, Vec::with_capacity(COPY_BUFFER_SIZE));
        self.tx
            .blocking_send(chunk)
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "body receiver dropped"))
    }
}

impl Write for ChannelWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        if self.buf.len() >= COPY_BUFFER_SIZE {
            self.send_buf()?;
        }
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.send_buf()
    }
}
