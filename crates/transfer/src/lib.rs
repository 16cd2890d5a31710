//! Getting artifacts onto the test host.
//!
//! Three stages live here: normalizing the OS image into a gzip stream,
//! packaging an artifact as a gzip'd tar, and driving the hash-addressed
//! upload protocol against the host's `/upload` endpoint. Packaging,
//! compression, and the network send form one backpressured pipeline per
//! artifact, so memory use stays bounded whatever the payload size.

mod normalize;
mod package;
mod progress;
mod upload;
mod wire;

pub use normalize::{ensure_gzip, is_gzip};
pub use progress::{ProgressCallback, SpeedCalculator, TransferProgress, progress_sink};
pub use upload::{HEADER_ARTIFACT, HEADER_ARTIFACT_HASH, UploadClient, UploadOutcome};
pub use wire::{LineDecoder, ResponseLine};

use std::time::Duration;

/// Leading bytes of a gzip member: the two magic bytes plus the deflate
/// method byte. Anything starting with these is treated as already
/// compressed.
pub const GZIP_MAGIC: [u8; 3] = [0x1f, 0x8b, 0x08];

/// Fixed gzip level for image normalization and upload bodies. The host
/// decompresses whatever arrives; 6 trades speed against ratio.
pub(crate) const GZIP_LEVEL: u32 = 6;

/// Read/write buffer for streaming file copies.
pub(crate) const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// Packaged chunks allowed in flight before the packager blocks.
pub(crate) const BODY_CHANNEL_CAPACITY: usize = 16;

/// Pause after an accepted upload so the host can finalize its cache entry
/// before the next artifact arrives.
pub const SETTLE_DELAY: Duration = Duration::from_secs(1);

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("host rejected upload: {0}")]
    Server(String),
}
