//! Sequential prepare-and-upload pipeline.
//!
//! Drives the three run artifacts through validate → normalize → hash →
//! upload, strictly one at a time so bandwidth stays bounded and the
//! host's cache decisions line up with the hashes just computed. The first
//! failure aborts the whole run; nothing is retried and later artifacts
//! are never touched.

mod context;

pub use context::RunContext;

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use rigrun_artifact::{Artifact, ArtifactError, ArtifactKind, hash_directory, hash_file};
use rigrun_transfer::{
    ProgressCallback, SETTLE_DELAY, TransferError, UploadClient, UploadOutcome, ensure_gzip,
};

/// Logical name of the test suite artifact.
pub const SUITE_NAME: &str = "suite";

/// Logical name of the configuration artifact.
pub const CONFIG_NAME: &str = "config.json";

/// Logical name of the OS image artifact (the only one normalized).
pub const IMAGE_NAME: &str = "image";

/// Errors that abort the run.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("artifact {name}: {path} is not a {expected}")]
    InvalidArgument {
        name: String,
        path: PathBuf,
        expected: &'static str,
    },

    #[error("artifact {name}: {source}")]
    Hash {
        name: String,
        #[source]
        source: ArtifactError,
    },

    #[error("artifact {name}: {source}")]
    Transfer {
        name: String,
        #[source]
        source: TransferError,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Builds the fixed artifact list in processing order.
pub fn standard_artifacts(suite: &Path, config: &Path, image: &Path) -> Vec<Artifact> {
    vec![
        Artifact::new(SUITE_NAME, suite, ArtifactKind::Directory),
        Artifact::new(CONFIG_NAME, config, ArtifactKind::File),
        Artifact::new(IMAGE_NAME, image, ArtifactKind::File),
    ]
}

/// Runs the full pipeline described by `ctx`.
///
/// The working directory is emptied first (an idempotent reset; the
/// normalized image lands there). Artifacts are processed in the order
/// given and the first failure is returned as-is.
pub async fn run(ctx: &RunContext, on_progress: ProgressCallback) -> Result<(), PipelineError> {
    reset_workdir(&ctx.workdir).await?;

    let client = UploadClient::new(ctx.host.clone());
    for artifact in &ctx.artifacts {
        process_artifact(ctx, &client, artifact.clone(), on_progress.clone()).await?;
    }
    Ok(())
}

async fn process_artifact(
    ctx: &RunContext,
    client: &UploadClient,
    mut artifact: Artifact,
    on_progress: ProgressCallback,
) -> Result<(), PipelineError> {
    info!(artifact = artifact.name(), path = %artifact.source_path().display(), "processing artifact");

    validate_kind(&artifact).await?;

    if artifact.name() == IMAGE_NAME {
        artifact = ensure_gzip(artifact, &ctx.workdir, on_progress.clone())
            .await
            .map_err(|source| PipelineError::Transfer {
                name: IMAGE_NAME.to_string(),
                source,
            })?;
    }

    let hash = match artifact.kind() {
        ArtifactKind::File => hash_file(artifact.source_path()),
        ArtifactKind::Directory => {
            hash_directory(artifact.source_path(), artifact.name(), &ctx.excludes)
                .map(|(aggregate, _)| aggregate)
        }
    }
    .map_err(|source| PipelineError::Hash {
        name: artifact.name().to_string(),
        source,
    })?;
    debug!(artifact = artifact.name(), %hash, "content hash computed");

    match client
        .upload(&artifact, &hash, &ctx.excludes, on_progress)
        .await
    {
        UploadOutcome::Cached => info!(artifact = artifact.name(), "accepted from cache"),
        UploadOutcome::Uploaded => info!(artifact = artifact.name(), "uploaded"),
        UploadOutcome::Failed(source) => {
            return Err(PipelineError::Transfer {
                name: artifact.name().to_string(),
                source,
            });
        }
    }

    // Give the host a moment to finalize its cache entry before the next
    // artifact's hash arrives.
    tokio::time::sleep(SETTLE_DELAY).await;
    Ok(())
}

/// Checks the declared kind against what is actually on disk.
async fn validate_kind(artifact: &Artifact) -> Result<(), PipelineError> {
    let metadata = tokio::fs::metadata(artifact.source_path()).await?;
    let (matches, expected) = match artifact.kind() {
        ArtifactKind::File => (metadata.is_file(), "file"),
        ArtifactKind::Directory => (metadata.is_dir(), "directory"),
    };
    if matches {
        Ok(())
    } else {
        Err(PipelineError::InvalidArgument {
            name: artifact.name().to_string(),
            path: artifact.source_path().to_path_buf(),
            expected,
        })
    }
}

/// Empties the working directory, creating it if needed.
async fn reset_workdir(workdir: &Path) -> Result<(), PipelineError> {
    match tokio::fs::remove_dir_all(workdir).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    tokio::fs::create_dir_all(workdir).await?;
    Ok(())
}
