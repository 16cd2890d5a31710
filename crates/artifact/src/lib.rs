//! Artifact model and content hashing.
//!
//! An artifact is one of the three named payloads bound for the test host:
//! the suite directory, the configuration file, and the OS image. Before
//! anything is sent, each artifact is fingerprinted so the host can
//! recognise content it already holds. Directory artifacts get an aggregate
//! digest over a sorted per-file manifest, which makes the fingerprint
//! stable across machines and filesystem traversal orders.

mod hash;
mod model;

pub use hash::{ManifestEntry, hash_directory, hash_file};
pub use model::{Artifact, ArtifactKind};

/// Names excluded from directory hashing and packaging by default.
///
/// Dependency installs are not byte-reproducible across machines, so they
/// must not influence the aggregate digest.
pub const DEFAULT_EXCLUDES: &[&str] = &["node_modules", "package-lock.json"];

/// Errors produced while inspecting or hashing artifacts.
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("path not found: {0}")]
    NotFound(std::path::PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
