//! Per-run state, passed explicitly.

use std::path::PathBuf;

use rigrun_artifact::Artifact;

/// Everything one run needs.
///
/// There is no process-global run state: the context is built once by the
/// frontend and handed down, and nothing in it outlives the run.
#[derive(Debug, Clone)]
pub struct RunContext {
    /// Test host, `hostname` or `hostname:port`.
    pub host: String,
    /// Scratch directory for the normalized image; emptied at run start.
    pub workdir: PathBuf,
    /// Entry names skipped during directory hashing and packaging.
    pub excludes: Vec<String>,
    /// The payloads to transfer, in processing order.
    pub artifacts: Vec<Artifact>,
}
