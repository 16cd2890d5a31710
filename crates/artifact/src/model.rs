//! The artifact record handed through the pipeline.

use std::path::{Path, PathBuf};

/// What kind of payload an artifact holds.
///
/// The kind is declared up front and checked against the filesystem before
/// processing starts, so downstream stages never re-inspect it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    File,
    Directory,
}

/// One named payload bound for the test host.
///
/// `name` is the logical identifier the host files the content under
/// (e.g. `suite`, `config.json`, `image`); it never changes. `source_path`
/// is where the bytes live locally and is rebound exactly once when the
/// image is normalized to a compressed copy.
#[derive(Debug, Clone)]
pub struct Artifact {
    name: String,
    source_path: PathBuf,
    kind: ArtifactKind,
}

impl Artifact {
    pub fn new(name: impl Into<String>, source_path: impl Into<PathBuf>, kind: ArtifactKind) -> Self {
        Self {
            name: name.into(),
            source_path: source_path.into(),
            kind,
        }
    }

    /// Logical identifier on the host side.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Where the payload bytes currently live.
    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    pub fn kind(&self) -> ArtifactKind {
        self.kind
    }

    /// Rebinds the artifact to a new on-disk location, keeping its identity.
    pub fn with_source_path(self, source_path: impl Into<PathBuf>) -> Self {
        Self {
            source_path: source_path.into(),
            ..self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rebinding_keeps_identity() {
        let artifact = Artifact::new("image", "/tmp/raw.img", ArtifactKind::File);
        let rebound = artifact.with_source_path("/tmp/work/image");

        assert_eq!(rebound.name(), "image");
        assert_eq!(rebound.kind(), ArtifactKind::File);
        assert_eq!(rebound.source_path(), Path::new("/tmp/work/image"));
    }
}
