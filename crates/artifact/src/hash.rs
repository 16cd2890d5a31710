//! Content hashing for files and directory trees.

use std::cmp::Ordering;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use md5::{Digest, Md5};

use crate::ArtifactError;

/// One file under a directory artifact.
///
/// `relative_path` is rooted at the artifact's logical name rather than the
/// source filesystem path, so two checkouts of the same tree hash alike.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub relative_path: String,
    pub content_hash: String,
}

/// Computes the MD5 of a file's bytes and returns the hex digest.
pub fn hash_file(path: &Path) -> Result<String, ArtifactError> {
    let mut file = File::open(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ArtifactError::NotFound(path.to_path_buf())
        } else {
            ArtifactError::Io(e)
        }
    })?;

    let mut hasher = Md5::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Fingerprints a directory tree.
///
/// Walks `root` recursively, skipping any entry whose name is in `excludes`
/// at any depth, and hashes every file. Entries are sorted with
/// [`entry_order`] and the aggregate digest is the MD5 of the concatenated
/// per-file hex digests in that order, no separator. Identical content under
/// the same logical name always yields the same aggregate, wherever the tree
/// lives on disk.
pub fn hash_directory(
    root: &Path,
    logical_name: &str,
    excludes: &[String],
) -> Result<(String, Vec<ManifestEntry>), ArtifactError> {
    if !root.exists() {
        return Err(ArtifactError::NotFound(root.to_path_buf()));
    }

    let mut entries = Vec::new();
    collect_entries(root, root, logical_name, excludes, &mut entries)?;
    sort_entries(&mut entries);

    let mut hasher = Md5::new();
    for entry in &entries {
        hasher.update(entry.content_hash.as_bytes());
    }
    Ok((hex::encode(hasher.finalize()), entries))
}

fn collect_entries(
    root: &Path,
    current: &Path,
    logical_name: &str,
    excludes: &[String],
    out: &mut Vec<ManifestEntry>,
) -> Result<(), ArtifactError> {
    for entry in std::fs::read_dir(current)? {
        let entry = entry?;
        let file_name = entry.file_name();
        if excludes.iter().any(|ex| file_name.to_string_lossy() == ex.as_str()) {
            continue;
        }

        let path = entry.path();
        let metadata = entry.metadata()?;

        if metadata.is_dir() {
            collect_entries(root, &path, logical_name, excludes, out)?;
        } else if metadata.is_file() {
            let rel = path.strip_prefix(root).map_err(std::io::Error::other)?;
            // Normalize to forward slashes.
            let rel_str = rel.to_string_lossy().replace('\\', "/");
            out.push(ManifestEntry {
                relative_path: format!("{logical_name}/{rel_str}"),
                content_hash: hash_file(&path)?,
            });
        }
    }
    Ok(())
}

/// Stable insertion sort over manifest entries.
///
/// `slice::sort_by` is allowed to reject comparators that do not implement
/// a total order, and [`entry_order`] intentionally is not one, so the sort
/// is done by hand.
fn sort_entries(entries: &mut [ManifestEntry]) {
    for i in 1..entries.len() {
        let mut j = i;
        while j > 0
            && entry_order(&entries[j - 1].relative_path, &entries[j].relative_path)
                == Ordering::Greater
        {
            entries.swap(j - 1, j);
            j -= 1;
        }
    }
}

/// Ordering the host applies to manifest entries.
///
/// Split both paths on `/` and compare segment-wise: A sorts before B only
/// when every segment of A is lexicographically <= the corresponding segment
/// of B; a missing B segment compares as "not <=". This predicate is not a
/// total order for every path set, but both ends of the wire must agree
/// bit-for-bit on the aggregate input, so it is reproduced as-is rather than
/// replaced with a lexicographic sort.
fn entry_order(a: &str, b: &str) -> Ordering {
    let b_segments: Vec<&str> = b.split('/').collect();
    let before = a
        .split('/')
        .enumerate()
        .all(|(i, seg)| b_segments.get(i).is_some_and(|other| seg <= *other));
    if before { Ordering::Less } else { Ordering::Greater }
}
