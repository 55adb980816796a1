//! Path helpers shared by the writer and reader

use std::path::{Path, PathBuf};

use crate::error::{KeylineError, Result};

/// Extension used for derived index files
pub const INDEX_EXTENSION: &str = "index";

/// Derive the sibling index path for a data file.
///
/// `orders.jsonl` → `orders.index`; `orders` → `orders.index`.
pub fn default_index_path(data_path: &Path) -> PathBuf {
    data_path.with_extension(INDEX_EXTENSION)
}

/// Data and index must never resolve to the same file.
///
/// Paths are compared after resolving `.`, `..` and symlinks in their
/// directories, so two spellings of one file are caught.
pub(crate) fn ensure_distinct(data_path: &Path, index_path: &Path) -> Result<()> {
    if data_path == index_path || resolve(data_path) == resolve(index_path) {
        return Err(KeylineError::Config(format!(
            "data path and index path are identical: {}",
            data_path.display()
        )));
    }
    Ok(())
}

/// Canonical form of `path`: the file itself if it exists, otherwise its
/// canonical parent joined with the file name. Falls back to the path as
/// given when neither can be resolved.
fn resolve(path: &Path) -> PathBuf {
    if let Ok(canonical) = path.canonicalize() {
        return canonical;
    }
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    match (parent.canonicalize(), path.file_name()) {
        (Ok(dir), Some(name)) => dir.join(name),
        _ => path.to_path_buf(),
    }
}

/// The directory a file will be created in must already exist
pub(crate) fn ensure_parent_dir(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() && !parent.is_dir() => {
            Err(KeylineError::not_found("Directory", parent))
        }
        _ => Ok(()),
    }
}

pub(crate) fn ensure_file(what: &'static str, path: &Path) -> Result<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(KeylineError::not_found(what, path))
    }
}

/// Temporary sibling the index is written to before being renamed into place
pub(crate) fn staging_path(index_path: &Path) -> PathBuf {
    let mut name = index_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    index_path.with_file_name(name)
}
