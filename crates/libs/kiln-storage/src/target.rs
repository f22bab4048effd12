//! Discovery of the files a build left in its output directory.

use std::{
    io,
    path::{Component, Path, PathBuf},
};

use tracing::debug;
use walkdir::WalkDir;

use crate::prelude::*;

/// Key prefix under which every project's outputs are stored.
pub const OUTPUTS_PREFIX: &str = "__outputs";

/// One file scheduled for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTarget {
    /// Path below the output directory, `/`-separated.
    pub relative_path: String,
    /// Where the file is read from.
    pub absolute_path: PathBuf,
    /// MIME type guessed from the extension.
    pub content_type: Option<String>,
}

impl UploadTarget {
    /// Storage key of this file for `project_id`.
    pub fn key(&self, project_id: &str) -> String {
        storage_key(project_id, &self.relative_path)
    }
}

/// Storage key of `relative_path` for `project_id`.
///
/// ```rust
/// assert_eq!(
///     kiln_storage::storage_key("proj123", "assets/app.js"),
///     "__outputs/proj123/assets/app.js"
/// );
/// ```
pub fn storage_key(project_id: &str, relative_path: &str) -> String {
    format!("{OUTPUTS_PREFIX}/{project_id}/{relative_path}")
}

/// Content type for `path` based on its extension, if it has a known one.
pub fn content_type_for(path: &Path) -> Option<String> {
    mime_guess::from_path(path)
        .first()
        .map(|mime| mime.essence_str().to_string())
}

/// List every non-directory entry below `output_dir`.
///
/// Symlinks are not followed; a link is a target like any other file.
/// Entries closer to the root come first, and siblings are sorted by name.
pub fn collect_targets(output_dir: &Path) -> Result<Vec<UploadTarget>> {
    let missing = |source: io::Error| Error::OutputDirectoryMissing {
        path: output_dir.to_path_buf(),
        source,
    };
    let metadata = std::fs::metadata(output_dir).map_err(missing)?;
    if !metadata.is_dir() {
        return Err(missing(io::Error::new(
            io::ErrorKind::NotADirectory,
            "not a directory",
        )));
    }

    let mut found = Vec::new();
    for entry in WalkDir::new(output_dir).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|err| walk_error(output_dir, err))?;
        if entry.file_type().is_dir() {
            continue;
        }
        let depth = entry.depth();
        let relative_path = relative_key(output_dir, entry.path());
        let content_type = content_type_for(entry.path());
        found.push((
            depth,
            UploadTarget {
                relative_path,
                absolute_path: entry.into_path(),
                content_type,
            },
        ));
    }
    found.sort_by_key(|(depth, _)| *depth);

    debug!("Found {} files in {}", found.len(), output_dir.display());
    Ok(found.into_iter().map(|(_, target)| target).collect())
}

fn walk_error(output_dir: &Path, err: walkdir::Error) -> Error {
    if err.depth() == 0 {
        let source = err
            .into_io_error()
            .unwrap_or_else(|| io::Error::other("unreadable output directory"));
        return Error::OutputDirectoryMissing {
            path: output_dir.to_path_buf(),
            source,
        };
    }
    Error::Walk {
        path: output_dir.to_path_buf(),
        source: err,
    }
}

/// `path` relative to `root`, joined with `/` whatever the platform separator.
fn relative_key(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
