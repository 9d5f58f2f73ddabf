use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

use crate::error::RenderError;

/// Absolute locations a run operates on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPaths {
    /// The document or directory given on the command line.
    pub input: PathBuf,
    /// Root that output locations are computed relative to.
    pub base: PathBuf,
    /// Root of the generated tree.
    pub out: PathBuf,
}

/// Resolve the input and output arguments of a run into absolute paths.
///
/// * An empty input means the current directory.
/// * The input must exist; a missing input is a fatal [`RenderError::NotFound`].
/// * The base directory is the input itself when it is a directory, otherwise its parent.
/// * Without an explicit output directory, documents are written next to their sources.
pub fn resolve_paths(
    input: Option<&Path>,
    output: Option<&Path>,
) -> Result<ResolvedPaths, RenderError> {
    let input = match input {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => std::env::current_dir()?,
    };
    if !input.exists() {
        return Err(RenderError::NotFound(format!(
            "input path does not exist: {input:?}"
        )));
    }
    let input = input.canonicalize()?;

    let base = if input.is_dir() {
        input.clone()
    } else {
        input
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| RenderError::Path(format!("{input:?} has no parent directory")))?
    };

    let out = match output {
        Some(o) if !o.as_os_str().is_empty() => std::path::absolute(o)?,
        _ => base.clone(),
    };

    tracing::debug!(
        "resolve_paths: input {:?}, base {:?}, out {:?}",
        input,
        base,
        out
    );
    Ok(ResolvedPaths { input, base, out })
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|s| s.starts_with('.'))
        .unwrap_or(false)
}

/// Whether any component of `path` below `root` is a dot-file or dot-directory.
pub fn is_hidden_path(path: &Path, root: &Path) -> bool {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .any(|c| c.as_os_str().to_str().map(|s| s.starts_with('.')).unwrap_or(false))
}

/// A target document is an existing-or-deleted non-directory path carrying `extension`.
///
/// Watch events can reference paths that are already gone, so this never requires the
/// path to exist.
pub fn is_target_file(path: &Path, extension: &str) -> bool {
    if path.is_dir() {
        return false;
    }
    path.extension()
        .map(|ext| ext == extension)
        .unwrap_or(false)
}

/// Collect target documents from `path`: the path itself if it is a file, or every
/// matching file below it if it is a directory. Hidden directories are skipped.
pub fn target_files<P: AsRef<Path>>(path: P, extension: &str) -> Result<Vec<PathBuf>, RenderError> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(RenderError::NotFound(format!("file not found: {path:?}")));
    }
    if !path.is_dir() {
        return Ok(vec![path.to_path_buf()]);
    }

    let mut sorted_files = WalkDir::new(path)
        .into_iter()
        .filter_entry(|e| !is_hidden(e) || e.path() == path)
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(DirEntry::into_path)
        .filter(|p| is_target_file(p, extension))
        .collect::<Vec<PathBuf>>();
    sorted_files.sort_by(|a, b| a.components().cmp(b.components()));
    Ok(sorted_files)
}

/// Every directory under `root` (recursively, `root` included), skipping hidden ones.
pub fn directories<P: AsRef<Path>>(root: P) -> Vec<PathBuf> {
    let root = root.as_ref();
    WalkDir::new(root)
        .into_iter()
        .filter_entry(|e| !is_hidden(e) || e.path() == root)
        .filter_map(|e| match e {
            Ok(entry) => Some(entry),
            Err(err) => {
                tracing::warn!("[discover] skipping unreadable entry: {}", err);
                None
            }
        })
        .filter(|e| e.file_type().is_dir())
        .map(DirEntry::into_path)
        .collect()
}
