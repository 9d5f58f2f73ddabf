use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use url::Url;

use crate::{config::RenderConfig, error::RenderError, paths::mirror_dir};

/// What happened to one `<img>` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetOutcome {
    /// Remote reference, left untouched.
    Remote,
    /// Replacement `src`: the file contents as a `data:` URI.
    Inlined(String),
    /// The file was copied to this location in the output tree; `src` stays valid.
    Copied(PathBuf),
    /// The output tree is the source tree, nothing to copy.
    InPlace,
}

/// A reference is remote when it carries a non-`file` scheme or is protocol-relative.
pub fn is_remote(src: &str) -> bool {
    if src.starts_with("//") {
        return true;
    }
    match Url::parse(src) {
        // Single letter schemes are Windows drive letters.
        Ok(url) => url.scheme() != "file" && url.scheme().len() > 1,
        Err(_) => false,
    }
}

/// Resolves image references of one document against the directory it lives in.
pub struct AssetResolver<'a> {
    config: &'a RenderConfig,
    source_dir: &'a Path,
}

impl<'a> AssetResolver<'a> {
    pub fn new(config: &'a RenderConfig, source_dir: &'a Path) -> Self {
        AssetResolver { config, source_dir }
    }

    pub fn resolve(&self, src: &str) -> Result<AssetOutcome, RenderError> {
        if is_remote(src) {
            return Ok(AssetOutcome::Remote);
        }
        let local = self.local_path(src)?;
        if self.config.image_inline {
            data_uri(&local).map(AssetOutcome::Inlined)
        } else {
            self.copy_into_output(&local)
        }
    }

    /// Percent-decoded location of `src`. Query and fragment are dropped and a leading
    /// `/` is taken relative to the document's directory.
    fn local_path(&self, src: &str) -> Result<PathBuf, RenderError> {
        let base = Url::from_directory_path(self.source_dir).map_err(|_| {
            RenderError::Asset(format!(
                "document directory {:?} is not absolute",
                self.source_dir
            ))
        })?;
        let url = base
            .join(src.trim_start_matches('/'))
            .map_err(|e| RenderError::Asset(format!("invalid image reference {src:?}: {e}")))?;
        url.to_file_path()
            .map_err(|_| RenderError::Asset(format!("image reference {src:?} is not a local path")))
    }

    fn copy_into_output(&self, from: &Path) -> Result<AssetOutcome, RenderError> {
        let (dir, name) = match (from.parent(), from.file_name()) {
            (Some(dir), Some(name)) => (dir, name),
            _ => return Err(RenderError::Asset(format!("{from:?} does not name a file"))),
        };
        let to = mirror_dir(dir, &self.config.out_dir, &self.config.base_dir)
            .map_err(|e| RenderError::Asset(e.to_string()))?
            .join(name);
        if to == from {
            return Ok(AssetOutcome::InPlace);
        }
        if let Some(parent) = to.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                RenderError::Asset(format!("failed to create directory {parent:?}: {e}"))
            })?;
        }
        std::fs::copy(from, &to)
            .map_err(|e| RenderError::Asset(format!("failed to copy {from:?} to {to:?}: {e}")))?;
        Ok(AssetOutcome::Copied(to))
    }
}

/// Read `path` into a `data:<mime>;base64,<payload>` URI, typed by file extension.
pub fn data_uri(path: &Path) -> Result<String, RenderError> {
    let bytes = std::fs::read(path)
        .map_err(|e| RenderError::Asset(format!("failed to read image {path:?}: {e}")))?;
    let mime = mime_guess::from_path(path).first_or_octet_stream();
    Ok(format!("data:{};base64,{}", mime, STANDARD.encode(bytes)))
}
