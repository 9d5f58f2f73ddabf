use std::path::{Path, PathBuf};

use crate::error::RenderError;

/// Extension given to every generated document.
pub const OUTPUT_EXTENSION: &str = "html";

/// Map an input document onto its location in the output tree.
///
/// `base_dir` must be a component-wise prefix of `input`; the remainder is re-rooted
/// under `out_dir` and the final extension swapped for [`OUTPUT_EXTENSION`].
///
/// ```
/// use mdrender::paths::output_path;
/// use std::path::Path;
///
/// let out = output_path(Path::new("/a/b/sub/c.md"), Path::new("/out"), Path::new("/a/b"))?;
/// assert_eq!(out, Path::new("/out/sub/c.html"));
/// # Ok::<(), mdrender::RenderError>(())
/// ```
pub fn output_path(input: &Path, out_dir: &Path, base_dir: &Path) -> Result<PathBuf, RenderError> {
    let relative = relative_to_base(input, base_dir)?;
    if relative.file_name().is_none() {
        return Err(RenderError::Path(format!(
            "{input:?} does not name a document below base directory {base_dir:?}"
        )));
    }
    Ok(change_extension(&out_dir.join(relative), OUTPUT_EXTENSION))
}

/// Directory in the output tree that mirrors `dir`, i.e. `out_dir` joined with the
/// offset of `dir` from `base_dir`.
pub fn mirror_dir(dir: &Path, out_dir: &Path, base_dir: &Path) -> Result<PathBuf, RenderError> {
    Ok(out_dir.join(relative_to_base(dir, base_dir)?))
}

fn relative_to_base<'a>(path: &'a Path, base_dir: &Path) -> Result<&'a Path, RenderError> {
    path.strip_prefix(base_dir).map_err(|_| {
        RenderError::Path(format!(
            "{path:?} is not located under base directory {base_dir:?}"
        ))
    })
}

/// Replace the trailing extension only: `notes.v1.md` becomes `notes.v1.html`.
pub fn change_extension(path: &Path, to_ext: &str) -> PathBuf {
    path.with_extension(to_ext)
}
