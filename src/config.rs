use include_dir::{include_dir, Dir};
use serde::Deserialize;
use std::{
    fs::read_to_string,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{error::RenderError, paths::OUTPUT_EXTENSION};

static ASSETS: Dir<'_> = include_dir!("$CARGO_MANIFEST_DIR/assets");

/// Placeholder replaced by the rendered document body.
pub const CONTENT_PLACEHOLDER: &str = "{{{content}}}";
/// Placeholder replaced by the wrapped stylesheet.
pub const STYLE_PLACEHOLDER: &str = "{{{style}}}";

pub const DEFAULT_EXTENSION: &str = "md";
pub const DEFAULT_CONCURRENCY: usize = 16;
pub const DEFAULT_THEME: &str = "InspiredGitHub";
/// Name of the settings file looked up in the input directory.
pub const SETTINGS_FILE_NAME: &str = "mdrender.toml";

/// Immutable configuration shared by every render of a run.
///
/// Invariant: `base_dir` is a path prefix of every document rendered with this
/// configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderConfig {
    /// Embed local images as `data:` URIs instead of copying them.
    pub image_inline: bool,
    /// HTML template containing [`CONTENT_PLACEHOLDER`] and [`STYLE_PLACEHOLDER`].
    pub template: String,
    /// Stylesheet, already wrapped in a `<style>` block.
    pub style: String,
    pub base_dir: PathBuf,
    pub out_dir: PathBuf,
    /// Source extension of target documents, without the dot.
    pub extension: String,
    /// Upper bound on reading plus transforming one document.
    pub timeout: Option<Duration>,
}

impl RenderConfig {
    /// Configuration using the built-in template and an empty stylesheet.
    pub fn new(base_dir: impl Into<PathBuf>, out_dir: impl Into<PathBuf>) -> Self {
        RenderConfig {
            image_inline: false,
            template: builtin_asset("template.html")
                .map(str::to_string)
                .unwrap_or_else(|_| CONTENT_PLACEHOLDER.to_string()),
            style: String::new(),
            base_dir: base_dir.into(),
            out_dir: out_dir.into(),
            extension: DEFAULT_EXTENSION.to_string(),
            timeout: None,
        }
    }

    pub fn with_image_inline(mut self, image_inline: bool) -> Self {
        self.image_inline = image_inline;
        self
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = template.into();
        self
    }

    pub fn with_style(mut self, style: impl Into<String>) -> Self {
        self.style = style.into();
        self
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Reject configurations whose outputs would land on their own inputs.
    pub fn validate(&self) -> Result<(), RenderError> {
        if self.extension.is_empty() {
            return Err(RenderError::Config(
                "source extension must not be empty".to_string(),
            ));
        }
        if self.extension == OUTPUT_EXTENSION && self.out_dir == self.base_dir {
            return Err(RenderError::Config(format!(
                "source extension {:?} matches the output extension; \
                 set an output directory outside {:?}",
                self.extension, self.base_dir
            )));
        }
        Ok(())
    }
}

/// User-facing settings, read from a TOML file and overridden by command-line flags.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub out_dir: Option<PathBuf>,
    pub image_inline: bool,
    pub watch: bool,
    pub template: Option<PathBuf>,
    pub styles: Vec<PathBuf>,
    pub extension: String,
    pub concurrency: usize,
    pub timeout_secs: Option<u64>,
    pub theme: String,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            out_dir: None,
            image_inline: false,
            watch: false,
            template: None,
            styles: Vec::new(),
            extension: DEFAULT_EXTENSION.to_string(),
            concurrency: DEFAULT_CONCURRENCY,
            timeout_secs: None,
            theme: DEFAULT_THEME.to_string(),
        }
    }
}

impl Settings {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    /// Anchor relative paths at `dir` (the directory holding the settings file).
    fn anchored_at(mut self, dir: &Path) -> Self {
        let anchor = |p: PathBuf| if p.is_relative() { dir.join(p) } else { p };
        self.out_dir = self.out_dir.map(anchor);
        self.template = self.template.map(anchor);
        self.styles = self.styles.into_iter().map(anchor).collect();
        self
    }
}

pub trait SettingsProvider: Send + Sync {
    fn settings(&self) -> Result<Settings, RenderError>;
}

#[derive(Debug)]
pub struct TomlSettingsProvider {
    path: PathBuf,
}

impl TomlSettingsProvider {
    pub fn new(path: PathBuf) -> Self {
        TomlSettingsProvider { path }
    }
}

impl SettingsProvider for TomlSettingsProvider {
    fn settings(&self) -> Result<Settings, RenderError> {
        tracing::debug!("Attempting to read settings from: {:?}", &self.path);
        if !self.path.exists() {
            tracing::debug!("Settings file not found, using defaults.");
            return Ok(Settings::default());
        }
        let content = read_to_string(&self.path)
            .map_err(|e| RenderError::Config(format!("failed to read {:?}: {e}", self.path)))?;
        let settings: Settings = toml::from_str(&content)?;
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        Ok(settings.anchored_at(dir))
    }
}

/// Fetch one of the assets compiled into the binary.
pub fn builtin_asset(name: &str) -> Result<&'static str, RenderError> {
    ASSETS
        .get_file(name)
        .and_then(|f| f.contents_utf8())
        .ok_or_else(|| RenderError::Config(format!("missing built-in asset {name}")))
}

/// The user's template if one is given (it must be readable), otherwise the built-in one.
pub fn load_template(custom: Option<&Path>) -> Result<String, RenderError> {
    let template = match custom {
        Some(path) => read_to_string(path)
            .map_err(|e| RenderError::Config(format!("failed to read template {path:?}: {e}")))?,
        None => builtin_asset("template.html")?.to_string(),
    };
    if !template.contains(CONTENT_PLACEHOLDER) {
        return Err(RenderError::Config(format!(
            "template has no {CONTENT_PLACEHOLDER} placeholder"
        )));
    }
    if !template.contains(STYLE_PLACEHOLDER) {
        tracing::debug!("template has no {} placeholder", STYLE_PLACEHOLDER);
    }
    Ok(template)
}

/// Build the `<style>` block spliced into every document.
///
/// User stylesheets are concatenated with a newline between them. Without any, the
/// built-in stylesheet is used, followed by `highlight_css`.
pub fn load_style(custom: &[PathBuf], highlight_css: &str) -> Result<String, RenderError> {
    let css = if custom.is_empty() {
        format!("{}\n{}", builtin_asset("default.css")?, highlight_css)
    } else {
        custom
            .iter()
            .map(|path| {
                read_to_string(path).map_err(|e| {
                    RenderError::Config(format!("failed to read stylesheet {path:?}: {e}"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?
            .join("\n")
    };
    Ok(wrap_style(&css))
}

pub fn wrap_style(css: &str) -> String {
    format!("\n<style>\n{css}\n</style>\n")
}
