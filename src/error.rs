use std::{fmt, io, path::StripPrefixError, time::Duration};

use lol_html::errors::RewritingError;
use notify::{Error as NotifyError, ErrorKind as NotifyErrorKind};
use thiserror::Error;

/// Stage of the document transformation that produced a [`RenderError::Parse`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformStage {
    /// Markdown to intermediate HTML.
    Markdown,
    /// Building and rewriting the HTML node tree.
    Tree,
    /// Turning the rewritten tree back into text.
    Serialize,
}

impl fmt::Display for TransformStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stage = match self {
            TransformStage::Markdown => "markdown",
            TransformStage::Tree => "tree-build",
            TransformStage::Serialize => "serialize",
        };
        f.write_str(stage)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RenderError {
    #[error("Read error: {0}")]
    Read(String),
    #[error("Parse error ({stage}): {message}")]
    Parse {
        stage: TransformStage,
        message: String,
    },
    #[error("Highlight error ({language}): {message}")]
    Highlight { language: String, message: String },
    #[error("Asset error: {0}")]
    Asset(String),
    #[error("Path error: {0}")]
    Path(String),
    #[error("Write error: {0}")]
    Write(String),
    #[error("Timed out after {0:?}")]
    Timeout(Duration),
    #[error("Watch subscription error: {0}")]
    WatchSubscription(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Item Not Found: {0}")]
    NotFound(String),
    #[error("File System error: {0}")]
    Io(String),
}

impl RenderError {
    pub fn parse(stage: TransformStage, message: impl fmt::Display) -> Self {
        RenderError::Parse {
            stage,
            message: message.to_string(),
        }
    }

    /// Whether this error aborts the job it occurred in. Highlight and asset
    /// failures are absorbed where they happen and degrade the output instead.
    pub fn is_fatal_for_job(&self) -> bool {
        !matches!(
            self,
            RenderError::Highlight { .. } | RenderError::Asset(_)
        )
    }
}

impl From<StripPrefixError> for RenderError {
    fn from(src: StripPrefixError) -> RenderError {
        RenderError::Path(format!("Strip prefix failed for path. Error: {src}"))
    }
}

impl From<toml::de::Error> for RenderError {
    fn from(src: toml::de::Error) -> RenderError {
        RenderError::Config(format!("Toml deserialization error: {src}"))
    }
}

impl From<io::Error> for RenderError {
    fn from(x: io::Error) -> Self {
        match x.kind() {
            io::ErrorKind::NotFound => RenderError::NotFound(format!("{x}")),
            _ => RenderError::Io(format!("IOError: {x}")),
        }
    }
}

impl From<RewritingError> for RenderError {
    fn from(x: RewritingError) -> Self {
        RenderError::parse(TransformStage::Tree, x)
    }
}

impl From<NotifyError> for RenderError {
    fn from(notify_error: NotifyError) -> Self {
        match notify_error.kind {
            NotifyErrorKind::Generic(msg) => RenderError::WatchSubscription(format!(
                "notify: {}, paths: {:?}",
                msg, notify_error.paths
            )),
            NotifyErrorKind::Io(io_error) => RenderError::WatchSubscription(format!(
                "notify: io error {}, paths: {:?}",
                io_error.kind(),
                notify_error.paths
            )),
            NotifyErrorKind::PathNotFound => RenderError::WatchSubscription(format!(
                "notify: path(s) not found: {:?}",
                notify_error.paths
            )),
            NotifyErrorKind::WatchNotFound => RenderError::WatchSubscription(format!(
                "notify: watch not found, paths: {:?}",
                notify_error.paths
            )),
            NotifyErrorKind::InvalidConfig(_) => {
                RenderError::WatchSubscription("notify invalid config".to_string())
            }
            NotifyErrorKind::MaxFilesWatch => {
                RenderError::WatchSubscription("notify max file watch limit reached".to_string())
            }
        }
    }
}
