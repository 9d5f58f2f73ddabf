//! One document, start to finish: read, transform, write.

use std::{
    io::Write,
    path::{Path, PathBuf},
    sync::Arc,
};

use crate::{
    codec::DocumentTransformer,
    config::RenderConfig,
    error::{RenderError, TransformStage},
    event::{emit, EventSender, RenderEvent},
    paths::output_path,
};

/// A target document and where its output goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub path: PathBuf,
    /// Directory image references are resolved against.
    pub dir: PathBuf,
    pub output: PathBuf,
}

impl Document {
    pub fn new(path: &Path, config: &RenderConfig) -> Result<Self, RenderError> {
        let dir = path
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| RenderError::Path(format!("{path:?} has no parent directory")))?;
        let output = output_path(path, &config.out_dir, &config.base_dir)?;
        Ok(Document {
            path: path.to_path_buf(),
            dir,
            output,
        })
    }
}

/// Outcome of one render: the output path, or the error that stopped it.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderResult {
    pub path: PathBuf,
    pub outcome: Result<PathBuf, RenderError>,
}

impl RenderResult {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn error(&self) -> Option<&RenderError> {
        self.outcome.as_ref().err()
    }

    /// Log the outcome (one line per document) and forward it as an event.
    pub(crate) fn report(&self, tx: Option<&EventSender>) {
        match &self.outcome {
            Ok(output) => {
                tracing::info!("written: {:?}", output);
                emit(tx, RenderEvent::Rendered(self.path.clone(), output.clone()));
            }
            Err(err) => {
                tracing::error!("fail   : {:?}: {}", self.path, err);
                emit(tx, RenderEvent::Failed(self.path.clone(), err.clone()));
            }
        }
    }
}

/// Runs render jobs. Cheap to clone; clones share the transformer.
#[derive(Clone)]
pub struct Renderer {
    transformer: Arc<DocumentTransformer>,
}

impl Renderer {
    pub fn new(config: RenderConfig) -> Self {
        Renderer {
            transformer: Arc::new(DocumentTransformer::new(Arc::new(config))),
        }
    }

    pub fn with_transformer(transformer: Arc<DocumentTransformer>) -> Self {
        Renderer { transformer }
    }

    pub fn config(&self) -> &RenderConfig {
        self.transformer.config()
    }

    /// Render `path`. Never panics on bad input; every failure is reported in the result.
    pub async fn render(&self, path: &Path) -> RenderResult {
        let outcome = self.try_render(path).await;
        match &outcome {
            Ok(output) => tracing::debug!("[Renderer] {:?} -> {:?}", path, output),
            Err(err) => tracing::debug!("[Renderer] {:?} failed: {}", path, err),
        }
        RenderResult {
            path: path.to_path_buf(),
            outcome,
        }
    }

    async fn try_render(&self, path: &Path) -> Result<PathBuf, RenderError> {
        let html = match self.config().timeout {
            Some(limit) => tokio::time::timeout(limit, self.read_and_transform(path))
                .await
                .map_err(|_| RenderError::Timeout(limit))??,
            None => self.read_and_transform(path).await?,
        };
        let document = Document::new(path, self.config())?;
        write_atomic(&document.output, html.into_bytes()).await?;
        Ok(document.output)
    }

    async fn read_and_transform(&self, path: &Path) -> Result<String, RenderError> {
        let raw = tokio::fs::read(path)
            .await
            .map_err(|e| RenderError::Read(format!("failed to read {path:?}: {e}")))?;
        let source_dir = path.parent().unwrap_or_else(|| Path::new(".")).to_path_buf();
        let transformer = Arc::clone(&self.transformer);
        tokio::task::spawn_blocking(move || transformer.transform(&raw, &source_dir))
            .await
            .map_err(|e| {
                RenderError::parse(TransformStage::Tree, format!("transform task failed: {e}"))
            })?
    }
}

/// Write `contents` to `path` through a temporary sibling file and a rename, so readers
/// never observe a partially written document.
pub async fn write_atomic(path: &Path, contents: Vec<u8>) -> Result<(), RenderError> {
    let parent = path
        .parent()
        .ok_or_else(|| RenderError::Write(format!("{path:?} has no parent directory")))?
        .to_path_buf();
    tokio::fs::create_dir_all(&parent)
        .await
        .map_err(|e| RenderError::Write(format!("failed to create directory {parent:?}: {e}")))?;

    let target = path.to_path_buf();
    tokio::task::spawn_blocking(move || -> Result<(), RenderError> {
        let write_err = |e: std::io::Error| RenderError::Write(format!("{target:?}: {e}"));
        let mut tmp = tempfile::NamedTempFile::new_in(&parent).map_err(write_err)?;
        tmp.write_all(&contents).map_err(write_err)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tmp.as_file()
                .set_permissions(std::fs::Permissions::from_mode(0o644))
                .map_err(write_err)?;
        }
        tmp.persist(&target).map_err(|e| write_err(e.error))?;
        Ok(())
    })
    .await
    .map_err(|e| RenderError::Write(format!("write task failed: {e}")))?
}
