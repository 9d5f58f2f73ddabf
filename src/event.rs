use std::fmt::{Display, Formatter};
use std::path::PathBuf;

use tokio::sync::mpsc::UnboundedSender;

use crate::error::RenderError;

/// Outcome notifications emitted by the dispatcher and the watch controller.
///
/// Components take an optional [`EventSender`] instead of reaching for global state; a
/// missing or closed receiver is never an error.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderEvent {
    /// Input path, output path.
    Rendered(PathBuf, PathBuf),
    Failed(PathBuf, RenderError),
    /// Emitted once a batch has joined.
    Summary(RenderSummary),
    /// Root and the number of directories subscribed.
    WatchStarted(PathBuf, usize),
    /// The watch loop decided to render this document.
    RenderTriggered(PathBuf),
    /// A write arrived inside the debounce window and was coalesced.
    RenderSuppressed(PathBuf),
    DirectoryWatched(PathBuf),
    DirectoryUnwatched(PathBuf),
    WatchStopped,
}

impl Display for RenderEvent {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            RenderEvent::Rendered(input, output) => {
                write!(f, "written: {} -> {}", input.display(), output.display())
            }
            RenderEvent::Failed(input, err) => write!(f, "fail   : {}: {}", input.display(), err),
            RenderEvent::Summary(summary) => write!(f, "{summary}"),
            RenderEvent::WatchStarted(root, count) => {
                write!(f, "watching {} ({} directories)", root.display(), count)
            }
            RenderEvent::RenderTriggered(path) => write!(f, "render: {}", path.display()),
            RenderEvent::RenderSuppressed(path) => write!(f, "debounced: {}", path.display()),
            RenderEvent::DirectoryWatched(path) => write!(f, "watch: {}", path.display()),
            RenderEvent::DirectoryUnwatched(path) => write!(f, "unwatch: {}", path.display()),
            RenderEvent::WatchStopped => write!(f, "watch stopped"),
        }
    }
}

/// Aggregate result of rendering a batch of documents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub failed_paths: Vec<PathBuf>,
}

impl Display for RenderSummary {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "SUMMARY: all {}, success {}, fail {}",
            self.total, self.succeeded, self.failed
        )
    }
}

pub type EventSender = UnboundedSender<RenderEvent>;

/// Forward `event` if anyone is listening.
pub(crate) fn emit(tx: Option<&EventSender>, event: RenderEvent) {
    if let Some(tx) = tx {
        if tx.send(event).is_err() {
            tracing::trace!("event receiver dropped");
        }
    }
}
