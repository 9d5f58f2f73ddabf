//! Batch rendering with bounded concurrency.

use std::{collections::HashSet, path::PathBuf, sync::Arc};

use tokio::{sync::Semaphore, task::JoinSet};

use crate::{
    config::DEFAULT_CONCURRENCY,
    error::RenderError,
    event::{emit, EventSender, RenderEvent, RenderSummary},
    render::{RenderResult, Renderer},
};

/// Renders a list of documents concurrently and aggregates the outcome.
///
/// One document's failure never stops the others; every failure is logged and counted.
pub struct Dispatcher {
    renderer: Renderer,
    concurrency: usize,
    event_tx: Option<EventSender>,
}

impl Dispatcher {
    pub fn new(renderer: Renderer) -> Self {
        Dispatcher {
            renderer,
            concurrency: DEFAULT_CONCURRENCY,
            event_tx: None,
        }
    }

    /// Maximum number of documents in flight at once. Zero is treated as one.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_events(mut self, tx: EventSender) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }

    pub async fn render_all(&self, files: Vec<PathBuf>) -> RenderSummary {
        let mut summary = RenderSummary {
            total: files.len(),
            ..Default::default()
        };
        let mut pending: HashSet<PathBuf> = files.iter().cloned().collect();
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut jobs = JoinSet::new();

        for file in files {
            let renderer = self.renderer.clone();
            let semaphore = Arc::clone(&semaphore);
            jobs.spawn(async move {
                // The semaphore is never closed.
                let _permit = semaphore.acquire_owned().await.ok();
                renderer.render(&file).await
            });
        }

        while let Some(joined) = jobs.join_next().await {
            match joined {
                Ok(result) => {
                    pending.remove(&result.path);
                    self.record(result, &mut summary);
                }
                Err(err) => tracing::error!("[Dispatcher] render task aborted: {}", err),
            }
        }

        // Whatever is still pending belonged to a task that panicked.
        let mut lost: Vec<_> = pending.into_iter().collect();
        lost.sort();
        for path in lost {
            let result = RenderResult {
                path,
                outcome: Err(RenderError::Io("render task aborted".to_string())),
            };
            self.record(result, &mut summary);
        }

        summary.failed_paths.sort();
        tracing::info!("{}", summary);
        emit(self.event_tx.as_ref(), RenderEvent::Summary(summary.clone()));
        summary
    }

    fn record(&self, result: RenderResult, summary: &mut RenderSummary) {
        result.report(self.event_tx.as_ref());
        if result.is_success() {
            summary.succeeded += 1;
        } else {
            summary.failed += 1;
            summary.failed_paths.push(result.path);
        }
    }
}
