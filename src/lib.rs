//! # mdrender
//!
//! Renders a tree of Markdown documents into standalone HTML pages, and optionally keeps the
//! output current while the sources are edited.
//!
//! ## Overview
//!
//! Every document goes through the same pipeline: Markdown is converted to an HTML fragment,
//! fenced code blocks tagged with a language are syntax highlighted, local images are either
//! copied next to the output or embedded as `data:` URIs, and the result is spliced into a
//! page template together with a stylesheet. The output tree mirrors the input tree.
//!
//! ## Architecture
//!
//! - **[`paths`]**: input discovery and the input-to-output path mapping
//! - **[`codec`]**: the synchronous document transformation ([`codec::DocumentTransformer`])
//! - **[`render`]**: one document from read to atomic write ([`render::Renderer`])
//! - **[`dispatch`]**: batch rendering with bounded concurrency ([`dispatch::Dispatcher`])
//! - **[`watch`]**: incremental re-rendering on file system changes ([`watch::WatchController`])
//! - **[`config`]**: run configuration, the settings file, built-in template and stylesheet
//! - **[`event`]**: outcome notifications for callers that want more than log lines
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mdrender::{
//!     config::RenderConfig,
//!     dispatch::Dispatcher,
//!     paths::{resolve_paths, target_files},
//!     render::Renderer,
//! };
//! use std::path::Path;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let paths = resolve_paths(Some(Path::new("./docs")), Some(Path::new("./site")))?;
//!     let files = target_files(&paths.input, "md")?;
//!
//!     let renderer = Renderer::new(RenderConfig::new(&paths.base, &paths.out));
//!     let summary = Dispatcher::new(renderer).render_all(files).await;
//!     println!("{summary}");
//!     Ok(())
//! }
//! ```
//!
//! The `mdrender` binary (feature `bin`) wraps the same steps behind a command line and adds
//! `--watch`.

pub mod codec;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod paths;
pub mod render;
#[cfg(test)]
mod tests;
pub mod watch;

pub use error::*;
