//! mdrender CLI tool
//!
//! Renders a markdown document, or every markdown document below a directory, into
//! standalone HTML pages.
//!
//! ## Settings
//!
//! Options can also be kept in a `mdrender.toml` next to the documents (or any file passed
//! with `--config`). Command-line flags take precedence over the file; the file takes
//! precedence over built-in defaults.
//!
//! ## Watch mode
//!
//! With `--watch` the tool keeps running after the initial render and re-renders documents
//! as they change, until interrupted with Ctrl-C. Renders already running at that point get a
//! short grace period to finish; one stuck on its input does not keep the process alive.

use clap::Parser;
use mdrender::{
    codec::{highlighter, DocumentTransformer},
    config::{
        load_style, load_template, RenderConfig, SettingsProvider, TomlSettingsProvider,
        SETTINGS_FILE_NAME,
    },
    dispatch::Dispatcher,
    event::RenderEvent,
    paths::{resolve_paths, target_files},
    render::Renderer,
    watch::{WatchController, SHUTDOWN_GRACE},
};
use std::{path::PathBuf, sync::Arc, time::Duration};
use tokio::sync::{mpsc::unbounded_channel, Notify};

#[derive(Parser)]
#[command(name = "mdrender")]
#[command(author, version, about = "Render markdown documents into standalone HTML pages", long_about = None)]
struct Cli {
    /// Document or directory to render (default: current directory)
    path: Option<PathBuf>,

    /// Output directory (default: next to the sources)
    #[arg(short, long)]
    out_dir: Option<PathBuf>,

    /// Embed local images as data URIs instead of copying them
    #[arg(short, long)]
    image_inline: bool,

    /// Keep running and re-render documents when they change
    #[arg(short, long)]
    watch: bool,

    /// HTML template containing {{{content}}} and optionally {{{style}}}
    #[arg(short, long)]
    template: Option<PathBuf>,

    /// Stylesheet to use instead of the built-in one; may be repeated
    #[arg(short, long)]
    style: Vec<PathBuf>,

    /// Settings file (default: mdrender.toml in the input directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Maximum number of documents rendered at once
    #[arg(long)]
    concurrency: Option<usize>,

    /// Give up on a document after this many seconds
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Extension of the documents to render
    #[arg(long)]
    ext: Option<String>,

    /// Syntax highlighting theme used with the built-in stylesheet
    #[arg(long)]
    theme: Option<String>,

    /// Print every render event
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    // The settings file lives next to the input, so the input is resolved before the output.
    let located = resolve_paths(cli.path.as_deref(), None)?;
    let settings_path = cli
        .config
        .clone()
        .unwrap_or_else(|| located.base.join(SETTINGS_FILE_NAME));
    let settings = TomlSettingsProvider::new(settings_path).settings()?;

    let out_dir = cli.out_dir.clone().or(settings.out_dir.clone());
    let paths = resolve_paths(Some(located.input.as_path()), out_dir.as_deref())?;
    let image_inline = cli.image_inline || settings.image_inline;
    let watch = cli.watch || settings.watch;
    let extension = cli.ext.clone().unwrap_or(settings.extension.clone());
    let concurrency = cli.concurrency.unwrap_or(settings.concurrency);
    let timeout = cli.timeout_secs.map(Duration::from_secs).or(settings.timeout());
    let theme = cli.theme.clone().unwrap_or(settings.theme.clone());
    let template_path = cli.template.clone().or(settings.template.clone());
    let styles = if cli.style.is_empty() {
        settings.styles.clone()
    } else {
        cli.style.clone()
    };

    let highlighter = highlighter();
    let theme_css = highlighter.theme_css(&theme)?;
    let config = RenderConfig::new(&paths.base, &paths.out)
        .with_image_inline(image_inline)
        .with_template(load_template(template_path.as_deref())?)
        .with_style(load_style(&styles, &theme_css)?)
        .with_extension(extension.clone())
        .with_timeout(timeout);
    config.validate()?;

    tracing::info!("input : {:?}", paths.input);
    tracing::info!("output: {:?}", paths.out);
    if image_inline {
        tracing::info!("images: inline");
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let outcome = runtime.block_on(async {
        let (tx, mut rx) = unbounded_channel::<RenderEvent>();
        let verbose = cli.verbose;
        let event_handle = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if verbose {
                    println!("[Event] {event}");
                }
            }
        });

        let transformer = DocumentTransformer::with_highlighter(Arc::new(config), highlighter);
        let renderer = Renderer::with_transformer(Arc::new(transformer));

        let files = target_files(&paths.input, &extension)?;
        tracing::info!("{} files detected", files.len());
        let summary = Dispatcher::new(renderer.clone())
            .with_concurrency(concurrency)
            .with_events(tx.clone())
            .render_all(files)
            .await;

        if watch {
            let shutdown = Arc::new(Notify::new());
            let signal = Arc::clone(&shutdown);
            ctrlc::set_handler(move || {
                println!("\nShutting down...");
                signal.notify_one();
            })?;

            println!(
                "Watching {} for changes. Press Ctrl-C to stop.",
                paths.input.display()
            );
            WatchController::new(&paths.input, renderer)
                .with_events(tx.clone())
                .run(async move { shutdown.notified().await })
                .await?;
            println!("Shutdown complete");
        }

        drop(tx);
        let _ = event_handle.await;
        Ok::<usize, Box<dyn std::error::Error>>(summary.failed)
    });
    // A read blocked past its timeout still occupies a blocking thread; don't wait on it.
    runtime.shutdown_timeout(SHUTDOWN_GRACE);
    let failed = outcome?;

    if failed > 0 && !watch {
        std::process::exit(1);
    }
    Ok(())
}
