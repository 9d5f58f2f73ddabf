//! # Watch mode
//!
//! [`WatchController`] keeps a generated tree up to date while documents are edited. After
//! the initial batch render, it subscribes to every directory under the watch root and
//! re-renders target documents as change notifications arrive.
//!
//! ## Event handling
//!
//! | Notification                          | Action                                         |
//! |---------------------------------------|------------------------------------------------|
//! | content write to a target document    | render, unless debounced                       |
//! | create (or rename-to) of a document   | render immediately                             |
//! | create (or rename-to) of a directory  | subscribe to it and its subdirectories         |
//! | remove (or rename-from) of a dir      | unsubscribe it and its subdirectories          |
//! | metadata change, access, anything else| ignored                                        |
//!
//! Writes to the same document less than [`DEBOUNCE_WINDOW`] after the last accepted one
//! are dropped. Editors often emit several writes per save.
//!
//! ## Concurrency
//!
//! One task owns all mutable state (subscribed directories, debounce table, in-flight
//! renders); notifications and render completions reach it over channels. At most one render
//! per document runs at a time. A trigger that arrives while that document is rendering
//! marks it dirty, and a single follow-up render runs once the current one finishes.
//!
//! ## Lifecycle
//!
//! `Idle` until [`WatchController::run`] subscribes successfully, then `Watching` until
//! the shutdown future resolves or the notification source fails, then `Stopped`. A
//! subscription failure at startup is returned as an error; a later notification error
//! is logged and ends the loop. On the way out, renders still in flight get
//! [`SHUTDOWN_GRACE`] to finish; whatever is left after that is abandoned and logged.
//!
//! ```rust,no_run
//! use mdrender::{config::RenderConfig, render::Renderer, watch::WatchController};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), mdrender::RenderError> {
//! let renderer = Renderer::new(RenderConfig::new("/docs", "/site"));
//! WatchController::new("/docs".as_ref(), renderer)
//!     .run(tokio::time::sleep(Duration::from_secs(3600)))
//!     .await?;
//! # Ok(())
//! # }
//! ```

use std::{
    collections::{HashMap, HashSet},
    future::Future,
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use notify::{
    event::{ModifyKind, RenameMode},
    Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher,
};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use crate::{
    error::RenderError,
    event::{emit, EventSender, RenderEvent},
    paths::{directories, is_hidden_path, is_target_file, target_files},
    render::Renderer,
};

/// Minimum spacing between two accepted writes to the same document.
pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(200);

/// How long shutdown waits for renders still in flight before abandoning them.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchPhase {
    Idle,
    Watching,
    Stopped,
}

/// Per-document time of the last accepted write.
#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    last_write: HashMap<PathBuf, Instant>,
}

impl Default for Debouncer {
    fn default() -> Self {
        Self::new(DEBOUNCE_WINDOW)
    }
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Debouncer {
            window,
            last_write: HashMap::new(),
        }
    }

    /// Whether a write to `path` at `now` should render. Accepted writes restart the window;
    /// suppressed ones do not.
    ///
    /// Entries whose window has elapsed are dropped, so the table only holds documents
    /// written within the last window.
    pub fn should_render(&mut self, path: &Path, now: Instant) -> bool {
        let window = self.window;
        self.last_write
            .retain(|_, last| now.saturating_duration_since(*last) < window);
        if self.last_write.contains_key(path) {
            return false;
        }
        self.last_write.insert(path.to_path_buf(), now);
        true
    }
}

/// Subscription seam between the controller and the notification backend.
pub trait DirectoryWatcher: Send {
    /// Subscribe to changes of the direct children of `dir`.
    fn watch_dir(&mut self, dir: &Path) -> Result<(), RenderError>;
    fn unwatch_dir(&mut self, dir: &Path) -> Result<(), RenderError>;
}

impl DirectoryWatcher for RecommendedWatcher {
    fn watch_dir(&mut self, dir: &Path) -> Result<(), RenderError> {
        Ok(self.watch(dir, RecursiveMode::NonRecursive)?)
    }

    fn unwatch_dir(&mut self, dir: &Path) -> Result<(), RenderError> {
        Ok(self.unwatch(dir)?)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchAction {
    /// Content of a target document changed; subject to debouncing.
    Write(PathBuf),
    /// A target document appeared.
    Create(PathBuf),
    WatchDirectory(PathBuf),
    UnwatchDirectory(PathBuf),
}

/// What the controller watches and which paths it cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchScope {
    root: PathBuf,
    extension: String,
    /// Set when watching a single document: only it is rendered and only its directory is
    /// subscribed.
    focus: Option<PathBuf>,
}

impl WatchScope {
    pub fn new(input: &Path, extension: &str) -> Self {
        match (input.is_file(), input.parent()) {
            (true, Some(parent)) => WatchScope {
                root: parent.to_path_buf(),
                extension: extension.to_string(),
                focus: Some(input.to_path_buf()),
            },
            _ => WatchScope {
                root: input.to_path_buf(),
                extension: extension.to_string(),
                focus: None,
            },
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directories to subscribe to at startup.
    pub fn directories(&self) -> Vec<PathBuf> {
        match self.focus {
            Some(_) => vec![self.root.clone()],
            None => directories(&self.root),
        }
    }

    fn is_target(&self, path: &Path) -> bool {
        match &self.focus {
            Some(focus) => path == focus,
            None => {
                !is_hidden_path(path, &self.root) && is_target_file(path, &self.extension)
            }
        }
    }

    pub fn classify(&self, event: &Event, watched: &HashSet<PathBuf>) -> Vec<WatchAction> {
        let mut actions = Vec::new();
        match &event.kind {
            EventKind::Create(_) | EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
                for path in &event.paths {
                    self.created(path, watched, &mut actions);
                }
            }
            EventKind::Remove(_) | EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
                for path in &event.paths {
                    self.removed(path, watched, &mut actions);
                }
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
                if let [from, to] = event.paths.as_slice() {
                    self.removed(from, watched, &mut actions);
                    self.created(to, watched, &mut actions);
                }
            }
            // The backend could not tell which side of the rename this is.
            EventKind::Modify(ModifyKind::Name(_)) => {
                for path in &event.paths {
                    if path.exists() {
                        self.created(path, watched, &mut actions);
                    } else {
                        self.removed(path, watched, &mut actions);
                    }
                }
            }
            EventKind::Modify(ModifyKind::Metadata(_)) => {}
            EventKind::Modify(_) => {
                for path in &event.paths {
                    if self.is_target(path) {
                        actions.push(WatchAction::Write(path.clone()));
                    }
                }
            }
            EventKind::Access(_) | EventKind::Any | EventKind::Other => {}
        }
        actions
    }

    fn created(&self, path: &Path, watched: &HashSet<PathBuf>, actions: &mut Vec<WatchAction>) {
        if path.is_dir() {
            if self.focus.is_none()
                && !is_hidden_path(path, &self.root)
                && !watched.contains(path)
            {
                actions.push(WatchAction::WatchDirectory(path.to_path_buf()));
            }
        } else if self.is_target(path) {
            actions.push(WatchAction::Create(path.to_path_buf()));
        }
    }

    fn removed(&self, path: &Path, watched: &HashSet<PathBuf>, actions: &mut Vec<WatchAction>) {
        if watched.contains(path) && path != self.root {
            actions.push(WatchAction::UnwatchDirectory(path.to_path_buf()));
        }
    }
}

pub struct WatchController {
    scope: WatchScope,
    renderer: Renderer,
    event_tx: Option<EventSender>,
    phase: WatchPhase,
    watched: HashSet<PathBuf>,
    debouncer: Debouncer,
    /// Documents currently rendering, and whether another render was requested meanwhile.
    in_flight: HashMap<PathBuf, bool>,
    drain_timeout: Duration,
    done_tx: UnboundedSender<PathBuf>,
    done_rx: Option<UnboundedReceiver<PathBuf>>,
}

impl WatchController {
    /// Watch `input`, a directory tree or a single document.
    pub fn new(input: &Path, renderer: Renderer) -> Self {
        let scope = WatchScope::new(input, &renderer.config().extension);
        let (done_tx, done_rx) = unbounded_channel();
        WatchController {
            scope,
            renderer,
            event_tx: None,
            phase: WatchPhase::Idle,
            watched: HashSet::new(),
            debouncer: Debouncer::default(),
            in_flight: HashMap::new(),
            drain_timeout: SHUTDOWN_GRACE,
            done_tx,
            done_rx: Some(done_rx),
        }
    }

    pub fn with_events(mut self, tx: EventSender) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    pub fn phase(&self) -> WatchPhase {
        self.phase
    }

    pub fn watched_directories(&self) -> &HashSet<PathBuf> {
        &self.watched
    }

    /// Watch until `shutdown` resolves or the notification source fails. Renders still
    /// running at that point are awaited for at most the drain timeout.
    pub async fn run<F>(mut self, shutdown: F) -> Result<(), RenderError>
    where
        F: Future<Output = ()>,
    {
        let (fs_tx, fs_rx) = unbounded_channel::<notify::Result<Event>>();
        let mut watcher = match notify::recommended_watcher(move |res: notify::Result<Event>| {
            let _ = fs_tx.send(res);
        }) {
            Ok(watcher) => watcher,
            Err(err) => {
                self.phase = WatchPhase::Stopped;
                return Err(err.into());
            }
        };
        self.watch_loop(shutdown, fs_rx, &mut watcher).await
    }

    /// Subscribe through `watcher`, then consume notifications from `fs_rx` until `shutdown`
    /// resolves or the source reports an error.
    pub(crate) async fn watch_loop<F>(
        &mut self,
        shutdown: F,
        mut fs_rx: UnboundedReceiver<notify::Result<Event>>,
        watcher: &mut dyn DirectoryWatcher,
    ) -> Result<(), RenderError>
    where
        F: Future<Output = ()>,
    {
        self.start(watcher)?;

        let mut done_rx = self
            .done_rx
            .take()
            .ok_or_else(|| RenderError::WatchSubscription("watch loop already ran".to_string()))?;
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("[WatchController] Shutdown requested");
                    break;
                }
                Some(res) = fs_rx.recv() => match res {
                    Ok(event) => self.handle_event_at(&event, Instant::now(), watcher),
                    Err(err) => {
                        tracing::error!("[WatchController] Notification source failed: {}", RenderError::from(err));
                        break;
                    }
                },
                Some(path) = done_rx.recv() => self.finish_render(path),
                else => break,
            }
        }

        self.stop(watcher);
        self.drain(&mut done_rx).await;
        Ok(())
    }

    /// Wait for in-flight renders, giving up after the drain timeout. A render blocked on
    /// its input (a FIFO, a stalled mount) is abandoned rather than awaited forever.
    async fn drain(&mut self, done_rx: &mut UnboundedReceiver<PathBuf>) {
        let in_flight = &mut self.in_flight;
        let drained = tokio::time::timeout(self.drain_timeout, async {
            while !in_flight.is_empty() {
                match done_rx.recv().await {
                    Some(path) => {
                        in_flight.remove(&path);
                    }
                    None => break,
                }
            }
        })
        .await;
        if drained.is_err() {
            for path in self.in_flight.keys() {
                tracing::warn!("[WatchController] Abandoned unfinished render of {:?}", path);
            }
            self.in_flight.clear();
        }
    }

    /// Subscribe to every directory in scope. Any failure here is fatal.
    pub(crate) fn start(&mut self, watcher: &mut dyn DirectoryWatcher) -> Result<(), RenderError> {
        if !self.scope.root().is_dir() {
            self.phase = WatchPhase::Stopped;
            return Err(RenderError::WatchSubscription(format!(
                "watch root {:?} is not a directory",
                self.scope.root()
            )));
        }
        for dir in self.scope.directories() {
            if let Err(err) = watcher.watch_dir(&dir) {
                tracing::error!("[WatchController] Failed to watch {:?}: {}", dir, err);
                self.phase = WatchPhase::Stopped;
                return Err(err);
            }
            self.watched.insert(dir);
        }
        self.phase = WatchPhase::Watching;
        tracing::info!(
            "[WatchController] Watching {} directories under {:?}",
            self.watched.len(),
            self.scope.root()
        );
        emit(
            self.event_tx.as_ref(),
            RenderEvent::WatchStarted(self.scope.root().to_path_buf(), self.watched.len()),
        );
        Ok(())
    }

    pub(crate) fn handle_event_at(
        &mut self,
        event: &Event,
        now: Instant,
        watcher: &mut dyn DirectoryWatcher,
    ) {
        if self.phase != WatchPhase::Watching {
            return;
        }
        for action in self.scope.classify(event, &self.watched) {
            tracing::debug!("[WatchController] {:?}", action);
            match action {
                WatchAction::Write(path) => {
                    if self.debouncer.should_render(&path, now) {
                        self.trigger(path);
                    } else {
                        emit(self.event_tx.as_ref(), RenderEvent::RenderSuppressed(path));
                    }
                }
                WatchAction::Create(path) => self.trigger(path),
                WatchAction::WatchDirectory(dir) => self.add_directory(&dir, watcher),
                WatchAction::UnwatchDirectory(dir) => self.remove_directory(&dir, watcher),
            }
        }
    }

    /// Subscribe to a new directory (and any subdirectories it arrived with) and render the
    /// documents already inside it.
    fn add_directory(&mut self, dir: &Path, watcher: &mut dyn DirectoryWatcher) {
        for sub in directories(dir) {
            if self.watched.contains(&sub) {
                continue;
            }
            match watcher.watch_dir(&sub) {
                Ok(()) => {
                    tracing::info!("[WatchController] Watching {:?}", sub);
                    self.watched.insert(sub.clone());
                    emit(self.event_tx.as_ref(), RenderEvent::DirectoryWatched(sub));
                }
                Err(err) => tracing::warn!("[WatchController] Failed to watch {:?}: {}", sub, err),
            }
        }
        match target_files(dir, &self.scope.extension) {
            Ok(files) => files.into_iter().for_each(|file| self.trigger(file)),
            Err(err) => tracing::debug!("[WatchController] {:?} vanished: {}", dir, err),
        }
    }

    fn remove_directory(&mut self, dir: &Path, watcher: &mut dyn DirectoryWatcher) {
        let mut gone: Vec<_> = self
            .watched
            .iter()
            .filter(|d| d.starts_with(dir))
            .cloned()
            .collect();
        gone.sort();
        for sub in gone {
            self.watched.remove(&sub);
            // The backend usually drops watches on deleted directories by itself.
            if let Err(err) = watcher.unwatch_dir(&sub) {
                tracing::debug!("[WatchController] Unwatch {:?}: {}", sub, err);
            }
            tracing::info!("[WatchController] Stopped watching {:?}", sub);
            emit(self.event_tx.as_ref(), RenderEvent::DirectoryUnwatched(sub));
        }
    }

    fn trigger(&mut self, path: PathBuf) {
        emit(
            self.event_tx.as_ref(),
            RenderEvent::RenderTriggered(path.clone()),
        );
        match self.in_flight.get_mut(&path) {
            Some(rerun) => *rerun = true,
            None => self.spawn_render(path),
        }
    }

    fn spawn_render(&mut self, path: PathBuf) {
        self.in_flight.insert(path.clone(), false);
        let renderer = self.renderer.clone();
        let event_tx = self.event_tx.clone();
        let done_tx = self.done_tx.clone();
        tokio::spawn(async move {
            renderer.render(&path).await.report(event_tx.as_ref());
            let _ = done_tx.send(path);
        });
    }

    pub(crate) fn finish_render(&mut self, path: PathBuf) {
        if self.in_flight.remove(&path) == Some(true) {
            self.spawn_render(path);
        }
    }

    fn stop(&mut self, watcher: &mut dyn DirectoryWatcher) {
        for dir in self.watched.drain() {
            let _ = watcher.unwatch_dir(&dir);
        }
        self.phase = WatchPhase::Stopped;
        tracing::info!("[WatchController] Stopped");
        emit(self.event_tx.as_ref(), RenderEvent::WatchStopped);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RenderConfig;
    use notify::event::{CreateKind, DataChange, MetadataKind, RemoveKind};
    use std::fs;
    use tempfile::{tempdir, TempDir};
    use test_log::test;
    use tokio::sync::mpsc::UnboundedReceiver;

    #[cfg(unix)]
    use crate::tests::helpers::{make_fifo, release_fifo};

    #[derive(Default)]
    struct RecordingWatcher {
        watched: Vec<PathBuf>,
        unwatched: Vec<PathBuf>,
        fail: bool,
    }

    impl DirectoryWatcher for RecordingWatcher {
        fn watch_dir(&mut self, dir: &Path) -> Result<(), RenderError> {
            if self.fail {
                return Err(RenderError::WatchSubscription(format!("refused {dir:?}")));
            }
            self.watched.push(dir.to_path_buf());
            Ok(())
        }

        fn unwatch_dir(&mut self, dir: &Path) -> Result<(), RenderError> {
            self.unwatched.push(dir.to_path_buf());
            Ok(())
        }
    }

    fn event(kind: EventKind, path: &Path) -> Event {
        Event::new(kind).add_path(path.to_path_buf())
    }

    fn write_event(path: &Path) -> Event {
        event(EventKind::Modify(ModifyKind::Data(DataChange::Content)), path)
    }

    fn tree() -> TempDir {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("a.md"), "# a").unwrap();
        fs::write(dir.path().join("notes.txt"), "n").unwrap();
        fs::write(dir.path().join("sub").join("b.md"), "# b").unwrap();
        dir
    }

    fn controller(
        dir: &Path,
    ) -> (
        WatchController,
        RecordingWatcher,
        UnboundedReceiver<RenderEvent>,
    ) {
        let (tx, rx) = unbounded_channel();
        let renderer = Renderer::new(RenderConfig::new(dir, dir).with_template("{{{content}}}"));
        let mut controller = WatchController::new(dir, renderer).with_events(tx);
        let mut watcher = RecordingWatcher::default();
        controller.start(&mut watcher).unwrap();
        (controller, watcher, rx)
    }

    fn drain(rx: &mut UnboundedReceiver<RenderEvent>) -> Vec<RenderEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    /// Wait for every render the controller has started, including follow-ups.
    async fn settle(controller: &mut WatchController) {
        let mut done_rx = controller.done_rx.take().unwrap();
        while !controller.in_flight.is_empty() {
            let path = done_rx.recv().await.unwrap();
            controller.finish_render(path);
        }
        controller.done_rx = Some(done_rx);
    }

    #[test]
    fn test_debouncer_window() {
        let mut debouncer = Debouncer::default();
        let t0 = Instant::now();
        let a = Path::new("/r/a.md");
        let b = Path::new("/r/b.md");

        assert!(debouncer.should_render(a, t0));
        assert!(!debouncer.should_render(a, t0 + Duration::from_millis(100)));
        assert!(debouncer.should_render(b, t0 + Duration::from_millis(100)));
        assert!(!debouncer.should_render(a, t0 + Duration::from_millis(199)));
        assert!(debouncer.should_render(a, t0 + Duration::from_millis(200)));
        // Suppressed writes do not extend the window.
        assert!(!debouncer.should_render(a, t0 + Duration::from_millis(300)));
        assert!(debouncer.should_render(a, t0 + Duration::from_millis(401)));
    }

    #[test]
    fn test_debouncer_prunes_elapsed_entries() {
        let mut debouncer = Debouncer::default();
        let t0 = Instant::now();
        for i in 0..50 {
            assert!(debouncer.should_render(&PathBuf::from(format!("/r/{i}.md")), t0));
        }
        assert_eq!(debouncer.last_write.len(), 50);

        assert!(debouncer.should_render(Path::new("/r/late.md"), t0 + DEBOUNCE_WINDOW));
        assert_eq!(debouncer.last_write.len(), 1);
        assert!(debouncer.should_render(Path::new("/r/0.md"), t0 + DEBOUNCE_WINDOW));
    }

    #[test]
    fn test_classify_writes() {
        let dir = tree();
        let scope = WatchScope::new(dir.path(), "md");
        let watched = HashSet::new();
        let doc = dir.path().join("a.md");

        assert_eq!(
            scope.classify(&write_event(&doc), &watched),
            vec![WatchAction::Write(doc.clone())]
        );
        assert_eq!(
            scope.classify(&event(EventKind::Modify(ModifyKind::Any), &doc), &watched),
            vec![WatchAction::Write(doc.clone())]
        );
        assert!(scope
            .classify(&write_event(&dir.path().join("notes.txt")), &watched)
            .is_empty());
        assert!(scope
            .classify(
                &event(
                    EventKind::Modify(ModifyKind::Metadata(MetadataKind::Permissions)),
                    &doc
                ),
                &watched
            )
            .is_empty());
    }

    #[test]
    fn test_classify_hidden_directories_are_ignored() {
        let dir = tree();
        fs::create_dir_all(dir.path().join(".git")).unwrap();
        let scope = WatchScope::new(dir.path(), "md");
        let watched = HashSet::new();

        assert!(scope
            .classify(&write_event(&dir.path().join(".git").join("x.md")), &watched)
            .is_empty());
        assert!(scope
            .classify(
                &event(EventKind::Create(CreateKind::Folder), &dir.path().join(".git")),
                &watched
            )
            .is_empty());
    }

    #[test]
    fn test_classify_create_and_remove() {
        let dir = tree();
        let scope = WatchScope::new(dir.path(), "md");
        let sub = dir.path().join("sub");
        let doc = sub.join("b.md");
        let mut watched = HashSet::new();

        assert_eq!(
            scope.classify(&event(EventKind::Create(CreateKind::File), &doc), &watched),
            vec![WatchAction::Create(doc.clone())]
        );
        assert_eq!(
            scope.classify(&event(EventKind::Create(CreateKind::Folder), &sub), &watched),
            vec![WatchAction::WatchDirectory(sub.clone())]
        );

        watched.insert(sub.clone());
        assert!(scope
            .classify(&event(EventKind::Create(CreateKind::Folder), &sub), &watched)
            .is_empty());
        assert_eq!(
            scope.classify(&event(EventKind::Remove(RemoveKind::Folder), &sub), &watched),
            vec![WatchAction::UnwatchDirectory(sub.clone())]
        );
        // Removing an unwatched path is a no-op.
        assert!(scope
            .classify(&event(EventKind::Remove(RemoveKind::File), &doc), &watched)
            .is_empty());
    }

    #[test]
    fn test_classify_rename_into_place_is_create() {
        let dir = tree();
        let scope = WatchScope::new(dir.path(), "md");
        let from = dir.path().join("a.md.swp");
        let to = dir.path().join("a.md");
        let rename = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path(from)
            .add_path(to.clone());

        assert_eq!(
            scope.classify(&rename, &HashSet::new()),
            vec![WatchAction::Create(to)]
        );
    }

    #[test]
    fn test_single_document_scope() {
        let dir = tree();
        let doc = dir.path().join("a.md");
        let scope = WatchScope::new(&doc, "md");
        assert_eq!(scope.root(), dir.path());
        assert_eq!(scope.directories(), vec![dir.path().to_path_buf()]);

        let watched = HashSet::new();
        assert_eq!(
            scope.classify(&write_event(&doc), &watched),
            vec![WatchAction::Write(doc.clone())]
        );
        assert!(scope
            .classify(&write_event(&dir.path().join("other.md")), &watched)
            .is_empty());
        assert!(scope
            .classify(
                &event(EventKind::Create(CreateKind::Folder), &dir.path().join("sub")),
                &watched
            )
            .is_empty());
    }

    #[test(tokio::test)]
    async fn test_start_subscribes_every_directory() {
        let dir = tree();
        let (controller, watcher, mut rx) = controller(dir.path());

        let mut watched = watcher.watched.clone();
        watched.sort();
        assert_eq!(
            watched,
            vec![dir.path().to_path_buf(), dir.path().join("sub")]
        );
        assert_eq!(controller.phase(), WatchPhase::Watching);
        assert_eq!(
            drain(&mut rx),
            vec![RenderEvent::WatchStarted(dir.path().to_path_buf(), 2)]
        );
    }

    #[test(tokio::test)]
    async fn test_start_failure_is_fatal() {
        let dir = tree();
        let renderer = Renderer::new(RenderConfig::new(dir.path(), dir.path()));
        let mut controller = WatchController::new(dir.path(), renderer);
        let mut watcher = RecordingWatcher {
            fail: true,
            ..Default::default()
        };
        assert!(matches!(
            controller.start(&mut watcher),
            Err(RenderError::WatchSubscription(_))
        ));
        assert_eq!(controller.phase(), WatchPhase::Stopped);
    }

    #[test(tokio::test)]
    async fn test_rapid_writes_render_once() {
        let dir = tree();
        let (mut controller, mut watcher, mut rx) = controller(dir.path());
        let doc = dir.path().join("a.md");
        let t0 = Instant::now();

        controller.handle_event_at(&write_event(&doc), t0, &mut watcher);
        controller.handle_event_at(
            &write_event(&doc),
            t0 + Duration::from_millis(50),
            &mut watcher,
        );
        settle(&mut controller).await;

        let events = drain(&mut rx);
        let triggered = events
            .iter()
            .filter(|e| matches!(e, RenderEvent::RenderTriggered(_)))
            .count();
        let suppressed = events
            .iter()
            .filter(|e| matches!(e, RenderEvent::RenderSuppressed(_)))
            .count();
        let rendered = events
            .iter()
            .filter(|e| matches!(e, RenderEvent::Rendered(..)))
            .count();
        assert_eq!((triggered, suppressed, rendered), (1, 1, 1));
        assert_eq!(
            fs::read_to_string(dir.path().join("a.html")).unwrap(),
            "<h1>a</h1>\n"
        );
    }

    #[test(tokio::test)]
    async fn test_spaced_writes_render_twice() {
        let dir = tree();
        let (mut controller, mut watcher, mut rx) = controller(dir.path());
        let doc = dir.path().join("a.md");
        let t0 = Instant::now();

        controller.handle_event_at(&write_event(&doc), t0, &mut watcher);
        settle(&mut controller).await;
        controller.handle_event_at(
            &write_event(&doc),
            t0 + Duration::from_millis(250),
            &mut watcher,
        );
        settle(&mut controller).await;

        let rendered = drain(&mut rx)
            .into_iter()
            .filter(|e| matches!(e, RenderEvent::Rendered(..)))
            .count();
        assert_eq!(rendered, 2);
    }

    #[test(tokio::test)]
    async fn test_triggers_during_render_coalesce_into_one_rerun() {
        let dir = tree();
        let (mut controller, mut watcher, mut rx) = controller(dir.path());
        let doc = dir.path().join("a.md");
        let create = event(EventKind::Create(CreateKind::File), &doc);
        let now = Instant::now();

        controller.handle_event_at(&create, now, &mut watcher);
        controller.handle_event_at(&create, now, &mut watcher);
        controller.handle_event_at(&create, now, &mut watcher);
        assert_eq!(controller.in_flight.get(&doc), Some(&true));
        settle(&mut controller).await;

        let rendered = drain(&mut rx)
            .into_iter()
            .filter(|e| matches!(e, RenderEvent::Rendered(..)))
            .count();
        assert_eq!(rendered, 2);
        assert!(controller.in_flight.is_empty());
    }

    #[test(tokio::test)]
    async fn test_new_directory_is_watched_and_rendered() {
        let dir = tree();
        let (mut controller, mut watcher, mut rx) = controller(dir.path());
        let added = dir.path().join("added");
        fs::create_dir_all(added.join("nested")).unwrap();
        fs::write(added.join("nested").join("c.md"), "# c").unwrap();

        controller.handle_event_at(
            &event(EventKind::Create(CreateKind::Folder), &added),
            Instant::now(),
            &mut watcher,
        );
        settle(&mut controller).await;

        assert!(controller.watched_directories().contains(&added));
        assert!(controller
            .watched_directories()
            .contains(&added.join("nested")));
        assert!(added.join("nested").join("c.html").exists());
        assert!(drain(&mut rx)
            .contains(&RenderEvent::DirectoryWatched(added.clone())));

        controller.handle_event_at(
            &event(EventKind::Remove(RemoveKind::Folder), &added),
            Instant::now(),
            &mut watcher,
        );
        assert!(!controller.watched_directories().contains(&added));
        assert!(!controller
            .watched_directories()
            .contains(&added.join("nested")));
        assert_eq!(
            watcher.unwatched,
            vec![added.clone(), added.join("nested")]
        );
    }

    #[test(tokio::test)]
    async fn test_events_after_stop_are_ignored() {
        let dir = tree();
        let (mut controller, mut watcher, mut rx) = controller(dir.path());
        controller.stop(&mut watcher);
        drain(&mut rx);

        controller.handle_event_at(
            &write_event(&dir.path().join("a.md")),
            Instant::now(),
            &mut watcher,
        );
        assert!(drain(&mut rx).is_empty());
        assert_eq!(controller.phase(), WatchPhase::Stopped);
    }

    #[test(tokio::test)]
    async fn test_notification_error_stops_watching() {
        let dir = tree();
        let (tx, mut rx) = unbounded_channel();
        let renderer = Renderer::new(RenderConfig::new(dir.path(), dir.path()));
        let mut controller = WatchController::new(dir.path(), renderer).with_events(tx);
        let mut watcher = RecordingWatcher::default();
        let (fs_tx, fs_rx) = unbounded_channel::<notify::Result<Event>>();
        fs_tx
            .send(Err(notify::Error::generic("backend went away")))
            .unwrap();

        let res = controller
            .watch_loop(std::future::pending::<()>(), fs_rx, &mut watcher)
            .await;

        assert!(res.is_ok());
        assert_eq!(controller.phase(), WatchPhase::Stopped);
        assert!(controller.watched_directories().is_empty());
        let mut unwatched = watcher.unwatched.clone();
        unwatched.sort();
        assert_eq!(
            unwatched,
            vec![dir.path().to_path_buf(), dir.path().join("sub")]
        );
        let events = drain(&mut rx);
        assert_eq!(
            events.first(),
            Some(&RenderEvent::WatchStarted(dir.path().to_path_buf(), 2))
        );
        assert_eq!(events.last(), Some(&RenderEvent::WatchStopped));
    }

    #[cfg(unix)]
    #[test(tokio::test)]
    async fn test_shutdown_abandons_blocked_render() {
        let dir = tree();
        let fifo = dir.path().join("pipe.md");
        make_fifo(&fifo);

        let (tx, mut rx) = unbounded_channel();
        let renderer = Renderer::new(
            RenderConfig::new(dir.path(), dir.path()).with_template("{{{content}}}"),
        );
        let mut controller = WatchController::new(dir.path(), renderer)
            .with_events(tx)
            .with_drain_timeout(Duration::from_millis(200));
        let mut watcher = RecordingWatcher::default();
        let (fs_tx, fs_rx) = unbounded_channel::<notify::Result<Event>>();
        fs_tx
            .send(Ok(event(EventKind::Create(CreateKind::File), &fifo)))
            .unwrap();

        let started = Instant::now();
        let res = controller
            .watch_loop(
                tokio::time::sleep(Duration::from_millis(100)),
                fs_rx,
                &mut watcher,
            )
            .await;

        assert!(res.is_ok());
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(controller.phase(), WatchPhase::Stopped);
        assert!(controller.in_flight.is_empty());
        let events = drain(&mut rx);
        assert!(events.contains(&RenderEvent::RenderTriggered(fifo.clone())));
        assert!(!events.iter().any(|e| matches!(e, RenderEvent::Rendered(..))));

        // Unblock the reader so the runtime can shut down.
        release_fifo(&fifo);
    }
}
