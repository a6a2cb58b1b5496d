//! Signal router: a directory-scoped observer that drives workers.
//!
//! A router reacts only to events whose parent directory is the one it
//! watches. What it does with them depends on its [`RouterMode`]:
//!
//! - `Immediate`: every event gets a fresh worker that is opened, worked and
//!   dropped within the same call.
//! - `Accumulating`: the first event a worker accepts for a filename starts
//!   tracking; later events for that filename go to the same worker until it
//!   completes.
//!
//! ```text
//! Create a.txt  -> factory() -> open() == true  -> pending = {a.txt}
//! Write  a.txt  -> open(), work() == NotReady   -> pending = {a.txt}
//! Remove a.txt  -> open(), work() == Ok         -> pending = {}
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::config::RouterConfig;

use super::error::{WatchError, WatchResult};
use super::handler::Observer;
use super::worker::{Logger, WorkError, Worker, WorkerFactory};
use super::Event;

const COMPONENT: &str = "router";

/// How a router manages worker lifetimes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouterMode {
    /// One fresh worker per event.
    #[default]
    Immediate,
    /// One persistent worker per filename.
    Accumulating,
}

struct RouterState {
    mode: RouterMode,
    pending: HashMap<String, Box<dyn Worker>>,
}

/// Observer that filters by directory and manages worker lifecycles.
pub struct SignalRouter {
    tag: OnceLock<String>,
    watching: PathBuf,
    factory: WorkerFactory,
    free_on_completion: bool,
    evict_on_failure: bool,
    log_not_ready: bool,
    logger: Arc<dyn Logger>,
    /// Mode and pending workers. Held across lookup, work and eviction.
    state: Mutex<RouterState>,
}

impl SignalRouter {
    pub fn builder() -> SignalRouterBuilder {
        SignalRouterBuilder::new()
    }

    /// Build a router from explicit parts.
    pub fn new(
        watching: impl Into<PathBuf>,
        mode: RouterMode,
        free_on_completion: bool,
        logger: Arc<dyn Logger>,
        factory: WorkerFactory,
    ) -> Self {
        let defaults = RouterConfig::default();
        Self {
            tag: OnceLock::new(),
            watching: watching.into(),
            factory,
            free_on_completion,
            evict_on_failure: defaults.evict_on_failure,
            log_not_ready: defaults.log_not_ready,
            logger,
            state: Mutex::new(RouterState {
                mode,
                pending: HashMap::new(),
            }),
        }
    }

    pub fn watched_directory(&self) -> &Path {
        &self.watching
    }

    pub fn mode(&self) -> RouterMode {
        self.state.lock().mode
    }

    pub fn free_on_completion(&self) -> bool {
        self.free_on_completion
    }

    /// Switch modes, dropping every pending worker.
    pub fn set_mode(&self, mode: RouterMode) {
        let mut state = self.state.lock();
        state.mode = mode;
        state.pending = HashMap::new();
        crate::debug_event!(COMPONENT, "mode", "{mode:?} for {}", self.watching.display());
    }

    pub fn pending_count(&self) -> usize {
        self.state.lock().pending.len()
    }

    pub fn is_pending(&self, file_name: &str) -> bool {
        self.state.lock().pending.contains_key(file_name)
    }

    /// Filenames with a resident worker, sorted.
    pub fn pending_files(&self) -> Vec<String> {
        let mut files: Vec<String> = self.state.lock().pending.keys().cloned().collect();
        files.sort();
        files
    }

    /// Route one event.
    pub fn handle(&self, event: &Event) {
        let Some(path) = event.path() else {
            crate::debug_event!(COMPONENT, "skipped error event", "{event}");
            return;
        };

        if parent_dir(path) != Some(self.watching.as_path()) {
            return;
        }

        let Some(file_name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            return;
        };

        let mut state = self.state.lock();
        match state.mode {
            RouterMode::Immediate => {
                drop(state);
                self.run_once(event, path);
            }
            RouterMode::Accumulating => {
                self.accumulate(&mut state.pending, event, path, file_name);
            }
        }
    }

    fn run_once(&self, event: &Event, path: &Path) {
        let mut worker = (self.factory)();
        worker.open(event);
        match worker.work() {
            Ok(()) => {}
            Err(WorkError::NotReady) => self.not_ready(path),
            Err(err) => self.report(path, &err),
        }
    }

    fn accumulate(
        &self,
        pending: &mut HashMap<String, Box<dyn Worker>>,
        event: &Event,
        path: &Path,
        file_name: String,
    ) {
        let Some(worker) = pending.get_mut(&file_name) else {
            let mut worker = (self.factory)();
            if worker.open(event) {
                crate::debug_event!(COMPONENT, "tracking", "{}", path.display());
                pending.insert(file_name, worker);
            }
            return;
        };

        worker.open(event);
        let evict = match worker.work() {
            Ok(()) => self.free_on_completion,
            Err(WorkError::NotReady) => {
                self.not_ready(path);
                false
            }
            Err(err) => {
                self.report(path, &err);
                self.free_on_completion && self.evict_on_failure
            }
        };

        if evict {
            pending.remove(&file_name);
            crate::debug_event!(COMPONENT, "released", "{}", path.display());
        }
    }

    fn not_ready(&self, path: &Path) {
        if self.log_not_ready {
            crate::debug_event!(COMPONENT, "waiting", "{}", path.display());
        }
    }

    fn report(&self, path: &Path, err: &WorkError) {
        self.logger.log(&format!(
            "failed to execute worker for {}: {err}",
            path.display()
        ));
    }
}

impl Observer for SignalRouter {
    fn update(&self, event: &Event) {
        self.handle(event);
    }

    fn set_tag(&self, tag: &str) {
        let _ = self.tag.set(tag.to_string());
    }

    fn tag(&self) -> String {
        self.tag.get().cloned().unwrap_or_default()
    }
}

impl std::fmt::Debug for SignalRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalRouter")
            .field("tag", &self.tag.get())
            .field("watching", &self.watching)
            .field("mode", &self.mode())
            .field("free_on_completion", &self.free_on_completion)
            .finish()
    }
}

/// Directory holding `path`. Bare filenames live in `.`.
fn parent_dir(path: &Path) -> Option<&Path> {
    path.parent().map(|parent| {
        if parent.as_os_str().is_empty() {
            Path::new(".")
        } else {
            parent
        }
    })
}

/// Staged construction of a [`SignalRouter`].
pub struct SignalRouterBuilder {
    watching: Option<PathBuf>,
    factory: Option<WorkerFactory>,
    mode: RouterMode,
    free_on_completion: bool,
    evict_on_failure: bool,
    log_not_ready: bool,
    logger: Option<Arc<dyn Logger>>,
}

impl SignalRouterBuilder {
    pub fn new() -> Self {
        let defaults = RouterConfig::default();
        Self {
            watching: None,
            factory: None,
            mode: RouterMode::Immediate,
            free_on_completion: defaults.free_on_completion,
            evict_on_failure: defaults.evict_on_failure,
            log_not_ready: defaults.log_not_ready,
            logger: None,
        }
    }

    /// Directory whose direct children this router reacts to.
    pub fn watching(mut self, dir: impl Into<PathBuf>) -> Self {
        self.watching = Some(dir.into());
        self
    }

    /// Worker factory returning boxed workers.
    pub fn factory(mut self, factory: WorkerFactory) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Worker factory for a concrete worker type.
    pub fn spawner<W, F>(mut self, spawn: F) -> Self
    where
        W: Worker + 'static,
        F: Fn() -> W + Send + Sync + 'static,
    {
        self.factory = Some(Arc::new(move || Box::new(spawn()) as Box<dyn Worker>));
        self
    }

    /// One fresh worker per event.
    pub fn immediate(mut self) -> Self {
        self.mode = RouterMode::Immediate;
        self
    }

    /// One resident worker per filename.
    pub fn accumulating(mut self) -> Self {
        self.mode = RouterMode::Accumulating;
        self
    }

    pub fn mode(mut self, mode: RouterMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn free_on_completion(mut self, free: bool) -> Self {
        self.free_on_completion = free;
        self
    }

    /// Also evict a resident worker after a hard failure.
    ///
    /// Only has an effect together with `free_on_completion`.
    pub fn evict_on_failure(mut self, evict: bool) -> Self {
        self.evict_on_failure = evict;
        self
    }

    /// Emit a debug line whenever a worker reports it is not ready.
    pub fn log_not_ready(mut self, log: bool) -> Self {
        self.log_not_ready = log;
        self
    }

    /// Apply settings loaded from configuration.
    pub fn config(mut self, config: &RouterConfig) -> Self {
        self.mode = config.mode;
        self.free_on_completion = config.free_on_completion;
        self.evict_on_failure = config.evict_on_failure;
        self.log_not_ready = config.log_not_ready;
        self
    }

    pub fn logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn build(self) -> WatchResult<SignalRouter> {
        let logger = self.logger.ok_or(WatchError::LoggerRequired {
            component: "SignalRouter",
        })?;

        let watching = self.watching.ok_or_else(|| WatchError::InvalidConfig {
            reason: "router needs a directory to watch".to_string(),
        })?;

        let factory = self.factory.ok_or_else(|| WatchError::InvalidConfig {
            reason: "router needs a worker factory".to_string(),
        })?;

        Ok(SignalRouter {
            tag: OnceLock::new(),
            watching,
            factory,
            free_on_completion: self.free_on_completion,
            evict_on_failure: self.evict_on_failure,
            log_not_ready: self.log_not_ready,
            logger,
            state: Mutex::new(RouterState {
                mode: self.mode,
                pending: HashMap::new(),
            }),
        })
    }
}

impl Default for SignalRouterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watcher::EventKind;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Starts on CREATE, completes on REMOVE.
    struct CreateThenRemove {
        completed: bool,
    }

    impl Worker for CreateThenRemove {
        fn open(&mut self, event: &Event) -> bool {
            if event.has_kind(EventKind::REMOVE) {
                self.completed = true;
            }
            event.has_kind(EventKind::CREATE)
        }

        fn work(&mut self) -> Result<(), WorkError> {
            if self.completed {
                Ok(())
            } else {
                Err(WorkError::NotReady)
            }
        }
    }

    struct Failing;

    impl Worker for Failing {
        fn open(&mut self, _event: &Event) -> bool {
            true
        }

        fn work(&mut self) -> Result<(), WorkError> {
            Err(WorkError::failed("boom"))
        }
    }

    fn recording_logger() -> (Arc<dyn Logger>, Arc<Mutex<Vec<String>>>) {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&lines);
        let logger: Arc<dyn Logger> = Arc::new(move |msg: &str| sink.lock().push(msg.to_string()));
        (logger, lines)
    }

    fn counting_router(
        mode: RouterMode,
        free: bool,
    ) -> (SignalRouter, Arc<AtomicUsize>, Arc<Mutex<Vec<String>>>) {
        let spawned = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&spawned);
        let (logger, lines) = recording_logger();
        let router = SignalRouter::builder()
            .watching("/data")
            .mode(mode)
            .free_on_completion(free)
            .logger(logger)
            .spawner(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                CreateThenRemove { completed: false }
            })
            .build()
            .unwrap();
        (router, spawned, lines)
    }

    #[test]
    fn test_builder_requires_logger() {
        let result = SignalRouter::builder()
            .watching("/data")
            .spawner(|| Failing)
            .build();
        assert!(matches!(result, Err(WatchError::LoggerRequired { .. })));
    }

    #[test]
    fn test_builder_requires_factory() {
        let (logger, _) = recording_logger();
        let result = SignalRouter::builder().watching("/data").logger(logger).build();
        assert!(matches!(result, Err(WatchError::InvalidConfig { .. })));
    }

    #[test]
    fn test_accumulating_create_write_remove() {
        let (router, spawned, lines) = counting_router(RouterMode::Accumulating, true);

        router.handle(&Event::change("/data/a.txt", EventKind::CREATE));
        assert_eq!(router.pending_files(), vec!["a.txt"]);

        router.handle(&Event::change("/data/a.txt", EventKind::WRITE));
        assert_eq!(router.pending_files(), vec!["a.txt"]);

        router.handle(&Event::change("/data/a.txt", EventKind::REMOVE));
        assert_eq!(router.pending_count(), 0);

        assert_eq!(spawned.load(Ordering::SeqCst), 1);
        assert!(lines.lock().is_empty(), "not-ready must not be logged as failure");
    }

    #[test]
    fn test_accumulating_declined_initiator_is_dropped() {
        let (router, spawned, _) = counting_router(RouterMode::Accumulating, true);

        router.handle(&Event::change("/data/a.txt", EventKind::WRITE));
        router.handle(&Event::change("/data/a.txt", EventKind::REMOVE));

        assert_eq!(router.pending_count(), 0);
        assert_eq!(spawned.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_accumulating_keeps_worker_without_free() {
        let (router, spawned, _) = counting_router(RouterMode::Accumulating, false);

        router.handle(&Event::change("/data/a.txt", EventKind::CREATE));
        router.handle(&Event::change("/data/a.txt", EventKind::REMOVE));
        assert!(router.is_pending("a.txt"));

        router.handle(&Event::change("/data/a.txt", EventKind::WRITE));
        assert!(router.is_pending("a.txt"));
        assert_eq!(spawned.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_immediate_spawns_per_event() {
        let (router, spawned, _) = counting_router(RouterMode::Immediate, true);

        router.handle(&Event::change("/data/a.txt", EventKind::CREATE));
        router.handle(&Event::change("/data/b.txt", EventKind::CREATE));
        router.handle(&Event::change("/data/a.txt", EventKind::REMOVE));

        assert_eq!(spawned.load(Ordering::SeqCst), 3);
        assert_eq!(router.pending_count(), 0);
    }

    #[test]
    fn test_ignores_other_directories() {
        let (router, spawned, _) = counting_router(RouterMode::Accumulating, true);

        router.handle(&Event::change("/data/sub/a.txt", EventKind::CREATE));
        router.handle(&Event::change("/database/a.txt", EventKind::CREATE));
        router.handle(&Event::change("/a.txt", EventKind::CREATE));
        router.handle(&Event::error(notify::Error::generic("overflow")));

        assert_eq!(spawned.load(Ordering::SeqCst), 0);
        assert_eq!(router.pending_count(), 0);
    }

    #[test]
    fn test_other_directories_skip_pending_worker() {
        /// Counts `open` calls, completes on REMOVE.
        struct OpenCounter {
            opens: Arc<AtomicUsize>,
            completed: bool,
        }

        impl Worker for OpenCounter {
            fn open(&mut self, event: &Event) -> bool {
                self.opens.fetch_add(1, Ordering::SeqCst);
                self.completed = event.has_kind(EventKind::REMOVE);
                event.has_kind(EventKind::CREATE)
            }

            fn work(&mut self) -> Result<(), WorkError> {
                if self.completed {
                    Ok(())
                } else {
                    Err(WorkError::NotReady)
                }
            }
        }

        let opens = Arc::new(AtomicUsize::new(0));
        let worker_opens = Arc::clone(&opens);
        let (logger, _) = recording_logger();
        let router = SignalRouter::builder()
            .watching("/data")
            .accumulating()
            .free_on_completion(true)
            .logger(logger)
            .spawner(move || OpenCounter {
                opens: Arc::clone(&worker_opens),
                completed: false,
            })
            .build()
            .unwrap();

        router.handle(&Event::change("/data/a.txt", EventKind::CREATE));
        assert!(router.is_pending("a.txt"));
        assert_eq!(opens.load(Ordering::SeqCst), 1);

        // Same filename, different parent: neither may reach the pending worker
        router.handle(&Event::change("/data/sub/a.txt", EventKind::REMOVE));
        router.handle(&Event::change("/database/a.txt", EventKind::REMOVE));

        assert_eq!(opens.load(Ordering::SeqCst), 1);
        assert!(router.is_pending("a.txt"));

        router.handle(&Event::change("/data/a.txt", EventKind::REMOVE));
        assert_eq!(opens.load(Ordering::SeqCst), 2);
        assert!(!router.is_pending("a.txt"));
    }

    #[test]
    fn test_hard_failure_is_logged() {
        let (logger, lines) = recording_logger();
        let router = SignalRouter::builder()
            .watching("/data")
            .immediate()
            .logger(logger)
            .spawner(|| Failing)
            .build()
            .unwrap();

        router.handle(&Event::change("/data/a.txt", EventKind::WRITE));

        let lines = lines.lock();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("/data/a.txt"));
        assert!(lines[0].contains("boom"));
    }

    #[test]
    fn test_failure_eviction_is_opt_in() {
        let (logger, lines) = recording_logger();
        let keep = SignalRouter::builder()
            .watching("/data")
            .accumulating()
            .logger(Arc::clone(&logger))
            .spawner(|| Failing)
            .build()
            .unwrap();

        keep.handle(&Event::change("/data/a.txt", EventKind::CREATE));
        keep.handle(&Event::change("/data/a.txt", EventKind::WRITE));
        assert!(keep.is_pending("a.txt"));

        let evict = SignalRouter::builder()
            .watching("/data")
            .accumulating()
            .evict_on_failure(true)
            .logger(logger)
            .spawner(|| Failing)
            .build()
            .unwrap();

        evict.handle(&Event::change("/data/a.txt", EventKind::CREATE));
        evict.handle(&Event::change("/data/a.txt", EventKind::WRITE));
        assert!(!evict.is_pending("a.txt"));

        assert_eq!(lines.lock().len(), 2);
    }

    #[test]
    fn test_set_mode_resets_pending() {
        let (router, _, _) = counting_router(RouterMode::Accumulating, true);

        router.handle(&Event::change("/data/a.txt", EventKind::CREATE));
        assert_eq!(router.pending_count(), 1);

        router.set_mode(RouterMode::Immediate);
        assert_eq!(router.mode(), RouterMode::Immediate);
        assert_eq!(router.pending_count(), 0);

        router.set_mode(RouterMode::Accumulating);
        router.handle(&Event::change("/data/b.txt", EventKind::CREATE));
        assert_eq!(router.pending_files(), vec!["b.txt"]);
    }

    #[test]
    fn test_tag_is_set_once() {
        let (router, _, _) = counting_router(RouterMode::Immediate, true);
        assert_eq!(router.tag(), "");

        router.set_tag("first");
        router.set_tag("second");
        assert_eq!(router.tag(), "first");
    }

    #[test]
    fn test_relative_paths() {
        let (logger, _) = recording_logger();
        let spawned = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&spawned);
        let router = SignalRouter::new(
            ".",
            RouterMode::Immediate,
            true,
            logger,
            Arc::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Box::new(Failing) as Box<dyn Worker>
            }),
        );

        router.handle(&Event::change("a.txt", EventKind::CREATE));
        router.handle(&Event::change("sub/a.txt", EventKind::CREATE));

        assert_eq!(spawned.load(Ordering::SeqCst), 1);
    }
}
