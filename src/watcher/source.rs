//! Watch sources feeding the tracker.
//!
//! A source exposes two streams (changes and errors) plus two fallible calls
//! (`add`, `close`). [`NotifySource`] wraps the platform watcher;
//! [`ChannelSource`] is driven by hand through a [`SourceHandle`], for
//! replaying recorded events or exercising observers without a filesystem.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender, unbounded};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;

use super::error::{WatchError, WatchResult};
use super::event::{EventKind, RawChange};

/// The platform watch handle as seen by the tracker.
pub trait WatchSource: Send {
    /// Start watching a directory (non-recursively).
    fn add(&mut self, path: &Path) -> notify::Result<()>;

    /// Release the handle. Later calls are no-ops.
    fn close(&mut self) -> notify::Result<()>;

    /// Stream of change notifications.
    fn changes(&self) -> Receiver<RawChange>;

    /// Stream of asynchronous watch errors.
    fn errors(&self) -> Receiver<notify::Error>;
}

fn closed_error() -> notify::Error {
    notify::Error::generic("watch source is closed")
}

/// `notify::RecommendedWatcher` behind the [`WatchSource`] contract.
pub struct NotifySource {
    watcher: Option<RecommendedWatcher>,
    watched: Vec<PathBuf>,
    changes: Receiver<RawChange>,
    errors: Receiver<notify::Error>,
}

impl NotifySource {
    /// Acquire the platform watcher.
    pub fn open() -> WatchResult<Self> {
        let (change_tx, changes) = unbounded();
        let (error_tx, errors) = unbounded();

        let watcher =
            notify::recommended_watcher(move |res: notify::Result<notify::Event>| match res {
                Ok(event) => {
                    for change in RawChange::from_notify(event) {
                        let _ = change_tx.send(change);
                    }
                }
                Err(err) => {
                    let _ = error_tx.send(err);
                }
            })
            .map_err(|source| WatchError::WatchInit { source })?;

        Ok(Self {
            watcher: Some(watcher),
            watched: Vec::new(),
            changes,
            errors,
        })
    }

    pub fn watched(&self) -> &[PathBuf] {
        &self.watched
    }
}

impl WatchSource for NotifySource {
    fn add(&mut self, path: &Path) -> notify::Result<()> {
        let watcher = self.watcher.as_mut().ok_or_else(closed_error)?;
        watcher.watch(path, RecursiveMode::NonRecursive)?;
        // notify keeps one watch per path, so record it once for `close`
        if !self.watched.iter().any(|watched| watched == path) {
            self.watched.push(path.to_path_buf());
        }
        Ok(())
    }

    fn close(&mut self) -> notify::Result<()> {
        let Some(mut watcher) = self.watcher.take() else {
            return Ok(());
        };

        let mut first_err = None;
        for path in self.watched.drain(..) {
            if let Err(err) = watcher.unwatch(&path) {
                first_err.get_or_insert(err);
            }
        }

        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn changes(&self) -> Receiver<RawChange> {
        self.changes.clone()
    }

    fn errors(&self) -> Receiver<notify::Error> {
        self.errors.clone()
    }
}

#[derive(Debug, Default)]
struct ChannelState {
    watched: Vec<PathBuf>,
    closed: bool,
    close_failure: Option<String>,
}

/// In-memory watch source.
pub struct ChannelSource {
    changes: Receiver<RawChange>,
    errors: Receiver<notify::Error>,
    state: Arc<Mutex<ChannelState>>,
}

/// Producer side of a [`ChannelSource`].
#[derive(Clone)]
pub struct SourceHandle {
    changes: Sender<RawChange>,
    errors: Sender<notify::Error>,
    state: Arc<Mutex<ChannelState>>,
}

impl ChannelSource {
    pub fn new() -> (Self, SourceHandle) {
        let (change_tx, changes) = unbounded();
        let (error_tx, errors) = unbounded();
        let state = Arc::new(Mutex::new(ChannelState::default()));

        let source = Self {
            changes,
            errors,
            state: Arc::clone(&state),
        };
        let handle = SourceHandle {
            changes: change_tx,
            errors: error_tx,
            state,
        };
        (source, handle)
    }
}

impl WatchSource for ChannelSource {
    fn add(&mut self, path: &Path) -> notify::Result<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(closed_error());
        }
        if !state.watched.iter().any(|watched| watched == path) {
            state.watched.push(path.to_path_buf());
        }
        Ok(())
    }

    fn close(&mut self) -> notify::Result<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Ok(());
        }
        state.closed = true;
        match state.close_failure.take() {
            Some(reason) => Err(notify::Error::generic(&reason)),
            None => Ok(()),
        }
    }

    fn changes(&self) -> Receiver<RawChange> {
        self.changes.clone()
    }

    fn errors(&self) -> Receiver<notify::Error> {
        self.errors.clone()
    }
}

impl SourceHandle {
    /// Push a change notification.
    pub fn emit(&self, path: impl Into<PathBuf>, kind: EventKind) {
        let _ = self.changes.send(RawChange::new(path, kind));
    }

    /// Push an asynchronous watch error.
    pub fn fail(&self, err: notify::Error) {
        let _ = self.errors.send(err);
    }

    /// Make the next `close` report `reason` as a failure.
    pub fn fail_close(&self, reason: impl Into<String>) {
        self.state.lock().close_failure = Some(reason.into());
    }

    pub fn watched(&self) -> Vec<PathBuf> {
        self.state.lock().watched.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}
