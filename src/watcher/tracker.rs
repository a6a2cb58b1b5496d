//! Tracker: owns the watch source and fans events out to observers.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender, bounded, never, select};
use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;

use crate::config::TrackerConfig;

use super::broadcast::EventBroadcaster;
use super::error::{WatchError, WatchResult};
use super::event::{Event, RawChange};
use super::handler::Observer;
use super::source::{NotifySource, WatchSource};
use super::tag::{MAX_TAG_ATTEMPTS, RandomTags, TagGenerator};
use super::worker::Logger;

const COMPONENT: &str = "tracker";

/// Lifecycle of a [`Tracker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerState {
    /// Source acquired; paths may be added and observers registered.
    Watching,
    /// Inside [`Tracker::run`].
    Running,
    /// Terminal. The source has been released.
    Stopped,
}

/// Dispatches watch-source events to registered observers.
///
/// Share it through an `Arc`: one thread blocks in [`run`](Tracker::run)
/// while others call [`add_path`](Tracker::add_path),
/// [`register`](Tracker::register) and [`stop`](Tracker::stop).
pub struct Tracker {
    source: Mutex<Box<dyn WatchSource>>,
    changes: Receiver<RawChange>,
    errors: Receiver<notify::Error>,
    /// Registry keyed by tag. Write-locked by `register`, read-locked by `notify_all`.
    observers: RwLock<HashMap<String, Arc<dyn Observer>>>,
    tags: Box<dyn TagGenerator>,
    stop_tx: Mutex<Option<Sender<()>>>,
    stop_rx: Receiver<()>,
    state: Mutex<TrackerState>,
    broadcaster: EventBroadcaster,
    logger: Arc<dyn Logger>,
}

impl Tracker {
    /// Open a tracker over the platform watcher.
    pub fn new(logger: Arc<dyn Logger>) -> WatchResult<Self> {
        Self::builder().logger(logger).build()
    }

    pub fn builder() -> TrackerBuilder {
        TrackerBuilder::new()
    }

    pub fn state(&self) -> TrackerState {
        *self.state.lock()
    }

    /// Watch a directory. Valid until the tracker stops.
    pub fn add_path(&self, path: impl AsRef<Path>) -> WatchResult<()> {
        let path = path.as_ref();
        if self.state() == TrackerState::Stopped {
            return Err(WatchError::Stopped);
        }

        self.source
            .lock()
            .add(path)
            .map_err(|source| WatchError::WatchAdd {
                path: path.to_path_buf(),
                source,
            })?;

        crate::debug_event!(COMPONENT, "watching", "{}", path.display());
        Ok(())
    }

    /// Register an observer under a fresh unique tag and return the tag.
    ///
    /// Gives up with [`WatchError::TagExhausted`] after
    /// [`MAX_TAG_ATTEMPTS`] consecutive collisions or generator failures.
    pub fn register(&self, observer: Arc<dyn Observer>) -> WatchResult<String> {
        let mut observers = self.observers.write();

        for attempt in 1..=MAX_TAG_ATTEMPTS {
            match self.tags.generate() {
                Ok(tag) if !observers.contains_key(&tag) => {
                    observer.set_tag(&tag);
                    observers.insert(tag.clone(), observer);
                    crate::debug_event!(COMPONENT, "registered", "{tag}");
                    return Ok(tag);
                }
                Ok(tag) => {
                    crate::debug_event!(COMPONENT, "tag collision", "{tag} (attempt {attempt})");
                }
                Err(err) => {
                    crate::debug_event!(COMPONENT, "tag failure", "{err} (attempt {attempt})");
                }
            }
        }

        Err(WatchError::TagExhausted {
            attempts: MAX_TAG_ATTEMPTS,
        })
    }

    pub fn observer_count(&self) -> usize {
        self.observers.read().len()
    }

    /// Registered tags, sorted.
    pub fn tags(&self) -> Vec<String> {
        let mut tags: Vec<String> = self.observers.read().keys().cloned().collect();
        tags.sort();
        tags
    }

    /// Receive every event after it has been delivered to the observers.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.broadcaster.subscribe()
    }

    /// Deliver an event to every observer, then republish it.
    ///
    /// Observers are called on a snapshot of the registry, so an observer may
    /// register others without deadlocking; those see the next event.
    pub fn notify_all(&self, event: Event) {
        let observers: Vec<Arc<dyn Observer>> = self.observers.read().values().cloned().collect();
        for observer in &observers {
            observer.update(&event);
        }
        self.broadcaster.send(event);
    }

    /// Run the dispatch loop until [`stop`](Tracker::stop) is called.
    ///
    /// Watch-source errors are logged and delivered as error events; they do
    /// not end the loop. On stop the source is released, and a failed release
    /// is delivered as one last error event.
    pub fn run(&self) -> WatchResult<()> {
        {
            let mut state = self.state.lock();
            match *state {
                TrackerState::Watching => *state = TrackerState::Running,
                TrackerState::Running => return Err(WatchError::AlreadyRunning),
                TrackerState::Stopped => return Err(WatchError::Stopped),
            }
        }

        crate::log_event!(COMPONENT, "running", "{} observers", self.observer_count());

        let mut changes = self.changes.clone();
        let mut errors = self.errors.clone();

        loop {
            select! {
                recv(changes) -> msg => match msg {
                    Ok(raw) => self.notify_all(Event::from(raw)),
                    Err(_) => {
                        crate::debug_event!(COMPONENT, "change stream closed");
                        changes = never();
                    }
                },
                recv(errors) -> msg => match msg {
                    Ok(err) => {
                        self.logger.log(&format!("watch source error: {err}"));
                        self.notify_all(Event::error(err));
                    }
                    Err(_) => {
                        crate::debug_event!(COMPONENT, "error stream closed");
                        errors = never();
                    }
                },
                recv(self.stop_rx) -> _ => break,
            }
        }

        self.release();
        *self.state.lock() = TrackerState::Stopped;
        Ok(())
    }

    /// Ask the loop to stop. Later calls are no-ops.
    ///
    /// A tracker that never ran is released immediately.
    pub fn stop(&self) {
        let Some(stop_tx) = self.stop_tx.lock().take() else {
            return;
        };

        let mut state = self.state.lock();
        if *state == TrackerState::Watching {
            *state = TrackerState::Stopped;
            drop(state);
            drop(stop_tx);
            self.release();
        } else {
            drop(state);
            drop(stop_tx);
        }
    }

    fn release(&self) {
        let result = self.source.lock().close();
        if let Err(err) = result {
            self.logger
                .log(&format!("failed to release watch source: {err}"));
            self.notify_all(Event::error(err));
        }
        crate::log_event!(COMPONENT, "stopped");
    }
}

/// Builder for a [`Tracker`].
pub struct TrackerBuilder {
    source: Option<Box<dyn WatchSource>>,
    logger: Option<Arc<dyn Logger>>,
    tags: Option<Box<dyn TagGenerator>>,
    broadcast_capacity: usize,
}

impl TrackerBuilder {
    pub fn new() -> Self {
        Self {
            source: None,
            logger: None,
            tags: None,
            broadcast_capacity: TrackerConfig::default().broadcast_capacity,
        }
    }

    /// Use a specific watch source instead of the platform watcher.
    pub fn source(mut self, source: impl WatchSource + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn tag_generator(mut self, tags: impl TagGenerator + 'static) -> Self {
        self.tags = Some(Box::new(tags));
        self
    }

    pub fn broadcast_capacity(mut self, capacity: usize) -> Self {
        self.broadcast_capacity = capacity;
        self
    }

    pub fn config(mut self, config: &TrackerConfig) -> Self {
        self.broadcast_capacity = config.broadcast_capacity;
        self
    }

    pub fn build(self) -> WatchResult<Tracker> {
        let logger = self.logger.ok_or(WatchError::LoggerRequired {
            component: "Tracker",
        })?;

        let source: Box<dyn WatchSource> = match self.source {
            Some(source) => source,
            None => Box::new(NotifySource::open()?),
        };

        let (stop_tx, stop_rx) = bounded(1);

        Ok(Tracker {
            changes: source.changes(),
            errors: source.errors(),
            source: Mutex::new(source),
            observers: RwLock::new(HashMap::new()),
            tags: self.tags.unwrap_or_else(|| Box::new(RandomTags)),
            stop_tx: Mutex::new(Some(stop_tx)),
            stop_rx,
            state: Mutex::new(TrackerState::Watching),
            broadcaster: EventBroadcaster::new(self.broadcast_capacity),
            logger,
        })
    }
}

impl Default for TrackerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
