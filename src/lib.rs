//! Filesystem change dispatcher.
//!
//! Watches directories, wraps each notification as an [`Event`] and routes it
//! to registered observers. [`SignalRouter`] observers spawn per-file
//! [`Worker`]s, either one per event or one per filename that persists until
//! its task completes.
//!
//! ```no_run
//! use std::sync::Arc;
//! use filemon::{Event, EventKind, SignalRouter, TracingLogger, Tracker, WorkError, Worker};
//!
//! struct Announce;
//!
//! impl Worker for Announce {
//!     fn open(&mut self, event: &Event) -> bool {
//!         event.has_kind(EventKind::CREATE)
//!     }
//!     fn work(&mut self) -> Result<(), WorkError> {
//!         Ok(())
//!     }
//! }
//!
//! # fn main() -> Result<(), filemon::WatchError> {
//! let logger = Arc::new(TracingLogger::default());
//! let tracker = Arc::new(Tracker::new(logger.clone())?);
//! tracker.add_path("/srv/inbox")?;
//!
//! let router = SignalRouter::builder()
//!     .watching("/srv/inbox")
//!     .immediate()
//!     .logger(logger)
//!     .spawner(|| Announce)
//!     .build()?;
//! tracker.register(Arc::new(router))?;
//!
//! let runner = Arc::clone(&tracker);
//! let handle = std::thread::spawn(move || runner.run());
//! tracker.stop();
//! handle.join().ok();
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod logging;
pub mod watcher;

pub use config::Settings;
pub use watcher::{
    ChannelSource, Event, EventKind, Logger, NotifySource, Observer, RouterMode, SignalRouter,
    SourceHandle, TracingLogger, Tracker, TrackerState, WatchError, WatchResult, WatchSource,
    WorkError, Worker,
};
