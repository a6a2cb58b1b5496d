//! Filesystem change dispatch.
//!
//! A single [`Tracker`] pulls raw notifications from a [`WatchSource`],
//! wraps them as [`Event`]s and fans each one out to every registered
//! [`Observer`]. [`SignalRouter`] is the stock observer: it filters by
//! directory and drives per-file [`Worker`]s.
//!
//! # Architecture
//!
//! ```text
//! WatchSource (notify / channel)
//!   changes + errors
//!         |
//!      Tracker ----------------> EventBroadcaster (side channel)
//!    registry: tag -> Observer
//!         |
//!    +---------+---------+
//!    |         |         |
//! SignalRouter SignalRouter ...
//!    |
//!  Workers (one per event, or one per filename)
//! ```

mod broadcast;
mod error;
mod event;
mod handler;
mod router;
mod source;
mod tag;
mod tracker;
mod worker;

pub use broadcast::EventBroadcaster;
pub use error::{WatchError, WatchResult};
pub use event::{Event, EventKind, RawChange};
pub use handler::Observer;
pub use router::{RouterMode, SignalRouter, SignalRouterBuilder};
pub use source::{ChannelSource, NotifySource, SourceHandle, WatchSource};
pub use tag::{MAX_TAG_ATTEMPTS, RandomTags, TagError, TagGenerator};
pub use tracker::{Tracker, TrackerBuilder, TrackerState};
pub use worker::{Logger, TracingLogger, WorkError, Worker, WorkerFactory};
