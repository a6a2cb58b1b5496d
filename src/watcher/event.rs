//! Event values delivered to observers.
//!
//! An [`Event`] is either a file change (path plus a [`EventKind`] bitmask) or
//! a watch-source failure. Both carry the time they were wrapped by the
//! dispatch loop.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bitflags::bitflags;
use chrono::{DateTime, Local};
use notify::event::{ModifyKind, RenameMode};

bitflags! {
    /// Change kinds. A single raw notification may carry several bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct EventKind: u32 {
        const CREATE = 1 << 0;
        const WRITE = 1 << 1;
        const REMOVE = 1 << 2;
        const RENAME = 1 << 3;
        const CHMOD = 1 << 4;
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("NONE");
        }
        let names: Vec<&str> = self.iter_names().map(|(name, _)| name).collect();
        f.write_str(&names.join("|"))
    }
}

/// One change notification as produced by a watch source, before wrapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawChange {
    pub path: PathBuf,
    pub kind: EventKind,
}

impl RawChange {
    pub fn new(path: impl Into<PathBuf>, kind: EventKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }

    /// Split a `notify` event into per-path changes.
    ///
    /// Renames follow the fsnotify convention: the old name reports RENAME and
    /// the new name reports CREATE. Access events carry no change bits and are
    /// dropped.
    pub fn from_notify(event: notify::Event) -> Vec<RawChange> {
        use notify::EventKind as Kind;

        let mut paths = event.paths.into_iter();
        let kind = match event.kind {
            Kind::Create(_) => EventKind::CREATE,
            Kind::Remove(_) => EventKind::REMOVE,
            Kind::Modify(ModifyKind::Metadata(_)) => EventKind::CHMOD,
            Kind::Modify(ModifyKind::Name(RenameMode::To)) => EventKind::CREATE,
            Kind::Modify(ModifyKind::Name(RenameMode::Both)) => {
                let mut changes = Vec::with_capacity(2);
                if let Some(from) = paths.next() {
                    changes.push(RawChange::new(from, EventKind::RENAME));
                }
                if let Some(to) = paths.next() {
                    changes.push(RawChange::new(to, EventKind::CREATE));
                }
                return changes;
            }
            Kind::Modify(ModifyKind::Name(_)) => EventKind::RENAME,
            Kind::Modify(_) => EventKind::WRITE,
            Kind::Access(_) | Kind::Any | Kind::Other => return Vec::new(),
        };

        paths.map(|path| RawChange::new(path, kind)).collect()
    }
}

#[derive(Debug, Clone)]
enum Payload {
    Change { path: PathBuf, kind: EventKind },
    Error(Arc<notify::Error>),
}

/// A wrapped filesystem notification or watch failure.
///
/// Events are immutable. Observers receive them by reference; the broadcast
/// side channel receives a clone.
#[derive(Debug, Clone)]
pub struct Event {
    timestamp: DateTime<Local>,
    payload: Payload,
}

impl Event {
    /// Wrap a change notification, stamping it with the current time.
    pub fn change(path: impl Into<PathBuf>, kind: EventKind) -> Self {
        Self {
            timestamp: Local::now(),
            payload: Payload::Change {
                path: path.into(),
                kind,
            },
        }
    }

    /// Wrap a watch-source failure.
    pub fn error(err: notify::Error) -> Self {
        Self {
            timestamp: Local::now(),
            payload: Payload::Error(Arc::new(err)),
        }
    }

    pub fn timestamp(&self) -> DateTime<Local> {
        self.timestamp
    }

    /// Affected path, `None` for error events.
    pub fn path(&self) -> Option<&Path> {
        match &self.payload {
            Payload::Change { path, .. } => Some(path),
            Payload::Error(_) => None,
        }
    }

    /// Change bits; empty for error events.
    pub fn kind(&self) -> EventKind {
        match &self.payload {
            Payload::Change { kind, .. } => *kind,
            Payload::Error(_) => EventKind::empty(),
        }
    }

    pub fn error_cause(&self) -> Option<&notify::Error> {
        match &self.payload {
            Payload::Change { .. } => None,
            Payload::Error(err) => Some(err),
        }
    }

    /// Whether any bit of `mask` is set. Always false for error events.
    pub fn has_kind(&self, mask: EventKind) -> bool {
        self.kind().intersects(mask)
    }

    pub fn is_error(&self) -> bool {
        matches!(self.payload, Payload::Error(_))
    }

    /// Human-readable form: the error text, or `<timestamp>:<path>:<kind>`.
    pub fn describe(&self) -> String {
        self.to_string()
    }
}

impl From<RawChange> for Event {
    fn from(raw: RawChange) -> Self {
        Event::change(raw.path, raw.kind)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.payload {
            Payload::Error(err) => write!(f, "{err}"),
            Payload::Change { path, kind } => write!(
                f,
                "{}:{}:{kind}",
                self.timestamp.format("%Y-%m-%d %H:%M:%S%.3f"),
                path.display()
            ),
        }
    }
}
