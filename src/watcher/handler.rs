//! Observer trait for the tracker's registry.

use super::Event;

/// Anything the tracker can notify.
///
/// `update` runs synchronously on the dispatch thread, so implementations
/// must not block for long: a slow observer delays delivery to everyone.
pub trait Observer: Send + Sync {
    /// Receive one event.
    fn update(&self, event: &Event);

    /// Assign the identifying tag. Only the first call has an effect.
    fn set_tag(&self, tag: &str);

    /// The assigned tag, or an empty string when none is set.
    fn tag(&self) -> String;
}
