//! The `EventSource` capability seam.
//!
//! Gesture detectors never talk to the OS directly: they subscribe to an
//! [`EventSource`] with an event mask, a tap mode and a handler, and receive
//! normalized [`InputEvent`]s. The macOS implementation lives in
//! [`crate::gesture::quartz`]; [`crate::gesture::synthetic`] provides a
//! deterministic in-memory feed for tests and headless environments.

use std::sync::Arc;
use std::time::Instant;

use crate::error::Result;
use crate::gesture::{KeyCode, ModifierSet};

/// Kind of a normalized input event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    KeyDown,
    KeyUp,
    /// A modifier key changed state. Modifier keys do not generate
    /// `KeyDown`/`KeyUp` on macOS — only this.
    ModifiersChanged,
}

/// A normalized system input event.
#[derive(Debug, Clone, Copy)]
pub struct InputEvent {
    pub kind: EventKind,
    /// Virtual key code of the key that caused the event.
    pub key_code: KeyCode,
    /// Modifier keys held *after* this event was applied.
    pub modifiers: ModifierSet,
    /// Delivery timestamp. Carried on the event so detectors never have to
    /// read the wall clock themselves.
    pub at: Instant,
}

/// What the handler wants done with the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Deliver the event to the foreground application unchanged.
    Pass,
    /// Consume the event. Only honored for [`TapMode::Intercepting`]
    /// subscriptions.
    Suppress,
}

/// Which event kinds a subscription wants delivered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventMask {
    pub key_down: bool,
    pub key_up: bool,
    pub modifiers_changed: bool,
}

impl EventMask {
    /// Modifier-change events only (double-tap detection).
    pub const MODIFIERS: EventMask = EventMask {
        key_down: false,
        key_up: false,
        modifiers_changed: true,
    };

    /// Key presses, releases and modifier changes (combo detection).
    pub const KEYS_AND_MODIFIERS: EventMask = EventMask {
        key_down: true,
        key_up: true,
        modifiers_changed: true,
    };

    pub fn accepts(&self, kind: EventKind) -> bool {
        match kind {
            EventKind::KeyDown => self.key_down,
            EventKind::KeyUp => self.key_up,
            EventKind::ModifiersChanged => self.modifiers_changed,
        }
    }
}

/// Whether a subscription may consume events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapMode {
    /// Observe only; `Suppress` dispositions are ignored.
    Passive,
    /// May consume events before they reach applications.
    Intercepting,
}

/// Handler invoked on the source's listener thread. Must return quickly —
/// dispatch side effects to a worker.
pub type EventHandler = Arc<dyn Fn(&InputEvent) -> Disposition + Send + Sync>;

/// Opaque subscription handle returned by [`EventSource::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub(crate) u64);

/// A system-wide input event interception facility.
pub trait EventSource: Send + Sync {
    /// Install a listener for the masked event kinds.
    ///
    /// Installation may be asynchronous on the backend; implementations wait
    /// a short bounded interval for confirmation and return
    /// `SottoError::PermissionDenied` when the host declines the tap
    /// (typically a missing input-monitoring grant).
    fn subscribe(
        &self,
        mask: EventMask,
        mode: TapMode,
        handler: EventHandler,
    ) -> Result<SubscriptionId>;

    /// Tear down a subscription. Idempotent; unknown ids are ignored.
    fn unsubscribe(&self, id: SubscriptionId);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_accept_expected_kinds() {
        assert!(EventMask::MODIFIERS.accepts(EventKind::ModifiersChanged));
        assert!(!EventMask::MODIFIERS.accepts(EventKind::KeyDown));
        assert!(EventMask::KEYS_AND_MODIFIERS.accepts(EventKind::KeyDown));
        assert!(EventMask::KEYS_AND_MODIFIERS.accepts(EventKind::KeyUp));
        assert!(EventMask::KEYS_AND_MODIFIERS.accepts(EventKind::ModifiersChanged));
    }
}
