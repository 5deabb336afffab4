//! Double-tap modifier gesture.
//!
//! Recognizes two clean presses-and-releases of a single modifier key within
//! a bounded window and fires an activation callback. The listening tap is
//! passive — nothing is ever withheld from the foreground application.
//!
//! ## State machine (per modifier-change event)
//!
//! Only events whose key code is one of the modifier's two physical variants
//! are considered. A set modifier bit records "key down"; a cleared bit after
//! a recorded down is a release. A release while any *other* tracked modifier
//! is held is ignored entirely (it neither arms nor clears the window, so
//! e.g. Cmd+Shift chords cannot produce phantom shift taps). A clean release
//! within `tap_window` of the previous one triggers exactly once and clears
//! the armed timestamp, so a third tap cannot re-trigger.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::dispatch;
use crate::error::Result;
use crate::gesture::source::{
    Disposition, EventKind, EventMask, EventSource, InputEvent, SubscriptionId, TapMode,
};
use crate::gesture::Modifier;

/// Default maximum interval between the two releases.
pub const DEFAULT_TAP_WINDOW: Duration = Duration::from_millis(400);

/// Activation callback. Invoked on a fresh worker thread, never on the
/// listener thread.
pub type ActivateFn = Arc<dyn Fn() + Send + Sync>;

#[derive(Debug, Default)]
struct TapState {
    key_down: bool,
    last_release_at: Option<Instant>,
}

/// Detects a double-tap of a single modifier key.
pub struct DoubleTapGesture {
    source: Arc<dyn EventSource>,
    modifier: Modifier,
    tap_window: Duration,
    on_activate: ActivateFn,
    state: Arc<Mutex<TapState>>,
    subscription: Mutex<Option<SubscriptionId>>,
}

impl DoubleTapGesture {
    /// Create a detector for `modifier_name` (one of shift / command /
    /// option / control, aliases accepted).
    ///
    /// # Errors
    /// `SottoError::UnsupportedModifier` for any other name.
    pub fn new(
        source: Arc<dyn EventSource>,
        modifier_name: &str,
        tap_window: Duration,
        on_activate: ActivateFn,
    ) -> Result<Self> {
        let modifier = Modifier::parse(modifier_name)?;
        Ok(Self {
            source,
            modifier,
            tap_window,
            on_activate,
            state: Arc::new(Mutex::new(TapState::default())),
            subscription: Mutex::new(None),
        })
    }

    /// The modifier this detector is bound to.
    pub fn modifier(&self) -> Modifier {
        self.modifier
    }

    /// Install the modifier-change listener. Idempotent while running.
    ///
    /// # Errors
    /// `SottoError::PermissionDenied` when the host declines the tap.
    pub fn start(&self) -> Result<()> {
        let mut subscription = self.subscription.lock();
        if subscription.is_some() {
            return Ok(());
        }

        let modifier = self.modifier;
        let tap_window = self.tap_window;
        let state = Arc::clone(&self.state);
        let on_activate = Arc::clone(&self.on_activate);

        let id = self.source.subscribe(
            EventMask::MODIFIERS,
            TapMode::Passive,
            Arc::new(move |event| {
                handle_event(event, modifier, tap_window, &state, &on_activate)
            }),
        )?;

        *subscription = Some(id);
        info!(modifier = ?self.modifier, "double-tap listener installed");
        Ok(())
    }

    /// Tear the listener down and reset tap state. Idempotent.
    pub fn stop(&self) {
        if let Some(id) = self.subscription.lock().take() {
            self.source.unsubscribe(id);
            *self.state.lock() = TapState::default();
            info!(modifier = ?self.modifier, "double-tap listener removed");
        }
    }

    /// Whether the listener is currently installed.
    pub fn is_running(&self) -> bool {
        self.subscription.lock().is_some()
    }
}

fn handle_event(
    event: &InputEvent,
    modifier: Modifier,
    tap_window: Duration,
    state: &Mutex<TapState>,
    on_activate: &ActivateFn,
) -> Disposition {
    if event.kind != EventKind::ModifiersChanged || !modifier.matches_key_code(event.key_code) {
        return Disposition::Pass;
    }

    let pressed = event.modifiers.contains(modifier);
    let mut fire = false;
    {
        let mut tap = state.lock();
        if pressed {
            tap.key_down = true;
        } else if tap.key_down {
            tap.key_down = false;

            // A release while other modifiers are held is not a tap at all.
            if event.modifiers.without(modifier).is_empty() {
                match tap.last_release_at {
                    Some(prev) if event.at.duration_since(prev) < tap_window => {
                        tap.last_release_at = None;
                        fire = true;
                    }
                    _ => tap.last_release_at = Some(event.at),
                }
            }
        }
    }

    if fire {
        debug!(?modifier, "double-tap recognized");
        let callback = Arc::clone(on_activate);
        dispatch::spawn_worker("gesture-activate", move || callback());
    }

    Disposition::Pass
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gesture::synthetic::SyntheticEventSource;
    use crate::gesture::ModifierSet;
    use crossbeam_channel::bounded;

    fn flags_event(code: u16, modifiers: ModifierSet, at: Instant) -> InputEvent {
        InputEvent {
            kind: EventKind::ModifiersChanged,
            key_code: code,
            modifiers,
            at,
        }
    }

    fn shift_tap(source: &SyntheticEventSource, at: Instant) {
        let held = ModifierSet::EMPTY.with(Modifier::Shift);
        source.emit(flags_event(56, held, at));
        source.emit(flags_event(56, ModifierSet::EMPTY, at));
    }

    #[test]
    fn rejects_unknown_modifier_name() {
        let source = Arc::new(SyntheticEventSource::new());
        let result = DoubleTapGesture::new(
            source,
            "fn",
            DEFAULT_TAP_WINDOW,
            Arc::new(|| {}),
        );
        assert!(result.is_err());
    }

    #[test]
    fn two_taps_inside_window_fire_once() {
        let source = Arc::new(SyntheticEventSource::new());
        let (tx, rx) = bounded(4);
        let gesture = DoubleTapGesture::new(
            Arc::clone(&source) as Arc<dyn EventSource>,
            "shift",
            DEFAULT_TAP_WINDOW,
            Arc::new(move || {
                let _ = tx.send(());
            }),
        )
        .unwrap();
        gesture.start().unwrap();

        let base = Instant::now();
        shift_tap(&source, base);
        shift_tap(&source, base + Duration::from_millis(150));

        assert!(rx.recv_timeout(Duration::from_secs(1)).is_ok());
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    }

    #[test]
    fn third_tap_after_trigger_does_not_refire() {
        let source = Arc::new(SyntheticEventSource::new());
        let (tx, rx) = bounded(4);
        let gesture = DoubleTapGesture::new(
            Arc::clone(&source) as Arc<dyn EventSource>,
            "shift",
            DEFAULT_TAP_WINDOW,
            Arc::new(move || {
                let _ = tx.send(());
            }),
        )
        .unwrap();
        gesture.start().unwrap();

        let base = Instant::now();
        shift_tap(&source, base);
        shift_tap(&source, base + Duration::from_millis(100));
        shift_tap(&source, base + Duration::from_millis(200));

        assert!(rx.recv_timeout(Duration::from_secs(1)).is_ok());
        // The third tap re-armed the window but must not itself trigger.
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    }

    #[test]
    fn slow_taps_do_not_fire_but_rearm() {
        let source = Arc::new(SyntheticEventSource::new());
        let (tx, rx) = bounded(4);
        let gesture = DoubleTapGesture::new(
            Arc::clone(&source) as Arc<dyn EventSource>,
            "shift",
            Duration::from_millis(50),
            Arc::new(move || {
                let _ = tx.send(());
            }),
        )
        .unwrap();
        gesture.start().unwrap();

        let base = Instant::now();
        shift_tap(&source, base);
        shift_tap(&source, base + Duration::from_millis(200));
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());

        // The slow tap armed a fresh window — a quick follow-up completes it.
        shift_tap(&source, base + Duration::from_millis(220));
        assert!(rx.recv_timeout(Duration::from_secs(1)).is_ok());
    }

    #[test]
    fn release_with_other_modifier_held_is_ignored() {
        let source = Arc::new(SyntheticEventSource::new());
        let (tx, rx) = bounded(4);
        let gesture = DoubleTapGesture::new(
            Arc::clone(&source) as Arc<dyn EventSource>,
            "shift",
            DEFAULT_TAP_WINDOW,
            Arc::new(move || {
                let _ = tx.send(());
            }),
        )
        .unwrap();
        gesture.start().unwrap();

        let base = Instant::now();
        let shift_cmd = ModifierSet::EMPTY
            .with(Modifier::Shift)
            .with(Modifier::Command);
        let cmd_only = ModifierSet::EMPTY.with(Modifier::Command);

        // Shift pressed and released twice while Command stays held.
        source.emit(flags_event(56, shift_cmd, base));
        source.emit(flags_event(56, cmd_only, base));
        source.emit(flags_event(56, shift_cmd, base + Duration::from_millis(100)));
        source.emit(flags_event(56, cmd_only, base + Duration::from_millis(100)));

        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    }

    #[test]
    fn stop_removes_subscription_and_is_idempotent() {
        let source = Arc::new(SyntheticEventSource::new());
        let gesture = DoubleTapGesture::new(
            Arc::clone(&source) as Arc<dyn EventSource>,
            "command",
            DEFAULT_TAP_WINDOW,
            Arc::new(|| {}),
        )
        .unwrap();
        gesture.start().unwrap();
        assert!(gesture.is_running());
        assert_eq!(source.subscription_count(), 1);

        gesture.stop();
        gesture.stop();
        assert!(!gesture.is_running());
        assert_eq!(source.subscription_count(), 0);
    }
}
