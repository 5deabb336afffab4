//! Press-and-hold modifier+key combination gesture.
//!
//! Unlike the double-tap detector this one intercepts: a key-down that
//! completes the combination is consumed so the keystroke never reaches the
//! foreground application, as is the matching key-up. Modifier-change events
//! always pass through (suppressing those would wedge the keyboard).

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::dispatch;
use crate::error::Result;
use crate::gesture::source::{
    Disposition, EventKind, EventMask, EventSource, InputEvent, SubscriptionId, TapMode,
};
use crate::gesture::{key_code_for_name, KeyCode, Modifier, ModifierSet};

/// Key used when a combo spec contains no resolvable key name.
pub const FALLBACK_KEY: &str = "d";

/// Parsed form of a `"modifier(+modifier)*+key"` spec string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComboSpec {
    pub modifiers: ModifierSet,
    pub key: KeyCode,
}

impl ComboSpec {
    /// Parse a spec like `"cmd+shift+d"` (case-insensitive, whitespace
    /// tolerated).
    ///
    /// Unknown tokens are logged and skipped; a spec without any resolvable
    /// key name falls back to [`FALLBACK_KEY`] with a warning. Parsing never
    /// fails outright.
    pub fn parse(spec: &str) -> Self {
        let mut modifiers = ModifierSet::EMPTY;
        let mut key: Option<KeyCode> = None;

        for token in spec.split('+') {
            let token = token.trim();
            if token.is_empty() {
                continue;
            }
            if let Ok(modifier) = Modifier::parse(token) {
                modifiers.insert(modifier);
            } else if let Some(code) = key_code_for_name(token) {
                key = Some(code);
            } else {
                warn!(token, spec, "unknown token in combo spec");
            }
        }

        let key = key.unwrap_or_else(|| {
            warn!(spec, "no key found in combo spec, defaulting to '{FALLBACK_KEY}'");
            key_code_for_name(FALLBACK_KEY).unwrap_or(2)
        });

        Self { modifiers, key }
    }
}

/// Press/release callback. Invoked on a fresh worker thread.
pub type EdgeFn = Arc<dyn Fn() + Send + Sync>;

#[derive(Debug, Default)]
struct ComboState {
    active: bool,
    seen_modifiers: ModifierSet,
}

/// Detects a held modifier+key combination with press and release edges.
pub struct ComboGesture {
    source: Arc<dyn EventSource>,
    spec: ComboSpec,
    on_press: EdgeFn,
    on_release: EdgeFn,
    state: Arc<Mutex<ComboState>>,
    subscription: Mutex<Option<SubscriptionId>>,
}

impl ComboGesture {
    pub fn new(
        source: Arc<dyn EventSource>,
        spec: &str,
        on_press: EdgeFn,
        on_release: EdgeFn,
    ) -> Self {
        Self {
            source,
            spec: ComboSpec::parse(spec),
            on_press,
            on_release,
            state: Arc::new(Mutex::new(ComboState::default())),
            subscription: Mutex::new(None),
        }
    }

    pub fn spec(&self) -> ComboSpec {
        self.spec
    }

    /// Install the intercepting listener. Idempotent while running.
    ///
    /// # Errors
    /// `SottoError::PermissionDenied` when the host declines the tap.
    pub fn start(&self) -> Result<()> {
        let mut subscription = self.subscription.lock();
        if subscription.is_some() {
            return Ok(());
        }

        let spec = self.spec;
        let state = Arc::clone(&self.state);
        let on_press = Arc::clone(&self.on_press);
        let on_release = Arc::clone(&self.on_release);

        let id = self.source.subscribe(
            EventMask::KEYS_AND_MODIFIERS,
            TapMode::Intercepting,
            Arc::new(move |event| handle_event(event, spec, &state, &on_press, &on_release)),
        )?;

        *subscription = Some(id);
        info!(spec = ?self.spec, "combo listener installed");
        Ok(())
    }

    /// Tear the listener down and reset state. Idempotent.
    pub fn stop(&self) {
        if let Some(id) = self.subscription.lock().take() {
            self.source.unsubscribe(id);
            *self.state.lock() = ComboState::default();
            info!(spec = ?self.spec, "combo listener removed");
        }
    }

    /// Whether the combination is currently held down.
    pub fn is_active(&self) -> bool {
        self.state.lock().active
    }

    /// Modifier keys held as of the last observed modifier-change event.
    pub fn held_modifiers(&self) -> ModifierSet {
        self.state.lock().seen_modifiers
    }
}

enum Edge {
    Press,
    Release,
}

fn handle_event(
    event: &InputEvent,
    spec: ComboSpec,
    state: &Mutex<ComboState>,
    on_press: &EdgeFn,
    on_release: &EdgeFn,
) -> Disposition {
    let mut edge = None;
    let mut disposition = Disposition::Pass;

    {
        let mut combo = state.lock();
        match event.kind {
            EventKind::KeyDown if event.key_code == spec.key => {
                if event.modifiers == spec.modifiers {
                    if !combo.active {
                        combo.active = true;
                        edge = Some(Edge::Press);
                    }
                    // Key-repeat while active is consumed without re-firing.
                    disposition = Disposition::Suppress;
                }
            }
            EventKind::KeyUp if event.key_code == spec.key => {
                if combo.active {
                    combo.active = false;
                    edge = Some(Edge::Release);
                    disposition = Disposition::Suppress;
                }
            }
            EventKind::ModifiersChanged => {
                combo.seen_modifiers = event.modifiers;
                // Releasing a modifier before the key still ends the hold.
                if combo.active && !event.modifiers.is_superset_of(&spec.modifiers) {
                    combo.active = false;
                    edge = Some(Edge::Release);
                }
            }
            _ => {}
        }
    }

    match edge {
        Some(Edge::Press) => {
            debug!(key = spec.key, "combo pressed");
            let callback = Arc::clone(on_press);
            dispatch::spawn_worker("combo-press", move || callback());
        }
        Some(Edge::Release) => {
            debug!(key = spec.key, "combo released");
            let callback = Arc::clone(on_release);
            dispatch::spawn_worker("combo-release", move || callback());
        }
        None => {}
    }

    disposition
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_resolves_modifiers_and_key() {
        let spec = ComboSpec::parse("cmd+shift+d");
        assert!(spec.modifiers.contains(Modifier::Command));
        assert!(spec.modifiers.contains(Modifier::Shift));
        assert!(!spec.modifiers.contains(Modifier::Control));
        assert_eq!(spec.key, 2);
    }

    #[test]
    fn parse_is_case_insensitive_and_whitespace_tolerant() {
        let spec = ComboSpec::parse(" CTRL + Space ");
        assert!(spec.modifiers.contains(Modifier::Control));
        assert_eq!(spec.key, 49);
    }

    #[test]
    fn parse_without_key_falls_back_to_default() {
        let spec = ComboSpec::parse("cmd+shift");
        assert_eq!(spec.key, 2); // 'd'
    }

    #[test]
    fn parse_skips_unknown_tokens() {
        let spec = ComboSpec::parse("cmd+hyper+k");
        assert!(spec.modifiers.contains(Modifier::Command));
        assert_eq!(spec.key, 40);
    }
}
