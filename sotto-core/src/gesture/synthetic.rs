//! In-memory `EventSource` with a deterministic, caller-driven event feed.
//!
//! Used by the gesture tests and usable in headless environments where no
//! interception facility exists. `emit` invokes matching handlers
//! synchronously on the calling thread and reports whether any intercepting
//! subscription consumed the event.

use std::sync::Arc;
use parking_lot::Mutex;

use crate::error::Result;
use crate::gesture::source::{
    Disposition, EventHandler, EventMask, EventSource, InputEvent, SubscriptionId, TapMode,
};

struct Subscription {
    id: SubscriptionId,
    mask: EventMask,
    mode: TapMode,
    handler: EventHandler,
}

#[derive(Default)]
pub struct SyntheticEventSource {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    next_id: u64,
    subscriptions: Vec<Subscription>,
}

impl SyntheticEventSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one event through all matching subscriptions.
    ///
    /// Returns `Suppress` when any intercepting handler consumed the event;
    /// passive handlers are invoked but cannot suppress.
    pub fn emit(&self, event: InputEvent) -> Disposition {
        // Snapshot handlers first so none run under the lock.
        let matching: Vec<(TapMode, EventHandler)> = {
            let inner = self.inner.lock();
            inner
                .subscriptions
                .iter()
                .filter(|s| s.mask.accepts(event.kind))
                .map(|s| (s.mode, Arc::clone(&s.handler)))
                .collect()
        };

        let mut suppressed = false;
        for (mode, handler) in matching {
            let disposition = handler(&event);
            if mode == TapMode::Intercepting && disposition == Disposition::Suppress {
                suppressed = true;
            }
        }

        if suppressed {
            Disposition::Suppress
        } else {
            Disposition::Pass
        }
    }

    pub fn subscription_count(&self) -> usize {
        self.inner.lock().subscriptions.len()
    }
}

impl EventSource for SyntheticEventSource {
    fn subscribe(
        &self,
        mask: EventMask,
        mode: TapMode,
        handler: EventHandler,
    ) -> Result<SubscriptionId> {
        let mut inner = self.inner.lock();
        let id = SubscriptionId(inner.next_id);
        inner.next_id += 1;
        inner.subscriptions.push(Subscription {
            id,
            mask,
            mode,
            handler,
        });
        Ok(id)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.inner.lock().subscriptions.retain(|s| s.id != id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gesture::source::EventKind;
    use crate::gesture::ModifierSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    fn key_down(code: u16) -> InputEvent {
        InputEvent {
            kind: EventKind::KeyDown,
            key_code: code,
            modifiers: ModifierSet::EMPTY,
            at: Instant::now(),
        }
    }

    #[test]
    fn emit_reaches_only_matching_masks() {
        let source = SyntheticEventSource::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_clone = Arc::clone(&hits);

        source
            .subscribe(
                EventMask::MODIFIERS,
                TapMode::Passive,
                Arc::new(move |_| {
                    hits_clone.fetch_add(1, Ordering::Relaxed);
                    Disposition::Pass
                }),
            )
            .unwrap();

        assert_eq!(source.emit(key_down(2)), Disposition::Pass);
        assert_eq!(hits.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn passive_subscription_cannot_suppress() {
        let source = SyntheticEventSource::new();
        source
            .subscribe(
                EventMask::KEYS_AND_MODIFIERS,
                TapMode::Passive,
                Arc::new(|_| Disposition::Suppress),
            )
            .unwrap();
        assert_eq!(source.emit(key_down(2)), Disposition::Pass);
    }

    #[test]
    fn unsubscribe_removes_handler() {
        let source = SyntheticEventSource::new();
        let id = source
            .subscribe(
                EventMask::KEYS_AND_MODIFIERS,
                TapMode::Intercepting,
                Arc::new(|_| Disposition::Suppress),
            )
            .unwrap();
        assert_eq!(source.emit(key_down(2)), Disposition::Suppress);
        source.unsubscribe(id);
        assert_eq!(source.subscription_count(), 0);
        assert_eq!(source.emit(key_down(2)), Disposition::Pass);
    }
}
