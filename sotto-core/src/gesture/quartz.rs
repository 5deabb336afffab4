//! macOS `EventSource` backed by a CGEventTap.
//!
//! Each subscription runs a dedicated listener thread with its own CFRunLoop
//! and tap, matching the one-tap-per-detector model. Tap creation requires
//! the Input Monitoring / Accessibility grant; creation happens on the
//! listener thread, so `subscribe` waits a short bounded interval for
//! confirmation before reporting `PermissionDenied`.
//!
//! The run loop is driven in 100 ms slices so `unsubscribe` stays responsive
//! without needing a cross-thread `CFRunLoop` handle.

#![allow(unsafe_code)]

use std::collections::HashMap;
use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};
use std::thread;
use std::time::{Duration, Instant};

use core_foundation::runloop::{kCFRunLoopCommonModes, kCFRunLoopDefaultMode, CFRunLoop};
use core_graphics::event::{
    CGEvent, CGEventFlags, CGEventTap, CGEventTapLocation, CGEventTapOptions,
    CGEventTapPlacement, CGEventType, EventField,
};
use crossbeam_channel::{bounded, Receiver};
use parking_lot::Mutex;
use tracing::{error, info, warn};

use crate::error::{Result, SottoError};
use crate::gesture::source::{
    Disposition, EventHandler, EventKind, EventMask, EventSource, InputEvent, SubscriptionId,
    TapMode,
};
use crate::gesture::ModifierSet;

/// How long `subscribe` waits for the listener thread to confirm tap
/// creation.
const TAP_CREATE_WAIT: Duration = Duration::from_millis(200);

/// How long `unsubscribe` waits for the listener thread to wind down before
/// abandoning it.
const LISTENER_JOIN_TIMEOUT: Duration = Duration::from_secs(1);

struct TapWorker {
    running: Arc<AtomicBool>,
    done_rx: Receiver<()>,
    handle: thread::JoinHandle<()>,
}

/// System-wide input interception via Quartz event taps.
#[derive(Default)]
pub struct QuartzEventSource {
    next_id: AtomicU64,
    workers: Mutex<HashMap<u64, TapWorker>>,
}

impl QuartzEventSource {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EventSource for QuartzEventSource {
    fn subscribe(
        &self,
        mask: EventMask,
        mode: TapMode,
        handler: EventHandler,
    ) -> Result<SubscriptionId> {
        let running = Arc::new(AtomicBool::new(true));
        let (ready_tx, ready_rx) = bounded::<bool>(1);
        let (done_tx, done_rx) = bounded::<()>(1);

        let thread_running = Arc::clone(&running);
        let handle = thread::Builder::new()
            .name("sotto-event-tap".to_string())
            .spawn(move || {
                run_tap_loop(mask, mode, handler, thread_running, move |ok| {
                    let _ = ready_tx.send(ok);
                });
                let _ = done_tx.send(());
            })
            .map_err(|e| SottoError::StreamFault(format!("listener thread spawn: {e}")))?;

        // Tap creation is asynchronous relative to this call — wait a short
        // bounded interval for the listener to confirm.
        match ready_rx.recv_timeout(TAP_CREATE_WAIT) {
            Ok(true) => {}
            Ok(false) | Err(_) => {
                running.store(false, Ordering::SeqCst);
                return Err(SottoError::PermissionDenied);
            }
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.workers.lock().insert(
            id,
            TapWorker {
                running,
                done_rx,
                handle,
            },
        );
        Ok(SubscriptionId(id))
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        let Some(worker) = self.workers.lock().remove(&id.0) else {
            return;
        };

        worker.running.store(false, Ordering::SeqCst);
        match worker.done_rx.recv_timeout(LISTENER_JOIN_TIMEOUT) {
            Ok(()) => {
                let _ = worker.handle.join();
            }
            Err(_) => {
                warn!(
                    timeout = ?LISTENER_JOIN_TIMEOUT,
                    "event tap listener did not stop in time; abandoning thread"
                );
            }
        }
    }
}

fn event_types_for_mask(mask: EventMask) -> Vec<CGEventType> {
    let mut types = Vec::new();
    if mask.key_down {
        types.push(CGEventType::KeyDown);
    }
    if mask.key_up {
        types.push(CGEventType::KeyUp);
    }
    if mask.modifiers_changed {
        types.push(CGEventType::FlagsChanged);
    }
    types
}

fn modifier_set_from_flags(flags: CGEventFlags) -> ModifierSet {
    ModifierSet {
        shift: flags.contains(CGEventFlags::CGEventFlagShift),
        command: flags.contains(CGEventFlags::CGEventFlagCommand),
        option: flags.contains(CGEventFlags::CGEventFlagAlternate),
        control: flags.contains(CGEventFlags::CGEventFlagControl),
    }
}

fn run_tap_loop(
    mask: EventMask,
    mode: TapMode,
    handler: EventHandler,
    running: Arc<AtomicBool>,
    confirm: impl FnOnce(bool),
) {
    let options = match mode {
        TapMode::Passive => CGEventTapOptions::ListenOnly,
        TapMode::Intercepting => CGEventTapOptions::Default,
    };

    // Tap callback — must be fast and non-blocking.
    let callback = move |_proxy: core_graphics::event::CGEventTapProxy,
                         event_type: CGEventType,
                         event: &CGEvent|
          -> Option<CGEvent> {
        let kind = match event_type {
            CGEventType::KeyDown => EventKind::KeyDown,
            CGEventType::KeyUp => EventKind::KeyUp,
            CGEventType::FlagsChanged => EventKind::ModifiersChanged,
            CGEventType::TapDisabledByTimeout | CGEventType::TapDisabledByUserInput => {
                warn!("event tap disabled by the system; events may be missed");
                return Some(event.clone());
            }
            _ => return Some(event.clone()),
        };

        let input = InputEvent {
            kind,
            key_code: event.get_integer_value_field(EventField::KEYBOARD_EVENT_KEYCODE) as u16,
            modifiers: modifier_set_from_flags(event.get_flags()),
            at: Instant::now(),
        };

        match handler(&input) {
            // Returning no event consumes the keystroke (intercepting taps).
            Disposition::Suppress => None,
            Disposition::Pass => Some(event.clone()),
        }
    };

    let tap = match CGEventTap::new(
        CGEventTapLocation::Session,
        CGEventTapPlacement::HeadInsertEventTap,
        options,
        event_types_for_mask(mask),
        callback,
    ) {
        Ok(tap) => tap,
        Err(_) => {
            error!("failed to create event tap — is the input-monitoring permission granted?");
            confirm(false);
            return;
        }
    };

    tap.enable();

    let Ok(run_loop_source) = tap.mach_port.create_runloop_source(0) else {
        error!("failed to create run loop source for event tap");
        confirm(false);
        return;
    };

    let run_loop = CFRunLoop::get_current();
    unsafe {
        run_loop.add_source(&run_loop_source, kCFRunLoopCommonModes);
    }

    info!("event tap created and enabled");
    confirm(true);

    while running.load(Ordering::SeqCst) {
        unsafe {
            CFRunLoop::run_in_mode(kCFRunLoopDefaultMode, Duration::from_millis(100), true);
        }
    }

    // The tap is torn down when it drops at the end of this scope.
    info!("event tap listener stopped");
}
