//! Thin session controller: wires a global gesture to the segmenter and
//! forwards utterances to the external transcription/injection pipeline.
//!
//! Two recording modes, mirroring the two gesture detectors:
//!
//! - **Toggle** — a double-tap of a modifier key starts or stops recording.
//! - **Push-to-talk** — recording runs exactly while a modifier+key
//!   combination is held.
//!
//! The controller owns nothing downstream of the utterance sink — what the
//! embedding application does with an utterance (transcribe, inject, log) is
//! its own concern and its own latency budget.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::Result;
use crate::gesture::combo::ComboGesture;
use crate::gesture::double_tap::{DoubleTapGesture, DEFAULT_TAP_WINDOW};
use crate::gesture::source::EventSource;
use crate::segmenter::{Segmenter, UtteranceSink};

/// Which gesture drives the recording lifecycle.
#[derive(Debug, Clone)]
pub enum GestureBinding {
    /// Double-tap `modifier` toggles recording on/off.
    DoubleTap {
        modifier: String,
        tap_window: Duration,
    },
    /// Recording runs while the `combo` spec (e.g. `"cmd+shift+d"`) is held.
    PushToTalk { combo: String },
}

/// Session-level configuration. Consumed at construction, immutable.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub gesture: GestureBinding,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            gesture: GestureBinding::DoubleTap {
                modifier: "shift".to_string(),
                tap_window: DEFAULT_TAP_WINDOW,
            },
        }
    }
}

struct SessionShared {
    segmenter: Arc<Segmenter>,
    sink: UtteranceSink,
    /// Guard against overlapping gesture-triggered transitions.
    transition_inflight: AtomicBool,
}

impl SessionShared {
    fn guarded<F: FnOnce(&Self)>(&self, transition: F) {
        if self
            .transition_inflight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("gesture transition dropped — previous one still in flight");
            return;
        }
        transition(self);
        self.transition_inflight.store(false, Ordering::SeqCst);
    }

    fn start_recording(&self) {
        match self.segmenter.start(Arc::clone(&self.sink)) {
            Ok(()) => info!("recording started by gesture"),
            Err(e) => warn!("could not start recording: {e}"),
        }
    }

    fn stop_recording(&self) {
        if let Some(utterance) = self.segmenter.stop() {
            (self.sink)(utterance);
        }
        info!("recording stopped by gesture");
    }

    fn toggle(&self) {
        self.guarded(|shared| {
            if shared.segmenter.is_recording() {
                shared.stop_recording();
            } else {
                shared.start_recording();
            }
        });
    }
}

enum BoundGesture {
    Toggle(DoubleTapGesture),
    Hold(ComboGesture),
}

/// Wires gesture activation to segmenter start/stop.
pub struct SessionController {
    gesture: BoundGesture,
    shared: Arc<SessionShared>,
}

impl SessionController {
    /// Build a controller around an existing segmenter and event source.
    ///
    /// # Errors
    /// `SottoError::UnsupportedModifier` for an invalid double-tap modifier.
    /// (Push-to-talk combo specs never fail — unknown keys fall back with a
    /// logged warning.)
    pub fn new(
        segmenter: Arc<Segmenter>,
        source: Arc<dyn EventSource>,
        config: SessionConfig,
        sink: UtteranceSink,
    ) -> Result<Self> {
        let shared = Arc::new(SessionShared {
            segmenter,
            sink,
            transition_inflight: AtomicBool::new(false),
        });

        // Gesture callbacks already run on worker threads, so the
        // transitions below are safe to execute inline.
        let gesture = match config.gesture {
            GestureBinding::DoubleTap {
                modifier,
                tap_window,
            } => {
                let for_gesture = Arc::clone(&shared);
                BoundGesture::Toggle(DoubleTapGesture::new(
                    source,
                    &modifier,
                    tap_window,
                    Arc::new(move || for_gesture.toggle()),
                )?)
            }
            GestureBinding::PushToTalk { combo } => {
                let for_press = Arc::clone(&shared);
                let for_release = Arc::clone(&shared);
                BoundGesture::Hold(ComboGesture::new(
                    source,
                    &combo,
                    Arc::new(move || for_press.guarded(SessionShared::start_recording)),
                    Arc::new(move || for_release.guarded(SessionShared::stop_recording)),
                ))
            }
        };

        Ok(Self { gesture, shared })
    }

    /// Install the gesture listener.
    ///
    /// # Errors
    /// `SottoError::PermissionDenied` when the host declines the tap.
    pub fn start(&self) -> Result<()> {
        match &self.gesture {
            BoundGesture::Toggle(gesture) => gesture.start(),
            BoundGesture::Hold(gesture) => gesture.start(),
        }
    }

    /// Toggle recording exactly as a gesture activation would.
    pub fn toggle_recording(&self) {
        self.shared.toggle();
    }

    pub fn is_recording(&self) -> bool {
        self.shared.segmenter.is_recording()
    }

    /// Tear down the gesture listener and stop any active recording,
    /// forwarding a final flushed utterance to the sink. Idempotent.
    pub fn shutdown(&self) {
        match &self.gesture {
            BoundGesture::Toggle(gesture) => gesture.stop(),
            BoundGesture::Hold(gesture) => gesture.stop(),
        }
        if let Some(utterance) = self.shared.segmenter.stop() {
            (self.shared.sink)(utterance);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gesture::synthetic::SyntheticEventSource;
    use crate::segmenter::SegmenterConfig;
    use std::sync::atomic::AtomicUsize;

    fn counting_sink() -> (UtteranceSink, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let for_sink = Arc::clone(&count);
        let sink: UtteranceSink = Arc::new(move |_| {
            for_sink.fetch_add(1, Ordering::Relaxed);
        });
        (sink, count)
    }

    #[test]
    fn rejects_invalid_toggle_modifier() {
        let segmenter = Arc::new(Segmenter::new(SegmenterConfig::default()));
        let source = Arc::new(SyntheticEventSource::new());
        let (sink, _) = counting_sink();

        let result = SessionController::new(
            segmenter,
            source,
            SessionConfig {
                gesture: GestureBinding::DoubleTap {
                    modifier: "fn".into(),
                    tap_window: DEFAULT_TAP_WINDOW,
                },
            },
            sink,
        );
        assert!(result.is_err());
    }

    #[test]
    fn push_to_talk_binding_constructs_and_installs() {
        let segmenter = Arc::new(Segmenter::new(SegmenterConfig::default()));
        let source = Arc::new(SyntheticEventSource::new());
        let (sink, _) = counting_sink();

        let controller = SessionController::new(
            segmenter,
            Arc::clone(&source) as Arc<dyn EventSource>,
            SessionConfig {
                gesture: GestureBinding::PushToTalk {
                    combo: "cmd+shift+d".into(),
                },
            },
            sink,
        )
        .unwrap();
        controller.start().unwrap();
        assert_eq!(source.subscription_count(), 1);
        controller.shutdown();
        assert_eq!(source.subscription_count(), 0);
    }

    #[test]
    fn shutdown_when_idle_is_a_no_op() {
        let segmenter = Arc::new(Segmenter::new(SegmenterConfig::default()));
        let source = Arc::new(SyntheticEventSource::new());
        let (sink, count) = counting_sink();

        let controller = SessionController::new(
            segmenter,
            Arc::clone(&source) as Arc<dyn EventSource>,
            SessionConfig::default(),
            sink,
        )
        .unwrap();
        controller.start().unwrap();
        assert_eq!(source.subscription_count(), 1);
        assert!(!controller.is_recording());

        controller.shutdown();
        controller.shutdown();
        assert_eq!(source.subscription_count(), 0);
        assert_eq!(count.load(Ordering::Relaxed), 0);
    }
}
