//! `Segmenter` — lifecycle controller for continuous capture and
//! voice-activity segmentation.
//!
//! ## Lifecycle
//!
//! ```text
//! Segmenter::new()
//!     └─► start(sink)   → device open, segment loop spawned, Listening
//!         └─► stop()    → running=false, loop joined (bounded), final
//!                         flush returned, device released, Stopped
//! ```
//!
//! `start()` and `stop()` are idempotent: a second `start` while recording is
//! a silent success that leaves the original sink bound, and `stop` while
//! stopped returns `None`. Both are safe to call concurrently with the
//! segment loop mid-iteration — the loop locks the shared buffer per chunk,
//! the controller locks it once for the whole transition.
//!
//! ## Threading
//!
//! `cpal::Stream` is `!Send` on Windows/macOS, so the device is opened
//! *inside* the loop thread and dropped there. A sync channel propagates any
//! open-device error back to the `start()` caller.

pub mod flow;

use std::sync::{
    atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering},
    Arc,
};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::{
    audio::AudioCapture,
    buffering::{chunk::Utterance, create_audio_ring},
    error::{Result, SottoError},
    events::{ActivityEvent, SegmenterStatus, StatusEvent},
    segmenter::flow::{FlowContext, FlushOutcome, SegmentBuffer},
    vad::{EnergyGate, VoiceActivityDetector},
};

/// Broadcast channel capacity for activity/status subscribers.
const BROADCAST_CAP: usize = 256;

/// How long `stop()` waits for the segment loop to wind down before
/// abandoning the thread.
const FLOW_JOIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Gain applied to raw RMS for the `current_level` meter, matching a speech
/// RMS of ~0.1 to full scale.
const LEVEL_METER_GAIN: f32 = 10.0;

/// Configuration for the segmenter. Supplied at construction, immutable for
/// the component's lifetime.
#[derive(Debug, Clone)]
pub struct SegmenterConfig {
    /// Sample rate utterances are delivered at (Hz). Capture at other rates
    /// is converted. Default: 16000.
    pub target_sample_rate: u32,
    /// Samples drained from the ring per loop iteration, and the rate
    /// converter's block size. Default: 1024 (64 ms at 16 kHz).
    pub chunk_samples: usize,
    /// RMS level below which a chunk counts as silence. Default: 0.01.
    pub silence_threshold: f32,
    /// Silence run length that ends an utterance. Default: 700 ms.
    pub silence_duration: Duration,
    /// Minimum utterance duration worth delivering; shorter flushes are
    /// discarded. Default: 300 ms.
    pub min_chunk_duration: Duration,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            target_sample_rate: 16_000,
            chunk_samples: 1_024,
            silence_threshold: 0.01,
            silence_duration: Duration::from_millis(700),
            min_chunk_duration: Duration::from_millis(300),
        }
    }
}

impl SegmenterConfig {
    /// `min_chunk_duration` expressed in samples at the target rate.
    pub fn min_utterance_samples(&self) -> usize {
        (self.min_chunk_duration.as_secs_f64() * self.target_sample_rate as f64) as usize
    }
}

/// Caller-supplied consumer for completed utterances. Invoked on an
/// ephemeral worker thread; panics are caught at the dispatch boundary.
pub type UtteranceSink = Arc<dyn Fn(Utterance) + Send + Sync>;

/// Shared counters for observability.
#[derive(Debug, Default)]
pub struct SegmenterDiagnostics {
    pub frames_in: AtomicUsize,
    pub chunks_classified: AtomicUsize,
    pub speech_chunks: AtomicUsize,
    pub utterances_emitted: AtomicUsize,
    pub utterances_discarded: AtomicUsize,
}

impl SegmenterDiagnostics {
    pub fn reset(&self) {
        self.frames_in.store(0, Ordering::Relaxed);
        self.chunks_classified.store(0, Ordering::Relaxed);
        self.speech_chunks.store(0, Ordering::Relaxed);
        self.utterances_emitted.store(0, Ordering::Relaxed);
        self.utterances_discarded.store(0, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            frames_in: self.frames_in.load(Ordering::Relaxed),
            chunks_classified: self.chunks_classified.load(Ordering::Relaxed),
            speech_chunks: self.speech_chunks.load(Ordering::Relaxed),
            utterances_emitted: self.utterances_emitted.load(Ordering::Relaxed),
            utterances_discarded: self.utterances_discarded.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DiagnosticsSnapshot {
    pub frames_in: usize,
    pub chunks_classified: usize,
    pub speech_chunks: usize,
    pub utterances_emitted: usize,
    pub utterances_discarded: usize,
}

struct FlowWorker {
    done_rx: Receiver<()>,
    handle: thread::JoinHandle<()>,
}

/// The segmenter handle.
///
/// `Send + Sync` — all fields use interior mutability. Wrap in `Arc` to share
/// between a session controller and event-forwarding tasks.
pub struct Segmenter {
    config: SegmenterConfig,
    /// `true` while capture + segment loop are active.
    running: Arc<AtomicBool>,
    /// Latest chunk RMS bits, written by the loop.
    level_bits: Arc<AtomicU32>,
    /// Pending samples + silence timer, shared with the loop.
    buffer: Arc<Mutex<SegmentBuffer>>,
    status: Arc<Mutex<SegmenterStatus>>,
    activity_tx: broadcast::Sender<ActivityEvent>,
    status_tx: broadcast::Sender<StatusEvent>,
    worker: Mutex<Option<FlowWorker>>,
    diagnostics: Arc<SegmenterDiagnostics>,
}

impl Segmenter {
    /// Create a segmenter. Does not touch the audio device — call `start()`.
    pub fn new(config: SegmenterConfig) -> Self {
        let (activity_tx, _) = broadcast::channel(BROADCAST_CAP);
        let (status_tx, _) = broadcast::channel(BROADCAST_CAP);
        let buffer = Arc::new(Mutex::new(SegmentBuffer::new(&config)));

        Self {
            config,
            running: Arc::new(AtomicBool::new(false)),
            level_bits: Arc::new(AtomicU32::new(0)),
            buffer,
            status: Arc::new(Mutex::new(SegmenterStatus::Idle)),
            activity_tx,
            status_tx,
            worker: Mutex::new(None),
            diagnostics: Arc::new(SegmenterDiagnostics::default()),
        }
    }

    /// Begin streaming capture, delivering flushed utterances to
    /// `on_utterance`.
    ///
    /// Blocks until the audio device is confirmed open (or fails), then
    /// returns; the segment loop keeps running on a background thread.
    ///
    /// Calling `start` while already recording is a silent success — the
    /// originally bound sink stays in place.
    ///
    /// # Errors
    /// `SottoError::DeviceUnavailable` when no input device exists,
    /// `SottoError::AudioDevice` / `SottoError::StreamFault` when the stream
    /// cannot be opened.
    pub fn start(&self, on_utterance: UtteranceSink) -> Result<()> {
        self.start_with_device(on_utterance, None)
    }

    /// `start`, preferring the input device with the given name.
    pub fn start_with_device(
        &self,
        on_utterance: UtteranceSink,
        preferred_input_device: Option<String>,
    ) -> Result<()> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("start requested while already recording — no-op, sink unchanged");
            return Ok(());
        }

        self.diagnostics.reset();
        self.buffer.lock().reset();

        let (producer, consumer) = create_audio_ring();
        let (open_tx, open_rx) = bounded::<Result<u32>>(1);
        let (done_tx, done_rx) = bounded::<()>(1);

        let config = self.config.clone();
        let running = Arc::clone(&self.running);
        let buffer = Arc::clone(&self.buffer);
        let level_bits = Arc::clone(&self.level_bits);
        let activity_tx = self.activity_tx.clone();
        let diagnostics = Arc::clone(&self.diagnostics);

        let spawned = thread::Builder::new()
            .name("sotto-segmenter".to_string())
            .spawn(move || {
                // Device open must happen on THIS thread — cpal::Stream is
                // !Send — and the stream must also drop here.
                let capture = match AudioCapture::open_with_preference(
                    producer,
                    Arc::clone(&running),
                    preferred_input_device.as_deref(),
                ) {
                    Ok(capture) => {
                        let _ = open_tx.send(Ok(capture.sample_rate));
                        capture
                    }
                    Err(e) => {
                        let _ = open_tx.send(Err(e));
                        running.store(false, Ordering::SeqCst);
                        return;
                    }
                };

                let capture_sample_rate = capture.sample_rate;
                let vad: Box<dyn VoiceActivityDetector> =
                    Box::new(EnergyGate::new(config.silence_threshold));

                flow::run(FlowContext {
                    config,
                    vad,
                    consumer,
                    running,
                    buffer,
                    level_bits,
                    activity_tx,
                    sink: on_utterance,
                    capture_sample_rate,
                    diagnostics,
                });

                capture.stop();
                drop(capture);
                let _ = done_tx.send(());
            });

        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                return Err(SottoError::StreamFault(format!(
                    "segmenter thread spawn: {e}"
                )));
            }
        };

        match open_rx.recv() {
            Ok(Ok(rate)) => {
                *self.worker.lock() = Some(FlowWorker { done_rx, handle });
                self.set_status(SegmenterStatus::Listening, None);
                info!(capture_sample_rate = rate, "segmenter started — listening");
                Ok(())
            }
            Ok(Err(e)) => {
                self.running.store(false, Ordering::SeqCst);
                self.set_status(SegmenterStatus::Error, Some(e.to_string()));
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                // Channel closed before a message — the thread died early.
                self.running.store(false, Ordering::SeqCst);
                let detail = "capture thread exited before confirming device open";
                self.set_status(SegmenterStatus::Error, Some(detail.into()));
                Err(SottoError::StreamFault(detail.into()))
            }
        }
    }

    /// Halt capture, flush any pending audio as a final utterance and release
    /// the device.
    ///
    /// The minimum-duration rule still applies to the final flush. The
    /// returned utterance is handed to the caller only — it is not also
    /// dispatched to the sink. Idempotent: returns `None` when not
    /// recording.
    pub fn stop(&self) -> Option<Utterance> {
        if self
            .running
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return None;
        }

        if let Some(worker) = self.worker.lock().take() {
            match worker.done_rx.recv_timeout(FLOW_JOIN_TIMEOUT) {
                Ok(()) => {
                    let _ = worker.handle.join();
                }
                Err(_) => {
                    warn!(
                        timeout = ?FLOW_JOIN_TIMEOUT,
                        "segment loop did not stop in time; abandoning thread"
                    );
                }
            }
        }

        self.level_bits.store(0, Ordering::Release);

        let final_utterance = match self.buffer.lock().flush() {
            FlushOutcome::Ready(utterance) => {
                self.diagnostics
                    .utterances_emitted
                    .fetch_add(1, Ordering::Relaxed);
                info!(
                    samples = utterance.len(),
                    "final flush on stop produced an utterance"
                );
                Some(utterance)
            }
            FlushOutcome::TooShort { samples } => {
                self.diagnostics
                    .utterances_discarded
                    .fetch_add(1, Ordering::Relaxed);
                debug!(samples, "final segment below minimum duration — discarded");
                None
            }
            FlushOutcome::Empty => None,
        };

        self.set_status(SegmenterStatus::Stopped, None);
        info!("segmenter stopped");
        final_utterance
    }

    /// Whether capture is currently active.
    pub fn is_recording(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Instantaneous normalized input level in [0, 1] for UI metering.
    /// Zero when not recording.
    pub fn current_level(&self) -> f32 {
        if !self.is_recording() {
            return 0.0;
        }
        let rms = f32::from_bits(self.level_bits.load(Ordering::Acquire));
        (rms * LEVEL_METER_GAIN).min(1.0)
    }

    /// Current lifecycle status (snapshot).
    pub fn status(&self) -> SegmenterStatus {
        *self.status.lock()
    }

    /// Subscribe to per-chunk activity events (RMS + speech classification).
    pub fn subscribe_activity(&self) -> broadcast::Receiver<ActivityEvent> {
        self.activity_tx.subscribe()
    }

    /// Subscribe to lifecycle status events.
    pub fn subscribe_status(&self) -> broadcast::Receiver<StatusEvent> {
        self.status_tx.subscribe()
    }

    /// Snapshot of loop counters for observability.
    pub fn diagnostics_snapshot(&self) -> DiagnosticsSnapshot {
        self.diagnostics.snapshot()
    }

    fn set_status(&self, new_status: SegmenterStatus, detail: Option<String>) {
        *self.status.lock() = new_status;
        let _ = self.status_tx.send(StatusEvent {
            status: new_status,
            detail,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_match_tuning() {
        let config = SegmenterConfig::default();
        assert_eq!(config.target_sample_rate, 16_000);
        assert_eq!(config.silence_threshold, 0.01);
        assert_eq!(config.silence_duration, Duration::from_millis(700));
        assert_eq!(config.min_chunk_duration, Duration::from_millis(300));
        assert_eq!(config.min_utterance_samples(), 4_800);
    }

    #[test]
    fn stop_when_idle_is_a_no_op() {
        let segmenter = Segmenter::new(SegmenterConfig::default());
        assert!(!segmenter.is_recording());
        assert!(segmenter.stop().is_none());
        assert!(segmenter.stop().is_none());
        // A no-op stop must not disturb the lifecycle status.
        assert_eq!(segmenter.status(), SegmenterStatus::Idle);
    }

    #[test]
    fn level_is_zero_when_idle() {
        let segmenter = Segmenter::new(SegmenterConfig::default());
        assert_eq!(segmenter.current_level(), 0.0);
    }
}
