//! The blocking segment loop and its flush policy.
//!
//! ## Per-iteration stages
//!
//! ```text
//! 1. Drain ring buffer → raw f32 samples at the capture rate
//! 2. Rate-convert to the 16 kHz target
//! 3. RMS + energy-gate classification → Speech | Silence
//! 4. Append to the pending segment buffer
//! 5. Silence run ≥ silence_duration → flush:
//!      duration ≥ min_chunk_duration → dispatch Utterance on a worker
//!      otherwise                     → discard silently
//! ```
//!
//! Speech resets the silence timer, so a short pause never truncates an
//! utterance. Silence that accumulates before the flush threshold is reached
//! stays in the buffer and ships with the utterance — transcription engines
//! behave better with a natural trailing pause than with a hard cut.
//!
//! The loop runs on its own named thread; the real-time audio callback only
//! ever touches the ring producer.

use std::sync::{
    atomic::{AtomicBool, AtomicU32, Ordering},
    Arc,
};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, error, info};

use crate::{
    audio::resample::RateConverter,
    buffering::{
        chunk::{AudioChunk, Utterance},
        AudioConsumer, Consumer,
    },
    dispatch,
    events::ActivityEvent,
    segmenter::{SegmenterConfig, SegmenterDiagnostics, UtteranceSink},
    vad::{self, VoiceActivityDetector},
};

/// Sleep when the ring is empty (avoids busy-waiting a core).
const SLEEP_EMPTY_MS: u64 = 5;

/// Result of a flush attempt on the pending segment buffer.
#[derive(Debug)]
pub enum FlushOutcome {
    /// Nothing was buffered.
    Empty,
    /// Buffered audio was below the minimum utterance duration and was
    /// discarded.
    TooShort { samples: usize },
    /// A complete utterance was produced.
    Ready(Utterance),
}

/// Pending samples plus the silence-run timer.
///
/// Mutated only under its `parking_lot::Mutex`; shared between the segment
/// loop (per-chunk push) and the controller (final flush on stop).
pub struct SegmentBuffer {
    pending: Vec<f32>,
    silence_started_at: Option<Instant>,
    sample_rate: u32,
    silence_duration: Duration,
    min_samples: usize,
}

impl SegmentBuffer {
    pub fn new(config: &SegmenterConfig) -> Self {
        Self {
            pending: Vec::new(),
            silence_started_at: None,
            sample_rate: config.target_sample_rate,
            silence_duration: config.silence_duration,
            min_samples: config.min_utterance_samples(),
        }
    }

    /// Append one classified chunk and apply the flush policy.
    ///
    /// Returns `Some` when a silence run crossed the threshold and a flush
    /// occurred (which may still discard a too-short segment).
    pub fn push(&mut self, samples: &[f32], is_silence: bool, now: Instant) -> Option<FlushOutcome> {
        self.pending.extend_from_slice(samples);

        if !is_silence {
            // Speech resets the silence timer.
            self.silence_started_at = None;
            return None;
        }

        match self.silence_started_at {
            None => {
                self.silence_started_at = Some(now);
                None
            }
            Some(started) if now.duration_since(started) >= self.silence_duration => {
                Some(self.flush())
            }
            Some(_) => None,
        }
    }

    /// Drain the buffer atomically. The minimum-duration rule applies here
    /// too: too-short segments are dropped, not returned.
    pub fn flush(&mut self) -> FlushOutcome {
        self.silence_started_at = None;
        if self.pending.is_empty() {
            return FlushOutcome::Empty;
        }
        let samples = std::mem::take(&mut self.pending);
        if samples.len() >= self.min_samples {
            FlushOutcome::Ready(Utterance::new(samples, self.sample_rate))
        } else {
            FlushOutcome::TooShort {
                samples: samples.len(),
            }
        }
    }

    /// Clear all state for a fresh recording session.
    pub fn reset(&mut self) {
        self.pending.clear();
        self.silence_started_at = None;
    }

    pub fn pending_samples(&self) -> usize {
        self.pending.len()
    }
}

/// Everything the segment loop needs, passed as one struct.
pub struct FlowContext {
    pub config: SegmenterConfig,
    pub vad: Box<dyn VoiceActivityDetector>,
    pub consumer: AudioConsumer,
    pub running: Arc<AtomicBool>,
    pub buffer: Arc<Mutex<SegmentBuffer>>,
    /// Latest chunk RMS, published for the level meter.
    pub level_bits: Arc<AtomicU32>,
    pub activity_tx: broadcast::Sender<ActivityEvent>,
    pub sink: UtteranceSink,
    pub capture_sample_rate: u32,
    pub diagnostics: Arc<SegmenterDiagnostics>,
}

/// Run the segment loop until `ctx.running` becomes false.
pub fn run(mut ctx: FlowContext) {
    info!("segment loop started");

    let mut converter = match RateConverter::new(
        ctx.capture_sample_rate,
        ctx.config.target_sample_rate,
        ctx.config.chunk_samples,
    ) {
        Ok(converter) => converter,
        Err(e) => {
            error!("failed to create rate converter: {e}");
            return;
        }
    };

    let mut raw = vec![0f32; ctx.config.chunk_samples];
    let mut seq = 0u64;

    loop {
        if !ctx.running.load(Ordering::Relaxed) {
            break;
        }

        let n = ctx.consumer.pop_slice(&mut raw);
        if n == 0 {
            std::thread::sleep(Duration::from_millis(SLEEP_EMPTY_MS));
            continue;
        }
        ctx.diagnostics.frames_in.fetch_add(n, Ordering::Relaxed);

        let resampled = converter.process(&raw[..n]);
        if resampled.is_empty() {
            // Partial block — the converter is waiting for more input.
            continue;
        }

        let chunk = AudioChunk::new(resampled, ctx.config.target_sample_rate);
        let rms = vad::rms(&chunk.samples);
        ctx.level_bits.store(rms.to_bits(), Ordering::Release);

        let is_speech = ctx.vad.classify(&chunk).is_speech();
        ctx.diagnostics
            .chunks_classified
            .fetch_add(1, Ordering::Relaxed);
        if is_speech {
            ctx.diagnostics.speech_chunks.fetch_add(1, Ordering::Relaxed);
        }

        let _ = ctx.activity_tx.send(ActivityEvent {
            seq,
            rms,
            is_speech,
        });
        seq = seq.saturating_add(1);

        // Lock scope covers the state mutation only — dispatch happens after.
        let outcome = {
            let mut buffer = ctx.buffer.lock();
            buffer.push(&chunk.samples, !is_speech, Instant::now())
        };
        if let Some(outcome) = outcome {
            deliver(&ctx, outcome);
        }
    }

    ctx.level_bits.store(0, Ordering::Release);
    let snap = ctx.diagnostics.snapshot();
    info!(
        frames_in = snap.frames_in,
        chunks_classified = snap.chunks_classified,
        speech_chunks = snap.speech_chunks,
        utterances_emitted = snap.utterances_emitted,
        utterances_discarded = snap.utterances_discarded,
        "segment loop stopped"
    );
}

fn deliver(ctx: &FlowContext, outcome: FlushOutcome) {
    match outcome {
        FlushOutcome::Ready(utterance) => {
            ctx.diagnostics
                .utterances_emitted
                .fetch_add(1, Ordering::Relaxed);
            info!(
                samples = utterance.len(),
                duration_secs = format_args!("{:.2}", utterance.duration_secs()),
                "utterance flushed"
            );
            let sink = Arc::clone(&ctx.sink);
            dispatch::spawn_worker("utterance", move || sink(utterance));
        }
        FlushOutcome::TooShort { samples } => {
            ctx.diagnostics
                .utterances_discarded
                .fetch_add(1, Ordering::Relaxed);
            debug!(samples, "segment below minimum duration — discarded");
        }
        FlushOutcome::Empty => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHUNK: usize = 1024; // 64 ms at 16 kHz

    fn config() -> SegmenterConfig {
        SegmenterConfig::default()
    }

    fn at(base: Instant, chunk_index: usize) -> Instant {
        base + Duration::from_millis(64 * chunk_index as u64)
    }

    #[test]
    fn continuous_speech_never_flushes() {
        let mut buffer = SegmentBuffer::new(&config());
        let base = Instant::now();
        for i in 0..100 {
            assert!(buffer.push(&[0.05; CHUNK], false, at(base, i)).is_none());
        }
        assert_eq!(buffer.pending_samples(), 100 * CHUNK);
    }

    #[test]
    fn silence_run_flushes_exactly_once_and_drains_buffer() {
        let mut buffer = SegmentBuffer::new(&config());
        let base = Instant::now();

        // 500 ms-ish of speech…
        for i in 0..8 {
            assert!(buffer.push(&[0.05; CHUNK], false, at(base, i)).is_none());
        }

        // …then sustained silence. The flush fires on the chunk whose
        // timestamp puts the run at ≥ 700 ms.
        let mut flushed = None;
        for i in 0..20 {
            if let Some(outcome) = buffer.push(&[0.0; CHUNK], true, at(base, 8 + i)) {
                flushed = Some((i, outcome));
                break;
            }
        }

        let (i, outcome) = flushed.expect("silence run should flush");
        assert_eq!(i, 11, "11 * 64 ms is the first gap ≥ 700 ms");
        match outcome {
            FlushOutcome::Ready(utterance) => {
                // Speech plus every silent chunk buffered before the
                // threshold was crossed, trailing silence included.
                assert_eq!(utterance.len(), (8 + 12) * CHUNK);
                assert_eq!(utterance.sample_rate, 16_000);
            }
            other => panic!("expected Ready, got {other:?}"),
        }
        assert_eq!(buffer.pending_samples(), 0);

        // The run is consumed — further silence restarts the timer.
        assert!(buffer.push(&[0.0; CHUNK], true, at(base, 21)).is_none());
    }

    #[test]
    fn silence_only_buffer_still_flushes() {
        // With no speech at all the buffer holds ≥ 700 ms of near-silence by
        // the time the run crosses the threshold, which clears the minimum
        // duration on its own. Downstream transcribers are expected to gate
        // near-silent audio themselves.
        let mut buffer = SegmentBuffer::new(&config());
        let base = Instant::now();

        let mut flushed = None;
        for i in 0..20 {
            if let Some(outcome) = buffer.push(&[0.0; CHUNK], true, at(base, i)) {
                flushed = Some(outcome);
                break;
            }
        }

        match flushed.expect("silence run should flush") {
            FlushOutcome::Ready(utterance) => assert_eq!(utterance.len(), 12 * CHUNK),
            other => panic!("expected Ready, got {other:?}"),
        }
        assert_eq!(buffer.pending_samples(), 0);
    }

    #[test]
    fn speech_resets_the_silence_timer() {
        let mut buffer = SegmentBuffer::new(&config());
        let base = Instant::now();

        for i in 0..8 {
            buffer.push(&[0.05; CHUNK], false, at(base, i));
        }
        // 384 ms of silence — under the threshold.
        for i in 8..14 {
            assert!(buffer.push(&[0.0; CHUNK], true, at(base, i)).is_none());
        }
        // Speech resumes; the pause must not end the utterance.
        assert!(buffer.push(&[0.05; CHUNK], false, at(base, 14)).is_none());

        // A fresh silence run measures from its own start.
        for i in 15..25 {
            assert!(buffer.push(&[0.0; CHUNK], true, at(base, i)).is_none());
        }
        let outcome = buffer.push(&[0.0; CHUNK], true, at(base, 26));
        assert!(matches!(outcome, Some(FlushOutcome::Ready(_))));
    }

    #[test]
    fn manual_flush_applies_minimum_duration_rule() {
        let mut buffer = SegmentBuffer::new(&config());
        let base = Instant::now();

        buffer.push(&[0.05; CHUNK], false, base);
        assert!(matches!(buffer.flush(), FlushOutcome::TooShort { .. }));
        assert!(matches!(buffer.flush(), FlushOutcome::Empty));

        for i in 0..8 {
            buffer.push(&[0.05; CHUNK], false, at(base, i));
        }
        match buffer.flush() {
            FlushOutcome::Ready(utterance) => assert_eq!(utterance.len(), 8 * CHUNK),
            other => panic!("expected Ready, got {other:?}"),
        }
    }

    #[test]
    fn dictation_pause_scenario() {
        // ~500 ms of speech at RMS 0.05 followed by sustained near-silence:
        // exactly one utterance, flushed once the pause reaches 700 ms,
        // carrying the buffered speech plus the pause so far.
        let mut buffer = SegmentBuffer::new(&config());
        let base = Instant::now();

        for i in 0..8 {
            buffer.push(&[0.05; CHUNK], false, at(base, i));
        }

        let mut utterances = 0;
        for i in 8..28 {
            if let Some(FlushOutcome::Ready(utterance)) =
                buffer.push(&[0.001; CHUNK], true, at(base, i))
            {
                utterances += 1;
                let secs = utterance.duration_secs();
                assert!((1.2..1.4).contains(&secs), "duration {secs}");
            }
        }
        assert_eq!(utterances, 1);
    }
}
