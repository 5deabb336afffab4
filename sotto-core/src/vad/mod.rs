//! Voice Activity Detection (VAD) abstraction.
//!
//! The `VoiceActivityDetector` trait is the seam between the segment loop and
//! the speech/silence classifier: the loop only sees decisions, so tests can
//! substitute a scripted detector and tooling can replay recorded audio
//! through the real one.

pub mod energy;

pub use energy::EnergyGate;

use crate::buffering::chunk::AudioChunk;

/// Whether a given audio chunk contains speech or silence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VadDecision {
    /// Chunk energy at or above the configured threshold.
    Speech,
    /// Chunk energy below the configured threshold.
    Silence,
}

impl VadDecision {
    pub fn is_speech(self) -> bool {
        self == VadDecision::Speech
    }
}

/// Trait for all VAD implementations.
///
/// Implementors may be stateful; `reset` is called between recording
/// sessions.
pub trait VoiceActivityDetector: Send + 'static {
    /// Analyse a chunk and return a speech/silence decision.
    fn classify(&mut self, chunk: &AudioChunk) -> VadDecision;

    /// Reset any internal state.
    fn reset(&mut self);
}

/// Root-mean-square amplitude of a sample slice. Returns 0.0 for an empty
/// slice.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
    (sum_sq / samples.len() as f32).sqrt()
}
