//! Energy-gated VAD: a chunk is silence iff its RMS falls below a fixed
//! threshold.
//!
//! Deliberately latency-free — no model, no lookahead, no smoothing. Pause
//! tolerance is handled downstream by the flush policy's silence-run timer,
//! so the gate itself stays a pure per-chunk comparison.

use super::{rms, VadDecision, VoiceActivityDetector};
use crate::buffering::chunk::AudioChunk;

/// A stateless RMS threshold gate.
#[derive(Debug, Clone)]
pub struct EnergyGate {
    /// RMS amplitude below which a chunk is considered silence.
    /// Typical range for a quiet microphone: 0.005–0.05.
    threshold: f32,
}

impl EnergyGate {
    /// Create a gate with the given RMS threshold. Default: `0.01`.
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }
}

impl Default for EnergyGate {
    fn default() -> Self {
        Self::new(0.01)
    }
}

impl VoiceActivityDetector for EnergyGate {
    fn classify(&mut self, chunk: &AudioChunk) -> VadDecision {
        if rms(&chunk.samples) < self.threshold {
            VadDecision::Silence
        } else {
            VadDecision::Speech
        }
    }

    fn reset(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(amplitude: f32, len: usize) -> AudioChunk {
        AudioChunk::new(vec![amplitude; len], 16_000)
    }

    #[test]
    fn below_threshold_is_silence() {
        let mut gate = EnergyGate::new(0.01);
        assert_eq!(gate.classify(&chunk(0.001, 160)), VadDecision::Silence);
    }

    #[test]
    fn at_or_above_threshold_is_speech() {
        let mut gate = EnergyGate::new(0.01);
        assert_eq!(gate.classify(&chunk(0.01, 160)), VadDecision::Speech);
        assert_eq!(gate.classify(&chunk(0.5, 160)), VadDecision::Speech);
    }

    #[test]
    fn empty_chunk_is_silence() {
        let mut gate = EnergyGate::default();
        let empty = AudioChunk::new(vec![], 16_000);
        assert_eq!(gate.classify(&empty), VadDecision::Silence);
    }
}
