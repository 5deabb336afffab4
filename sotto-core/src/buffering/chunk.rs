//! Typed audio data passed between the capture, segmentation and dispatch
//! stages.

/// A contiguous block of mono PCM samples at a known sample rate.
///
/// One chunk is assembled per segment-loop iteration, on the non-RT thread.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// Mono f32 samples in [-1.0, 1.0].
    pub samples: Vec<f32>,
    /// Sample rate in Hz.
    pub sample_rate: u32,
}

impl AudioChunk {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Duration of this chunk in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// A flushed, contiguous span of buffered chunks representing one spoken
/// segment.
///
/// Created by the segmenter's flush operation; never mutated afterwards.
/// Ownership moves to whichever consumer the utterance is dispatched to.
#[derive(Debug, Clone)]
pub struct Utterance {
    /// Mono f32 samples in [-1.0, 1.0].
    pub samples: Vec<f32>,
    /// Sample rate in Hz.
    pub sample_rate: u32,
}

impl Utterance {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Duration of the utterance in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Number of samples in the utterance.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_duration_matches_sample_count() {
        let chunk = AudioChunk::new(vec![0.0; 1600], 16_000);
        assert!((chunk.duration_secs() - 0.1).abs() < 1e-9);
    }

    #[test]
    fn utterance_duration_matches_sample_count() {
        let utt = Utterance::new(vec![0.0; 8_000], 16_000);
        assert!((utt.duration_secs() - 0.5).abs() < 1e-9);
        assert_eq!(utt.len(), 8_000);
        assert!(!utt.is_empty());
    }
}
