//! Sample-rate conversion using a rubato `FastFixedIn` resampler.
//!
//! cpal captures at the device's native rate (commonly 44.1 or 48 kHz);
//! segmentation and downstream transcription expect 16 kHz mono f32.
//! `RateConverter` bridges that gap on the segment-loop thread, where
//! allocation is allowed. When capture rate already equals the target rate no
//! rubato session is created and `process` is a plain copy.

use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use tracing::error;

use crate::error::{Result, SottoError};

/// Converts f32 mono audio from one fixed sample rate to another.
pub struct RateConverter {
    /// `None` when capture rate == target rate (passthrough mode).
    resampler: Option<FastFixedIn<f32>>,
    /// Holds partial input between calls until a full block is available.
    carry: Vec<f32>,
    /// Input frames rubato expects per process call.
    block: usize,
    /// Pre-allocated output buffer: `[1][output_frames_max]`.
    out_buf: Vec<Vec<f32>>,
}

impl RateConverter {
    /// Create a converter from `capture_rate` to `target_rate`, processing
    /// `block` input frames per rubato call.
    ///
    /// # Errors
    /// `SottoError::StreamFault` if rubato fails to initialise.
    pub fn new(capture_rate: u32, target_rate: u32, block: usize) -> Result<Self> {
        if capture_rate == target_rate {
            return Ok(Self {
                resampler: None,
                carry: Vec::new(),
                block,
                out_buf: Vec::new(),
            });
        }

        let ratio = target_rate as f64 / capture_rate as f64;
        let resampler = FastFixedIn::<f32>::new(
            ratio,
            1.0, // fixed ratio — no dynamic adjustment
            PolynomialDegree::Cubic,
            block,
            1, // mono
        )
        .map_err(|e| SottoError::StreamFault(format!("resampler init: {e}")))?;

        let max_out = resampler.output_frames_max();
        tracing::info!(capture_rate, target_rate, block, "resampling enabled");

        Ok(Self {
            resampler: Some(resampler),
            carry: Vec::new(),
            block,
            out_buf: vec![vec![0f32; max_out]; 1],
        })
    }

    /// Feed samples in; returns converted output (possibly empty while a
    /// partial block accumulates). Passthrough mode copies the input.
    pub fn process(&mut self, samples: &[f32]) -> Vec<f32> {
        let Some(ref mut resampler) = self.resampler else {
            return samples.to_vec();
        };

        self.carry.extend_from_slice(samples);

        let mut result = Vec::new();
        while self.carry.len() >= self.block {
            let input = &self.carry[..self.block];
            match resampler.process_into_buffer(&[input], &mut self.out_buf, None) {
                Ok((_consumed, produced)) => {
                    result.extend_from_slice(&self.out_buf[0][..produced]);
                }
                Err(e) => error!("resampler process error: {e}"),
            }
            self.carry.drain(..self.block);
        }
        result
    }

    /// `true` when no rate conversion occurs.
    pub fn is_passthrough(&self) -> bool {
        self.resampler.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passthrough_copies_input() {
        let mut rc = RateConverter::new(16_000, 16_000, 960).unwrap();
        assert!(rc.is_passthrough());
        let samples: Vec<f32> = (0..480).map(|i| i as f32 * 0.001).collect();
        assert_eq!(rc.process(&samples), samples);
    }

    #[test]
    fn ratio_48k_to_16k_output_length() {
        let mut rc = RateConverter::new(48_000, 16_000, 960).unwrap();
        assert!(!rc.is_passthrough());
        let out = rc.process(&vec![0.0f32; 960]);
        // 960 input frames at 48 kHz ≈ 320 output frames at 16 kHz
        assert!(!out.is_empty());
        assert!(
            (out.len() as isize - 320).unsigned_abs() <= 10,
            "output len={} expected≈320",
            out.len()
        );
    }

    #[test]
    fn partial_block_accumulates_across_calls() {
        let mut rc = RateConverter::new(48_000, 16_000, 960).unwrap();
        assert!(rc.process(&vec![0.0f32; 500]).is_empty());
        // 500 + 500 = 1000 ≥ 960 — second call must produce output
        assert!(!rc.process(&vec![0.0f32; 500]).is_empty());
    }
}
