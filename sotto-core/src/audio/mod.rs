//! Audio capture via the cpal backend.
//!
//! # Design constraints
//!
//! The cpal input callback runs on an OS audio thread at elevated priority.
//! It **must not**:
//! - Allocate heap memory (beyond a reused scratch buffer)
//! - Block on a mutex or condvar
//! - Perform I/O
//!
//! The callback therefore only downmixes into a pre-grown scratch buffer and
//! writes into an SPSC ring producer whose `push_slice` is wait-free.
//!
//! # Threading note
//!
//! `cpal::Stream` is `!Send` on most platforms (COM on Windows, CoreAudio on
//! macOS). `AudioCapture` must be created and dropped on the same thread; the
//! segmenter does this by opening the device inside its loop thread.

pub mod device;
pub mod resample;

#[cfg(feature = "audio-cpal")]
use cpal::{
    traits::{DeviceTrait, StreamTrait},
    SampleFormat, SampleRate, Stream, StreamConfig,
};

#[cfg(feature = "audio-cpal")]
use crate::buffering::Producer;
use crate::{
    buffering::AudioProducer,
    error::{Result, SottoError},
};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
#[cfg(feature = "audio-cpal")]
use tracing::{error, info, warn};

/// Handle to an active audio capture stream.
///
/// **Not `Send`** — bound to its creation thread on Windows/macOS.
pub struct AudioCapture {
    /// Kept alive so the stream is not dropped prematurely.
    #[cfg(feature = "audio-cpal")]
    _stream: Stream,
    /// Shared flag — set to `false` to make the callback a no-op.
    running: Arc<AtomicBool>,
    /// Actual capture sample rate reported by the device (Hz).
    pub sample_rate: u32,
}

/// Average interleaved f32 frames down to mono, reusing `scratch`.
#[cfg_attr(not(feature = "audio-cpal"), allow(dead_code))]
fn downmix_f32(scratch: &mut Vec<f32>, data: &[f32], channels: usize) {
    let frames = data.len() / channels;
    scratch.resize(frames, 0.0);
    for (frame, out) in scratch.iter_mut().enumerate() {
        let base = frame * channels;
        let sum: f32 = data[base..base + channels].iter().sum();
        *out = sum / channels as f32;
    }
}

/// Convert interleaved i16 frames to mono f32 in [-1.0, 1.0], reusing
/// `scratch`.
#[cfg_attr(not(feature = "audio-cpal"), allow(dead_code))]
fn downmix_i16(scratch: &mut Vec<f32>, data: &[i16], channels: usize) {
    let frames = data.len() / channels;
    scratch.resize(frames, 0.0);
    for (frame, out) in scratch.iter_mut().enumerate() {
        let base = frame * channels;
        let sum: f32 = data[base..base + channels]
            .iter()
            .map(|s| *s as f32 / 32768.0)
            .sum();
        *out = sum / channels as f32;
    }
}

impl AudioCapture {
    /// Open an input device by preferred name, falling back to the default
    /// input device and then the first available device.
    ///
    /// Mono f32 frames at the device's native rate are pushed into
    /// `producer`; the caller is responsible for rate conversion.
    ///
    /// # Errors
    /// `SottoError::DeviceUnavailable` when no input device exists,
    /// `SottoError::AudioDevice` / `SottoError::StreamFault` when the device
    /// or stream cannot be opened.
    #[cfg(feature = "audio-cpal")]
    pub fn open_with_preference(
        mut producer: AudioProducer,
        running: Arc<AtomicBool>,
        preferred_device_name: Option<&str>,
    ) -> Result<Self> {
        use cpal::traits::HostTrait;

        let host = cpal::default_host();
        let mut selected = None;

        if let Some(preferred) = preferred_device_name {
            match host.input_devices() {
                Ok(mut devices) => {
                    selected = devices
                        .find(|d| d.name().map(|n| n == preferred).unwrap_or(false));
                    if selected.is_none() {
                        warn!("preferred input device '{preferred}' not found, falling back");
                    }
                }
                Err(e) => {
                    warn!("failed to list input devices while resolving preference: {e}");
                }
            }
        }

        let device = if let Some(device) = selected {
            device
        } else if let Some(default) = host.default_input_device() {
            default
        } else {
            let mut devices = host
                .input_devices()
                .map_err(|e| SottoError::AudioDevice(e.to_string()))?;
            let fallback = devices.next().ok_or(SottoError::DeviceUnavailable)?;
            warn!("no default input device, falling back to first available input");
            fallback
        };

        info!(
            device = device.name().unwrap_or_default().as_str(),
            "opening input device"
        );

        let supported = device
            .default_input_config()
            .map_err(|e| SottoError::AudioDevice(e.to_string()))?;

        let sample_rate = supported.sample_rate().0;
        let channels = supported.channels();
        info!(sample_rate, channels, "audio config selected");

        let config = StreamConfig {
            channels,
            sample_rate: SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let ch = channels as usize;
        let running_f32 = Arc::clone(&running);
        let running_i16 = Arc::clone(&running);

        let stream = match supported.sample_format() {
            SampleFormat::F32 => {
                let mut scratch: Vec<f32> = Vec::new();
                device.build_input_stream(
                    &config,
                    move |data: &[f32], _info| {
                        if !running_f32.load(Ordering::Relaxed) {
                            return;
                        }
                        let written = if ch == 1 {
                            producer.push_slice(data)
                        } else {
                            downmix_f32(&mut scratch, data, ch);
                            producer.push_slice(&scratch)
                        };
                        let frames = data.len() / ch;
                        if written < frames {
                            warn!("ring buffer full: dropped {} frames", frames - written);
                        }
                    },
                    |err| error!("audio stream error: {err}"),
                    None,
                )
            }

            SampleFormat::I16 => {
                let mut scratch: Vec<f32> = Vec::new();
                device.build_input_stream(
                    &config,
                    move |data: &[i16], _info| {
                        if !running_i16.load(Ordering::Relaxed) {
                            return;
                        }
                        downmix_i16(&mut scratch, data, ch);
                        let written = producer.push_slice(&scratch);
                        if written < scratch.len() {
                            warn!(
                                "ring buffer full: dropped {} frames",
                                scratch.len() - written
                            );
                        }
                    },
                    |err| error!("audio stream error: {err}"),
                    None,
                )
            }

            fmt => {
                return Err(SottoError::StreamFault(format!(
                    "unsupported sample format: {fmt:?}"
                )))
            }
        }
        .map_err(|e| SottoError::StreamFault(e.to_string()))?;

        stream
            .play()
            .map_err(|e| SottoError::StreamFault(e.to_string()))?;

        Ok(Self {
            _stream: stream,
            running,
            sample_rate,
        })
    }

    /// Open the system default microphone.
    #[cfg(feature = "audio-cpal")]
    pub fn open_default(producer: AudioProducer, running: Arc<AtomicBool>) -> Result<Self> {
        Self::open_with_preference(producer, running, None)
    }

    /// Stop: signal the callback to no-op on its next invocation.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }
}

/// Stub when the `audio-cpal` feature is disabled.
#[cfg(not(feature = "audio-cpal"))]
impl AudioCapture {
    pub fn open_with_preference(
        _producer: AudioProducer,
        _running: Arc<AtomicBool>,
        _preferred_device_name: Option<&str>,
    ) -> Result<Self> {
        Err(SottoError::StreamFault(
            "compiled without audio-cpal feature".into(),
        ))
    }

    pub fn open_default(producer: AudioProducer, running: Arc<AtomicBool>) -> Result<Self> {
        Self::open_with_preference(producer, running, None)
    }
}
