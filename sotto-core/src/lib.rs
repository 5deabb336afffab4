//! # sotto-core
//!
//! Reusable hands-free dictation segmentation SDK.
//!
//! ## Architecture
//!
//! ```text
//! Microphone → AudioCapture → SPSC RingBuffer → segment loop (own thread)
//!                                                    │
//!                                          RMS gate → flush policy
//!                                                    │
//!                                               Utterance
//!                                                    │
//!                                      worker thread → UtteranceSink
//!
//! Event tap → listener thread → gesture state machine → worker → toggle
//! ```
//!
//! The audio callback is zero-alloc and lock-free. All heap work happens on
//! the segment loop thread; utterance delivery and gesture activations run on
//! ephemeral worker threads so neither producer path ever blocks on consumer
//! code.

#![deny(unsafe_code)]
#![warn(clippy::all)]

pub mod audio;
pub mod buffering;
mod dispatch;
pub mod error;
pub mod events;
pub mod gesture;
pub mod segmenter;
pub mod session;
pub mod vad;

// Convenience re-exports for downstream crates
pub use buffering::chunk::{AudioChunk, Utterance};
pub use error::{Result, SottoError};
pub use events::{ActivityEvent, SegmenterStatus, StatusEvent};
pub use gesture::combo::ComboGesture;
pub use gesture::double_tap::DoubleTapGesture;
pub use gesture::source::{EventSource, InputEvent};
pub use segmenter::{Segmenter, SegmenterConfig, UtteranceSink};
pub use session::{GestureBinding, SessionConfig, SessionController};

#[cfg(target_os = "macos")]
pub use gesture::quartz::QuartzEventSource;
