//! Event types broadcast to embedding front ends.
//!
//! The segmenter fans these out over `tokio::sync::broadcast` channels — see
//! [`crate::segmenter::Segmenter::subscribe_activity`] and
//! [`crate::segmenter::Segmenter::subscribe_status`]. Field names serialize
//! in camelCase so a JSON IPC boundary can forward them verbatim.

use serde::{Deserialize, Serialize};

/// Emitted once per processed audio chunk while recording.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEvent {
    /// Monotonically increasing event sequence number.
    pub seq: u64,
    /// Root-mean-square level of the chunk in [0.0, 1.0].
    pub rms: f32,
    /// Energy-gate decision for the chunk.
    pub is_speech: bool,
}

/// Emitted when the segmenter lifecycle changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusEvent {
    pub status: SegmenterStatus,
    /// Optional human-readable detail (e.g. a device error message).
    pub detail: Option<String>,
}

/// Current state of the segmenter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmenterStatus {
    /// Created but never started.
    Idle,
    /// Actively capturing and segmenting audio.
    Listening,
    /// Capture stopped; may be restarted.
    Stopped,
    /// The capture stream could not be opened or died mid-session.
    Error,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn activity_event_serializes_with_camel_case_fields() {
        let event = ActivityEvent {
            seq: 3,
            rms: 0.18,
            is_speech: true,
        };

        let json = serde_json::to_value(event).expect("serialize activity event");
        assert_eq!(json["seq"], 3);
        let rms = json["rms"].as_f64().expect("rms should serialize as number");
        assert!((rms - 0.18).abs() < 1e-5);
        assert_eq!(json["isSpeech"], true);

        let round_trip: ActivityEvent =
            serde_json::from_value(json).expect("deserialize activity event");
        assert_eq!(round_trip.seq, 3);
        assert!(round_trip.is_speech);
    }

    #[test]
    fn status_event_serializes_with_lowercase_status() {
        let event = StatusEvent {
            status: SegmenterStatus::Listening,
            detail: Some("default input".into()),
        };

        let json = serde_json::to_value(&event).expect("serialize status event");
        assert_eq!(json["status"], "listening");
        assert_eq!(json["detail"], "default input");

        let round_trip: StatusEvent =
            serde_json::from_value(json).expect("deserialize status event");
        assert_eq!(round_trip.status, SegmenterStatus::Listening);
    }

    #[test]
    fn status_rejects_non_lowercase_values() {
        let err = serde_json::from_str::<SegmenterStatus>(r#""Listening""#);
        assert!(err.is_err(), "expected invalid casing to fail");
    }
}
