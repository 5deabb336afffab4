use thiserror::Error;

/// All errors produced by sotto-core.
#[derive(Debug, Error)]
pub enum SottoError {
    #[error("no usable audio input device found")]
    DeviceUnavailable,

    #[error("audio device error: {0}")]
    AudioDevice(String),

    #[error("audio stream fault: {0}")]
    StreamFault(String),

    #[error("input event interception denied — input-monitoring permission missing")]
    PermissionDenied,

    #[error("unsupported modifier key: {0:?}")]
    UnsupportedModifier(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, SottoError>;
