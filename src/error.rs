use thiserror::Error;

pub type Result<T, E = MotionError> = std::result::Result<T, E>;

/// Errors raised by the detection core and its collaborators
#[derive(Debug, Error)]
pub enum MotionError {
    #[error("camera {index} is unavailable")]
    CameraUnavailable {
        index: u32,
        #[source]
        source: nokhwa::NokhwaError,
    },

    #[error("frame source is exhausted")]
    EndOfStream,

    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    #[error("frame is {actual:?} but the model expects {expected:?}")]
    DimensionMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },

    #[error("background model has not been trained")]
    Untrained,

    #[error("detector has been stopped")]
    Stopped,
}
