use thiserror::Error;

#[derive(Error, Debug)]
pub enum RecorderError {
    #[error("Input listener error: {0}")]
    ListenerError(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Capture error: {0}")]
    CaptureError(String),

    #[error("Save error: {0}")]
    SaveError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Automation(#[from] deskpilot::AutomationError),
}

pub type Result<T> = std::result::Result<T, RecorderError>;
