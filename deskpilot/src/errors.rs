use thiserror::Error;

#[derive(Error, Debug)]
pub enum AutomationError {
    #[error("Platform-specific error: {0}")]
    PlatformError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for AutomationError {
    fn from(e: serde_json::Error) -> Self {
        AutomationError::Config(e.to_string())
    }
}

impl From<image::ImageError> for AutomationError {
    fn from(e: image::ImageError) -> Self {
        AutomationError::PlatformError(format!("Image error: {e}"))
    }
}
