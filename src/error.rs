use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum CaptureError {
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Unknown output format: {0}")]
    UnknownFormat(String),

    #[error("Cannot infer output format from {0}; pass an explicit format")]
    FormatNotInferred(PathBuf),

    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Browser launch failed: {0}")]
    BrowserLaunchFailed(String),

    #[error("Chrome error: {0}")]
    ChromeError(String),

    #[error("Page error: {0}")]
    PageError(String),

    #[error("Page host stopped delivering events before capture")]
    EventStreamClosed,

    #[error("Interrupted before the capture completed")]
    Interrupted,

    #[error("Viewport has zero area ({width}x{height})")]
    EmptyViewport { width: u32, height: u32 },

    #[error("Encoding failed: {0}")]
    EncodingFailed(String),

    #[error("Cannot write {path}: {message}")]
    OutputFailed { path: PathBuf, message: String },

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

/// Coarse classification of a [`CaptureError`], used for exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Rejected before any session was created.
    Configuration,
    /// The rendering engine failed to start or to answer.
    Engine,
    /// The single capture attempt failed.
    Capture,
    /// A shutdown signal arrived before capture.
    Interrupted,
}

impl CaptureError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CaptureError::ConfigurationError(_)
            | CaptureError::UnknownFormat(_)
            | CaptureError::FormatNotInferred(_)
            | CaptureError::InvalidHeader(_)
            | CaptureError::InvalidUrl(_) => ErrorKind::Configuration,
            CaptureError::BrowserLaunchFailed(_)
            | CaptureError::ChromeError(_)
            | CaptureError::PageError(_)
            | CaptureError::EventStreamClosed => ErrorKind::Engine,
            CaptureError::Interrupted => ErrorKind::Interrupted,
            _ => ErrorKind::Capture,
        }
    }

    pub fn is_configuration(&self) -> bool {
        self.kind() == ErrorKind::Configuration
    }

    /// Process exit status for this error. Success is always 0.
    pub fn exit_code(&self) -> i32 {
        match self.kind() {
            ErrorKind::Configuration => 2,
            ErrorKind::Engine | ErrorKind::Capture => 1,
            ErrorKind::Interrupted => 130,
        }
    }

    pub(crate) fn output(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        CaptureError::OutputFailed {
            path: path.into(),
            message: err.to_string(),
        }
    }
}

impl From<std::io::Error> for CaptureError {
    fn from(err: std::io::Error) -> Self {
        CaptureError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for CaptureError {
    fn from(err: serde_json::Error) -> Self {
        CaptureError::SerializationError(err.to_string())
    }
}

impl From<image::ImageError> for CaptureError {
    fn from(err: image::ImageError) -> Self {
        CaptureError::EncodingFailed(err.to_string())
    }
}

impl From<url::ParseError> for CaptureError {
    fn from(err: url::ParseError) -> Self {
        CaptureError::InvalidUrl(err.to_string())
    }
}

impl From<chromiumoxide::error::CdpError> for CaptureError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        CaptureError::ChromeError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_errors_exit_with_two() {
        let err = CaptureError::UnknownFormat("webp".to_string());
        assert!(err.is_configuration());
        assert_eq!(err.exit_code(), 2);
        assert_eq!(
            CaptureError::InvalidHeader("x".to_string()).kind(),
            ErrorKind::Configuration
        );
    }

    #[test]
    fn capture_and_engine_errors_exit_with_one() {
        let empty = CaptureError::EmptyViewport {
            width: 0,
            height: 600,
        };
        assert_eq!(empty.kind(), ErrorKind::Capture);
        assert_eq!(empty.exit_code(), 1);

        assert_eq!(CaptureError::EventStreamClosed.kind(), ErrorKind::Engine);
        assert_eq!(CaptureError::EventStreamClosed.exit_code(), 1);
    }

    #[test]
    fn interrupted_exits_with_130() {
        assert_eq!(CaptureError::Interrupted.kind(), ErrorKind::Interrupted);
        assert_eq!(CaptureError::Interrupted.exit_code(), 130);
    }

    #[test]
    fn output_error_names_the_path() {
        let err = CaptureError::output(
            "/nope/shot.png",
            std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        );
        assert!(err.to_string().contains("/nope/shot.png"));
        assert!(err.to_string().contains("missing"));
    }
}
