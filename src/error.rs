//! Error types and handling for FastConvert

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for FastConvert operations
pub type Result<T> = std::result::Result<T, FastConvertError>;

/// Main error type for FastConvert operations
#[derive(Debug, Error)]
pub enum FastConvertError {
    /// Stream or file open, create and copy failures
    #[error("I/O error: {source} (file: {file:?})")]
    IoError {
        #[source]
        source: std::io::Error,
        file: Option<PathBuf>,
    },

    /// Unsupported or corrupt input content
    #[error("Decode error: {message} (file: {file:?})")]
    DecodeError {
        message: String,
        file: Option<PathBuf>,
    },

    /// Derivative could not be created or the encoder rejected the image
    #[error("Encode error: {message} (file: {file:?})")]
    EncodeError {
        message: String,
        file: Option<PathBuf>,
    },

    /// Client supplied an unusable request
    #[error("Bad request: {message}")]
    BadRequest { message: String },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    SerdeError(String),

    /// Task and bookkeeping failures inside the coordinator
    #[error("System error: {message}")]
    SystemError { message: String },

    /// Unit skipped because a sibling in the same batch already failed
    #[error("Conversion cancelled after an earlier failure (index: {index})")]
    Cancelled { index: usize },
}

impl FastConvertError {
    /// Create a new I/O error bound to a file
    pub fn io(source: std::io::Error, file: Option<PathBuf>) -> Self {
        Self::IoError { source, file }
    }

    /// Create a new decode error
    pub fn decode<S: Into<String>>(message: S, file: Option<PathBuf>) -> Self {
        Self::DecodeError {
            message: message.into(),
            file,
        }
    }

    /// Create a new encode error
    pub fn encode<S: Into<String>>(message: S, file: Option<PathBuf>) -> Self {
        Self::EncodeError {
            message: message.into(),
            file,
        }
    }

    /// Create a new bad request error
    pub fn bad_request<S: Into<String>>(message: S) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::ConfigError {
            message: message.into(),
        }
    }

    /// Create a new system error
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::SystemError {
            message: message.into(),
        }
    }

    /// Whether the error was caused by the client rather than the server
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::BadRequest { .. })
    }

    /// Whether this outcome is a cancellation marker rather than a real failure
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Get the associated file path if available
    pub fn file_path(&self) -> Option<&PathBuf> {
        match self {
            Self::IoError { file, .. }
            | Self::DecodeError { file, .. }
            | Self::EncodeError { file, .. } => file.as_ref(),
            _ => None,
        }
    }
}

impl From<std::io::Error> for FastConvertError {
    fn from(err: std::io::Error) -> Self {
        Self::io(err, None)
    }
}

impl From<toml::de::Error> for FastConvertError {
    fn from(err: toml::de::Error) -> Self {
        Self::SerdeError(format!("TOML parsing error: {}", err))
    }
}

impl From<serde_yaml::Error> for FastConvertError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::SerdeError(format!("YAML parsing error: {}", err))
    }
}

/// Error context extension for adding file path information
pub trait ErrorContext<T> {
    /// Add file context to an error
    fn with_file_context(self, file: PathBuf) -> Result<T>;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: Into<FastConvertError>,
{
    fn with_file_context(self, file: PathBuf) -> Result<T> {
        self.map_err(|e| {
            let mut error = e.into();

            match &mut error {
                FastConvertError::IoError { file: f, .. }
                | FastConvertError::DecodeError { file: f, .. }
                | FastConvertError::EncodeError { file: f, .. } => {
                    if f.is_none() {
                        *f = Some(file);
                    }
                }
                _ => {}
            }

            error
        })
    }
}
