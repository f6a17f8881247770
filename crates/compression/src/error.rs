use thiserror::Error;

/// Errors produced by compression routines.
#[derive(Debug, Error)]
pub enum CompressionError {
    /// Codec-specific failure without an underlying IO error.
    #[error("codec error in {algorithm}: {message}")]
    Codec {
        algorithm: &'static str,
        message: String,
    },

    /// Compression backend produced an IO error.
    #[error("io error while using {algorithm}: {source}")]
    Io {
        algorithm: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// Caller requested an unrecognised compression mode.
    #[error("invalid compression mode: {reason}")]
    InvalidMode { reason: String },
}

impl CompressionError {
    pub fn codec(algorithm: &'static str, message: impl Into<String>) -> Self {
        CompressionError::Codec {
            algorithm,
            message: message.into(),
        }
    }

    pub fn io(algorithm: &'static str, source: std::io::Error) -> Self {
        CompressionError::Io { algorithm, source }
    }

    pub fn invalid_mode(reason: impl Into<String>) -> Self {
        CompressionError::InvalidMode {
            reason: reason.into(),
        }
    }
}
