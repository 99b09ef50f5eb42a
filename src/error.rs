use std::path::PathBuf;

use thiserror::Error;

/// Errors produced by the codecs and the controller.
#[derive(Debug, Error)]
pub enum Error {
    #[error("input not found or unreadable: {path}")]
    InputNotFound { path: PathBuf },

    #[error("input is empty")]
    EmptyInput,

    #[error("{codec} does not support {operation}")]
    UnsupportedOperation {
        codec: &'static str,
        operation: &'static str,
    },

    #[error("malformed artifact: {0}")]
    MalformedArtifact(String),

    #[error("quality factor {0} is outside 1..=100")]
    QualityOutOfRange(u8),

    /// `position` is the byte offset of the digit in the UTF-8 input.
    #[error("digit symbol {symbol:?} at byte {position} cannot be run-length encoded")]
    DigitSymbol { symbol: char, position: usize },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("unknown codec: {0}")]
    UnknownCodec(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Image(#[from] image::ImageError),
}

impl Error {
    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        Error::MalformedArtifact(msg.into())
    }
}

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
