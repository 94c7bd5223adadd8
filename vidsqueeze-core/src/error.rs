use thiserror::Error;

/// Error taxonomy for the conversion core.
///
/// Only `EncodeAttemptFailed` is recoverable: the controller's retry loop
/// consumes it and advances the attempt ladder. Everything else ends the
/// request as soon as it occurs.
#[derive(Error, Debug)]
pub enum CoreError {
    /// The input file could not be probed. Fatal, no retry.
    #[error("could not read media metadata: {0}")]
    UnreadableMedia(String),

    /// The encoder engine could not be fetched or instantiated. Fatal for
    /// the whole request; the attempt ladder is not consulted.
    #[error("conversion engine failed to load: {0}")]
    EngineLoad(String),

    /// A single encode attempt failed with the underlying cause preserved.
    #[error("encode attempt {attempt} failed: {cause}")]
    EncodeAttemptFailed { attempt: u32, cause: String },

    /// The request was cancelled. Not a failure; no message is surfaced.
    #[error("conversion cancelled")]
    Cancelled,

    /// An engine operation (exec, virtual file access) failed.
    #[error("engine command failed: {0}")]
    EngineFailure(String),

    #[error("invalid conversion options: {0}")]
    InvalidOptions(String),

    #[error("a conversion is already in progress")]
    ConversionInProgress,

    #[error("no file has been selected")]
    NoFileSelected,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for conversion core operations.
pub type CoreResult<T> = std::result::Result<T, CoreError>;
