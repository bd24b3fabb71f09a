use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // Protocol errors
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    #[error("Unsupported key length: {length} bytes (expected 16, 24 or 32)")]
    UnsupportedKey { length: usize },

    #[error("Decrypt failure: {0}")]
    DecryptFailure(String),

    #[error("Account {account} is blacklisted")]
    RejectedAccount { account: String },

    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("Frame too large: {size} bytes (max {max_size})")]
    FrameTooLarge { size: usize, max_size: usize },

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Configuration source error: {0}")]
    Settings(#[from] config::ConfigError),
}

impl Error {
    /// Returns `true` for errors that mean "drop this chunk and keep the
    /// connection open": the panel gets no reply and will retransmit.
    #[must_use]
    pub fn is_chunk_local(&self) -> bool {
        matches!(
            self,
            Error::MalformedFrame(_)
                | Error::UnsupportedKey { .. }
                | Error::DecryptFailure(_)
                | Error::RejectedAccount { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
