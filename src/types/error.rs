use thiserror::Error;

/// tokenuze error types
#[derive(Error, Debug)]
pub enum TokenuzeError {
    /// Invalid CLI flag or flag combination
    #[error("invalid usage: {0}")]
    InvalidUsage(String),

    /// File I/O error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse a timestamp, session record, or pricing manifest
    #[error("parse error: {0}")]
    Parse(String),

    /// Pricing manifest fetch or cache failure
    #[error("pricing error: {0}")]
    Pricing(String),

    /// Dashboard upload failure
    #[error("upload error: {0}")]
    Upload(String),

    /// Machine-identifier derivation failure
    #[error("machine id error: {0}")]
    MachineId(String),
}

/// Result type alias for tokenuze
pub type Result<T> = std::result::Result<T, TokenuzeError>;
