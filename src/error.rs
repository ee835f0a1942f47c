//! Error types for blockidx.

use thiserror::Error;

/// Error type for blockidx operations.
#[derive(Error, Debug)]
pub enum Error {
    /// A record's declared lengths run past the end of the batch buffer.
    /// The offset is where the bad record starts.
    #[error("malformed record at byte offset {offset}")]
    MalformedRecord { offset: usize },

    /// Reserved bits of the opcode/control byte were set, or the control
    /// field holds a value outside the known actions.
    #[error("invalid control action value: {0}")]
    InvalidControl(u8),

    /// The opcode field holds a value outside Add/Delete.
    #[error("invalid opcode value: {0}")]
    InvalidOpcode(u8),

    /// IO error (journal open/append/replay).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing error while loading a config file.
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type alias for blockidx operations.
pub type Result<T> = std::result::Result<T, Error>;
