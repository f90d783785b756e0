//! Error types for StateMesh

use thiserror::Error;

/// Result type alias using our Error
pub type Result<T> = std::result::Result<T, Error>;

/// StateMesh error types
#[derive(Debug, Error)]
pub enum Error {
    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] postcard::Error),

    /// Component id outside the closed set
    #[error("unknown component id: {0}")]
    UnknownComponent(u8),
}
