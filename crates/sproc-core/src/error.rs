//! Error types for sproc

use thiserror::Error;

/// Core error type for stored procedure operations
#[derive(Error, Debug)]
pub enum SprocError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("Type conversion error: {0}")]
    TypeConversion(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Cancelled")]
    Cancelled,
}

/// Result type alias for stored procedure operations
pub type Result<T> = std::result::Result<T, SprocError>;
