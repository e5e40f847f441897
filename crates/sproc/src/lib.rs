//! Sproc - stored procedure invocation without the boilerplate
//!
//! Prepare a command against a connection, attach typed parameters, and
//! let the executor manage the connection lifecycle while the reader maps
//! result rows onto plain Rust records.

mod executor;
mod reader;

pub use executor::ProcExecutor;
pub use reader::ProcReader;

/// Re-export commonly used types from sproc-core
pub use sproc_core::{
    BufferedCursor, ColumnMeta, CommandKind, ConnectionConfig, FieldBinding, FromValue,
    ParamDirection, ProcCommand, ProcConnection, ProcParameter, Result, ResultCursor,
    ResultSetBuffer, Row, RowTarget, SprocError, Value, DEFAULT_COMMAND_TIMEOUT,
};
