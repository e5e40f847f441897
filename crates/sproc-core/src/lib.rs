//! Sproc Core - shared types and trait seams for stored procedure invocation
//!
//! This crate provides the vocabulary the executor, reader, and drivers
//! depend on. It defines:
//!
//! - `ProcConnection` / `ResultCursor` - capability seams drivers implement
//! - `ProcCommand` / `ProcParameter` - the single-use command model
//! - `RowTarget` / `FromValue` - typed row and scalar mapping
//! - Common types like `Value`, `Row`, `ColumnMeta`, and the error taxonomy

mod command;
mod config;
mod connection;
mod cursor;
mod error;
mod target;
mod types;

pub use command::*;
pub use config::*;
pub use connection::*;
pub use cursor::*;
pub use error::*;
pub use target::*;
pub use types::*;
