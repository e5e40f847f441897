//! MS SQL Server driver for sproc
//!
//! Implements the `ProcConnection` seam over the tiberius TDS client.
//! Stored procedures are invoked through rendered `EXEC` statements with
//! positionally bound parameters, and responses are materialized into
//! forward-only buffered cursors.

mod connection;

#[cfg(test)]
mod connection_tests;

pub use connection::{MssqlConnection, MssqlConnectionError};
