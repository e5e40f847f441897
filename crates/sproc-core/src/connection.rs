//! Connection trait for stored procedure invocation

use crate::{ProcParameter, Result, ResultCursor};
use async_trait::async_trait;

/// A database connection capable of invoking stored procedures.
///
/// Implementations own the transport; callers decide open/close ordering.
/// A connection moves between two states, Closed and Open, and reports the
/// current one through [`is_open`](Self::is_open).
#[async_trait]
pub trait ProcConnection: Send + Sync {
    /// Driver identifier (e.g. "mssql")
    fn driver_name(&self) -> &str;

    /// Whether the connection is currently open
    fn is_open(&self) -> bool;

    /// Open the connection. Opening an already-open connection is a no-op.
    async fn open(&self) -> Result<()>;

    /// Close the connection and release the underlying client
    async fn close(&self) -> Result<()>;

    /// Default schema used to qualify procedure names, if the driver has
    /// a notion of one
    fn default_schema(&self) -> Option<String> {
        None
    }

    /// Invoke a stored procedure and return a forward-only cursor over its
    /// result sets
    async fn execute_reader(
        &self,
        procedure: &str,
        parameters: &[ProcParameter],
    ) -> Result<Box<dyn ResultCursor>>;

    /// Invoke a stored procedure that produces no readable result set,
    /// returning the affected-row count reported by the server
    async fn execute(&self, procedure: &str, parameters: &[ProcParameter]) -> Result<u64>;
}
