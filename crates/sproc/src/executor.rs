//! Command execution with managed connection lifecycle

use crate::ProcReader;
use sproc_core::{ProcCommand, ProcConnection, Result, SprocError};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Runs prepared commands against their connection.
///
/// The executor owns one execution from open to close. When
/// `manage_connection` is true it opens the connection if closed and closes
/// it again on every exit path; when false the connection state is never
/// touched. The command is consumed by value, so it cannot be executed
/// twice.
pub struct ProcExecutor;

impl ProcExecutor {
    /// Create a new executor
    pub fn new() -> Self {
        Self
    }

    /// Execute a command and hand the live results to `handle_results`.
    ///
    /// The handler runs synchronously with a [`ProcReader`] over the
    /// execution's cursor; all result consumption must happen inside it,
    /// since reader and cursor are gone once it returns. Open, execute, and
    /// handler failures propagate unchanged after cleanup has run.
    #[tracing::instrument(skip(self, command, handle_results), fields(procedure = %command.procedure))]
    pub async fn execute<R, F>(
        &self,
        command: ProcCommand,
        handle_results: F,
        manage_connection: bool,
    ) -> Result<R>
    where
        F: FnOnce(&mut ProcReader) -> Result<R>,
    {
        self.run_reader(command, handle_results, manage_connection, None)
            .await
    }

    /// Like [`execute`](Self::execute), racing `cancel` against the open
    /// and execute steps. A token that fires first surfaces
    /// [`SprocError::Cancelled`]; cleanup still runs. Once the handler has
    /// started it is not interrupted.
    #[tracing::instrument(skip(self, command, handle_results, cancel), fields(procedure = %command.procedure))]
    pub async fn execute_with_cancel<R, F>(
        &self,
        command: ProcCommand,
        handle_results: F,
        manage_connection: bool,
        cancel: &CancellationToken,
    ) -> Result<R>
    where
        F: FnOnce(&mut ProcReader) -> Result<R>,
    {
        self.run_reader(command, handle_results, manage_connection, Some(cancel))
            .await
    }

    /// Execute a command that produces no readable result set, returning
    /// the server-reported affected-row count. Open and close are both
    /// gated on `manage_connection`.
    #[tracing::instrument(skip(self, command), fields(procedure = %command.procedure))]
    pub async fn execute_non_query(
        &self,
        command: ProcCommand,
        manage_connection: bool,
    ) -> Result<u64> {
        self.run_non_query(command, manage_connection, None).await
    }

    /// Like [`execute_non_query`](Self::execute_non_query), racing `cancel`
    /// against the open and execute steps
    #[tracing::instrument(skip(self, command, cancel), fields(procedure = %command.procedure))]
    pub async fn execute_non_query_with_cancel(
        &self,
        command: ProcCommand,
        manage_connection: bool,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        self.run_non_query(command, manage_connection, Some(cancel))
            .await
    }

    async fn run_reader<R, F>(
        &self,
        command: ProcCommand,
        handle_results: F,
        manage_connection: bool,
        cancel: Option<&CancellationToken>,
    ) -> Result<R>
    where
        F: FnOnce(&mut ProcReader) -> Result<R>,
    {
        let connection = Arc::clone(&command.connection);

        let outcome: Result<R> = async {
            Self::open_if_managed(&*connection, manage_connection, cancel).await?;
            let cursor = guarded(
                cancel,
                timed(
                    command.timeout,
                    connection.execute_reader(&command.procedure, &command.parameters),
                ),
            )
            .await?;
            let mut reader = ProcReader::new(cursor);
            handle_results(&mut reader)
        }
        .await;

        Self::finish(&*connection, manage_connection, outcome).await
    }

    async fn run_non_query(
        &self,
        command: ProcCommand,
        manage_connection: bool,
        cancel: Option<&CancellationToken>,
    ) -> Result<u64> {
        let connection = Arc::clone(&command.connection);

        let outcome: Result<u64> = async {
            Self::open_if_managed(&*connection, manage_connection, cancel).await?;
            let affected = guarded(
                cancel,
                timed(
                    command.timeout,
                    connection.execute(&command.procedure, &command.parameters),
                ),
            )
            .await?;
            tracing::debug!(affected_rows = affected, "non-query completed");
            Ok(affected)
        }
        .await;

        Self::finish(&*connection, manage_connection, outcome).await
    }

    async fn open_if_managed(
        connection: &dyn ProcConnection,
        manage_connection: bool,
        cancel: Option<&CancellationToken>,
    ) -> Result<()> {
        if manage_connection && !connection.is_open() {
            tracing::debug!("opening managed connection");
            guarded(cancel, connection.open()).await?;
        }
        Ok(())
    }

    /// Cleanup must never replace the error that triggered it.
    async fn finish<R>(
        connection: &dyn ProcConnection,
        manage_connection: bool,
        outcome: Result<R>,
    ) -> Result<R> {
        if manage_connection {
            if let Err(close_err) = connection.close().await {
                match &outcome {
                    Ok(_) => return Err(close_err),
                    Err(original) => {
                        tracing::warn!(
                            error = %close_err,
                            original = %original,
                            "failed to close managed connection after error"
                        );
                    }
                }
            }
        }
        outcome
    }
}

impl Default for ProcExecutor {
    fn default() -> Self {
        Self::new()
    }
}

async fn guarded<T>(
    cancel: Option<&CancellationToken>,
    operation: impl Future<Output = Result<T>>,
) -> Result<T> {
    match cancel {
        Some(token) => tokio::select! {
            biased;
            _ = token.cancelled() => Err(SprocError::Cancelled),
            result = operation => result,
        },
        None => operation.await,
    }
}

async fn timed<T>(timeout: Duration, operation: impl Future<Output = Result<T>>) -> Result<T> {
    if timeout.is_zero() {
        return operation.await;
    }
    match tokio::time::timeout(timeout, operation).await {
        Ok(result) => result,
        Err(_) => Err(SprocError::Timeout(format!(
            "command did not complete within {:?}",
            timeout
        ))),
    }
}
