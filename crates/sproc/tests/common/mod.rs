//! Common test utilities and mocks

use async_trait::async_trait;
use parking_lot::Mutex;
use sproc::{
    BufferedCursor, ColumnMeta, FieldBinding, ProcConnection, ProcParameter, Result, ResultCursor,
    ResultSetBuffer, Row, RowTarget, SprocError, Value,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Mock connection for exercising executor and reader logic without a
/// database.
///
/// Tracks open/close state, records every call in order, and serves
/// configurable result sets. Failure injection covers the open, execute,
/// and close steps; an execute delay makes timeout and cancellation races
/// deterministic under paused test time.
pub struct MockProcConnection {
    driver: String,
    open: AtomicBool,
    fail_on_open: bool,
    fail_on_execute: bool,
    fail_on_close: bool,
    execute_delay: Option<Duration>,
    default_schema: Option<String>,
    result_sets: Mutex<Vec<ResultSetBuffer>>,
    affected_rows: u64,
    call_log: Mutex<Vec<String>>,
}

impl MockProcConnection {
    pub fn new() -> Self {
        Self {
            driver: "mock".to_string(),
            open: AtomicBool::new(false),
            fail_on_open: false,
            fail_on_execute: false,
            fail_on_close: false,
            execute_delay: None,
            default_schema: None,
            result_sets: Mutex::new(Vec::new()),
            affected_rows: 0,
            call_log: Mutex::new(Vec::new()),
        }
    }

    /// Start in the Open state, as if the caller had opened it
    pub fn opened(self) -> Self {
        self.open.store(true, Ordering::SeqCst);
        self
    }

    pub fn with_default_schema(mut self, schema: &str) -> Self {
        self.default_schema = Some(schema.to_string());
        self
    }

    pub fn with_result_set(self, set: ResultSetBuffer) -> Self {
        self.result_sets.lock().push(set);
        self
    }

    pub fn with_failure_on_open(mut self) -> Self {
        self.fail_on_open = true;
        self
    }

    pub fn with_failure_on_execute(mut self) -> Self {
        self.fail_on_execute = true;
        self
    }

    pub fn with_failure_on_close(mut self) -> Self {
        self.fail_on_close = true;
        self
    }

    pub fn with_execute_delay(mut self, delay: Duration) -> Self {
        self.execute_delay = Some(delay);
        self
    }

    pub fn with_affected_rows(mut self, affected_rows: u64) -> Self {
        self.affected_rows = affected_rows;
        self
    }

    pub fn call_log(&self) -> Vec<String> {
        self.call_log.lock().clone()
    }

    fn ensure_open(&self) -> Result<()> {
        if !self.is_open() {
            return Err(SprocError::Connection("connection is closed".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ProcConnection for MockProcConnection {
    fn driver_name(&self) -> &str {
        &self.driver
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn open(&self) -> Result<()> {
        self.call_log.lock().push("open".to_string());
        if self.fail_on_open {
            return Err(SprocError::Connection("open failed".to_string()));
        }
        self.open.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.call_log.lock().push("close".to_string());
        if self.fail_on_close {
            return Err(SprocError::Connection("close failed".to_string()));
        }
        self.open.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn default_schema(&self) -> Option<String> {
        self.default_schema.clone()
    }

    async fn execute_reader(
        &self,
        procedure: &str,
        _parameters: &[ProcParameter],
    ) -> Result<Box<dyn ResultCursor>> {
        self.call_log
            .lock()
            .push(format!("execute_reader {}", procedure));
        self.ensure_open()?;
        if let Some(delay) = self.execute_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_on_execute {
            return Err(SprocError::Execution("execute failed".to_string()));
        }
        Ok(Box::new(BufferedCursor::new(self.result_sets.lock().clone())))
    }

    async fn execute(&self, procedure: &str, _parameters: &[ProcParameter]) -> Result<u64> {
        self.call_log.lock().push(format!("execute {}", procedure));
        self.ensure_open()?;
        if let Some(delay) = self.execute_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_on_execute {
            return Err(SprocError::Execution("execute failed".to_string()));
        }
        Ok(self.affected_rows)
    }
}

/// Build a materialized result set from column names and row data
pub fn result_set(columns: &[&str], rows: Vec<Vec<Value>>) -> ResultSetBuffer {
    let metas = columns
        .iter()
        .enumerate()
        .map(|(i, name)| ColumnMeta::named(name, i))
        .collect();
    let rows = rows
        .into_iter()
        .map(|values| {
            Row::new(columns.iter().map(|s| s.to_string()).collect(), values)
        })
        .collect();
    ResultSetBuffer::new(metas, rows)
}

/// The canonical two-user result set: id, name, and a status column no
/// target record maps
pub fn users_result_set() -> ResultSetBuffer {
    result_set(
        &["id", "name", "status"],
        vec![
            vec![
                Value::Int32(1),
                Value::String("Ann".to_string()),
                Value::String("active".to_string()),
            ],
            vec![
                Value::Int32(2),
                Value::String("Bo".to_string()),
                Value::String("active".to_string()),
            ],
        ],
    )
}

/// Target record for the users result set
#[derive(Debug, Default, PartialEq)]
pub struct User {
    pub id: i32,
    pub name: String,
}

impl RowTarget for User {
    fn field_bindings() -> &'static [FieldBinding<Self>] {
        const BINDINGS: &[FieldBinding<User>] = &[
            FieldBinding::new("id", |user, value| {
                user.id = value.as_i64().unwrap_or_default() as i32;
            }),
            FieldBinding::new("name", |user, value| {
                if let Value::String(name) = value {
                    user.name = name;
                }
            }),
        ];
        BINDINGS
    }
}
