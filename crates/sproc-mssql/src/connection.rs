//! MS SQL Server connection implementation using tiberius

use async_trait::async_trait;
use sproc_core::{
    BufferedCursor, ColumnMeta, ConnectionConfig, ParamDirection, ProcConnection, ProcParameter,
    Result, ResultCursor, ResultSetBuffer, Row, SprocError, Value,
};
use std::borrow::Cow;
use std::sync::atomic::{AtomicBool, Ordering};
use tiberius::time::{
    Date as TdsDate, DateTime as TdsDateTime, DateTime2, DateTimeOffset, SmallDateTime,
    Time as TdsTime,
};
use tiberius::{AuthMethod, Client, ColumnData, Config, EncryptionLevel, Row as TiberiusRow};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};

/// MS SQL Server connection errors
#[derive(Debug, thiserror::Error)]
pub enum MssqlConnectionError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Connection is closed")]
    ConnectionClosed,

    #[error("Tiberius error: {0}")]
    Tiberius(#[from] tiberius::error::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<MssqlConnectionError> for SprocError {
    fn from(err: MssqlConnectionError) -> Self {
        SprocError::Connection(err.to_string())
    }
}

type TdsClient = Client<Compat<TcpStream>>;

/// MS SQL Server connection using tiberius.
///
/// Constructed in the Closed state; [`open`](ProcConnection::open) performs
/// the TCP and TDS handshake and [`close`](ProcConnection::close) drops the
/// client, so one connection value can cycle through several open/close
/// rounds.
pub struct MssqlConnection {
    config: ConnectionConfig,
    client: Mutex<Option<TdsClient>>,
    open: AtomicBool,
}

impl MssqlConnection {
    /// Create a closed connection from a configuration.
    ///
    /// Recognized `params` keys: `trust_cert` ("true" to trust the server
    /// certificate, for dev/testing) and `default_schema` (procedure
    /// qualification, defaults to `dbo`).
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            client: Mutex::new(None),
            open: AtomicBool::new(false),
        }
    }

    fn tds_config(&self) -> std::result::Result<Config, MssqlConnectionError> {
        let mut config = Config::new();
        config.host(&self.config.host);
        config.port(if self.config.port > 0 {
            self.config.port
        } else {
            1433
        });

        if let Some(database) = &self.config.database {
            config.database(database);
        }

        if self.config.get_string("trust_cert").as_deref() == Some("true") {
            config.trust_cert();
        }

        config.encryption(EncryptionLevel::Required);

        match (&self.config.username, &self.config.password) {
            (Some(user), Some(pass)) => {
                config.authentication(AuthMethod::sql_server(user, pass));
            }
            (Some(user), None) => {
                config.authentication(AuthMethod::sql_server(user, ""));
            }
            (None, _) => {
                return Err(MssqlConnectionError::AuthenticationFailed(
                    "a username is required for SQL Server authentication".to_string(),
                ));
            }
        }

        Ok(config)
    }
}

#[async_trait]
impl ProcConnection for MssqlConnection {
    fn driver_name(&self) -> &str {
        "mssql"
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    #[tracing::instrument(skip(self), fields(host = %self.config.host))]
    async fn open(&self) -> Result<()> {
        let mut guard = self.client.lock().await;
        if guard.is_some() {
            return Ok(());
        }

        tracing::debug!("connecting to MS SQL Server");
        let config = self.tds_config().map_err(SprocError::from)?;

        let tcp = TcpStream::connect(config.get_addr())
            .await
            .map_err(|e| SprocError::Connection(e.to_string()))?;
        tcp.set_nodelay(true)
            .map_err(|e| SprocError::Connection(e.to_string()))?;

        let client = Client::connect(config, tcp.compat_write())
            .await
            .map_err(|e| SprocError::Connection(e.to_string()))?;

        *guard = Some(client);
        self.open.store(true, Ordering::SeqCst);
        tracing::debug!("connected to MS SQL Server");
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let mut guard = self.client.lock().await;
        guard.take();
        self.open.store(false, Ordering::SeqCst);
        tracing::debug!("MS SQL Server connection closed");
        Ok(())
    }

    fn default_schema(&self) -> Option<String> {
        match self.config.get_string("default_schema") {
            Some(schema) if !schema.trim().is_empty() => Some(schema),
            _ => Some("dbo".to_string()),
        }
    }

    #[tracing::instrument(skip(self, parameters))]
    async fn execute_reader(
        &self,
        procedure: &str,
        parameters: &[ProcParameter],
    ) -> Result<Box<dyn ResultCursor>> {
        let start = std::time::Instant::now();
        let mut guard = self.client.lock().await;
        let client = guard.as_mut().ok_or(MssqlConnectionError::ConnectionClosed)?;

        let sql = build_exec_statement(procedure, parameters);
        let tds_params = to_tds_params(parameters);
        let param_refs: Vec<&dyn tiberius::ToSql> = tds_params
            .iter()
            .map(|p| p as &dyn tiberius::ToSql)
            .collect();

        let stream = client.query(&sql, &param_refs[..]).await.map_err(|e| {
            tracing::error!(error = %e, "stored procedure execution failed");
            SprocError::Execution(e.to_string())
        })?;
        let raw_sets = stream
            .into_results()
            .await
            .map_err(|e| SprocError::Execution(e.to_string()))?;

        let sets: Vec<ResultSetBuffer> = raw_sets.into_iter().map(buffer_result_set).collect();
        tracing::debug!(
            result_sets = sets.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "stored procedure executed"
        );
        Ok(Box::new(BufferedCursor::new(sets)))
    }

    #[tracing::instrument(skip(self, parameters))]
    async fn execute(&self, procedure: &str, parameters: &[ProcParameter]) -> Result<u64> {
        let start = std::time::Instant::now();
        let mut guard = self.client.lock().await;
        let client = guard.as_mut().ok_or(MssqlConnectionError::ConnectionClosed)?;

        let sql = build_exec_statement(procedure, parameters);
        let tds_params = to_tds_params(parameters);
        let param_refs: Vec<&dyn tiberius::ToSql> = tds_params
            .iter()
            .map(|p| p as &dyn tiberius::ToSql)
            .collect();

        let exec_result = client.execute(&sql, &param_refs[..]).await.map_err(|e| {
            tracing::error!(error = %e, "stored procedure execution failed");
            SprocError::Execution(e.to_string())
        })?;

        let affected_rows = exec_result.rows_affected().iter().sum::<u64>();
        tracing::debug!(
            affected_rows = affected_rows,
            duration_ms = start.elapsed().as_millis() as u64,
            "stored procedure executed"
        );
        Ok(affected_rows)
    }
}

impl std::fmt::Debug for MssqlConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MssqlConnection")
            .field("host", &self.config.host)
            .field("database", &self.config.database)
            .field("open", &self.is_open())
            .finish()
    }
}

/// Render an `EXEC` statement with bracket-quoted identifiers and one
/// named binding per parameter, placeholders in attachment order.
pub(crate) fn build_exec_statement(procedure: &str, parameters: &[ProcParameter]) -> String {
    let target = procedure
        .split('.')
        .map(quote_identifier)
        .collect::<Vec<_>>()
        .join(".");

    if parameters.is_empty() {
        return format!("EXEC {}", target);
    }

    let bindings = parameters
        .iter()
        .enumerate()
        .map(|(i, parameter)| {
            if parameter.direction != ParamDirection::Input {
                tracing::warn!(
                    parameter = %parameter.name,
                    "non-input parameter directions are not read back; binding as input"
                );
            }
            format!("@{} = @P{}", parameter.name, i + 1)
        })
        .collect::<Vec<_>>()
        .join(", ");

    format!("EXEC {} {}", target, bindings)
}

fn quote_identifier(part: &str) -> String {
    format!("[{}]", part.replace(']', "]]"))
}

/// Materialize one tiberius result set, taking column metadata from the
/// first row. An empty set carries no metadata.
fn buffer_result_set(raw_rows: Vec<TiberiusRow>) -> ResultSetBuffer {
    let columns: Vec<ColumnMeta> = raw_rows
        .first()
        .map(|row| {
            row.columns()
                .iter()
                .enumerate()
                .map(|(ordinal, column)| ColumnMeta {
                    name: column.name().to_string(),
                    data_type: format!("{:?}", column.column_type()),
                    ordinal,
                    nullable: true,
                })
                .collect()
        })
        .unwrap_or_default();
    let names: Vec<String> = columns.iter().map(|c| c.name.clone()).collect();

    let rows: Vec<Row> = raw_rows
        .into_iter()
        .map(|raw_row| {
            let values: Vec<Value> = raw_row.into_iter().map(column_data_to_value).collect();
            Row::new(names.clone(), values)
        })
        .collect();

    ResultSetBuffer::new(columns, rows)
}

/// Convert tiberius ColumnData to a sproc Value
pub(crate) fn column_data_to_value(data: ColumnData<'static>) -> Value {
    let value = match data {
        ColumnData::Bit(v) => v.map(Value::Bool),
        ColumnData::U8(v) => v.map(|n| Value::Int16(n as i16)),
        ColumnData::I16(v) => v.map(Value::Int16),
        ColumnData::I32(v) => v.map(Value::Int32),
        ColumnData::I64(v) => v.map(Value::Int64),
        ColumnData::F32(v) => v.map(Value::Float32),
        ColumnData::F64(v) => v.map(Value::Float64),
        ColumnData::String(v) => v.map(|s| Value::String(s.into_owned())),
        ColumnData::Guid(v) => v.map(Value::Uuid),
        ColumnData::Binary(v) => v.map(|b| Value::Bytes(b.into_owned())),
        ColumnData::Numeric(v) => v.map(|n| Value::Decimal(n.to_string())),
        ColumnData::DateTime(v) => v.map(|dt| Value::DateTime(from_legacy_datetime(dt))),
        ColumnData::SmallDateTime(v) => v.map(|dt| Value::DateTime(from_small_datetime(dt))),
        ColumnData::DateTime2(v) => v.map(|dt| Value::DateTime(from_datetime2(dt))),
        ColumnData::DateTimeOffset(v) => v.map(|dto| Value::DateTimeUtc(from_datetime_offset(dto))),
        ColumnData::Date(v) => v.map(|d| Value::Date(from_tds_date(d))),
        ColumnData::Time(v) => v.map(|t| Value::Time(from_tds_time(t))),
        ColumnData::Xml(v) => v.map(|x| Value::String(x.into_owned().into_string())),
    };
    value.unwrap_or(Value::Null)
}

// datetime/smalldatetime count days from 1900-01-01; date/datetime2 from
// 0001-01-01. Sub-second encodings differ per type: 1/300s fragments for
// datetime, whole minutes for smalldatetime, 100ns increments elsewhere.

fn from_legacy_datetime(dt: TdsDateTime) -> chrono::NaiveDateTime {
    let date = chrono::NaiveDate::from_ymd_opt(1900, 1, 1).unwrap()
        + chrono::Duration::days(dt.days() as i64);
    let seconds = (dt.seconds_fragments() as f64 / 300.0) as u32;
    chrono::NaiveDateTime::new(
        date,
        chrono::NaiveTime::from_num_seconds_from_midnight_opt(seconds, 0).unwrap_or_default(),
    )
}

fn from_small_datetime(dt: SmallDateTime) -> chrono::NaiveDateTime {
    let date = chrono::NaiveDate::from_ymd_opt(1900, 1, 1).unwrap()
        + chrono::Duration::days(dt.days() as i64);
    let seconds = (dt.seconds_fragments() as u32) * 60;
    chrono::NaiveDateTime::new(
        date,
        chrono::NaiveTime::from_num_seconds_from_midnight_opt(seconds, 0).unwrap_or_default(),
    )
}

fn from_datetime2(dt: DateTime2) -> chrono::NaiveDateTime {
    chrono::NaiveDateTime::new(from_tds_date(dt.date()), from_tds_time(dt.time()))
}

fn from_datetime_offset(dto: DateTimeOffset) -> chrono::DateTime<chrono::Utc> {
    let naive = from_datetime2(dto.datetime2());
    chrono::DateTime::<chrono::Utc>::from_naive_utc_and_offset(naive, chrono::Utc)
}

fn from_tds_date(date: TdsDate) -> chrono::NaiveDate {
    chrono::NaiveDate::from_ymd_opt(1, 1, 1).unwrap() + chrono::Duration::days(date.days() as i64)
}

fn from_tds_time(time: TdsTime) -> chrono::NaiveTime {
    let seconds = (time.increments() / 10_000_000) as u32;
    let nanos = ((time.increments() % 10_000_000) * 100) as u32;
    chrono::NaiveTime::from_num_seconds_from_midnight_opt(seconds, nanos).unwrap_or_default()
}

/// Parameter container implementing tiberius's ToSql
#[derive(Debug)]
pub(crate) enum TdsParam {
    Null,
    Bool(bool),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    String(String),
    Bytes(Vec<u8>),
    Uuid(uuid::Uuid),
}

impl tiberius::ToSql for TdsParam {
    fn to_sql(&self) -> ColumnData<'_> {
        match self {
            TdsParam::Null => ColumnData::I32(None),
            TdsParam::Bool(v) => ColumnData::Bit(Some(*v)),
            TdsParam::I16(v) => ColumnData::I16(Some(*v)),
            TdsParam::I32(v) => ColumnData::I32(Some(*v)),
            TdsParam::I64(v) => ColumnData::I64(Some(*v)),
            TdsParam::F32(v) => ColumnData::F32(Some(*v)),
            TdsParam::F64(v) => ColumnData::F64(Some(*v)),
            TdsParam::String(v) => ColumnData::String(Some(Cow::Borrowed(v.as_str()))),
            TdsParam::Bytes(v) => ColumnData::Binary(Some(Cow::Borrowed(v.as_slice()))),
            TdsParam::Uuid(v) => ColumnData::Guid(Some(*v)),
        }
    }
}

/// Convert bound parameter values into tiberius parameters, in order
pub(crate) fn to_tds_params(parameters: &[ProcParameter]) -> Vec<TdsParam> {
    parameters
        .iter()
        .map(|parameter| match &parameter.value {
            Value::Null => TdsParam::Null,
            Value::Bool(b) => TdsParam::Bool(*b),
            Value::Int16(i) => TdsParam::I16(*i),
            Value::Int32(i) => TdsParam::I32(*i),
            Value::Int64(i) => TdsParam::I64(*i),
            Value::Float32(f) => TdsParam::F32(*f),
            Value::Float64(f) => TdsParam::F64(*f),
            Value::Decimal(d) => TdsParam::String(d.clone()),
            Value::String(s) => TdsParam::String(s.clone()),
            Value::Bytes(b) => TdsParam::Bytes(b.clone()),
            Value::Uuid(u) => TdsParam::Uuid(*u),
            Value::Date(d) => TdsParam::String(d.to_string()),
            Value::Time(t) => TdsParam::String(t.to_string()),
            Value::DateTime(dt) => TdsParam::String(dt.to_string()),
            Value::DateTimeUtc(dt) => TdsParam::String(dt.to_string()),
            Value::Json(j) => TdsParam::String(j.to_string()),
        })
        .collect()
}
