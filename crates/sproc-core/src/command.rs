//! Stored procedure command model and builder

use crate::{ProcConnection, Result, SprocError, Value};
use std::sync::Arc;
use std::time::Duration;

/// Timeout applied to commands that do not override it
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// How a command's target text is interpreted by the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    /// The target is the name of a stored procedure
    StoredProcedure,
    /// The target is a raw SQL batch
    Text,
}

/// Dataflow direction of a procedure parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParamDirection {
    /// Value flows into the procedure
    #[default]
    Input,
    /// Value flows out of the procedure
    Output,
    /// Value flows both ways
    InputOutput,
    /// The procedure's return value
    ReturnValue,
}

/// A single parameter attached to a [`ProcCommand`].
///
/// Name uniqueness is not validated here; duplicate names are delegated to
/// the underlying client.
#[derive(Debug, Clone)]
pub struct ProcParameter {
    /// Parameter name, stored without a provider `@` prefix
    pub name: String,
    /// Bound value; [`Value::Null`] when none was supplied
    pub value: Value,
    /// Dataflow direction, passed through to the driver
    pub direction: ParamDirection,
    /// Numeric precision hint, passed through to the driver
    pub precision: Option<u8>,
    /// Numeric scale hint, passed through to the driver
    pub scale: Option<u8>,
    /// Provider-specific type name hint
    pub type_name: Option<String>,
}

impl ProcParameter {
    /// Create an input parameter. `Option` values bind `None` as SQL NULL.
    pub fn new(name: &str, value: impl Into<Value>) -> Self {
        Self {
            name: name.trim_start_matches('@').to_string(),
            value: value.into(),
            direction: ParamDirection::default(),
            precision: None,
            scale: None,
            type_name: None,
        }
    }
}

/// A single-use callable command bound to a stored procedure.
///
/// Built by [`prepare`](ProcCommand::prepare), consumed by value by the
/// executor; move semantics rule out reuse after execution.
pub struct ProcCommand {
    /// Connection the command will run on
    pub connection: Arc<dyn ProcConnection>,
    /// Target procedure name, optionally schema-qualified
    pub procedure: String,
    /// Target interpretation; parameters attach only to stored procedures
    pub kind: CommandKind,
    /// Upper bound on the execute step; [`Duration::ZERO`] disables it
    pub timeout: Duration,
    /// Attached parameters, in insertion order
    pub parameters: Vec<ProcParameter>,
}

impl ProcCommand {
    /// An unprepared command for manual assembly.
    ///
    /// [`prepare`](Self::prepare) is the usual entry point; attaching
    /// parameters before a procedure name is set fails with
    /// [`SprocError::InvalidCommand`].
    pub fn new(connection: Arc<dyn ProcConnection>) -> Self {
        Self {
            connection,
            procedure: String::new(),
            kind: CommandKind::StoredProcedure,
            timeout: DEFAULT_COMMAND_TIMEOUT,
            parameters: Vec::new(),
        }
    }

    /// Bind a callable command to `procedure`.
    ///
    /// When `qualify_with_default_schema` is set and the connection reports
    /// a non-blank default schema, the target becomes `"{schema}.{name}"`;
    /// otherwise the name is used verbatim. No I/O is performed.
    pub fn prepare(
        connection: Arc<dyn ProcConnection>,
        procedure: &str,
        qualify_with_default_schema: bool,
    ) -> Self {
        let target = if qualify_with_default_schema {
            match connection.default_schema() {
                Some(schema) if !schema.trim().is_empty() => {
                    format!("{}.{}", schema, procedure)
                }
                _ => procedure.to_string(),
            }
        } else {
            procedure.to_string()
        };

        let mut command = Self::new(connection);
        command.procedure = target;
        command
    }

    /// Override the default 30-second command timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Attach a named input parameter
    pub fn param(self, name: &str, value: impl Into<Value>) -> Result<Self> {
        self.raw_param(ProcParameter::new(name, value))
    }

    /// Attach a parameter, running `configure` on it before attachment to
    /// set direction, precision, or a provider type
    pub fn param_with(
        self,
        name: &str,
        value: impl Into<Value>,
        configure: impl FnOnce(&mut ProcParameter),
    ) -> Result<Self> {
        let mut parameter = ProcParameter::new(name, value);
        configure(&mut parameter);
        self.raw_param(parameter)
    }

    /// Attach a parameter with no bound value, for output-only or
    /// type-only declarations; `configure` is expected to set direction or
    /// type information
    pub fn declared_param(
        self,
        name: &str,
        configure: impl FnOnce(&mut ProcParameter),
    ) -> Result<Self> {
        let mut parameter = ProcParameter::new(name, Value::Null);
        configure(&mut parameter);
        self.raw_param(parameter)
    }

    /// Attach a fully caller-constructed parameter verbatim
    pub fn raw_param(mut self, parameter: ProcParameter) -> Result<Self> {
        self.ensure_prepared()?;
        self.parameters.push(parameter);
        Ok(self)
    }

    fn ensure_prepared(&self) -> Result<()> {
        if self.procedure.trim().is_empty() {
            return Err(SprocError::InvalidCommand(
                "no procedure has been prepared on this command".to_string(),
            ));
        }
        if self.kind != CommandKind::StoredProcedure {
            return Err(SprocError::InvalidCommand(
                "parameters can only be attached to a stored procedure command".to_string(),
            ));
        }
        Ok(())
    }
}

impl std::fmt::Debug for ProcCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcCommand")
            .field("procedure", &self.procedure)
            .field("kind", &self.kind)
            .field("timeout", &self.timeout)
            .field("parameters", &self.parameters.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BufferedCursor, ResultCursor};
    use async_trait::async_trait;

    struct StubConnection {
        schema: Option<String>,
    }

    #[async_trait]
    impl ProcConnection for StubConnection {
        fn driver_name(&self) -> &str {
            "stub"
        }

        fn is_open(&self) -> bool {
            false
        }

        async fn open(&self) -> Result<()> {
            Ok(())
        }

        async fn close(&self) -> Result<()> {
            Ok(())
        }

        fn default_schema(&self) -> Option<String> {
            self.schema.clone()
        }

        async fn execute_reader(
            &self,
            _procedure: &str,
            _parameters: &[ProcParameter],
        ) -> Result<Box<dyn ResultCursor>> {
            Ok(Box::new(BufferedCursor::default()))
        }

        async fn execute(&self, _procedure: &str, _parameters: &[ProcParameter]) -> Result<u64> {
            Ok(0)
        }
    }

    fn stub(schema: Option<&str>) -> Arc<dyn ProcConnection> {
        Arc::new(StubConnection {
            schema: schema.map(String::from),
        })
    }

    #[test]
    fn test_prepare_qualifies_with_default_schema() {
        let command = ProcCommand::prepare(stub(Some("dbo")), "GetUsersByStatus", true);
        assert_eq!(command.procedure, "dbo.GetUsersByStatus");
        assert_eq!(command.kind, CommandKind::StoredProcedure);
    }

    #[test]
    fn test_prepare_uses_name_verbatim_without_qualification() {
        let command = ProcCommand::prepare(stub(Some("dbo")), "GetUsersByStatus", false);
        assert_eq!(command.procedure, "GetUsersByStatus");
    }

    #[test]
    fn test_prepare_ignores_blank_default_schema() {
        let command = ProcCommand::prepare(stub(Some("   ")), "GetUsersByStatus", true);
        assert_eq!(command.procedure, "GetUsersByStatus");

        let command = ProcCommand::prepare(stub(None), "GetUsersByStatus", true);
        assert_eq!(command.procedure, "GetUsersByStatus");
    }

    #[test]
    fn test_prepare_defaults_timeout_to_thirty_seconds() {
        let command = ProcCommand::prepare(stub(None), "CountOrders", false);
        assert_eq!(command.timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_timeout_override() {
        let command =
            ProcCommand::prepare(stub(None), "CountOrders", false).timeout(Duration::from_secs(5));
        assert_eq!(command.timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_param_before_prepare_is_rejected() {
        let err = ProcCommand::new(stub(None))
            .param("status", "active")
            .unwrap_err();
        assert!(matches!(err, SprocError::InvalidCommand(_)));
    }

    #[test]
    fn test_param_rejects_text_command() {
        let mut command = ProcCommand::prepare(stub(None), "SELECT 1", false);
        command.kind = CommandKind::Text;
        let err = command.param("status", "active").unwrap_err();
        assert!(matches!(err, SprocError::InvalidCommand(_)));
    }

    #[test]
    fn test_param_substitutes_null_for_absent_value() {
        let command = ProcCommand::prepare(stub(None), "GetUsersByStatus", false)
            .param("status", Option::<String>::None)
            .unwrap();
        assert_eq!(command.parameters[0].value, Value::Null);
    }

    #[test]
    fn test_param_with_runs_configuration_before_attachment() {
        let command = ProcCommand::prepare(stub(None), "AdjustBalance", false)
            .param_with("amount", Value::Decimal("12.50".to_string()), |p| {
                p.precision = Some(18);
                p.scale = Some(2);
            })
            .unwrap();
        let parameter = &command.parameters[0];
        assert_eq!(parameter.precision, Some(18));
        assert_eq!(parameter.scale, Some(2));
    }

    #[test]
    fn test_declared_param_has_no_value() {
        let command = ProcCommand::prepare(stub(None), "CreateOrder", false)
            .declared_param("order_id", |p| p.direction = ParamDirection::Output)
            .unwrap();
        let parameter = &command.parameters[0];
        assert_eq!(parameter.value, Value::Null);
        assert_eq!(parameter.direction, ParamDirection::Output);
    }

    #[test]
    fn test_raw_param_attaches_verbatim() {
        let mut prebuilt = ProcParameter::new("total", Value::Decimal("99.95".to_string()));
        prebuilt.type_name = Some("money".to_string());

        let command = ProcCommand::prepare(stub(None), "RecordSale", false)
            .raw_param(prebuilt)
            .unwrap();
        assert_eq!(command.parameters[0].type_name, Some("money".to_string()));
    }

    #[test]
    fn test_parameters_keep_insertion_order() {
        let command = ProcCommand::prepare(stub(None), "GetUsersByStatus", false)
            .param("status", "active")
            .unwrap()
            .param("limit", 10i32)
            .unwrap();
        let names: Vec<&str> = command.parameters.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["status", "limit"]);
    }

    #[test]
    fn test_parameter_name_strips_at_prefix() {
        let parameter = ProcParameter::new("@status", "active");
        assert_eq!(parameter.name, "status");
    }
}
