//! Stored procedure invocation.
//!
//! Slot layout of a prepared call (1-based): when the procedure returns a
//! typed scalar, slot 1 is the return value and parameters start at slot 2;
//! otherwise parameters start at slot 1. Parameters always occupy slots in
//! declaration order.

use tracing::debug;

use crate::core::identifier::validate_procedure_name;
use crate::core::procedure::{Procedure, ReturnFlavor};
use crate::core::schema::SqlType;
use crate::core::traits::{CallHandle, Connection, Cursor};
use crate::core::value::SqlValue;
use crate::error::{DbError, Result};

/// What a procedure call produced. Exactly one per call.
pub enum CallResult {
    /// No return value.
    None,
    /// The typed return value.
    Scalar(SqlValue),
    /// A live cursor over the returned rows.
    Cursor(Box<dyn Cursor>),
}

impl CallResult {
    /// Whether nothing was returned.
    pub fn is_none(&self) -> bool {
        matches!(self, CallResult::None)
    }

    /// The scalar, if one was returned.
    pub fn scalar(&self) -> Option<&SqlValue> {
        match self {
            CallResult::Scalar(v) => Some(v),
            _ => None,
        }
    }

    /// The cursor, if one was returned.
    pub fn into_cursor(self) -> Option<Box<dyn Cursor>> {
        match self {
            CallResult::Cursor(c) => Some(c),
            _ => None,
        }
    }
}

impl std::fmt::Debug for CallResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CallResult::None => write!(f, "None"),
            CallResult::Scalar(v) => f.debug_tuple("Scalar").field(v).finish(),
            CallResult::Cursor(c) => f
                .debug_struct("Cursor")
                .field("columns", &c.columns().len())
                .field("kind", &c.kind())
                .finish(),
        }
    }
}

/// Invoke `procedure` with one value per declared parameter.
///
/// Input values are stored on the descriptor and bound; output values are
/// written back into the descriptor after execution. The call handle is
/// closed on every path; a failure to close is logged and ignored.
pub async fn invoke(
    conn: &mut dyn Connection,
    procedure: &mut Procedure,
    values: Vec<SqlValue>,
) -> Result<CallResult> {
    if values.len() != procedure.params.len() {
        return Err(DbError::ParameterCount {
            procedure: procedure.name.clone(),
            expected: procedure.params.len(),
            actual: values.len(),
        });
    }
    validate_procedure_name(&procedure.name)?;

    let call_text = procedure.call_text();
    debug!("Calling {}", call_text);
    let mut handle = conn.prepare_call(&call_text, procedure.returns).await?;

    let outcome = run(handle.as_mut(), procedure, values).await;

    if let Err(e) = handle.close().await {
        debug!("Closing call handle for {} failed: {}", procedure.name, e);
    }
    outcome
}

async fn run(
    handle: &mut dyn CallHandle,
    procedure: &mut Procedure,
    values: Vec<SqlValue>,
) -> Result<CallResult> {
    let first_param_slot = if procedure.returns == ReturnFlavor::Type {
        let return_type = procedure
            .return_type
            .clone()
            .unwrap_or_else(|| SqlType::Other("unknown".to_string()));
        handle.register_out(1, &return_type)?;
        2
    } else {
        1
    };

    for (i, (param, value)) in procedure.params.iter_mut().zip(values).enumerate() {
        let slot = first_param_slot + i;
        if param.direction.is_input() {
            handle.set(slot, value.clone())?;
        }
        if param.direction.is_output() {
            handle.register_out(slot, &param.sql_type)?;
        }
        param.value = value;
    }

    handle.execute().await?;

    for (i, param) in procedure.params.iter_mut().enumerate() {
        if param.direction.is_output() {
            param.value = handle.get(first_param_slot + i)?;
        }
    }

    match procedure.returns {
        ReturnFlavor::Type => Ok(CallResult::Scalar(handle.get(1)?)),
        ReturnFlavor::ResultSet => handle.take_cursor().map(CallResult::Cursor).ok_or_else(|| {
            DbError::Driver(format!(
                "procedure {} declares a result set but produced no cursor",
                procedure.name
            ))
        }),
        ReturnFlavor::Unknown => Ok(handle
            .take_cursor()
            .map(CallResult::Cursor)
            .unwrap_or(CallResult::None)),
        ReturnFlavor::Void => Ok(CallResult::None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::traits::{Capabilities, Driver};
    use crate::testing::{numbered_rows, MockBackend};

    async fn connect(backend: &MockBackend) -> Box<dyn Connection> {
        backend.driver().connect().await.unwrap()
    }

    #[tokio::test]
    async fn test_typed_return_binds_after_return_slot() {
        let mut backend = MockBackend::new(Capabilities::default());
        backend.call.outputs.insert(1, SqlValue::I32(99));
        backend.call.outputs.insert(4, SqlValue::from("done"));
        let mut conn = connect(&backend).await;

        let mut proc = Procedure::builder("P")
            .input("a", SqlType::Integer)
            .input("b", SqlType::Integer)
            .output("c", SqlType::Varchar)
            .returns(SqlType::Integer)
            .build();
        let values = vec![SqlValue::I32(1), SqlValue::I32(2), SqlValue::Null];

        let result = invoke(conn.as_mut(), &mut proc, values).await.unwrap();
        assert_eq!(result.scalar(), Some(&SqlValue::I32(99)));
        assert_eq!(proc.param_value("c"), Some(&SqlValue::from("done")));
        assert_eq!(proc.param_value("a"), Some(&SqlValue::I32(1)));

        let log = backend.log();
        assert_eq!(log.call_texts, vec!["{? = call P(?,?,?)}"]);
        assert_eq!(log.bound, vec![(2, SqlValue::I32(1)), (3, SqlValue::I32(2))]);
        assert_eq!(log.registered, vec![1, 4]);
        assert_eq!(log.calls_closed, 1);
    }

    #[tokio::test]
    async fn test_void_without_arguments() {
        let backend = MockBackend::new(Capabilities::default());
        let mut conn = connect(&backend).await;
        let mut proc = Procedure::builder("P").build();

        let result = invoke(conn.as_mut(), &mut proc, Vec::new()).await.unwrap();
        assert!(result.is_none());
        assert_eq!(backend.log().call_texts, vec!["{call P()}"]);
    }

    #[tokio::test]
    async fn test_in_out_parameter_bound_and_read_back() {
        let mut backend = MockBackend::new(Capabilities::default());
        backend.call.outputs.insert(1, SqlValue::I64(11));
        let mut conn = connect(&backend).await;
        let mut proc = Procedure::builder("bump").in_out("counter", SqlType::BigInt).build();

        invoke(conn.as_mut(), &mut proc, vec![SqlValue::I64(10)])
            .await
            .unwrap();
        assert_eq!(proc.param_value("counter"), Some(&SqlValue::I64(11)));
        let log = backend.log();
        assert_eq!(log.bound, vec![(1, SqlValue::I64(10))]);
        assert_eq!(log.registered, vec![1]);
    }

    #[tokio::test]
    async fn test_result_set_yields_cursor_only() {
        let mut backend = MockBackend::new(Capabilities::default());
        backend.call.cursor_rows = Some(numbered_rows(3));
        let mut conn = connect(&backend).await;
        let mut proc = Procedure::builder("report")
            .input("day", SqlType::Date)
            .returns_rows()
            .build();

        let result = invoke(conn.as_mut(), &mut proc, vec![SqlValue::Null])
            .await
            .unwrap();
        assert!(result.scalar().is_none());
        let mut cursor = result.into_cursor().unwrap();
        assert_eq!(cursor.fetch(10).await.unwrap(), numbered_rows(3));
    }

    #[tokio::test]
    async fn test_value_count_mismatch_is_rejected_before_prepare() {
        let backend = MockBackend::new(Capabilities::default());
        let mut conn = connect(&backend).await;
        let mut proc = Procedure::builder("P").input("a", SqlType::Integer).build();

        let err = invoke(conn.as_mut(), &mut proc, Vec::new()).await.unwrap_err();
        assert!(matches!(
            err,
            DbError::ParameterCount {
                expected: 1,
                actual: 0,
                ..
            }
        ));
        assert!(backend.log().call_texts.is_empty());
    }

    #[tokio::test]
    async fn test_handle_closed_when_execution_fails() {
        let mut backend = MockBackend::new(Capabilities::default());
        backend.call.fail = true;
        backend.call.fail_close = true;
        let mut conn = connect(&backend).await;
        let mut proc = Procedure::builder("P").build();

        let err = invoke(conn.as_mut(), &mut proc, Vec::new()).await.unwrap_err();
        assert!(err.to_string().contains("procedure raised an exception"));
        assert_eq!(backend.log().calls_closed, 1);
    }
}
