//! Stored procedure descriptors.
//!
//! Parameters are registered declaratively through [`ProcedureBuilder`];
//! their declaration order is the binding order.

use serde::{Deserialize, Serialize};

use super::schema::SqlType;
use super::value::SqlValue;

/// Direction of a procedure parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamDirection {
    In,
    Out,
    InOut,
}

impl ParamDirection {
    /// Whether a value is bound before execution.
    pub fn is_input(self) -> bool {
        matches!(self, ParamDirection::In | ParamDirection::InOut)
    }

    /// Whether a value is read back after execution.
    pub fn is_output(self) -> bool {
        matches!(self, ParamDirection::Out | ParamDirection::InOut)
    }

    /// Classify a catalog parameter mode (`IN`, `OUT`, `INOUT`, `IN/OUT`).
    pub fn from_catalog(mode: &str) -> Self {
        match mode.trim().to_uppercase().replace(['/', '_', ' '], "").as_str() {
            "OUT" => ParamDirection::Out,
            "INOUT" => ParamDirection::InOut,
            _ => ParamDirection::In,
        }
    }
}

/// What a procedure invocation yields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnFlavor {
    /// Nothing.
    Void,
    /// A single scalar of the procedure's return type.
    Type,
    /// A cursor over a result set.
    ResultSet,
    /// Not known from the catalog.
    Unknown,
}

/// One declared parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcedureParam {
    /// Parameter name (informational; binding is positional).
    pub name: String,
    /// Direction.
    pub direction: ParamDirection,
    /// Semantic type.
    pub sql_type: SqlType,
    /// Current value: bound before execution for inputs, written back for outputs.
    pub value: SqlValue,
}

/// Procedure descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Procedure {
    /// Procedure name, possibly schema-qualified.
    pub name: String,
    /// Parameters in declaration order.
    pub params: Vec<ProcedureParam>,
    /// Return flavor.
    pub returns: ReturnFlavor,
    /// Scalar return type when `returns` is [`ReturnFlavor::Type`].
    pub return_type: Option<SqlType>,
}

impl Procedure {
    /// Start declaring a procedure.
    pub fn builder(name: impl Into<String>) -> ProcedureBuilder {
        ProcedureBuilder {
            procedure: Procedure {
                name: name.into(),
                params: Vec::new(),
                returns: ReturnFlavor::Void,
                return_type: None,
            },
        }
    }

    /// The backend-neutral invocation text.
    ///
    /// `{call NAME(?,?)}`, or `{? = call NAME(?,?)}` when a typed scalar is
    /// returned. One placeholder per declared parameter.
    pub fn call_text(&self) -> String {
        let placeholders = vec!["?"; self.params.len()].join(",");
        let marker = if self.returns == ReturnFlavor::Type {
            "? = "
        } else {
            ""
        };
        format!("{{{}call {}({})}}", marker, self.name, placeholders)
    }

    /// Begin a call that binds values onto this descriptor.
    pub fn bind(&mut self) -> CallBuilder<'_> {
        CallBuilder {
            procedure: self,
            values: Vec::new(),
        }
    }

    /// Value of a parameter by name (after a call, outputs are written back).
    pub fn param_value(&self, name: &str) -> Option<&SqlValue> {
        self.params
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
            .map(|p| &p.value)
    }
}

/// Declarative builder for [`Procedure`].
#[derive(Debug, Clone)]
pub struct ProcedureBuilder {
    procedure: Procedure,
}

impl ProcedureBuilder {
    /// Declare a parameter.
    pub fn param(
        mut self,
        name: impl Into<String>,
        direction: ParamDirection,
        sql_type: SqlType,
    ) -> Self {
        self.procedure.params.push(ProcedureParam {
            name: name.into(),
            direction,
            sql_type,
            value: SqlValue::Null,
        });
        self
    }

    /// Declare an IN parameter.
    pub fn input(self, name: impl Into<String>, sql_type: SqlType) -> Self {
        self.param(name, ParamDirection::In, sql_type)
    }

    /// Declare an OUT parameter.
    pub fn output(self, name: impl Into<String>, sql_type: SqlType) -> Self {
        self.param(name, ParamDirection::Out, sql_type)
    }

    /// Declare an IN_OUT parameter.
    pub fn in_out(self, name: impl Into<String>, sql_type: SqlType) -> Self {
        self.param(name, ParamDirection::InOut, sql_type)
    }

    /// The procedure returns a scalar of `sql_type`.
    pub fn returns(mut self, sql_type: SqlType) -> Self {
        self.procedure.returns = ReturnFlavor::Type;
        self.procedure.return_type = Some(sql_type);
        self
    }

    /// The procedure returns a result set.
    pub fn returns_rows(mut self) -> Self {
        self.procedure.returns = ReturnFlavor::ResultSet;
        self.procedure.return_type = None;
        self
    }

    /// Set the return flavor directly.
    pub fn flavor(mut self, flavor: ReturnFlavor) -> Self {
        self.procedure.returns = flavor;
        self
    }

    /// Finish the declaration.
    pub fn build(self) -> Procedure {
        self.procedure
    }
}

/// Collects argument values for one invocation of its owning procedure.
///
/// Holds an explicit mutable reference to the descriptor so output values
/// land back in it after the call.
#[derive(Debug)]
pub struct CallBuilder<'p> {
    procedure: &'p mut Procedure,
    values: Vec<SqlValue>,
}

impl<'p> CallBuilder<'p> {
    /// Append the next positional value.
    pub fn arg(mut self, value: impl Into<SqlValue>) -> Self {
        self.values.push(value.into());
        self
    }

    /// Append several values.
    pub fn args<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<SqlValue>,
    {
        self.values.extend(values.into_iter().map(Into::into));
        self
    }

    /// Split into the owning descriptor and the collected values.
    pub fn into_parts(self) -> (&'p mut Procedure, Vec<SqlValue>) {
        (self.procedure, self.values)
    }
}
