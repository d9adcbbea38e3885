//! Change-tracked value cells.
//!
//! A [`Variable`] is the unit of change tracking: every column of every
//! tracked object is backed by one. It distinguishes "never assigned" from
//! SQL NULL via the tri-state [`VarValue`], and it remembers a checkpointed
//! baseline so the flush machinery can ask "has this cell changed since the
//! last flush?".

use crate::error::{Error, Result, TypeError};
use crate::value::Value;

/// Column type used for coercion when a value enters a [`Variable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    Bool,
    Int,
    Float,
    Text,
    Bytes,
    Json,
}

impl SqlType {
    /// SQL-ish name of this type, for error messages.
    pub const fn name(&self) -> &'static str {
        match self {
            SqlType::Bool => "BOOLEAN",
            SqlType::Int => "BIGINT",
            SqlType::Float => "DOUBLE",
            SqlType::Text => "TEXT",
            SqlType::Bytes => "BLOB",
            SqlType::Json => "JSON",
        }
    }

    /// Coerce a raw value into this column type.
    ///
    /// Application-origin values must match the column type apart from safe
    /// widenings. Driver-origin values (`lenient`) additionally accept the
    /// narrowings a database may hand back, such as integral floats for an
    /// integer column.
    pub fn coerce(&self, value: Value, lenient: bool) -> Result<Value> {
        match (self, value) {
            (SqlType::Bool, Value::Bool(b)) => Ok(Value::Bool(b)),
            (SqlType::Bool, Value::Int(i)) if lenient => Ok(Value::Bool(i != 0)),
            (SqlType::Int, Value::Int(i)) => Ok(Value::Int(i)),
            (SqlType::Int, Value::Bool(b)) => Ok(Value::Int(i64::from(b))),
            (SqlType::Int, Value::Float(f)) if lenient && f.fract() == 0.0 => {
                Ok(Value::Int(f as i64))
            }
            (SqlType::Float, Value::Float(f)) => Ok(Value::Float(f)),
            (SqlType::Float, Value::Int(i)) => Ok(Value::Float(i as f64)),
            (SqlType::Text, Value::Text(s)) => Ok(Value::Text(s)),
            (SqlType::Bytes, Value::Bytes(b)) => Ok(Value::Bytes(b)),
            (SqlType::Json, Value::Json(j)) => Ok(Value::Json(j)),
            (_, other) => Err(Error::Type(TypeError {
                expected: self.name().to_string(),
                found: other.type_name().to_string(),
                column: None,
            })),
        }
    }
}

/// Tri-state contents of a [`Variable`]: never assigned, SQL NULL, or a value.
#[derive(Debug, Clone, PartialEq)]
pub enum VarValue {
    /// No value has been assigned yet.
    Unset,
    /// Explicit SQL NULL.
    Null,
    /// A concrete value.
    Val(Value),
}

impl VarValue {
    /// Whether a value (including NULL) has been assigned.
    pub const fn is_defined(&self) -> bool {
        !matches!(self, VarValue::Unset)
    }

    /// Whether this is an explicit NULL.
    pub const fn is_null(&self) -> bool {
        matches!(self, VarValue::Null)
    }

    /// Lift a driver value: `Value::Null` becomes [`VarValue::Null`].
    pub fn from_db_value(value: Value) -> Self {
        match value {
            Value::Null => VarValue::Null,
            other => VarValue::Val(other),
        }
    }

    /// Lower to a driver value; `Unset` has no wire representation.
    pub fn to_db_value(&self) -> Option<Value> {
        match self {
            VarValue::Unset => None,
            VarValue::Null => Some(Value::Null),
            VarValue::Val(v) => Some(v.clone()),
        }
    }
}

impl From<Value> for VarValue {
    fn from(value: Value) -> Self {
        VarValue::from_db_value(value)
    }
}

/// A typed, change-tracked value cell.
///
/// `has_changed` compares the current value against the baseline recorded by
/// the last `checkpoint`. A fresh variable starts unset with an unset
/// baseline, so it reports unchanged until something is assigned.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    ty: SqlType,
    value: VarValue,
    baseline: VarValue,
}

impl Variable {
    /// Create an unset variable of the given column type.
    pub fn new(ty: SqlType) -> Self {
        Self {
            ty,
            value: VarValue::Unset,
            baseline: VarValue::Unset,
        }
    }

    /// Create a variable holding `value`, coerced for this type.
    pub fn with_value(ty: SqlType, value: VarValue, from_db: bool) -> Result<Self> {
        let mut var = Self::new(ty);
        var.set(value, from_db)?;
        Ok(var)
    }

    /// The column type this variable coerces to.
    pub const fn ty(&self) -> SqlType {
        self.ty
    }

    /// Current contents.
    pub fn get(&self) -> VarValue {
        self.value.clone()
    }

    /// Assign new contents, coercing concrete values through the column type.
    ///
    /// `from_db` marks driver-origin values: they take the lenient coercion
    /// path and become the new change-tracking baseline, so freshly loaded
    /// state does not read as a pending change. Returns the previous
    /// contents.
    pub fn set(&mut self, value: VarValue, from_db: bool) -> Result<VarValue> {
        let coerced = match value {
            VarValue::Val(v) => VarValue::Val(self.ty.coerce(v, from_db)?),
            other => other,
        };
        if from_db {
            self.baseline = coerced.clone();
        }
        Ok(std::mem::replace(&mut self.value, coerced))
    }

    /// Whether anything (including NULL) has been assigned.
    pub fn is_defined(&self) -> bool {
        self.value.is_defined()
    }

    /// Whether the contents differ from the checkpointed baseline.
    pub fn has_changed(&self) -> bool {
        self.value != self.baseline
    }

    /// Record the current contents as the new change-tracking baseline.
    pub fn checkpoint(&mut self) {
        self.baseline = self.value.clone();
    }

    /// A value-equal snapshot; mutating the original does not affect it.
    pub fn copy(&self) -> Variable {
        self.clone()
    }
}
