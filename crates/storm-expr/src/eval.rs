//! In-memory predicate evaluation.
//!
//! Bulk mutation and `cached()` need to decide which already-hydrated objects
//! a where-clause matches without touching the database. [`compile_match`]
//! turns a supported expression into a [`Matcher`] whose `matches` call
//! resolves column names against one candidate object at a time.
//!
//! Only the comparison and boolean subset compiles; anything a driver would
//! have to evaluate (aggregates, ordering wrappers) fails with a compile
//! error, which callers use as the signal to fall back to reloading.

use crate::expr::{BinaryOp, Expr};
use std::cmp::Ordering;
use storm_core::{Error, Result, Value, VarValue};

/// Resolves a column name to its value on the candidate object.
pub type ColumnResolver<'a> = dyn Fn(&str) -> Option<VarValue> + 'a;

/// A compiled in-memory predicate.
pub struct Matcher {
    expr: Expr,
}

impl Matcher {
    /// Evaluate the predicate against one candidate.
    pub fn matches(&self, resolve: &ColumnResolver<'_>) -> Result<bool> {
        Ok(truthy(&eval(&self.expr, resolve)?))
    }
}

/// Compile a where-expression into an in-memory predicate.
pub fn compile_match(expr: &Expr) -> Result<Matcher> {
    validate(expr)?;
    Ok(Matcher { expr: expr.clone() })
}

fn validate(expr: &Expr) -> Result<()> {
    match expr {
        Expr::Column(_) | Expr::Lit(_) => Ok(()),
        Expr::Binary { left, right, .. } => {
            validate(left)?;
            validate(right)
        }
        Expr::Not(inner) | Expr::IsNull(inner) => validate(inner),
        Expr::Asc(_) | Expr::Desc(_) | Expr::Aggregate { .. } => Err(Error::Compile(format!(
            "expression cannot be evaluated in memory: {expr:?}"
        ))),
    }
}

fn eval(expr: &Expr, resolve: &ColumnResolver<'_>) -> Result<VarValue> {
    match expr {
        Expr::Column(column) => resolve(&column.name).ok_or_else(|| {
            Error::Compile(format!("unresolved column in cached match: {}", column.name))
        }),
        Expr::Lit(value) => Ok(VarValue::from_db_value(value.clone())),
        Expr::Binary { op, left, right } => {
            let left = eval(left, resolve)?;
            let right = eval(right, resolve)?;
            let result = match op {
                BinaryOp::Eq => values_equal(&left, &right),
                BinaryOp::Ne => !values_equal(&left, &right),
                BinaryOp::Lt => compare(&left, &right) == Some(Ordering::Less),
                BinaryOp::Le => matches!(
                    compare(&left, &right),
                    Some(Ordering::Less | Ordering::Equal)
                ),
                BinaryOp::Gt => compare(&left, &right) == Some(Ordering::Greater),
                BinaryOp::Ge => matches!(
                    compare(&left, &right),
                    Some(Ordering::Greater | Ordering::Equal)
                ),
                BinaryOp::And => truthy(&left) && truthy(&right),
                BinaryOp::Or => truthy(&left) || truthy(&right),
            };
            Ok(VarValue::Val(Value::Bool(result)))
        }
        Expr::Not(inner) => {
            let value = eval(inner, resolve)?;
            Ok(VarValue::Val(Value::Bool(!truthy(&value))))
        }
        Expr::IsNull(inner) => {
            let value = eval(inner, resolve)?;
            Ok(VarValue::Val(Value::Bool(!value.is_defined() || value.is_null())))
        }
        Expr::Asc(_) | Expr::Desc(_) | Expr::Aggregate { .. } => Err(Error::Compile(format!(
            "expression cannot be evaluated in memory: {expr:?}"
        ))),
    }
}

/// Equality with NULL treated as a comparable value, so a cached match for
/// `col == NULL` finds objects whose variable holds NULL.
fn values_equal(left: &VarValue, right: &VarValue) -> bool {
    match (left, right) {
        (VarValue::Val(a), VarValue::Val(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => a == b,
        },
        (VarValue::Val(_), _) | (_, VarValue::Val(_)) => false,
        // Unset and Null both read back as "no value" here.
        _ => true,
    }
}

fn compare(left: &VarValue, right: &VarValue) -> Option<Ordering> {
    let (VarValue::Val(a), VarValue::Val(b)) = (left, right) else {
        return None;
    };
    if let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) {
        return x.partial_cmp(&y);
    }
    match (a, b) {
        (Value::Text(x), Value::Text(y)) => Some(x.cmp(y)),
        (Value::Bytes(x), Value::Bytes(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn truthy(value: &VarValue) -> bool {
    match value {
        VarValue::Unset | VarValue::Null => false,
        VarValue::Val(v) => match v {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Text(s) => !s.is_empty(),
            Value::Bytes(b) => !b.is_empty(),
            Value::Json(_) => true,
        },
    }
}
