//! Find-argument normalization.
//!
//! `find` accepts free-form expression predicates plus named equality
//! filters; [`where_for_args`] folds them into a single conjunction, or no
//! where-clause at all when both are empty.

use storm_core::{ClassRef, Error, Result, Value, VarValue};
use storm_expr::Expr;

/// Predicates passed to `find`: positional expressions and named equalities.
#[derive(Debug, Clone, Default)]
pub struct Filters {
    exprs: Vec<Expr>,
    named: Vec<(String, Value)>,
}

impl Filters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a free-form predicate expression.
    pub fn expr(mut self, expr: Expr) -> Self {
        self.exprs.push(expr);
        self
    }

    /// Add a named equality filter, resolved against the queried class.
    pub fn eq(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.named.push((name.into(), value.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.exprs.is_empty() && self.named.is_empty()
    }
}

impl From<()> for Filters {
    fn from((): ()) -> Self {
        Filters::new()
    }
}

impl From<Expr> for Filters {
    fn from(expr: Expr) -> Self {
        Filters::new().expr(expr)
    }
}

impl From<Vec<Expr>> for Filters {
    fn from(exprs: Vec<Expr>) -> Self {
        Filters { exprs, named: Vec::new() }
    }
}

/// Fold filters into one conjunction.
///
/// Named filters need a class to resolve against; their values are coerced
/// through the column's variable factory. Empty input yields no where-clause.
pub fn where_for_args(filters: &Filters, cls: Option<&ClassRef>) -> Result<Option<Expr>> {
    let mut equals = filters.exprs.clone();
    if !filters.named.is_empty() {
        let Some(cls) = cls else {
            return Err(Error::Feature(
                "can't determine the class that named filters refer to".to_string(),
            ));
        };
        for (name, value) in &filters.named {
            let column = cls.column(name).ok_or_else(|| {
                Error::Feature(format!("class {} has no column {name}", cls.name()))
            })?;
            let variable = column.variable_with(VarValue::from_db_value(value.clone()), true)?;
            let literal = variable.get().to_db_value().unwrap_or(Value::Null);
            equals.push(Expr::from(column).eq(Expr::Lit(literal)));
        }
    }
    let mut parts = equals.into_iter();
    let Some(first) = parts.next() else {
        return Ok(None);
    };
    Ok(Some(parts.fold(first, |acc, part| acc.and(part))))
}
