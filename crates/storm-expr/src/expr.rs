//! SQL expressions.
//!
//! The AST is the boundary artifact between the session layer and a driver:
//! the session builds expressions and statements, the driver compiles and
//! executes them. Ordering wrappers (`Asc`/`Desc`) and aggregates live in the
//! same enum so order-by lists and projection lists are plain `Vec<Expr>`.

use storm_core::{Column, Value, Variable};

/// A SQL expression usable in WHERE, ORDER BY, and projections.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Column reference
    Column(Column),
    /// Literal value (a bound parameter)
    Lit(Value),
    /// Binary operation (e.g., a = b, a > b, a AND b)
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// NOT a
    Not(Box<Expr>),
    /// a IS NULL
    IsNull(Box<Expr>),
    /// Ascending ordering wrapper
    Asc(Box<Expr>),
    /// Descending ordering wrapper
    Desc(Box<Expr>),
    /// Aggregate function call; `COUNT(*)` has no argument
    Aggregate {
        func: AggFunc,
        arg: Option<Box<Expr>>,
    },
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinaryOp {
    /// Get the SQL representation of this operator.
    pub const fn as_str(&self) -> &'static str {
        match self {
            BinaryOp::Eq => "=",
            BinaryOp::Ne => "<>",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
        }
    }
}

/// Aggregate functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggFunc {
    Count,
    Max,
    Min,
    Avg,
    Sum,
}

impl AggFunc {
    /// Get the SQL name of this function.
    pub const fn as_str(&self) -> &'static str {
        match self {
            AggFunc::Count => "COUNT",
            AggFunc::Max => "MAX",
            AggFunc::Min => "MIN",
            AggFunc::Avg => "AVG",
            AggFunc::Sum => "SUM",
        }
    }
}

impl Expr {
    /// Create a column reference expression.
    pub fn col(column: Column) -> Self {
        Expr::Column(column)
    }

    /// Create a literal value expression.
    pub fn lit(value: impl Into<Value>) -> Self {
        Expr::Lit(value.into())
    }

    fn binary(self, op: BinaryOp, other: impl Into<Expr>) -> Self {
        Expr::Binary {
            op,
            left: Box::new(self),
            right: Box::new(other.into()),
        }
    }

    /// Equal to
    pub fn eq(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Eq, other)
    }

    /// Not equal to
    pub fn ne(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Ne, other)
    }

    /// Less than
    pub fn lt(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Lt, other)
    }

    /// Less than or equal to
    pub fn le(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Le, other)
    }

    /// Greater than
    pub fn gt(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Gt, other)
    }

    /// Greater than or equal to
    pub fn ge(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Ge, other)
    }

    /// Logical AND
    pub fn and(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::And, other)
    }

    /// Logical OR
    pub fn or(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Or, other)
    }

    /// Logical NOT
    pub fn not(self) -> Self {
        Expr::Not(Box::new(self))
    }

    /// IS NULL
    pub fn is_null(self) -> Self {
        Expr::IsNull(Box::new(self))
    }

    /// Ascending ordering
    pub fn asc(self) -> Self {
        Expr::Asc(Box::new(self))
    }

    /// Descending ordering
    pub fn desc(self) -> Self {
        Expr::Desc(Box::new(self))
    }

    /// COUNT(*)
    pub fn count() -> Self {
        Expr::Aggregate {
            func: AggFunc::Count,
            arg: None,
        }
    }

    /// MAX(expr)
    pub fn max(arg: impl Into<Expr>) -> Self {
        Self::aggregate(AggFunc::Max, arg)
    }

    /// MIN(expr)
    pub fn min(arg: impl Into<Expr>) -> Self {
        Self::aggregate(AggFunc::Min, arg)
    }

    /// AVG(expr)
    pub fn avg(arg: impl Into<Expr>) -> Self {
        Self::aggregate(AggFunc::Avg, arg)
    }

    /// SUM(expr)
    pub fn sum(arg: impl Into<Expr>) -> Self {
        Self::aggregate(AggFunc::Sum, arg)
    }

    fn aggregate(func: AggFunc, arg: impl Into<Expr>) -> Self {
        Expr::Aggregate {
            func,
            arg: Some(Box::new(arg.into())),
        }
    }

    /// Flip the ordering direction of an order-by expression.
    ///
    /// A bare expression orders ascending, so it reverses to `Desc`.
    pub fn reversed(self) -> Self {
        match self {
            Expr::Desc(inner) => *inner,
            Expr::Asc(inner) => Expr::Desc(inner),
            other => Expr::Desc(Box::new(other)),
        }
    }
}

impl From<Column> for Expr {
    fn from(column: Column) -> Self {
        Expr::Column(column)
    }
}

impl From<&Column> for Expr {
    fn from(column: &Column) -> Self {
        Expr::Column(column.clone())
    }
}

impl From<Value> for Expr {
    fn from(value: Value) -> Self {
        Expr::Lit(value)
    }
}

/// Build the primary-key equality predicate: `c1 = v1 AND c2 = v2 AND ...`.
///
/// Undefined variables compare against NULL.
pub fn compare_columns(columns: &[Column], variables: &[Variable]) -> Expr {
    debug_assert_eq!(columns.len(), variables.len());
    let mut parts = columns.iter().zip(variables).map(|(column, variable)| {
        Expr::from(column).eq(Expr::Lit(variable.get().to_db_value().unwrap_or(Value::Null)))
    });
    let first = parts.next().unwrap_or(Expr::Lit(Value::Bool(true)));
    parts.fold(first, |acc, part| acc.and(part))
}
