//! Parameterized statement types.
//!
//! These are the values handed to a `Connection`; no SQL text is produced
//! here. A driver crate walks the structures and emits its own dialect.

use crate::expr::Expr;
use storm_core::{ClassInfo, Column, Value};

/// A table reference in a FROM clause.
#[derive(Debug, Clone, PartialEq)]
pub enum FromExpr {
    /// A plain table name.
    Table(String),
    /// A join between table references.
    Join(Box<Join>),
}

impl FromExpr {
    /// Build a join reference.
    pub fn join(kind: JoinKind, left: Option<FromExpr>, right: FromExpr, on: Option<Expr>) -> Self {
        FromExpr::Join(Box::new(Join {
            kind,
            left,
            right,
            on,
        }))
    }
}

/// A join between two table references.
///
/// `left` may be absent when the join chains onto the preceding table
/// reference in the FROM list.
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub kind: JoinKind,
    pub left: Option<FromExpr>,
    pub right: FromExpr,
    pub on: Option<Expr>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
    Cross,
}

impl From<&ClassInfo> for FromExpr {
    fn from(cls: &ClassInfo) -> Self {
        FromExpr::Table(cls.table().to_string())
    }
}

impl From<&str> for FromExpr {
    fn from(table: &str) -> Self {
        FromExpr::Table(table.to_string())
    }
}

impl From<String> for FromExpr {
    fn from(table: String) -> Self {
        FromExpr::Table(table)
    }
}

/// A SELECT statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    /// Projected expressions.
    pub columns: Vec<Expr>,
    /// WHERE clause; `None` selects everything.
    pub where_clause: Option<Expr>,
    /// Explicit FROM tables; empty means "derive from `default_tables`".
    pub tables: Vec<FromExpr>,
    /// Tables implied by the projected classes.
    pub default_tables: Vec<String>,
    /// ORDER BY expressions; empty means unordered.
    pub order_by: Vec<Expr>,
    pub offset: Option<u64>,
    pub limit: Option<u64>,
    pub distinct: bool,
}

impl Select {
    /// A select with the given projection and filter; everything else unset.
    pub fn new(columns: Vec<Expr>, where_clause: Option<Expr>) -> Self {
        Self {
            columns,
            where_clause,
            tables: Vec::new(),
            default_tables: Vec::new(),
            order_by: Vec::new(),
            offset: None,
            limit: None,
            distinct: false,
        }
    }

    pub fn tables(mut self, tables: Vec<FromExpr>) -> Self {
        self.tables = tables;
        self
    }

    pub fn default_tables(mut self, tables: Vec<String>) -> Self {
        self.default_tables = tables;
        self
    }

    pub fn order_by(mut self, order_by: Vec<Expr>) -> Self {
        self.order_by = order_by;
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn distinct(mut self, distinct: bool) -> Self {
        self.distinct = distinct;
        self
    }
}

/// An INSERT of one row.
#[derive(Debug, Clone, PartialEq)]
pub struct Insert {
    pub table: String,
    /// Columns with defined values, in class declaration order.
    pub columns: Vec<Column>,
    /// One value per column.
    pub values: Vec<Value>,
}

/// An UPDATE statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    pub table: String,
    /// SET assignments; the right side is a literal or a column reference.
    pub set: Vec<(Column, Expr)>,
    pub where_clause: Option<Expr>,
}

/// A DELETE statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Delete {
    pub table: String,
    pub where_clause: Option<Expr>,
}

/// Any statement a `Connection` can execute.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Select(Select),
    Insert(Insert),
    Update(Update),
    Delete(Delete),
}

impl Statement {
    /// Statement kind, for logging.
    pub const fn kind(&self) -> &'static str {
        match self {
            Statement::Select(_) => "SELECT",
            Statement::Insert(_) => "INSERT",
            Statement::Update(_) => "UPDATE",
            Statement::Delete(_) => "DELETE",
        }
    }
}

impl From<Select> for Statement {
    fn from(s: Select) -> Self {
        Statement::Select(s)
    }
}

impl From<Insert> for Statement {
    fn from(s: Insert) -> Self {
        Statement::Insert(s)
    }
}

impl From<Update> for Statement {
    fn from(s: Update) -> Self {
        Statement::Update(s)
    }
}

impl From<Delete> for Statement {
    fn from(s: Delete) -> Self {
        Statement::Delete(s)
    }
}
