//! Database abstraction consumed by the store.
//!
//! A driver implements these three traits. The store funnels every statement
//! through its one [`Connection`] and never inspects results beyond rows of
//! [`Value`]s; driver-specific value adaptation happens in
//! [`Rows::set_variable`].

use storm_core::{Column, Error, Result, Value, VarValue, Variable};
use storm_expr::{Expr, Statement, compare_columns};

/// A database that can hand out connections.
pub trait Database {
    fn connect(&self) -> Result<Box<dyn Connection>>;
}

/// A single database connection, exclusively owned by one store.
pub trait Connection {
    /// Execute a statement and return its result cursor.
    ///
    /// `noresult` hints that the caller will not read rows, so the driver may
    /// skip fetching.
    fn execute(&mut self, statement: &Statement, noresult: bool) -> Result<Box<dyn Rows>>;

    fn commit(&mut self) -> Result<()>;

    fn rollback(&mut self) -> Result<()>;

    fn close(&mut self) -> Result<()>;
}

/// A statement result: a forward-only cursor over positional rows.
pub trait Rows {
    /// Fetch the next row, or `None` when the cursor is exhausted.
    fn get_one(&mut self) -> Result<Option<Vec<Value>>>;

    /// Write a raw result value into a variable, applying driver-aware
    /// coercion. The default lifts `Value::Null` to an explicit NULL and
    /// coerces leniently through the variable's column type.
    fn set_variable(&self, variable: &mut Variable, value: Value) -> Result<()> {
        variable.set(VarValue::from_db_value(value), true)?;
        Ok(())
    }

    /// A predicate identifying the row just inserted through this result,
    /// for drivers that can recover database-assigned keys.
    ///
    /// The default only works when every primary variable is already
    /// defined; drivers with insert-identity support override it.
    fn get_insert_identity(&self, primary_key: &[Column], primary_vars: &[Variable]) -> Result<Expr> {
        if primary_vars.iter().all(Variable::is_defined) {
            Ok(compare_columns(primary_key, primary_vars))
        } else {
            Err(Error::Feature(
                "driver cannot identify the inserted row".to_string(),
            ))
        }
    }
}

/// An empty result, for drivers honoring `noresult`.
pub struct NoRows;

impl Rows for NoRows {
    fn get_one(&mut self) -> Result<Option<Vec<Value>>> {
        Ok(None)
    }
}
