//! Finds over explicit FROM tables.

use crate::args::{Filters, where_for_args};
use crate::result_set::{ClsSpec, ResultSet};
use crate::store::Store;
use storm_core::Result;
use storm_expr::FromExpr;

/// A set of FROM tables bound to a store by `Store::using`.
///
/// Classes passed to `using` are normalized into their table expressions,
/// including inside joins, so a `find` here can project classes that do not
/// appear in the FROM list themselves.
pub struct TableSet {
    store: Store,
    tables: Vec<FromExpr>,
}

impl TableSet {
    pub(crate) fn new(store: Store, tables: Vec<FromExpr>) -> Self {
        Self { store, tables }
    }

    pub fn tables(&self) -> &[FromExpr] {
        &self.tables
    }

    /// Like `Store::find`, seeded with the bound tables.
    pub fn find(&self, spec: impl Into<ClsSpec>, filters: impl Into<Filters>) -> Result<ResultSet> {
        self.store.maybe_flush()?;
        let spec = spec.into();
        let where_clause = where_for_args(&filters.into(), spec.single())?;
        Ok(ResultSet::new(
            self.store.clone(),
            spec,
            where_clause,
            Some(self.tables.clone()),
        ))
    }
}
