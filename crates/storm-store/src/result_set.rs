//! Lazy result sets.
//!
//! A [`ResultSet`] is a pending query: builder methods refine it, terminal
//! methods execute it. Slicing and indexing always produce fresh copies, so
//! a result set can be refined repeatedly without disturbing earlier
//! handles. Rows hydrate through the store, so retrieved objects are
//! identity-mapped like any other.

use crate::database::Rows;
use crate::store::Store;
use std::ops::{Bound, RangeBounds};
use storm_core::{
    ClassRef, Column, Error, ObjRef, QueryError, QueryErrorKind, Result, TypeError, Value,
    VarValue,
};
use storm_expr::{
    BinaryOp, Delete, Expr, FromExpr, Select, Statement, Update, compile_match,
};

/// The classes a query projects: one class, or a tuple for joined finds.
#[derive(Debug, Clone)]
pub enum ClsSpec {
    One(ClassRef),
    Many(Vec<ClassRef>),
}

impl ClsSpec {
    /// The class of a single-class spec.
    pub fn single(&self) -> Option<&ClassRef> {
        match self {
            ClsSpec::One(cls) => Some(cls),
            ClsSpec::Many(_) => None,
        }
    }
}

impl From<&ClassRef> for ClsSpec {
    fn from(cls: &ClassRef) -> Self {
        ClsSpec::One(cls.clone())
    }
}

impl From<ClassRef> for ClsSpec {
    fn from(cls: ClassRef) -> Self {
        ClsSpec::One(cls)
    }
}

impl From<Vec<ClassRef>> for ClsSpec {
    fn from(classes: Vec<ClassRef>) -> Self {
        ClsSpec::Many(classes)
    }
}

impl From<(&ClassRef, &ClassRef)> for ClsSpec {
    fn from((a, b): (&ClassRef, &ClassRef)) -> Self {
        ClsSpec::Many(vec![a.clone(), b.clone()])
    }
}

impl From<(&ClassRef, &ClassRef, &ClassRef)> for ClsSpec {
    fn from((a, b, c): (&ClassRef, &ClassRef, &ClassRef)) -> Self {
        ClsSpec::Many(vec![a.clone(), b.clone(), c.clone()])
    }
}

/// One hydrated result row.
///
/// Joined finds produce a tuple with one (possibly absent) object per class;
/// an absent side means the join found no row there.
#[derive(Debug, Clone)]
pub enum Loaded {
    One(Option<ObjRef>),
    Tuple(Vec<Option<ObjRef>>),
}

impl Loaded {
    /// The object of a single-class row.
    pub fn single(self) -> Option<ObjRef> {
        match self {
            Loaded::One(obj) => obj,
            Loaded::Tuple(_) => None,
        }
    }

    /// The row as a uniform tuple.
    pub fn tuple(self) -> Vec<Option<ObjRef>> {
        match self {
            Loaded::One(obj) => vec![obj],
            Loaded::Tuple(objects) => objects,
        }
    }
}

/// Right-hand side of a named bulk-set assignment.
#[derive(Debug, Clone)]
pub enum SetTo {
    /// Set the column to NULL.
    Null,
    /// Set the column to a raw value, coerced through its factory.
    Value(Value),
    /// Set the column from another column of the same row.
    Column(Column),
}

/// A pending query over a store.
#[derive(Clone)]
pub struct ResultSet {
    store: Store,
    spec: ClsSpec,
    where_clause: Option<Expr>,
    tables: Option<Vec<FromExpr>>,
    order_by: Option<Vec<Expr>>,
    offset: Option<u64>,
    limit: Option<u64>,
    distinct: bool,
}

impl ResultSet {
    pub(crate) fn new(
        store: Store,
        spec: ClsSpec,
        where_clause: Option<Expr>,
        tables: Option<Vec<FromExpr>>,
    ) -> Self {
        Self {
            store,
            spec,
            where_clause,
            tables,
            order_by: None,
            offset: None,
            limit: None,
            distinct: false,
        }
    }

    pub fn spec(&self) -> &ClsSpec {
        &self.spec
    }

    pub fn offset(&self) -> Option<u64> {
        self.offset
    }

    pub fn limit(&self) -> Option<u64> {
        self.limit
    }

    // ========================================================================
    // Builders
    // ========================================================================

    /// Overwrite configuration; `None` arguments leave the field untouched.
    pub fn config(mut self, distinct: Option<bool>, offset: Option<u64>, limit: Option<u64>) -> Self {
        if let Some(distinct) = distinct {
            self.distinct = distinct;
        }
        if let Some(offset) = offset {
            self.offset = Some(offset);
        }
        if let Some(limit) = limit {
            self.limit = Some(limit);
        }
        self
    }

    /// Order the results. Fails on an already-sliced result set.
    pub fn order_by(mut self, order_by: Vec<Expr>) -> Result<Self> {
        if self.offset.is_some() || self.limit.is_some() {
            return Err(Error::Feature(
                "can't reorder a sliced result set".to_string(),
            ));
        }
        self.order_by = Some(order_by);
        Ok(self)
    }

    /// The item at `index`, counted past any existing offset.
    pub fn at(&self, index: u64) -> Result<Loaded> {
        let target = if index == 0 {
            self.clone()
        } else {
            let offset = self.offset.unwrap_or(0) + index;
            self.clone().config(None, Some(offset), Some(1))
        };
        match target.any()? {
            Some(loaded) => Ok(loaded),
            None => Err(Error::OutOfRange(format!(
                "result set index {index} out of range"
            ))),
        }
    }

    /// A fresh result set narrowed to `range`, composed with any existing
    /// offset and limit.
    pub fn slice(&self, range: impl RangeBounds<u64>) -> ResultSet {
        let start = match range.start_bound() {
            Bound::Included(&s) => Some(s),
            Bound::Excluded(&s) => Some(s + 1),
            Bound::Unbounded => None,
        };
        let stop = match range.end_bound() {
            Bound::Included(&e) => Some(e + 1),
            Bound::Excluded(&e) => Some(e),
            Bound::Unbounded => None,
        };

        let mut result_set = self.clone();
        if let Some(start) = start {
            result_set.offset = Some(self.offset.unwrap_or(0) + start);
            result_set.limit = self.limit.map(|l| l.saturating_sub(start));
        }
        if let Some(stop) = stop {
            let new_limit = stop.saturating_sub(start.unwrap_or(0));
            result_set.limit = Some(result_set.limit.map_or(new_limit, |l| l.min(new_limit)));
        }
        result_set
    }

    fn build_select(&self) -> Select {
        let (columns, default_tables) = match &self.spec {
            ClsSpec::One(cls) => (column_exprs(cls), vec![cls.table().to_string()]),
            ClsSpec::Many(classes) => (
                classes.iter().flat_map(column_exprs).collect(),
                classes.iter().map(|c| c.table().to_string()).collect(),
            ),
        };
        Select {
            columns,
            where_clause: self.where_clause.clone(),
            tables: self.tables.clone().unwrap_or_default(),
            default_tables,
            order_by: self.order_by.clone().unwrap_or_default(),
            offset: self.offset,
            limit: self.limit,
            distinct: self.distinct,
        }
    }

    // ========================================================================
    // Materialization
    // ========================================================================

    /// Execute and iterate, hydrating one row at a time.
    pub fn iter(&self) -> Result<ResultIter> {
        let rows = self
            .store
            .run(&Statement::Select(self.build_select()), false)?;
        Ok(ResultIter {
            store: self.store.clone(),
            spec: self.spec.clone(),
            rows,
        })
    }

    /// Any single item, or `None` when the query matches nothing.
    pub fn any(&self) -> Result<Option<Loaded>> {
        let mut select = self.build_select();
        select.limit = Some(1);
        let mut result = self.store.run(&Statement::Select(select), false)?;
        match result.get_one()? {
            Some(values) => Ok(Some(self.store.load_objects(
                &self.spec,
                &mut *result,
                &values,
            )?)),
            None => Ok(None),
        }
    }

    /// The first item of an ordered result set.
    pub fn first(&self) -> Result<Option<Loaded>> {
        if self.order_by.is_none() {
            return Err(Error::Unordered(
                "can't use first() on an unordered result set".to_string(),
            ));
        }
        self.any()
    }

    /// The last item of an ordered result set, found by reversing the
    /// ordering. Rejected when a limit is set, since the reversal could not
    /// honor it.
    pub fn last(&self) -> Result<Option<Loaded>> {
        if self.order_by.is_none() {
            return Err(Error::Unordered(
                "can't use last() on an unordered result set".to_string(),
            ));
        }
        if self.limit.is_some() {
            return Err(Error::Feature(
                "can't use last() on a result set with a defined limit".to_string(),
            ));
        }
        let mut select = self.build_select();
        select.offset = None;
        select.limit = Some(1);
        select.order_by = self
            .order_by
            .iter()
            .flatten()
            .map(|expr| expr.clone().reversed())
            .collect();
        let mut result = self.store.run(&Statement::Select(select), false)?;
        match result.get_one()? {
            Some(values) => Ok(Some(self.store.load_objects(
                &self.spec,
                &mut *result,
                &values,
            )?)),
            None => Ok(None),
        }
    }

    /// The only item. Fails if a second row qualifies; never reads a third.
    pub fn one(&self) -> Result<Option<Loaded>> {
        let mut select = self.build_select();
        // A tighter limit (from slicing) wins; otherwise two rows suffice to
        // prove non-uniqueness.
        select.limit = Some(match self.limit {
            Some(limit) if limit < 2 => limit,
            _ => 2,
        });
        let mut result = self.store.run(&Statement::Select(select), false)?;
        let first = result.get_one()?;
        if result.get_one()?.is_some() {
            return Err(Error::NotOne(
                "one() used with more than one result available".to_string(),
            ));
        }
        match first {
            Some(values) => Ok(Some(self.store.load_objects(
                &self.spec,
                &mut *result,
                &values,
            )?)),
            None => Ok(None),
        }
    }

    // ========================================================================
    // Aggregation
    // ========================================================================

    fn aggregate(&self, expr: Expr, column: Option<&Column>) -> Result<Value> {
        let default_tables = match &self.spec {
            ClsSpec::One(cls) => vec![cls.table().to_string()],
            ClsSpec::Many(classes) => classes.iter().map(|c| c.table().to_string()).collect(),
        };
        let select = Select::new(vec![expr], self.where_clause.clone())
            .tables(self.tables.clone().unwrap_or_default())
            .default_tables(default_tables);
        let mut result = self.store.run(&Statement::Select(select), false)?;
        let row = result.get_one()?.ok_or_else(|| {
            Error::Query(QueryError {
                kind: QueryErrorKind::NotFound,
                message: "aggregate query returned no row".to_string(),
                statement: None,
            })
        })?;
        let value = row.into_iter().next().unwrap_or(Value::Null);
        match column {
            None => Ok(value),
            Some(column) => {
                let mut variable = column.variable();
                result.set_variable(&mut variable, value)?;
                Ok(variable.get().to_db_value().unwrap_or(Value::Null))
            }
        }
    }

    /// Number of matching rows.
    pub fn count(&self) -> Result<i64> {
        let value = self.aggregate(Expr::count(), None)?;
        value.as_i64().ok_or_else(|| {
            Error::Type(TypeError {
                expected: "BIGINT".to_string(),
                found: value.type_name().to_string(),
                column: None,
            })
        })
    }

    /// Maximum of `column`, coerced through its factory.
    pub fn max(&self, column: &Column) -> Result<Value> {
        self.aggregate(Expr::max(column), Some(column))
    }

    /// Minimum of `column`, coerced through its factory.
    pub fn min(&self, column: &Column) -> Result<Value> {
        self.aggregate(Expr::min(column), Some(column))
    }

    /// Sum of `column`, coerced through its factory.
    pub fn sum(&self, column: &Column) -> Result<Value> {
        self.aggregate(Expr::sum(column), Some(column))
    }

    /// Average of `column`, always floating-point.
    pub fn avg(&self, column: &Column) -> Result<f64> {
        let value = self.aggregate(Expr::avg(column), None)?;
        value.as_f64().ok_or_else(|| {
            Error::Type(TypeError {
                expected: "DOUBLE".to_string(),
                found: value.type_name().to_string(),
                column: None,
            })
        })
    }

    // ========================================================================
    // Projection
    // ========================================================================

    /// Project the query onto `columns`, yielding coerced value rows lazily.
    pub fn values(&self, columns: &[Column]) -> Result<ValuesIter> {
        if columns.is_empty() {
            return Err(Error::Feature(
                "values() takes at least one column as argument".to_string(),
            ));
        }
        let mut select = self.build_select();
        select.columns = columns.iter().map(Expr::from).collect();
        let rows = self.store.run(&Statement::Select(select), false)?;
        Ok(ValuesIter {
            rows,
            columns: columns.to_vec(),
        })
    }

    // ========================================================================
    // Bulk mutation
    // ========================================================================

    /// Update every matching row, then reconcile cached objects so they
    /// reflect the mutation without a reload.
    ///
    /// Positional expressions must be `column = column` or
    /// `column = literal` equalities; named assignments resolve against the
    /// queried class.
    pub fn set(&self, exprs: &[Expr], named: &[(&str, SetTo)]) -> Result<()> {
        let Some(cls) = self.spec.single() else {
            return Err(Error::Feature(
                "set is not supported with tuple finds".to_string(),
            ));
        };
        let cls = cls.clone();
        if exprs.is_empty() && named.is_empty() {
            return Ok(());
        }

        let mut changes: Vec<(Column, SetTo)> = Vec::new();

        for expr in exprs {
            let Expr::Binary {
                op: BinaryOp::Eq,
                left,
                right,
            } = expr
            else {
                return Err(Error::Feature(format!(
                    "unsupported set expression: {expr:?}"
                )));
            };
            let Expr::Column(target) = &**left else {
                return Err(Error::Feature(format!(
                    "unsupported set expression: {expr:?}"
                )));
            };
            let to = match &**right {
                Expr::Column(source) => SetTo::Column(source.clone()),
                Expr::Lit(value) => SetTo::Value(value.clone()),
                _ => {
                    return Err(Error::Feature(format!(
                        "unsupported set expression: {expr:?}"
                    )));
                }
            };
            changes.push((target.clone(), to));
        }

        for (name, to) in named {
            let column = cls
                .column(name)
                .ok_or_else(|| {
                    Error::Feature(format!("class {} has no column {name}", cls.name()))
                })?
                .clone();
            let to = match to {
                SetTo::Null | SetTo::Value(Value::Null) => SetTo::Null,
                SetTo::Value(value) => {
                    let variable =
                        column.variable_with(VarValue::Val(value.clone()), true)?;
                    match variable.get() {
                        VarValue::Val(coerced) => SetTo::Value(coerced),
                        _ => SetTo::Null,
                    }
                }
                SetTo::Column(source) => SetTo::Column(source.clone()),
            };
            changes.push((column, to));
        }

        let update = Update {
            table: cls.table().to_string(),
            set: changes
                .iter()
                .map(|(column, to)| {
                    let rhs = match to {
                        SetTo::Null => Expr::Lit(Value::Null),
                        SetTo::Value(value) => Expr::Lit(value.clone()),
                        SetTo::Column(source) => Expr::Column(source.clone()),
                    };
                    (column.clone(), rhs)
                })
                .collect(),
            where_clause: self.where_clause.clone(),
        };
        tracing::debug!(class = cls.name(), changes = changes.len(), "bulk set");
        self.store.run(&Statement::Update(update), true)?;

        match self.cached() {
            Ok(cached) => {
                for info in cached {
                    self.patch_cached(&cls, &info, &changes)?;
                }
            }
            Err(Error::Compile(_)) => {
                // The where-clause has no in-memory form; reload every
                // cached object of this class instead.
                for info in self.store.iter_cached() {
                    if info.cls().id() == cls.id() {
                        self.store.reload(&info)?;
                    }
                }
            }
            Err(other) => return Err(other),
        }
        Ok(())
    }

    fn patch_cached(&self, cls: &ClassRef, info: &ObjRef, changes: &[(Column, SetTo)]) -> Result<()> {
        for (column, to) in changes {
            let index = cls.column_index(&column.name).ok_or_else(|| {
                Error::Feature(format!(
                    "class {} has no column {}",
                    cls.name(),
                    column.name
                ))
            })?;
            match to {
                // A NULL assignment leaves the cached value alone.
                SetTo::Null => {}
                SetTo::Value(value) => {
                    info.set_value(index, VarValue::Val(value.clone()), false)?;
                    info.checkpoint_variable(index);
                }
                SetTo::Column(source) => {
                    let source_index = cls.column_index(&source.name).ok_or_else(|| {
                        Error::Feature(format!(
                            "class {} has no column {}",
                            cls.name(),
                            source.name
                        ))
                    })?;
                    let current = info.value(source_index);
                    info.set_value(index, current, false)?;
                    info.checkpoint_variable(index);
                }
            }
        }
        Ok(())
    }

    /// Delete every matching row directly.
    ///
    /// The identity map is left untouched: cached objects for deleted rows
    /// stay until the caller reloads or the session ends.
    pub fn remove(&self) -> Result<()> {
        if self.offset.is_some() || self.limit.is_some() {
            return Err(Error::Feature(
                "can't remove a sliced result set".to_string(),
            ));
        }
        let Some(cls) = self.spec.single() else {
            return Err(Error::Feature(
                "removing is not supported with tuple finds".to_string(),
            ));
        };
        let delete = Delete {
            table: cls.table().to_string(),
            where_clause: self.where_clause.clone(),
        };
        self.store.run(&Statement::Delete(delete), true)?;
        Ok(())
    }

    // ========================================================================
    // In-memory match
    // ========================================================================

    /// The cached objects this query matches, decided without touching the
    /// database. Result order is unspecified.
    pub fn cached(&self) -> Result<Vec<ObjRef>> {
        let Some(cls) = self.spec.single() else {
            return Err(Error::Feature(
                "cached finds are not supported with tuple finds".to_string(),
            ));
        };
        if self.tables.is_some() {
            return Err(Error::Feature(
                "cached finds are not supported with custom tables".to_string(),
            ));
        }
        let matcher = match &self.where_clause {
            None => None,
            Some(where_clause) => Some(compile_match(where_clause)?),
        };
        let mut objects = Vec::new();
        for info in self.store.iter_cached() {
            if info.cls().id() != cls.id() {
                continue;
            }
            if let Some(matcher) = &matcher {
                let resolve = |name: &str| cls.column_index(name).map(|i| info.value(i));
                if !matcher.matches(&resolve)? {
                    continue;
                }
            }
            objects.push(info);
        }
        Ok(objects)
    }
}

/// Iterator over hydrated result rows.
pub struct ResultIter {
    store: Store,
    spec: ClsSpec,
    rows: Box<dyn Rows>,
}

impl Iterator for ResultIter {
    type Item = Result<Loaded>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.rows.get_one() {
            Err(e) => Some(Err(e)),
            Ok(None) => None,
            Ok(Some(values)) => Some(self.store.load_objects(&self.spec, &mut *self.rows, &values)),
        }
    }
}

/// Lazy iterator over projected, coerced value rows.
pub struct ValuesIter {
    rows: Box<dyn Rows>,
    columns: Vec<Column>,
}

impl ValuesIter {
    fn coerce(&self, values: Vec<Value>) -> Result<Vec<Value>> {
        self.columns
            .iter()
            .zip(values)
            .map(|(column, value)| {
                let mut variable = column.variable();
                self.rows.set_variable(&mut variable, value)?;
                Ok(variable.get().to_db_value().unwrap_or(Value::Null))
            })
            .collect()
    }
}

impl Iterator for ValuesIter {
    type Item = Result<Vec<Value>>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.rows.get_one() {
            Err(e) => Some(Err(e)),
            Ok(None) => None,
            Ok(Some(values)) => Some(self.coerce(values)),
        }
    }
}

fn column_exprs(cls: &ClassRef) -> Vec<Expr> {
    cls.columns().iter().map(Expr::from).collect()
}
