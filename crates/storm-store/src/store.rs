//! The store: identity-mapped retrieval and the unit of work.
//!
//! A [`Store`] owns one [`Connection`] and tracks every object hydrated from
//! or attached to it. Reads consult the weak identity map first; writes are
//! deferred into a dirty set and emitted by [`Store::flush`] in an order
//! consistent with the user-declared flush-order constraints.
//!
//! # Lifecycle
//!
//! An object is *alive* while cached and wired for change notification,
//! *dirty* while it has unflushed work, and a *ghost* once removed but not
//! yet committed. The store never holds strong references beyond the dirty
//! set and the flush-order edges: drop every application handle and the
//! object silently leaves the identity map.
//!
//! # Re-entrancy
//!
//! Event handlers run synchronously on the mutating call. The flush loop
//! re-snapshots the dirty set after every emitted statement, so handlers may
//! attach or dirty further objects mid-flush without corrupting the scan.

use crate::args::{Filters, where_for_args};
use crate::database::{Connection, Database, Rows};
use crate::identity::{CacheKey, IdentityMap, PkTuple};
use crate::result_set::{ClsSpec, Loaded, ResultSet};
use crate::table_set::TableSet;
use std::any::Any;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use storm_core::{
    Changed, ClassRef, Column, Error, Event, ObjRef, ObjectInfo, Pending, QueryError,
    QueryErrorKind, Result, StoreBinding, Value, VarValue, Variable,
};
use storm_expr::{Delete, Expr, FromExpr, Insert, Select, Statement, Update, compare_columns};

/// Configuration for store behavior.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Whether `get`/`find`/`execute` flush pending work first, so the
    /// database observes writes before subsequent reads.
    pub implicit_flush: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            implicit_flush: true,
        }
    }
}

/// Diagnostic counters over the store's tracking structures.
#[derive(Debug, Clone, Copy, Default)]
pub struct StoreStats {
    /// Live identity-map entries.
    pub cached: usize,
    /// Objects with unflushed work.
    pub dirty: usize,
    /// Removed objects awaiting commit.
    pub ghosts: usize,
    /// Declared flush-order pairs (including exhausted ones).
    pub order_edges: usize,
}

type ObjPtr = usize;

fn ptr_of(info: &ObjRef) -> ObjPtr {
    Rc::as_ptr(info) as ObjPtr
}

struct OrderEdge {
    count: i64,
    before: ObjRef,
    after: ObjRef,
}

struct StoreState {
    cache: IdentityMap,
    dirty: HashMap<ObjPtr, ObjRef>,
    ghosts: HashMap<ObjPtr, std::rc::Weak<ObjectInfo>>,
    order: HashMap<(ObjPtr, ObjPtr), OrderEdge>,
}

pub(crate) struct StoreCore {
    id: u64,
    conn: RefCell<Box<dyn Connection>>,
    state: RefCell<StoreState>,
    config: StoreConfig,
}

static NEXT_STORE_ID: AtomicU64 = AtomicU64::new(1);

/// A session over one database connection.
///
/// `Store` is a cheap-to-clone handle; clones share the same session. It is
/// single-threaded: no internal locking, exclusive ownership per operation.
#[derive(Clone)]
pub struct Store {
    core: Rc<StoreCore>,
}

impl PartialEq for Store {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.core, &other.core)
    }
}

impl Store {
    /// Connect to `database` and wrap the connection in a new session.
    pub fn new(database: &dyn Database) -> Result<Self> {
        Self::with_config(database, StoreConfig::default())
    }

    /// Like [`Store::new`] with explicit configuration.
    pub fn with_config(database: &dyn Database, config: StoreConfig) -> Result<Self> {
        let conn = database.connect()?;
        Ok(Self {
            core: Rc::new(StoreCore {
                id: NEXT_STORE_ID.fetch_add(1, Ordering::Relaxed),
                conn: RefCell::new(conn),
                state: RefCell::new(StoreState {
                    cache: IdentityMap::new(),
                    dirty: HashMap::new(),
                    ghosts: HashMap::new(),
                    order: HashMap::new(),
                }),
                config,
            }),
        })
    }

    /// The store an object is attached to, if that store is still alive.
    pub fn of(obj: &ObjRef) -> Option<Store> {
        let binding = obj.store()?;
        let owner = binding.owner()?;
        let core = owner.downcast::<StoreCore>().ok()?;
        Some(Store { core })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.core.config
    }

    /// Diagnostic counters.
    pub fn stats(&self) -> StoreStats {
        let mut state = self.core.state.borrow_mut();
        state.ghosts.retain(|_, weak| weak.strong_count() > 0);
        StoreStats {
            cached: state.cache.iter_live().len(),
            dirty: state.dirty.len(),
            ghosts: state.ghosts.len(),
            order_edges: state.order.len(),
        }
    }

    /// Whether `obj` currently has unflushed work.
    pub fn is_dirty(&self, obj: &ObjRef) -> bool {
        self.core.state.borrow().dirty.contains_key(&ptr_of(obj))
    }

    // ========================================================================
    // Statement execution
    // ========================================================================

    /// Flush, then execute a raw statement and return its result cursor.
    pub fn execute(&self, statement: &Statement) -> Result<Box<dyn Rows>> {
        self.maybe_flush()?;
        self.run(statement, false)
    }

    /// Flush, then execute a raw statement discarding any result.
    pub fn execute_noresult(&self, statement: &Statement) -> Result<()> {
        self.maybe_flush()?;
        self.run(statement, true)?;
        Ok(())
    }

    /// Close the underlying connection. No implicit flush.
    pub fn close(&self) -> Result<()> {
        self.core.conn.borrow_mut().close()
    }

    pub(crate) fn run(&self, statement: &Statement, noresult: bool) -> Result<Box<dyn Rows>> {
        tracing::trace!(kind = statement.kind(), noresult, "executing statement");
        self.core.conn.borrow_mut().execute(statement, noresult)
    }

    pub(crate) fn maybe_flush(&self) -> Result<()> {
        if self.core.config.implicit_flush {
            self.flush()
        } else {
            Ok(())
        }
    }

    // ========================================================================
    // Transaction boundary
    // ========================================================================

    /// Flush, commit the connection, and make the committed state the new
    /// rollback baseline for every tracked object.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn commit(&self) -> Result<()> {
        self.flush()?;
        self.core.conn.borrow_mut().commit()?;
        let (ghosts, cached) = {
            let mut state = self.core.state.borrow_mut();
            let ghosts: Vec<ObjRef> = state.ghosts.drain().filter_map(|(_, w)| w.upgrade()).collect();
            let cached = state.cache.iter_live();
            (ghosts, cached)
        };
        for info in ghosts {
            info.set_store(None);
        }
        for info in cached {
            info.save();
        }
        Ok(())
    }

    /// Revert every tracked object to its last saved snapshot and roll the
    /// connection back.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn rollback(&self) -> Result<()> {
        let infos: Vec<ObjRef> = {
            let mut state = self.core.state.borrow_mut();
            let mut seen: HashMap<ObjPtr, ObjRef> = state.dirty.clone();
            for weak in state.ghosts.values() {
                if let Some(info) = weak.upgrade() {
                    seen.insert(ptr_of(&info), info);
                }
            }
            for info in state.cache.iter_live() {
                seen.insert(ptr_of(&info), info);
            }
            seen.into_values().collect()
        };

        for info in infos {
            self.remove_from_cache(&info);
            info.restore();
            if self.bound_to_self(&info) {
                self.add_to_cache(&info);
                self.enable_change_notification(&info);
            }
        }

        {
            let mut state = self.core.state.borrow_mut();
            state.ghosts.clear();
            state.dirty.clear();
        }
        self.core.conn.borrow_mut().rollback()
    }

    // ========================================================================
    // Retrieval
    // ========================================================================

    /// Identity-mapped primary key lookup.
    ///
    /// Flushes first, probes the identity map, and only then selects.
    /// Returns `None` when no row matches.
    ///
    /// # Panics
    ///
    /// If the key cardinality does not match the class's primary key.
    pub fn get(&self, cls: &ClassRef, key: impl IntoKey) -> Result<Option<ObjRef>> {
        self.maybe_flush()?;

        let key_values = key.into_key();
        assert_eq!(
            key_values.len(),
            cls.primary_key_pos().len(),
            "primary key cardinality mismatch for {}",
            cls.name()
        );

        let primary_key = cls.primary_key();
        let mut primary_vars = Vec::with_capacity(key_values.len());
        for (column, value) in primary_key.iter().zip(key_values) {
            primary_vars.push(column.variable_with(VarValue::from_db_value(value), false)?);
        }

        let cache_key = CacheKey::new(cls.id(), PkTuple::from_variables(&primary_vars));
        if let Some(info) = self.core.state.borrow_mut().cache.get(&cache_key) {
            tracing::trace!(class = cls.name(), "identity map hit");
            return Ok(Some(info));
        }

        let select = Select::new(
            column_exprs(cls),
            Some(compare_columns(&primary_key, &primary_vars)),
        )
        .default_tables(vec![cls.table().to_string()])
        .limit(1);

        let mut result = self.run(&Statement::Select(select), false)?;
        let Some(values) = result.get_one()? else {
            return Ok(None);
        };
        self.load_object(cls, &mut *result, &values, None)
    }

    /// Build a result set over one class or a joined tuple of classes.
    ///
    /// Flushes first so the query observes pending writes.
    pub fn find(&self, spec: impl Into<ClsSpec>, filters: impl Into<Filters>) -> Result<ResultSet> {
        self.maybe_flush()?;
        let spec = spec.into();
        let where_clause = where_for_args(&filters.into(), spec.single())?;
        Ok(ResultSet::new(self.clone(), spec, where_clause, None))
    }

    /// Bind explicit FROM tables (classes, raw tables, or joins) for a
    /// subsequent `find`.
    pub fn using(&self, tables: Vec<FromExpr>) -> TableSet {
        TableSet::new(self.clone(), tables)
    }

    // ========================================================================
    // Attachment
    // ========================================================================

    /// Construct a blank instance of `cls`, assign `values`, and add it.
    pub fn create(&self, cls: &ClassRef, values: &[(&str, Value)]) -> Result<ObjRef> {
        let obj = ObjectInfo::new(cls);
        for (name, value) in values {
            obj.set(name, value.clone())?;
        }
        self.add(&obj)?;
        Ok(obj)
    }

    /// Attach `obj` to this store, scheduling an INSERT.
    ///
    /// Re-adding a pending-removal object just cancels the removal.
    pub fn add(&self, obj: &ObjRef) -> Result<()> {
        let store = obj.store();
        if let Some(binding) = &store {
            if binding.id() != self.core.id {
                return Err(Error::WrongStore(format!(
                    "{} instance is part of another store",
                    obj.cls().name()
                )));
            }
        }

        match obj.pending() {
            Some(Pending::Add) => {}
            Some(Pending::Remove) => {
                obj.set_pending(None);
            }
            None => {
                if store.is_none() {
                    obj.save();
                    obj.set_store(Some(self.binding()));
                } else if !self.is_ghost(obj) {
                    return Ok(()); // Already alive here.
                } else {
                    self.set_alive(obj);
                }
                obj.set_pending(Some(Pending::Add));
                self.set_dirty(obj);
                obj.events().emit(&Event::Added);
            }
        }
        Ok(())
    }

    /// Schedule `obj` for removal.
    ///
    /// Removing a pending-add object cancels the insert and detaches it into
    /// the ghost set without touching the database.
    pub fn remove(&self, obj: &ObjRef) -> Result<()> {
        if !self.bound_to_self(obj) {
            return Err(Error::WrongStore(format!(
                "{} instance is not in this store",
                obj.cls().name()
            )));
        }

        match obj.pending() {
            Some(Pending::Remove) => {}
            Some(Pending::Add) => {
                obj.set_pending(None);
                self.set_ghost(obj);
                self.set_clean(obj);
            }
            None => {
                if !self.is_ghost(obj) {
                    obj.set_pending(Some(Pending::Remove));
                    self.set_dirty(obj);
                }
            }
        }
        Ok(())
    }

    /// Re-select `obj` by primary key and overwrite its variables with the
    /// database state.
    pub fn reload(&self, obj: &ObjRef) -> Result<()> {
        let cls = obj.cls().clone();
        if !self.bound_to_self(obj) || self.is_ghost(obj) {
            return Err(Error::WrongStore(format!(
                "{} instance is not in this store",
                cls.name()
            )));
        }
        let Some(key_vars) = obj.saved_primary_vars() else {
            return Err(Error::NotFlushed(
                "can't reload an object that was never flushed".to_string(),
            ));
        };

        let select = Select::new(
            column_exprs(&cls),
            Some(compare_columns(&cls.primary_key(), &key_vars)),
        )
        .default_tables(vec![cls.table().to_string()])
        .limit(1);

        let mut result = self.run(&Statement::Select(select), false)?;
        let Some(values) = result.get_one()? else {
            return Err(Error::Query(QueryError {
                kind: QueryErrorKind::NotFound,
                message: format!("row for {} vanished during reload", cls.name()),
                statement: None,
            }));
        };
        let all: Vec<usize> = (0..cls.columns().len()).collect();
        self.set_values(obj, &all, &mut *result, &values)?;
        obj.checkpoint();
        self.set_clean(obj);
        Ok(())
    }

    // ========================================================================
    // Flush ordering
    // ========================================================================

    /// Require `before` to flush strictly before `after` within the next
    /// flush. Calls stack: each `add` needs a matching `remove` to undo.
    pub fn add_flush_order(&self, before: &ObjRef, after: &ObjRef) {
        let mut state = self.core.state.borrow_mut();
        let key = (ptr_of(before), ptr_of(after));
        state
            .order
            .entry(key)
            .and_modify(|edge| edge.count += 1)
            .or_insert_with(|| OrderEdge {
                count: 1,
                before: Rc::clone(before),
                after: Rc::clone(after),
            });
    }

    /// Undo one matching [`Store::add_flush_order`] call. Unknown pairs are
    /// ignored.
    pub fn remove_flush_order(&self, before: &ObjRef, after: &ObjRef) {
        let mut state = self.core.state.borrow_mut();
        let key = (ptr_of(before), ptr_of(after));
        if let Some(edge) = state.order.get_mut(&key) {
            edge.count -= 1;
        }
    }

    // ========================================================================
    // Flush
    // ========================================================================

    /// Write out every dirty object, honoring declared flush order.
    ///
    /// Dirty objects with no positive-count predecessor edge flush in
    /// implementation-defined order. Declared constraints that cannot be
    /// satisfied fail with [`Error::OrderLoop`]. The order multiset is
    /// cleared once the dirty set drains.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn flush(&self) -> Result<()> {
        let predecessors: HashMap<ObjPtr, Vec<ObjRef>> = {
            let state = self.core.state.borrow();
            let mut map: HashMap<ObjPtr, Vec<ObjRef>> = HashMap::new();
            for edge in state.order.values() {
                if edge.count > 0 {
                    map.entry(ptr_of(&edge.after))
                        .or_default()
                        .push(Rc::clone(&edge.before));
                }
            }
            map
        };

        // One object per pass; the dirty set is re-snapshotted after every
        // statement so event handlers may mutate it mid-flush.
        loop {
            let (snapshot, dirty_ptrs) = {
                let state = self.core.state.borrow();
                let snapshot: Vec<ObjRef> = state.dirty.values().cloned().collect();
                let ptrs: HashSet<ObjPtr> = state.dirty.keys().copied().collect();
                (snapshot, ptrs)
            };
            if snapshot.is_empty() {
                break;
            }
            let picked = snapshot
                .iter()
                .find(|obj| {
                    predecessors.get(&ptr_of(obj)).is_none_or(|before| {
                        !before.iter().any(|b| dirty_ptrs.contains(&ptr_of(b)))
                    })
                })
                .cloned();
            let Some(obj) = picked else {
                return Err(Error::OrderLoop(
                    "can't flush due to an ordering loop".to_string(),
                ));
            };
            self.core.state.borrow_mut().dirty.remove(&ptr_of(&obj));
            self.flush_one(&obj)?;
        }

        self.core.state.borrow_mut().order.clear();
        Ok(())
    }

    fn flush_one(&self, obj: &ObjRef) -> Result<()> {
        let cls = obj.cls().clone();

        match obj.take_pending() {
            Some(Pending::Remove) => {
                let key_vars = obj
                    .saved_primary_vars()
                    .expect("pending-removal object was never cached");
                let delete = Delete {
                    table: cls.table().to_string(),
                    where_clause: Some(compare_columns(&cls.primary_key(), &key_vars)),
                };
                tracing::debug!(class = cls.name(), "flushing removal");
                self.run(&Statement::Delete(delete), true)?;

                self.disable_change_notification(obj);
                self.set_ghost(obj);
                self.remove_from_cache(obj);
            }
            Some(Pending::Add) => {
                let (columns, values): (Vec<Column>, Vec<Value>) = obj.with_variables(|vars| {
                    cls.columns()
                        .iter()
                        .zip(vars)
                        .filter(|(_, var)| var.is_defined())
                        .map(|(col, var)| {
                            (col.clone(), var.get().to_db_value().unwrap_or(Value::Null))
                        })
                        .unzip()
                });
                let insert = Insert {
                    table: cls.table().to_string(),
                    columns,
                    values,
                };
                tracing::debug!(class = cls.name(), "flushing insert");
                let mut result = self.run(&Statement::Insert(insert), false)?;

                self.fill_missing_values(obj, &mut *result)?;

                self.enable_change_notification(obj);
                self.set_alive(obj);
                self.add_to_cache(obj);
                obj.checkpoint();
            }
            None => {
                let changes: Vec<(Column, Value)> = obj.with_variables(|vars| {
                    cls.columns()
                        .iter()
                        .zip(vars)
                        .filter(|(_, var)| var.has_changed() && var.is_defined())
                        .map(|(col, var)| {
                            (col.clone(), var.get().to_db_value().unwrap_or(Value::Null))
                        })
                        .collect()
                });
                if !changes.is_empty() {
                    let key_vars = obj
                        .saved_primary_vars()
                        .expect("dirty update on an object that was never cached");
                    let update = Update {
                        table: cls.table().to_string(),
                        set: changes
                            .into_iter()
                            .map(|(col, value)| (col, Expr::Lit(value)))
                            .collect(),
                        where_clause: Some(compare_columns(&cls.primary_key(), &key_vars)),
                    };
                    tracing::debug!(class = cls.name(), "flushing update");
                    self.run(&Statement::Update(update), true)?;

                    // The primary key may have changed; refresh the map key.
                    self.add_to_cache(obj);
                }
                obj.checkpoint();
            }
        }

        obj.events().emit(&Event::Flushed);
        Ok(())
    }

    /// After an insert, re-select any still-undefined columns (database
    /// defaults, assigned keys) and write them back.
    fn fill_missing_values(&self, obj: &ObjRef, result: &mut dyn Rows) -> Result<()> {
        let cls = obj.cls().clone();
        let missing: Vec<usize> = obj.with_variables(|vars| {
            vars.iter()
                .enumerate()
                .filter(|(_, var)| !var.is_defined())
                .map(|(i, _)| i)
                .collect()
        });
        if missing.is_empty() {
            return Ok(());
        }

        let primary_key = cls.primary_key();
        let primary_vars = obj.primary_vars();
        let where_clause = if primary_vars.iter().all(Variable::is_defined) {
            compare_columns(&primary_key, &primary_vars)
        } else {
            result.get_insert_identity(&primary_key, &primary_vars)?
        };

        let columns: Vec<Expr> = missing
            .iter()
            .map(|&i| Expr::from(&cls.columns()[i]))
            .collect();
        let mut rows = self.run(&Statement::Select(Select::new(columns, Some(where_clause))), false)?;
        let Some(values) = rows.get_one()? else {
            return Err(Error::Query(QueryError {
                kind: QueryErrorKind::NotFound,
                message: format!("inserted {} row could not be re-selected", cls.name()),
                statement: None,
            }));
        };
        self.set_values(obj, &missing, &mut *rows, &values)
    }

    // ========================================================================
    // Hydration
    // ========================================================================

    pub(crate) fn load_objects(
        &self,
        spec: &ClsSpec,
        result: &mut dyn Rows,
        values: &[Value],
    ) -> Result<Loaded> {
        match spec {
            ClsSpec::One(cls) => Ok(Loaded::One(self.load_object(cls, result, values, None)?)),
            ClsSpec::Many(classes) => {
                let mut objects = Vec::with_capacity(classes.len());
                let mut start = 0;
                for cls in classes {
                    let end = start + cls.columns().len();
                    objects.push(self.load_object(cls, result, &values[start..end], None)?);
                    start = end;
                }
                Ok(Loaded::Tuple(objects))
            }
        }
    }

    /// Hydrate one row slice into a tracked object.
    ///
    /// An all-NULL primary key means a join produced no row for this side;
    /// the result is `None`. A cache hit returns the existing object without
    /// rebinding it.
    pub(crate) fn load_object(
        &self,
        cls: &ClassRef,
        result: &mut dyn Rows,
        values: &[Value],
        obj: Option<&ObjRef>,
    ) -> Result<Option<ObjRef>> {
        let obj = match obj {
            Some(existing) => Rc::clone(existing),
            None => {
                let mut primary_vars = Vec::with_capacity(cls.primary_key_pos().len());
                let mut is_null = true;
                for &i in cls.primary_key_pos() {
                    let value = &values[i];
                    if !value.is_null() {
                        is_null = false;
                    }
                    primary_vars.push(
                        cls.columns()[i].variable_with(VarValue::from_db_value(value.clone()), true)?,
                    );
                }
                if is_null {
                    return Ok(None);
                }
                let key = CacheKey::new(cls.id(), PkTuple::from_variables(&primary_vars));
                if let Some(existing) = self.core.state.borrow_mut().cache.get(&key) {
                    return Ok(Some(existing));
                }
                ObjectInfo::new(cls)
            }
        };

        obj.set_store(Some(self.binding()));

        let all: Vec<usize> = (0..cls.columns().len()).collect();
        self.set_values(&obj, &all, result, values)?;

        obj.save();
        self.add_to_cache(&obj);
        self.enable_change_notification(&obj);

        if let Some(hook) = cls.load_hook() {
            hook(&obj);
        }
        obj.events().emit(&Event::Loaded);
        obj.save_attributes();

        Ok(Some(obj))
    }

    /// Write row values into the variables at `columns`, using the result
    /// for driver-aware coercion of non-NULL values.
    fn set_values(
        &self,
        obj: &ObjRef,
        columns: &[usize],
        result: &mut dyn Rows,
        values: &[Value],
    ) -> Result<()> {
        for (&index, value) in columns.iter().zip(values) {
            if value.is_null() {
                obj.set_value(index, VarValue::Null, true)?;
            } else {
                let value = value.clone();
                obj.update_variable(index, true, |var| result.set_variable(var, value))?;
            }
        }
        Ok(())
    }

    // ========================================================================
    // Tracking sets
    // ========================================================================

    fn set_dirty(&self, obj: &ObjRef) {
        self.core
            .state
            .borrow_mut()
            .dirty
            .insert(ptr_of(obj), Rc::clone(obj));
    }

    fn set_clean(&self, obj: &ObjRef) {
        self.core.state.borrow_mut().dirty.remove(&ptr_of(obj));
    }

    fn is_ghost(&self, obj: &ObjRef) -> bool {
        self.core.state.borrow().ghosts.contains_key(&ptr_of(obj))
    }

    fn set_ghost(&self, obj: &ObjRef) {
        self.core
            .state
            .borrow_mut()
            .ghosts
            .insert(ptr_of(obj), Rc::downgrade(obj));
    }

    fn set_alive(&self, obj: &ObjRef) {
        self.core.state.borrow_mut().ghosts.remove(&ptr_of(obj));
    }

    fn bound_to_self(&self, obj: &ObjRef) -> bool {
        obj.store().is_some_and(|b| b.id() == self.core.id)
    }

    pub(crate) fn binding(&self) -> StoreBinding {
        let any: Rc<dyn Any> = self.core.clone() as Rc<dyn Any>;
        StoreBinding::new(self.core.id, Rc::downgrade(&any))
    }

    // ========================================================================
    // Identity map maintenance
    // ========================================================================

    /// (Re-)insert `obj` under a fresh snapshot of its primary key,
    /// evicting any stale key first.
    fn add_to_cache(&self, obj: &ObjRef) {
        let cls = obj.cls().clone();
        let fresh = obj.primary_vars();
        {
            let mut state = self.core.state.borrow_mut();
            if let Some(old) = obj.saved_primary_vars() {
                state
                    .cache
                    .remove(&CacheKey::new(cls.id(), PkTuple::from_variables(&old)));
            }
            state
                .cache
                .insert(CacheKey::new(cls.id(), PkTuple::from_variables(&fresh)), obj);
        }
        obj.set_saved_primary_vars(Some(fresh));
    }

    fn remove_from_cache(&self, obj: &ObjRef) {
        if let Some(old) = obj.saved_primary_vars() {
            let key = CacheKey::new(obj.cls().id(), PkTuple::from_variables(&old));
            self.core.state.borrow_mut().cache.remove(&key);
            obj.set_saved_primary_vars(None);
        }
    }

    /// Every live cached object.
    pub(crate) fn iter_cached(&self) -> Vec<ObjRef> {
        self.core.state.borrow_mut().cache.iter_live()
    }

    // ========================================================================
    // Change notification
    // ========================================================================

    fn enable_change_notification(&self, obj: &ObjRef) {
        let weak = Rc::downgrade(&self.core);
        obj.enable_change_notification(Rc::new(move |info: &ObjRef, changed: &Changed| {
            // Clearing a variable does not schedule a write.
            if matches!(changed.new, VarValue::Unset) {
                return;
            }
            if let Some(core) = weak.upgrade() {
                core.state
                    .borrow_mut()
                    .dirty
                    .insert(ptr_of(info), Rc::clone(info));
            }
        }));
    }

    fn disable_change_notification(&self, obj: &ObjRef) {
        obj.disable_change_notification();
    }
}

fn column_exprs(cls: &ClassRef) -> Vec<Expr> {
    cls.columns().iter().map(Expr::from).collect()
}

/// Conversion of primary key arguments into an ordered value tuple.
pub trait IntoKey {
    fn into_key(self) -> Vec<Value>;
}

impl IntoKey for Value {
    fn into_key(self) -> Vec<Value> {
        vec![self]
    }
}

impl IntoKey for Vec<Value> {
    fn into_key(self) -> Vec<Value> {
        self
    }
}

impl IntoKey for i64 {
    fn into_key(self) -> Vec<Value> {
        vec![Value::Int(self)]
    }
}

impl IntoKey for i32 {
    fn into_key(self) -> Vec<Value> {
        vec![Value::Int(i64::from(self))]
    }
}

impl IntoKey for &str {
    fn into_key(self) -> Vec<Value> {
        vec![Value::Text(self.to_string())]
    }
}

impl IntoKey for String {
    fn into_key(self) -> Vec<Value> {
        vec![Value::Text(self)]
    }
}

impl<A: Into<Value>, B: Into<Value>> IntoKey for (A, B) {
    fn into_key(self) -> Vec<Value> {
        vec![self.0.into(), self.1.into()]
    }
}

impl<A: Into<Value>, B: Into<Value>, C: Into<Value>> IntoKey for (A, B, C) {
    fn into_key(self) -> Vec<Value> {
        vec![self.0.into(), self.1.into(), self.2.into()]
    }
}
