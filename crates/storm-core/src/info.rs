//! Class and object metadata.
//!
//! A [`ClassInfo`] is the static descriptor of a registered entity class:
//! its table, ordered columns, and primary key. An [`ObjectInfo`] is the
//! per-instance shadow record: one change-tracked [`Variable`] per column, a
//! free-form property bag, the store binding, pending markers, and the
//! save/restore snapshot used by rollback.
//!
//! Objects are handles: applications and the store alike hold
//! [`ObjRef`]s (`Rc<ObjectInfo>`). Identity is `Rc` pointer identity.

use crate::error::{Error, Result};
use crate::event::{Changed, Event, EventHub};
use crate::value::Value;
use crate::variable::{SqlType, VarValue, Variable};
use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

/// Shared handle to a registered class descriptor.
pub type ClassRef = Rc<ClassInfo>;

/// Shared handle to a tracked object.
pub type ObjRef = Rc<ObjectInfo>;

/// Process-unique identifier assigned at class registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClassId(u64);

static NEXT_CLASS_ID: AtomicU64 = AtomicU64::new(1);

/// A table column: name, owning table, and coercion type.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub table: String,
    pub ty: SqlType,
}

impl Column {
    /// Create a fresh unset variable for this column.
    pub fn variable(&self) -> Variable {
        Variable::new(self.ty)
    }

    /// Create a variable holding `value`, coerced for this column.
    pub fn variable_with(&self, value: VarValue, from_db: bool) -> Result<Variable> {
        Variable::with_value(self.ty, value, from_db)
    }
}

/// Optional per-class callback invoked after an instance hydrates.
pub type LoadHook = fn(&ObjRef);

/// Static per-class descriptor.
#[derive(Debug)]
pub struct ClassInfo {
    id: ClassId,
    name: String,
    table: String,
    columns: Vec<Column>,
    primary_key_pos: Vec<usize>,
    load_hook: Option<LoadHook>,
}

impl ClassInfo {
    /// Register a class: name, table, ordered `(column, type)` pairs, and the
    /// ordered primary key column names.
    pub fn build(
        name: impl Into<String>,
        table: impl Into<String>,
        columns: &[(&str, SqlType)],
        primary_key: &[&str],
    ) -> Result<ClassRef> {
        Self::build_with_load(name, table, columns, primary_key, None)
    }

    /// Like [`ClassInfo::build`], with a post-hydration callback.
    pub fn build_with_load(
        name: impl Into<String>,
        table: impl Into<String>,
        columns: &[(&str, SqlType)],
        primary_key: &[&str],
        load_hook: Option<LoadHook>,
    ) -> Result<ClassRef> {
        let name = name.into();
        let table = table.into();
        if primary_key.is_empty() {
            return Err(Error::Feature(format!(
                "class {name} must declare at least one primary key column"
            )));
        }
        let columns: Vec<Column> = columns
            .iter()
            .map(|(col_name, ty)| Column {
                name: (*col_name).to_string(),
                table: table.clone(),
                ty: *ty,
            })
            .collect();
        for (i, column) in columns.iter().enumerate() {
            if columns[..i].iter().any(|c| c.name == column.name) {
                return Err(Error::Feature(format!(
                    "class {name} declares column {} twice",
                    column.name
                )));
            }
        }
        let mut primary_key_pos = Vec::with_capacity(primary_key.len());
        for key in primary_key {
            let pos = columns
                .iter()
                .position(|c| c.name == *key)
                .ok_or_else(|| {
                    Error::Feature(format!("class {name} has no primary key column {key}"))
                })?;
            primary_key_pos.push(pos);
        }
        Ok(Rc::new(Self {
            id: ClassId(NEXT_CLASS_ID.fetch_add(1, Ordering::Relaxed)),
            name,
            table,
            columns,
            primary_key_pos,
            load_hook,
        }))
    }

    pub fn id(&self) -> ClassId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// All columns, in declaration order.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Positions of the primary key columns within [`ClassInfo::columns`].
    pub fn primary_key_pos(&self) -> &[usize] {
        &self.primary_key_pos
    }

    /// The primary key columns, in key order.
    pub fn primary_key(&self) -> Vec<Column> {
        self.primary_key_pos
            .iter()
            .map(|&i| self.columns[i].clone())
            .collect()
    }

    /// Schema lookup: resolve a column by name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Resolve a column name to its index.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn load_hook(&self) -> Option<LoadHook> {
        self.load_hook
    }
}

/// Pending unit-of-work marker on a tracked object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pending {
    /// Slated for INSERT at the next flush.
    Add,
    /// Slated for DELETE at the next flush.
    Remove,
}

/// The binding between a tracked object and its owning store.
///
/// Identity comparisons go through the numeric store id, so they stay valid
/// even after the store itself is gone. `owner` recovers the live store for
/// `Store::of`.
#[derive(Clone)]
pub struct StoreBinding {
    id: u64,
    owner: Weak<dyn Any>,
}

impl StoreBinding {
    pub fn new(id: u64, owner: Weak<dyn Any>) -> Self {
        Self { id, owner }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Upgrade to the owning store, if it is still alive.
    pub fn owner(&self) -> Option<Rc<dyn Any>> {
        self.owner.upgrade()
    }
}

impl fmt::Debug for StoreBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreBinding").field("id", &self.id).finish()
    }
}

/// Store-installed change notification sink.
///
/// Installed on the Alive transition, removed on the Ghost transition; a
/// single slot, so re-enabling never double-registers.
pub type ChangeSink = Rc<dyn Fn(&ObjRef, &Changed)>;

#[derive(Clone)]
struct Snapshot {
    variables: Vec<Variable>,
    bag: HashMap<String, Value>,
    store: Option<StoreBinding>,
    pending: Option<Pending>,
    saved_primary_vars: Option<Vec<Variable>>,
}

struct Inner {
    variables: Vec<Variable>,
    bag: HashMap<String, Value>,
    store: Option<StoreBinding>,
    pending: Option<Pending>,
    /// Primary key snapshot under which the store has this object cached.
    saved_primary_vars: Option<Vec<Variable>>,
    saved: Option<Snapshot>,
    change_sink: Option<ChangeSink>,
}

/// Per-instance shadow record.
pub struct ObjectInfo {
    cls: ClassRef,
    inner: RefCell<Inner>,
    events: EventHub,
}

impl ObjectInfo {
    /// Allocate a blank instance of `cls` with every column unset.
    pub fn new(cls: &ClassRef) -> ObjRef {
        Rc::new(Self {
            cls: Rc::clone(cls),
            inner: RefCell::new(Inner {
                variables: cls.columns().iter().map(Column::variable).collect(),
                bag: HashMap::new(),
                store: None,
                pending: None,
                saved_primary_vars: None,
                saved: None,
                change_sink: None,
            }),
            events: EventHub::new(),
        })
    }

    pub fn cls(&self) -> &ClassRef {
        &self.cls
    }

    pub fn events(&self) -> &EventHub {
        &self.events
    }

    // ========================================================================
    // Variables
    // ========================================================================

    /// Contents of the variable at `index`.
    pub fn value(&self, index: usize) -> VarValue {
        self.inner.borrow().variables[index].get()
    }

    /// Contents of the variable for the named column.
    pub fn get(&self, name: &str) -> Result<VarValue> {
        let index = self.column_index(name)?;
        Ok(self.value(index))
    }

    /// Assign the variable at `index`, firing change notifications.
    pub fn set_value(self: &Rc<Self>, index: usize, value: VarValue, from_db: bool) -> Result<()> {
        self.update_variable(index, from_db, |var| var.set(value, from_db).map(|_| ()))
    }

    /// Assign the named column from an application value
    /// (`Value::Null` becomes an explicit NULL).
    pub fn set(self: &Rc<Self>, name: &str, value: impl Into<Value>) -> Result<()> {
        let index = self.column_index(name)?;
        self.set_value(index, VarValue::from_db_value(value.into()), false)
    }

    /// Apply `apply` to the variable at `index`, then fire change
    /// notifications with the observed old/new contents.
    pub fn update_variable<F>(self: &Rc<Self>, index: usize, from_db: bool, apply: F) -> Result<()>
    where
        F: FnOnce(&mut Variable) -> Result<()>,
    {
        let (old, new, sink) = {
            let mut inner = self.inner.borrow_mut();
            let old = inner.variables[index].get();
            apply(&mut inner.variables[index])?;
            let new = inner.variables[index].get();
            (old, new, inner.change_sink.clone())
        };
        let changed = Changed {
            column: index,
            old,
            new,
            from_db,
        };
        if let Some(sink) = sink {
            sink(self, &changed);
        }
        self.events.emit(&Event::Changed(changed));
        Ok(())
    }

    /// Read access to all variables at once.
    pub fn with_variables<R>(&self, f: impl FnOnce(&[Variable]) -> R) -> R {
        f(&self.inner.borrow().variables)
    }

    /// Snapshot of the variable at `index`.
    pub fn variable(&self, index: usize) -> Variable {
        self.inner.borrow().variables[index].copy()
    }

    /// Checkpoint every variable.
    pub fn checkpoint(&self) {
        for var in &mut self.inner.borrow_mut().variables {
            var.checkpoint();
        }
    }

    /// Checkpoint a single variable.
    pub fn checkpoint_variable(&self, index: usize) {
        self.inner.borrow_mut().variables[index].checkpoint();
    }

    /// Value-equal copies of the live primary key variables, in key order.
    pub fn primary_vars(&self) -> Vec<Variable> {
        let inner = self.inner.borrow();
        self.cls
            .primary_key_pos()
            .iter()
            .map(|&i| inner.variables[i].copy())
            .collect()
    }

    fn column_index(&self, name: &str) -> Result<usize> {
        self.cls.column_index(name).ok_or_else(|| {
            Error::Feature(format!("class {} has no column {name}", self.cls.name()))
        })
    }

    // ========================================================================
    // Property bag
    // ========================================================================

    pub fn get_prop(&self, key: &str) -> Option<Value> {
        self.inner.borrow().bag.get(key).cloned()
    }

    pub fn set_prop(&self, key: impl Into<String>, value: Value) {
        self.inner.borrow_mut().bag.insert(key.into(), value);
    }

    // ========================================================================
    // Store bookkeeping
    // ========================================================================

    pub fn store(&self) -> Option<StoreBinding> {
        self.inner.borrow().store.clone()
    }

    pub fn set_store(&self, binding: Option<StoreBinding>) {
        self.inner.borrow_mut().store = binding;
    }

    pub fn pending(&self) -> Option<Pending> {
        self.inner.borrow().pending
    }

    pub fn set_pending(&self, pending: Option<Pending>) {
        self.inner.borrow_mut().pending = pending;
    }

    pub fn take_pending(&self) -> Option<Pending> {
        self.inner.borrow_mut().pending.take()
    }

    /// The primary key snapshot under which the store cached this object,
    /// if it was ever flushed or loaded.
    pub fn saved_primary_vars(&self) -> Option<Vec<Variable>> {
        self.inner.borrow().saved_primary_vars.clone()
    }

    pub fn set_saved_primary_vars(&self, vars: Option<Vec<Variable>>) {
        self.inner.borrow_mut().saved_primary_vars = vars;
    }

    pub fn enable_change_notification(&self, sink: ChangeSink) {
        self.inner.borrow_mut().change_sink = Some(sink);
    }

    pub fn disable_change_notification(&self) {
        self.inner.borrow_mut().change_sink = None;
    }

    pub fn has_change_notification(&self) -> bool {
        self.inner.borrow().change_sink.is_some()
    }

    // ========================================================================
    // Save / restore
    // ========================================================================

    /// Snapshot the full shadow state as the rollback baseline.
    pub fn save(&self) {
        let mut inner = self.inner.borrow_mut();
        let snapshot = Snapshot {
            variables: inner.variables.clone(),
            bag: inner.bag.clone(),
            store: inner.store.clone(),
            pending: inner.pending,
            saved_primary_vars: inner.saved_primary_vars.clone(),
        };
        inner.saved = Some(snapshot);
    }

    /// Refresh only the property-bag part of the existing snapshot.
    pub fn save_attributes(&self) {
        let inner = &mut *self.inner.borrow_mut();
        match &mut inner.saved {
            Some(snapshot) => snapshot.bag = inner.bag.clone(),
            None => {
                inner.saved = Some(Snapshot {
                    variables: inner.variables.clone(),
                    bag: inner.bag.clone(),
                    store: inner.store.clone(),
                    pending: inner.pending,
                    saved_primary_vars: inner.saved_primary_vars.clone(),
                });
            }
        }
    }

    /// Revert the shadow state to the last [`ObjectInfo::save`] snapshot.
    ///
    /// Bypasses change notification; the snapshot is kept so repeated
    /// rollbacks restore to the same baseline.
    pub fn restore(&self) {
        let mut inner = self.inner.borrow_mut();
        let Some(snapshot) = inner.saved.clone() else {
            return;
        };
        inner.variables = snapshot.variables;
        inner.bag = snapshot.bag;
        inner.store = snapshot.store;
        inner.pending = snapshot.pending;
        inner.saved_primary_vars = snapshot.saved_primary_vars;
    }
}

impl fmt::Debug for ObjectInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pending = self.inner.try_borrow().map(|inner| inner.pending);
        f.debug_struct("ObjectInfo")
            .field("cls", &self.cls.name())
            .field("pending", &pending.unwrap_or(None))
            .finish()
    }
}
