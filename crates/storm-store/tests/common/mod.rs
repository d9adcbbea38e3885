//! Scripted database double shared by the store behavior tests.
//!
//! Every executed statement is recorded for assertion. SELECTs pop the next
//! canned row set off the script; everything else returns an empty cursor.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use storm_core::{ClassInfo, ClassRef, Error, Result, SqlType, Value, Variable};
use storm_expr::{Expr, Statement, compare_columns};
use storm_store::{Connection, Database, Rows, Store};

/// Shared script state: canned responses in, executed statements out.
#[derive(Default)]
pub struct Script {
    pub log: Vec<Statement>,
    pub selects: VecDeque<Vec<Vec<Value>>>,
    pub insert_identity: Option<Expr>,
    pub commits: usize,
    pub rollbacks: usize,
    pub closed: bool,
}

impl Script {
    /// Queue a canned row set for the next unanswered SELECT.
    pub fn push_select(&mut self, rows: Vec<Vec<Value>>) {
        self.selects.push_back(rows);
    }

    /// Executed statements of a given kind.
    pub fn of_kind(&self, kind: &str) -> Vec<Statement> {
        self.log
            .iter()
            .filter(|s| s.kind() == kind)
            .cloned()
            .collect()
    }
}

pub type ScriptRef = Rc<RefCell<Script>>;

pub struct ScriptedDb {
    script: ScriptRef,
}

impl ScriptedDb {
    pub fn new() -> (Self, ScriptRef) {
        let script: ScriptRef = Rc::new(RefCell::new(Script::default()));
        (
            Self {
                script: Rc::clone(&script),
            },
            script,
        )
    }
}

impl Database for ScriptedDb {
    fn connect(&self) -> Result<Box<dyn Connection>> {
        Ok(Box::new(ScriptedConn {
            script: Rc::clone(&self.script),
        }))
    }
}

struct ScriptedConn {
    script: ScriptRef,
}

impl Connection for ScriptedConn {
    fn execute(&mut self, statement: &Statement, _noresult: bool) -> Result<Box<dyn Rows>> {
        let mut script = self.script.borrow_mut();
        script.log.push(statement.clone());
        let rows = match statement {
            Statement::Select(_) => script.selects.pop_front().unwrap_or_default(),
            _ => Vec::new(),
        };
        Ok(Box::new(ScriptedRows {
            rows: rows.into(),
            insert_identity: script.insert_identity.clone(),
        }))
    }

    fn commit(&mut self) -> Result<()> {
        self.script.borrow_mut().commits += 1;
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        self.script.borrow_mut().rollbacks += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.script.borrow_mut().closed = true;
        Ok(())
    }
}

struct ScriptedRows {
    rows: VecDeque<Vec<Value>>,
    insert_identity: Option<Expr>,
}

impl Rows for ScriptedRows {
    fn get_one(&mut self) -> Result<Option<Vec<Value>>> {
        Ok(self.rows.pop_front())
    }

    fn get_insert_identity(
        &self,
        primary_key: &[storm_core::Column],
        primary_vars: &[Variable],
    ) -> Result<Expr> {
        if let Some(expr) = &self.insert_identity {
            return Ok(expr.clone());
        }
        if primary_vars.iter().all(Variable::is_defined) {
            Ok(compare_columns(primary_key, primary_vars))
        } else {
            Err(Error::Feature(
                "scripted driver has no insert identity".to_string(),
            ))
        }
    }
}

/// `person(id pk, name)`
pub fn person_class() -> ClassRef {
    ClassInfo::build(
        "Person",
        "person",
        &[("id", SqlType::Int), ("name", SqlType::Text)],
        &["id"],
    )
    .unwrap()
}

/// `team(id pk, name)`
pub fn team_class() -> ClassRef {
    ClassInfo::build(
        "Team",
        "team",
        &[("id", SqlType::Int), ("name", SqlType::Text)],
        &["id"],
    )
    .unwrap()
}

/// `parent(id pk)`
pub fn parent_class() -> ClassRef {
    ClassInfo::build("Parent", "parent", &[("id", SqlType::Int)], &["id"]).unwrap()
}

/// `child(id pk, parent_id)`
pub fn child_class() -> ClassRef {
    ClassInfo::build(
        "Child",
        "child",
        &[("id", SqlType::Int), ("parent_id", SqlType::Int)],
        &["id"],
    )
    .unwrap()
}

/// A store over a fresh scripted connection.
pub fn scripted_store() -> (Store, ScriptRef) {
    let (db, script) = ScriptedDb::new();
    let store = Store::new(&db).unwrap();
    (store, script)
}

pub fn int(v: i64) -> Value {
    Value::Int(v)
}

pub fn text(s: &str) -> Value {
    Value::Text(s.to_string())
}
