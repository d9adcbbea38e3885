//! Core types for Storm Rust.
//!
//! This crate holds everything below the session layer: dynamic [`Value`]s,
//! the tri-state change-tracked [`Variable`] cell, per-class and per-instance
//! metadata ([`ClassInfo`] / [`ObjectInfo`]), the per-object [`EventHub`],
//! and the shared error taxonomy.

pub mod error;
pub mod event;
pub mod info;
pub mod value;
pub mod variable;

pub use error::{
    ConnectionError, ConnectionErrorKind, Error, QueryError, QueryErrorKind, Result, TypeError,
};
pub use event::{Changed, Event, EventHub, HookId};
pub use info::{
    ChangeSink, ClassId, ClassInfo, ClassRef, Column, LoadHook, ObjRef, ObjectInfo, Pending,
    StoreBinding,
};
pub use value::Value;
pub use variable::{SqlType, VarValue, Variable};
