//! Storm Rust - a session-centric object-relational mapper.
//!
//! Storm Rust is a Rust port of a classic session/unit-of-work ORM design:
//!
//! - Identity-mapped retrieval: one live in-memory object per database row
//! - A unit of work that batches inserts, updates, and deletes at flush time
//! - Per-attribute change tracking through typed variable cells
//! - Lazy, composable result sets with slicing, aggregation, and bulk
//!   mutation that keeps cached objects coherent
//! - A narrow driver boundary: statements are structured values, and SQL
//!   text generation is left to driver crates
//!
//! # Quick Start
//!
//! ```ignore
//! use storm::prelude::*;
//!
//! // Register a class: table, ordered columns, primary key.
//! let person = ClassInfo::build(
//!     "Person",
//!     "person",
//!     &[("id", SqlType::Int), ("name", SqlType::Text)],
//!     &["id"],
//! )?;
//!
//! // Open a session over a driver's database handle.
//! let store = Store::new(&database)?;
//!
//! // Create and persist an object.
//! let bob = store.create(&person, &[("id", Value::Int(1)), ("name", Value::from("Bob"))])?;
//! store.commit()?;
//!
//! // Identity-mapped lookup: the same row yields the same handle.
//! let again = store.get(&person, 1)?.unwrap();
//! assert!(std::rc::Rc::ptr_eq(&bob, &again));
//!
//! // Query, order, slice.
//! let id = person.column("id").unwrap().clone();
//! let first = store
//!     .find(&person, ())?
//!     .order_by(vec![Expr::from(&id).asc()])?
//!     .first()?;
//! ```

pub use storm_core::{
    Changed, ChangeSink, ClassId, ClassInfo, ClassRef, Column, ConnectionError,
    ConnectionErrorKind, Error, Event, EventHub, HookId, LoadHook, ObjRef, ObjectInfo, Pending,
    QueryError, QueryErrorKind, Result, SqlType, StoreBinding, TypeError, Value, VarValue,
    Variable,
};
pub use storm_expr::{
    AggFunc, BinaryOp, ColumnResolver, Delete, Expr, FromExpr, Insert, Join, JoinKind, Matcher,
    Select, Statement, Update, compare_columns, compile_match,
};
pub use storm_store::{
    CacheKey, ClsSpec, Connection, Database, Filters, IdentityMap, IntoKey, Loaded, NoRows,
    PkTuple, ResultIter, ResultSet, Rows, SetTo, Store, StoreConfig, StoreStats, TableSet,
    ValuesIter, where_for_args,
};

/// Convenience re-exports for application code.
pub mod prelude {
    pub use crate::{
        ClassInfo, ClassRef, Column, Error, Event, Expr, Filters, FromExpr, Loaded, ObjRef,
        Result, SetTo, SqlType, Statement, Store, Value, VarValue,
    };
}
