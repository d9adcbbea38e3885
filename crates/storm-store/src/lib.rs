//! Store, result sets, and the unit of work for Storm Rust.
//!
//! The [`Store`] is the session: it owns one connection, keeps at most one
//! live in-memory object per database row through a weak identity map, and
//! batches inserts, updates, and deletes into an explicitly flushed unit of
//! work. [`ResultSet`] is its lazy query companion; [`TableSet`] seeds finds
//! with explicit FROM tables.
//!
//! # Example
//!
//! ```ignore
//! let person = ClassInfo::build(
//!     "Person",
//!     "person",
//!     &[("id", SqlType::Int), ("name", SqlType::Text)],
//!     &["id"],
//! )?;
//!
//! let store = Store::new(&database)?;
//!
//! // Identity-mapped retrieval: the same row is the same object.
//! let alice = store.get(&person, 1)?.unwrap();
//! assert!(Rc::ptr_eq(&alice, &store.get(&person, 1)?.unwrap()));
//!
//! // Unit of work: mutations batch until flush/commit.
//! alice.set("name", "Alicia")?;
//! store.commit()?;
//! ```

pub mod args;
pub mod database;
pub mod identity;
pub mod result_set;
pub mod store;
pub mod table_set;

pub use args::{Filters, where_for_args};
pub use database::{Connection, Database, NoRows, Rows};
pub use identity::{CacheKey, IdentityMap, PkTuple};
pub use result_set::{ClsSpec, Loaded, ResultIter, ResultSet, SetTo, ValuesIter};
pub use store::{IntoKey, Store, StoreConfig, StoreStats};
pub use table_set::TableSet;
