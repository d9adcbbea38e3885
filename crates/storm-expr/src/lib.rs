//! Expression AST and statement types for Storm Rust.
//!
//! The session layer builds [`Statement`]s out of [`Expr`]s and hands them to
//! a driver for execution; SQL text generation is a driver concern and does
//! not live here. The one evaluator this crate does ship is
//! [`compile_match`], which runs a supported subset of where-clauses against
//! in-memory objects for cache reconciliation.

pub mod eval;
pub mod expr;
pub mod statement;

pub use eval::{ColumnResolver, Matcher, compile_match};
pub use expr::{AggFunc, BinaryOp, Expr, compare_columns};
pub use statement::{Delete, FromExpr, Insert, Join, JoinKind, Select, Statement, Update};
