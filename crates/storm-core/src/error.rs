//! Error types for Storm operations.

use std::fmt;

/// The primary error type for all Storm operations.
#[derive(Debug)]
pub enum Error {
    /// An object is attached to a different store (or to none) when the
    /// operation requires attachment to this one.
    WrongStore(String),
    /// An object that was never flushed cannot be reloaded.
    NotFlushed(String),
    /// A flush could not make progress due to a cyclic flush-order constraint.
    OrderLoop(String),
    /// `first()` or `last()` was called on an unordered result set.
    Unordered(String),
    /// `one()` found more than one qualifying row.
    NotOne(String),
    /// Unsupported API composition.
    Feature(String),
    /// A where-clause could not be compiled to an in-memory predicate.
    Compile(String),
    /// Positional result-set indexing went past the end of the results.
    OutOfRange(String),
    /// Value coercion failure.
    Type(TypeError),
    /// Connection-level errors from the database driver.
    Connection(ConnectionError),
    /// Statement execution errors from the database driver.
    Query(QueryError),
}

#[derive(Debug)]
pub struct TypeError {
    pub expected: String,
    pub found: String,
    pub column: Option<String>,
}

#[derive(Debug)]
pub struct ConnectionError {
    pub kind: ConnectionErrorKind,
    pub message: String,
}

#[derive(Debug)]
pub enum ConnectionErrorKind {
    /// Failed to establish connection
    Connect,
    /// Connection was closed unexpectedly
    Closed,
    /// Connection timeout
    Timeout,
}

#[derive(Debug)]
pub struct QueryError {
    pub kind: QueryErrorKind,
    pub message: String,
    pub statement: Option<String>,
}

#[derive(Debug)]
pub enum QueryErrorKind {
    /// Constraint violation (unique, foreign key, etc.)
    Constraint,
    /// Row, table, or column not found
    NotFound,
    /// Query timeout
    Timeout,
    /// Other execution error
    Execution,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::WrongStore(msg) => write!(f, "Wrong store: {}", msg),
            Error::NotFlushed(msg) => write!(f, "Not flushed: {}", msg),
            Error::OrderLoop(msg) => write!(f, "Order loop: {}", msg),
            Error::Unordered(msg) => write!(f, "Unordered: {}", msg),
            Error::NotOne(msg) => write!(f, "Not one: {}", msg),
            Error::Feature(msg) => write!(f, "Unsupported: {}", msg),
            Error::Compile(msg) => write!(f, "Compile error: {}", msg),
            Error::OutOfRange(msg) => write!(f, "Out of range: {}", msg),
            Error::Type(e) => {
                if let Some(col) = &e.column {
                    write!(
                        f,
                        "Type error in column '{}': expected {}, found {}",
                        col, e.expected, e.found
                    )
                } else {
                    write!(f, "Type error: expected {}, found {}", e.expected, e.found)
                }
            }
            Error::Connection(e) => write!(f, "Connection error: {}", e.message),
            Error::Query(e) => {
                if let Some(stmt) = &e.statement {
                    write!(f, "Query error: {} (statement: {})", e.message, stmt)
                } else {
                    write!(f, "Query error: {}", e.message)
                }
            }
        }
    }
}

impl std::error::Error for Error {}

/// Result type alias for Storm operations.
pub type Result<T> = std::result::Result<T, Error>;
