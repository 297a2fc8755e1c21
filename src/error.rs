//! Crate-wide error type.
//!
//! Every failure aborts the statement that raised it. Messages follow
//! SQLite's wording where SQLite has an equivalent error so that callers
//! comparing against a reference engine can match them.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors raised while parsing, building or executing a statement.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// SQL text rejected by the parser.
    #[error("near \"{near}\": syntax error: {detail}")]
    Syntax { near: String, detail: String },

    /// Referenced table does not exist.
    #[error("no such table: {name}")]
    TableNotFound { name: String },

    /// CREATE TABLE for a name already in use.
    #[error("table {name} already exists")]
    TableExists { name: String },

    /// Referenced column is not visible in any in-scope table or alias.
    #[error("no such column: {name}")]
    ColumnNotFound { name: String },

    /// Unqualified column name matches more than one in-scope table.
    #[error("ambiguous column name: {name}")]
    AmbiguousColumn { name: String },

    /// Compound SELECT operands disagree on their shape.
    #[error("{detail}")]
    SchemaIncompatible { detail: String },

    /// Operator applied outside its operand domain.
    #[error("type mismatch: {detail}")]
    TypeMismatch { detail: String },

    /// INSERT row arity differs from its target column list.
    #[error("table {table} has {expected} columns but {actual} values were supplied")]
    ValueCountMismatch {
        table: String,
        expected: usize,
        actual: usize,
    },

    /// Function called with an unsupported number of arguments.
    #[error("wrong number of arguments to function {function}()")]
    WrongArgumentCount { function: String },

    /// Function name not known to the engine.
    #[error("no such function: {name}")]
    UnknownFunction { name: String },

    /// Aggregate used where only row-level expressions are allowed.
    #[error("misuse of aggregate: {function}()")]
    MisusedAggregate { function: String },

    /// Bound parameter missing from the caller-supplied collection.
    #[error("no value bound for parameter {name}")]
    ParameterNotFound { name: String },

    /// SUM over integers left the i64 range.
    #[error("integer overflow")]
    IntegerOverflow,

    /// Cartesian product exceeded the configured row limit.
    #[error("cartesian product exceeds {limit} rows")]
    ProductTooLarge { limit: usize },

    /// Construct recognised by the grammar but not by the engine.
    #[error("unsupported: {detail}")]
    Unsupported { detail: String },

    /// Internal contract breach. Always a programming error.
    #[error("invariant violation: {detail}")]
    InvariantViolation { detail: String },
}

/// Fieldless classification of [`Error`] for adapters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Syntax,
    TableNotFound,
    TableExists,
    ColumnNotFound,
    AmbiguousColumn,
    SchemaIncompatible,
    TypeMismatch,
    ValueCountMismatch,
    WrongArgumentCount,
    UnknownFunction,
    MisusedAggregate,
    ParameterNotFound,
    IntegerOverflow,
    ProductTooLarge,
    Unsupported,
    InvariantViolation,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Syntax { .. } => ErrorKind::Syntax,
            Error::TableNotFound { .. } => ErrorKind::TableNotFound,
            Error::TableExists { .. } => ErrorKind::TableExists,
            Error::ColumnNotFound { .. } => ErrorKind::ColumnNotFound,
            Error::AmbiguousColumn { .. } => ErrorKind::AmbiguousColumn,
            Error::SchemaIncompatible { .. } => ErrorKind::SchemaIncompatible,
            Error::TypeMismatch { .. } => ErrorKind::TypeMismatch,
            Error::ValueCountMismatch { .. } => ErrorKind::ValueCountMismatch,
            Error::WrongArgumentCount { .. } => ErrorKind::WrongArgumentCount,
            Error::UnknownFunction { .. } => ErrorKind::UnknownFunction,
            Error::MisusedAggregate { .. } => ErrorKind::MisusedAggregate,
            Error::ParameterNotFound { .. } => ErrorKind::ParameterNotFound,
            Error::IntegerOverflow => ErrorKind::IntegerOverflow,
            Error::ProductTooLarge { .. } => ErrorKind::ProductTooLarge,
            Error::Unsupported { .. } => ErrorKind::Unsupported,
            Error::InvariantViolation { .. } => ErrorKind::InvariantViolation,
        }
    }

    pub(crate) fn table_not_found(name: impl Into<String>) -> Self {
        Error::TableNotFound { name: name.into() }
    }

    pub(crate) fn column_not_found(name: impl Into<String>) -> Self {
        Error::ColumnNotFound { name: name.into() }
    }

    pub(crate) fn type_mismatch(detail: impl Into<String>) -> Self {
        Error::TypeMismatch {
            detail: detail.into(),
        }
    }

    pub(crate) fn unsupported(detail: impl Into<String>) -> Self {
        Error::Unsupported {
            detail: detail.into(),
        }
    }

    pub(crate) fn invariant(detail: impl Into<String>) -> Self {
        Error::InvariantViolation {
            detail: detail.into(),
        }
    }
}
