//! SQL dialect abstraction trait.

use sea_query::TableRef;
use sea_query_binder::{SqlxBinder, SqlxValues};

/// Trait for SQL dialect backends.
///
/// This trait abstracts over different SQL databases (PostgreSQL, SQLite)
/// by providing the database type, statement building, provisioning DDL and
/// the one piece of real per-dialect logic: recognising a duplicate-key error.
pub trait SqlDialect: Send + Sync + 'static {
    /// The sqlx database driver for this dialect.
    type Database: sqlx::Database;

    /// Human-readable dialect name.
    const NAME: &'static str;

    /// Statements creating the version table, executed in order.
    const CREATE_SCHEMA: &'static [&'static str];

    /// Statements dropping the version table, executed in order.
    const DROP_SCHEMA: &'static [&'static str];

    /// The version table, qualified with its namespace.
    fn table() -> TableRef;

    /// Build a SQL string and bound values from a sea-query statement.
    fn build<S: SqlxBinder>(stmt: &S) -> (String, SqlxValues);

    /// Whether a connection URL targets an engine speaking this dialect.
    fn is_compatible(url: &str) -> bool;

    /// Whether a driver error code denotes a uniqueness violation.
    fn is_duplicate_code(code: &str) -> bool;

    /// Whether a statement error is a uniqueness violation.
    ///
    /// Anything that cannot be positively identified is not a duplicate, so
    /// the caller propagates it instead of reporting a conflict.
    fn is_duplicate(err: &sqlx::Error) -> bool {
        match err {
            sqlx::Error::Database(db) => db
                .code()
                .is_some_and(|code| Self::is_duplicate_code(&code)),
            _ => false,
        }
    }
}

/// Scheme portion of a connection URL, safe to log.
pub(crate) fn scheme(url: &str) -> &str {
    url.split(':').next().unwrap_or_default()
}
