//! Unified SQL storage implementations.
//!
//! This module provides the shared version store for SQL-based backends
//! (PostgreSQL, SQLite). The implementation is parameterized by dialect
//! using the `SqlDialect` trait.

mod query;
mod version_store;

pub use query::SqlDialect;
pub use version_store::SqlVersionStore;

#[cfg(feature = "postgres")]
pub mod postgres {
    //! PostgreSQL dialect.

    use sea_query::{Alias, IntoTableRef, PostgresQueryBuilder, TableRef};
    use sea_query_binder::{SqlxBinder, SqlxValues};

    use crate::storage::schema::{
        CREATE_POSTGRES_SCHEMA, DROP_POSTGRES_SCHEMA, OCC_TABLE, PROJECTION_SCHEMA,
    };

    /// SQLSTATE `unique_violation`.
    const UNIQUE_VIOLATION: &str = "23505";

    /// PostgreSQL dialect marker type.
    pub struct Postgres;

    impl super::SqlDialect for Postgres {
        type Database = sqlx::Postgres;

        const NAME: &'static str = "postgres";
        const CREATE_SCHEMA: &'static [&'static str] = CREATE_POSTGRES_SCHEMA;
        const DROP_SCHEMA: &'static [&'static str] = DROP_POSTGRES_SCHEMA;

        fn table() -> TableRef {
            (Alias::new(PROJECTION_SCHEMA), Alias::new(OCC_TABLE)).into_table_ref()
        }

        fn build<S: SqlxBinder>(stmt: &S) -> (String, SqlxValues) {
            stmt.build_sqlx(PostgresQueryBuilder)
        }

        fn is_compatible(url: &str) -> bool {
            url.starts_with("postgres://") || url.starts_with("postgresql://")
        }

        fn is_duplicate_code(code: &str) -> bool {
            code == UNIQUE_VIOLATION
        }
    }

    /// PostgreSQL version store.
    pub type PostgresVersionStore = super::SqlVersionStore<Postgres>;
}

#[cfg(feature = "sqlite")]
pub mod sqlite {
    //! SQLite dialect.

    use sea_query::{Alias, IntoTableRef, SqliteQueryBuilder, TableRef};
    use sea_query_binder::{SqlxBinder, SqlxValues};

    use crate::storage::schema::{CREATE_SQLITE_SCHEMA, DROP_SQLITE_SCHEMA, PREFIXED_OCC_TABLE};

    /// `SQLITE_CONSTRAINT_PRIMARYKEY` extended result code.
    const CONSTRAINT_PRIMARYKEY: &str = "1555";
    /// `SQLITE_CONSTRAINT_UNIQUE` extended result code.
    const CONSTRAINT_UNIQUE: &str = "2067";

    /// SQLite dialect marker type.
    pub struct Sqlite;

    impl super::SqlDialect for Sqlite {
        type Database = sqlx::Sqlite;

        const NAME: &'static str = "sqlite";
        const CREATE_SCHEMA: &'static [&'static str] = CREATE_SQLITE_SCHEMA;
        const DROP_SCHEMA: &'static [&'static str] = DROP_SQLITE_SCHEMA;

        fn table() -> TableRef {
            Alias::new(PREFIXED_OCC_TABLE).into_table_ref()
        }

        fn build<S: SqlxBinder>(stmt: &S) -> (String, SqlxValues) {
            stmt.build_sqlx(SqliteQueryBuilder)
        }

        fn is_compatible(url: &str) -> bool {
            url.starts_with("sqlite:")
        }

        fn is_duplicate_code(code: &str) -> bool {
            code == CONSTRAINT_PRIMARYKEY || code == CONSTRAINT_UNIQUE
        }
    }

    /// SQLite version store.
    pub type SqliteVersionStore = super::SqlVersionStore<Sqlite>;
}
