//! Database schema definitions using sea-query.
//!
//! These define the table and column identifiers for type-safe query building.
//! The table name itself is dialect-specific, see [`SqlDialect::table`].
//!
//! [`SqlDialect::table`]: super::sql::SqlDialect::table

use sea_query::Iden;

/// Namespace holding the version table on engines with schema support.
pub const PROJECTION_SCHEMA: &str = "projection";

/// Version table name inside [`PROJECTION_SCHEMA`].
pub const OCC_TABLE: &str = "occ";

/// Version table name on engines without schemas.
pub const PREFIXED_OCC_TABLE: &str = "projection_occ";

/// Version records table columns.
#[derive(Iden)]
pub enum Occ {
    #[iden = "handler"]
    Handler,
    #[iden = "resource"]
    Resource,
    #[iden = "version"]
    Version,
}

/// SQL for creating the PostgreSQL version table.
pub const CREATE_POSTGRES_SCHEMA: &[&str] = &[
    "CREATE SCHEMA IF NOT EXISTS projection",
    r#"
CREATE TABLE IF NOT EXISTS projection.occ (
    handler TEXT NOT NULL,
    resource BYTEA NOT NULL,
    version BYTEA NOT NULL,
    PRIMARY KEY (handler, resource)
)
"#,
];

/// SQL for dropping the PostgreSQL version table.
pub const DROP_POSTGRES_SCHEMA: &[&str] = &["DROP SCHEMA IF EXISTS projection CASCADE"];

/// SQL for creating the SQLite version table.
pub const CREATE_SQLITE_SCHEMA: &[&str] = &[r#"
CREATE TABLE IF NOT EXISTS projection_occ (
    handler TEXT NOT NULL,
    resource BLOB NOT NULL,
    version BLOB NOT NULL,
    PRIMARY KEY (handler, resource)
)
"#];

/// SQL for dropping the SQLite version table.
pub const DROP_SQLITE_SCHEMA: &[&str] = &["DROP TABLE IF EXISTS projection_occ"];
