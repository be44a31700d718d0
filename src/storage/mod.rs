//! Storage implementations.
//!
//! Every backend implements [`VersionStore`], the optimistic-concurrency
//! contract that tracks one opaque version token per `(handler, resource)`.

mod version_store;

#[cfg(any(feature = "postgres", feature = "sqlite"))]
pub mod schema;
#[cfg(any(feature = "postgres", feature = "sqlite"))]
pub mod sql;

#[cfg(feature = "dynamo")]
pub mod dynamo;

#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

pub use version_store::{Swap, VersionStore};

#[cfg(feature = "postgres")]
pub use sql::postgres::{Postgres, PostgresVersionStore};
#[cfg(any(feature = "postgres", feature = "sqlite"))]
pub use sql::{SqlDialect, SqlVersionStore};
#[cfg(feature = "sqlite")]
pub use sql::sqlite::{Sqlite, SqliteVersionStore};

#[cfg(feature = "dynamo")]
pub use dynamo::{Decorators, DynamoUnit, DynamoVersionStore};

pub use crate::config::{DynamoConfig, PostgresConfig, SqliteConfig, StorageConfig, StorageType};

/// Errors that can occur during storage operations.
///
/// Version conflicts are deliberately absent: a failed compare-and-swap is
/// reported as `Ok(false)`, never as an error.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[cfg(any(feature = "postgres", feature = "sqlite"))]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[cfg(any(feature = "postgres", feature = "sqlite"))]
    #[error("Query build error: {0}")]
    Query(#[from] sea_query::error::Error),

    #[cfg(feature = "dynamo")]
    #[error("DynamoDB error: {0}")]
    Dynamo(Box<aws_sdk_dynamodb::Error>),

    #[cfg(feature = "dynamo")]
    #[error("DynamoDB request build error: {0}")]
    Build(#[from] aws_sdk_dynamodb::error::BuildError),

    #[cfg(feature = "dynamo")]
    #[error("DynamoDB table {table} did not become active")]
    TableNotActive { table: String },

    #[error("Backend scheme '{scheme}' is not compatible with the {dialect} dialect")]
    Incompatible { dialect: &'static str, scheme: String },

    #[error("Resource identifier must not be empty")]
    EmptyResource,

    #[error("Version record for handler {handler}, resource {resource} has no binary version")]
    MalformedRecord { handler: String, resource: String },

    #[error("Request decorator altered the version swap of {operation}")]
    DecoratorViolation { operation: &'static str },

    #[error("Injected failure: {0}")]
    Injected(&'static str),
}

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
