//! Unified SQL VersionStore implementation.
//!
//! Uses a macro to generate implementations for each SQL backend,
//! eliminating code duplication while maintaining type safety.

use std::marker::PhantomData;

use sqlx::pool::PoolOptions;
use sqlx::Pool;
use tracing::info;

use super::query::scheme;
use super::SqlDialect;
use crate::storage::{Result, StorageError};

/// SQL-based implementation of VersionStore.
///
/// The atomic unit is a database transaction: the caller's business
/// statements and the version swap run on the same connection and commit
/// together.
pub struct SqlVersionStore<D: SqlDialect> {
    pool: Pool<D::Database>,
    _marker: PhantomData<D>,
}

impl<D: SqlDialect> SqlVersionStore<D> {
    /// Create a new SQL version store with the given pool.
    pub fn new(pool: Pool<D::Database>) -> Self {
        Self {
            pool,
            _marker: PhantomData,
        }
    }

    /// Connect to the database at `url`.
    ///
    /// Fails fast with [`StorageError::Incompatible`] if the URL does not
    /// target an engine speaking this dialect.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        if !D::is_compatible(url) {
            return Err(StorageError::Incompatible {
                dialect: D::NAME,
                scheme: scheme(url).to_string(),
            });
        }

        let pool = PoolOptions::<D::Database>::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;

        info!(dialect = D::NAME, "Connected version store");

        Ok(Self::new(pool))
    }

    /// Get the underlying pool.
    pub fn pool(&self) -> &Pool<D::Database> {
        &self.pool
    }
}

/// Macro to implement VersionStore for a specific SQL backend.
///
/// This eliminates duplication between PostgreSQL and SQLite implementations
/// while maintaining full type safety.
macro_rules! impl_version_store {
    ($dialect:ty, $database:ty, $feature:literal) => {
        #[cfg(feature = $feature)]
        #[async_trait::async_trait]
        impl crate::storage::VersionStore for SqlVersionStore<$dialect> {
            type Unit = sqlx::Transaction<'static, $database>;

            async fn query(&self, handler: &str, resource: &[u8]) -> Result<Vec<u8>> {
                use sea_query::{Expr, Query};
                use sqlx::Row;

                use crate::storage::schema::Occ;

                let stmt = Query::select()
                    .column(Occ::Version)
                    .from(<$dialect>::table())
                    .and_where(Expr::col(Occ::Handler).eq(handler))
                    .and_where(Expr::col(Occ::Resource).eq(resource))
                    .to_owned();

                let (sql, values) = <$dialect>::build(&stmt);
                let row = sqlx::query_with(&sql, values)
                    .fetch_optional(&self.pool)
                    .await?;

                match row {
                    Some(row) => Ok(row.try_get("version")?),
                    None => Ok(Vec::new()),
                }
            }

            async fn begin(&self) -> Result<Self::Unit> {
                Ok(self.pool.begin().await?)
            }

            async fn compare_and_swap(
                &self,
                unit: &mut Self::Unit,
                handler: &str,
                resource: &[u8],
                current: &[u8],
                next: &[u8],
            ) -> Result<bool> {
                use sea_query::{Expr, Query};
                use tracing::debug;

                use crate::storage::schema::Occ;
                use crate::storage::Swap;

                let swap = Swap::classify(current, next);

                let applied = match swap {
                    Swap::Insert { next } => {
                        let mut stmt = Query::insert();
                        stmt.into_table(<$dialect>::table())
                            .columns([Occ::Handler, Occ::Resource, Occ::Version])
                            .values([handler.into(), resource.into(), next.into()])?;

                        let (sql, values) = <$dialect>::build(&stmt);

                        // A duplicate key means a record already exists, so the
                        // caller's empty "current" version was stale.
                        match sqlx::query_with(&sql, values).execute(&mut **unit).await {
                            Ok(_) => true,
                            Err(e) if <$dialect>::is_duplicate(&e) => false,
                            Err(e) => return Err(e.into()),
                        }
                    }
                    Swap::Update { current, next } => {
                        let stmt = Query::update()
                            .table(<$dialect>::table())
                            .value(Occ::Version, next)
                            .and_where(Expr::col(Occ::Handler).eq(handler))
                            .and_where(Expr::col(Occ::Resource).eq(resource))
                            .and_where(Expr::col(Occ::Version).eq(current))
                            .to_owned();

                        let (sql, values) = <$dialect>::build(&stmt);
                        let result = sqlx::query_with(&sql, values)
                            .execute(&mut **unit)
                            .await?;
                        result.rows_affected() != 0
                    }
                    Swap::Delete { current } => {
                        let stmt = Query::delete()
                            .from_table(<$dialect>::table())
                            .and_where(Expr::col(Occ::Handler).eq(handler))
                            .and_where(Expr::col(Occ::Resource).eq(resource))
                            .and_where(Expr::col(Occ::Version).eq(current))
                            .to_owned();

                        let (sql, values) = <$dialect>::build(&stmt);
                        let result = sqlx::query_with(&sql, values)
                            .execute(&mut **unit)
                            .await?;
                        result.rows_affected() != 0
                    }
                    Swap::Absent => {
                        let stmt = Query::select()
                            .expr(Expr::val(1))
                            .from(<$dialect>::table())
                            .and_where(Expr::col(Occ::Handler).eq(handler))
                            .and_where(Expr::col(Occ::Resource).eq(resource))
                            .to_owned();

                        let (sql, values) = <$dialect>::build(&stmt);
                        let existing = sqlx::query_with(&sql, values)
                            .fetch_optional(&mut **unit)
                            .await?;
                        existing.is_none()
                    }
                };

                debug!(
                    handler = %handler,
                    resource = %hex::encode(resource),
                    swap = swap.kind(),
                    applied,
                    "Version compare-and-swap"
                );

                Ok(applied)
            }

            async fn commit(&self, unit: Self::Unit) -> Result<bool> {
                unit.commit().await?;
                Ok(true)
            }

            async fn rollback(&self, unit: Self::Unit) -> Result<()> {
                unit.rollback().await?;
                Ok(())
            }

            async fn delete(&self, handler: &str, resource: &[u8]) -> Result<()> {
                use sea_query::{Expr, Query};

                use crate::storage::schema::Occ;

                let stmt = Query::delete()
                    .from_table(<$dialect>::table())
                    .and_where(Expr::col(Occ::Handler).eq(handler))
                    .and_where(Expr::col(Occ::Resource).eq(resource))
                    .to_owned();

                let (sql, values) = <$dialect>::build(&stmt);
                sqlx::query_with(&sql, values).execute(&self.pool).await?;

                Ok(())
            }

            async fn store(&self, handler: &str, resource: &[u8], version: &[u8]) -> Result<()> {
                use sea_query::{OnConflict, Query};

                use crate::storage::schema::Occ;

                if version.is_empty() {
                    return self.delete(handler, resource).await;
                }

                let mut stmt = Query::insert();
                stmt.into_table(<$dialect>::table())
                    .columns([Occ::Handler, Occ::Resource, Occ::Version])
                    .values([handler.into(), resource.into(), version.into()])?
                    .on_conflict(
                        OnConflict::columns([Occ::Handler, Occ::Resource])
                            .update_column(Occ::Version)
                            .to_owned(),
                    );

                let (sql, values) = <$dialect>::build(&stmt);
                sqlx::query_with(&sql, values).execute(&self.pool).await?;

                Ok(())
            }

            async fn provision(&self) -> Result<()> {
                for statement in <$dialect as SqlDialect>::CREATE_SCHEMA {
                    sqlx::query(statement).execute(&self.pool).await?;
                }

                info!(dialect = <$dialect as SqlDialect>::NAME, "Version schema provisioned");
                Ok(())
            }

            async fn deprovision(&self) -> Result<()> {
                for statement in <$dialect as SqlDialect>::DROP_SCHEMA {
                    sqlx::query(statement).execute(&self.pool).await?;
                }

                info!(dialect = <$dialect as SqlDialect>::NAME, "Version schema dropped");
                Ok(())
            }
        }
    };
}

// Generate implementations for each SQL backend
impl_version_store!(super::postgres::Postgres, sqlx::Postgres, "postgres");
impl_version_store!(super::sqlite::Sqlite, sqlx::Sqlite, "sqlite");
