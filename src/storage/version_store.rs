//! VersionStore trait definition.

use async_trait::async_trait;

use super::Result;

/// Interface for projection version tracking.
///
/// Tracks one opaque version token per `(handler, resource)`. The token is
/// only ever advanced through [`compare_and_swap`](Self::compare_and_swap),
/// which runs inside a backend-specific atomic [`Unit`](Self::Unit) that also
/// carries the caller's business mutation.
///
/// # Key
///
/// - `handler`: identity of the projection handler
/// - `resource`: raw bytes identifying the projected resource. DynamoDB
///   cannot key on empty binary values, so the DynamoDB store rejects an
///   empty `resource` with [`StorageError::EmptyResource`].
///
/// [`StorageError::EmptyResource`]: super::StorageError::EmptyResource
///
/// An absent record and an empty token are the same thing: the resource has
/// never been seen by this handler.
///
/// # Outcomes
///
/// Backends that execute statements immediately (SQL) report the real swap
/// outcome from `compare_and_swap`. Backends that stage writes (DynamoDB,
/// mock) stage the swap there and report the real outcome from `commit`.
/// In both cases `false` means "not applied" and is not an error.
///
/// # Implementations
///
/// - `PostgresVersionStore`: PostgreSQL storage
/// - `SqliteVersionStore`: SQLite storage
/// - `DynamoVersionStore`: DynamoDB storage
/// - `MockVersionStore`: In-memory mock for testing
#[async_trait]
pub trait VersionStore: Send + Sync {
    /// Atomic unit holding the business mutation and the version swap.
    type Unit: Send;

    /// Get the current version of a resource.
    ///
    /// Returns an empty token if no record exists.
    async fn query(&self, handler: &str, resource: &[u8]) -> Result<Vec<u8>>;

    /// Open a new atomic unit.
    async fn begin(&self) -> Result<Self::Unit>;

    /// Swap the version from `current` to `next` within `unit`.
    ///
    /// See [`Swap::classify`] for how the token pair maps to an insert,
    /// update, delete or absence check.
    async fn compare_and_swap(
        &self,
        unit: &mut Self::Unit,
        handler: &str,
        resource: &[u8],
        current: &[u8],
        next: &[u8],
    ) -> Result<bool>;

    /// Commit the unit. Returns `false` if a staged swap lost its condition.
    async fn commit(&self, unit: Self::Unit) -> Result<bool>;

    /// Discard the unit without applying anything.
    async fn rollback(&self, unit: Self::Unit) -> Result<()>;

    /// Unconditionally remove a resource's version.
    ///
    /// Administrative cleanup only, not part of the compare-and-swap path.
    async fn delete(&self, handler: &str, resource: &[u8]) -> Result<()>;

    /// Unconditionally set a resource's version. An empty version deletes.
    ///
    /// Administrative force-set for provisioning and repair only.
    async fn store(&self, handler: &str, resource: &[u8], version: &[u8]) -> Result<()>;

    /// Create the storage structures for version records.
    async fn provision(&self) -> Result<()>;

    /// Drop the storage structures for version records.
    async fn deprovision(&self) -> Result<()>;

    /// Compare-and-swap as a unit of its own, with no business mutation.
    async fn swap(
        &self,
        handler: &str,
        resource: &[u8],
        current: &[u8],
        next: &[u8],
    ) -> Result<bool> {
        let mut unit = self.begin().await?;

        match self
            .compare_and_swap(&mut unit, handler, resource, current, next)
            .await
        {
            Ok(true) => self.commit(unit).await,
            Ok(false) => {
                self.rollback(unit).await?;
                Ok(false)
            }
            Err(e) => {
                // A failed rollback is dropped; the CAS error is returned.
                let _ = self.rollback(unit).await;
                Err(e)
            }
        }
    }
}

/// A version transition, derived from a `(current, next)` token pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Swap<'a> {
    /// First application: succeeds only if no record exists.
    Insert { next: &'a [u8] },
    /// Advance: succeeds only if the stored version equals `current`.
    Update { current: &'a [u8], next: &'a [u8] },
    /// Reset to never-seen: succeeds only if the stored version equals `current`.
    Delete { current: &'a [u8] },
    /// Stay never-seen: succeeds only if no record exists, writes nothing.
    Absent,
}

impl<'a> Swap<'a> {
    /// Classify a token pair.
    ///
    /// `("", "")` never creates a record; it only asserts that none exists.
    pub fn classify(current: &'a [u8], next: &'a [u8]) -> Self {
        match (current.is_empty(), next.is_empty()) {
            (true, true) => Swap::Absent,
            (true, false) => Swap::Insert { next },
            (false, true) => Swap::Delete { current },
            (false, false) => Swap::Update { current, next },
        }
    }

    /// Label used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Swap::Insert { .. } => "insert",
            Swap::Update { .. } => "update",
            Swap::Delete { .. } => "delete",
            Swap::Absent => "absent",
        }
    }
}
