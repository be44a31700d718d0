//! Exactly-once projection handling.
//!
//! [`ProjectionAdapter`] wraps a [`ProjectionHandler`] with the version
//! protocol: read the stored version, let the handler mutate the projection
//! inside a unit of work, swap the version in the same unit, and commit.
//! An event whose swap loses (redelivery, or another worker got there
//! first) leaves no trace and is reported as `Ok(false)`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::storage::{StorageError, VersionStore};

/// Error type returned by projection handlers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors from handling one event.
#[derive(Debug, thiserror::Error)]
pub enum ProjectionError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Handler error: {0}")]
    Handler(BoxError),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),
}

/// Business logic of a projection.
#[async_trait]
pub trait ProjectionHandler<S: VersionStore>: Send + Sync {
    /// Event type consumed by this projection.
    type Event: Send + Sync;

    /// Apply `event` to the projection inside `unit` and return the version
    /// the resource moves to. `current` is the version read before the unit
    /// was opened; empty when the resource has never been projected.
    ///
    /// Returning an empty version removes the version record. When `current`
    /// is empty too, the resource stays never-seen and the event still
    /// conflicts if another worker recorded a version meanwhile.
    async fn handle_event(
        &self,
        unit: &mut S::Unit,
        resource: &[u8],
        current: &[u8],
        event: &Self::Event,
    ) -> Result<Vec<u8>, BoxError>;
}

/// Runs a [`ProjectionHandler`] under the version protocol.
pub struct ProjectionAdapter<S, H> {
    identity: String,
    store: Arc<S>,
    handler: H,
    timeout: Option<Duration>,
}

impl<S, H> ProjectionAdapter<S, H>
where
    S: VersionStore,
    H: ProjectionHandler<S>,
{
    /// `identity` names the handler in the version store. It must be stable
    /// across restarts and unique per projection.
    pub fn new(identity: impl Into<String>, store: Arc<S>, handler: H) -> Self {
        Self {
            identity: identity.into(),
            store,
            handler,
            timeout: None,
        }
    }

    /// Bound each event by a deadline.
    ///
    /// When the deadline elapses the in-flight unit is dropped, which rolls
    /// it back, and the call fails with [`ProjectionError::Timeout`].
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Handle one event for `resource`.
    ///
    /// Returns `Ok(true)` when the event was applied and `Ok(false)` when it
    /// lost the version race and was discarded.
    pub async fn handle_event(
        &self,
        resource: &[u8],
        event: &H::Event,
    ) -> Result<bool, ProjectionError> {
        match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.process(resource, event))
                .await
                .map_err(|_| ProjectionError::Timeout(timeout))?,
            None => self.process(resource, event).await,
        }
    }

    /// Current version of `resource`; empty when none is recorded.
    pub async fn resource_version(&self, resource: &[u8]) -> Result<Vec<u8>, ProjectionError> {
        Ok(self.store.query(&self.identity, resource).await?)
    }

    /// Forget `resource`. The next event for it starts from an empty version.
    pub async fn close_resource(&self, resource: &[u8]) -> Result<(), ProjectionError> {
        self.store.delete(&self.identity, resource).await?;
        debug!(
            handler = %self.identity,
            resource = %hex::encode(resource),
            "Closed resource"
        );
        Ok(())
    }

    async fn process(&self, resource: &[u8], event: &H::Event) -> Result<bool, ProjectionError> {
        let current = self.store.query(&self.identity, resource).await?;
        let mut unit = self.store.begin().await?;

        let next = match self
            .handler
            .handle_event(&mut unit, resource, &current, event)
            .await
        {
            Ok(next) => next,
            Err(e) => {
                self.discard(unit).await;
                return Err(ProjectionError::Handler(e));
            }
        };

        let swapped = match self
            .store
            .compare_and_swap(&mut unit, &self.identity, resource, &current, &next)
            .await
        {
            Ok(swapped) => swapped,
            Err(e) => {
                self.discard(unit).await;
                return Err(e.into());
            }
        };

        let applied = if swapped {
            self.store.commit(unit).await?
        } else {
            self.discard(unit).await;
            false
        };

        if applied {
            debug!(
                handler = %self.identity,
                resource = %hex::encode(resource),
                version = %hex::encode(&next),
                "Event applied"
            );
        } else {
            debug!(
                handler = %self.identity,
                resource = %hex::encode(resource),
                expected = %hex::encode(&current),
                "Version conflict, event discarded"
            );
        }

        Ok(applied)
    }

    async fn discard(&self, unit: S::Unit) {
        if let Err(e) = self.store.rollback(unit).await {
            warn!(
                handler = %self.identity,
                error = %e,
                "Rollback failed"
            );
        }
    }
}
