//! Runtime-metrics purge hook.
//!
//! Stopping an instance drops its runtime-metrics rows first, so stale
//! time-series never outlive the instance. The purge is an unconditional
//! pre-step of every Stop dispatch, not conditioned on the stop succeeding,
//! and carries no transactional link to the dispatch outcome.

use std::collections::HashSet;

use async_trait::async_trait;
use thiserror::Error;

use mockhive_core::ServiceId;

#[derive(Debug, Error)]
#[error("metrics purge failed: {0}")]
pub struct MetricsError(pub String);

/// Deletion of runtime-metrics records by service id.
#[async_trait]
pub trait MetricsStore: Send + Sync {
    async fn delete_by_service_ids(&self, ids: &HashSet<ServiceId>) -> Result<(), MetricsError>;
}

/// No-op store for deployments without a runtime-metrics table.
pub struct NoopMetricsStore;

#[async_trait]
impl MetricsStore for NoopMetricsStore {
    async fn delete_by_service_ids(&self, ids: &HashSet<ServiceId>) -> Result<(), MetricsError> {
        tracing::debug!(count = ids.len(), "metrics purge skipped (no store)");
        Ok(())
    }
}
