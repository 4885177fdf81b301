//! Evidence index abstraction.
//!
//! The [`EvidenceIndex`] trait is the only way the core reaches stored
//! documentation. Nearest-neighbour search itself is a black box: an
//! implementation returns up to `k` chunks with raw similarity scores,
//! best first. Callers routinely ask for more than they will display so
//! that the ranking engine has room to re-order.
//!
//! Implementations must be `Send + Sync`; the router issues scoped
//! searches concurrently against one shared handle.

pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::TriageError;
use crate::models::RawHit;

/// Read-only similarity search over documentation chunks.
#[async_trait]
pub trait EvidenceIndex: Send + Sync {
    /// Return up to `k` chunks most similar to `query`, best first.
    ///
    /// When `service` is supplied only chunks tagged with that service
    /// are considered. Failures surface as
    /// [`TriageError::IndexUnavailable`].
    async fn search(
        &self,
        query: &str,
        service: Option<&str>,
        k: usize,
    ) -> Result<Vec<RawHit>, TriageError>;
}

#[async_trait]
impl<T: EvidenceIndex + ?Sized> EvidenceIndex for Arc<T> {
    async fn search(
        &self,
        query: &str,
        service: Option<&str>,
        k: usize,
    ) -> Result<Vec<RawHit>, TriageError> {
        (**self).search(query, service, k).await
    }
}

#[async_trait]
impl<T: EvidenceIndex + ?Sized> EvidenceIndex for Box<T> {
    async fn search(
        &self,
        query: &str,
        service: Option<&str>,
        k: usize,
    ) -> Result<Vec<RawHit>, TriageError> {
        (**self).search(query, service, k).await
    }
}
