//! Deadline decorators for the external collaborators.
//!
//! The core crate has no runtime, so deadlines are applied here with
//! `tokio::time::timeout`. An elapsed deadline maps to the same
//! unavailable error as a transport failure.

use async_trait::async_trait;
use std::time::Duration;

use triage_harness_core::error::TriageError;
use triage_harness_core::index::EvidenceIndex;
use triage_harness_core::models::RawHit;
use triage_harness_core::oracle::Oracle;

/// Oracle whose completions fail after `limit`.
pub struct TimedOracle<O> {
    inner: O,
    limit: Duration,
}

impl<O> TimedOracle<O> {
    pub fn new(inner: O, limit: Duration) -> Self {
        Self { inner, limit }
    }
}

#[async_trait]
impl<O: Oracle> Oracle for TimedOracle<O> {
    async fn complete(&self, prompt: &str) -> Result<String, TriageError> {
        match tokio::time::timeout(self.limit, self.inner.complete(prompt)).await {
            Ok(result) => result,
            Err(_) => Err(TriageError::oracle(format!(
                "no reply within {}s",
                self.limit.as_secs_f64()
            ))),
        }
    }
}

/// Index whose searches fail after `limit`.
pub struct TimedIndex<I> {
    inner: I,
    limit: Duration,
}

impl<I> TimedIndex<I> {
    pub fn new(inner: I, limit: Duration) -> Self {
        Self { inner, limit }
    }
}

#[async_trait]
impl<I: EvidenceIndex> EvidenceIndex for TimedIndex<I> {
    async fn search(
        &self,
        query: &str,
        service: Option<&str>,
        k: usize,
    ) -> Result<Vec<RawHit>, TriageError> {
        match tokio::time::timeout(self.limit, self.inner.search(query, service, k)).await {
            Ok(result) => result,
            Err(_) => Err(TriageError::index(format!(
                "search did not finish within {}s",
                self.limit.as_secs_f64()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Slow;

    #[async_trait]
    impl Oracle for Slow {
        async fn complete(&self, _prompt: &str) -> Result<String, TriageError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok("Final: late".to_string())
        }
    }

    #[async_trait]
    impl EvidenceIndex for Slow {
        async fn search(
            &self,
            _query: &str,
            _service: Option<&str>,
            _k: usize,
        ) -> Result<Vec<RawHit>, TriageError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Vec::new())
        }
    }

    struct Quick;

    #[async_trait]
    impl Oracle for Quick {
        async fn complete(&self, prompt: &str) -> Result<String, TriageError> {
            Ok(format!("Final: {}", prompt))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_oracle_deadline() {
        let oracle = TimedOracle::new(Slow, Duration::from_secs(1));
        let err = oracle.complete("p").await.unwrap_err();
        assert!(matches!(err, TriageError::OracleUnavailable { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_index_deadline() {
        let index = TimedIndex::new(Slow, Duration::from_secs(1));
        let err = index.search("q", None, 3).await.unwrap_err();
        assert!(matches!(err, TriageError::IndexUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_fast_reply_passes_through() {
        let oracle = TimedOracle::new(Quick, Duration::from_secs(1));
        assert_eq!(oracle.complete("ok").await.unwrap(), "Final: ok");
    }
}
