//! Text-completion oracle abstraction.
//!
//! An oracle maps one prompt to one completion: synchronous from the
//! caller's point of view, single-shot, no streaming. Unreachable
//! backends and timeouts both surface as
//! [`TriageError::OracleUnavailable`].

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::TriageError;

#[async_trait]
pub trait Oracle: Send + Sync {
    /// Complete `prompt`, returning the raw model text.
    async fn complete(&self, prompt: &str) -> Result<String, TriageError>;
}

#[async_trait]
impl<T: Oracle + ?Sized> Oracle for Arc<T> {
    async fn complete(&self, prompt: &str) -> Result<String, TriageError> {
        (**self).complete(prompt).await
    }
}

#[async_trait]
impl<T: Oracle + ?Sized> Oracle for Box<T> {
    async fn complete(&self, prompt: &str) -> Result<String, TriageError> {
        (**self).complete(prompt).await
    }
}
