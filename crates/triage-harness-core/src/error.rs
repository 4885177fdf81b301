//! Error taxonomy for a triage invocation.
//!
//! Only transport-level failures are errors. Parsing ambiguities and
//! missing evidence are ordinary outcomes of the reasoning loop and are
//! reported through [`Resolution`](crate::agent::Resolution) instead.

use crate::agent::Trace;

/// Fatal failure of an external collaborator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TriageError {
    /// The completion oracle was unreachable, timed out, or returned garbage.
    #[error("oracle unavailable: {reason}")]
    OracleUnavailable { reason: String },

    /// The evidence index could not be queried.
    #[error("evidence index unavailable: {reason}")]
    IndexUnavailable { reason: String },
}

impl TriageError {
    pub fn oracle(reason: impl Into<String>) -> Self {
        Self::OracleUnavailable {
            reason: reason.into(),
        }
    }

    pub fn index(reason: impl Into<String>) -> Self {
        Self::IndexUnavailable {
            reason: reason.into(),
        }
    }
}

/// An invocation aborted by a [`TriageError`], with the trace recorded up
/// to the point of failure.
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct Aborted {
    #[source]
    pub error: TriageError,
    pub trace: Trace,
}
