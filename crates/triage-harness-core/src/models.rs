//! Core data types for retrieved documentation evidence.
//!
//! [`Chunk`] is produced outside this crate (crawling, cleaning and
//! splitting are upstream concerns) and is treated as read-only here.
//! [`Candidate`] is a chunk scored for one query; candidates are created
//! per query and never persisted.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a chunk of documentation came from.
///
/// Trust differs per kind: release notes are down-weighted during ranking
/// relative to official and admin documentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Docs,
    AdminDocs,
    Releasenotes,
    Github,
    Code,
    Commit,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Docs => "docs",
            Self::AdminDocs => "admin_docs",
            Self::Releasenotes => "releasenotes",
            Self::Github => "github",
            Self::Code => "code",
            Self::Commit => "commit",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An immutable, retrievable unit of documentation text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Stable identifier assigned at ingestion time.
    pub id: String,
    /// Kind of source the text was taken from.
    pub source: SourceKind,
    /// Service/subsystem tag (e.g. `"nova"`), if the chunk has one.
    #[serde(default)]
    pub service: Option<String>,
    /// Section heading the text sits under.
    #[serde(default)]
    pub heading: Option<String>,
    /// The chunk body.
    pub text: String,
    /// Web-browsable URL of the originating page.
    #[serde(default)]
    pub url: Option<String>,
}

impl Chunk {
    /// Whether this chunk carries exactly the given service tag.
    pub fn is_service(&self, service: &str) -> bool {
        self.service.as_deref() == Some(service)
    }
}

/// A chunk as returned by an [`EvidenceIndex`](crate::index::EvidenceIndex),
/// carrying the backend's raw similarity score.
#[derive(Debug, Clone, PartialEq)]
pub struct RawHit {
    pub chunk: Chunk,
    pub raw_score: f64,
}

impl RawHit {
    pub fn new(chunk: Chunk, raw_score: f64) -> Self {
        Self { chunk, raw_score }
    }
}

/// A chunk annotated with its adjusted relevance score for one query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub chunk: Chunk,
    /// Adjusted score after all ranking rules.
    pub score: f64,
    /// Per-rule breakdown (populated when explanation is requested).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explain: Option<ScoreBreakdown>,
}

/// Factors applied to a raw similarity score during ranking.
///
/// Every factor is `1.0` when its rule did not fire, so
/// `raw_score * product(factors) == adjusted score`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub raw_score: f64,
    pub source_penalty: f64,
    pub service_boost: f64,
    pub heading_boost: f64,
    pub keyword_boost: f64,
}

impl ScoreBreakdown {
    /// Product of all multiplicative factors.
    pub fn multiplier(&self) -> f64 {
        self.source_penalty * self.service_boost * self.heading_boost * self.keyword_boost
    }

    pub fn adjusted(&self) -> f64 {
        self.raw_score * self.multiplier()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_kind_serde_names() {
        let kinds = [
            (SourceKind::Docs, "\"docs\""),
            (SourceKind::AdminDocs, "\"admin_docs\""),
            (SourceKind::Releasenotes, "\"releasenotes\""),
        ];
        for (kind, json) in kinds {
            assert_eq!(serde_json::to_string(&kind).unwrap(), json);
            assert_eq!(kind.to_string(), json.trim_matches('"'));
        }
    }

    #[test]
    fn test_unknown_source_kind_rejected() {
        let line = r#"{"id":"a","source":"wiki","text":"x"}"#;
        assert!(serde_json::from_str::<Chunk>(line).is_err());
    }

    #[test]
    fn test_chunk_optional_fields_default() {
        let line = r#"{"id":"a","source":"admin_docs","text":"body"}"#;
        let chunk: Chunk = serde_json::from_str(line).unwrap();
        assert_eq!(chunk.source, SourceKind::AdminDocs);
        assert!(chunk.service.is_none());
        assert!(chunk.heading.is_none());
        assert!(!chunk.is_service("nova"));
    }

    #[test]
    fn test_breakdown_multiplier() {
        let b = ScoreBreakdown {
            raw_score: 0.8,
            source_penalty: 0.5,
            service_boost: 1.0,
            heading_boost: 1.15,
            keyword_boost: 1.0,
        };
        assert!((b.adjusted() - 0.8 * 0.5 * 1.15).abs() < 1e-12);
    }
}
