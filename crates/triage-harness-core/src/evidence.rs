//! Evidence bundles and their prompt rendering.
//!
//! A bundle is either one flat ranked list (explicit service, or no
//! service tags to route on) or an ordered list of per-service groups
//! produced by the router.

use std::fmt::Write as _;

use serde::Serialize;

use crate::models::Candidate;
use crate::text::prefix_chars;

/// Ranked evidence for one service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceEvidence {
    pub service: String,
    /// Aggregate score the service was selected with.
    pub aggregate_score: f64,
    pub candidates: Vec<Candidate>,
}

/// The unit passed into prompt construction.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "mode", content = "evidence", rename_all = "snake_case")]
pub enum EvidenceBundle {
    /// Single ranked list.
    Flat(Vec<Candidate>),
    /// Per-service lists, ordered by aggregate score (best first).
    ByService(Vec<ServiceEvidence>),
}

impl EvidenceBundle {
    pub fn empty() -> Self {
        Self::Flat(Vec::new())
    }

    /// Total number of candidates across all groups.
    pub fn candidate_count(&self) -> usize {
        match self {
            Self::Flat(c) => c.len(),
            Self::ByService(groups) => groups.iter().map(|g| g.candidates.len()).sum(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.candidate_count() == 0
    }

    /// Service names in bundle order (empty for flat bundles).
    pub fn services(&self) -> Vec<&str> {
        match self {
            Self::Flat(_) => Vec::new(),
            Self::ByService(groups) => groups.iter().map(|g| g.service.as_str()).collect(),
        }
    }
}

/// Controls how much of each candidate reaches the prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOptions {
    /// Excerpt length cap, in characters.
    pub excerpt_chars: usize,
    /// Optional cap on candidates rendered per list/group.
    pub max_per_group: Option<usize>,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            excerpt_chars: 800,
            max_per_group: None,
        }
    }
}

/// Render a bundle as plain text for an Observation.
///
/// Multi-service bundles get a `Service: X` header per group. An empty
/// bundle renders as a single line saying so.
pub fn render_bundle(bundle: &EvidenceBundle, opts: &RenderOptions) -> String {
    if bundle.is_empty() {
        return "No documentation excerpts were retrieved.".to_string();
    }
    match bundle {
        EvidenceBundle::Flat(candidates) => render_candidates(candidates, opts),
        EvidenceBundle::ByService(groups) => groups
            .iter()
            .filter(|g| !g.candidates.is_empty())
            .map(|g| {
                format!(
                    "Service: {}\n\n{}",
                    g.service,
                    render_candidates(&g.candidates, opts)
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n===\n\n"),
    }
}

fn render_candidates(candidates: &[Candidate], opts: &RenderOptions) -> String {
    let limit = opts.max_per_group.unwrap_or(candidates.len());
    candidates
        .iter()
        .take(limit)
        .map(|c| render_candidate(c, opts.excerpt_chars))
        .collect::<Vec<_>>()
        .join("\n---\n")
}

fn render_candidate(c: &Candidate, excerpt_chars: usize) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Source: {}", c.chunk.source);
    let _ = writeln!(out, "Service: {}", c.chunk.service.as_deref().unwrap_or("unknown"));
    if let Some(heading) = c.chunk.heading.as_deref() {
        let _ = writeln!(out, "Heading: {}", heading);
    }
    if let Some(url) = c.chunk.url.as_deref() {
        let _ = writeln!(out, "URL: {}", url);
    }
    let _ = writeln!(out, "Score: {:.3}", c.score);
    let _ = writeln!(out);
    let _ = writeln!(out, "Excerpt:");
    let _ = write!(out, "\"\"\"{}\"\"\"", prefix_chars(&c.chunk.text, excerpt_chars));
    out
}
