//! Deterministic re-ranking of raw similarity hits.
//!
//! # Adjustment rules
//!
//! Each rule contributes one multiplicative factor to the raw score
//! (`1.0` when it does not fire):
//!
//! 1. **Source penalty**: release notes are scaled by
//!    [`RankingPolicy::releasenotes_penalty`].
//! 2. **Service boost**: with a service filter, chunks tagged with that
//!    service get [`RankingPolicy::service_boost`].
//! 3. **Heading boost**: if any whitespace-delimited word of the
//!    lower-cased query occurs in the lower-cased heading.
//! 4. **Keyword boosts**: table entries `(keyword in query, service) →
//!    factor`; every matching entry applies.
//! 5. **Hard filter**: with a service filter, chunks of other services
//!    are dropped *after* scoring, so pre-filter scores are observable.
//!
//! Results are sorted by adjusted score, descending. The sort is stable,
//! so equal scores keep the index's order, then truncated to `k`.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::{Candidate, Chunk, RawHit, ScoreBreakdown, SourceKind};

/// One entry of the domain keyword table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordBoost {
    /// Lower-case substring looked for in the lower-cased query.
    pub keyword: String,
    /// Service a chunk must carry to receive the boost.
    pub service: String,
    /// Multiplicative factor (> 1).
    pub factor: f64,
}

/// Fixed factors used by [`rank`].
#[derive(Debug, Clone, PartialEq)]
pub struct RankingPolicy {
    pub releasenotes_penalty: f64,
    pub service_boost: f64,
    pub heading_boost: f64,
    pub keyword_boosts: Vec<KeywordBoost>,
}

impl Default for RankingPolicy {
    fn default() -> Self {
        Self {
            releasenotes_penalty: 0.5,
            service_boost: 1.1,
            heading_boost: 1.15,
            keyword_boosts: vec![KeywordBoost {
                keyword: "security".to_string(),
                service: "neutron".to_string(),
                factor: 1.2,
            }],
        }
    }
}

/// Inputs of one ranking call.
#[derive(Debug, Clone)]
pub struct RankRequest<'a> {
    /// The original query text.
    pub query: &'a str,
    /// Optional service filter (boost + hard filter).
    pub service: Option<&'a str>,
    /// Maximum number of candidates returned.
    pub k: usize,
    /// If true, attach a [`ScoreBreakdown`] to each candidate.
    pub explain: bool,
}

impl<'a> RankRequest<'a> {
    pub fn new(query: &'a str, service: Option<&'a str>, k: usize) -> Self {
        Self {
            query,
            service,
            k,
            explain: false,
        }
    }
}

/// Down-weights release notes relative to curated documentation.
pub fn source_penalty(policy: &RankingPolicy, chunk: &Chunk) -> f64 {
    if chunk.source == SourceKind::Releasenotes {
        policy.releasenotes_penalty
    } else {
        1.0
    }
}

/// Boosts chunks tagged with the requested service.
pub fn service_boost(policy: &RankingPolicy, chunk: &Chunk, service: Option<&str>) -> f64 {
    match service {
        Some(s) if chunk.is_service(s) => policy.service_boost,
        _ => 1.0,
    }
}

/// Boosts chunks whose heading contains any query word. `query_lower`
/// must already be lower-cased.
pub fn heading_boost(policy: &RankingPolicy, chunk: &Chunk, query_lower: &str) -> f64 {
    let heading = chunk.heading.as_deref().unwrap_or("").to_lowercase();
    if query_lower.split_whitespace().any(|w| heading.contains(w)) {
        policy.heading_boost
    } else {
        1.0
    }
}

/// Product of every configured keyword boost that fires. `query_lower`
/// must already be lower-cased.
pub fn keyword_boost(policy: &RankingPolicy, chunk: &Chunk, query_lower: &str) -> f64 {
    policy
        .keyword_boosts
        .iter()
        .filter(|kb| query_lower.contains(kb.keyword.as_str()) && chunk.is_service(&kb.service))
        .map(|kb| kb.factor)
        .product()
}

/// Apply every ranking factor to one hit.
pub fn score_hit(policy: &RankingPolicy, hit: &RawHit, query: &str, service: Option<&str>) -> ScoreBreakdown {
    let query_lower = query.to_lowercase();
    ScoreBreakdown {
        raw_score: hit.raw_score,
        source_penalty: source_penalty(policy, &hit.chunk),
        service_boost: service_boost(policy, &hit.chunk, service),
        heading_boost: heading_boost(policy, &hit.chunk, &query_lower),
        keyword_boost: keyword_boost(policy, &hit.chunk, &query_lower),
    }
}

/// Re-score, filter, sort and truncate raw hits. Hits whose score is not
/// finite are dropped.
pub fn rank(hits: Vec<RawHit>, req: &RankRequest<'_>, policy: &RankingPolicy) -> Vec<Candidate> {
    let mut candidates: Vec<Candidate> = Vec::with_capacity(hits.len());

    for hit in hits {
        let breakdown = score_hit(policy, &hit, req.query, req.service);
        let score = breakdown.adjusted();
        let keep = score.is_finite() && req.service.map_or(true, |s| hit.chunk.is_service(s));

        debug!(
            chunk = %hit.chunk.id,
            service = hit.chunk.service.as_deref().unwrap_or("-"),
            raw = hit.raw_score,
            adjusted = score,
            keep,
            "ranked hit"
        );

        if !keep {
            continue;
        }
        candidates.push(Candidate {
            chunk: hit.chunk,
            score,
            explain: req.explain.then_some(breakdown),
        });
    }

    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
    candidates.truncate(req.k);
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(id: &str, source: SourceKind, service: Option<&str>, heading: Option<&str>, score: f64) -> RawHit {
        RawHit::new(
            Chunk {
                id: id.to_string(),
                source,
                service: service.map(str::to_string),
                heading: heading.map(str::to_string),
                text: format!("text of {}", id),
                url: None,
            },
            score,
        )
    }

    fn ids(cands: &[Candidate]) -> Vec<&str> {
        cands.iter().map(|c| c.chunk.id.as_str()).collect()
    }

    #[test]
    fn test_releasenotes_penalty() {
        let p = RankingPolicy::default();
        let h = hit("r", SourceKind::Releasenotes, None, None, 1.0);
        assert_eq!(source_penalty(&p, &h.chunk), 0.5);
        let d = hit("d", SourceKind::AdminDocs, None, None, 1.0);
        assert_eq!(source_penalty(&p, &d.chunk), 1.0);
    }

    #[test]
    fn test_service_boost_only_with_filter() {
        let p = RankingPolicy::default();
        let h = hit("a", SourceKind::Docs, Some("nova"), None, 1.0);
        assert_eq!(service_boost(&p, &h.chunk, Some("nova")), 1.1);
        assert_eq!(service_boost(&p, &h.chunk, Some("cinder")), 1.0);
        assert_eq!(service_boost(&p, &h.chunk, None), 1.0);
    }

    #[test]
    fn test_heading_boost_substring() {
        let p = RankingPolicy::default();
        let h = hit("a", SourceKind::Docs, None, Some("Scheduler Filters"), 1.0);
        assert_eq!(heading_boost(&p, &h.chunk, "filter weights"), 1.15);
        assert_eq!(heading_boost(&p, &h.chunk, "volume attach"), 1.0);
        let none = hit("b", SourceKind::Docs, None, None, 1.0);
        assert_eq!(heading_boost(&p, &none.chunk, "filter"), 1.0);
    }

    #[test]
    fn test_keyword_boost_requires_service() {
        let p = RankingPolicy::default();
        let neutron = hit("n", SourceKind::Docs, Some("neutron"), None, 1.0);
        let nova = hit("v", SourceKind::Docs, Some("nova"), None, 1.0);
        assert_eq!(keyword_boost(&p, &neutron.chunk, "security group blocks ssh"), 1.2);
        assert_eq!(keyword_boost(&p, &nova.chunk, "security group blocks ssh"), 1.0);
        assert_eq!(keyword_boost(&p, &neutron.chunk, "port binding failed"), 1.0);
    }

    #[test]
    fn test_keyword_boost_entries_compose() {
        let mut p = RankingPolicy::default();
        p.keyword_boosts.push(KeywordBoost {
            keyword: "ssh".to_string(),
            service: "neutron".to_string(),
            factor: 1.5,
        });
        let neutron = hit("n", SourceKind::Docs, Some("neutron"), None, 1.0);
        let f = keyword_boost(&p, &neutron.chunk, "security group blocks ssh");
        assert!((f - 1.8).abs() < 1e-12);
    }

    #[test]
    fn test_rank_sorted_descending_and_truncated() {
        let p = RankingPolicy::default();
        let hits = vec![
            hit("a", SourceKind::Docs, None, None, 0.3),
            hit("b", SourceKind::Docs, None, None, 0.9),
            hit("c", SourceKind::Docs, None, None, 0.6),
        ];
        let out = rank(hits, &RankRequest::new("x", None, 2), &p);
        assert_eq!(ids(&out), vec!["b", "c"]);
        assert!(out[0].explain.is_none());
    }

    #[test]
    fn test_rank_releasenotes_never_outrank_equal_docs() {
        let p = RankingPolicy::default();
        let hits = vec![
            hit("notes", SourceKind::Releasenotes, Some("nova"), None, 0.7),
            hit("docs", SourceKind::Docs, Some("nova"), None, 0.7),
        ];
        let out = rank(hits, &RankRequest::new("x", None, 5), &p);
        assert_eq!(ids(&out), vec!["docs", "notes"]);
    }

    #[test]
    fn test_rank_hard_filter_after_scoring() {
        let p = RankingPolicy::default();
        let hits = vec![
            hit("other", SourceKind::Docs, Some("neutron"), Some("Ports"), 0.99),
            hit("mine", SourceKind::Docs, Some("cinder"), None, 0.2),
            hit("untagged", SourceKind::Docs, None, None, 0.5),
        ];
        let out = rank(hits, &RankRequest::new("ports", Some("cinder"), 5), &p);
        assert_eq!(ids(&out), vec!["mine"]);
        assert!(out.iter().all(|c| c.chunk.is_service("cinder")));
        assert!((out[0].score - 0.2 * 1.1).abs() < 1e-12);
    }

    #[test]
    fn test_rank_ties_keep_index_order() {
        let p = RankingPolicy::default();
        let hits = vec![
            hit("first", SourceKind::Docs, None, None, 0.5),
            hit("second", SourceKind::Docs, None, None, 0.5),
            hit("third", SourceKind::Docs, None, None, 0.5),
        ];
        let out = rank(hits, &RankRequest::new("x", None, 5), &p);
        assert_eq!(ids(&out), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_rank_is_idempotent() {
        let p = RankingPolicy::default();
        let hits = vec![
            hit("a", SourceKind::Releasenotes, Some("nova"), Some("Scheduler"), 0.8),
            hit("b", SourceKind::Docs, Some("neutron"), None, 0.5),
            hit("c", SourceKind::AdminDocs, Some("nova"), Some("Placement"), 0.45),
        ];
        let req = RankRequest::new("security scheduler", None, 5);
        let first = rank(hits.clone(), &req, &p);
        let second = rank(hits, &req, &p);
        assert_eq!(first, second);
    }

    #[test]
    fn test_rank_explain_matches_score() {
        let p = RankingPolicy::default();
        let hits = vec![hit("a", SourceKind::Releasenotes, Some("neutron"), Some("Security groups"), 0.8)];
        let mut req = RankRequest::new("security rules", Some("neutron"), 5);
        req.explain = true;
        let out = rank(hits, &req, &p);
        let ex = out[0].explain.expect("explain requested");
        assert_eq!(ex.source_penalty, 0.5);
        assert_eq!(ex.service_boost, 1.1);
        assert_eq!(ex.heading_boost, 1.15);
        assert_eq!(ex.keyword_boost, 1.2);
        assert!((out[0].score - 0.8 * 0.5 * 1.1 * 1.15 * 1.2).abs() < 1e-12);
    }

    #[test]
    fn test_rank_drops_non_finite_scores() {
        let p = RankingPolicy::default();
        let hits: Vec<RawHit> = (0..200)
            .map(|i| {
                let score = if i % 7 == 0 { f64::NAN } else { ((i * 37) % 101) as f64 / 100.0 };
                hit(&format!("h{}", i), SourceKind::Docs, None, None, score)
            })
            .collect();
        let out = rank(hits, &RankRequest::new("x", None, 500), &p);
        assert_eq!(out.len(), 200 - 29);
        assert!(out.iter().all(|c| c.score.is_finite()));
        assert!(out.windows(2).all(|w| w[0].score >= w[1].score));

        let inf = vec![
            hit("big", SourceKind::Docs, None, None, f64::INFINITY),
            hit("ok", SourceKind::Docs, None, None, 0.4),
        ];
        assert_eq!(ids(&rank(inf, &RankRequest::new("x", None, 5), &p)), vec!["ok"]);
    }
}
