//! Service routing for unscoped queries.
//!
//! When the caller names a service, routing is skipped and the query is
//! ranked with that service as a hard filter. Otherwise:
//!
//! 1. Fetch a wide unscoped pool (`pool_k` hits).
//! 2. Score every service-tagged hit with a hybrid of its semantic score
//!    and lexical overlap: `raw × (1 + lexical_weight × lexical_hits)`,
//!    where `lexical_hits` counts query words found in the heading or the
//!    first `lexical_window_chars` characters of the text.
//! 3. Sum those scores per service into a [`ServiceScoreTable`]. Sums,
//!    not maxima: a service backed by several matching chunks outweighs
//!    one lucky hit.
//! 4. Keep the top service plus every service scoring at least
//!    `significance_ratio × top` (the *significant set*).
//! 5. Run one scoped, ranked retrieval per significant service. These
//!    run concurrently; results are reassembled in significance order.
//!
//! If no pooled hit carries a service tag, the pool itself is ranked and
//! returned as a flat bundle.

use std::collections::{BTreeMap, BTreeSet};

use futures::future::try_join_all;
use tracing::debug;

use crate::error::TriageError;
use crate::evidence::{EvidenceBundle, ServiceEvidence};
use crate::index::EvidenceIndex;
use crate::models::{Candidate, Chunk, RawHit};
use crate::rank::{rank, RankRequest, RankingPolicy};
use crate::text::{prefix_chars, word_tokens};

/// Routing constants.
#[derive(Debug, Clone, PartialEq)]
pub struct RouterParams {
    /// Size of the unscoped pool used for service scoring.
    pub pool_k: usize,
    /// Hits fetched per scoped retrieval before ranking truncates to `k`.
    pub scoped_pool_k: usize,
    /// Minimum share of the top service's score for significance.
    pub significance_ratio: f64,
    /// Weight of each lexical hit in the hybrid score.
    pub lexical_weight: f64,
    /// How much of a chunk's text is scanned for query words.
    pub lexical_window_chars: usize,
}

impl Default for RouterParams {
    fn default() -> Self {
        Self {
            pool_k: 10,
            scoped_pool_k: 50,
            significance_ratio: 0.6,
            lexical_weight: 0.05,
            lexical_window_chars: 300,
        }
    }
}

/// Accumulated per-service evidence strength for one query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServiceScoreTable {
    scores: BTreeMap<String, f64>,
}

impl ServiceScoreTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, service: &str, score: f64) {
        *self.scores.entry(service.to_string()).or_insert(0.0) += score;
    }

    pub fn get(&self, service: &str) -> Option<f64> {
        self.scores.get(service).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    /// Services by total score, descending; equal totals by name.
    pub fn ranked(&self) -> Vec<(String, f64)> {
        let mut ranked: Vec<(String, f64)> =
            self.scores.iter().map(|(s, v)| (s.clone(), *v)).collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked
    }
}

/// Number of query words present in the heading or in the first
/// `window_chars` characters of the text (case-insensitive).
pub fn lexical_hits(tokens: &BTreeSet<String>, chunk: &Chunk, window_chars: usize) -> usize {
    let heading = chunk.heading.as_deref().unwrap_or("").to_lowercase();
    let window = prefix_chars(&chunk.text, window_chars).to_lowercase();
    tokens
        .iter()
        .filter(|t| heading.contains(t.as_str()) || window.contains(t.as_str()))
        .count()
}

/// Build the per-service score table from an unscoped pool.
///
/// Hits without a service tag contribute nothing.
pub fn aggregate_service_scores(hits: &[RawHit], query: &str, params: &RouterParams) -> ServiceScoreTable {
    let tokens = word_tokens(query);
    let mut table = ServiceScoreTable::new();
    for hit in hits {
        let Some(service) = hit.chunk.service.as_deref() else {
            continue;
        };
        let lexical = lexical_hits(&tokens, &hit.chunk, params.lexical_window_chars);
        let adjusted = hit.raw_score * (1.0 + params.lexical_weight * lexical as f64);
        table.add(service, adjusted);
    }
    table
}

/// The top service plus every service within `ratio` of it, in
/// descending score order.
pub fn significant_services(table: &ServiceScoreTable, ratio: f64) -> Vec<(String, f64)> {
    let ranked = table.ranked();
    let Some(top_score) = ranked.first().map(|(_, s)| *s) else {
        return Vec::new();
    };
    let threshold = ratio * top_score;
    ranked
        .into_iter()
        .enumerate()
        .filter(|(i, (_, score))| *i == 0 || *score >= threshold)
        .map(|(_, entry)| entry)
        .collect()
}

/// Retrieval front-end combining an [`EvidenceIndex`] with ranking and
/// service routing.
pub struct Router<I> {
    index: I,
    policy: RankingPolicy,
    params: RouterParams,
}

impl<I: EvidenceIndex> Router<I> {
    pub fn new(index: I, policy: RankingPolicy, params: RouterParams) -> Self {
        Self {
            index,
            policy,
            params,
        }
    }

    pub fn index(&self) -> &I {
        &self.index
    }

    /// One retrieval of `scoped_pool_k` hits, ranked down to `k`.
    pub async fn retrieve(
        &self,
        query: &str,
        service: Option<&str>,
        k: usize,
        explain: bool,
    ) -> Result<Vec<Candidate>, TriageError> {
        let hits = self
            .index
            .search(query, service, self.params.scoped_pool_k)
            .await?;
        let req = RankRequest {
            query,
            service,
            k,
            explain,
        };
        Ok(rank(hits, &req, &self.policy))
    }

    /// Route a query to its significant services and gather evidence.
    pub async fn route(
        &self,
        query: &str,
        explicit_service: Option<&str>,
        k: usize,
    ) -> Result<EvidenceBundle, TriageError> {
        if let Some(service) = explicit_service {
            let candidates = self.retrieve(query, Some(service), k, false).await?;
            return Ok(EvidenceBundle::Flat(candidates));
        }

        let pool = self.index.search(query, None, self.params.pool_k).await?;
        if pool.is_empty() {
            debug!(query, "unscoped pool empty");
            return Ok(EvidenceBundle::empty());
        }

        let table = aggregate_service_scores(&pool, query, &self.params);
        if table.is_empty() {
            debug!(query, pool = pool.len(), "no service tags in pool, returning flat results");
            let req = RankRequest::new(query, None, k);
            return Ok(EvidenceBundle::Flat(rank(pool, &req, &self.policy)));
        }

        let significant = significant_services(&table, self.params.significance_ratio);
        debug!(
            query,
            table = ?table.ranked(),
            significant = ?significant,
            "service routing"
        );

        let groups = try_join_all(significant.into_iter().map(|(service, aggregate_score)| async move {
            let candidates = self.retrieve(query, Some(&service), k, false).await?;
            Ok::<_, TriageError>(ServiceEvidence {
                service,
                aggregate_score,
                candidates,
            })
        }))
        .await?;

        Ok(EvidenceBundle::ByService(groups))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SourceKind;
    use async_trait::async_trait;
    use std::sync::Mutex;

    fn chunk(id: &str, service: Option<&str>, heading: &str, text: &str) -> Chunk {
        Chunk {
            id: id.to_string(),
            source: SourceKind::Docs,
            service: service.map(str::to_string),
            heading: Some(heading.to_string()),
            text: text.to_string(),
            url: None,
        }
    }

    /// Returns a fixed pool for unscoped searches and the service's
    /// subset for scoped ones; records every call.
    struct FixedIndex {
        hits: Vec<RawHit>,
        calls: Mutex<Vec<(Option<String>, usize)>>,
    }

    impl FixedIndex {
        fn new(hits: Vec<RawHit>) -> Self {
            Self {
                hits,
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl EvidenceIndex for FixedIndex {
        async fn search(
            &self,
            _query: &str,
            service: Option<&str>,
            k: usize,
        ) -> Result<Vec<RawHit>, TriageError> {
            self.calls
                .lock()
                .unwrap()
                .push((service.map(str::to_string), k));
            Ok(self
                .hits
                .iter()
                .filter(|h| service.map_or(true, |s| h.chunk.is_service(s)))
                .take(k)
                .cloned()
                .collect())
        }
    }

    struct FailingIndex;

    #[async_trait]
    impl EvidenceIndex for FailingIndex {
        async fn search(&self, _: &str, _: Option<&str>, _: usize) -> Result<Vec<RawHit>, TriageError> {
            Err(TriageError::index("connection refused"))
        }
    }

    /// Delays scoped searches per service so they complete out of order.
    struct SlowIndex {
        inner: FixedIndex,
        delays_ms: Vec<(&'static str, u64)>,
        finished: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl EvidenceIndex for SlowIndex {
        async fn search(
            &self,
            query: &str,
            service: Option<&str>,
            k: usize,
        ) -> Result<Vec<RawHit>, TriageError> {
            if let Some(s) = service {
                let delay = self
                    .delays_ms
                    .iter()
                    .find(|(name, _)| *name == s)
                    .map_or(0, |(_, ms)| *ms);
                tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
                self.finished.lock().unwrap().push(s.to_string());
            }
            self.inner.search(query, service, k).await
        }
    }

    fn plain(id: &str, service: Option<&str>, score: f64) -> RawHit {
        RawHit::new(chunk(id, service, "", "unrelated words"), score)
    }

    #[test]
    fn test_lexical_hits_heading_and_window() {
        let tokens = word_tokens("scheduler NoValidHost");
        let c = chunk("a", Some("nova"), "Scheduler", "raised NoValidHost when...");
        assert_eq!(lexical_hits(&tokens, &c, 300), 2);
        let late = chunk("b", Some("nova"), "", &format!("{}novalidhost", "x".repeat(400)));
        assert_eq!(lexical_hits(&tokens, &late, 300), 0);
    }

    #[test]
    fn test_aggregate_sums_per_service() {
        let hits = vec![
            plain("a", Some("nova"), 0.5),
            plain("b", Some("nova"), 0.25),
            plain("c", Some("neutron"), 0.6),
            plain("d", None, 0.9),
        ];
        let table = aggregate_service_scores(&hits, "zzz", &RouterParams::default());
        assert_eq!(table.len(), 2);
        assert!((table.get("nova").unwrap() - 0.75).abs() < 1e-12);
        assert!((table.get("neutron").unwrap() - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_aggregate_lexical_bonus() {
        let hits = vec![RawHit::new(
            chunk("a", Some("nova"), "Scheduler", "NoValidHost"),
            0.5,
        )];
        let table = aggregate_service_scores(&hits, "scheduler novalidhost", &RouterParams::default());
        assert!((table.get("nova").unwrap() - 0.5 * 1.1).abs() < 1e-12);
    }

    #[test]
    fn test_significant_set_threshold() {
        let mut table = ServiceScoreTable::new();
        table.add("nova", 1.0);
        table.add("placement", 0.7);
        table.add("neutron", 0.2);
        let sig = significant_services(&table, 0.6);
        let names: Vec<&str> = sig.iter().map(|(s, _)| s.as_str()).collect();
        assert_eq!(names, vec!["nova", "placement"]);
    }

    #[test]
    fn test_significant_set_boundary_inclusive() {
        let mut table = ServiceScoreTable::new();
        table.add("a", 1.0);
        table.add("b", 0.6);
        assert_eq!(significant_services(&table, 0.6).len(), 2);
    }

    #[test]
    fn test_significant_set_always_has_top() {
        let mut table = ServiceScoreTable::new();
        table.add("only", -0.3);
        table.add("worse", -0.4);
        let sig = significant_services(&table, 0.6);
        assert_eq!(sig[0].0, "only");
        assert!(significant_services(&ServiceScoreTable::new(), 0.6).is_empty());
    }

    #[test]
    fn test_ranked_ties_broken_by_name() {
        let mut table = ServiceScoreTable::new();
        table.add("zun", 0.5);
        table.add("aodh", 0.5);
        let ranked = table.ranked();
        assert_eq!(ranked[0].0, "aodh");
        assert_eq!(ranked[1].0, "zun");
    }

    #[tokio::test]
    async fn test_route_novalidhost_scenario() {
        let hits = vec![
            plain("n1", Some("nova"), 0.6),
            plain("p1", Some("placement"), 0.7),
            plain("n2", Some("nova"), 0.4),
            plain("q1", Some("neutron"), 0.2),
        ];
        let router = Router::new(FixedIndex::new(hits), RankingPolicy::default(), RouterParams::default());
        let bundle = router
            .route("Instance fails to launch with NoValidHost", None, 5)
            .await
            .unwrap();
        assert_eq!(bundle.services(), vec!["nova", "placement"]);
        match &bundle {
            EvidenceBundle::ByService(groups) => {
                assert!((groups[0].aggregate_score - 1.0).abs() < 1e-12);
                assert!(groups[0].candidates.iter().all(|c| c.chunk.is_service("nova")));
                assert_eq!(groups[1].candidates.len(), 1);
            }
            EvidenceBundle::Flat(_) => panic!("expected grouped bundle"),
        }

        let calls = router.index().calls.lock().unwrap().clone();
        assert_eq!(calls[0], (None, 10));
        assert_eq!(calls.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_route_order_independent_of_completion() {
        let hits = vec![
            plain("n1", Some("nova"), 0.6),
            plain("p1", Some("placement"), 0.7),
            plain("n2", Some("nova"), 0.4),
        ];
        let index = SlowIndex {
            inner: FixedIndex::new(hits),
            delays_ms: vec![("nova", 50), ("placement", 5)],
            finished: Mutex::new(Vec::new()),
        };
        let router = Router::new(index, RankingPolicy::default(), RouterParams::default());
        let bundle = router.route("NoValidHost", None, 5).await.unwrap();

        let finished = router.index().finished.lock().unwrap().clone();
        assert_eq!(finished, vec!["placement", "nova"]);
        assert_eq!(bundle.services(), vec!["nova", "placement"]);
    }

    #[tokio::test]
    async fn test_route_explicit_service_skips_routing() {
        let hits = vec![
            plain("n1", Some("nova"), 0.9),
            plain("c1", Some("cinder"), 0.3),
        ];
        let router = Router::new(FixedIndex::new(hits), RankingPolicy::default(), RouterParams::default());
        let bundle = router.route("volume", Some("cinder"), 5).await.unwrap();
        match bundle {
            EvidenceBundle::Flat(c) => {
                assert_eq!(c.len(), 1);
                assert!(c.iter().all(|c| c.chunk.is_service("cinder")));
            }
            EvidenceBundle::ByService(_) => panic!("expected flat bundle"),
        }
        let calls = router.index().calls.lock().unwrap().clone();
        assert_eq!(calls, vec![(Some("cinder".to_string()), 50)]);
    }

    #[tokio::test]
    async fn test_route_empty_pool() {
        let router = Router::new(FixedIndex::new(vec![]), RankingPolicy::default(), RouterParams::default());
        let bundle = router.route("anything", None, 5).await.unwrap();
        assert!(bundle.is_empty());
    }

    #[tokio::test]
    async fn test_route_untagged_pool_falls_back_to_flat() {
        let hits: Vec<RawHit> = (0..8).map(|i| plain(&format!("u{}", i), None, 1.0 - i as f64 * 0.1)).collect();
        let router = Router::new(FixedIndex::new(hits), RankingPolicy::default(), RouterParams::default());
        let bundle = router.route("anything", None, 3).await.unwrap();
        match bundle {
            EvidenceBundle::Flat(c) => {
                let ids: Vec<&str> = c.iter().map(|c| c.chunk.id.as_str()).collect();
                assert_eq!(ids, vec!["u0", "u1", "u2"]);
            }
            EvidenceBundle::ByService(_) => panic!("expected flat bundle"),
        }
    }

    #[tokio::test]
    async fn test_route_is_deterministic() {
        let hits = vec![
            plain("a", Some("nova"), 0.5),
            plain("b", Some("glance"), 0.5),
            plain("c", Some("cinder"), 0.45),
        ];
        let router = Router::new(FixedIndex::new(hits), RankingPolicy::default(), RouterParams::default());
        let first = router.route("image", None, 5).await.unwrap();
        let second = router.route("image", None, 5).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.services(), vec!["glance", "nova", "cinder"]);
    }

    #[tokio::test]
    async fn test_route_propagates_index_failure() {
        let router = Router::new(FailingIndex, RankingPolicy::default(), RouterParams::default());
        let err = router.route("x", None, 5).await.unwrap_err();
        assert!(matches!(err, TriageError::IndexUnavailable { .. }));
    }
}
