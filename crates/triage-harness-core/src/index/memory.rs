//! In-memory chunk index.
//!
//! Holds chunks and optional embedding vectors in insertion order.
//! Vector search is brute-force cosine similarity; keyword search scores
//! the fraction of distinct query words found in a chunk's heading or
//! text. Both are stable: equal scores keep insertion order.
//!
//! The index is immutable once built, so it can be shared across tasks
//! without locking.

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::error::TriageError;
use crate::models::{Chunk, RawHit, SourceKind};
use crate::text::word_tokens;

use super::EvidenceIndex;

struct IndexedChunk {
    chunk: Chunk,
    vector: Option<Vec<f32>>,
}

/// In-memory index for the CLI, tests and small corpora.
#[derive(Default)]
pub struct InMemoryIndex {
    entries: Vec<IndexedChunk>,
}

/// Chunk counts grouped by service tag and by source kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexSummary {
    pub total: usize,
    pub embedded: usize,
    pub by_service: BTreeMap<String, usize>,
    pub untagged: usize,
    pub by_source: BTreeMap<SourceKind, usize>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk with an optional embedding vector.
    pub fn push(&mut self, chunk: Chunk, vector: Option<Vec<f32>>) {
        self.entries.push(IndexedChunk { chunk, vector });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Chunks that do not yet carry an embedding vector.
    pub fn missing_vectors(&self) -> Vec<(usize, &Chunk)> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.vector.is_none())
            .map(|(i, e)| (i, &e.chunk))
            .collect()
    }

    /// Attach a vector to the entry at `position` (as reported by
    /// [`missing_vectors`](Self::missing_vectors)).
    pub fn set_vector(&mut self, position: usize, vector: Vec<f32>) {
        if let Some(entry) = self.entries.get_mut(position) {
            entry.vector = Some(vector);
        }
    }

    pub fn summary(&self) -> IndexSummary {
        let mut summary = IndexSummary {
            total: self.entries.len(),
            ..Default::default()
        };
        for entry in &self.entries {
            if entry.vector.is_some() {
                summary.embedded += 1;
            }
            match &entry.chunk.service {
                Some(s) => *summary.by_service.entry(s.clone()).or_insert(0) += 1,
                None => summary.untagged += 1,
            }
            *summary.by_source.entry(entry.chunk.source).or_insert(0) += 1;
        }
        summary
    }

    /// Cosine-similarity search over stored vectors.
    ///
    /// Entries without a vector, or with a non-finite similarity, are skipped.
    pub fn vector_search(&self, query_vec: &[f32], service: Option<&str>, k: usize) -> Vec<RawHit> {
        let hits = self
            .entries
            .iter()
            .filter(|e| service.map_or(true, |s| e.chunk.is_service(s)))
            .filter_map(|e| {
                e.vector.as_ref().map(|v| {
                    RawHit::new(e.chunk.clone(), cosine_similarity(query_vec, v) as f64)
                })
            })
            .collect();
        top_k(hits, k)
    }

    /// Word-overlap search: score is the fraction of distinct query words
    /// present in the heading or text. Chunks with no overlap are omitted.
    pub fn keyword_search(&self, query: &str, service: Option<&str>, k: usize) -> Vec<RawHit> {
        let terms = word_tokens(query);
        if terms.is_empty() {
            return Vec::new();
        }
        let hits = self
            .entries
            .iter()
            .filter(|e| service.map_or(true, |s| e.chunk.is_service(s)))
            .filter_map(|e| {
                let heading = e.chunk.heading.as_deref().unwrap_or("").to_lowercase();
                let text = e.chunk.text.to_lowercase();
                let matches = terms
                    .iter()
                    .filter(|t| heading.contains(t.as_str()) || text.contains(t.as_str()))
                    .count();
                (matches > 0).then(|| {
                    RawHit::new(e.chunk.clone(), matches as f64 / terms.len() as f64)
                })
            })
            .collect();
        top_k(hits, k)
    }
}

fn top_k(mut hits: Vec<RawHit>, k: usize) -> Vec<RawHit> {
    hits.retain(|h| h.raw_score.is_finite());
    hits.sort_by(|a, b| b.raw_score.total_cmp(&a.raw_score));
    hits.truncate(k);
    hits
}

/// Keyword-mode search, so an [`InMemoryIndex`] can be used directly
/// where no embedding model is available.
#[async_trait]
impl EvidenceIndex for InMemoryIndex {
    async fn search(
        &self,
        query: &str,
        service: Option<&str>,
        k: usize,
    ) -> Result<Vec<RawHit>, TriageError> {
        Ok(self.keyword_search(query, service, k))
    }
}
