//! File-backed evidence index.
//!
//! [`VectorIndex`] is the process-owned handle the router searches. It is
//! built explicitly by [`VectorIndex::open`] from a JSONL file of chunk
//! records and dropped with the process; nothing is cached globally.
//!
//! Each line is one chunk:
//!
//! ```json
//! {"id": "…", "source": "admin_docs", "service": "nova", "heading": "…",
//!  "text": "…", "url": "…", "embedding": [0.01, …]}
//! ```
//!
//! `id` and `embedding` are optional. Missing ids get a fresh UUID.
//! In semantic mode, records without an embedding are embedded once at
//! open time (in memory only; the file is never rewritten). Release-note
//! records may use `project` in place of `service`.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use tracing::{debug, info, warn};

use triage_harness_core::error::TriageError;
use triage_harness_core::index::memory::{InMemoryIndex, IndexSummary};
use triage_harness_core::index::EvidenceIndex;
use triage_harness_core::models::{Chunk, RawHit, SourceKind};

use crate::config::Config;
use crate::embedding::Embedder;

/// One line of the chunk file.
#[derive(Debug, Clone, Deserialize)]
pub struct ChunkRecord {
    #[serde(default)]
    pub id: Option<String>,
    pub source: SourceKind,
    #[serde(default, alias = "project")]
    pub service: Option<String>,
    #[serde(default)]
    pub heading: Option<String>,
    pub text: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
}

impl ChunkRecord {
    fn into_parts(self) -> (Chunk, Option<Vec<f32>>) {
        let chunk = Chunk {
            id: self
                .id
                .filter(|id| !id.trim().is_empty())
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            source: self.source,
            service: self.service.filter(|s| !s.trim().is_empty()),
            heading: self.heading,
            text: self.text,
            url: self.url,
        };
        (chunk, self.embedding)
    }
}

/// How the index scores a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    /// Cosine similarity between query and chunk embeddings.
    Semantic,
    /// Fraction of query words present in the chunk.
    Keyword,
}

impl SearchMode {
    pub fn parse(mode: &str) -> Result<Self> {
        match mode {
            "semantic" => Ok(Self::Semantic),
            "keyword" => Ok(Self::Keyword),
            other => bail!("Unknown index mode: {}. Use semantic or keyword.", other),
        }
    }
}

pub struct VectorIndex {
    index: InMemoryIndex,
    embedder: Embedder,
    mode: SearchMode,
}

impl VectorIndex {
    /// Load the configured chunk file and prepare it for searching.
    pub async fn open(config: &Config) -> Result<Self> {
        let mode = SearchMode::parse(&config.index.mode)?;
        let embedder = Embedder::new(&config.embedding)?;
        let records = load_records(&config.index.path)?;
        info!(
            path = %config.index.path.display(),
            chunks = records.len(),
            ?mode,
            "loaded chunk file"
        );
        Self::build(records, embedder, mode).await
    }

    /// Build from already-parsed records.
    pub async fn build(records: Vec<ChunkRecord>, embedder: Embedder, mode: SearchMode) -> Result<Self> {
        if mode == SearchMode::Semantic && !embedder.is_enabled() {
            bail!("Semantic index mode requires an embedding provider");
        }

        let mut index = InMemoryIndex::new();
        let expected_dims = embedder.provider().dims();
        let mut mismatched = 0usize;
        for record in records {
            let (chunk, vector) = record.into_parts();
            let vector = vector.filter(|v| {
                let ok = expected_dims == 0 || v.len() == expected_dims;
                if !ok {
                    mismatched += 1;
                }
                ok
            });
            index.push(chunk, vector);
        }
        if mismatched > 0 {
            warn!(
                mismatched,
                expected_dims, "dropped stored embeddings with unexpected dimensionality"
            );
        }

        let mut this = Self {
            index,
            embedder,
            mode,
        };
        if mode == SearchMode::Semantic {
            this.embed_missing().await?;
        }
        Ok(this)
    }

    async fn embed_missing(&mut self) -> Result<()> {
        let missing: Vec<(usize, String)> = self
            .index
            .missing_vectors()
            .into_iter()
            .map(|(pos, chunk)| (pos, embedding_text(chunk)))
            .collect();
        if missing.is_empty() {
            return Ok(());
        }

        info!(
            count = missing.len(),
            model = self.embedder.provider().model_name(),
            "embedding chunks without stored vectors"
        );
        for batch in missing.chunks(self.embedder.batch_size()) {
            let texts: Vec<String> = batch.iter().map(|(_, t)| t.clone()).collect();
            let vectors = self
                .embedder
                .embed_texts(&texts)
                .await
                .context("Failed to embed chunks")?;
            for ((pos, _), vector) in batch.iter().zip(vectors) {
                self.index.set_vector(*pos, vector);
            }
        }
        Ok(())
    }

    pub fn mode(&self) -> SearchMode {
        self.mode
    }

    pub fn summary(&self) -> IndexSummary {
        self.index.summary()
    }
}

/// Text embedded for a chunk: heading line followed by the body.
fn embedding_text(chunk: &Chunk) -> String {
    match chunk.heading.as_deref() {
        Some(h) if !h.trim().is_empty() => format!("{}\n{}", h, chunk.text),
        _ => chunk.text.clone(),
    }
}

#[async_trait]
impl EvidenceIndex for VectorIndex {
    async fn search(
        &self,
        query: &str,
        service: Option<&str>,
        k: usize,
    ) -> Result<Vec<RawHit>, TriageError> {
        let hits = match self.mode {
            SearchMode::Keyword => self.index.keyword_search(query, service, k),
            SearchMode::Semantic => {
                let query_vec = self
                    .embedder
                    .embed_query(query)
                    .await
                    .map_err(|e| TriageError::index(format!("query embedding failed: {:#}", e)))?;
                self.index.vector_search(&query_vec, service, k)
            }
        };
        debug!(query, service, k, hits = hits.len(), "index search");
        Ok(hits)
    }
}

/// Parse a JSONL chunk file. Blank lines are skipped; any malformed line
/// fails the load with its line number.
pub fn load_records(path: &Path) -> Result<Vec<ChunkRecord>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read chunk file: {}", path.display()))?;
    parse_records(&content).with_context(|| format!("Invalid chunk file: {}", path.display()))
}

pub fn parse_records(content: &str) -> Result<Vec<ChunkRecord>> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str::<ChunkRecord>(line)
                .with_context(|| format!("line {}: not a valid chunk record", i + 1))
        })
        .collect()
}
