//! TOML configuration.
//!
//! Every section except `[index]` is optional; missing keys fall back to
//! the defaults the reasoning loop was tuned with. [`load_config`]
//! validates values so bad factors fail at startup rather than quietly
//! skewing rankings.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use triage_harness_core::agent::AgentSettings;
use triage_harness_core::evidence::RenderOptions;
use triage_harness_core::rank::{KeywordBoost, RankingPolicy};
use triage_harness_core::router::RouterParams;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub index: IndexConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub oracle: OracleConfig,
    #[serde(default)]
    pub ranking: RankingConfig,
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub agent: AgentConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    /// JSONL file of chunk records.
    pub path: PathBuf,
    /// `"semantic"` (embeddings) or `"keyword"` (word overlap).
    #[serde(default = "default_index_mode")]
    pub mode: String,
}

fn default_index_mode() -> String {
    "semantic".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL for the Ollama provider.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            dims: None,
            url: None,
            batch_size: 64,
            max_retries: 2,
            timeout_secs: 30,
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    2
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct OracleConfig {
    /// `"ollama"` or `"openai"`.
    #[serde(default = "default_oracle_provider")]
    pub provider: String,
    /// Model name; falls back to `OLLAMA_MODEL`, then `qwen2.5:14b`.
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_oracle_timeout")]
    pub timeout_secs: u64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            provider: default_oracle_provider(),
            model: None,
            url: None,
            timeout_secs: default_oracle_timeout(),
        }
    }
}

fn default_oracle_provider() -> String {
    "ollama".to_string()
}
fn default_oracle_timeout() -> u64 {
    120
}

impl OracleConfig {
    pub fn resolved_model(&self) -> String {
        self.model
            .clone()
            .or_else(|| std::env::var("OLLAMA_MODEL").ok())
            .unwrap_or_else(|| "qwen2.5:14b".to_string())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RankingConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_releasenotes_penalty")]
    pub releasenotes_penalty: f64,
    #[serde(default = "default_service_boost")]
    pub service_boost: f64,
    #[serde(default = "default_heading_boost")]
    pub heading_boost: f64,
    #[serde(default = "default_keyword_boosts")]
    pub keyword_boosts: Vec<KeywordBoost>,
    #[serde(default = "default_scoped_pool_k")]
    pub scoped_pool_k: usize,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            releasenotes_penalty: default_releasenotes_penalty(),
            service_boost: default_service_boost(),
            heading_boost: default_heading_boost(),
            keyword_boosts: default_keyword_boosts(),
            scoped_pool_k: default_scoped_pool_k(),
        }
    }
}

fn default_top_k() -> usize {
    5
}
fn default_releasenotes_penalty() -> f64 {
    0.5
}
fn default_service_boost() -> f64 {
    1.1
}
fn default_heading_boost() -> f64 {
    1.15
}
fn default_keyword_boosts() -> Vec<KeywordBoost> {
    RankingPolicy::default().keyword_boosts
}
fn default_scoped_pool_k() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct RoutingConfig {
    #[serde(default = "default_pool_k")]
    pub pool_k: usize,
    #[serde(default = "default_significance_ratio")]
    pub significance_ratio: f64,
    #[serde(default = "default_lexical_weight")]
    pub lexical_weight: f64,
    #[serde(default = "default_lexical_window_chars")]
    pub lexical_window_chars: usize,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            pool_k: default_pool_k(),
            significance_ratio: default_significance_ratio(),
            lexical_weight: default_lexical_weight(),
            lexical_window_chars: default_lexical_window_chars(),
        }
    }
}

fn default_pool_k() -> usize {
    10
}
fn default_significance_ratio() -> f64 {
    0.6
}
fn default_lexical_weight() -> f64 {
    0.05
}
fn default_lexical_window_chars() -> usize {
    300
}

#[derive(Debug, Deserialize, Clone)]
pub struct AgentConfig {
    #[serde(default = "default_max_rounds")]
    pub max_rounds: usize,
    #[serde(default)]
    pub force_final_after_round: Option<usize>,
    #[serde(default = "default_excerpt_chars")]
    pub excerpt_chars: usize,
    #[serde(default)]
    pub max_excerpts_per_group: Option<usize>,
    #[serde(default)]
    pub query_expansion: Vec<String>,
    #[serde(default = "default_index_timeout")]
    pub index_timeout_secs: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
            force_final_after_round: None,
            excerpt_chars: default_excerpt_chars(),
            max_excerpts_per_group: None,
            query_expansion: Vec::new(),
            index_timeout_secs: default_index_timeout(),
        }
    }
}

fn default_max_rounds() -> usize {
    2
}
fn default_excerpt_chars() -> usize {
    800
}
fn default_index_timeout() -> u64 {
    30
}

impl AgentConfig {
    pub fn index_timeout(&self) -> Duration {
        Duration::from_secs(self.index_timeout_secs)
    }
}

impl Config {
    /// Defaults with the given chunk file, keyword mode and no embeddings.
    pub fn minimal(index_path: impl Into<PathBuf>) -> Self {
        Self {
            index: IndexConfig {
                path: index_path.into(),
                mode: "keyword".to_string(),
            },
            embedding: EmbeddingConfig::default(),
            oracle: OracleConfig::default(),
            ranking: RankingConfig::default(),
            routing: RoutingConfig::default(),
            agent: AgentConfig::default(),
        }
    }

    pub fn ranking_policy(&self) -> RankingPolicy {
        RankingPolicy {
            releasenotes_penalty: self.ranking.releasenotes_penalty,
            service_boost: self.ranking.service_boost,
            heading_boost: self.ranking.heading_boost,
            keyword_boosts: self
                .ranking
                .keyword_boosts
                .iter()
                .map(|kb| KeywordBoost {
                    keyword: kb.keyword.to_lowercase(),
                    ..kb.clone()
                })
                .collect(),
        }
    }

    pub fn router_params(&self) -> RouterParams {
        RouterParams {
            pool_k: self.routing.pool_k,
            scoped_pool_k: self.ranking.scoped_pool_k,
            significance_ratio: self.routing.significance_ratio,
            lexical_weight: self.routing.lexical_weight,
            lexical_window_chars: self.routing.lexical_window_chars,
        }
    }

    pub fn agent_settings(&self) -> AgentSettings {
        AgentSettings {
            max_rounds: self.agent.max_rounds,
            force_final_after_round: self.agent.force_final_after_round,
            top_k: self.ranking.top_k,
            render: RenderOptions {
                excerpt_chars: self.agent.excerpt_chars,
                max_per_group: self.agent.max_excerpts_per_group,
            },
            query_expansion: self.agent.query_expansion.clone(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

/// Check value ranges across all sections.
pub fn validate(config: &Config) -> Result<()> {
    match config.index.mode.as_str() {
        "semantic" | "keyword" => {}
        other => bail!("Unknown index mode: '{}'. Must be semantic or keyword.", other),
    }
    if config.index.mode == "semantic" && !config.embedding.is_enabled() {
        bail!("index.mode = \"semantic\" requires an [embedding] provider");
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" | "local" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, or local.",
            other
        ),
    }
    if matches!(config.embedding.provider.as_str(), "openai" | "ollama") {
        if config.embedding.model.is_none() {
            bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
    }
    if config.embedding.batch_size == 0 {
        bail!("embedding.batch_size must be >= 1");
    }

    match config.oracle.provider.as_str() {
        "ollama" | "openai" => {}
        other => bail!("Unknown oracle provider: '{}'. Must be ollama or openai.", other),
    }
    if config.oracle.timeout_secs == 0 {
        bail!("oracle.timeout_secs must be >= 1");
    }

    let r = &config.ranking;
    if r.top_k < 1 {
        bail!("ranking.top_k must be >= 1");
    }
    if r.scoped_pool_k < 1 {
        bail!("ranking.scoped_pool_k must be >= 1");
    }
    if !(r.releasenotes_penalty > 0.0 && r.releasenotes_penalty < 1.0) {
        bail!("ranking.releasenotes_penalty must be in (0.0, 1.0)");
    }
    if r.service_boost < 1.0 || r.heading_boost < 1.0 {
        bail!("ranking.service_boost and ranking.heading_boost must be >= 1.0");
    }
    for kb in &r.keyword_boosts {
        if kb.keyword.trim().is_empty() || kb.service.trim().is_empty() {
            bail!("ranking.keyword_boosts entries need a keyword and a service");
        }
        if kb.factor < 1.0 {
            bail!("ranking.keyword_boosts factor for '{}' must be >= 1.0", kb.keyword);
        }
    }

    let rt = &config.routing;
    if rt.pool_k < 1 {
        bail!("routing.pool_k must be >= 1");
    }
    if !(rt.significance_ratio > 0.0 && rt.significance_ratio <= 1.0) {
        bail!("routing.significance_ratio must be in (0.0, 1.0]");
    }
    if rt.lexical_weight < 0.0 {
        bail!("routing.lexical_weight must be >= 0.0");
    }

    let a = &config.agent;
    if !(1..=8).contains(&a.max_rounds) {
        bail!("agent.max_rounds must be between 1 and 8");
    }
    if let Some(round) = a.force_final_after_round {
        if round >= a.max_rounds {
            bail!(
                "agent.force_final_after_round ({}) must be < agent.max_rounds ({})",
                round,
                a.max_rounds
            );
        }
    }
    if a.excerpt_chars == 0 {
        bail!("agent.excerpt_chars must be >= 1");
    }
    if a.index_timeout_secs == 0 {
        bail!("agent.index_timeout_secs must be >= 1");
    }

    Ok(())
}
