use crate::cluster::{KEstimate, DEFAULT_MAX_CLUSTERS};
use crate::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.15;
pub const DEFAULT_NEIGHBOR_LIMIT: usize = 5;

/// How inverse document frequency is derived from document frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdfMode {
    /// ln(N / df)
    #[default]
    Standard,
    /// ln(1 + N / df)
    Smoothed,
}

impl IdfMode {
    pub fn idf(self, num_docs: usize, df: u32) -> f32 {
        if num_docs == 0 || df == 0 {
            return 0.0;
        }
        let ratio = num_docs as f64 / df as f64;
        let v = match self {
            IdfMode::Standard => ratio.ln(),
            IdfMode::Smoothed => (1.0 + ratio).ln(),
        };
        v.max(0.0) as f32
    }
}

impl std::str::FromStr for IdfMode {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "standard" => Ok(IdfMode::Standard),
            "smoothed" => Ok(IdfMode::Smoothed),
            other => Err(EngineError::InvalidConfig(format!("unknown idf mode {other:?}"))),
        }
    }
}

/// Engine tuning. The similarity threshold and neighbor limit are empirical
/// values tuned on small personal corpora.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub similarity_threshold: f32,
    pub neighbor_limit: usize,
    pub search_limit: usize,
    /// Maximum number of document pairs graph construction may compare.
    pub graph_pair_budget: u64,
    /// Refuse to build the graph over budget instead of warning.
    pub enforce_graph_budget: bool,
    pub idf_mode: IdfMode,
    pub stem: bool,
    pub min_token_len: usize,
    /// Upper bound when the cluster count is estimated.
    pub max_clusters: usize,
    pub cluster_estimate: KEstimate,
    pub cluster_seed: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            neighbor_limit: DEFAULT_NEIGHBOR_LIMIT,
            search_limit: 10,
            graph_pair_budget: 2_000_000,
            enforce_graph_budget: false,
            idf_mode: IdfMode::Standard,
            stem: false,
            min_token_len: crate::tokenizer::DEFAULT_MIN_LEN,
            max_clusters: DEFAULT_MAX_CLUSTERS,
            cluster_estimate: KEstimate::Elbow,
            cluster_seed: 42,
        }
    }
}

impl EngineConfig {
    /// Environment over config file over defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut cfg = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        cfg.apply_env(|key| std::env::var(key).ok())?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let cfg: EngineConfig = serde_json::from_str(&text)?;
        Ok(cfg)
    }

    /// Apply `KB_*` overrides read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("KB_SIMILARITY_THRESHOLD") {
            self.similarity_threshold = parse_env("KB_SIMILARITY_THRESHOLD", &v)?;
        }
        if let Some(v) = lookup("KB_NEIGHBOR_LIMIT") {
            self.neighbor_limit = parse_env("KB_NEIGHBOR_LIMIT", &v)?;
        }
        if let Some(v) = lookup("KB_SEARCH_LIMIT") {
            self.search_limit = parse_env("KB_SEARCH_LIMIT", &v)?;
        }
        if let Some(v) = lookup("KB_GRAPH_PAIR_BUDGET") {
            self.graph_pair_budget = parse_env("KB_GRAPH_PAIR_BUDGET", &v)?;
        }
        if let Some(v) = lookup("KB_IDF_MODE") {
            self.idf_mode = v.parse()?;
        }
        if let Some(v) = lookup("KB_STEM") {
            self.stem = matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }
        if let Some(v) = lookup("KB_MAX_CLUSTERS") {
            self.max_clusters = parse_env("KB_MAX_CLUSTERS", &v)?;
        }
        if let Some(v) = lookup("KB_CLUSTER_ESTIMATE") {
            self.cluster_estimate = v.parse()?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(EngineError::InvalidConfig(format!(
                "similarity_threshold must be within [0, 1], got {}",
                self.similarity_threshold
            )));
        }
        if self.neighbor_limit == 0 || self.search_limit == 0 || self.max_clusters == 0 {
            return Err(EngineError::InvalidConfig("limits must be at least 1".into()));
        }
        if self.min_token_len == 0 {
            return Err(EngineError::InvalidConfig("min_token_len must be at least 1".into()));
        }
        Ok(())
    }

    pub fn tokenizer(&self) -> crate::tokenizer::Tokenizer {
        crate::tokenizer::Tokenizer::new(self.stem, self.min_token_len)
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| EngineError::InvalidConfig(format!("{key}={value:?} is not a valid value")))
}
