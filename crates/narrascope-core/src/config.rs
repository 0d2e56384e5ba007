//! Run configuration.
//!
//! Every option here is structural: it decides which nodes the graph contains
//! and how they are wired, and is fixed for the whole run. All fields have
//! defaults, so an empty TOML file is a valid single-agent configuration.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("reading {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("config parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// The steps of the classification graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    CleanText,
    ClassifyCategory,
    HandleOtherCategory,
    ClassifyNarratives,
    ValidateNarratives,
    AggregateNarratives,
    CleanNarratives,
    HandleEmptyNarratives,
    ClassifySubnarratives,
    ValidateSubnarratives,
    AggregateSubnarratives,
    CleanSubnarratives,
    ResultWriter,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CleanText => "clean_text",
            Self::ClassifyCategory => "classify_category",
            Self::HandleOtherCategory => "handle_other_category",
            Self::ClassifyNarratives => "classify_narratives",
            Self::ValidateNarratives => "validate_narratives",
            Self::AggregateNarratives => "aggregate_narratives",
            Self::CleanNarratives => "clean_narratives",
            Self::HandleEmptyNarratives => "handle_empty_narratives",
            Self::ClassifySubnarratives => "classify_subnarratives",
            Self::ValidateSubnarratives => "validate_subnarratives",
            Self::AggregateSubnarratives => "aggregate_subnarratives",
            Self::CleanSubnarratives => "clean_subnarratives",
            Self::ResultWriter => "result_writer",
        }
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How narratives are scoped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Classify the category first and only offer its narratives.
    #[default]
    Hierarchical,
    /// Skip category classification and offer every narrative.
    Flat,
}

/// Rule for merging several agents' label sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationMethod {
    Intersection,
    #[default]
    Union,
    Majority,
}

impl AggregationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Intersection => "intersection",
            Self::Union => "union",
            Self::Majority => "majority",
        }
    }
}

/// Per-level ensemble and critic settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LevelConfig {
    pub agents: usize,
    pub aggregation: AggregationMethod,
    pub validation: bool,
}

impl Default for LevelConfig {
    fn default() -> Self {
        Self {
            agents: 1,
            aggregation: AggregationMethod::Union,
            validation: false,
        }
    }
}

impl LevelConfig {
    pub fn is_ensemble(&self) -> bool {
        self.agents > 1
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FuzzyConfig {
    pub enabled: bool,
    /// Minimum similarity (0-100) for a repair to be accepted, inclusive.
    pub threshold: u32,
}

impl Default for FuzzyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: 70,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_backoff_secs: u64,
    pub max_backoff_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            initial_backoff_secs: 5,
            max_backoff_secs: 120,
        }
    }
}

/// Default LLM call parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: String,
    pub model: String,
    pub base_url: String,
    /// Environment variable holding the API key.
    pub api_key_env: Option<String>,
    pub temperature: Option<f32>,
    pub seed: Option<u64>,
    pub max_tokens: Option<u32>,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".into(),
            model: "gpt-4o-mini".into(),
            base_url: "https://api.openai.com/v1".into(),
            api_key_env: Some("OPENAI_API_KEY".into()),
            temperature: Some(0.0),
            seed: Some(42),
            max_tokens: Some(2048),
            timeout_secs: 120,
        }
    }
}

/// Call parameters that replace the [`LlmConfig`] defaults for one node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeOverride {
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

/// Call parameters after applying any node override.
#[derive(Debug, Clone, PartialEq)]
pub struct CallParams {
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub strategy: Strategy,
    pub clean_text: bool,
    pub clean_labels: bool,
    pub save_votes: bool,
    /// Documents classified in parallel.
    pub concurrency: usize,
    pub narrative: LevelConfig,
    pub subnarrative: LevelConfig,
    pub fuzzy: FuzzyConfig,
    pub retry: RetryConfig,
    pub llm: LlmConfig,
    pub overrides: BTreeMap<NodeKind, NodeOverride>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::Hierarchical,
            clean_text: false,
            clean_labels: true,
            save_votes: true,
            concurrency: 4,
            narrative: LevelConfig::default(),
            subnarrative: LevelConfig::default(),
            fuzzy: FuzzyConfig::default(),
            retry: RetryConfig::default(),
            llm: LlmConfig::default(),
            overrides: BTreeMap::new(),
        }
    }
}

impl ClassifierConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let s = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&s)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.narrative.agents == 0 || self.subnarrative.agents == 0 {
            return Err(ConfigError::Invalid("agent counts must be at least 1".into()));
        }
        if self.concurrency == 0 {
            return Err(ConfigError::Invalid("concurrency must be at least 1".into()));
        }
        if self.fuzzy.threshold > 100 {
            return Err(ConfigError::Invalid(format!(
                "fuzzy threshold {} is outside 0-100",
                self.fuzzy.threshold
            )));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid("retry.max_attempts must be at least 1".into()));
        }
        Ok(())
    }

    /// Resolve the call parameters for `node`.
    pub fn call_params(&self, node: NodeKind) -> CallParams {
        let over = self.overrides.get(&node);
        CallParams {
            model: over
                .and_then(|o| o.model.clone())
                .unwrap_or_else(|| self.llm.model.clone()),
            temperature: over.and_then(|o| o.temperature).or(self.llm.temperature),
            max_tokens: over.and_then(|o| o.max_tokens).or(self.llm.max_tokens),
            seed: self.llm.seed,
        }
    }
}
