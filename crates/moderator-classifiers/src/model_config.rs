//! Model configuration structures

use moderator_core::labels::DEFAULT_CHECKPOINT_CLASSES;
use moderator_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Released multilingual (XLM-RoBERTa) debiased checkpoint
pub const DEFAULT_CHECKPOINT_URL: &str =
    "https://github.com/unitaryai/detoxify/releases/download/v0.4-alpha/multilingual_debiased-0b549669.ckpt";

/// Hub repository providing the base architecture config and tokenizer
pub const DEFAULT_BASE_REPO: &str = "xlm-roberta-base";

/// Configuration for the toxicity model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Model name reported by the service
    #[serde(default = "default_name")]
    pub name: String,

    /// Where the trained weights come from
    #[serde(default)]
    pub checkpoint: CheckpointSource,

    /// Weights file format
    #[serde(default)]
    pub format: CheckpointFormat,

    /// Where `config.json` and `tokenizer.json` come from
    #[serde(default)]
    pub base: BaseModelSource,

    /// Raw class names stored in the checkpoint, in head order
    #[serde(default = "default_classes")]
    pub classes: Vec<String>,

    /// Inference settings
    #[serde(default)]
    pub inference: InferenceConfig,

    /// Directory for downloaded checkpoints
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
}

fn default_name() -> String {
    "multilingual-toxic-xlm-roberta".to_string()
}

fn default_classes() -> Vec<String> {
    DEFAULT_CHECKPOINT_CLASSES
        .iter()
        .map(|class| class.to_string())
        .collect()
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            checkpoint: CheckpointSource::default(),
            format: CheckpointFormat::default(),
            base: BaseModelSource::default(),
            classes: default_classes(),
            inference: InferenceConfig::default(),
            cache_dir: None,
        }
    }
}

impl ModelConfig {
    /// Load a model configuration from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&contents).map_err(|e| {
            Error::config(format!(
                "Failed to parse model config {}: {}",
                path.display(),
                e
            ))
        })
    }

    /// Directory downloaded checkpoints are cached in
    pub fn resolved_cache_dir(&self) -> PathBuf {
        self.cache_dir.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .or_else(dirs::home_dir)
                .unwrap_or_else(|| PathBuf::from("."))
                .join("moderator")
                .join("checkpoints")
        })
    }
}

/// Checkpoint source configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum CheckpointSource {
    /// Download over HTTP(S) once and cache locally
    Url { url: String },

    /// Load from local filesystem
    Local { path: PathBuf },

    /// Download a single file from HuggingFace Hub
    HuggingFace {
        repo: String,
        #[serde(default = "default_revision")]
        revision: String,
        filename: String,
    },
}

impl Default for CheckpointSource {
    fn default() -> Self {
        Self::Url {
            url: DEFAULT_CHECKPOINT_URL.to_string(),
        }
    }
}

fn default_revision() -> String {
    "main".to_string()
}

/// Weights file format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointFormat {
    /// PyTorch/Lightning pickle; weights live under `state_dict`
    #[default]
    Pytorch,
    /// SafeTensors
    Safetensors,
}

/// Source of the base architecture's `config.json` and `tokenizer.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum BaseModelSource {
    /// Fetch from HuggingFace Hub
    HuggingFace {
        #[serde(default = "default_base_repo")]
        repo: String,
        #[serde(default = "default_revision")]
        revision: String,
    },

    /// Read from a local directory (offline loading)
    Local { path: PathBuf },
}

impl Default for BaseModelSource {
    fn default() -> Self {
        Self::HuggingFace {
            repo: default_base_repo(),
            revision: default_revision(),
        }
    }
}

fn default_base_repo() -> String {
    DEFAULT_BASE_REPO.to_string()
}

/// Inference configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceConfig {
    /// Device to run on (cpu, cuda, cuda:N, metal, mps)
    #[serde(default = "default_device")]
    pub device: String,

    /// Maximum sequence length; longer inputs are truncated
    #[serde(default = "default_max_length")]
    pub max_length: usize,

    /// Verdict threshold
    #[serde(default = "default_threshold")]
    pub threshold: f32,
}

fn default_device() -> String {
    "cpu".to_string()
}

fn default_max_length() -> usize {
    512
}

fn default_threshold() -> f32 {
    0.5
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            device: default_device(),
            max_length: default_max_length(),
            threshold: default_threshold(),
        }
    }
}
