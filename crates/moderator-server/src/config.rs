//! Service configuration

use moderator_classifiers::{CheckpointSource, ModelConfig, MIN_MAX_LENGTH};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// HTTP listener and request limits
    #[serde(default)]
    pub server: ServerConfig,

    /// Toxicity model
    #[serde(default)]
    pub model: ModelConfig,

    /// Log output
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ServiceConfig {
    /// Load configuration from file and apply overrides
    pub fn load(config_path: impl AsRef<Path>, overrides: &ConfigOverrides) -> anyhow::Result<Self> {
        let config_path = config_path.as_ref();

        // Try to load from file, or use defaults
        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(config_path)?;
            serde_yaml::from_str(&content)?
        } else {
            Self::default()
        };

        config.apply(overrides);
        config.validate()?;

        Ok(config)
    }

    /// Apply CLI/environment overrides
    pub fn apply(&mut self, overrides: &ConfigOverrides) {
        if let Some(listen) = &overrides.listen {
            self.server.listen = listen.clone();
        }

        if let Some(port) = overrides.port {
            self.server.port = port;
        }

        if let Some(device) = &overrides.device {
            self.model.inference.device = device.clone();
        }

        if let Some(threshold) = overrides.threshold {
            self.model.inference.threshold = threshold;
        }

        if let Some(checkpoint) = &overrides.checkpoint {
            self.model.checkpoint = checkpoint_source(checkpoint);
        }

        if let Some(format) = overrides.log_format {
            self.logging.format = format;
        }
    }

    /// Reject settings the service cannot run with
    pub fn validate(&self) -> anyhow::Result<()> {
        let threshold = self.model.inference.threshold;
        if !(0.0..=1.0).contains(&threshold) {
            anyhow::bail!("threshold must be within [0, 1], got {}", threshold);
        }

        if self.model.inference.max_length < MIN_MAX_LENGTH {
            anyhow::bail!(
                "model.inference.max_length must be at least {}, got {}",
                MIN_MAX_LENGTH,
                self.model.inference.max_length
            );
        }

        if self.server.max_batch_size == 0 {
            anyhow::bail!("server.max_batch_size must be positive");
        }

        if self.model.classes.is_empty() {
            anyhow::bail!("model.classes must list at least one class");
        }

        Ok(())
    }
}

/// URLs are downloaded, anything else is a local file
fn checkpoint_source(value: &str) -> CheckpointSource {
    if value.starts_with("http://") || value.starts_with("https://") {
        CheckpointSource::Url {
            url: value.to_string(),
        }
    } else {
        CheckpointSource::Local {
            path: PathBuf::from(value),
        }
    }
}

/// Values that take precedence over the configuration file
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub listen: Option<String>,
    pub port: Option<u16>,
    pub device: Option<String>,
    pub threshold: Option<f32>,
    pub checkpoint: Option<String>,
    pub log_format: Option<LogFormat>,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Listen port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Largest accepted request body
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    /// Largest accepted list of texts per request
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            port: default_port(),
            max_body_bytes: default_max_body_bytes(),
            max_batch_size: default_max_batch_size(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Output format
    #[serde(default)]
    pub format: LogFormat,

    /// `EnvFilter` directives used when `RUST_LOG` is unset
    #[serde(default)]
    pub filter: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per event
    Json,
}

fn default_listen() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_max_body_bytes() -> usize {
    1024 * 1024
}

fn default_max_batch_size() -> usize {
    32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_uses_defaults() {
        let config =
            ServiceConfig::load("/nonexistent/moderator.yaml", &ConfigOverrides::default()).unwrap();

        assert_eq!(config.server.port, 8000);
        assert_eq!(config.server.max_batch_size, 32);
        assert_eq!(config.logging.format, LogFormat::Text);
        assert_eq!(config.model.inference.device, "cpu");
    }

    #[test]
    fn test_file_then_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            r#"
server:
  port: 9000
  max_batch_size: 4
model:
  inference:
    threshold: 0.8
logging:
  format: json
"#,
        )
        .unwrap();

        let config = ServiceConfig::load(&path, &ConfigOverrides::default()).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.max_batch_size, 4);
        assert_eq!(config.logging.format, LogFormat::Json);

        let overrides = ConfigOverrides {
            port: Some(9100),
            threshold: Some(0.3),
            checkpoint: Some("./weights/model.ckpt".to_string()),
            ..Default::default()
        };
        let config = ServiceConfig::load(&path, &overrides).unwrap();
        assert_eq!(config.server.port, 9100);
        assert!((config.model.inference.threshold - 0.3).abs() < f32::EPSILON);
        assert_eq!(
            config.model.checkpoint,
            CheckpointSource::Local {
                path: PathBuf::from("./weights/model.ckpt")
            }
        );
    }

    #[test]
    fn test_checkpoint_override_url() {
        assert!(matches!(
            checkpoint_source("https://example.com/model.ckpt"),
            CheckpointSource::Url { .. }
        ));
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        let overrides = ConfigOverrides {
            threshold: Some(1.5),
            ..Default::default()
        };

        assert!(ServiceConfig::load("/nonexistent/moderator.yaml", &overrides).is_err());
    }

    #[test]
    fn test_max_length_below_special_tokens_rejected() {
        let mut config = ServiceConfig::default();
        config.model.inference.max_length = 1;
        assert!(config.validate().is_err());

        config.model.inference.max_length = MIN_MAX_LENGTH;
        assert!(config.validate().is_ok());
    }
}
