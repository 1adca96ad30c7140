//! Shared application state

use anyhow::Result;
use metrics_exporter_prometheus::PrometheusHandle;
use moderator_classifiers::{ToxicityModel, XlmRobertaToxicity};
use std::sync::Arc;
use tracing::info;

use crate::config::ServiceConfig;

/// Application state shared across all requests
#[derive(Clone)]
pub struct AppState {
    /// Loaded configuration
    pub config: Arc<ServiceConfig>,

    /// The model, loaded once at startup
    pub model: Arc<dyn ToxicityModel>,

    /// Prometheus metrics handle for rendering
    pub metrics_handle: PrometheusHandle,
}

impl AppState {
    /// Wrap an already-loaded model
    pub fn new(
        config: ServiceConfig,
        model: Arc<dyn ToxicityModel>,
        metrics_handle: PrometheusHandle,
    ) -> Self {
        Self {
            config: Arc::new(config),
            model,
            metrics_handle,
        }
    }

    /// Load the configured checkpoint and build the state
    pub async fn load(config: ServiceConfig, metrics_handle: PrometheusHandle) -> Result<Self> {
        info!("Loading toxicity model '{}'", config.model.name);

        let model = XlmRobertaToxicity::load(&config.model).await?;
        info!("Model ready with classes: {}", model.class_names().join(", "));

        Ok(Self::new(config, Arc::new(model), metrics_handle))
    }

    /// Verdict threshold
    pub fn threshold(&self) -> f32 {
        self.config.model.inference.threshold
    }
}
