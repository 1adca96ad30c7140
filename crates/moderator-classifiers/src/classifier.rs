//! Toxicity model trait

use async_trait::async_trait;
use moderator_core::{Prediction, Result, TextInput};

/// Trait for models that score text across toxicity classes
#[async_trait]
pub trait ToxicityModel: Send + Sync {
    /// Score every text in `input`; one probability per class in [0, 1]
    async fn predict(&self, input: &TextInput) -> Result<Prediction>;

    /// Public class names, in output order
    fn class_names(&self) -> &[String];

    /// Get the model name
    fn name(&self) -> &str;
}
