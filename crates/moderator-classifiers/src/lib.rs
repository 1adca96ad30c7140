//! Moderator Classifiers
//!
//! Multilingual toxicity scoring backed by Candle.
//!
//! The model is an XLM-RoBERTa sequence classifier fine-tuned for multi-label
//! toxicity. Weights come from a released checkpoint (downloaded and cached on
//! first use); the architecture config and tokenizer come from the base model.
//! Every class is scored independently with a sigmoid.

pub mod checkpoint;
pub mod classifier;
pub mod model_config;
pub mod xlm_roberta;

pub use checkpoint::{
    checkpoint_class_names, checkpoint_num_labels, resolve_base_files, resolve_checkpoint,
    BaseModelFiles,
};
pub use classifier::ToxicityModel;
pub use model_config::{
    BaseModelSource, CheckpointFormat, CheckpointSource, InferenceConfig, ModelConfig,
    DEFAULT_CHECKPOINT_URL,
};
pub use xlm_roberta::{XlmRobertaToxicity, MIN_MAX_LENGTH};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::classifier::ToxicityModel;
    pub use crate::model_config::ModelConfig;
    pub use crate::xlm_roberta::XlmRobertaToxicity;
}
