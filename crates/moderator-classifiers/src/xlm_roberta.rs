//! XLM-RoBERTa multi-label toxicity model
//!
//! Wraps `XLMRobertaForSequenceClassification` with the tokenizer of the base
//! architecture. Each class is scored independently with a sigmoid, so the
//! scores of one input do not sum to one.

use crate::checkpoint::{
    checkpoint_class_names, checkpoint_num_labels, load_var_builder, parse_device,
    resolve_base_files, resolve_checkpoint,
};
use crate::classifier::ToxicityModel;
use crate::model_config::ModelConfig;
use async_trait::async_trait;
use candle_core::{Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::xlm_roberta::{
    Config as XlmRobertaConfig, XLMRobertaForSequenceClassification,
};
use moderator_core::{remap_class_names, Error, Prediction, Result, TextInput};
use serde::de::DeserializeOwned;
use std::path::Path;
use std::time::Instant;
use tokenizers::{Encoding, PaddingParams, PaddingStrategy, Tokenizer, TruncationParams};

const PAD_TOKEN: &str = "<pad>";
const PAD_TOKEN_ID: u32 = 1;

/// `<s>`, `</s>`, and at least one token of text
pub const MIN_MAX_LENGTH: usize = 3;

/// Toxicity model backed by an XLM-RoBERTa checkpoint
pub struct XlmRobertaToxicity {
    name: String,
    tokenizer: Tokenizer,
    model: XLMRobertaForSequenceClassification,
    device: Device,
    labels: Vec<String>,
}

impl XlmRobertaToxicity {
    /// Resolve, download, and load everything `config` points at
    pub async fn load(config: &ModelConfig) -> Result<Self> {
        let start = Instant::now();
        tracing::info!("Loading toxicity model '{}'", config.name);

        let base = resolve_base_files(&config.base)?;
        let checkpoint = resolve_checkpoint(config).await?;

        let xlm_config: XlmRobertaConfig = parse_json_config(&base.config)?;
        let tokenizer = Tokenizer::from_file(&base.tokenizer)
            .map_err(|e| Error::model(format!("Failed to load tokenizer.json: {}", e)))?;

        check_max_length(config.inference.max_length, &xlm_config)?;

        let raw_classes = match checkpoint_class_names(&checkpoint, config.format)? {
            Some(classes) => {
                tracing::debug!("Class names read from checkpoint: {:?}", classes);
                classes
            }
            None => {
                tracing::info!("Checkpoint carries no class names, using model.classes");
                config.classes.clone()
            }
        };
        let labels = remap_class_names(&raw_classes);

        // Debiased heads append identity outputs after the named classes
        let num_labels = checkpoint_num_labels(&checkpoint, config.format)?;
        if labels.is_empty() || labels.len() > num_labels {
            return Err(Error::config(format!(
                "{} class names for a checkpoint head with {} outputs",
                labels.len(),
                num_labels
            )));
        }

        let device = parse_device(&config.inference.device)?;
        let vb = load_var_builder(&checkpoint, config.format, &device)?;
        let model = load_sequence_model(&vb, num_labels, &xlm_config)?;

        tracing::info!(
            "Loaded '{}' with {} classes {:?} in {:?}",
            config.name,
            labels.len(),
            labels,
            start.elapsed()
        );

        Self::from_parts(
            config.name.clone(),
            tokenizer,
            model,
            device,
            labels,
            config.inference.max_length,
        )
    }

    /// Assemble a model from already-loaded components
    pub fn from_parts(
        name: impl Into<String>,
        mut tokenizer: Tokenizer,
        model: XLMRobertaForSequenceClassification,
        device: Device,
        labels: Vec<String>,
        max_length: usize,
    ) -> Result<Self> {
        if max_length < MIN_MAX_LENGTH {
            return Err(Error::config(format!(
                "max_length must be at least {}, got {}",
                MIN_MAX_LENGTH, max_length
            )));
        }
        configure_tokenizer(&mut tokenizer, max_length)?;

        Ok(Self {
            name: name.into(),
            tokenizer,
            model,
            device,
            labels,
        })
    }

    fn forward(&self, encodings: &[Encoding]) -> Result<Vec<Vec<f32>>> {
        let input_ids = batch_tensor(encodings, Encoding::get_ids, &self.device)?;
        let attention_mask = batch_tensor(encodings, Encoding::get_attention_mask, &self.device)?;
        let token_type_ids = batch_tensor(encodings, Encoding::get_type_ids, &self.device)?;

        let logits = self
            .model
            .forward(&input_ids, &attention_mask, &token_type_ids)
            .map_err(|e| Error::model(format!("Model forward pass failed: {}", e)))?
            .narrow(1, 0, self.labels.len())
            .map_err(|e| Error::model(format!("Head narrower than class list: {}", e)))?;

        candle_nn::ops::sigmoid(&logits)
            .map_err(|e| Error::model(format!("Sigmoid failed: {}", e)))?
            .to_vec2::<f32>()
            .map_err(|e| Error::model(format!("Failed to convert scores: {}", e)))
    }
}

#[async_trait]
impl ToxicityModel for XlmRobertaToxicity {
    async fn predict(&self, input: &TextInput) -> Result<Prediction> {
        if input.is_empty() {
            return Err(Error::validation("content must contain at least one text"));
        }

        let start = Instant::now();

        let encodings = self
            .tokenizer
            .encode_batch(input.texts(), true)
            .map_err(|e| Error::model(format!("Tokenization failed: {}", e)))?;

        let probabilities = self.forward(&encodings)?;

        tracing::debug!(
            "Scored {} texts ({} tokens each after padding) in {}us",
            encodings.len(),
            encodings.first().map(Encoding::len).unwrap_or(0),
            start.elapsed().as_micros()
        );

        Prediction::new(self.labels.clone(), probabilities, input.is_single())
    }

    fn class_names(&self) -> &[String] {
        &self.labels
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Longest input the position embeddings can index
fn max_positions(config: &XlmRobertaConfig) -> usize {
    // Position ids start right after the padding index
    config
        .max_position_embeddings
        .saturating_sub(config.pad_token_id as usize + 1)
}

fn check_max_length(max_length: usize, config: &XlmRobertaConfig) -> Result<()> {
    let limit = max_positions(config);
    if !(MIN_MAX_LENGTH..=limit).contains(&max_length) {
        return Err(Error::config(format!(
            "max_length must be within {}..={} for this model, got {}",
            MIN_MAX_LENGTH, limit, max_length
        )));
    }
    Ok(())
}

/// Truncate to `max_length` and pad each batch to its longest member
fn configure_tokenizer(tokenizer: &mut Tokenizer, max_length: usize) -> Result<()> {
    let pad_id = tokenizer.token_to_id(PAD_TOKEN).unwrap_or(PAD_TOKEN_ID);

    tokenizer.with_padding(Some(PaddingParams {
        strategy: PaddingStrategy::BatchLongest,
        pad_id,
        pad_token: PAD_TOKEN.to_string(),
        ..Default::default()
    }));

    tokenizer
        .with_truncation(Some(TruncationParams {
            max_length,
            ..Default::default()
        }))
        .map_err(|e| Error::config(format!("Invalid truncation settings: {}", e)))?;

    Ok(())
}

fn batch_tensor(
    encodings: &[Encoding],
    field: fn(&Encoding) -> &[u32],
    device: &Device,
) -> Result<Tensor> {
    let rows = encodings
        .iter()
        .map(|encoding| Tensor::new(field(encoding), device))
        .collect::<candle_core::Result<Vec<_>>>()
        .map_err(|e| Error::model(format!("Failed to create input tensor: {}", e)))?;

    Tensor::stack(&rows, 0).map_err(|e| Error::model(format!("Failed to stack batch: {}", e)))
}

fn parse_json_config<T: DeserializeOwned>(config_path: &Path) -> Result<T> {
    let config_str = std::fs::read_to_string(config_path).map_err(|e| {
        Error::config(format!(
            "Failed to read config {}: {}",
            config_path.display(),
            e
        ))
    })?;

    serde_json::from_str(&config_str).map_err(|e| {
        Error::config(format!(
            "Failed to parse config {}: {}",
            config_path.display(),
            e
        ))
    })
}

/// Lightning checkpoints keep the HuggingFace module under `model.`
fn load_sequence_model(
    vb: &VarBuilder,
    num_labels: usize,
    config: &XlmRobertaConfig,
) -> Result<XLMRobertaForSequenceClassification> {
    let mut errors = Vec::new();

    for prefix in ["", "model"] {
        let vb_prefix = if prefix.is_empty() {
            vb.clone()
        } else {
            vb.pp(prefix)
        };

        match XLMRobertaForSequenceClassification::new(num_labels, config, vb_prefix) {
            Ok(model) => {
                let effective_prefix = if prefix.is_empty() { "<root>" } else { prefix };
                tracing::info!("Loaded XLM-RoBERTa weights from '{}'", effective_prefix);
                return Ok(model);
            }
            Err(e) => {
                errors.push(format!(
                    "{}: {}",
                    if prefix.is_empty() { "<root>" } else { prefix },
                    e
                ));
            }
        }
    }

    Err(Error::checkpoint(format!(
        "Failed to load XLM-RoBERTa sequence model with tried prefixes [{}]",
        errors.join(" | ")
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::DType;
    use std::str::FromStr;

    const TINY_CONFIG: &str = r#"{
        "architectures": ["XLMRobertaForSequenceClassification"],
        "attention_probs_dropout_prob": 0.1,
        "bos_token_id": 0,
        "eos_token_id": 2,
        "hidden_act": "gelu",
        "hidden_dropout_prob": 0.1,
        "hidden_size": 8,
        "initializer_range": 0.02,
        "intermediate_size": 16,
        "layer_norm_eps": 1e-05,
        "max_position_embeddings": 40,
        "model_type": "xlm-roberta",
        "num_attention_heads": 2,
        "num_hidden_layers": 1,
        "output_past": true,
        "pad_token_id": 1,
        "position_embedding_type": "absolute",
        "type_vocab_size": 1,
        "use_cache": true,
        "vocab_size": 16
    }"#;

    const TINY_TOKENIZER: &str = r#"{
        "version": "1.0",
        "truncation": null,
        "padding": null,
        "added_tokens": [],
        "normalizer": null,
        "pre_tokenizer": { "type": "Whitespace" },
        "post_processor": {
            "type": "RobertaProcessing",
            "sep": ["</s>", 2],
            "cls": ["<s>", 0],
            "trim_offsets": true,
            "add_prefix_space": true
        },
        "decoder": null,
        "model": {
            "type": "WordLevel",
            "vocab": {
                "<s>": 0, "<pad>": 1, "</s>": 2, "<unk>": 3,
                "you": 4, "are": 5, "great": 6, "terrible": 7,
                "hola": 8, "amigo": 9
            },
            "unk_token": "<unk>"
        }
    }"#;

    fn tiny_model(max_length: usize) -> XlmRobertaToxicity {
        let config: XlmRobertaConfig = serde_json::from_str(TINY_CONFIG).unwrap();
        let tokenizer = Tokenizer::from_str(TINY_TOKENIZER).unwrap();
        let labels = moderator_core::default_labels();

        let vb = VarBuilder::zeros(DType::F32, &Device::Cpu);
        let model = XLMRobertaForSequenceClassification::new(labels.len(), &config, vb).unwrap();

        XlmRobertaToxicity::from_parts("tiny", tokenizer, model, Device::Cpu, labels, max_length)
            .unwrap()
    }

    #[tokio::test]
    async fn test_single_input_scores_every_class() {
        let model = tiny_model(16);

        let prediction = model.predict(&TextInput::from("you are great")).await.unwrap();

        assert!(prediction.single);
        assert_eq!(prediction.labels, model.class_names());
        assert_eq!(prediction.probabilities.len(), 1);
        for score in &prediction.probabilities[0] {
            assert!((0.0..=1.0).contains(score));
            // Zero weights give zero logits
            assert!((score - 0.5).abs() < 1e-4, "unexpected score {}", score);
        }
    }

    #[tokio::test]
    async fn test_batch_of_uneven_lengths_is_padded() {
        let model = tiny_model(16);
        let input = TextInput::Batch(vec![
            "hola".to_string(),
            "you are terrible amigo".to_string(),
            String::new(),
        ]);

        let prediction = model.predict(&input).await.unwrap();

        assert!(!prediction.single);
        assert_eq!(prediction.probabilities.len(), 3);
        assert!(prediction
            .probabilities
            .iter()
            .all(|row| row.len() == model.class_names().len()));
    }

    #[tokio::test]
    async fn test_long_input_is_truncated() {
        let model = tiny_model(6);
        let long_text = vec!["great"; 200].join(" ");

        let prediction = model.predict(&TextInput::from(long_text)).await.unwrap();
        assert_eq!(prediction.probabilities.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_batch_is_rejected() {
        let model = tiny_model(16);

        let err = model.predict(&TextInput::Batch(vec![])).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_tokenizer_padding_and_truncation() {
        let mut tokenizer = Tokenizer::from_str(TINY_TOKENIZER).unwrap();
        configure_tokenizer(&mut tokenizer, 4).unwrap();

        let encodings = tokenizer
            .encode_batch(vec!["hola", "you are great amigo"], true)
            .unwrap();

        assert_eq!(encodings[0].get_ids().len(), encodings[1].get_ids().len());
        assert_eq!(encodings[1].get_ids().len(), 4);
        assert_eq!(encodings[0].get_attention_mask(), &[1, 1, 1, 0]);
        assert_eq!(encodings[0].get_ids()[3], PAD_TOKEN_ID);
    }

    #[test]
    fn test_weights_missing_under_both_prefixes() {
        let config: XlmRobertaConfig = serde_json::from_str(TINY_CONFIG).unwrap();
        let vb = VarBuilder::from_tensors(Default::default(), DType::F32, &Device::Cpu);

        let err = match load_sequence_model(&vb, 7, &config) {
            Ok(_) => panic!("expected missing weights to fail"),
            Err(e) => e,
        };
        assert!(err.to_string().contains("<root>"));
        assert!(err.to_string().contains("model"));
    }

    fn tiny_parts() -> (Tokenizer, XLMRobertaForSequenceClassification) {
        let config: XlmRobertaConfig = serde_json::from_str(TINY_CONFIG).unwrap();
        let tokenizer = Tokenizer::from_str(TINY_TOKENIZER).unwrap();
        let vb = VarBuilder::zeros(DType::F32, &Device::Cpu);
        let model = XLMRobertaForSequenceClassification::new(9, &config, vb).unwrap();
        (tokenizer, model)
    }

    #[test]
    fn test_max_length_shorter_than_special_tokens() {
        let (tokenizer, model) = tiny_parts();
        let labels = moderator_core::default_labels();

        let err = match XlmRobertaToxicity::from_parts("tiny", tokenizer, model, Device::Cpu, labels, 1)
        {
            Ok(_) => panic!("expected max_length 1 to be rejected"),
            Err(e) => e,
        };
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_max_length_within_position_embeddings() {
        let config: XlmRobertaConfig = serde_json::from_str(TINY_CONFIG).unwrap();

        // 40 positions, ids start after pad id 1
        assert_eq!(max_positions(&config), 38);
        assert!(check_max_length(3, &config).is_ok());
        assert!(check_max_length(38, &config).is_ok());
        assert!(matches!(check_max_length(2, &config), Err(Error::Config(_))));
        assert!(matches!(check_max_length(39, &config), Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_extra_head_outputs_are_dropped() {
        let (tokenizer, model) = tiny_parts();
        let labels = moderator_core::default_labels();

        let model =
            XlmRobertaToxicity::from_parts("tiny", tokenizer, model, Device::Cpu, labels, 16).unwrap();
        let prediction = model
            .predict(&TextInput::Batch(vec!["hola".to_string(), "you are great".to_string()]))
            .await
            .unwrap();

        assert!(prediction.probabilities.iter().all(|row| row.len() == 7));
    }
}
