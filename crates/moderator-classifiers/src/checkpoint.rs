//! Checkpoint resolution, caching, and weight loading

use crate::model_config::{BaseModelSource, CheckpointFormat, CheckpointSource, ModelConfig};
use candle_core::pickle::{Object, Stack};
use candle_core::{DType, Device};
use candle_nn::VarBuilder;
use futures_util::StreamExt;
use hf_hub::{api::sync::Api, Repo, RepoType};
use moderator_core::{Error, Result};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// Lightning checkpoints nest the weights under this key
const STATE_DICT_KEY: &str = "state_dict";

/// Where Lightning training configs keep the class list
const CLASS_NAMES_PATH: &[&str] = &["config", "dataset", "args", "classes"];

/// Output projection of the classification head, with and without the Lightning wrapper prefix
const HEAD_WEIGHT_NAMES: &[&str] = &[
    "classifier.out_proj.weight",
    "model.classifier.out_proj.weight",
];

/// Base architecture files needed next to the weights
#[derive(Debug, Clone)]
pub struct BaseModelFiles {
    /// HuggingFace `config.json`
    pub config: PathBuf,

    /// HuggingFace `tokenizer.json`
    pub tokenizer: PathBuf,
}

/// Resolve the checkpoint to a local file, downloading it if needed
pub async fn resolve_checkpoint(config: &ModelConfig) -> Result<PathBuf> {
    match &config.checkpoint {
        CheckpointSource::Local { path } => {
            if !path.exists() {
                return Err(Error::checkpoint(format!(
                    "Checkpoint file not found: {}",
                    path.display()
                )));
            }
            Ok(path.clone())
        }
        CheckpointSource::Url { url } => download_cached(url, &config.resolved_cache_dir()).await,
        CheckpointSource::HuggingFace {
            repo,
            revision,
            filename,
        } => {
            tracing::info!("Fetching checkpoint {} from HuggingFace: {} @ {}", filename, repo, revision);
            hub_repo(repo, revision)?.get(filename).map_err(|e| {
                Error::checkpoint(format!("Failed to download {} from {}: {}", filename, repo, e))
            })
        }
    }
}

/// Resolve `config.json` and `tokenizer.json` of the base architecture
pub fn resolve_base_files(source: &BaseModelSource) -> Result<BaseModelFiles> {
    match source {
        BaseModelSource::Local { path } => {
            let files = BaseModelFiles {
                config: path.join("config.json"),
                tokenizer: path.join("tokenizer.json"),
            };
            for file in [&files.config, &files.tokenizer] {
                if !file.exists() {
                    return Err(Error::config(format!(
                        "Base model file not found: {}",
                        file.display()
                    )));
                }
            }
            Ok(files)
        }
        BaseModelSource::HuggingFace { repo, revision } => {
            tracing::info!("Fetching base model files from HuggingFace: {} @ {}", repo, revision);
            let api_repo = hub_repo(repo, revision)?;

            let fetch = |filename: &str| {
                tracing::debug!("Downloading {}", filename);
                api_repo.get(filename).map_err(|e| {
                    Error::config(format!("Failed to download {} from {}: {}", filename, repo, e))
                })
            };

            Ok(BaseModelFiles {
                config: fetch("config.json")?,
                tokenizer: fetch("tokenizer.json")?,
            })
        }
    }
}

fn hub_repo(repo: &str, revision: &str) -> Result<hf_hub::api::sync::ApiRepo> {
    let api = Api::new()
        .map_err(|e| Error::config(format!("Failed to initialize HuggingFace API: {}", e)))?;

    Ok(api.repo(Repo::with_revision(
        repo.to_string(),
        RepoType::Model,
        revision.to_string(),
    )))
}

/// File name a URL is cached under
pub fn cache_file_name(url: &str) -> Result<String> {
    let name = url
        .split(['?', '#'])
        .next()
        .and_then(|path| path.rsplit('/').next())
        .filter(|name| !name.is_empty())
        .ok_or_else(|| Error::checkpoint(format!("Cannot derive a file name from URL: {}", url)))?;

    Ok(name.to_string())
}

/// Download `url` into `cache_dir` unless an earlier download is already there
pub async fn download_cached(url: &str, cache_dir: &Path) -> Result<PathBuf> {
    let target = cache_dir.join(cache_file_name(url)?);
    if target.exists() {
        tracing::info!("Using cached checkpoint: {}", target.display());
        return Ok(target);
    }

    tokio::fs::create_dir_all(cache_dir).await?;
    tracing::info!("Downloading checkpoint from {}", url);

    let response = reqwest::get(url)
        .await
        .map_err(|e| Error::checkpoint(format!("Failed to request {}: {}", url, e)))?;

    if !response.status().is_success() {
        return Err(Error::checkpoint(format!(
            "Checkpoint download from {} failed with status {}",
            url,
            response.status()
        )));
    }

    // Partial downloads never shadow the final name
    let partial = target.with_extension("part");
    let mut file = tokio::fs::File::create(&partial).await?;
    let mut stream = response.bytes_stream();
    let mut written: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk
            .map_err(|e| Error::checkpoint(format!("Checkpoint download interrupted: {}", e)))?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }

    file.flush().await?;
    drop(file);
    tokio::fs::rename(&partial, &target).await?;

    tracing::info!(
        "Checkpoint downloaded to {} ({} bytes)",
        target.display(),
        written
    );
    Ok(target)
}

/// Parse a device string (cpu, cuda, cuda:N, metal, mps)
pub fn parse_device(device: &str) -> Result<Device> {
    let device = device.trim().to_lowercase();

    if let Some(index) = device.strip_prefix("cuda:") {
        let index: usize = index
            .parse()
            .map_err(|_| Error::config(format!("Invalid CUDA device index: {}", index)))?;
        return Device::new_cuda(index)
            .map_err(|e| Error::model(format!("Failed to initialize CUDA: {}", e)));
    }

    match device.as_str() {
        "cpu" | "" => Ok(Device::Cpu),
        "cuda" => {
            Device::new_cuda(0).map_err(|e| Error::model(format!("Failed to initialize CUDA: {}", e)))
        }
        "metal" | "mps" => {
            Device::new_metal(0).map_err(|e| Error::model(format!("Failed to initialize Metal: {}", e)))
        }
        other => Err(Error::config(format!("Unsupported device: {}", other))),
    }
}

/// Pickle key holding the weights, if the file nests them
fn pth_key(path: &Path) -> Option<&'static str> {
    match candle_core::pickle::read_pth_tensor_info(path, false, Some(STATE_DICT_KEY)) {
        Ok(infos) if !infos.is_empty() => Some(STATE_DICT_KEY),
        _ => None,
    }
}

/// Output width of the checkpoint's classification head
pub fn checkpoint_num_labels(path: &Path, format: CheckpointFormat) -> Result<usize> {
    let rows = match format {
        CheckpointFormat::Pytorch => {
            let infos = candle_core::pickle::read_pth_tensor_info(path, false, pth_key(path))
                .map_err(|e| {
                    Error::checkpoint(format!(
                        "Failed to read tensor index of {}: {}",
                        path.display(),
                        e
                    ))
                })?;

            HEAD_WEIGHT_NAMES.iter().find_map(|name| {
                infos
                    .iter()
                    .find(|info| info.name == *name)
                    .and_then(|info| info.layout.shape().dims().first().copied())
            })
        }
        CheckpointFormat::Safetensors => {
            let tensors = unsafe { candle_core::safetensors::MmapedSafetensors::new(path) }
                .map_err(|e| {
                    Error::checkpoint(format!("Failed to map {}: {}", path.display(), e))
                })?;

            HEAD_WEIGHT_NAMES.iter().find_map(|name| {
                tensors
                    .get(name)
                    .ok()
                    .and_then(|view| view.shape().first().copied())
            })
        }
    };

    rows.ok_or_else(|| {
        Error::checkpoint(format!(
            "No classification head found in {} (tried {})",
            path.display(),
            HEAD_WEIGHT_NAMES.join(", ")
        ))
    })
}

/// Raw class names stored in the checkpoint's training config, in head order
///
/// Returns `None` for SafeTensors files and for pickles without
/// `config.dataset.args.classes`.
pub fn checkpoint_class_names(path: &Path, format: CheckpointFormat) -> Result<Option<Vec<String>>> {
    if format != CheckpointFormat::Pytorch {
        return Ok(None);
    }

    let object = read_pickle_root(path)?;
    let classes = CLASS_NAMES_PATH
        .iter()
        .try_fold(&object, |node, key| dict_get(node, key))
        .and_then(string_list);

    Ok(classes)
}

/// Unpickle `data.pkl` of a zip-format PyTorch checkpoint
fn read_pickle_root(path: &Path) -> Result<Object> {
    let file = std::fs::File::open(path)?;
    let mut archive =
        zip::ZipArchive::new(std::io::BufReader::new(file)).map_err(|e| read_error(path, e))?;

    let pickle_name = archive
        .file_names()
        .find(|name| name.ends_with("data.pkl"))
        .map(str::to_string)
        .ok_or_else(|| Error::checkpoint(format!("No data.pkl in {}", path.display())))?;

    let entry = archive.by_name(&pickle_name).map_err(|e| read_error(path, e))?;
    let mut reader = std::io::BufReader::new(entry);

    let mut stack = Stack::empty();
    stack.read_loop(&mut reader).map_err(|e| read_error(path, e))?;
    stack.finalize().map_err(|e| read_error(path, e))
}

fn read_error(path: &Path, e: impl std::fmt::Display) -> Error {
    Error::checkpoint(format!("Failed to read {}: {}", path.display(), e))
}

fn dict_get<'a>(object: &'a Object, key: &str) -> Option<&'a Object> {
    match object {
        Object::Dict(entries) => entries.iter().find_map(|(k, v)| match k {
            Object::Unicode(name) if name == key => Some(v),
            _ => None,
        }),
        _ => None,
    }
}

fn string_list(object: &Object) -> Option<Vec<String>> {
    match object {
        Object::List(items) | Object::Tuple(items) => items
            .iter()
            .map(|item| match item {
                Object::Unicode(name) => Some(name.clone()),
                _ => None,
            })
            .collect(),
        _ => None,
    }
}

/// Open the checkpoint as a VarBuilder on `device`
pub fn load_var_builder(
    path: &Path,
    format: CheckpointFormat,
    device: &Device,
) -> Result<VarBuilder<'static>> {
    match format {
        CheckpointFormat::Pytorch => {
            let tensors = candle_core::pickle::PthTensors::new(path, pth_key(path)).map_err(|e| {
                Error::checkpoint(format!("Failed to load PyTorch weights: {}", e))
            })?;
            Ok(VarBuilder::from_backend(
                Box::new(tensors),
                DType::F32,
                device.clone(),
            ))
        }
        CheckpointFormat::Safetensors => {
            let vb = unsafe {
                VarBuilder::from_mmaped_safetensors(&[path.to_path_buf()], DType::F32, device)
                    .map_err(|e| Error::checkpoint(format!("Failed to load SafeTensors: {}", e)))?
            };
            Ok(vb)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Tensor;
    use std::collections::HashMap;

    #[test]
    fn test_cache_file_name() {
        assert_eq!(
            cache_file_name(crate::model_config::DEFAULT_CHECKPOINT_URL).unwrap(),
            "multilingual_debiased-0b549669.ckpt"
        );
        assert_eq!(
            cache_file_name("https://example.com/a/model.ckpt?download=1").unwrap(),
            "model.ckpt"
        );
        assert!(cache_file_name("https://example.com/models/").is_err());
    }

    #[tokio::test]
    async fn test_cached_download_is_reused() {
        let dir = tempfile::tempdir().unwrap();
        let cached = dir.path().join("weights.ckpt");
        std::fs::write(&cached, b"cached").unwrap();

        // Unroutable host: succeeding proves no request was made
        let path = download_cached("http://127.0.0.1:1/weights.ckpt", dir.path())
            .await
            .unwrap();
        assert_eq!(path, cached);
    }

    #[tokio::test]
    async fn test_missing_local_checkpoint() {
        let config = ModelConfig {
            checkpoint: CheckpointSource::Local {
                path: PathBuf::from("/nonexistent/model.ckpt"),
            },
            ..Default::default()
        };

        let err = resolve_checkpoint(&config).await.unwrap_err();
        assert!(matches!(err, Error::Checkpoint(_)));
    }

    #[test]
    fn test_missing_local_base_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("config.json"), "{}").unwrap();

        let err = resolve_base_files(&BaseModelSource::Local {
            path: dir.path().to_path_buf(),
        })
        .unwrap_err();
        assert!(err.to_string().contains("tokenizer.json"));
    }

    #[test]
    fn test_parse_device() {
        assert!(matches!(parse_device("cpu").unwrap(), Device::Cpu));
        assert!(matches!(parse_device(" CPU ").unwrap(), Device::Cpu));
        assert!(matches!(parse_device("tpu"), Err(Error::Config(_))));
        assert!(matches!(parse_device("cuda:x"), Err(Error::Config(_))));
    }

    #[test]
    fn test_num_labels_from_safetensors_head() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.safetensors");

        let mut tensors = HashMap::new();
        tensors.insert(
            "model.classifier.out_proj.weight".to_string(),
            Tensor::zeros((7, 16), DType::F32, &Device::Cpu).unwrap(),
        );
        candle_core::safetensors::save(&tensors, &path).unwrap();

        assert_eq!(
            checkpoint_num_labels(&path, CheckpointFormat::Safetensors).unwrap(),
            7
        );
    }

    #[test]
    fn test_num_labels_without_head() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.safetensors");

        let mut tensors = HashMap::new();
        tensors.insert(
            "roberta.pooler.dense.weight".to_string(),
            Tensor::zeros((4, 4), DType::F32, &Device::Cpu).unwrap(),
        );
        candle_core::safetensors::save(&tensors, &path).unwrap();

        let err = checkpoint_num_labels(&path, CheckpointFormat::Safetensors).unwrap_err();
        assert!(matches!(err, Error::Checkpoint(_)));
    }

    fn tiny_checkpoint() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/tiny-xlmr/model.ckpt")
    }

    #[test]
    fn test_pickle_weights_nested_under_state_dict() {
        assert_eq!(pth_key(&tiny_checkpoint()), Some(STATE_DICT_KEY));
    }

    #[test]
    fn test_num_labels_from_pickle_head() {
        // Two extra outputs beyond the seven named classes
        assert_eq!(
            checkpoint_num_labels(&tiny_checkpoint(), CheckpointFormat::Pytorch).unwrap(),
            9
        );
    }

    #[test]
    fn test_class_names_from_pickle_config() {
        let classes = checkpoint_class_names(&tiny_checkpoint(), CheckpointFormat::Pytorch)
            .unwrap()
            .unwrap();

        assert_eq!(
            classes,
            [
                "toxic",
                "severe_toxic",
                "obscene",
                "threat",
                "insult",
                "identity_hate",
                "sexual_explicit"
            ]
        );
    }

    #[test]
    fn test_class_names_absent_for_safetensors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.safetensors");

        let mut tensors = HashMap::new();
        tensors.insert(
            "classifier.out_proj.weight".to_string(),
            Tensor::zeros((7, 16), DType::F32, &Device::Cpu).unwrap(),
        );
        candle_core::safetensors::save(&tensors, &path).unwrap();

        assert!(checkpoint_class_names(&path, CheckpointFormat::Safetensors)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_class_names_from_non_zip_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.ckpt");
        std::fs::write(&path, b"not a zip archive").unwrap();

        let err = checkpoint_class_names(&path, CheckpointFormat::Pytorch).unwrap_err();
        assert!(matches!(err, Error::Checkpoint(_)));
    }

    #[test]
    fn test_pickle_var_builder_under_model_prefix() {
        let vb = load_var_builder(&tiny_checkpoint(), CheckpointFormat::Pytorch, &Device::Cpu)
            .unwrap();

        assert!(!vb.contains_tensor("classifier.out_proj.bias"));

        let bias = vb
            .pp("model")
            .get(9, "classifier.out_proj.bias")
            .unwrap()
            .to_vec1::<f32>()
            .unwrap();
        assert_eq!(bias, [-3.0, -2.0, -1.0, 0.0, 1.0, 2.0, 3.0, 5.0, 5.0]);
    }
}
