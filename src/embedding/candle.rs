use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use hf_hub::api::sync::Api;
use hf_hub::{Repo, RepoType};
use tokenizers::{Tokenizer, TruncationParams};
use tracing::{debug, info};

use super::{Embedder, Embedding, EmbeddingError};

const CONFIG_FILE: &str = "config.json";
const TOKENIZER_FILE: &str = "tokenizer.json";
const WEIGHTS_FILE: &str = "model.safetensors";

fn load_failed(what: &str, err: impl Display) -> EmbeddingError {
    EmbeddingError::ModelLoadFailed(format!("{what}: {err}"))
}

fn inference_failed(err: impl Display) -> EmbeddingError {
    EmbeddingError::InferenceFailed(err.to_string())
}

/// Where the three model artifacts live on disk.
struct ModelFiles {
    config: PathBuf,
    tokenizer: PathBuf,
    weights: PathBuf,
}

impl ModelFiles {
    fn in_dir(dir: &Path) -> Self {
        Self {
            config: dir.join(CONFIG_FILE),
            tokenizer: dir.join(TOKENIZER_FILE),
            weights: dir.join(WEIGHTS_FILE),
        }
    }

    fn from_hub(model_id: &str) -> Result<Self, EmbeddingError> {
        let api = Api::new().map_err(|e| load_failed("hub api", e))?;
        let repo = api.repo(Repo::new(model_id.to_string(), RepoType::Model));
        let fetch = |name: &str| repo.get(name).map_err(|e| load_failed(name, e));

        Ok(Self {
            config: fetch(CONFIG_FILE)?,
            tokenizer: fetch(TOKENIZER_FILE)?,
            weights: fetch(WEIGHTS_FILE)?,
        })
    }
}

/// Token rows padded to the longest row, flattened row-major.
#[derive(Debug, PartialEq, Eq)]
struct PaddedBatch {
    input_ids: Vec<u32>,
    type_ids: Vec<u32>,
    attention: Vec<u32>,
    rows: usize,
    width: usize,
}

fn pad_rows(rows: &[(&[u32], &[u32], &[u32])]) -> PaddedBatch {
    let width = rows.iter().map(|(ids, _, _)| ids.len()).max().unwrap_or(0);
    let capacity = rows.len() * width;
    let mut batch = PaddedBatch {
        input_ids: Vec::with_capacity(capacity),
        type_ids: Vec::with_capacity(capacity),
        attention: Vec::with_capacity(capacity),
        rows: rows.len(),
        width,
    };

    for (ids, types, mask) in rows {
        let pad = width - ids.len();
        for (out, row) in [
            (&mut batch.input_ids, ids),
            (&mut batch.type_ids, types),
            (&mut batch.attention, mask),
        ] {
            out.extend_from_slice(row);
            out.extend(std::iter::repeat_n(0u32, pad));
        }
    }
    batch
}

/// Average of the token vectors whose mask is set, one row per input.
fn masked_mean(hidden: &Tensor, mask: &Tensor) -> candle_core::Result<Tensor> {
    let mask = mask.to_dtype(DType::F32)?;
    let summed = hidden.broadcast_mul(&mask.unsqueeze(2)?)?.sum(1)?;
    let counts = mask.sum(1)?.unsqueeze(1)?;
    summed.broadcast_div(&counts)
}

fn l2_normalize(v: &mut [f32]) {
    let length: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if length > 0.0 {
        v.iter_mut().for_each(|x| *x /= length);
    }
}

/// Run CPU-bound embedding work on the blocking pool.
async fn off_runtime<T, F>(job: F) -> Result<T, EmbeddingError>
where
    F: FnOnce() -> Result<T, EmbeddingError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(job)
        .await
        .map_err(|err| inference_failed(format!("embedding task failed: {err}")))?
}

struct BertEncoder {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
}

impl BertEncoder {
    fn open(files: &ModelFiles) -> Result<Self, EmbeddingError> {
        let device = Device::Cpu;

        let raw_config =
            std::fs::read_to_string(&files.config).map_err(|e| load_failed("read config", e))?;
        let config: BertConfig =
            serde_json::from_str(&raw_config).map_err(|e| load_failed("parse config", e))?;

        let mut tokenizer =
            Tokenizer::from_file(&files.tokenizer).map_err(|e| load_failed("tokenizer", e))?;
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: config.max_position_embeddings,
                ..Default::default()
            }))
            .map_err(|e| load_failed("truncation config", e))?;

        // SAFETY: the weights file is mapped read-only and outlives the model
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[&files.weights], DType::F32, &device)
                .map_err(|e| load_failed("weights", e))?
        };
        let model = BertModel::load(vb, &config).map_err(|e| load_failed("model", e))?;

        Ok(Self {
            model,
            tokenizer,
            device,
        })
    }

    fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| inference_failed(format!("tokenization: {e}")))?;
        let rows: Vec<_> = encodings
            .iter()
            .map(|enc| (enc.get_ids(), enc.get_type_ids(), enc.get_attention_mask()))
            .collect();

        let pooled = self.forward(pad_rows(&rows)).map_err(inference_failed)?;
        debug!(texts = texts.len(), "encoded text batch");
        Ok(pooled)
    }

    fn forward(&self, batch: PaddedBatch) -> candle_core::Result<Vec<Vec<f32>>> {
        let shape = (batch.rows, batch.width);
        let input_ids = Tensor::from_vec(batch.input_ids, shape, &self.device)?;
        let type_ids = Tensor::from_vec(batch.type_ids, shape, &self.device)?;
        let mask = Tensor::from_vec(batch.attention, shape, &self.device)?;

        let hidden = self
            .model
            .forward(&input_ids, &type_ids, Some(&mask))?
            .to_dtype(DType::F32)?;
        let pooled = masked_mean(&hidden, &mask)?;

        (0..batch.rows)
            .map(|row| {
                let mut values: Vec<f32> = pooled.get(row)?.to_vec1()?;
                l2_normalize(&mut values);
                Ok(values)
            })
            .collect()
    }
}

/// BERT-family sentence embedder (mean pooled, L2 normalised) running on the CPU.
///
/// Inference runs on the blocking pool, so `embed` never stalls a runtime worker.
#[derive(Clone)]
pub struct MiniLmEmbedder {
    encoder: Arc<BertEncoder>,
}

impl MiniLmEmbedder {
    /// `model_id` is either a local directory holding `config.json`,
    /// `tokenizer.json` and `model.safetensors`, or a Hugging Face hub id
    /// whose files are downloaded (or reused from the hub cache).
    pub fn load(model_id: &str) -> Result<Self, EmbeddingError> {
        let local = Path::new(model_id);
        let files = if local.is_dir() {
            info!(path = %local.display(), "loading sentence embedding model from disk");
            ModelFiles::in_dir(local)
        } else {
            info!(model = model_id, "fetching sentence embedding model");
            ModelFiles::from_hub(model_id)?
        };

        let encoder = BertEncoder::open(&files)?;
        info!(model = model_id, "sentence embedding model loaded");
        Ok(Self {
            encoder: Arc::new(encoder),
        })
    }

    async fn encode(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let encoder = Arc::clone(&self.encoder);
        off_runtime(move || encoder.encode(&texts)).await
    }
}

#[async_trait]
impl Embedder for MiniLmEmbedder {
    async fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        self.encode(vec![text.to_string()])
            .await?
            .into_iter()
            .next()
            .map(Embedding::new)
            .ok_or_else(|| inference_failed("empty result"))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let owned = texts.iter().map(|text| text.to_string()).collect();
        let vectors = self.encode(owned).await?;
        Ok(vectors.into_iter().map(Embedding::new).collect())
    }
}
