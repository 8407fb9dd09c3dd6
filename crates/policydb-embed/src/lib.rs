//! Local query encoder: MiniLM-class BERT via candle, mean pooling,
//! L2-normalized 384-dim output. The corpus was embedded with the same model
//! at index-build time; query vectors must come from the same family or the
//! distances are meaningless.

use anyhow::{anyhow, Result};
use std::path::{Path, PathBuf};

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig, DTYPE};
use tokenizers::Tokenizer;
use tracing::info;

use policydb_core::error::{Error as CoreError, Result as CoreResult};
use policydb_core::traits::EmbeddingProvider;

pub const EMBEDDING_DIM: usize = 384;
const MAX_LEN: usize = 256;

pub struct LocalEncoder {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    provider_id: String,
}

impl LocalEncoder {
    pub fn new() -> Result<Self> {
        let device = Device::cuda_if_available(0).unwrap_or(Device::Cpu);
        let model_dir = resolve_model_dir()?;
        info!(dir = %model_dir.display(), "loading MiniLM encoder");

        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer from {}: {}", tokenizer_path.display(), e))?;

        let config_path = model_dir.join("config.json");
        let config: BertConfig = serde_json::from_str(&std::fs::read_to_string(&config_path)?)?;

        let vb = load_weights(&model_dir, &device)?;
        let model = BertModel::load(vb, &config)?;
        Ok(Self { model, tokenizer, device, provider_id: "local:minilm-l6-v2:d384".to_string() })
    }

    fn encode(&self, text: &str) -> Result<Vec<f32>> {
        let enc = self.tokenizer.encode(text, true).map_err(|e| anyhow!("Tokenization failed: {e}"))?;
        let mut ids = enc.get_ids().to_vec();
        if ids.len() > MAX_LEN {
            ids.truncate(MAX_LEN);
        }
        let len = ids.len();
        let input_ids = Tensor::from_iter(ids.into_iter().map(i64::from), &self.device)?.reshape((1, len))?;
        let token_type_ids = Tensor::zeros((1, len), DType::I64, &self.device)?;

        // Single unpadded sequence: every position is attended, so mean
        // pooling over dim 1 needs no mask arithmetic.
        let hidden = self.model.forward(&input_ids, &token_type_ids, None)?;
        let mut emb = hidden.mean(1)?;
        let norm = emb.sqr()?.sum_keepdim(1)?.sqrt()?;
        emb = emb.broadcast_div(&norm)?;

        let out: Vec<f32> = emb.to_dtype(DTYPE)?.squeeze(0)?.to_vec1()?;
        if out.len() != EMBEDDING_DIM {
            return Err(anyhow!("unexpected embedding dim {} (want {})", out.len(), EMBEDDING_DIM));
        }
        Ok(out)
    }
}

impl EmbeddingProvider for LocalEncoder {
    fn provider_id(&self) -> &str {
        &self.provider_id
    }
    fn dim(&self) -> usize {
        EMBEDDING_DIM
    }
    fn embed_query(&self, text: &str) -> CoreResult<Vec<f32>> {
        self.encode(text).map_err(|e| CoreError::Embedding(e.to_string()))
    }
}

fn load_weights(model_dir: &Path, device: &Device) -> Result<VarBuilder<'static>> {
    let safetensors = model_dir.join("model.safetensors");
    if safetensors.exists() {
        // Safety: the file is mmapped read-only and outlives the builder.
        return Ok(unsafe { VarBuilder::from_mmaped_safetensors(&[safetensors], DTYPE, device)? });
    }
    let weights_path = model_dir.join("pytorch_model.bin");
    let weights = candle_core::pickle::read_all(&weights_path)?;
    let weights_map: std::collections::HashMap<String, Tensor> = weights.into_iter().collect();
    Ok(VarBuilder::from_tensors(weights_map, DTYPE, device))
}

/// Deterministic stand-in for tests and offline development: hashes tokens
/// into a fixed-dim spike vector, L2-normalized. Gated by
/// `APP_USE_FAKE_EMBEDDINGS`.
struct FakeEncoder {
    dim: usize,
}

impl EmbeddingProvider for FakeEncoder {
    fn provider_id(&self) -> &str {
        "fake:xxhash:d384"
    }
    fn dim(&self) -> usize {
        self.dim
    }
    fn embed_query(&self, text: &str) -> CoreResult<Vec<f32>> {
        use std::hash::{Hash, Hasher};
        use twox_hash::XxHash64;
        let mut v = vec![0f32; self.dim];
        for (i, token) in text.split_whitespace().enumerate() {
            let mut hasher = XxHash64::with_seed(0);
            token.hash(&mut hasher);
            let h = hasher.finish();
            let idx = (h as usize) % self.dim;
            let val = (((h >> 32) as u32) as f32) / (u32::MAX as f32);
            v[idx] += val + (i as f32 % 3.0) * 0.01;
        }
        let norm = (v.iter().map(|x| x * x).sum::<f32>()).sqrt().max(1e-6);
        for x in &mut v {
            *x /= norm;
        }
        Ok(v)
    }
}

pub fn get_default_provider() -> Result<Box<dyn EmbeddingProvider>> {
    let use_fake = std::env::var("APP_USE_FAKE_EMBEDDINGS")
        .ok()
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    if use_fake {
        info!("using fake embeddings");
        return Ok(Box::new(FakeEncoder { dim: EMBEDDING_DIM }));
    }
    Ok(Box::new(LocalEncoder::new()?))
}

fn resolve_model_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("APP_MODEL_DIR") {
        let p = PathBuf::from(&dir);
        if p.exists() {
            return Ok(p);
        }
    }
    let root = Path::new("../models/all-MiniLM-L6-v2");
    if root.exists() {
        return Ok(root.to_path_buf());
    }
    let legacy = Path::new("models/all-MiniLM-L6-v2");
    if legacy.exists() {
        return Ok(legacy.to_path_buf());
    }
    Err(anyhow!("Could not locate MiniLM model directory (set APP_MODEL_DIR)"))
}
