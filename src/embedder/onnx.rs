/// ONNX Runtime embedder using the `ort` crate.
///
/// Loads a BERT-style ONNX export, runs batched inference, pools the token
/// states (mean over the attention mask, or the CLS token), and optionally
/// L2-normalizes the result. Everything model-specific comes from the
/// injected `ModelConfig`.
use std::path::Path;
use std::sync::Mutex;

use ort::session::Session;
use ort::value::Tensor;
use tracing::{debug, info};

use super::tokenizer::{BertTokenizer, TokenizerOutput};
use super::{Embedder, EmbedderError, l2_normalize};
use crate::config::{ModelConfig, Pooling};

/// ONNX-backed embedder implementing the `Embedder` trait.
pub struct OnnxEmbedder {
    session: Mutex<Session>,
    tokenizer: BertTokenizer,
    config: ModelConfig,
}

impl OnnxEmbedder {
    /// Create a new `OnnxEmbedder` by loading a model from the given directory.
    ///
    /// Expects `model.onnx` and `tokenizer.json` in `model_dir`.
    pub fn new(model_dir: &Path, config: &ModelConfig) -> Result<Self, EmbedderError> {
        let model_path = model_dir.join("model.onnx");

        if !model_path.exists() {
            return Err(EmbedderError::ModelLoadFailed(format!(
                "model.onnx not found in {}",
                model_dir.display()
            )));
        }

        info!("Initializing ONNX Runtime for {}...", config.name);

        let session = Session::builder()
            .map_err(|e| EmbedderError::ModelLoadFailed(format!("session builder error: {e}")))?
            .with_intra_threads(config.intra_threads)
            .map_err(|e| EmbedderError::ModelLoadFailed(format!("thread config error: {e}")))?
            .commit_from_file(&model_path)
            .map_err(|e| EmbedderError::ModelLoadFailed(format!("model load error: {e}")))?;

        info!("ONNX model loaded successfully");

        let tokenizer = BertTokenizer::from_model_dir(model_dir, config.max_length)
            .map_err(|e| EmbedderError::ModelLoadFailed(e.to_string()))?;

        info!("Tokenizer loaded (vocab size: {})", tokenizer.vocab_size());

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            config: config.clone(),
        })
    }

    /// Run one padded batch through the model and pool each row.
    fn run_batch(&self, batch: &[TokenizerOutput]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        let batch_size = batch.len();
        let seq_len = batch.first().map(|t| t.input_ids.len()).unwrap_or(0);
        if batch_size == 0 || seq_len == 0 {
            return Ok(vec![vec![0.0; self.config.dimensions]; batch_size]);
        }

        let mut input_ids = Vec::with_capacity(batch_size * seq_len);
        let mut attention_mask = Vec::with_capacity(batch_size * seq_len);
        for tokens in batch {
            if tokens.input_ids.len() != seq_len {
                return Err(EmbedderError::InferenceFailed(
                    "batch rows are not padded to one length".to_string(),
                ));
            }
            input_ids.extend_from_slice(&tokens.input_ids);
            attention_mask.extend_from_slice(&tokens.attention_mask);
        }

        // (shape, data) tuple form avoids ndarray version coupling with ort
        let input_ids_val = Tensor::from_array(([batch_size, seq_len], input_ids))
            .map_err(|e| EmbedderError::InferenceFailed(format!("input_ids error: {e}")))?;
        let attention_mask_val =
            Tensor::from_array(([batch_size, seq_len], attention_mask.clone())).map_err(|e| {
                EmbedderError::InferenceFailed(format!("attention_mask error: {e}"))
            })?;
        let token_type_ids_val =
            Tensor::from_array(([batch_size, seq_len], vec![0i64; batch_size * seq_len]))
                .map_err(|e| {
                    EmbedderError::InferenceFailed(format!("token_type_ids error: {e}"))
                })?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| EmbedderError::InferenceFailed(format!("lock poisoned: {e}")))?;
        let outputs = session
            .run(ort::inputs![
                "input_ids" => input_ids_val,
                "attention_mask" => attention_mask_val,
                "token_type_ids" => token_type_ids_val,
            ])
            .map_err(|e| EmbedderError::InferenceFailed(format!("inference failed: {e}")))?;

        // Output shape: [batch_size, seq_len, hidden_size]
        let (_shape, hidden_data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| EmbedderError::InferenceFailed(format!("output extraction: {e}")))?;

        let hidden_size = self.config.dimensions;
        let row_len = seq_len * hidden_size;
        if hidden_data.len() != batch_size * row_len {
            return Err(EmbedderError::InferenceFailed(format!(
                "unexpected output size {} (expected {} x {} x {})",
                hidden_data.len(),
                batch_size,
                seq_len,
                hidden_size
            )));
        }

        let mut vectors = Vec::with_capacity(batch_size);
        for (row, tokens) in batch.iter().enumerate() {
            let hidden = &hidden_data[row * row_len..(row + 1) * row_len];
            let mut pooled = match self.config.pooling {
                Pooling::Mean => mean_pooling(hidden, &tokens.attention_mask, seq_len, hidden_size),
                Pooling::Cls => hidden[..hidden_size].to_vec(),
            };
            if self.config.normalize {
                l2_normalize(&mut pooled);
            }
            vectors.push(pooled);
        }

        Ok(vectors)
    }
}

impl Embedder for OnnxEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
        let tokens = self.tokenizer.tokenize(text)?;
        self.run_batch(std::slice::from_ref(&tokens))?
            .pop()
            .ok_or_else(|| EmbedderError::InferenceFailed("empty model output".to_string()))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        debug!("Embedding batch of {} texts", texts.len());
        let tokens = self.tokenizer.tokenize_batch(texts)?;
        self.run_batch(&tokens)
    }

    fn dimensions(&self) -> usize {
        self.config.dimensions
    }

    fn model_id(&self) -> &str {
        &self.config.name
    }
}

/// Mean pooling over hidden states weighted by attention mask.
///
/// `hidden_data` is a flat array with shape `[seq_len, hidden_size]`.
fn mean_pooling(
    hidden_data: &[f32],
    attention_mask: &[i64],
    seq_len: usize,
    hidden_size: usize,
) -> Vec<f32> {
    let mut result = vec![0.0f32; hidden_size];
    let mut mask_sum: f32 = 0.0;

    for t in 0..seq_len {
        let mask = attention_mask[t] as f32;
        mask_sum += mask;

        for h in 0..hidden_size {
            result[h] += hidden_data[t * hidden_size + h] * mask;
        }
    }

    if mask_sum > 0.0 {
        for v in &mut result {
            *v /= mask_sum;
        }
    }

    result
}
