use crate::error::{Result, VectorStoreError};
use async_trait::async_trait;
use ndarray::{Array, Axis, Ix2, Ix3};
use ort::execution_providers::{CPUExecutionProvider, ExecutionProvider};
use ort::session::{builder::GraphOptimizationLevel, Input, Session, SessionInputs};
use ort::tensor::TensorElementType;
use ort::value::{DynTensor, Tensor};
use std::collections::HashMap;
use std::env;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use tokenizers::{Encoding, PaddingParams, PaddingStrategy, Tokenizer, TruncationParams};
use tokio::task::spawn_blocking;

pub const EMBEDDING_MODE_ENV: &str = "DOCRAG_EMBEDDING_MODE";
pub const EMBEDDING_MODEL_ENV: &str = "DOCRAG_EMBEDDING_MODEL";
pub const MODEL_DIR_ENV: &str = "DOCRAG_MODEL_DIR";
pub const DEFAULT_MODEL_ID: &str = "e5-small-v2";

/// Batch text → unit-vector embedding function.
///
/// Implementations must return one vector per input, in input order, all of
/// length [`Embedder::dimension`].
#[async_trait]
pub trait Embedder: Send + Sync {
    fn dimension(&self) -> usize;

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut embeddings = self.embed_batch(&[text.to_string()]).await?;
        embeddings
            .pop()
            .ok_or_else(|| VectorStoreError::EmbeddingError("Empty embedding result".to_string()))
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EmbeddingMode {
    /// ONNX Runtime inference
    Fast,
    /// Deterministic hash vectors, no model files needed
    Stub,
}

impl EmbeddingMode {
    pub fn from_env() -> Result<Self> {
        env::var(EMBEDDING_MODE_ENV)
            .map_or(Ok(Self::Fast), |raw| raw.parse())
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Fast => "fast",
            Self::Stub => "stub",
        }
    }
}

impl FromStr for EmbeddingMode {
    type Err = VectorStoreError;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "fast" => Ok(Self::Fast),
            "stub" => Ok(Self::Stub),
            other => Err(VectorStoreError::EmbeddingError(format!(
                "Unsupported {EMBEDDING_MODE_ENV} '{other}' (expected 'fast' or 'stub')"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct ModelSpec {
    id: &'static str,
    dimension: usize,
    max_length: usize,
    max_batch: usize,
}

const KNOWN_MODELS: &[ModelSpec] = &[
    ModelSpec {
        id: "e5-small-v2",
        dimension: 384,
        max_length: 512,
        max_batch: 32,
    },
    ModelSpec {
        id: "bge-small",
        dimension: 384,
        max_length: 512,
        max_batch: 32,
    },
    ModelSpec {
        id: "all-minilm-l6-v2",
        dimension: 384,
        max_length: 256,
        max_batch: 64,
    },
];

fn normalize_model_id(raw: &str) -> String {
    let lowered = raw.trim().to_ascii_lowercase();
    let name = lowered.rsplit('/').next().unwrap_or(lowered.as_str());
    match name {
        "bge-small-en-v1.5" => "bge-small".to_string(),
        other => other.to_string(),
    }
}

fn model_spec(model_id: &str) -> Result<&'static ModelSpec> {
    let wanted = normalize_model_id(model_id);
    KNOWN_MODELS
        .iter()
        .find(|spec| spec.id == wanted)
        .ok_or_else(|| {
            let available = KNOWN_MODELS
                .iter()
                .map(|spec| spec.id)
                .collect::<Vec<_>>()
                .join(", ");
            VectorStoreError::EmbeddingError(format!(
                "Unknown embedding model id '{model_id}'. Available: {available}"
            ))
        })
}

/// Where to find the embedding backend and its assets
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmbeddingOptions {
    pub mode: EmbeddingMode,
    pub model_id: String,
    pub model_dir: PathBuf,
}

impl Default for EmbeddingOptions {
    fn default() -> Self {
        Self {
            mode: EmbeddingMode::Fast,
            model_id: DEFAULT_MODEL_ID.to_string(),
            model_dir: PathBuf::from("models"),
        }
    }
}

impl EmbeddingOptions {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            mode: EmbeddingMode::from_env()?,
            model_id: env::var(EMBEDDING_MODEL_ENV).unwrap_or(defaults.model_id),
            model_dir: env::var(MODEL_DIR_ENV).map_or(defaults.model_dir, PathBuf::from),
        })
    }
}

fn embedding_error(context: &str, err: impl Display) -> VectorStoreError {
    VectorStoreError::EmbeddingError(format!("{context}: {err}"))
}

struct OrtBackend {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    max_batch: usize,
    dimension: usize,
}

impl OrtBackend {
    fn load(spec: &ModelSpec, model_dir: &Path) -> Result<Self> {
        let dir = model_dir.join(spec.id);
        let model_path = dir.join("model.onnx");
        let tokenizer_path = dir.join("tokenizer.json");
        if !model_path.exists() || !tokenizer_path.exists() {
            return Err(VectorStoreError::EmbeddingError(format!(
                "Model files for '{}' are missing. Expected ONNX at {} and tokenizer at {}. Set {MODEL_DIR_ENV} or use {EMBEDDING_MODE_ENV}=stub.",
                spec.id,
                model_path.display(),
                tokenizer_path.display(),
            )));
        }

        let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| embedding_error("Tokenizer load failed", e))?;
        tokenizer.with_padding(Some(PaddingParams {
            strategy: PaddingStrategy::BatchLongest,
            ..PaddingParams::default()
        }));
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: spec.max_length,
                ..TruncationParams::default()
            }))
            .map_err(|e| embedding_error("Tokenizer truncation failed", e))?;

        let threads = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
            .clamp(1, 4);
        let session = Session::builder()
            .map_err(|e| embedding_error("Session builder", e))?
            .with_intra_threads(threads)
            .map_err(|e| embedding_error("Failed to set ORT intra threads", e))?
            .with_execution_providers([CPUExecutionProvider::default().build()])
            .map_err(|e| embedding_error("Failed to register CPU execution provider", e))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| embedding_error("Failed to set optimization level", e))?
            .commit_from_file(&model_path)
            .map_err(|e| embedding_error("Failed to load ONNX model", e))?;

        log::info!(
            "Loaded ONNX model '{}' (dim {}, max_length {}, batch {}, threads {threads})",
            spec.id,
            spec.dimension,
            spec.max_length,
            spec.max_batch
        );

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            max_batch: spec.max_batch,
            dimension: spec.dimension,
        })
    }

    fn embed_batch_blocking(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.max_batch) {
            let encodings = self
                .tokenizer
                .encode_batch(batch.to_vec(), true)
                .map_err(|e| embedding_error("Tokenization failed", e))?;
            let Some(seq_len) = encodings.first().map(Encoding::len) else {
                continue;
            };
            if encodings.iter().any(|e| e.len() != seq_len) {
                return Err(VectorStoreError::EmbeddingError(
                    "Inconsistent sequence lengths after padding".to_string(),
                ));
            }

            let inputs = EncodedBatch::from_encodings(&encodings, seq_len);
            let hidden = self.run(&inputs)?;
            results.extend(pool_output(hidden, &inputs.attention_mask, self.dimension)?);
        }
        Ok(results)
    }

    fn run(&self, batch: &EncodedBatch) -> Result<ndarray::ArrayD<f32>> {
        let shape = (batch.rows, batch.seq_len);
        let to_tensor = |name: &str, values: Vec<i64>| -> Result<DynTensor> {
            let array = Array::from_shape_vec(shape, values)
                .map_err(|e| embedding_error(name, e))?;
            Ok(Tensor::from_array(array.into_dyn())
                .map_err(|e| embedding_error(name, e))?
                .upcast())
        };

        let mut available: HashMap<String, DynTensor> = HashMap::new();
        available.insert("input_ids".to_string(), to_tensor("input_ids", batch.input_ids.clone())?);
        available.insert(
            "attention_mask".to_string(),
            to_tensor("attention_mask", batch.attention_mask.concat())?,
        );
        available.insert(
            "token_type_ids".to_string(),
            to_tensor("token_type_ids", batch.token_type_ids.clone())?,
        );

        let mut session = self.session.lock().map_err(|_| {
            VectorStoreError::EmbeddingError("Failed to lock ONNX session".to_string())
        })?;

        let dyn_shape = ndarray::IxDyn(&[shape.0, shape.1]);
        let mut feed: HashMap<String, DynTensor> = HashMap::new();
        for input in &session.inputs {
            let value = match available.remove(&input.name) {
                Some(value) => value,
                None => zero_tensor(&dyn_shape, input)?,
            };
            feed.insert(input.name.clone(), value);
        }

        let outputs = session
            .run(SessionInputs::from(feed))
            .map_err(|e| embedding_error("ONNX forward failed", e))?;
        if outputs.len() == 0 {
            return Err(VectorStoreError::EmbeddingError(
                "ONNX returned no outputs".to_string(),
            ));
        }
        let hidden = outputs[0]
            .try_extract_array::<f32>()
            .map_err(|e| embedding_error("Failed to decode ONNX output", e))?
            .to_owned();
        Ok(hidden)
    }
}

/// Row-major token tensors for one tokenizer batch
struct EncodedBatch {
    rows: usize,
    seq_len: usize,
    input_ids: Vec<i64>,
    token_type_ids: Vec<i64>,
    attention_mask: Vec<Vec<i64>>,
}

impl EncodedBatch {
    fn from_encodings(encodings: &[Encoding], seq_len: usize) -> Self {
        let widen = |values: &[u32]| -> Vec<i64> {
            (0..seq_len)
                .map(|idx| i64::from(values.get(idx).copied().unwrap_or(0)))
                .collect()
        };
        Self {
            rows: encodings.len(),
            seq_len,
            input_ids: encodings.iter().flat_map(|e| widen(e.get_ids())).collect(),
            token_type_ids: encodings
                .iter()
                .flat_map(|e| widen(e.get_type_ids()))
                .collect(),
            attention_mask: encodings
                .iter()
                .map(|e| widen(e.get_attention_mask()))
                .collect(),
        }
    }
}

/// Turn model output into unit vectors: 2-D outputs are already pooled,
/// 3-D outputs are mean-pooled over unmasked tokens.
fn pool_output(
    output: ndarray::ArrayD<f32>,
    masks: &[Vec<i64>],
    expected_dimension: usize,
) -> Result<Vec<Vec<f32>>> {
    let mut vectors = match output.ndim() {
        2 => output
            .into_dimensionality::<Ix2>()
            .map_err(|e| embedding_error("Bad output shape", e))?
            .outer_iter()
            .map(|row| row.to_vec())
            .collect::<Vec<_>>(),
        3 => {
            let hidden = output
                .into_dimensionality::<Ix3>()
                .map_err(|e| embedding_error("Bad output shape", e))?;
            hidden
                .outer_iter()
                .zip(masks)
                .map(|(tokens, mask)| mean_pool(tokens, mask))
                .collect()
        }
        _ => {
            return Err(VectorStoreError::EmbeddingError(format!(
                "Unexpected ONNX output dims: {:?}",
                output.shape()
            )))
        }
    };

    for vector in &mut vectors {
        if vector.len() != expected_dimension {
            return Err(VectorStoreError::InvalidDimension {
                expected: expected_dimension,
                actual: vector.len(),
            });
        }
        normalize(vector);
    }
    Ok(vectors)
}

fn mean_pool(tokens: ndarray::ArrayView2<'_, f32>, mask: &[i64]) -> Vec<f32> {
    let mut sum = ndarray::Array1::<f32>::zeros(tokens.len_of(Axis(1)));
    let mut count = 0usize;
    for (token, keep) in tokens.outer_iter().zip(mask) {
        if *keep != 0 {
            sum += &token;
            count += 1;
        }
    }
    if count > 0 {
        sum /= count as f32;
    }
    sum.to_vec()
}

fn zero_tensor(shape: &ndarray::IxDyn, input: &Input) -> Result<DynTensor> {
    let ort::value::ValueType::Tensor { ty, .. } = &input.input_type else {
        return Err(VectorStoreError::EmbeddingError(format!(
            "Unsupported non-tensor ONNX input '{}'",
            input.name
        )));
    };
    let tensor = match ty {
        TensorElementType::Int64 => Tensor::from_array(Array::<i64, _>::zeros(shape.clone()))
            .map_err(|e| embedding_error("zero input", e))?
            .upcast(),
        TensorElementType::Float32 => Tensor::from_array(Array::<f32, _>::zeros(shape.clone()))
            .map_err(|e| embedding_error("zero input", e))?
            .upcast(),
        other => {
            return Err(VectorStoreError::EmbeddingError(format!(
                "Cannot synthesize zeros for tensor type {other:?} (input {})",
                input.name
            )))
        }
    };
    Ok(tensor)
}

/// Scale `vector` to unit length; the zero vector is left as is.
pub fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm == 0.0 {
        return;
    }
    for value in vector {
        *value /= norm;
    }
}

fn stub_embed(text: &str, dimension: usize) -> Vec<f32> {
    let mut state =
        fnv1a_64(text.as_bytes()) ^ (dimension as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    let mut vector: Vec<f32> = (0..dimension)
        .map(|_| {
            let bits = (splitmix64(&mut state) >> 40) as u32;
            // 24 random bits mapped onto [-1, 1)
            (bits as f32 / (1u32 << 23) as f32) - 1.0
        })
        .collect();
    normalize(&mut vector);
    vector
}

fn fnv1a_64(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0xcbf2_9ce4_8422_2325, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(0x0000_0100_0000_01b3)
    })
}

const fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

enum EmbeddingBackend {
    Ort(Arc<OrtBackend>),
    Stub,
}

/// Sentence embedding model (ONNX Runtime, or a deterministic stub)
pub struct EmbeddingModel {
    backend: EmbeddingBackend,
    dimension: usize,
    model_id: String,
}

impl EmbeddingModel {
    /// Build the model described by the `DOCRAG_*` environment
    pub fn new() -> Result<Self> {
        Self::with_options(&EmbeddingOptions::from_env()?)
    }

    pub fn with_options(options: &EmbeddingOptions) -> Result<Self> {
        let spec = model_spec(&options.model_id)?;
        let backend = match options.mode {
            EmbeddingMode::Stub => EmbeddingBackend::Stub,
            EmbeddingMode::Fast => {
                EmbeddingBackend::Ort(Arc::new(OrtBackend::load(spec, &options.model_dir)?))
            }
        };
        log::debug!(
            "Embedding backend '{}' for model '{}'",
            options.mode.as_str(),
            spec.id
        );
        Ok(Self {
            backend,
            dimension: spec.dimension,
            model_id: spec.id.to_string(),
        })
    }

    /// Stub model with an arbitrary dimension
    #[must_use]
    pub fn stub(dimension: usize) -> Self {
        Self {
            backend: EmbeddingBackend::Stub,
            dimension,
            model_id: "stub".to_string(),
        }
    }

    #[must_use]
    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    #[must_use]
    pub const fn mode(&self) -> EmbeddingMode {
        match self.backend {
            EmbeddingBackend::Ort(_) => EmbeddingMode::Fast,
            EmbeddingBackend::Stub => EmbeddingMode::Stub,
        }
    }
}

#[async_trait]
impl Embedder for EmbeddingModel {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        log::debug!("Embedding batch of {} texts", texts.len());

        match &self.backend {
            EmbeddingBackend::Stub => Ok(texts
                .iter()
                .map(|text| stub_embed(text, self.dimension))
                .collect()),
            EmbeddingBackend::Ort(backend) => {
                let backend = backend.clone();
                let owned = texts.to_vec();
                spawn_blocking(move || backend.embed_batch_blocking(&owned))
                    .await
                    .map_err(|e| embedding_error("Join error", e))?
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn norm(v: &[f32]) -> f32 {
        v.iter().map(|x| x * x).sum::<f32>().sqrt()
    }

    #[tokio::test]
    async fn stub_vectors_are_unit_and_deterministic() {
        let model = EmbeddingModel::stub(64);
        let texts = vec!["alpha".to_string(), "beta".to_string(), "alpha".to_string()];
        let vectors = model.embed_batch(&texts).await.unwrap();

        assert_eq!(vectors.len(), 3);
        assert!(vectors.iter().all(|v| v.len() == 64));
        assert!(vectors.iter().all(|v| (norm(v) - 1.0).abs() < 1e-5));
        assert_eq!(vectors[0], vectors[2]);
        assert_ne!(vectors[0], vectors[1]);

        let single = model.embed("beta").await.unwrap();
        assert_eq!(single, vectors[1]);
    }

    #[tokio::test]
    async fn stub_mode_uses_model_dimension() {
        let options = EmbeddingOptions {
            mode: EmbeddingMode::Stub,
            model_id: "intfloat/e5-small-v2".to_string(),
            model_dir: PathBuf::from("/nonexistent"),
        };
        let model = EmbeddingModel::with_options(&options).unwrap();
        assert_eq!(model.dimension(), 384);
        assert_eq!(model.model_id(), "e5-small-v2");
        assert_eq!(model.mode(), EmbeddingMode::Stub);
        assert!(model.embed_batch(&[]).await.unwrap().is_empty());
    }

    #[test]
    fn fast_mode_reports_missing_assets() {
        let dir = tempfile::TempDir::new().unwrap();
        let options = EmbeddingOptions {
            mode: EmbeddingMode::Fast,
            model_id: DEFAULT_MODEL_ID.to_string(),
            model_dir: dir.path().to_path_buf(),
        };
        let err = EmbeddingModel::with_options(&options).err().unwrap();
        let msg = err.to_string();
        assert!(msg.contains("model.onnx") && msg.contains("tokenizer.json"), "{msg}");
    }

    #[test]
    fn unknown_model_lists_available_ids() {
        let err = model_spec("gpt-embed-xl").unwrap_err();
        assert!(err.to_string().contains("e5-small-v2"));
        assert_eq!(model_spec("BAAI/bge-small-en-v1.5").unwrap().id, "bge-small");
    }

    #[test]
    fn mode_parsing() {
        assert_eq!("STUB".parse::<EmbeddingMode>().unwrap(), EmbeddingMode::Stub);
        assert_eq!(" fast ".parse::<EmbeddingMode>().unwrap(), EmbeddingMode::Fast);
        assert!("gpu".parse::<EmbeddingMode>().is_err());
    }

    #[test]
    fn mean_pool_ignores_padding() {
        let tokens = ndarray::array![[1.0_f32, 2.0], [3.0, 4.0], [100.0, 100.0]];
        assert_eq!(mean_pool(tokens.view(), &[1, 1, 0]), vec![2.0, 3.0]);
    }

    #[test]
    fn pooled_output_is_normalized() {
        let output = ndarray::array![[3.0_f32, 4.0]].into_dyn();
        let vectors = pool_output(output, &[vec![1]], 2).unwrap();
        assert_eq!(vectors, vec![vec![0.6, 0.8]]);

        let output = ndarray::array![[1.0_f32, 0.0, 0.0]].into_dyn();
        assert!(matches!(
            pool_output(output, &[vec![1]], 2),
            Err(VectorStoreError::InvalidDimension { .. })
        ));
    }
}
