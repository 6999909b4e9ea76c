use crate::error::{Result, VectorStoreError};
use crate::format;
use crate::types::{Metadata, MetadataValue, SearchHit};
use ndarray::{concatenate, Array2, ArrayView1, Axis};
use std::cmp::Ordering;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Append-only collection of `(vector, text, metadata)` records persisted to one file.
///
/// Row `i` of the matrix, `texts[i]` and `metadatas[i]` describe the same record;
/// the row index is the record's identity.
pub struct VectorStore {
    matrix: Array2<f32>,
    texts: Vec<String>,
    metadatas: Vec<Metadata>,
    path: PathBuf,
}

impl VectorStore {
    /// Open the store at `path`, loading it when the file exists.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let snapshot = format::decode(&bytes)?;
                log::info!(
                    "Loaded VectorStore from {} ({} records, dim {})",
                    path.display(),
                    snapshot.texts.len(),
                    snapshot.matrix.ncols()
                );
                Ok(Self {
                    matrix: snapshot.matrix,
                    texts: snapshot.texts,
                    metadatas: snapshot.metadatas,
                    path,
                })
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                log::info!("Initializing empty VectorStore at {}", path.display());
                Ok(Self {
                    matrix: Array2::zeros((0, 0)),
                    texts: Vec::new(),
                    metadatas: Vec::new(),
                    path,
                })
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Append records and rewrite the backing file.
    ///
    /// Either every record is added and persisted, or the store is left untouched.
    pub async fn add(
        &mut self,
        vectors: Vec<Vec<f32>>,
        texts: Vec<String>,
        metadatas: Vec<Metadata>,
    ) -> Result<()> {
        if vectors.len() != texts.len() || vectors.len() != metadatas.len() {
            return Err(VectorStoreError::LengthMismatch {
                vectors: vectors.len(),
                texts: texts.len(),
                metadatas: metadatas.len(),
            });
        }
        validate_metadatas(&metadatas)?;
        let Some(first) = vectors.first() else {
            return Ok(());
        };

        let dimension = self.dimension().unwrap_or(first.len());
        if let Some(bad) = vectors.iter().find(|v| v.len() != dimension) {
            return Err(VectorStoreError::InvalidDimension {
                expected: dimension,
                actual: bad.len(),
            });
        }

        let added = vectors.len();
        let batch = Array2::from_shape_vec((added, dimension), vectors.concat())
            .map_err(|e| VectorStoreError::CorruptStore(format!("batch shape: {e}")))?;
        let matrix = if self.is_empty() {
            batch
        } else {
            concatenate(Axis(0), &[self.matrix.view(), batch.view()])
                .map_err(|e| VectorStoreError::CorruptStore(format!("append rows: {e}")))?
        };

        let committed = self.texts.len();
        self.texts.extend(texts);
        self.metadatas.extend(metadatas);

        if let Err(err) = write_snapshot(&self.path, &matrix, &self.texts, &self.metadatas).await {
            self.texts.truncate(committed);
            self.metadatas.truncate(committed);
            return Err(err);
        }

        self.matrix = matrix;
        log::info!(
            "Added {added} records to {}. Total: {}",
            self.path.display(),
            self.len()
        );
        Ok(())
    }

    /// Exact top-k search by dot product.
    ///
    /// Scores equal cosine similarity only when both stored vectors and the query
    /// are unit-normalized. Ties keep insertion order.
    pub fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<SearchHit>> {
        let Some(dimension) = self.dimension() else {
            return Ok(Vec::new());
        };
        if query.len() != dimension {
            return Err(VectorStoreError::InvalidDimension {
                expected: dimension,
                actual: query.len(),
            });
        }

        let scores = self.matrix.dot(&ArrayView1::from(query)).to_vec();
        let ranked = top_k_indices(&scores, top_k);
        log::debug!(
            "Scanned {} records, returning {} (top_k {top_k})",
            self.len(),
            ranked.len()
        );

        Ok(ranked
            .into_iter()
            .map(|idx| SearchHit {
                score: scores[idx],
                text: self.texts[idx].clone(),
                metadata: self.metadatas[idx].clone(),
            })
            .collect())
    }

    /// Rewrite the backing file from the current in-memory state
    pub async fn save(&self) -> Result<()> {
        write_snapshot(&self.path, &self.matrix, &self.texts, &self.metadatas).await
    }

    /// Dimensionality established by the first record, if any
    #[must_use]
    pub fn dimension(&self) -> Option<usize> {
        if self.texts.is_empty() {
            None
        } else {
            Some(self.matrix.ncols())
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.texts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn texts(&self) -> &[String] {
        &self.texts
    }

    #[must_use]
    pub fn metadatas(&self) -> &[Metadata] {
        &self.metadatas
    }
}

async fn write_snapshot(
    path: &Path,
    matrix: &Array2<f32>,
    texts: &[String],
    metadatas: &[Metadata],
) -> Result<()> {
    let bytes = format::encode(matrix, texts, metadatas)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }

    let tmp = tmp_path(path);
    tokio::fs::write(&tmp, &bytes).await?;
    if let Err(err) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(err.into());
    }
    log::debug!("VectorStore saved to {} ({} bytes)", path.display(), bytes.len());
    Ok(())
}

/// JSON has no encoding for NaN or infinities
fn validate_metadatas(metadatas: &[Metadata]) -> Result<()> {
    for metadata in metadatas {
        for (key, value) in metadata {
            if let MetadataValue::Float(number) = value {
                if !number.is_finite() {
                    return Err(VectorStoreError::InvalidMetadata {
                        key: key.clone(),
                        message: format!("{number} is not a finite number"),
                    });
                }
            }
        }
    }
    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}

/// Descending by score, lowest index first among equals; NaN ranks last.
fn rank(scores: &[f32], a: usize, b: usize) -> Ordering {
    let (sa, sb) = (scores[a], scores[b]);
    let by_score = match (sa.is_nan(), sb.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => sb.partial_cmp(&sa).unwrap_or(Ordering::Equal),
    };
    by_score.then_with(|| a.cmp(&b))
}

fn top_k_indices(scores: &[f32], top_k: usize) -> Vec<usize> {
    if top_k == 0 {
        return Vec::new();
    }
    let mut order: Vec<usize> = (0..scores.len()).collect();
    if top_k < order.len() {
        order.select_nth_unstable_by(top_k - 1, |&a, &b| rank(scores, a, b));
        order.truncate(top_k);
    }
    order.sort_unstable_by(|&a, &b| rank(scores, a, b));
    order
}
