//! Single-file snapshot of a vector store.
//!
//! ```text
//! magic        4 bytes  "DRVS"
//! version      u32      STORE_FORMAT_VERSION
//! rows         u64      N
//! dimension    u32      D
//! matrix       N*D f32  row-major
//! payload_len  u64
//! payload      JSON     {"texts": [...], "metadatas": [...]}
//! ```
//!
//! All integers and floats are little-endian. Floats are stored as raw IEEE-754
//! bits so vectors survive a save/load cycle unchanged.

use crate::error::{Result, VectorStoreError};
use crate::types::Metadata;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

const STORE_MAGIC: &[u8; 4] = b"DRVS";
pub const STORE_FORMAT_VERSION: u32 = 1;

#[derive(Serialize)]
struct PayloadRef<'a> {
    texts: &'a [String],
    metadatas: &'a [Metadata],
}

#[derive(Deserialize)]
struct Payload {
    texts: Vec<String>,
    metadatas: Vec<Metadata>,
}

pub(crate) struct Snapshot {
    pub matrix: Array2<f32>,
    pub texts: Vec<String>,
    pub metadatas: Vec<Metadata>,
}

pub(crate) fn encode(
    matrix: &Array2<f32>,
    texts: &[String],
    metadatas: &[Metadata],
) -> Result<Vec<u8>> {
    let payload = serde_json::to_vec(&PayloadRef { texts, metadatas })?;
    let (rows, dim) = matrix.dim();
    let dim = u32::try_from(dim).map_err(|_| {
        VectorStoreError::CorruptStore(format!("dimension {dim} does not fit the file header"))
    })?;

    let mut out = Vec::with_capacity(28 + matrix.len() * 4 + payload.len());
    out.extend_from_slice(STORE_MAGIC);
    out.extend_from_slice(&STORE_FORMAT_VERSION.to_le_bytes());
    out.extend_from_slice(&(rows as u64).to_le_bytes());
    out.extend_from_slice(&dim.to_le_bytes());
    for value in matrix {
        out.extend_from_slice(&value.to_le_bytes());
    }
    out.extend_from_slice(&(payload.len() as u64).to_le_bytes());
    out.extend_from_slice(&payload);
    Ok(out)
}

pub(crate) fn decode(bytes: &[u8]) -> Result<Snapshot> {
    let mut reader = Reader { rest: bytes };

    if reader.take(4)? != STORE_MAGIC {
        return Err(corrupt("bad magic"));
    }
    let version = reader.u32()?;
    if version != STORE_FORMAT_VERSION {
        return Err(corrupt(format!(
            "unsupported format version {version} (expected {STORE_FORMAT_VERSION})"
        )));
    }

    let rows = usize::try_from(reader.u64()?).map_err(|_| corrupt("row count overflows"))?;
    let dim = reader.u32()? as usize;
    let cells = rows
        .checked_mul(dim)
        .ok_or_else(|| corrupt("matrix size overflows"))?;
    let matrix_bytes = reader.take(
        cells
            .checked_mul(4)
            .ok_or_else(|| corrupt("matrix size overflows"))?,
    )?;
    let values: Vec<f32> = matrix_bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();
    let matrix = Array2::from_shape_vec((rows, dim), values)
        .map_err(|e| corrupt(format!("matrix shape: {e}")))?;

    let payload_len =
        usize::try_from(reader.u64()?).map_err(|_| corrupt("payload length overflows"))?;
    let payload: Payload = serde_json::from_slice(reader.take(payload_len)?)?;
    if !reader.rest.is_empty() {
        return Err(corrupt(format!("{} trailing bytes", reader.rest.len())));
    }
    if payload.texts.len() != rows || payload.metadatas.len() != rows {
        return Err(corrupt(format!(
            "{rows} vectors but {} texts and {} metadatas",
            payload.texts.len(),
            payload.metadatas.len()
        )));
    }

    Ok(Snapshot {
        matrix,
        texts: payload.texts,
        metadatas: payload.metadatas,
    })
}

fn corrupt(msg: impl Into<String>) -> VectorStoreError {
    VectorStoreError::CorruptStore(msg.into())
}

struct Reader<'a> {
    rest: &'a [u8],
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.rest.len() < n {
            return Err(corrupt(format!(
                "truncated: wanted {n} bytes, {} left",
                self.rest.len()
            )));
        }
        let (head, tail) = self.rest.split_at(n);
        self.rest = tail;
        Ok(head)
    }

    fn u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self) -> Result<u64> {
        let b = self.take(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(b);
        Ok(u64::from_le_bytes(buf))
    }
}
