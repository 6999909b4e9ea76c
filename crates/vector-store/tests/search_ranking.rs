use docrag_vector_store::{Embedder, EmbeddingModel, Metadata, MetadataValue, VectorStore};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

fn metadata(row: usize) -> Metadata {
    Metadata::from([
        ("document".to_string(), MetadataValue::from("corpus.pdf")),
        ("row".to_string(), MetadataValue::Int(row as i64)),
    ])
}

fn dot(a: &[f32], b: &[f32]) -> f64 {
    a.iter().zip(b).map(|(x, y)| f64::from(*x) * f64::from(*y)).sum()
}

/// Rows outside the returned top-k never beat the weakest returned row
/// (up to float summation noise).
fn assert_is_top_k(vectors: &[Vec<f32>], query: &[f32], rows: &[usize]) {
    let weakest = rows
        .iter()
        .map(|&r| dot(&vectors[r], query))
        .fold(f64::INFINITY, f64::min);
    for (row, vector) in vectors.iter().enumerate() {
        if !rows.contains(&row) {
            assert!(dot(vector, query) <= weakest + 1e-5, "row {row} should rank higher");
        }
    }
}

#[tokio::test]
async fn search_matches_brute_force_ranking_after_reload() {
    let embedder = EmbeddingModel::stub(16);
    let texts: Vec<String> = (0..40).map(|i| format!("passage number {i}")).collect();
    let vectors = embedder.embed_batch(&texts).await.unwrap();

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("store.drvs");
    let mut store = VectorStore::open(&path).await.unwrap();

    // Two batches, so the second append goes through the concatenation path.
    store
        .add(
            vectors[..25].to_vec(),
            texts[..25].to_vec(),
            (0..25).map(metadata).collect(),
        )
        .await
        .unwrap();
    store
        .add(
            vectors[25..].to_vec(),
            texts[25..].to_vec(),
            (25..40).map(metadata).collect(),
        )
        .await
        .unwrap();
    assert_eq!(store.len(), 40);

    let reloaded = VectorStore::open(&path).await.unwrap();
    for probe in ["passage number 7", "something unrelated", "passage number 39"] {
        let query = embedder.embed(probe).await.unwrap();
        for k in [1, 5, 40, 100] {
            let hits = reloaded.search(&query, k).unwrap();
            let rows: Vec<usize> = hits
                .iter()
                .map(|h| h.metadata["row"].as_i64().unwrap() as usize)
                .collect();
            assert_eq!(rows.len(), k.min(vectors.len()), "probe {probe:?} k={k}");
            assert_is_top_k(&vectors, &query, &rows);
            for (pair, row_pair) in hits.windows(2).zip(rows.windows(2)) {
                assert!(pair[0].score >= pair[1].score);
                if pair[0].score == pair[1].score {
                    assert!(row_pair[0] < row_pair[1]);
                }
            }
            assert_eq!(hits, store.search(&query, k).unwrap());
        }
    }

    let exact = reloaded
        .search(&embedder.embed("passage number 7").await.unwrap(), 1)
        .unwrap();
    assert_eq!(exact[0].text, "passage number 7");
    assert!((exact[0].score - 1.0).abs() < 1e-5);
}
