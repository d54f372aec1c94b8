//! Vector similarity utilities.
//!
//! Pure-Rust implementations of:
//! - Cosine similarity
//! - Cosine distance (`1 - similarity`, the ranking key vector stores report)
//! - Nearest-neighbour ranking over stored chunks

use evidex_core::StoredChunk;

/// Compute cosine similarity between two vectors.
///
/// Returns a value in [-1, 1] where 1 = identical, 0 = orthogonal, -1 = opposite.
/// Returns 0.0 if the vectors differ in length, are empty, or either is zero.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let x = *x as f64;
        let y = *y as f64;
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < 1e-10 {
        return 0.0;
    }

    (dot / denom) as f32
}

/// Cosine distance in [0, 2]; lower is more similar.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f64 {
    1.0 - cosine_similarity(a, b) as f64
}

/// Rank `chunks` by ascending cosine distance to `query`, keeping `limit`.
///
/// Ties keep insertion order.
pub fn nearest<'a, I>(chunks: I, query: &[f32], limit: usize) -> Vec<(f64, &'a StoredChunk)>
where
    I: IntoIterator<Item = &'a StoredChunk>,
{
    let mut scored: Vec<(f64, &StoredChunk)> = chunks
        .into_iter()
        .map(|chunk| (cosine_distance(&chunk.embedding, query), chunk))
        .collect();

    scored.sort_by(|a, b| a.0.total_cmp(&b.0));
    scored.truncate(limit);
    scored
}
