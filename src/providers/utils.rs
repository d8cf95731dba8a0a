use anyhow::Result;

use super::EMBEDDING_DIM;

/// Deterministic token-hash embedding for providers without an embedding
/// endpoint. Every occurrence of a token bumps one fixed slot, so identical
/// texts always map to identical vectors and retrieval stays functional.
pub async fn fallback_embedding(text: &str) -> Result<Vec<f32>> {
    let mut vector = vec![0.0f32; EMBEDDING_DIM];

    for token in text.split_whitespace() {
        let token = token.trim_matches(|c: char| !c.is_alphanumeric());
        if token.is_empty() {
            continue;
        }
        // FNV-1a over the lowercased token
        let mut hash: u64 = 0xcbf29ce484222325;
        for byte in token.to_lowercase().bytes() {
            hash ^= byte as u64;
            hash = hash.wrapping_mul(0x100000001b3);
        }
        vector[(hash % EMBEDDING_DIM as u64) as usize] += 1.0;
    }

    let magnitude: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if magnitude > 0.0 {
        for value in vector.iter_mut() {
            *value /= magnitude;
        }
    }

    Ok(vector)
}
