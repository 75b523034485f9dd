use anyhow::{Result, bail};
use sha2::{Digest, Sha256};

pub const DEFAULT_MODEL_ID: &str = "local-hash-v1";
pub const DEFAULT_EMBEDDING_DIM: usize = 384;

pub trait Embedder {
    fn model_id(&self) -> &str;

    fn dimensions(&self) -> usize;

    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

#[derive(Debug, Clone)]
pub struct LocalHashEmbedder {
    model_id: String,
    dimensions: usize,
}

impl LocalHashEmbedder {
    pub fn new(model_id: &str, dimensions: usize) -> Self {
        let trimmed = model_id.trim();
        Self {
            model_id: if trimmed.is_empty() {
                DEFAULT_MODEL_ID.to_string()
            } else {
                trimmed.to_string()
            },
            dimensions: dimensions.max(8),
        }
    }
}

impl Default for LocalHashEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_MODEL_ID, DEFAULT_EMBEDDING_DIM)
    }
}

impl Embedder for LocalHashEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| embed_text_local(text, self.dimensions))
            .collect())
    }
}

pub fn embed_text_local(payload: &str, dimensions: usize) -> Vec<f32> {
    let dims = dimensions.max(8);
    let mut vector = vec![0_f32; dims];

    for feature in feature_tokens(payload) {
        let hash = stable_hash(&feature);
        let index = (hash % dims as u64) as usize;
        let sign = if (hash >> 63) & 1 == 0 { 1.0 } else { -1.0 };
        let weight = 1.0 + (((hash >> 48) & 0xFF) as f32 / 255.0);
        vector[index] += sign * weight;
    }

    normalize_vector(&mut vector);
    vector
}

pub fn l2_distance(left: &[f32], right: &[f32]) -> Result<f32> {
    if left.len() != right.len() {
        bail!(
            "embedding dimension mismatch: {} vs {}",
            left.len(),
            right.len()
        );
    }

    let squared = left
        .iter()
        .zip(right.iter())
        .map(|(left_value, right_value)| {
            let delta = f64::from(*left_value) - f64::from(*right_value);
            delta * delta
        })
        .sum::<f64>();
    Ok(squared.sqrt() as f32)
}

pub fn encode_embedding_blob(values: &[f32]) -> Vec<u8> {
    let mut out = Vec::<u8>::with_capacity(values.len() * 4);
    for value in values {
        out.extend_from_slice(&value.to_le_bytes());
    }
    out
}

pub fn decode_embedding_blob(blob: &[u8], expected_dim: usize) -> Option<Vec<f32>> {
    if expected_dim == 0 || blob.len() != expected_dim.saturating_mul(4) {
        return None;
    }

    Some(
        blob.chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect(),
    )
}

fn stable_hash(value: &str) -> u64 {
    let digest = Sha256::digest(value.as_bytes());
    let mut bytes = [0_u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(bytes)
}

fn feature_tokens(payload: &str) -> Vec<String> {
    let words = payload
        .split_whitespace()
        .map(|value| {
            value
                .chars()
                .filter(|character| character.is_alphanumeric())
                .flat_map(char::to_lowercase)
                .collect::<String>()
        })
        .filter(|value| !value.is_empty())
        .collect::<Vec<String>>();

    let mut features = Vec::<String>::with_capacity(words.len() * 2);
    for (index, word) in words.iter().enumerate() {
        features.push(format!("w:{word}"));
        if let Some(next) = words.get(index + 1) {
            features.push(format!("b:{word}_{next}"));
        }
    }
    features
}

fn normalize_vector(values: &mut [f32]) {
    let squared_norm = values
        .iter()
        .map(|value| f64::from(*value) * f64::from(*value))
        .sum::<f64>();

    if squared_norm <= 0.0 {
        return;
    }

    let norm = squared_norm.sqrt() as f32;
    for value in values {
        *value /= norm;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_embedding_is_normalized_and_deterministic() {
        let first = embed_text_local("Engines require inspection every 50 hours", 64);
        let second = embed_text_local("Engines require inspection every 50 hours", 64);
        assert_eq!(first, second);

        let norm = first.iter().map(|value| value * value).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4, "unexpected norm {norm}");
    }

    #[test]
    fn empty_payload_embeds_to_zero_vector() {
        let vector = embed_text_local("   ", 16);
        assert_eq!(vector.len(), 16);
        assert!(vector.iter().all(|value| *value == 0.0));
    }

    #[test]
    fn related_text_is_closer_than_unrelated_text() {
        let query = embed_text_local("engine inspection interval hours", 384);
        let related = embed_text_local("engine inspection interval every 50 hours", 384);
        let unrelated = embed_text_local("cabin pressure warning light procedure", 384);

        let related_distance = l2_distance(&query, &related).expect("same dims");
        let unrelated_distance = l2_distance(&query, &unrelated).expect("same dims");
        assert!(related_distance < unrelated_distance);
    }

    #[test]
    fn l2_distance_rejects_dimension_mismatch() {
        let error = l2_distance(&[1.0, 0.0], &[1.0]).expect_err("mismatch should fail");
        assert!(error.to_string().contains("dimension mismatch"));
    }

    #[test]
    fn embedding_blob_round_trips_and_checks_length() {
        let values = vec![0.25_f32, -1.5, 3.0];
        let blob = encode_embedding_blob(&values);
        assert_eq!(decode_embedding_blob(&blob, 3), Some(values));
        assert_eq!(decode_embedding_blob(&blob, 4), None);
    }

    #[test]
    fn embedder_reports_model_and_batch_shape() {
        let embedder = LocalHashEmbedder::new("  ", 4);
        assert_eq!(embedder.model_id(), DEFAULT_MODEL_ID);
        assert_eq!(embedder.dimensions(), 8);

        let vectors = embedder
            .embed(&["alpha".to_string(), "beta".to_string()])
            .expect("local embedding never fails");
        assert_eq!(vectors.len(), 2);
        assert!(vectors.iter().all(|vector| vector.len() == 8));
    }
}
