/// Mock embedder for tests and offline runs.
///
/// Generates deterministic feature-hashing embeddings: every identifier-ish
/// token of the text is lower-cased, split on `_` and camel-case humps, and
/// hashed with SHA-256 into one of `dimensions` buckets, so vectors stay
/// identical across toolchains. Texts that share vocabulary end
/// up with a high cosine similarity, which is enough to exercise retrieval
/// without an ONNX model.
use sha2::{Digest, Sha256};

use super::{Embedder, EmbedderError, l2_normalize};

/// A mock embedder that produces deterministic bag-of-words vectors.
pub struct MockEmbedder {
    pub dimensions: usize,
}

impl MockEmbedder {
    /// Create a new `MockEmbedder` with the given dimensionality.
    #[must_use]
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self { dimensions: 384 }
    }
}

impl Embedder for MockEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
        let mut embedding = vec![0.0f32; self.dimensions];
        if self.dimensions == 0 {
            return Ok(embedding);
        }

        for token in tokens(text) {
            embedding[bucket(&token, self.dimensions)] += 1.0;
        }

        l2_normalize(&mut embedding);
        Ok(embedding)
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_id(&self) -> &str {
        "mock"
    }
}

fn bucket(token: &str, dimensions: usize) -> usize {
    let digest = Sha256::digest(token.as_bytes());
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    (u64::from_le_bytes(head) % dimensions as u64) as usize
}

/// Split text into lower-cased word tokens (`parseConfig_file` → parse, config, file).
fn tokens(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    for word in text.split(|c: char| !c.is_alphanumeric()) {
        let mut current = String::new();
        let mut prev_lower = false;
        for c in word.chars() {
            if c.is_uppercase() && prev_lower && !current.is_empty() {
                out.push(std::mem::take(&mut current));
            }
            prev_lower = c.is_lowercase() || c.is_ascii_digit();
            current.extend(c.to_lowercase());
        }
        if !current.is_empty() {
            out.push(current);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[test]
    fn test_mock_embed_dimensions() {
        let embedder = MockEmbedder::new(384);
        let result = embedder.embed("hello world").unwrap();
        assert_eq!(result.len(), 384);
    }

    #[test]
    fn test_mock_embed_deterministic() {
        let embedder = MockEmbedder::new(384);
        let a = embedder.embed("hello").unwrap();
        let b = embedder.embed("hello").unwrap();
        assert_eq!(a, b, "same input should produce same output");
    }

    #[test]
    fn test_mock_embed_different_inputs() {
        let embedder = MockEmbedder::new(384);
        let a = embedder.embed("hello").unwrap();
        let b = embedder.embed("world").unwrap();
        assert_ne!(a, b, "different inputs should produce different outputs");
    }

    #[test]
    fn test_mock_embed_normalized() {
        let embedder = MockEmbedder::new(384);
        let vec = embedder.embed("test normalization").unwrap();
        let norm: f32 = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!(
            (norm - 1.0).abs() < 0.01,
            "vector should be approximately unit length, got {norm}"
        );
    }

    #[test]
    fn test_mock_embed_empty_text_is_zero() {
        let embedder = MockEmbedder::new(16);
        let vec = embedder.embed("   ").unwrap();
        assert!(vec.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_shared_vocabulary_scores_higher() {
        let embedder = MockEmbedder::new(256);
        let query = embedder.embed("parse configuration file").unwrap();
        let related = embedder
            .embed("def parse_config_file(path):\n    \"\"\"Parse the configuration file.\"\"\"")
            .unwrap();
        let unrelated = embedder.embed("fn render_button(ctx: &Ui) {}").unwrap();
        assert!(cosine(&query, &related) > cosine(&query, &unrelated));
    }

    #[test]
    fn test_buckets_are_stable() {
        // sha256("hello") starts with 2c f2 4d ba 5f b0 a3 0e.
        let head = u64::from_le_bytes([0x2c, 0xf2, 0x4d, 0xba, 0x5f, 0xb0, 0xa3, 0x0e]);
        assert_eq!(bucket("hello", 384), (head % 384) as usize);

        let vec = MockEmbedder::new(384).embed("hello").unwrap();
        assert_eq!(vec[(head % 384) as usize], 1.0);
    }

    #[test]
    fn test_tokens_split_identifiers() {
        assert_eq!(
            tokens("parseConfig_file(x2)"),
            vec!["parse", "config", "file", "x2"]
        );
        assert_eq!(tokens("HTTPServer"), vec!["httpserver"]);
    }

    #[test]
    fn test_mock_embed_batch() {
        let embedder = MockEmbedder::new(128);
        let results = embedder.embed_batch(&["a", "b", "c"]).unwrap();
        assert_eq!(results.len(), 3);
        for vec in &results {
            assert_eq!(vec.len(), 128);
        }
    }

    #[test]
    fn test_mock_defaults() {
        let embedder = MockEmbedder::default();
        assert_eq!(embedder.dimensions(), 384);
        assert_eq!(embedder.model_id(), "mock");
    }
}
