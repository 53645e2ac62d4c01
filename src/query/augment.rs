use std::sync::Arc;

use tracing::debug;

use super::RetrievedChunk;
use crate::db::store::Index;

/// Widens short hits with the chunk that follows them in the same file.
pub struct Augmenter {
    index: Arc<Index>,
    min_chars: usize,
}

impl Augmenter {
    pub fn new(index: Arc<Index>, min_chars: usize) -> Self {
        Self { index, min_chars }
    }

    /// Same length and order as `results`. A hit shorter than `min_chars`
    /// gets `"\n"` plus its successor's text appended; anything else, or a
    /// failed lookup, passes through untouched.
    pub fn augment(&self, results: Vec<RetrievedChunk>) -> Vec<RetrievedChunk> {
        results.into_iter().map(|hit| self.widen(hit)).collect()
    }

    fn widen(&self, mut hit: RetrievedChunk) -> RetrievedChunk {
        if hit.chunk.text.chars().count() >= self.min_chars {
            return hit;
        }
        let Some(next_id) = hit.chunk.next_id.as_ref() else {
            return hit;
        };

        match self.index.get_chunk(next_id) {
            Ok(Some(next)) => {
                hit.chunk.text.push('\n');
                hit.chunk.text.push_str(&next.text);
            }
            Ok(None) => debug!("Successor {} of {} not found", next_id, hit.chunk.id),
            Err(e) => debug!("Successor lookup for {} failed: {}", hit.chunk.id, e),
        }
        hit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::chunks::tests::chunk;
    use crate::db::models::ChunkId;
    use crate::db::store::{IndexKey, IndexStore};
    use crate::embedder::mock::MockEmbedder;
    use crate::progress::NoProgress;
    use tempfile::tempdir;

    fn hit(c: crate::db::models::Chunk) -> RetrievedChunk {
        RetrievedChunk {
            chunk: c,
            score: 0.5,
        }
    }

    #[test]
    fn test_augment() {
        let dir = tempdir().unwrap();
        let store = IndexStore::new(dir.path());
        let embedder = MockEmbedder::new(16);
        let key = IndexKey::new("repo", "mock");

        let long_text = "x".repeat(200);
        let chunks = vec![
            chunk("a.py", 0, true, "def short():"),
            chunk("a.py", 1, false, "    return successor_body"),
            chunk("b.py", 0, true, &long_text),
            chunk("b.py", 1, false, "tail"),
        ];
        let index = Arc::new(
            store
                .build(&key, &chunks, &embedder, 32, &NoProgress)
                .unwrap(),
        );
        let augmenter = Augmenter::new(index, 150);

        let results = augmenter.augment(vec![
            hit(chunks[0].clone()),
            hit(chunks[1].clone()),
            hit(chunks[2].clone()),
        ]);

        assert_eq!(results.len(), 3);
        // Short with successor: grows by the successor text.
        assert_eq!(results[0].chunk.text, "def short():\n    return successor_body");
        // Short without successor: byte-identical.
        assert_eq!(results[1].chunk.text, chunks[1].text);
        // Long enough already.
        assert_eq!(results[2].chunk.text, long_text);
        assert_eq!(results[0].chunk.id, chunks[0].id);
    }

    #[test]
    fn test_augment_tolerates_missing_successor() {
        let dir = tempdir().unwrap();
        let store = IndexStore::new(dir.path());
        let embedder = MockEmbedder::new(16);
        let key = IndexKey::new("repo", "mock");
        let chunks = vec![chunk("a.py", 0, false, "lonely")];
        let index = Arc::new(
            store
                .build(&key, &chunks, &embedder, 32, &NoProgress)
                .unwrap(),
        );

        let mut orphan = chunks[0].clone();
        orphan.next_id = Some(ChunkId::derive("gone.py", 3));
        let results = Augmenter::new(index, 150).augment(vec![hit(orphan.clone())]);
        assert_eq!(results[0].chunk, orphan);
    }
}
