/// End-to-end integration tests for the retrieval pipeline.
///
/// Tests the complete flow:
///   Fetcher → Filter → Chunker → Embedder → Index → Query → Augment
use coderag::config::{ChunkingConfig, Config};
use coderag::db::IndexError;
use coderag::db::models::Chunk;
use coderag::db::store::{IndexKey, IndexStore};
use coderag::embedder::Embedder;
use coderag::embedder::mock::MockEmbedder;
use coderag::progress::NoProgress;
use coderag::repo::{AcquisitionError, Fetcher};
use coderag::retriever::{IndexedRepo, Retriever, RetrieverError};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;
use tempfile::tempdir;

const LOCATOR: &str = "https://example.com/acme/sample.git";

/// Writes a fixed file tree and counts clones.
struct FixtureFetcher {
    files: Vec<(String, Vec<u8>)>,
    calls: Arc<AtomicUsize>,
}

impl FixtureFetcher {
    fn new(files: Vec<(&str, Vec<u8>)>) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let fetcher = Self {
            files: files
                .into_iter()
                .map(|(path, content)| (path.to_string(), content))
                .collect(),
            calls: Arc::clone(&calls),
        };
        (fetcher, calls)
    }
}

impl Fetcher for FixtureFetcher {
    fn fetch(&self, _locator: &str, dest: &Path) -> Result<(), AcquisitionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        for (path, content) in &self.files {
            let target = dest.join(path);
            fs::create_dir_all(target.parent().unwrap()).unwrap();
            fs::write(target, content).unwrap();
        }
        Ok(())
    }
}

/// Holds the clone open long enough for other builders to queue up.
struct SlowFetcher {
    inner: FixtureFetcher,
    delay: Duration,
}

impl Fetcher for SlowFetcher {
    fn fetch(&self, locator: &str, dest: &Path) -> Result<(), AcquisitionError> {
        thread::sleep(self.delay);
        self.inner.fetch(locator, dest)
    }
}

fn config_for(data_dir: &Path) -> Config {
    Config {
        data_dir: data_dir.to_string_lossy().into_owned(),
        ..Config::default()
    }
}

fn embedder() -> Arc<dyn Embedder> {
    Arc::new(MockEmbedder::new(256))
}

/// A single-chunk Python file, about 700 characters.
fn python_source() -> String {
    let mut src = String::from("def summarize(records):\n");
    for i in 0..24 {
        src.push_str(&format!("    total_{i} = sum(records)\n"));
    }
    src.push_str("    return total_0\n");
    src
}

/// About 2000 characters of Rust, long enough for several chunks.
fn rust_source() -> String {
    let mut src = String::new();
    for i in 0..24 {
        src.push_str(&format!(
            "fn step_{i}(input: u32) -> u32 {{\n    let doubled = input * 2;\n    doubled + {i}\n}}\n\n"
        ));
    }
    src
}

fn sample_tree() -> Vec<(&'static str, Vec<u8>)> {
    vec![
        ("a.py", python_source().into_bytes()),
        ("b.rs", rust_source().into_bytes()),
        ("README.md", b"# Sample\n\nA fixture repository.\n".to_vec()),
        ("requirements.txt", b"numpy==1.26\n".to_vec()),
        ("__pycache__/x.pyc", vec![0x42, 0x0d, 0x0d, 0x0a, 0x00, 0xff]),
    ]
}

/// Every chunk in the index, most similar to an arbitrary query first.
fn all_chunks(repo: &IndexedRepo) -> Vec<Chunk> {
    let query_vec = MockEmbedder::new(256).embed("step input records").unwrap();
    repo.index()
        .nearest(&query_vec, repo.index().len() + 10)
        .unwrap()
        .into_iter()
        .map(|hit| hit.chunk)
        .collect()
}

#[test]
fn test_only_eligible_files_are_indexed() {
    let dir = tempdir().unwrap();
    let (fetcher, _) = FixtureFetcher::new(sample_tree());
    let retriever = Retriever::new(config_for(dir.path()), embedder(), fetcher).unwrap();

    let repo = retriever.build_index(LOCATOR, &NoProgress).unwrap();
    let report = repo.report().unwrap();
    assert_eq!(report.files_seen, 2);
    assert_eq!(report.files_indexed, 2);
    assert!(report.failures.is_empty());

    let chunks = all_chunks(&repo);
    assert_eq!(chunks.len(), report.chunks);
    assert!(chunks.len() >= 3);
    let mut files: Vec<&str> = chunks.iter().map(|c| c.file_path.as_str()).collect();
    files.sort();
    files.dedup();
    assert_eq!(files, vec!["a.py", "b.rs"]);

    for chunk in &chunks {
        assert!(chunk.text.chars().count() <= 1500);
    }
    assert_eq!(repo.readme().as_deref(), Some("# Sample\n\nA fixture repository.\n"));
}

#[test]
fn test_successor_links_resolve() {
    let dir = tempdir().unwrap();
    let (fetcher, _) = FixtureFetcher::new(sample_tree());
    let retriever = Retriever::new(config_for(dir.path()), embedder(), fetcher).unwrap();
    let repo = retriever.build_index(LOCATOR, &NoProgress).unwrap();

    let chunks = all_chunks(&repo);
    let mut linked = 0;
    for chunk in &chunks {
        if let Some(next_id) = &chunk.next_id {
            let next = repo.index().get_chunk(next_id).unwrap().unwrap();
            assert_eq!(next.file_path, chunk.file_path);
            assert_eq!(next.ordinal, chunk.ordinal + 1);
            linked += 1;
        }
    }
    assert!(linked > 0, "b.rs should span more than one chunk");
}

#[test]
fn test_acquire_and_index_once() {
    let dir = tempdir().unwrap();
    let (fetcher, calls) = FixtureFetcher::new(sample_tree());
    let retriever = Retriever::new(config_for(dir.path()), embedder(), fetcher).unwrap();

    let first = retriever.build_index(LOCATOR, &NoProgress).unwrap();
    let second = retriever.build_index(LOCATOR, &NoProgress).unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(first.local_root(), second.local_root());
    assert!(first.report().is_some());
    assert!(second.report().is_none());
}

#[test]
fn test_concurrent_builds_share_one_index() {
    let dir = tempdir().unwrap();
    let (inner, calls) = FixtureFetcher::new(sample_tree());
    let fetcher = SlowFetcher {
        inner,
        delay: Duration::from_millis(200),
    };
    let retriever = Arc::new(Retriever::new(config_for(dir.path()), embedder(), fetcher).unwrap());

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let retriever = Arc::clone(&retriever);
            thread::spawn(move || {
                let repo = retriever.build_index(LOCATOR, &NoProgress).unwrap();
                (repo.report().is_some(), repo.index().len())
            })
        })
        .collect();
    let results: Vec<(bool, usize)> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(results.iter().filter(|(built, _)| *built).count(), 1);
    let len = results[0].1;
    assert!(len > 0);
    assert!(results.iter().all(|(_, l)| *l == len));
}

#[test]
fn test_reload_gives_identical_results() {
    let dir = tempdir().unwrap();
    let query_vec = MockEmbedder::new(256).embed("doubled input step").unwrap();

    let before = {
        let (fetcher, _) = FixtureFetcher::new(sample_tree());
        let retriever = Retriever::new(config_for(dir.path()), embedder(), fetcher).unwrap();
        let repo = retriever.build_index(LOCATOR, &NoProgress).unwrap();
        repo.index().nearest(&query_vec, 5).unwrap()
    };

    // A fresh process-equivalent: new retriever, same data dir.
    let (fetcher, calls) = FixtureFetcher::new(sample_tree());
    let retriever = Retriever::new(config_for(dir.path()), embedder(), fetcher).unwrap();
    let repo = retriever.build_index(LOCATOR, &NoProgress).unwrap();
    assert!(repo.report().is_none());
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let after = repo.index().nearest(&query_vec, 5).unwrap();
    assert_eq!(before, after);
}

#[test]
fn test_nearest_on_small_index() {
    let dir = tempdir().unwrap();
    let (fetcher, _) = FixtureFetcher::new(vec![
        ("one.py", b"def one():\n    return 1\n".to_vec()),
        ("two.rs", b"fn two() -> u8 {\n    2\n}\n".to_vec()),
    ]);
    let retriever = Retriever::new(config_for(dir.path()), embedder(), fetcher).unwrap();
    let repo = retriever.build_index(LOCATOR, &NoProgress).unwrap();

    let query_vec = MockEmbedder::new(256).embed("one").unwrap();
    assert_eq!(repo.index().nearest(&query_vec, 3).unwrap().len(), 2);
    assert_eq!(repo.retrieve("return one").unwrap().len(), 2);
}

#[test]
fn test_relevant_function_ranks_in_top_three() {
    let dir = tempdir().unwrap();
    let mut tree: Vec<(&str, Vec<u8>)> = vec![(
        "config_parser.py",
        b"def parse_configuration_file(path):\n    \"\"\"Parse a configuration file and return its settings.\"\"\"\n    with open(path) as handle:\n        return load_settings(handle.read())\n".to_vec(),
    )];
    let unrelated = [
        ("math_utils.py", "def add_numbers(a, b):\n    return a + b\n"),
        ("geometry.py", "def circle_area(radius):\n    return 3.14159 * radius * radius\n"),
        ("network.go", "package net\n\nfunc Dial(host string) error {\n\treturn nil\n}\n"),
        ("render.ts", "export function drawButton(ctx: Canvas) {\n  ctx.fillRect(0, 0, 10, 10);\n}\n"),
        ("sorting.rs", "fn bubble_sort(items: &mut [i32]) {\n    items.sort();\n}\n"),
        ("timer.js", "function startTimer(ms) {\n  return setTimeout(tick, ms);\n}\n"),
        ("colors.py", "def blend_colors(red, green):\n    return (red + green) / 2\n"),
        ("queue.go", "package queue\n\nfunc Push(q []int, v int) []int {\n\treturn append(q, v)\n}\n"),
        ("greeting.rs", "fn greet(name: &str) -> String {\n    format!(\"hello {name}\")\n}\n"),
    ];
    for (path, src) in unrelated {
        tree.push((path, src.as_bytes().to_vec()));
    }

    let (fetcher, _) = FixtureFetcher::new(tree);
    let retriever = Retriever::new(config_for(dir.path()), embedder(), fetcher).unwrap();
    let repo = retriever.build_index(LOCATOR, &NoProgress).unwrap();
    assert_eq!(repo.index().len(), 10);

    let hits = repo.retrieve("parse configuration file").unwrap();
    assert_eq!(hits.len(), 3);
    assert!(
        hits.iter().any(|h| h.source_file_path == "config_parser.py"),
        "config_parser.py missing from {:?}",
        hits.iter().map(|h| &h.source_file_path).collect::<Vec<_>>()
    );
}

#[test]
fn test_short_hits_are_widened() {
    let dir = tempdir().unwrap();
    let mut config = config_for(dir.path());
    config.chunking = ChunkingConfig {
        chunk_lines: 4,
        chunk_lines_overlap: 1,
        max_chars: 1500,
    };
    config.search_top_k = 50;

    let source: String = ["alpha", "bravo", "charlie", "delta", "echo", "foxtrot", "golf", "hotel", "india", "juliet"]
        .iter()
        .enumerate()
        .map(|(i, word)| format!("{word} = {i}\n"))
        .collect();
    let (fetcher, _) = FixtureFetcher::new(vec![("words.py", source.into_bytes())]);
    let retriever = Retriever::new(config, embedder(), fetcher).unwrap();
    let repo = retriever.build_index(LOCATOR, &NoProgress).unwrap();
    assert!(repo.index().len() >= 3);

    let ranked = repo.search("alpha echo juliet").unwrap();
    let widened = repo.retrieve("alpha echo juliet").unwrap();
    assert_eq!(ranked.len(), widened.len());

    let mut saw_tail = false;
    for (hit, out) in ranked.iter().zip(&widened) {
        assert_eq!(out.source_file_path, hit.chunk.file_path);
        match &hit.chunk.next_id {
            Some(next_id) => {
                let next = repo.index().get_chunk(next_id).unwrap().unwrap();
                assert_eq!(out.text, format!("{}\n{}", hit.chunk.text, next.text));
                assert!(out.text.len() >= hit.chunk.text.len() + next.text.len());
            }
            None => {
                assert_eq!(out.text, hit.chunk.text);
                saw_tail = true;
            }
        }
    }
    assert!(saw_tail);
}

#[test]
fn test_partial_build_is_ignored() {
    let dir = tempdir().unwrap();
    let store = IndexStore::new(dir.path());
    let key = IndexKey::new("sample", "mock");

    fs::create_dir_all(dir.path().join("sample_mock.partial")).unwrap();
    fs::write(dir.path().join("sample_mock.partial").join("index.db"), b"").unwrap();
    assert!(!store.exists(&key));

    // The next build replaces it.
    let (fetcher, _) = FixtureFetcher::new(sample_tree());
    let retriever = Retriever::new(config_for(dir.path()), embedder(), fetcher).unwrap();
    let repo = retriever.build_index(LOCATOR, &NoProgress).unwrap();
    assert!(repo.report().is_some());
    assert!(store.exists(&key));
    assert!(!dir.path().join("sample_mock.partial").exists());
}

#[test]
fn test_corrupted_index_fails_to_load() {
    let dir = tempdir().unwrap();
    {
        let (fetcher, _) = FixtureFetcher::new(sample_tree());
        let retriever = Retriever::new(config_for(dir.path()), embedder(), fetcher).unwrap();
        retriever.build_index(LOCATOR, &NoProgress).unwrap();
    }

    let db_path = dir.path().join("sample_mock").join("index.db");
    let conn = rusqlite::Connection::open(&db_path).unwrap();
    conn.execute(
        "DELETE FROM chunks WHERE id = (SELECT max(id) FROM chunks)",
        [],
    )
    .unwrap();
    drop(conn);

    let (fetcher, _) = FixtureFetcher::new(sample_tree());
    let retriever = Retriever::new(config_for(dir.path()), embedder(), fetcher).unwrap();
    let result = retriever.build_index(LOCATOR, &NoProgress);
    assert!(matches!(
        result,
        Err(RetrieverError::Index(IndexError::Corrupted(_)))
    ));
}
