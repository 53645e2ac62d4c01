//! Language-aware, line-windowed code chunker.
//!
//! A file is cut into windows of at most `chunk_lines` lines and
//! `max_chars` characters; consecutive windows share `chunk_lines_overlap`
//! lines. For languages with a tree-sitter grammar, a window that would cut
//! through the middle of a definition ends at the start of the last
//! definition it contains instead. Lines longer than `max_chars` are
//! force-split before windowing.

use std::collections::{BTreeSet, HashMap, HashSet};

use thiserror::Error;
use tracing::debug;
use tree_sitter::{Node, Parser, Query, QueryCursor, StreamingIterator};

use super::languages::{Language, LanguageConfig};
use super::{FileProcessingError, SourceFile};
use crate::config::ChunkingConfig;
use crate::db::models::{Chunk, ChunkId};

#[derive(Error, Debug)]
pub enum ChunkerError {
    #[error("invalid definition query for {language}: {source}")]
    Query {
        language: Language,
        #[source]
        source: tree_sitter::QueryError,
    },
}

struct Structural {
    grammar: tree_sitter::Language,
    query: Query,
}

/// Splits source files into chunks. Shareable across threads; every call
/// to [`Chunker::split`] uses its own parser.
pub struct Chunker {
    params: ChunkingConfig,
    structural: HashMap<Language, Structural>,
}

/// One physical line, or one piece of a line longer than `max_chars`.
#[derive(Debug, Clone, Copy)]
struct Piece<'a> {
    text: &'a str,
    row: usize,
    chars: usize,
}

struct Span {
    text: String,
    start_line: usize,
    end_line: usize,
}

impl Chunker {
    pub fn new(params: &ChunkingConfig) -> Result<Self, ChunkerError> {
        let mut structural = HashMap::new();
        for config in LanguageConfig::get_all() {
            let query = Query::new(&config.grammar, config.query).map_err(|source| {
                ChunkerError::Query {
                    language: config.language,
                    source,
                }
            })?;
            structural.insert(
                config.language,
                Structural {
                    grammar: config.grammar,
                    query,
                },
            );
        }

        Ok(Self {
            params: params.clone(),
            structural,
        })
    }

    /// Split one file into ordered, linked chunks.
    pub fn split(&self, file: &SourceFile) -> Result<Vec<Chunk>, FileProcessingError> {
        let pieces = split_pieces(&file.content, self.params.max_chars.max(1));
        if pieces.is_empty() {
            return Ok(Vec::new());
        }

        let rows = match self.structural.get(&file.language) {
            Some(structural) => boundary_rows(structural, file)?,
            None => BTreeSet::new(),
        };

        // A boundary is the first piece of a row where a definition starts.
        let boundaries: HashSet<usize> = pieces
            .iter()
            .enumerate()
            .filter(|(i, p)| {
                rows.contains(&p.row) && (*i == 0 || pieces[i - 1].row != p.row)
            })
            .map(|(i, _)| i)
            .collect();

        let mut spans = Vec::new();
        let mut last_covered: Option<usize> = None;
        for (start, end) in plan_windows(&pieces, &boundaries, &self.params) {
            let Some((span, last_piece)) = to_span(&pieces[start..end], start) else {
                continue;
            };
            // Skip windows whose content was already fully emitted.
            if last_covered.is_some_and(|covered| last_piece <= covered) {
                continue;
            }
            last_covered = Some(last_piece);
            spans.push(span);
        }

        Ok(link(&file.path, file.language, spans))
    }
}

/// Start rows of every top-level node and every captured definition.
fn boundary_rows(
    structural: &Structural,
    file: &SourceFile,
) -> Result<BTreeSet<usize>, FileProcessingError> {
    let mut parser = Parser::new();
    parser
        .set_language(&structural.grammar)
        .map_err(|e| FileProcessingError::Chunk {
            path: file.path.clone(),
            reason: e.to_string(),
        })?;

    let source = file.content.as_bytes();
    let Some(tree) = parser.parse(source, None) else {
        debug!("No parse tree for {}, using line windows", file.path);
        return Ok(BTreeSet::new());
    };

    let root = tree.root_node();
    let mut cursor = root.walk();
    if root.children(&mut cursor).next().is_some_and(|n| n.is_error()) {
        debug!("{} does not parse as {}, using line windows", file.path, file.language);
        return Ok(BTreeSet::new());
    }

    let mut rows = BTreeSet::new();
    let mut cursor = root.walk();
    for child in root.named_children(&mut cursor) {
        rows.insert(unit_start_row(child));
    }

    let names = structural.query.capture_names();
    let mut query_cursor = QueryCursor::new();
    let mut matches = query_cursor.matches(&structural.query, root, source);
    while let Some(m) = matches.next() {
        for cap in m.captures {
            if names[cap.index as usize] != "name" {
                rows.insert(unit_start_row(cap.node));
            }
        }
    }

    Ok(rows)
}

/// Row where a definition starts, pulling in comments directly above it.
fn unit_start_row(node: Node) -> usize {
    let mut start = node.start_position().row;
    let mut prev = node.prev_sibling();
    while let Some(p) = prev {
        let own_line = p
            .prev_sibling()
            .is_none_or(|pp| pp.end_position().row < p.start_position().row);
        if p.kind().contains("comment") && own_line && p.end_position().row + 1 >= start {
            start = p.start_position().row;
            prev = p.prev_sibling();
        } else {
            break;
        }
    }
    start
}

fn split_pieces(content: &str, max_chars: usize) -> Vec<Piece<'_>> {
    let mut pieces = Vec::new();
    for (row, line) in content.split_inclusive('\n').enumerate() {
        let chars = line.chars().count();
        if chars <= max_chars {
            pieces.push(Piece {
                text: line,
                row,
                chars,
            });
            continue;
        }

        let mut rest = line;
        while !rest.is_empty() {
            let cut = rest
                .char_indices()
                .nth(max_chars)
                .map(|(i, _)| i)
                .unwrap_or(rest.len());
            let (head, tail) = rest.split_at(cut);
            pieces.push(Piece {
                text: head,
                row,
                chars: head.chars().count(),
            });
            rest = tail;
        }
    }
    pieces
}

/// Half-open piece ranges, in order.
fn plan_windows(
    pieces: &[Piece<'_>],
    boundaries: &HashSet<usize>,
    params: &ChunkingConfig,
) -> Vec<(usize, usize)> {
    let n = pieces.len();
    let max_lines = params.chunk_lines.max(1);
    let overlap = params.chunk_lines_overlap.min(max_lines - 1);

    let mut windows = Vec::new();
    let mut start = 0;
    while start < n {
        let mut end = start;
        let mut chars = 0;
        while end < n && end - start < max_lines && chars + pieces[end].chars <= params.max_chars
        {
            chars += pieces[end].chars;
            end += 1;
        }
        if end == start {
            end = start + 1;
        }

        if end < n {
            if let Some(b) = (start + overlap + 1..=end)
                .rev()
                .find(|i| boundaries.contains(i))
            {
                end = b;
            }
        }

        windows.push((start, end));
        if end >= n {
            break;
        }
        // Short char-bound windows share at most half their lines.
        let shared = overlap.min((end - start) / 2);
        start = (end - shared).max(start + 1);
    }
    windows
}

/// Drop blank lines at both ends; `None` for a blank window. Also returns
/// the absolute index of the last non-blank piece.
fn to_span(window: &[Piece<'_>], offset: usize) -> Option<(Span, usize)> {
    let first = window.iter().position(|p| !p.text.trim().is_empty())?;
    let last = window.iter().rposition(|p| !p.text.trim().is_empty())?;
    let text: String = window[first..=last].iter().map(|p| p.text).collect();
    let span = Span {
        text: text.trim_end().to_string(),
        start_line: window[first].row + 1,
        end_line: window[last].row + 1,
    };
    Some((span, offset + last))
}

fn link(path: &str, language: Language, spans: Vec<Span>) -> Vec<Chunk> {
    let count = spans.len();
    spans
        .into_iter()
        .enumerate()
        .map(|(ordinal, span)| Chunk {
            id: ChunkId::derive(path, ordinal),
            file_path: path.to_string(),
            language: language.tag().to_string(),
            ordinal,
            next_id: (ordinal + 1 < count).then(|| ChunkId::derive(path, ordinal + 1)),
            start_line: span.start_line,
            end_line: span.end_line,
            text: span.text,
        })
        .collect()
}
