//! Section-aware document chunker.
//!
//! Turns a bibliographic item (title, optional abstract, optional extracted
//! full text) into a small, bounded set of [`Chunk`]s whose embeddings
//! together give high recall over the document:
//!
//! - Chunk 0 is always the **summary** (title + abstract, or title alone).
//! - In `full` mode the body is split at the first findings-style heading
//!   into a **methods** prefix and a **findings** suffix; without such a
//!   heading the whole body becomes a single **content** section.
//! - Each section is packed into chunks at paragraph boundaries under a
//!   token budget, falling back to sentence boundaries for oversize
//!   paragraphs.
//!
//! Semantic purpose dominates locality here: a query like "how did they
//! evaluate X" must land on a methods chunk, not on the abstract. Fixed-size
//! windowing would mix sections and dilute similarity.
//!
//! Chunking is fully deterministic: the same inputs always produce the same
//! chunk sequence.

use regex::Regex;
use std::sync::LazyLock;

use crate::models::{Chunk, ChunkKind};

/// Indexing depth: summary-only, or summary plus section chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexingMode {
    Abstract,
    Full,
}

impl IndexingMode {
    pub fn parse(s: &str) -> Option<IndexingMode> {
        match s {
            "abstract" => Some(IndexingMode::Abstract),
            "full" => Some(IndexingMode::Full),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            IndexingMode::Abstract => "abstract",
            IndexingMode::Full => "full",
        }
    }
}

/// Chunker budgets.
#[derive(Debug, Clone)]
pub struct ChunkOptions {
    /// Token cap per chunk, title prefix included.
    pub max_tokens: usize,
    /// Global chunk cap per item, summary included.
    pub max_chunks: usize,
}

impl Default for ChunkOptions {
    fn default() -> Self {
        Self {
            max_tokens: 2000,
            max_chunks: 8,
        }
    }
}

/// Titles longer than this are truncated with an ellipsis.
const MAX_TITLE_CHARS: usize = 300;
/// Abstracts at or below this length are not worth a chunk of their own.
const MIN_ABSTRACT_CHARS: usize = 50;
/// Full texts below this length add nothing over the summary chunk.
const MIN_FULLTEXT_CHARS: usize = 500;
/// A section boundary this close to the start is a table of contents, not a
/// heading.
const MIN_BOUNDARY_OFFSET: usize = 500;
/// Sections at or below this length are dropped.
const MIN_SECTION_CHARS: usize = 300;
/// Paragraphs shorter than this are merged into the following paragraph.
const MIN_PARAGRAPH_CHARS: usize = 50;
/// Slack subtracted from the budget to absorb joins and rounding.
const TITLE_BUDGET_SLACK: usize = 10;

/// Findings-style heading at the start of a line, with optional numbering
/// (`3.`, `IV)`, `1.2`).
static FINDINGS_HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?im)^[ \t]{0,3}(?:(?:\d+(?:\.\d+)*|[ivxlcdm]+)[.):]?\s+)?(?:results|findings|evaluation|experiments|analysis|discussion|implications|conclusions?|summary|limitations|future\s+work|recommendations)\b",
    )
    .expect("findings heading regex")
});

static PARAGRAPH_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\s*\n").expect("paragraph break regex"));

/// Estimate the token count of a text for the expected embedder family:
/// `ceil(1.3 × words)`, words being whitespace-separated. Deliberately
/// conservative.
pub fn estimate_tokens(text: &str) -> usize {
    let words = text.split_whitespace().count();
    (words as f64 * 1.3).ceil() as usize
}

/// Chunk one item. Returns at least the summary chunk and never more than
/// `opts.max_chunks` chunks, ordered summary, then methods, then findings
/// (or content when no section boundary was found).
pub fn chunk_item(
    title: &str,
    abstract_text: Option<&str>,
    fulltext: Option<&str>,
    mode: IndexingMode,
    opts: &ChunkOptions,
) -> Vec<Chunk> {
    let prefix = title_prefix(title);

    let summary_text = match abstract_text {
        Some(a) if a.len() > MIN_ABSTRACT_CHARS => format!("{}\n\n{}", prefix, a),
        _ => prefix.clone(),
    };
    let mut chunks = vec![Chunk {
        index: 0,
        kind: ChunkKind::Summary,
        estimated_tokens: estimate_tokens(&summary_text),
        text: summary_text,
    }];

    if mode == IndexingMode::Abstract {
        return chunks;
    }
    let Some(fulltext) = fulltext else {
        return chunks;
    };
    if fulltext.len() < MIN_FULLTEXT_CHARS {
        return chunks;
    }

    let sections: Vec<(ChunkKind, &str)> = match find_section_boundary(fulltext) {
        Some(pos) => {
            let mut sections = Vec::new();
            let methods = &fulltext[..pos];
            let findings = &fulltext[pos..];
            if methods.len() > MIN_SECTION_CHARS {
                sections.push((ChunkKind::Methods, methods));
            }
            if findings.len() > MIN_SECTION_CHARS {
                sections.push((ChunkKind::Findings, findings));
            }
            sections
        }
        None => vec![(ChunkKind::Content, fulltext)],
    };

    let budget = opts
        .max_tokens
        .saturating_sub(estimate_tokens(&prefix) + TITLE_BUDGET_SLACK);
    if budget == 0 {
        // Pathological title: no room left for body text.
        return chunks;
    }

    'sections: for (kind, section_text) in sections {
        for body in split_section(section_text, budget) {
            if chunks.len() >= opts.max_chunks {
                break 'sections;
            }
            let text = format!("{}\n\n{}", prefix, body);
            chunks.push(Chunk {
                index: chunks.len(),
                kind,
                estimated_tokens: estimate_tokens(&text),
                text,
            });
        }
    }

    chunks
}

fn title_prefix(title: &str) -> String {
    if title.chars().count() > MAX_TITLE_CHARS {
        let end = title
            .char_indices()
            .nth(MAX_TITLE_CHARS)
            .map(|(i, _)| i)
            .unwrap_or(title.len());
        format!("{}...", &title[..end])
    } else {
        title.to_string()
    }
}

/// Byte offset of the first findings-style heading far enough into the text
/// to be a real section boundary.
fn find_section_boundary(fulltext: &str) -> Option<usize> {
    FINDINGS_HEADING
        .find_iter(fulltext)
        .find(|m| m.start() >= MIN_BOUNDARY_OFFSET)
        .map(|m| m.start())
}

/// Split one section body into pieces whose token estimate stays within
/// `budget`. Splits at paragraph boundaries; a paragraph that alone exceeds
/// the budget is split at sentence boundaries.
fn split_section(text: &str, budget: usize) -> Vec<String> {
    let paragraphs = merge_short_paragraphs(text);

    let mut pieces = Vec::new();
    let mut buf = String::new();
    let mut buf_tokens = 0usize;

    for para in paragraphs {
        let para_tokens = estimate_tokens(&para);

        if para_tokens > budget {
            if !buf.is_empty() {
                pieces.push(std::mem::take(&mut buf));
                buf_tokens = 0;
            }
            pieces.extend(split_oversize_paragraph(&para, budget));
            continue;
        }

        if !buf.is_empty() && buf_tokens + para_tokens > budget {
            pieces.push(std::mem::take(&mut buf));
            buf_tokens = 0;
        }
        if !buf.is_empty() {
            buf.push_str("\n\n");
        }
        buf.push_str(&para);
        buf_tokens += para_tokens;
    }

    if !buf.is_empty() {
        pieces.push(buf);
    }
    pieces
}

/// Paragraphs split on runs of two or more newlines; paragraphs shorter
/// than [`MIN_PARAGRAPH_CHARS`] are merged into the following one.
fn merge_short_paragraphs(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut carry = String::new();

    for part in PARAGRAPH_BREAK.split(text) {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        if !carry.is_empty() {
            carry.push_str("\n\n");
        }
        carry.push_str(part);
        if carry.len() >= MIN_PARAGRAPH_CHARS {
            out.push(std::mem::take(&mut carry));
        }
    }
    // A trailing short paragraph has nothing to merge into.
    if !carry.is_empty() {
        out.push(carry);
    }
    out
}

/// Sentence-boundary split for paragraphs that exceed the budget on their
/// own. A single sentence over the budget is hard-split at word boundaries
/// so the token bound always holds.
fn split_oversize_paragraph(para: &str, budget: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut buf = String::new();
    let mut buf_tokens = 0usize;

    for sentence in split_sentences(para) {
        let tokens = estimate_tokens(&sentence);

        if tokens > budget {
            if !buf.is_empty() {
                pieces.push(std::mem::take(&mut buf));
                buf_tokens = 0;
            }
            pieces.extend(split_words(&sentence, budget));
            continue;
        }

        if !buf.is_empty() && buf_tokens + tokens > budget {
            pieces.push(std::mem::take(&mut buf));
            buf_tokens = 0;
        }
        if !buf.is_empty() {
            buf.push(' ');
        }
        buf.push_str(&sentence);
        buf_tokens += tokens;
    }

    if !buf.is_empty() {
        pieces.push(buf);
    }
    pieces
}

/// Split on `.`, `!`, `?` followed by whitespace (or end of text).
fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        current.push(c);
        if matches!(c, '.' | '!' | '?') && chars.peek().is_none_or(|n| n.is_whitespace()) {
            let trimmed = current.trim();
            if !trimmed.is_empty() {
                sentences.push(trimmed.to_string());
            }
            current.clear();
        }
    }
    let tail = current.trim();
    if !tail.is_empty() {
        sentences.push(tail.to_string());
    }
    sentences
}

fn split_words(text: &str, budget: usize) -> Vec<String> {
    let words_per_piece = std::cmp::max(1, (budget as f64 / 1.3).floor() as usize);
    text.split_whitespace()
        .collect::<Vec<_>>()
        .chunks(words_per_piece)
        .map(|words| words.join(" "))
        .collect()
}
