//! Keyword retrieval over a directory of documentation pages.
//!
//! Pages are split into fixed word windows and ranked by how often the query's
//! terms occur in each window. Good enough for a handful of pages; there is no
//! embedding model involved.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use scraper::{ElementRef, Html, Node};
use tracing::{debug, info};

use crate::tools::{Capability, Tool, ToolError};

pub const CHUNK_WORDS: usize = 120;

const SUPPORTED_EXTENSIONS: [&str; 4] = ["md", "txt", "html", "htm"];

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "do", "does", "for", "from", "how", "i",
    "in", "is", "it", "of", "on", "or", "our", "that", "the", "this", "to", "was", "we", "what",
    "when", "where", "which", "who", "why", "with", "you",
];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DocumentChunk {
    pub source: String,
    pub text: String,
    term_counts: HashMap<String, usize>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScoredChunk<'a> {
    pub chunk: &'a DocumentChunk,
    pub score: usize,
}

#[derive(Clone, Debug, Default)]
pub struct DocumentIndex {
    chunks: Vec<DocumentChunk>,
}

impl DocumentIndex {
    /// Builds an index from `(source name, raw text)` pairs. HTML sources are
    /// stripped of markup first.
    pub fn from_documents<I, S, T>(documents: I) -> Self
    where
        I: IntoIterator<Item = (S, T)>,
        S: Into<String>,
        T: AsRef<str>,
    {
        let mut chunks = Vec::new();
        for (source, raw) in documents {
            let source = source.into();
            let text = if is_html(&source) { strip_html(raw.as_ref()) } else { raw.as_ref().to_owned() };
            chunks.extend(chunk_document(&source, &text));
        }
        Self { chunks }
    }

    pub async fn load_dir(dir: &Path) -> Result<Self, ToolError> {
        let io_error = |path: &Path, error: std::io::Error| ToolError::Io {
            path: path.display().to_string(),
            message: error.to_string(),
        };

        let mut entries = tokio::fs::read_dir(dir).await.map_err(|error| io_error(dir, error))?;
        let mut paths: Vec<PathBuf> = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|error| io_error(dir, error))? {
            let path = entry.path();
            let supported = path
                .extension()
                .and_then(|extension| extension.to_str())
                .map(|extension| SUPPORTED_EXTENSIONS.contains(&extension.to_ascii_lowercase().as_str()))
                .unwrap_or(false);
            if supported {
                paths.push(path);
            }
        }
        paths.sort();

        let mut documents = Vec::with_capacity(paths.len());
        for path in paths {
            let raw =
                tokio::fs::read_to_string(&path).await.map_err(|error| io_error(&path, error))?;
            let source = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            documents.push((source, raw));
        }

        let index = Self::from_documents(documents);
        info!(
            event_name = "agent.docs.index.loaded",
            docs_dir = %dir.display(),
            chunk_count = index.len(),
            "documentation index loaded"
        );
        Ok(index)
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Returns up to `top_k` chunks with a non-zero score, best first. Ties keep
    /// document order.
    pub fn search(&self, query: &str, top_k: usize) -> Vec<ScoredChunk<'_>> {
        let mut terms = tokenize(query);
        terms.sort();
        terms.dedup();
        if terms.is_empty() {
            return Vec::new();
        }

        let mut scored: Vec<_> = self
            .chunks
            .iter()
            .map(|chunk| {
                let score = terms
                    .iter()
                    .map(|term| chunk.term_counts.get(term).copied().unwrap_or(0))
                    .sum();
                ScoredChunk { chunk, score }
            })
            .filter(|scored| scored.score > 0)
            .collect();

        scored.sort_by(|left, right| right.score.cmp(&left.score));
        scored.truncate(top_k);
        scored
    }
}

fn chunk_document(source: &str, text: &str) -> Vec<DocumentChunk> {
    let words: Vec<&str> = text.split_whitespace().collect();
    words
        .chunks(CHUNK_WORDS)
        .map(|window| {
            let text = window.join(" ");
            let mut term_counts = HashMap::new();
            for term in tokenize(&text) {
                *term_counts.entry(term).or_insert(0) += 1;
            }
            DocumentChunk { source: source.to_owned(), text, term_counts }
        })
        .collect()
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|ch: char| !ch.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
        .filter(|token| !STOPWORDS.contains(&token.as_str()))
        .collect()
}

fn is_html(source: &str) -> bool {
    let lower = source.to_ascii_lowercase();
    lower.ends_with(".html") || lower.ends_with(".htm")
}

/// Visible text of an HTML page with `<script>`/`<style>` bodies dropped and
/// whitespace collapsed. Entities are decoded by the parser.
pub fn strip_html(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    let mut text = String::with_capacity(html.len());
    collect_text(fragment.root_element(), &mut text);
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn collect_text(element: ElementRef<'_>, output: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => output.push_str(text),
            Node::Element(inner) => {
                if matches!(inner.name(), "script" | "style" | "noscript") {
                    continue;
                }
                let Some(element) = ElementRef::wrap(child) else {
                    continue;
                };
                let block = matches!(
                    inner.name(),
                    "p" | "div" | "section" | "article" | "h1" | "h2" | "h3" | "h4" | "h5" | "h6"
                        | "li" | "br" | "tr" | "td" | "pre" | "title"
                );
                if block {
                    output.push(' ');
                }
                collect_text(element, output);
                if block {
                    output.push(' ');
                }
            }
            _ => {}
        }
    }
}

pub struct DocsQueryTool {
    index: Arc<DocumentIndex>,
    top_k: usize,
}

impl DocsQueryTool {
    pub fn new(index: Arc<DocumentIndex>, top_k: usize) -> Self {
        Self { index, top_k }
    }
}

#[async_trait]
impl Tool for DocsQueryTool {
    fn capability(&self) -> Capability {
        Capability::DocsQuery
    }

    async fn run(&self, input: &str) -> Result<String, ToolError> {
        let query = input.trim();
        if query.is_empty() {
            return Err(ToolError::EmptyInput);
        }

        let hits = self.index.search(query, self.top_k);
        debug!(event_name = "agent.tool.docs_query.completed", hit_count = hits.len(), "docs searched");

        if hits.is_empty() {
            return Ok(format!("No documentation matched `{query}`."));
        }
        Ok(hits
            .iter()
            .map(|hit| format!("[{}] {}", hit.chunk.source, hit.chunk.text))
            .collect::<Vec<_>>()
            .join("\n\n"))
    }
}
