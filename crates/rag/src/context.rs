//! Context Expander
//!
//! Widens fused retrieval results to other chunks of the same source
//! documents, then renders them into the context block handed to the
//! response generator.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use ragchat_core::{DocumentChunk, FusedChunk, VectorSearch};

/// Expand fused chunks with corpus chunks sharing a `doc_id`.
///
/// Every fused chunk is emitted. Documents are visited in fused order and,
/// within a document, corpus order is kept. Hits missing from the corpus
/// follow their document's corpus chunks. Only the added siblings count
/// against `limit`, and each document gets an even share of it.
pub fn expand_related(
    fused: &[FusedChunk],
    corpus: &[DocumentChunk],
    limit: usize,
) -> Vec<DocumentChunk> {
    let mut by_doc: HashMap<&str, Vec<&DocumentChunk>> = HashMap::new();
    for chunk in corpus {
        if let Some(doc_id) = chunk.doc_id.as_deref() {
            by_doc.entry(doc_id).or_default().push(chunk);
        }
    }

    let mut hits_by_doc: HashMap<&str, Vec<&DocumentChunk>> = HashMap::new();
    for f in fused {
        if let Some(doc_id) = f.chunk.doc_id.as_deref() {
            hits_by_doc.entry(doc_id).or_default().push(&f.chunk);
        }
    }
    let hit_ids: HashSet<&str> = fused.iter().map(|f| f.chunk.identity()).collect();

    let per_doc = if hits_by_doc.is_empty() {
        0
    } else {
        limit.div_ceil(hits_by_doc.len())
    };

    let mut seen_docs: HashSet<&str> = HashSet::new();
    let mut seen_chunks: HashSet<String> = HashSet::new();
    let mut expanded = Vec::new();
    let mut extras = 0;

    let mut push = |chunk: &DocumentChunk, expanded: &mut Vec<DocumentChunk>| -> bool {
        if seen_chunks.insert(chunk.identity().to_string()) {
            expanded.push(chunk.clone());
            true
        } else {
            false
        }
    };

    for fused_chunk in fused {
        let doc_id = match fused_chunk.chunk.doc_id.as_deref() {
            Some(doc_id) => doc_id,
            None => {
                push(&fused_chunk.chunk, &mut expanded);
                continue;
            }
        };
        if !seen_docs.insert(doc_id) {
            continue;
        }

        let mut doc_extras = 0;
        for sibling in by_doc.get(doc_id).map(Vec::as_slice).unwrap_or_default() {
            if hit_ids.contains(sibling.identity()) {
                push(sibling, &mut expanded);
            } else if doc_extras < per_doc && extras < limit && push(sibling, &mut expanded) {
                doc_extras += 1;
                extras += 1;
            }
        }
        // Hits the corpus lookup did not return (request-supplied or cut off)
        for hit in hits_by_doc.get(doc_id).map(Vec::as_slice).unwrap_or_default() {
            push(hit, &mut expanded);
        }
    }

    expanded
}

/// Render chunks as the retrieved-context block
pub fn format_context(chunks: &[DocumentChunk]) -> String {
    chunks
        .iter()
        .map(|c| c.content.trim())
        .filter(|c| !c.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Looks up sibling chunks through the vector search capability
pub struct ContextExpander {
    search: Option<Arc<dyn VectorSearch>>,
    limit: usize,
    timeout: Duration,
}

impl ContextExpander {
    pub fn new(search: Option<Arc<dyn VectorSearch>>, limit: usize, timeout: Duration) -> Self {
        Self {
            search,
            limit,
            timeout,
        }
    }

    /// Expand fused results.
    ///
    /// A failed or timed out corpus lookup is logged and the fused chunks are
    /// used as they are.
    pub async fn expand(&self, fused: &[FusedChunk]) -> Vec<DocumentChunk> {
        let fallback = || fused.iter().map(|f| f.chunk.clone()).collect::<Vec<_>>();

        let search = match &self.search {
            Some(search) => search,
            None => return fallback(),
        };

        let mut doc_ids: Vec<String> = Vec::new();
        for f in fused {
            if let Some(doc_id) = &f.chunk.doc_id {
                if !doc_ids.contains(doc_id) {
                    doc_ids.push(doc_id.clone());
                }
            }
        }
        if doc_ids.is_empty() {
            return fallback();
        }

        match tokio::time::timeout(self.timeout, search.chunks_for_documents(&doc_ids)).await {
            Ok(Ok(corpus)) => {
                let expanded = expand_related(fused, &corpus, self.limit);
                tracing::debug!(
                    documents = doc_ids.len(),
                    fused = fused.len(),
                    expanded = expanded.len(),
                    "Expanded context"
                );
                expanded
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Context expansion failed, using fused chunks");
                fallback()
            }
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Context expansion timed out, using fused chunks"
                );
                fallback()
            }
        }
    }
}
