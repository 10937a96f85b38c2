use crate::similarity::rank_similar;
use crate::text_index::TextIndex;
use crate::vector_index::VectorIndex;
use crate::DocId;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;

/// Why a document is in a result list. Exact keyword hits always rank
/// ahead of similarity-only hits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Relevance {
    Exact,
    Related,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub document_id: DocId,
    pub relevance: Relevance,
    pub score: f32,
}

/// Merges keyword hits from the inverted index with nearest neighbors of
/// the query in TF-IDF space.
pub struct SearchOrchestrator<'a> {
    pub text: &'a TextIndex,
    pub vectors: &'a VectorIndex,
    pub threshold: f32,
}

impl<'a> SearchOrchestrator<'a> {
    pub fn new(text: &'a TextIndex, vectors: &'a VectorIndex, threshold: f32) -> Self {
        Self { text, vectors, threshold }
    }

    /// `tokens` must come from the same tokenizer the documents went through.
    pub fn search(&self, tokens: &[String], limit: usize) -> Vec<SearchHit> {
        if tokens.is_empty() || limit == 0 {
            return Vec::new();
        }

        let exact = self.text.query(tokens);
        let max_tf = exact.first().map(|(_, s)| *s).unwrap_or(0).max(1) as f32;
        let mut seen: HashSet<DocId> = HashSet::with_capacity(exact.len());
        let mut hits: Vec<SearchHit> = Vec::with_capacity(exact.len() + limit);
        for (doc_id, tf_sum) in exact {
            seen.insert(doc_id.clone());
            hits.push(SearchHit { document_id: doc_id, relevance: Relevance::Exact, score: tf_sum as f32 / max_tf });
        }

        let query = self.vectors.query_vector(tokens);
        if !query.is_zero() {
            // Ask for enough neighbors that `limit` survive the exact-hit dedup.
            let wanted = limit.saturating_add(seen.len());
            for n in rank_similar(&query, self.vectors.vectors(), None, wanted, self.threshold) {
                if seen.contains(&n.document_id) {
                    continue;
                }
                hits.push(SearchHit { document_id: n.document_id, relevance: Relevance::Related, score: n.score });
            }
        }

        hits.sort_by(order_hits);
        hits.truncate(limit);
        tracing::debug!(terms = tokens.len(), hits = hits.len(), "search");
        hits
    }
}

fn order_hits(a: &SearchHit, b: &SearchHit) -> Ordering {
    a.relevance
        .cmp(&b.relevance)
        .then_with(|| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal))
        .then_with(|| a.document_id.cmp(&b.document_id))
}
