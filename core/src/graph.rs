//! Corpus-wide similarity graph.
//!
//! Every document is compared with every other one, so construction is
//! quadratic in the corpus size. That is fine for a personal knowledge base
//! (hundreds to low thousands of items); above the configured pair budget
//! the caller is told instead of getting a silently truncated graph.

use crate::interrupt::Interrupt;
use crate::similarity::rank_similar;
use crate::vector_index::VectorIndex;
use crate::{DocId, EngineError, Result};
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarityEdge {
    pub source: DocId,
    pub target: DocId,
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GraphWarning {
    CorpusTooLarge { documents: usize, pairs: u64, budget: u64 },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Graph {
    pub nodes: Vec<DocId>,
    pub edges: Vec<SimilarityEdge>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<GraphWarning>,
}

#[derive(Debug, Clone, Copy)]
pub struct GraphParams {
    pub top_k: usize,
    pub threshold: f32,
    pub pair_budget: u64,
    pub enforce_budget: bool,
}

pub fn pair_count(documents: usize) -> u64 {
    let n = documents as u64;
    n.saturating_mul(n.saturating_sub(1)) / 2
}

pub fn build_graph(index: &VectorIndex, params: GraphParams, interrupt: &Interrupt) -> Result<Graph> {
    let documents = index.len();
    let pairs = pair_count(documents);
    let mut warning = None;
    if pairs > params.pair_budget {
        if params.enforce_budget {
            return Err(EngineError::CorpusTooLarge { documents, pairs, budget: params.pair_budget });
        }
        tracing::warn!(documents, pairs, budget = params.pair_budget, "graph construction exceeds pair budget");
        warning = Some(GraphWarning::CorpusTooLarge { documents, pairs, budget: params.pair_budget });
    }

    let mut nodes: Vec<DocId> = index.ids().cloned().collect();
    nodes.sort();

    // Keyed by (smaller id, larger id); both directions land on the same key.
    let mut best: HashMap<(DocId, DocId), f32> = HashMap::new();
    for id in &nodes {
        interrupt.check()?;
        let vector = index.vector_of(id)?;
        for n in rank_similar(vector, index.vectors(), Some(id.as_str()), params.top_k, params.threshold) {
            let key = if *id < n.document_id {
                (id.clone(), n.document_id)
            } else {
                (n.document_id, id.clone())
            };
            let slot = best.entry(key).or_insert(n.score);
            if n.score > *slot {
                *slot = n.score;
            }
        }
    }

    let mut edges: Vec<SimilarityEdge> = best
        .into_iter()
        .map(|((source, target), score)| SimilarityEdge { source, target, score })
        .collect();
    edges.sort_by(|a, b| a.source.cmp(&b.source).then_with(|| a.target.cmp(&b.target)));
    tracing::info!(nodes = nodes.len(), edges = edges.len(), "similarity graph built");
    Ok(Graph { nodes, edges, warning })
}
