use crate::vector_index::SparseVector;
use crate::DocId;
use serde::Serialize;
use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Neighbor {
    pub document_id: DocId,
    pub score: f32,
}

/// Cosine similarity in [0, 1]. Zero when either side is all-zero.
///
/// Both vectors are sorted by term, so the dot product is a merge join and
/// the summation order does not depend on argument order.
pub fn cosine(a: &SparseVector, b: &SparseVector) -> f32 {
    if a.is_zero() || b.is_zero() {
        return 0.0;
    }
    let (ea, eb) = (a.entries(), b.entries());
    let (mut i, mut j) = (0, 0);
    let mut dot = 0.0f64;
    while i < ea.len() && j < eb.len() {
        match ea[i].0.cmp(&eb[j].0) {
            Ordering::Less => i += 1,
            Ordering::Greater => j += 1,
            Ordering::Equal => {
                dot += ea[i].1 as f64 * eb[j].1 as f64;
                i += 1;
                j += 1;
            }
        }
    }
    let denom = a.norm() as f64 * b.norm() as f64;
    if denom == 0.0 {
        return 0.0;
    }
    (dot / denom).clamp(0.0, 1.0) as f32
}

/// Score descending, then document id ascending.
pub fn by_score_then_id(a: &Neighbor, b: &Neighbor) -> Ordering {
    b.score
        .partial_cmp(&a.score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.document_id.cmp(&b.document_id))
}

/// Cosine of `target` against every candidate except `exclude`, unfiltered,
/// sorted with [`by_score_then_id`].
pub fn score_all<'a, I>(target: &SparseVector, candidates: I, exclude: Option<&str>) -> Vec<Neighbor>
where
    I: IntoIterator<Item = (&'a DocId, &'a SparseVector)>,
{
    let mut scored: Vec<Neighbor> = candidates
        .into_iter()
        .filter(|(id, _)| Some(id.as_str()) != exclude)
        .map(|(id, v)| Neighbor { document_id: id.clone(), score: cosine(target, v) })
        .collect();
    scored.sort_by(by_score_then_id);
    scored
}

/// Rank `candidates` by cosine to `target`, dropping anything under
/// `threshold` and the `exclude` id, keeping at most `top_k`.
///
/// Documents sharing no weighted term with `target` (score 0) are never
/// neighbors, even with a zero threshold.
pub fn rank_similar<'a, I>(
    target: &SparseVector,
    candidates: I,
    exclude: Option<&str>,
    top_k: usize,
    threshold: f32,
) -> Vec<Neighbor>
where
    I: IntoIterator<Item = (&'a DocId, &'a SparseVector)>,
{
    let mut ranked = score_all(target, candidates, exclude);
    ranked.retain(|n| n.score > 0.0 && n.score >= threshold);
    ranked.truncate(top_k);
    ranked
}
