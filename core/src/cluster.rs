//! Topical grouping of the corpus.
//!
//! k-means over the TF-IDF vectors with `1 - cosine` as the distance and
//! plain means as centroids, seeded with k-means++. When the caller gives no
//! cluster count it is estimated with the elbow or silhouette heuristic.
//! Every group is labelled with its heaviest terms.

use crate::interrupt::Interrupt;
use crate::similarity::cosine;
use crate::vector_index::{SparseVector, VectorIndex};
use crate::{DocId, EngineError, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

pub const DEFAULT_MAX_CLUSTERS: usize = 8;
const MAX_ITERATIONS: usize = 100;
const NAME_TERMS: usize = 3;

/// How the cluster count is picked when none is given.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KEstimate {
    /// Largest bend in the inertia curve, at least 2.
    #[default]
    Elbow,
    /// Best mean silhouette over k in 2..=max_k.
    Silhouette,
}

impl std::str::FromStr for KEstimate {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "elbow" => Ok(KEstimate::Elbow),
            "silhouette" => Ok(KEstimate::Silhouette),
            other => Err(EngineError::InvalidConfig(format!("unknown cluster estimate {other:?}"))),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ClusterParams {
    /// Fixed cluster count; `None` estimates it.
    pub k: Option<usize>,
    pub max_k: usize,
    pub estimate: KEstimate,
    /// Keywords reported per cluster.
    pub keywords: usize,
    pub seed: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TermWeight {
    pub term: String,
    pub weight: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cluster {
    pub name: String,
    pub keywords: Vec<TermWeight>,
    pub document_ids: Vec<DocId>,
    pub size: usize,
}

/// Heaviest TF-IDF terms summed over `doc_ids`, ties by term.
pub fn top_terms<S: AsRef<str>>(index: &VectorIndex, doc_ids: &[S], k: usize) -> Result<Vec<TermWeight>> {
    let mut totals: HashMap<&str, f32> = HashMap::new();
    for id in doc_ids {
        for (term, w) in index.vector_of(id.as_ref())?.entries() {
            *totals.entry(term.as_str()).or_insert(0.0) += *w;
        }
    }
    let mut terms: Vec<TermWeight> = totals
        .into_iter()
        .map(|(term, weight)| TermWeight { term: term.to_string(), weight })
        .collect();
    terms.sort_by(|a, b| {
        b.weight
            .partial_cmp(&a.weight)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.term.cmp(&b.term))
    });
    terms.truncate(k);
    Ok(terms)
}

/// Group every indexed document. Clusters come back largest first; ids
/// within a cluster are sorted. The same seed over the same index gives
/// the same grouping.
pub fn cluster_documents(index: &VectorIndex, params: &ClusterParams, interrupt: &Interrupt) -> Result<Vec<Cluster>> {
    if params.k == Some(0) || params.max_k == 0 {
        return Err(EngineError::InvalidConfig("cluster count must be at least 1".into()));
    }
    let mut entries: Vec<(&DocId, &SparseVector)> = index.vectors().collect();
    if entries.is_empty() {
        return Ok(Vec::new());
    }
    entries.sort_by(|a, b| a.0.cmp(b.0));
    let vectors: Vec<&SparseVector> = entries.iter().map(|(_, v)| *v).collect();

    let mut rng = StdRng::seed_from_u64(params.seed);
    let k = match params.k {
        Some(k) => k,
        None => estimate_k(&vectors, params.max_k, params.estimate, &mut rng, interrupt)?,
    };

    let mut clusters = Vec::new();
    for members in kmeans(&vectors, k, &mut rng, interrupt)? {
        let document_ids: Vec<DocId> = members.iter().map(|&i| entries[i].0.clone()).collect();
        let keywords = top_terms(index, &document_ids, params.keywords.max(NAME_TERMS))?;
        let name = cluster_name(&keywords);
        let mut keywords = keywords;
        keywords.truncate(params.keywords);
        clusters.push(Cluster { name, keywords, size: document_ids.len(), document_ids });
    }
    clusters.sort_by(|a, b| b.size.cmp(&a.size).then_with(|| a.document_ids.cmp(&b.document_ids)));
    tracing::info!(documents = entries.len(), k, clusters = clusters.len(), "corpus clustered");
    Ok(clusters)
}

fn cluster_name(keywords: &[TermWeight]) -> String {
    let parts: Vec<String> = keywords.iter().take(NAME_TERMS).map(|t| capitalize(&t.term)).collect();
    match parts.as_slice() {
        [] => "Unnamed cluster".to_string(),
        [one] => one.clone(),
        [a, b] => format!("{a} & {b}"),
        [a, b, c, ..] => format!("{a}, {b} & {c}"),
    }
}

fn capitalize(term: &str) -> String {
    let mut chars = term.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn distance(a: &SparseVector, b: &SparseVector) -> f64 {
    1.0 - cosine(a, b) as f64
}

fn mean(members: &[&SparseVector]) -> SparseVector {
    let n = members.len() as f32;
    let mut sums: HashMap<&str, f32> = HashMap::new();
    for v in members {
        for (term, w) in v.entries() {
            *sums.entry(term.as_str()).or_insert(0.0) += *w;
        }
    }
    SparseVector::from_weights(sums.into_iter().map(|(t, w)| (t.to_string(), w / n)))
}

fn nearest(v: &SparseVector, centroids: &[SparseVector]) -> usize {
    let mut best = (0, f64::INFINITY);
    for (i, c) in centroids.iter().enumerate() {
        let d = distance(v, c);
        if d < best.1 {
            best = (i, d);
        }
    }
    best.0
}

/// k-means++: each further seed is drawn with probability proportional to
/// its squared distance from the closest seed so far.
fn seed_centroids(vectors: &[&SparseVector], k: usize, rng: &mut StdRng) -> Vec<SparseVector> {
    let n = vectors.len();
    let mut centroids = vec![vectors[rng.random_range(0..n)].clone()];
    while centroids.len() < k {
        let weights: Vec<f64> = vectors
            .iter()
            .map(|v| {
                let d = centroids.iter().map(|c| distance(v, c)).fold(f64::INFINITY, f64::min);
                d * d
            })
            .collect();
        let total: f64 = weights.iter().sum();
        let idx = if total <= 0.0 {
            rng.random_range(0..n)
        } else {
            let r = rng.random::<f64>() * total;
            let mut cumulative = 0.0;
            weights
                .iter()
                .position(|w| {
                    cumulative += w;
                    cumulative >= r
                })
                .unwrap_or(n - 1)
        };
        centroids.push(vectors[idx].clone());
    }
    centroids
}

/// Lloyd iterations until assignments stop changing. Returns member
/// indices per non-empty cluster; fewer vectors than `k` gives singletons.
fn kmeans(vectors: &[&SparseVector], k: usize, rng: &mut StdRng, interrupt: &Interrupt) -> Result<Vec<Vec<usize>>> {
    if vectors.len() < k {
        return Ok((0..vectors.len()).map(|i| vec![i]).collect());
    }
    let mut centroids = seed_centroids(vectors, k, rng);
    let mut assignments: Vec<usize> = Vec::new();
    for _ in 0..MAX_ITERATIONS {
        interrupt.check()?;
        let next: Vec<usize> = vectors.iter().map(|v| nearest(v, &centroids)).collect();
        if next == assignments {
            break;
        }
        assignments = next;
        for (c, centroid) in centroids.iter_mut().enumerate() {
            let members: Vec<&SparseVector> = vectors
                .iter()
                .zip(&assignments)
                .filter(|(_, a)| **a == c)
                .map(|(v, _)| *v)
                .collect();
            if !members.is_empty() {
                *centroid = mean(&members);
            }
        }
    }
    let mut groups = vec![Vec::new(); k];
    for (i, &c) in assignments.iter().enumerate() {
        groups[c].push(i);
    }
    groups.retain(|g| !g.is_empty());
    Ok(groups)
}

fn estimate_k(
    vectors: &[&SparseVector],
    max_k: usize,
    method: KEstimate,
    rng: &mut StdRng,
    interrupt: &Interrupt,
) -> Result<usize> {
    if vectors.len() <= 2 {
        return Ok(1);
    }
    let max_k = max_k.min(vectors.len());
    match method {
        KEstimate::Elbow => elbow(vectors, max_k, rng, interrupt),
        KEstimate::Silhouette => best_silhouette(vectors, max_k, rng, interrupt),
    }
}

fn inertia(vectors: &[&SparseVector], groups: &[Vec<usize>]) -> f64 {
    let mut total = 0.0;
    for group in groups {
        let members: Vec<&SparseVector> = group.iter().map(|&i| vectors[i]).collect();
        let centroid = mean(&members);
        total += members.iter().map(|v| distance(v, &centroid).powi(2)).sum::<f64>();
    }
    total
}

fn elbow(vectors: &[&SparseVector], max_k: usize, rng: &mut StdRng, interrupt: &Interrupt) -> Result<usize> {
    let mut inertias = Vec::with_capacity(max_k);
    for k in 1..=max_k {
        let groups = kmeans(vectors, k, rng, interrupt)?;
        inertias.push(inertia(vectors, &groups));
    }
    if inertias.len() < 3 {
        return Ok(1);
    }
    let (mut best_k, mut max_bend) = (1, 0.0);
    for i in 1..inertias.len() - 1 {
        let bend = (inertias[i - 1] - inertias[i]) - (inertias[i] - inertias[i + 1]);
        if bend > max_bend {
            max_bend = bend;
            best_k = i + 1;
        }
    }
    Ok(best_k.max(2))
}

fn best_silhouette(vectors: &[&SparseVector], max_k: usize, rng: &mut StdRng, interrupt: &Interrupt) -> Result<usize> {
    let (mut best_k, mut best_score) = (2, -1.0);
    for k in 2..=max_k {
        let groups = kmeans(vectors, k, rng, interrupt)?;
        let score = silhouette(vectors, &groups);
        if score > best_score {
            best_score = score;
            best_k = k;
        }
    }
    Ok(best_k)
}

fn silhouette(vectors: &[&SparseVector], groups: &[Vec<usize>]) -> f64 {
    if groups.len() < 2 {
        return 0.0;
    }
    let mut scores = Vec::with_capacity(vectors.len());
    for (g, group) in groups.iter().enumerate() {
        for &i in group {
            if group.len() == 1 {
                scores.push(0.0);
                continue;
            }
            let a = group.iter().filter(|&&j| j != i).map(|&j| distance(vectors[i], vectors[j])).sum::<f64>()
                / (group.len() - 1) as f64;
            let b = groups
                .iter()
                .enumerate()
                .filter(|(o, other)| *o != g && !other.is_empty())
                .map(|(_, other)| {
                    other.iter().map(|&j| distance(vectors[i], vectors[j])).sum::<f64>() / other.len() as f64
                })
                .fold(f64::INFINITY, f64::min);
            let b = if b.is_finite() { b } else { 0.0 };
            let spread = a.max(b);
            scores.push(if spread == 0.0 { 0.0 } else { (b - a) / spread });
        }
    }
    scores.iter().sum::<f64>() / scores.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IdfMode;
    use crate::tokenizer::tokenize;

    fn index(docs: &[(&str, &str)]) -> VectorIndex {
        VectorIndex::build(IdfMode::Standard, docs.iter().map(|(id, t)| (id.to_string(), tokenize(t))))
    }

    fn params(k: Option<usize>, estimate: KEstimate) -> ClusterParams {
        ClusterParams { k, max_k: DEFAULT_MAX_CLUSTERS, estimate, keywords: 5, seed: 7 }
    }

    fn three_topics() -> VectorIndex {
        index(&[
            ("f1", "apple banana"),
            ("f2", "apple banana"),
            ("f3", "apple banana"),
            ("r1", "rust cargo"),
            ("r2", "rust cargo"),
            ("r3", "rust cargo"),
            ("g1", "compost garden"),
            ("g2", "compost garden"),
            ("g3", "compost garden"),
        ])
    }

    fn groups(clusters: &[Cluster]) -> Vec<Vec<&str>> {
        let mut g: Vec<Vec<&str>> =
            clusters.iter().map(|c| c.document_ids.iter().map(String::as_str).collect()).collect();
        g.sort();
        g
    }

    #[test]
    fn fixed_k_separates_disjoint_topics() {
        let idx = index(&[
            ("f1", "apple banana"),
            ("f2", "apple banana"),
            ("r1", "rust cargo"),
            ("r2", "rust cargo"),
            ("r3", "rust cargo"),
        ]);
        let clusters = cluster_documents(&idx, &params(Some(2), KEstimate::Elbow), &Interrupt::none()).unwrap();
        assert_eq!(groups(&clusters), vec![vec!["f1", "f2"], vec!["r1", "r2", "r3"]]);
        assert_eq!(clusters[0].size, 3);
        assert_eq!(clusters[0].name, "Cargo & Rust");
        assert_eq!(clusters[1].keywords.len(), 2);
    }

    #[test]
    fn silhouette_finds_every_topic() {
        let clusters =
            cluster_documents(&three_topics(), &params(None, KEstimate::Silhouette), &Interrupt::none()).unwrap();
        assert_eq!(
            groups(&clusters),
            vec![vec!["f1", "f2", "f3"], vec!["g1", "g2", "g3"], vec!["r1", "r2", "r3"]]
        );
    }

    #[test]
    fn elbow_picks_at_least_two_and_covers_the_corpus() {
        let clusters =
            cluster_documents(&three_topics(), &params(None, KEstimate::Elbow), &Interrupt::none()).unwrap();
        assert!(clusters.len() >= 2);
        assert_eq!(clusters.iter().map(|c| c.size).sum::<usize>(), 9);
        for c in &clusters {
            let topic = &c.document_ids[0][..1];
            assert!(c.document_ids.iter().all(|id| id.starts_with(topic)) || c.size == 6);
        }
    }

    #[test]
    fn same_seed_same_grouping() {
        let idx = three_topics();
        let p = params(Some(3), KEstimate::Elbow);
        let a = cluster_documents(&idx, &p, &Interrupt::none()).unwrap();
        let b = cluster_documents(&idx, &p, &Interrupt::none()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn small_and_degenerate_inputs() {
        let empty = VectorIndex::new(IdfMode::Standard);
        assert!(cluster_documents(&empty, &params(None, KEstimate::Elbow), &Interrupt::none()).unwrap().is_empty());

        let one = index(&[("solo", "lonely document")]);
        let clusters = cluster_documents(&one, &params(None, KEstimate::Elbow), &Interrupt::none()).unwrap();
        assert_eq!(groups(&clusters), vec![vec!["solo"]]);

        let two = index(&[("a", "apple"), ("b", "kiwi")]);
        let clusters = cluster_documents(&two, &params(Some(5), KEstimate::Elbow), &Interrupt::none()).unwrap();
        assert_eq!(groups(&clusters), vec![vec!["a"], vec!["b"]]);

        let err = cluster_documents(&two, &params(Some(0), KEstimate::Elbow), &Interrupt::none()).unwrap_err();
        assert!(matches!(err, EngineError::InvalidConfig(_)));
    }

    #[test]
    fn interrupted_clustering_reports_it() {
        let res = cluster_documents(
            &three_topics(),
            &params(None, KEstimate::Elbow),
            &Interrupt::with_timeout(std::time::Duration::ZERO),
        );
        assert!(matches!(res, Err(EngineError::Interrupted)));
    }

    #[test]
    fn names_join_up_to_three_terms() {
        let tw = |t: &str| TermWeight { term: t.into(), weight: 1.0 };
        assert_eq!(cluster_name(&[]), "Unnamed cluster");
        assert_eq!(cluster_name(&[tw("rust")]), "Rust");
        assert_eq!(cluster_name(&[tw("a1"), tw("b2"), tw("c3"), tw("d4")]), "A1, B2 & C3");
    }
}
