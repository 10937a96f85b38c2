//! Index lifecycle and the read path.
//!
//! `IndexManager` is the only thing that mutates index state. Published state
//! is an `Arc<Snapshot>` behind a read-write lock: readers clone the `Arc`
//! and work lock-free against that snapshot. A single-document mutation is
//! applied in place when no reader holds the current snapshot. Otherwise the
//! snapshot is copied and the copy is mutated and published. The copy costs
//! O(corpus) but happens outside the reader lock, so searches are not blocked
//! by it. Full rebuilds are computed off to the side and swapped in at the end.
//!
//! Reads go through [`SearchHandle`], which has no way to mutate or
//! reinitialize anything. Keyword lookups therefore can never run on a path
//! that also does administrative writes.

use crate::cluster::{self, Cluster, ClusterParams, TermWeight};
use crate::config::EngineConfig;
use crate::graph::{build_graph, Graph, GraphParams};
use crate::interrupt::Interrupt;
use crate::search::{SearchHit, SearchOrchestrator};
use crate::similarity::{cosine, rank_similar, score_all, Neighbor};
use crate::source::DocumentSource;
use crate::text_index::TextIndex;
use crate::tokenizer::Tokenizer;
use crate::vector_index::VectorIndex;
use crate::{DocId, DocMeta, Document, EngineError, Result};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

const DEFAULT_CLUSTER_KEYWORDS: usize = 5;

/// Per-document lifecycle: `Unindexed -> Indexed -> (Updated)* -> Removed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentState {
    Unindexed,
    Indexed,
    Updated,
    Removed,
}

#[derive(Debug, Clone, Default)]
struct Snapshot {
    text: TextIndex,
    vectors: VectorIndex,
    docs: HashMap<DocId, DocMeta>,
    states: HashMap<DocId, DocumentState>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RebuildReport {
    pub indexed: usize,
    pub skipped: usize,
    pub removed: usize,
    pub took_ms: u128,
}

/// Similarity of one document to every other one, unfiltered. Used to
/// answer "why is this item not connected to anything".
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionReport {
    pub document_id: DocId,
    pub term_count: usize,
    pub zero_vector: bool,
    pub threshold: f32,
    pub connected: usize,
    pub scores: Vec<Neighbor>,
}

/// Read-only view over the published index. Cheap to clone and `Send + Sync`.
#[derive(Clone)]
pub struct SearchHandle {
    shared: Arc<RwLock<Arc<Snapshot>>>,
    config: Arc<EngineConfig>,
    tokenizer: Tokenizer,
}

impl SearchHandle {
    fn snapshot(&self) -> Arc<Snapshot> {
        self.shared.read().clone()
    }

    /// Keyword hits first, then documents similar to the query.
    pub fn search(&self, query: &str, limit: usize) -> Vec<SearchHit> {
        let tokens = self.tokenizer.tokenize(query);
        if tokens.is_empty() {
            return Vec::new();
        }
        let snap = self.snapshot();
        SearchOrchestrator::new(&snap.text, &snap.vectors, self.config.similarity_threshold).search(&tokens, limit)
    }

    pub fn find_similar(&self, doc_id: &str, threshold: f32, limit: usize) -> Result<Vec<Neighbor>> {
        let snap = self.snapshot();
        let target = snap.vectors.vector_of(doc_id)?;
        Ok(rank_similar(target, snap.vectors.vectors(), Some(doc_id), limit, threshold))
    }

    pub fn find_similar_default(&self, doc_id: &str) -> Result<Vec<Neighbor>> {
        self.find_similar(doc_id, self.config.similarity_threshold, self.config.neighbor_limit)
    }

    pub fn similarity_score(&self, a: &str, b: &str) -> Result<f32> {
        let snap = self.snapshot();
        Ok(cosine(snap.vectors.vector_of(a)?, snap.vectors.vector_of(b)?))
    }

    pub fn graph(&self) -> Result<Graph> {
        self.graph_with(&Interrupt::none())
    }

    pub fn graph_with(&self, interrupt: &Interrupt) -> Result<Graph> {
        let snap = self.snapshot();
        let params = GraphParams {
            top_k: self.config.neighbor_limit,
            threshold: self.config.similarity_threshold,
            pair_budget: self.config.graph_pair_budget,
            enforce_budget: self.config.enforce_graph_budget,
        };
        build_graph(&snap.vectors, params, interrupt)
    }

    pub fn explain_connections(&self, doc_id: &str) -> Result<ConnectionReport> {
        let snap = self.snapshot();
        let target = snap.vectors.vector_of(doc_id)?;
        let scores = score_all(target, snap.vectors.vectors(), Some(doc_id));
        let threshold = self.config.similarity_threshold;
        let connected = scores.iter().filter(|n| n.score > 0.0 && n.score >= threshold).count();
        Ok(ConnectionReport {
            document_id: doc_id.to_string(),
            term_count: snap.docs.get(doc_id).map(|m| m.term_count).unwrap_or(0),
            zero_vector: target.is_zero(),
            threshold,
            connected,
            scores,
        })
    }

    /// Heaviest TF-IDF terms summed over `doc_ids`; a label for a group of items.
    pub fn top_terms<S: AsRef<str>>(&self, doc_ids: &[S], k: usize) -> Result<Vec<TermWeight>> {
        cluster::top_terms(&self.snapshot().vectors, doc_ids, k)
    }

    /// Group the corpus into `k` topical clusters, or an estimated number
    /// of them when `k` is `None`.
    pub fn clusters(&self, k: Option<usize>) -> Result<Vec<Cluster>> {
        self.clusters_with(k, &Interrupt::none())
    }

    pub fn clusters_with(&self, k: Option<usize>, interrupt: &Interrupt) -> Result<Vec<Cluster>> {
        let snap = self.snapshot();
        let params = ClusterParams {
            k,
            max_k: self.config.max_clusters,
            estimate: self.config.cluster_estimate,
            keywords: DEFAULT_CLUSTER_KEYWORDS,
            seed: self.config.cluster_seed,
        };
        cluster::cluster_documents(&snap.vectors, &params, interrupt)
    }

    pub fn document(&self, doc_id: &str) -> Option<DocMeta> {
        self.snapshot().docs.get(doc_id).cloned()
    }

    pub fn state_of(&self, doc_id: &str) -> DocumentState {
        self.snapshot().states.get(doc_id).copied().unwrap_or(DocumentState::Unindexed)
    }

    pub fn is_stale(&self) -> bool {
        self.snapshot().vectors.is_stale()
    }

    pub fn len(&self) -> usize {
        self.snapshot().docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct IndexManager {
    reader: SearchHandle,
    writer: Mutex<()>,
}

impl IndexManager {
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let tokenizer = config.tokenizer();
        let snapshot = Snapshot { vectors: VectorIndex::new(config.idf_mode), ..Snapshot::default() };
        Ok(Self {
            reader: SearchHandle {
                shared: Arc::new(RwLock::new(Arc::new(snapshot))),
                config: Arc::new(config),
                tokenizer,
            },
            writer: Mutex::new(()),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.reader.config
    }

    /// A handle for the query side. It stays valid across rebuilds.
    pub fn reader(&self) -> SearchHandle {
        self.reader.clone()
    }

    pub fn on_created(&self, doc: &Document) -> Result<DocumentState> {
        self.upsert(doc)
    }

    pub fn on_updated(&self, doc: &Document) -> Result<DocumentState> {
        self.upsert(doc)
    }

    /// Purge a document. Unknown ids are a no-op and return `false`.
    pub fn on_deleted(&self, doc_id: &str) -> Result<bool> {
        if doc_id.trim().is_empty() {
            return Err(EngineError::InvalidDocument("empty document id".into()));
        }
        let _w = self.writer.lock();
        if !self.reader.snapshot().docs.contains_key(doc_id) {
            return Ok(false);
        }
        self.mutate(|snap| {
            snap.text.remove(doc_id);
            snap.vectors.remove(doc_id);
            snap.docs.remove(doc_id);
            snap.states.insert(doc_id.to_string(), DocumentState::Removed);
        });
        tracing::debug!(doc_id, "document removed");
        Ok(true)
    }

    fn upsert(&self, doc: &Document) -> Result<DocumentState> {
        doc.validate()?;
        let tokens = self.reader.tokenizer.tokenize(&doc.indexable_text());
        let meta = meta_of(doc, tokens.len());

        let _w = self.writer.lock();
        let next = self.mutate(|snap| {
            let next = match snap.states.get(&doc.id) {
                Some(DocumentState::Indexed | DocumentState::Updated) => DocumentState::Updated,
                _ => DocumentState::Indexed,
            };
            snap.text.index(&doc.id, &tokens);
            snap.vectors.update(&doc.id, &tokens);
            snap.docs.insert(doc.id.clone(), meta);
            snap.states.insert(doc.id.clone(), next);
            next
        });
        tracing::debug!(doc_id = %doc.id, terms = tokens.len(), state = ?next, "document indexed");
        Ok(next)
    }

    /// Apply `f` to the published snapshot. The caller holds the writer lock.
    ///
    /// In place when nothing else references the snapshot; otherwise a copy
    /// is mutated with the reader lock released and only the pointer swap
    /// happens under it.
    fn mutate<R>(&self, f: impl FnOnce(&mut Snapshot) -> R) -> R {
        {
            let mut guard = self.reader.shared.write();
            if let Some(snap) = Arc::get_mut(&mut *guard) {
                return f(snap);
            }
        }
        let mut next = Snapshot::clone(&self.reader.snapshot());
        let out = f(&mut next);
        *self.reader.shared.write() = Arc::new(next);
        out
    }

    /// Replace the whole index with what `source` currently holds.
    ///
    /// The writer lock is held from the listing on, so notifications that
    /// arrive meanwhile are applied after the swap rather than lost. The new
    /// index is built off to the side; readers keep seeing the old one until
    /// it is swapped in, and an interrupted rebuild changes nothing.
    pub fn rebuild(&self, source: &dyn DocumentSource, interrupt: &Interrupt) -> Result<RebuildReport> {
        let start = Instant::now();
        let _w = self.writer.lock();
        let documents = source.list_documents()?;
        let previous = self.reader.snapshot();

        let mut text = TextIndex::new();
        let mut docs: HashMap<DocId, DocMeta> = HashMap::with_capacity(documents.len());
        let mut corpus: HashMap<DocId, Vec<String>> = HashMap::with_capacity(documents.len());
        let mut skipped = 0usize;
        for doc in &documents {
            interrupt.check()?;
            if let Err(e) = doc.validate() {
                tracing::warn!(error = %e, title = %doc.title, "skipping document");
                skipped += 1;
                continue;
            }
            let tokens = self.reader.tokenizer.tokenize(&doc.indexable_text());
            text.index(&doc.id, &tokens);
            docs.insert(doc.id.clone(), meta_of(doc, tokens.len()));
            corpus.insert(doc.id.clone(), tokens);
        }
        interrupt.check()?;
        let vectors = VectorIndex::build(self.reader.config.idf_mode, corpus);

        let mut states: HashMap<DocId, DocumentState> =
            docs.keys().map(|id| (id.clone(), DocumentState::Indexed)).collect();
        let mut removed = 0usize;
        for (id, state) in &previous.states {
            if states.contains_key(id) {
                continue;
            }
            if matches!(state, DocumentState::Indexed | DocumentState::Updated) {
                removed += 1;
            }
            states.insert(id.clone(), DocumentState::Removed);
        }

        let report = RebuildReport { indexed: docs.len(), skipped, removed, took_ms: start.elapsed().as_millis() };
        *self.reader.shared.write() = Arc::new(Snapshot { text, vectors, docs, states });
        tracing::info!(indexed = report.indexed, skipped, removed, took_ms = report.took_ms as u64, "index rebuilt");
        Ok(report)
    }

    pub fn refresh(&self) -> Result<()> {
        self.refresh_with(&Interrupt::none())
    }

    /// Recompute global IDF and every document vector, clearing staleness.
    pub fn refresh_with(&self, interrupt: &Interrupt) -> Result<()> {
        let start = Instant::now();
        let _w = self.writer.lock();
        let current = self.reader.snapshot();
        let vectors = current.vectors.refreshed(interrupt)?;
        drop(current);
        let documents = self.mutate(|snap| {
            snap.vectors = vectors;
            snap.docs.len()
        });
        tracing::info!(documents, took_ms = start.elapsed().as_millis() as u64, "index refreshed");
        Ok(())
    }

    pub fn is_stale(&self) -> bool {
        self.reader.is_stale()
    }

    pub fn state_of(&self, doc_id: &str) -> DocumentState {
        self.reader.state_of(doc_id)
    }

    pub fn len(&self) -> usize {
        self.reader.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reader.is_empty()
    }

    pub fn search(&self, query: &str, limit: usize) -> Vec<SearchHit> {
        self.reader.search(query, limit)
    }

    pub fn find_similar(&self, doc_id: &str, threshold: f32, limit: usize) -> Result<Vec<Neighbor>> {
        self.reader.find_similar(doc_id, threshold, limit)
    }

    pub fn graph(&self) -> Result<Graph> {
        self.reader.graph()
    }

    #[cfg(test)]
    fn idf_and_vectors(&self) -> (HashMap<String, f32>, HashMap<DocId, crate::vector_index::SparseVector>) {
        let snap = self.reader.snapshot();
        let vectors = snap.vectors.vectors().map(|(id, v)| (id.clone(), v.clone())).collect();
        (snap.vectors.idf_table().clone(), vectors)
    }
}

fn meta_of(doc: &Document, term_count: usize) -> DocMeta {
    DocMeta { title: doc.title.clone(), kind: doc.kind, tags: doc.tags.clone(), term_count }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::StaticSource;
    use crate::Relevance;

    fn manager() -> IndexManager {
        IndexManager::new(EngineConfig::default()).unwrap()
    }

    fn fruit() -> Vec<Document> {
        vec![
            Document::new("a", "", "apple orange"),
            Document::new("b", "", "orange banana"),
            Document::new("c", "", "apple apple"),
        ]
    }

    #[test]
    fn lifecycle_transitions() {
        let m = manager();
        let doc = Document::new("x", "Title", "body text");
        assert_eq!(m.state_of("x"), DocumentState::Unindexed);
        assert_eq!(m.on_created(&doc).unwrap(), DocumentState::Indexed);
        assert_eq!(m.on_updated(&doc).unwrap(), DocumentState::Updated);
        assert_eq!(m.on_updated(&doc).unwrap(), DocumentState::Updated);
        assert!(m.on_deleted("x").unwrap());
        assert_eq!(m.state_of("x"), DocumentState::Removed);
        assert!(!m.on_deleted("x").unwrap());
        assert_eq!(m.on_created(&doc).unwrap(), DocumentState::Indexed);
    }

    #[test]
    fn invalid_document_is_rejected_without_mutation() {
        let m = manager();
        m.on_created(&Document::new("a", "", "apple")).unwrap();
        let was_stale = m.is_stale();
        let err = m.on_created(&Document::new("  ", "", "banana")).unwrap_err();
        assert!(matches!(err, EngineError::InvalidDocument(_)));
        assert_eq!(m.len(), 1);
        assert!(m.search("banana", 10).is_empty());
        assert_eq!(m.is_stale(), was_stale);
        assert!(m.on_deleted("").is_err());
    }

    #[test]
    fn refresh_twice_is_idempotent() {
        let m = manager();
        m.rebuild(&StaticSource::new(fruit()), &Interrupt::none()).unwrap();
        m.on_created(&Document::new("d", "", "banana split")).unwrap();
        assert!(m.is_stale());
        m.refresh().unwrap();
        assert!(!m.is_stale());
        let first = (m.idf_and_vectors(), m.graph().unwrap());
        m.refresh().unwrap();
        let second = (m.idf_and_vectors(), m.graph().unwrap());
        assert_eq!(first, second);
    }

    #[test]
    fn interrupted_refresh_leaves_snapshot_alone() {
        let m = manager();
        m.rebuild(&StaticSource::new(fruit()), &Interrupt::none()).unwrap();
        m.on_created(&Document::new("d", "", "kiwi")).unwrap();
        let before = m.idf_and_vectors();
        let res = m.refresh_with(&Interrupt::with_timeout(std::time::Duration::ZERO));
        assert!(matches!(res, Err(EngineError::Interrupted)));
        assert!(m.is_stale());
        assert_eq!(m.idf_and_vectors(), before);
    }

    #[test]
    fn rebuild_counts_skipped_and_removed() {
        let m = manager();
        m.rebuild(&StaticSource::new(fruit()), &Interrupt::none()).unwrap();
        let mut next = fruit();
        next.truncate(2);
        next.push(Document::new("", "no id", "orphan"));
        let report = m.rebuild(&StaticSource::new(next), &Interrupt::none()).unwrap();
        assert_eq!((report.indexed, report.skipped, report.removed), (2, 1, 1));
        assert_eq!(m.state_of("c"), DocumentState::Removed);
        assert!(m.find_similar("c", 0.15, 5).is_err());
    }

    #[test]
    fn reader_sees_mutations_made_after_it_was_created() {
        let m = manager();
        let reader = m.reader();
        m.on_created(&Document::new("n1", "Borrow checker", "ownership rules")).unwrap();
        let hits = reader.search("ownership", 5);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].relevance, Relevance::Exact);
    }

    #[test]
    fn top_terms_and_explain() {
        let m = manager();
        m.rebuild(&StaticSource::new(fruit()), &Interrupt::none()).unwrap();
        let reader = m.reader();
        let terms = reader.top_terms(&["b"], 1).unwrap();
        assert_eq!(terms[0].term, "banana");
        assert!(reader.top_terms(&["nope"], 1).is_err());

        let report = reader.explain_connections("a").unwrap();
        assert_eq!(report.scores.len(), 2);
        assert_eq!(report.scores[0].document_id, "c");
        assert_eq!(report.connected, 2);
        assert!(!report.zero_vector);
    }

    /// Indexes a document through the manager while its own listing is
    /// being taken, like a create notification racing a rebuild.
    struct ListingWithConcurrentCreate {
        manager: Arc<IndexManager>,
        pending: Mutex<Option<std::thread::JoinHandle<Result<DocumentState>>>>,
    }

    impl DocumentSource for ListingWithConcurrentCreate {
        fn list_documents(&self) -> Result<Vec<Document>> {
            let manager = Arc::clone(&self.manager);
            let handle = std::thread::spawn(move || {
                manager.on_created(&Document::new("x", "Xylophone", "xylophone practice"))
            });
            *self.pending.lock() = Some(handle);
            std::thread::sleep(std::time::Duration::from_millis(50));
            Ok(vec![Document::new("a", "", "apple orange")])
        }
    }

    #[test]
    fn create_during_rebuild_listing_is_not_lost() {
        let m = Arc::new(manager());
        let source = ListingWithConcurrentCreate { manager: Arc::clone(&m), pending: Mutex::new(None) };
        let report = m.rebuild(&source, &Interrupt::none()).unwrap();
        assert_eq!(report.indexed, 1);
        let created = source.pending.lock().take().unwrap().join().unwrap().unwrap();
        assert_eq!(created, DocumentState::Indexed);
        assert_eq!(m.state_of("x"), DocumentState::Indexed);
        assert_eq!(m.state_of("a"), DocumentState::Indexed);
        let hits = m.search("xylophone", 5);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].document_id, "x");
    }

    #[test]
    fn connected_count_is_not_capped_by_neighbor_limit() {
        let m = IndexManager::new(EngineConfig { neighbor_limit: 1, ..EngineConfig::default() }).unwrap();
        let docs = vec![
            Document::new("a", "", "apple orange"),
            Document::new("b", "", "apple banana"),
            Document::new("c", "", "orange banana"),
            Document::new("d", "", "zebra"),
        ];
        m.rebuild(&StaticSource::new(docs), &Interrupt::none()).unwrap();
        let report = m.reader().explain_connections("a").unwrap();
        assert_eq!(report.connected, 2);
        assert_eq!(report.scores.len(), 3);
        assert_eq!(report.scores[2], Neighbor { document_id: "d".into(), score: 0.0 });

        let graph = m.graph().unwrap();
        let touching_a = graph.edges.iter().filter(|e| e.source == "a" || e.target == "a").count();
        assert_eq!(touching_a, report.connected);
    }

    #[test]
    fn edit_while_a_snapshot_is_held_leaves_that_snapshot_intact() {
        let m = manager();
        m.rebuild(&StaticSource::new(fruit()), &Interrupt::none()).unwrap();
        let held = m.reader.snapshot();
        m.on_created(&Document::new("d", "", "kiwi")).unwrap();
        assert!(m.on_deleted("a").unwrap());
        assert_eq!(held.docs.len(), 3);
        assert!(held.docs.contains_key("a"));
        assert!(!held.text.contains("d"));
        assert_eq!(m.len(), 3);
        assert_eq!(m.state_of("a"), DocumentState::Removed);
        assert_eq!(m.search("kiwi", 5)[0].document_id, "d");
        drop(held);
        m.on_created(&Document::new("e", "", "plum")).unwrap();
        assert_eq!(m.len(), 4);
    }

    #[test]
    fn clusters_group_the_published_corpus() {
        let m = manager();
        let docs = vec![
            Document::new("f1", "", "apple banana"),
            Document::new("f2", "", "apple banana"),
            Document::new("r1", "", "rust cargo"),
            Document::new("r2", "", "rust cargo"),
        ];
        m.rebuild(&StaticSource::new(docs), &Interrupt::none()).unwrap();
        let clusters = m.reader().clusters(Some(2)).unwrap();
        assert_eq!(clusters.len(), 2);
        let mut ids: Vec<Vec<DocId>> = clusters.iter().map(|c| c.document_ids.clone()).collect();
        ids.sort();
        assert_eq!(ids, vec![vec!["f1".to_string(), "f2".to_string()], vec!["r1".to_string(), "r2".to_string()]]);
        assert!(clusters.iter().all(|c| !c.keywords.is_empty()));
    }
}
