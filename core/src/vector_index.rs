//! TF-IDF vector space over the indexed corpus.
//!
//! Each document keeps its raw term counts so the whole space can be
//! recomputed without going back to the document store. Document frequencies
//! are maintained incrementally on every mutation; the cached IDF table and
//! the vectors of untouched documents are only recomputed by [`VectorIndex::refresh`].

use crate::config::IdfMode;
use crate::interrupt::Interrupt;
use crate::text_index::term_frequencies;
use crate::{DocId, EngineError, Result};
use serde::Serialize;
use std::collections::HashMap;

/// Sparse TF-IDF vector, entries sorted by term, zero weights dropped.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SparseVector {
    entries: Vec<(String, f32)>,
    norm: f32,
}

impl SparseVector {
    pub fn from_weights<I>(weights: I) -> Self
    where
        I: IntoIterator<Item = (String, f32)>,
    {
        let mut entries: Vec<(String, f32)> = weights.into_iter().filter(|(_, w)| *w > 0.0).collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries.dedup_by(|next, prev| {
            if next.0 == prev.0 {
                prev.1 += next.1;
                true
            } else {
                false
            }
        });
        let norm = entries.iter().map(|(_, w)| (*w as f64) * (*w as f64)).sum::<f64>().sqrt() as f32;
        Self { entries, norm }
    }

    pub fn entries(&self) -> &[(String, f32)] { &self.entries }

    pub fn norm(&self) -> f32 { self.norm }

    pub fn is_zero(&self) -> bool { self.entries.is_empty() || self.norm == 0.0 }

    pub fn len(&self) -> usize { self.entries.len() }

    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    pub fn weight(&self, term: &str) -> f32 {
        self.entries
            .binary_search_by(|(t, _)| t.as_str().cmp(term))
            .map(|i| self.entries[i].1)
            .unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Default)]
pub struct VectorIndex {
    mode: IdfMode,
    counts: HashMap<DocId, HashMap<String, u32>>,
    df: HashMap<String, u32>,
    idf: HashMap<String, f32>,
    vectors: HashMap<DocId, SparseVector>,
    stale: bool,
}

impl VectorIndex {
    pub fn new(mode: IdfMode) -> Self {
        Self { mode, ..Self::default() }
    }

    /// Full build: document frequencies, IDF, then every vector. O(total tokens).
    pub fn build<I>(mode: IdfMode, corpus: I) -> Self
    where
        I: IntoIterator<Item = (DocId, Vec<String>)>,
    {
        let mut index = Self::new(mode);
        for (id, tokens) in corpus {
            index.put_counts(id, &tokens);
        }
        index.recompute_all();
        index
    }

    pub fn vector_of(&self, doc_id: &str) -> Result<&SparseVector> {
        self.vectors
            .get(doc_id)
            .ok_or_else(|| EngineError::NotFound(doc_id.to_string()))
    }

    /// Incremental upsert. Only this document's vector is recomputed; the
    /// IDF table is marked stale.
    pub fn update(&mut self, doc_id: &str, tokens: &[String]) {
        self.put_counts(doc_id.to_string(), tokens);
        let n = self.counts.len();
        let vector = match self.counts.get(doc_id) {
            Some(counts) => weigh(counts, |t| self.mode.idf(n, self.df.get(t).copied().unwrap_or(0))),
            None => SparseVector::default(),
        };
        self.vectors.insert(doc_id.to_string(), vector);
        self.stale = true;
    }

    pub fn remove(&mut self, doc_id: &str) -> bool {
        let Some(old) = self.counts.remove(doc_id) else { return false };
        self.release_df(&old);
        self.vectors.remove(doc_id);
        self.stale = true;
        true
    }

    /// Recompute IDF and every vector in place.
    pub fn refresh(&mut self) {
        self.recompute_all();
    }

    /// Recompute into a new index, checking `interrupt` between documents.
    /// `self` is left untouched either way.
    pub fn refreshed(&self, interrupt: &Interrupt) -> Result<Self> {
        let n = self.counts.len();
        let idf: HashMap<String, f32> = self
            .df
            .iter()
            .map(|(t, df)| (t.clone(), self.mode.idf(n, *df)))
            .collect();
        let mut vectors = HashMap::with_capacity(n);
        for (id, counts) in &self.counts {
            interrupt.check()?;
            vectors.insert(id.clone(), weigh(counts, |t| idf.get(t).copied().unwrap_or(0.0)));
        }
        Ok(Self {
            mode: self.mode,
            counts: self.counts.clone(),
            df: self.df.clone(),
            idf,
            vectors,
            stale: false,
        })
    }

    /// Transient vector for a query, weighted by the cached IDF table. Terms
    /// the table has not seen yet fall back to live document frequency.
    pub fn query_vector(&self, tokens: &[String]) -> SparseVector {
        let tf = term_frequencies(tokens);
        SparseVector::from_weights(tf.into_iter().map(|(t, c)| (t.to_string(), c as f32 * self.idf(t))))
    }

    pub fn idf(&self, term: &str) -> f32 {
        match self.idf.get(term) {
            Some(v) => *v,
            None => self.mode.idf(self.counts.len(), self.df.get(term).copied().unwrap_or(0)),
        }
    }

    pub fn idf_table(&self) -> &HashMap<String, f32> { &self.idf }

    pub fn document_frequency(&self, term: &str) -> u32 {
        self.df.get(term).copied().unwrap_or(0)
    }

    pub fn vectors(&self) -> impl Iterator<Item = (&DocId, &SparseVector)> {
        self.vectors.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = &DocId> { self.vectors.keys() }

    pub fn contains(&self, doc_id: &str) -> bool { self.vectors.contains_key(doc_id) }

    pub fn is_stale(&self) -> bool { self.stale }

    pub fn mode(&self) -> IdfMode { self.mode }

    pub fn len(&self) -> usize { self.vectors.len() }

    pub fn is_empty(&self) -> bool { self.vectors.is_empty() }

    fn put_counts(&mut self, id: DocId, tokens: &[String]) {
        let counts: HashMap<String, u32> = term_frequencies(tokens)
            .into_iter()
            .map(|(t, c)| (t.to_string(), c))
            .collect();
        if let Some(old) = self.counts.remove(&id) {
            self.release_df(&old);
        }
        for term in counts.keys() {
            *self.df.entry(term.clone()).or_insert(0) += 1;
        }
        self.counts.insert(id, counts);
    }

    fn release_df(&mut self, counts: &HashMap<String, u32>) {
        for term in counts.keys() {
            if let Some(df) = self.df.get_mut(term) {
                *df -= 1;
                if *df == 0 {
                    self.df.remove(term);
                }
            }
        }
    }

    fn recompute_all(&mut self) {
        let n = self.counts.len();
        self.idf = self.df.iter().map(|(t, df)| (t.clone(), self.mode.idf(n, *df))).collect();
        let idf = &self.idf;
        self.vectors = self
            .counts
            .iter()
            .map(|(id, counts)| (id.clone(), weigh(counts, |t| idf.get(t).copied().unwrap_or(0.0))))
            .collect();
        self.stale = false;
    }
}

fn weigh<F>(counts: &HashMap<String, u32>, idf: F) -> SparseVector
where
    F: Fn(&str) -> f32,
{
    SparseVector::from_weights(counts.iter().map(|(t, c)| (t.clone(), *c as f32 * idf(t))))
}
