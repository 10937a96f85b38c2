use crate::DocId;
use serde::Serialize;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Posting {
    pub doc_id: DocId,
    pub tf: u32,
}

/// Inverted index: term -> postings sorted by doc id.
///
/// A reverse map from document to its terms makes removal proportional to
/// the document's vocabulary instead of the whole dictionary.
#[derive(Debug, Clone, Default)]
pub struct TextIndex {
    postings: HashMap<String, Vec<Posting>>,
    doc_terms: HashMap<DocId, Vec<String>>,
}

pub fn term_frequencies(tokens: &[String]) -> HashMap<&str, u32> {
    let mut tf: HashMap<&str, u32> = HashMap::new();
    for t in tokens {
        *tf.entry(t.as_str()).or_insert(0) += 1;
    }
    tf
}

impl TextIndex {
    pub fn new() -> Self { Self::default() }

    /// Replace whatever was indexed for `doc_id` with postings for `tokens`.
    pub fn index(&mut self, doc_id: &str, tokens: &[String]) {
        self.remove(doc_id);
        let tf = term_frequencies(tokens);
        let mut terms: Vec<String> = Vec::with_capacity(tf.len());
        for (term, count) in tf {
            let list = self.postings.entry(term.to_string()).or_default();
            let pos = list.partition_point(|p| p.doc_id.as_str() < doc_id);
            list.insert(pos, Posting { doc_id: doc_id.to_string(), tf: count });
            terms.push(term.to_string());
        }
        self.doc_terms.insert(doc_id.to_string(), terms);
    }

    /// Drop every posting for `doc_id`. Unknown ids are ignored.
    pub fn remove(&mut self, doc_id: &str) -> bool {
        let Some(terms) = self.doc_terms.remove(doc_id) else { return false };
        for term in terms {
            if let Some(list) = self.postings.get_mut(&term) {
                if let Ok(pos) = list.binary_search_by(|p| p.doc_id.as_str().cmp(doc_id)) {
                    list.remove(pos);
                }
                if list.is_empty() {
                    self.postings.remove(&term);
                }
            }
        }
        true
    }

    /// Additive tf score over the distinct query terms, best first, ties by id.
    pub fn query(&self, terms: &[String]) -> Vec<(DocId, u32)> {
        let distinct: HashSet<&str> = terms.iter().map(String::as_str).collect();
        let mut scores: HashMap<&str, u32> = HashMap::new();
        for term in distinct {
            if let Some(list) = self.postings.get(term) {
                for p in list {
                    *scores.entry(p.doc_id.as_str()).or_insert(0) += p.tf;
                }
            }
        }
        let mut scored: Vec<(DocId, u32)> = scores
            .into_iter()
            .map(|(id, s)| (id.to_string(), s))
            .collect();
        scored.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        scored
    }

    pub fn postings(&self, term: &str) -> &[Posting] {
        self.postings.get(term).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, doc_id: &str) -> bool { self.doc_terms.contains_key(doc_id) }

    pub fn len(&self) -> usize { self.doc_terms.len() }

    pub fn is_empty(&self) -> bool { self.doc_terms.is_empty() }

    pub fn term_count(&self) -> usize { self.postings.len() }
}
