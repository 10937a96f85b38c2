use lazy_static::lazy_static;
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use unicode_normalization::UnicodeNormalization;
use std::collections::HashSet;

lazy_static! {
    static ref RE: Regex = Regex::new(r"(?u)[\p{L}\p{N}][\p{L}\p{N}_']*").expect("valid regex");
    static ref STEMMER: Stemmer = Stemmer::create(Algorithm::English);
    static ref STOPWORDS: HashSet<&'static str> = {
        let words: &[&str] = &[
            "a","also","all","am","an","and","are","as","at",
            "be","been","being","both","but","by",
            "can","could",
            "did","do","does","doing",
            "each","every",
            "few","for","from",
            "had","has","have","he","how",
            "in","is","it","its",
            "just",
            "more","most",
            "no","nor","not","now",
            "of","on","only","other","ought","own",
            "same","should","so","some","such",
            "than","that","the","they","this","to","too",
            "very",
            "was","were","what","when","where","which","who","why","will","with","would",
        ];
        words.iter().copied().collect()
    };
}

pub const DEFAULT_MIN_LEN: usize = 2;

pub fn is_stopword(token: &str) -> bool { STOPWORDS.contains(token) }

/// Tokenize with the default options: NFKC normalization, lowercase,
/// boundary punctuation stripped, stop words and 1-char tokens dropped.
pub fn tokenize(text: &str) -> Vec<String> {
    Tokenizer::default().tokenize(text)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tokenizer {
    pub stem: bool,
    pub min_len: usize,
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self { stem: false, min_len: DEFAULT_MIN_LEN }
    }
}

impl Tokenizer {
    pub fn new(stem: bool, min_len: usize) -> Self {
        Self { stem, min_len: min_len.max(1) }
    }

    /// Terms in input order; consumers count them as a multiset.
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        let normalized = text.nfkc().collect::<String>().to_lowercase();
        let mut tokens = Vec::new();
        for mat in RE.find_iter(&normalized) {
            let token = mat.as_str().trim_matches(|c: char| !c.is_alphanumeric());
            if token.chars().count() < self.min_len || is_stopword(token) {
                continue;
            }
            if self.stem {
                tokens.push(STEMMER.stem(token).into_owned());
            } else {
                tokens.push(token.to_string());
            }
        }
        tokens
    }
}
