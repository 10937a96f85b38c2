use kb_core::tokenizer::{tokenize, Tokenizer};

#[test]
fn it_normalizes_case_and_unicode() {
    let words = tokenize("Café MENU ﬁle");
    // NFKC folds the ligature, lowercasing folds case.
    assert_eq!(words, vec!["café", "menu", "file"]);
}

#[test]
fn it_filters_stopwords_and_short_tokens() {
    let words = tokenize("The quick brown fox and a lazy dog x y");
    assert!(!words.contains(&"the".to_string()));
    assert!(!words.contains(&"and".to_string()));
    assert!(!words.iter().any(|w| w.chars().count() < 2));
    assert_eq!(words, vec!["quick", "brown", "fox", "lazy", "dog"]);
}

#[test]
fn it_keeps_digits_and_order() {
    assert_eq!(tokenize("rust 2024, edition 2021"), vec!["rust", "2024", "edition", "2021"]);
}

#[test]
fn it_is_deterministic() {
    let text = "Knowledge graphs connect notes, links and papers.";
    assert_eq!(tokenize(text), tokenize(text));
}

#[test]
fn min_len_is_configurable() {
    let t = Tokenizer::new(false, 4);
    assert_eq!(t.tokenize("rust go java"), vec!["rust", "java"]);
}
