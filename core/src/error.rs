use thiserror::Error;

/// Errors returned by the retrieval engine.
///
/// An empty or all-stop-word query is not an error (it yields an empty
/// result), and a stale IDF table is reported through `is_stale()` rather
/// than failing any call.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("document not found: {0}")]
    NotFound(String),
    #[error("invalid document: {0}")]
    InvalidDocument(String),
    #[error("corpus too large for graph construction: {documents} documents ({pairs} pairs, budget {budget})")]
    CorpusTooLarge { documents: usize, pairs: u64, budget: u64 },
    #[error("operation interrupted")]
    Interrupted,
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("walk error: {0}")]
    Walk(#[from] walkdir::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
