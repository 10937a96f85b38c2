pub mod cluster;
pub mod config;
pub mod error;
pub mod graph;
pub mod interrupt;
pub mod manager;
pub mod search;
pub mod similarity;
pub mod source;
pub mod text_index;
pub mod tokenizer;
pub mod vector_index;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

pub use cluster::{Cluster, ClusterParams, KEstimate, TermWeight};
pub use config::{EngineConfig, IdfMode};
pub use error::{EngineError, Result};
pub use graph::{Graph, GraphWarning, SimilarityEdge};
pub use interrupt::Interrupt;
pub use manager::{ConnectionReport, DocumentState, IndexManager, RebuildReport, SearchHandle};
pub use search::{Relevance, SearchHit};
pub use similarity::Neighbor;
pub use source::{DocumentSource, JsonSource, StaticSource};

pub type DocId = String;

/// Kind tag carried by every knowledge item. The retrieval core never
/// branches on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    #[default]
    Note,
    Link,
    #[serde(alias = "code")]
    Snippet,
    Paper,
    Skill,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: DocId,
    pub title: String,
    #[serde(alias = "content", default)]
    pub body: String,
    #[serde(default)]
    pub kind: DocumentKind,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub created_at: Option<OffsetDateTime>,
}

impl Document {
    pub fn new(id: impl Into<DocId>, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            body: body.into(),
            kind: DocumentKind::default(),
            tags: Vec::new(),
            created_at: None,
        }
    }

    pub fn with_kind(mut self, kind: DocumentKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Text fed to the tokenizer: title, body and tags.
    pub fn indexable_text(&self) -> String {
        let mut text = String::with_capacity(self.title.len() + self.body.len() + 16);
        text.push_str(&self.title);
        text.push(' ');
        text.push_str(&self.body);
        for tag in &self.tags {
            text.push(' ');
            text.push_str(tag);
        }
        text
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(EngineError::InvalidDocument("empty document id".into()));
        }
        Ok(())
    }
}

/// What the engine keeps about an indexed document besides its postings and vector.
#[derive(Debug, Clone, Serialize)]
pub struct DocMeta {
    pub title: String,
    pub kind: DocumentKind,
    pub tags: Vec<String>,
    pub term_count: usize,
}
