//! Where documents come from. The engine never owns its corpus; a source
//! hands over the current document set whenever a full rebuild is needed.

use crate::{Document, Result};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub trait DocumentSource {
    fn list_documents(&self) -> Result<Vec<Document>>;
}

/// In-memory source.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    pub documents: Vec<Document>,
}

impl StaticSource {
    pub fn new(documents: Vec<Document>) -> Self { Self { documents } }
}

impl DocumentSource for StaticSource {
    fn list_documents(&self) -> Result<Vec<Document>> {
        Ok(self.documents.clone())
    }
}

/// Documents read from a `.json` / `.jsonl` file or a directory tree of them.
///
/// A `.json` file holds one document object or an array of them; a `.jsonl`
/// file holds one document per line.
#[derive(Debug, Clone)]
pub struct JsonSource {
    root: PathBuf,
}

impl JsonSource {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }

    fn files(&self) -> Result<Vec<PathBuf>> {
        let mut files: Vec<PathBuf> = Vec::new();
        if self.root.is_dir() {
            for entry in WalkDir::new(&self.root).sort_by_file_name() {
                let entry = entry?;
                let p = entry.path();
                if p.is_file() && matches!(extension(p), Some("json" | "jsonl")) {
                    files.push(p.to_path_buf());
                }
            }
        } else if self.root.is_file() {
            files.push(self.root.clone());
        } else {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no such corpus path: {}", self.root.display()),
            )
            .into());
        }
        Ok(files)
    }
}

impl DocumentSource for JsonSource {
    fn list_documents(&self) -> Result<Vec<Document>> {
        let mut docs = Vec::new();
        for file in self.files()? {
            if extension(&file) == Some("jsonl") {
                read_jsonl(&file, &mut docs)?;
            } else {
                read_json(&file, &mut docs)?;
            }
        }
        tracing::debug!(root = %self.root.display(), documents = docs.len(), "loaded corpus");
        Ok(docs)
    }
}

fn extension(p: &Path) -> Option<&str> {
    p.extension().and_then(|s| s.to_str())
}

fn read_jsonl(file: &Path, docs: &mut Vec<Document>) -> Result<()> {
    let reader = BufReader::new(File::open(file)?);
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() { continue; }
        docs.push(serde_json::from_str(&line)?);
    }
    Ok(())
}

fn read_json(file: &Path, docs: &mut Vec<Document>) -> Result<()> {
    let reader = BufReader::new(File::open(file)?);
    let json: serde_json::Value = serde_json::from_reader(reader)?;
    match json {
        serde_json::Value::Array(arr) => {
            for v in arr {
                docs.push(serde_json::from_value(v)?);
            }
        }
        serde_json::Value::Object(_) => docs.push(serde_json::from_value(json)?),
        _ => tracing::warn!(file = %file.display(), "ignoring json file without document objects"),
    }
    Ok(())
}
