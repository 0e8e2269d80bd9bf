//! In-memory abstract lookup, built from every abstracts file of a run.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::{AbstractRecord, PipelineError};

/// A recorded abstract: title plus text, keyed externally by paper id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbstractEntry {
    pub title: String,
    pub abstract_text: String,
}

/// Read-only paper id -> abstract mapping used during sampling.
#[derive(Debug, Default)]
pub struct AbstractIndex {
    entries: HashMap<String, AbstractEntry>,
}

impl AbstractIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every `.jsonl` abstracts file under `dir`.
    ///
    /// Records with a missing or empty abstract are skipped (the corpus is
    /// incomplete by nature). Malformed lines are skipped with a warning;
    /// only I/O failures abort the load.
    pub fn load_dir(dir: &Path) -> Result<Self, PipelineError> {
        let mut index = Self::new();
        for path in jsonl_files(dir)? {
            index.load_file(&path)?;
        }
        tracing::info!(entries = index.len(), "abstract index loaded");
        Ok(index)
    }

    fn load_file(&mut self, path: &Path) -> Result<(), PipelineError> {
        let reader = BufReader::new(File::open(path)?);
        for (lineno, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record: AbstractRecord = match serde_json::from_str(&line) {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        line = lineno + 1,
                        error = %e,
                        "skipping malformed abstract record"
                    );
                    continue;
                }
            };
            let Some(abstract_text) = record.abstract_text else {
                continue;
            };
            if abstract_text.is_empty() {
                continue;
            }
            self.entries.insert(
                record.paper_id,
                AbstractEntry {
                    title: record.title,
                    abstract_text,
                },
            );
        }
        Ok(())
    }

    pub fn insert(&mut self, paper_id: String, entry: AbstractEntry) {
        self.entries.insert(paper_id, entry);
    }

    pub fn get(&self, paper_id: &str) -> Option<&AbstractEntry> {
        self.entries.get(paper_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Sorted list of `.jsonl` files directly under `dir`.
pub(crate) fn jsonl_files(dir: &Path) -> Result<Vec<std::path::PathBuf>, PipelineError> {
    let mut files: Vec<_> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("jsonl"))
        .collect();
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_entries_and_skips_unusable_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("0.jsonl");
        let mut f = File::create(&path).unwrap();
        writeln!(
            f,
            r#"{{"paper_id":"P1","title":"One","abstract":"Text one."}}"#
        )
        .unwrap();
        writeln!(f, r#"{{"paper_id":"P2","title":"Two","abstract":null}}"#).unwrap();
        writeln!(f, r#"{{"paper_id":"P3","title":"Three","abstract":""}}"#).unwrap();
        writeln!(f, "not json").unwrap();
        writeln!(
            f,
            r#"{{"paper_id":"P4","title":"Four","abstract":"Text four."}}"#
        )
        .unwrap();

        let index = AbstractIndex::load_dir(dir.path()).unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index.get("P1").unwrap().abstract_text, "Text one.");
        assert!(index.get("P2").is_none());
        assert!(index.get("P3").is_none());
        assert_eq!(index.get("P4").unwrap().title, "Four");
    }

    #[test]
    fn later_files_override_earlier_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        for (name, text) in [("0.jsonl", "first"), ("1.jsonl", "second")] {
            let mut f = File::create(dir.path().join(name)).unwrap();
            writeln!(
                f,
                r#"{{"paper_id":"P1","title":"One","abstract":"{text}"}}"#
            )
            .unwrap();
        }

        let index = AbstractIndex::load_dir(dir.path()).unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(index.get("P1").unwrap().abstract_text, "second");
    }

    #[test]
    fn empty_directory_yields_empty_index() {
        let dir = tempfile::tempdir().unwrap();
        let index = AbstractIndex::load_dir(dir.path()).unwrap();
        assert!(index.is_empty());
    }
}
