//! S2ORC-layout shard reader: `metadata/<shard>.jsonl.gz` joined by paper
//! id against `pdf_parses/<shard>.jsonl.gz`.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use citectx_core::{PaperMeta, PaperSource};

use crate::{
    CorpusError, GzLines, IdValue, RawParse, gz_lines, normalize_bib_entries, normalize_segments,
};

#[derive(Debug, Deserialize)]
struct RawS2Meta {
    paper_id: IdValue,
    #[serde(default)]
    title: Option<String>,
    #[serde(default, rename = "abstract")]
    abstract_text: Option<String>,
    #[serde(default)]
    has_pdf_parse: bool,
    #[serde(default)]
    has_pdf_parse_body_text: bool,
    #[serde(default)]
    inbound_citations: Vec<IdValue>,
    #[serde(default)]
    doi: Option<String>,
    #[serde(default)]
    arxiv_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawS2Parse {
    paper_id: IdValue,
    #[serde(flatten)]
    parse: RawParse,
}

/// Joins the parse stream against an in-memory metadata map.
///
/// Metadata lines are small (no full text), so one shard's worth fits
/// comfortably in memory; the parse side streams. Papers whose parse line
/// has no metadata row are skipped as malformed records.
#[derive(Debug)]
pub struct S2orcReader {
    metadata: HashMap<String, RawS2Meta>,
    parses: GzLines,
    line: u64,
}

impl S2orcReader {
    pub fn open(dir: &Path, shard: u32) -> Result<Self, CorpusError> {
        let metadata_path = dir.join("metadata").join(format!("{shard}.jsonl.gz"));
        let parses_path = dir.join("pdf_parses").join(format!("{shard}.jsonl.gz"));

        let mut metadata = HashMap::new();
        for (lineno, line) in gz_lines(&metadata_path)?.enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let raw: RawS2Meta = match serde_json::from_str(&line) {
                Ok(m) => m,
                Err(e) => {
                    tracing::warn!(
                        line = lineno + 1,
                        error = %e,
                        "skipping malformed metadata line"
                    );
                    continue;
                }
            };
            metadata.insert(String::from(raw.paper_id.clone()), raw);
        }

        Ok(Self {
            metadata,
            parses: gz_lines(&parses_path)?,
            line: 0,
        })
    }

    fn normalize(&mut self, raw: RawS2Parse) -> Result<PaperSource, CorpusError> {
        let paper_id = String::from(raw.paper_id);
        let Some(meta) = self.metadata.remove(&paper_id) else {
            return Err(CorpusError::Metadata {
                line: self.line,
                reason: format!("no metadata row for paper {paper_id}"),
            });
        };

        let bib_entries = normalize_bib_entries(raw.parse.bib_entries);
        // This variant carries no precomputed count; derive it.
        let linked_bib_count = bib_entries.values().filter(|l| l.is_some()).count() as u32;

        let gold_abstract = meta.abstract_text.filter(|a| !a.is_empty());
        Ok(PaperSource {
            paper_id,
            title: meta.title.unwrap_or_default(),
            meta: PaperMeta {
                has_parse: meta.has_pdf_parse,
                has_parse_text: meta.has_pdf_parse_body_text,
                has_inbound_citations: !meta.inbound_citations.is_empty(),
                has_gold_abstract: gold_abstract.is_some(),
                linked_bib_count,
                has_doi: meta.doi.is_some(),
                has_arxiv_id: meta.arxiv_id.is_some(),
            },
            gold_abstract,
            abstract_segments: normalize_segments(raw.parse.abstract_segments),
            body_segments: normalize_segments(raw.parse.body_text),
            bib_entries,
        })
    }
}

impl Iterator for S2orcReader {
    type Item = Result<PaperSource, CorpusError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.parses.next()? {
                Ok(line) => line,
                Err(e) => return Some(Err(e.into())),
            };
            self.line += 1;
            if line.trim().is_empty() {
                continue;
            }

            let raw: RawS2Parse = match serde_json::from_str(&line) {
                Ok(p) => p,
                Err(e) => {
                    return Some(Err(CorpusError::Record {
                        line: self.line,
                        source: e,
                    }));
                }
            };

            return Some(self.normalize(raw));
        }
    }
}
