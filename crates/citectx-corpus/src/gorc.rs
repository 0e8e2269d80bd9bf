//! GORC-layout shard reader: `metadata/<shard>.tsv` paired line-by-line
//! with `papers/<shard>.jsonl.gz`.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::Path;

use serde::Deserialize;

use citectx_core::{PaperMeta, PaperSource};

use crate::{
    CorpusError, GzLines, IdValue, RawParse, gz_lines, normalize_bib_entries, normalize_segments,
};

#[derive(Debug, Deserialize)]
struct RawGorcPaper {
    paper_id: IdValue,
    #[serde(default)]
    metadata: RawGorcPaperMeta,
    #[serde(default)]
    grobid_parse: Option<RawParse>,
}

#[derive(Debug, Default, Deserialize)]
struct RawGorcPaperMeta {
    #[serde(default)]
    title: Option<String>,
    #[serde(default, rename = "abstract")]
    abstract_text: Option<String>,
}

/// Streams `(paper, metadata-row)` pairs, one normalized paper per line.
///
/// The TSV and the gzip JSONL are positionally aligned: row N of the
/// metadata file describes line N of the paper file. Empty TSV cells read
/// as absent; boolean columns hold `"True"` / `"False"` strings.
#[derive(Debug)]
pub struct GorcReader {
    header: Vec<String>,
    metadata: Lines<BufReader<File>>,
    papers: GzLines,
    line: u64,
}

impl GorcReader {
    pub fn open(dir: &Path, shard: u32) -> Result<Self, CorpusError> {
        let metadata_path = dir.join("metadata").join(format!("{shard}.tsv"));
        let papers_path = dir.join("papers").join(format!("{shard}.jsonl.gz"));

        if !metadata_path.exists() {
            return Err(CorpusError::Missing(metadata_path));
        }
        let mut metadata = BufReader::new(File::open(&metadata_path)?).lines();
        let header = match metadata.next() {
            Some(line) => line?
                .trim_end_matches('\n')
                .split('\t')
                .map(str::to_string)
                .collect(),
            None => {
                return Err(CorpusError::Metadata {
                    line: 0,
                    reason: "metadata file has no header row".to_string(),
                });
            }
        };

        Ok(Self {
            header,
            metadata,
            papers: gz_lines(&papers_path)?,
            line: 0,
        })
    }

    fn read_row(&mut self) -> Result<HashMap<String, String>, CorpusError> {
        let row = match self.metadata.next() {
            Some(row) => row?,
            None => return Err(CorpusError::MetadataExhausted { line: self.line }),
        };
        // Empty cells mean "absent"; drop them so lookups read as None.
        Ok(self
            .header
            .iter()
            .zip(row.trim_end_matches('\n').split('\t'))
            .filter(|(_, value)| !value.is_empty())
            .map(|(key, value)| (key.clone(), value.to_string()))
            .collect())
    }

    fn normalize(
        &self,
        paper: RawGorcPaper,
        row: HashMap<String, String>,
    ) -> Result<PaperSource, CorpusError> {
        let parse = paper.grobid_parse.unwrap_or_default();

        let inbound = row.get("inbound_citations").map(String::as_str);
        let meta = PaperMeta {
            has_parse: tsv_flag(row.get("has_grobid")),
            has_parse_text: tsv_flag(row.get("has_grobid_text")),
            has_inbound_citations: matches!(inbound, Some(v) if v != "[]"),
            has_gold_abstract: tsv_flag(row.get("has_gold_abs")),
            linked_bib_count: row
                .get("grobid_num_linked_bibs")
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
            has_doi: row.contains_key("doi"),
            has_arxiv_id: row.contains_key("arxiv_id"),
        };

        Ok(PaperSource {
            paper_id: paper.paper_id.into(),
            title: paper.metadata.title.unwrap_or_default(),
            gold_abstract: paper.metadata.abstract_text,
            abstract_segments: normalize_segments(parse.abstract_segments),
            body_segments: normalize_segments(parse.body_text),
            bib_entries: normalize_bib_entries(parse.bib_entries),
            meta,
        })
    }
}

impl Iterator for GorcReader {
    type Item = Result<PaperSource, CorpusError>;

    fn next(&mut self) -> Option<Self::Item> {
        let line = match self.papers.next()? {
            Ok(line) => line,
            Err(e) => return Some(Err(e.into())),
        };
        self.line += 1;

        let row = match self.read_row() {
            Ok(row) => row,
            Err(e) => return Some(Err(e)),
        };

        let paper: RawGorcPaper = match serde_json::from_str(&line) {
            Ok(p) => p,
            Err(e) => {
                return Some(Err(CorpusError::Record {
                    line: self.line,
                    source: e,
                }));
            }
        };

        Some(self.normalize(paper, row))
    }
}

/// GORC boolean columns are the strings `"True"` / `"False"`.
fn tsv_flag(value: Option<&String>) -> bool {
    matches!(value.map(String::as_str), Some("True") | Some("true") | Some("1"))
}
