//! Corpus readers for the two supported schema variants.
//!
//! Both variants carry the same logical content — a full-text parse with
//! citation spans and bibliography links, plus per-paper inclusion
//! metadata — but disagree on everything else: GORC pairs a TSV metadata
//! file line-by-line with a gzip JSONL paper file and encodes flags as
//! `"True"`/`"False"` strings, while S2ORC keeps metadata as gzip JSONL
//! with JSON bools and joins parses by paper id. Each reader normalizes to
//! [`citectx_core::PaperSource`] so nothing downstream sees the difference.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use serde::Deserialize;
use thiserror::Error;

use citectx_core::{CitationMarker, PaperSource, Segment};

pub mod gorc;
pub mod s2orc;

pub use gorc::GorcReader;
pub use s2orc::S2orcReader;

#[derive(Error, Debug)]
pub enum CorpusError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("shard input not found: {0}")]
    Missing(PathBuf),
    #[error("malformed paper record at line {line}: {source}")]
    Record {
        line: u64,
        source: serde_json::Error,
    },
    #[error("malformed metadata at line {line}: {reason}")]
    Metadata { line: u64, reason: String },
    #[error("metadata rows exhausted before paper records at line {line}")]
    MetadataExhausted { line: u64 },
}

impl CorpusError {
    /// Fatal errors abort the shard; the rest skip one paper.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CorpusError::Io(_) | CorpusError::Missing(_) | CorpusError::MetadataExhausted { .. }
        )
    }
}

/// The two supported on-disk corpus layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorpusFormat {
    Gorc,
    S2orc,
}

/// Open one shard of the corpus as a normalized paper stream.
pub fn open_shard(
    format: CorpusFormat,
    dir: &Path,
    shard: u32,
) -> Result<Box<dyn Iterator<Item = Result<PaperSource, CorpusError>> + Send>, CorpusError> {
    match format {
        CorpusFormat::Gorc => Ok(Box::new(GorcReader::open(dir, shard)?)),
        CorpusFormat::S2orc => Ok(Box::new(S2orcReader::open(dir, shard)?)),
    }
}

pub(crate) type GzLines = Lines<BufReader<GzDecoder<File>>>;

pub(crate) fn gz_lines(path: &Path) -> Result<GzLines, CorpusError> {
    if !path.exists() {
        return Err(CorpusError::Missing(path.to_path_buf()));
    }
    let file = File::open(path)?;
    Ok(BufReader::new(GzDecoder::new(file)).lines())
}

/// A paper id that may be encoded as a JSON string or number.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum IdValue {
    Str(String),
    Num(u64),
}

impl From<IdValue> for String {
    fn from(value: IdValue) -> Self {
        match value {
            IdValue::Str(s) => s,
            IdValue::Num(n) => n.to_string(),
        }
    }
}

/// One sub-block of parsed text with its citation spans.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct RawSegment {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub cite_spans: Vec<RawCiteSpan>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawCiteSpan {
    #[serde(default)]
    pub ref_id: Option<String>,
    pub end: usize,
}

/// A bibliography entry; GORC spells the resolved id `links`, S2ORC `link`.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct RawBibEntry {
    #[serde(default, alias = "links")]
    pub link: Option<IdValue>,
}

/// The parse block both variants share structurally. Collections are
/// `Option` because some corpus exports write `null` instead of omitting
/// the field, which `#[serde(default)]` alone would reject.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct RawParse {
    #[serde(default, rename = "abstract")]
    pub abstract_segments: Option<Vec<RawSegment>>,
    #[serde(default)]
    pub body_text: Option<Vec<RawSegment>>,
    #[serde(default)]
    pub bib_entries: Option<BTreeMap<String, RawBibEntry>>,
}

/// Cite spans with no resolved ref key are invisible downstream; drop them
/// here so core never sees a null marker.
pub(crate) fn normalize_segments(raw: Option<Vec<RawSegment>>) -> Vec<Segment> {
    raw.unwrap_or_default()
        .into_iter()
        .map(|segment| Segment {
            text: segment.text,
            markers: segment
                .cite_spans
                .into_iter()
                .filter_map(|span| {
                    span.ref_id.map(|ref_key| CitationMarker {
                        ref_key,
                        end: span.end,
                    })
                })
                .collect(),
        })
        .collect()
}

pub(crate) fn normalize_bib_entries(
    raw: Option<BTreeMap<String, RawBibEntry>>,
) -> BTreeMap<String, Option<String>> {
    raw.unwrap_or_default()
        .into_iter()
        .map(|(key, entry)| (key, entry.link.map(String::from).filter(|s| !s.is_empty())))
        .collect()
}
