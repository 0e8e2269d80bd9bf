use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod chunker;
pub mod config_file;
pub mod index;
pub mod pool;
pub mod sampler;
pub mod window;
pub mod writer;

// Re-export for convenience
pub use chunker::{InclusionFilters, PaperOutcome, process_paper};
pub use index::{AbstractEntry, AbstractIndex};
pub use pool::{ShardJob, ShardPool};
pub use sampler::{PLACEHOLDER, SampleSummary, sample_corpus, sample_examples};
pub use window::{WindowExtraction, extract_windows, resolve_references};
pub use writer::{DEFAULT_SHARD_SIZE, ExampleWriter};

/// A sentence produced by a segmentation backend.
///
/// `end` is the character offset in the owning segment's text immediately
/// after this sentence. Trailing whitespace belongs to the preceding
/// sentence, so consecutive ends are cumulative and the final end equals the
/// segment's length in chars.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sentence {
    pub text: String,
    pub end: usize,
}

#[derive(Error, Debug)]
pub enum SegmentError {
    #[error("empty input text")]
    EmptyInput,
    #[error("segmentation failed: {0}")]
    Backend(String),
}

/// Sentence-boundary segmentation backend.
///
/// Implementations split a text block into ordered sentences with char
/// end-offsets. The extractor treats failures as recoverable: the segment is
/// skipped and counted, never aborting the paper.
pub trait SentenceSegmenter: Send + Sync {
    fn segment(&self, text: &str) -> Result<Vec<Sentence>, SegmentError>;
}

/// An in-text citation located by its char end-offset within the owning
/// segment, pointing at a local bibliography key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CitationMarker {
    pub ref_key: String,
    pub end: usize,
}

/// One sub-block of abstract or body text, with its embedded citations.
#[derive(Debug, Clone, Default)]
pub struct Segment {
    pub text: String,
    pub markers: Vec<CitationMarker>,
}

/// Mapping from local bibliography key to resolved external paper id.
/// Only entries with a resolved link are present.
pub type ReferenceMap = BTreeMap<String, String>;

/// A bounded span of context text tagged with the external papers it cites.
/// `paper_ids` is non-empty by construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub text: String,
    pub paper_ids: Vec<String>,
}

/// One JSON line in a chunks file.
///
/// Invariant: `references` contains every id appearing in any window of
/// `chunks` (it is the paper's full resolved reference list).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperRecord {
    pub title: String,
    pub paper_id: String,
    pub chunks: Vec<Window>,
    pub references: Vec<String>,
}

/// One JSON line in an abstracts file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AbstractRecord {
    pub paper_id: String,
    pub title: String,
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
}

/// A `{title, text}` context element of a training example.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Context {
    pub title: String,
    pub text: String,
}

/// The terminal artifact: one contrastive training example.
///
/// `question` and `answers` are constant placeholders; `negative_ctxs` is
/// always empty (hard negatives carry the signal).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingExample {
    pub question: String,
    pub answers: Vec<String>,
    pub source_ctxs: Vec<Context>,
    pub positive_ctxs: Vec<Context>,
    pub negative_ctxs: Vec<Context>,
    pub hard_negative_ctxs: Vec<Context>,
}

/// Normalized inclusion metadata for one paper. Both corpus schema variants
/// reduce to this shape; flag-representation noise never leaves the adapter.
#[derive(Debug, Clone, Default)]
pub struct PaperMeta {
    pub has_parse: bool,
    pub has_parse_text: bool,
    pub has_inbound_citations: bool,
    pub has_gold_abstract: bool,
    pub linked_bib_count: u32,
    pub has_doi: bool,
    pub has_arxiv_id: bool,
}

/// Normalized per-paper input: the common internal shape the corpus
/// adapters produce and the record builder consumes.
#[derive(Debug, Clone, Default)]
pub struct PaperSource {
    pub paper_id: String,
    pub title: String,
    /// Metadata-supplied ("gold") abstract, preferred over the parsed one.
    pub gold_abstract: Option<String>,
    pub abstract_segments: Vec<Segment>,
    pub body_segments: Vec<Segment>,
    /// Local bibliography key -> resolved external paper id (if any).
    pub bib_entries: BTreeMap<String, Option<String>>,
    pub meta: PaperMeta,
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Per-shard outcome of the chunk stage.
#[derive(Debug, Clone, Default)]
pub struct ShardSummary {
    pub papers: u64,
    pub records: u64,
    pub windows: u64,
    pub abstracts: u64,
    pub segment_failures: u64,
    pub skipped_papers: u64,
}

impl ShardSummary {
    pub fn absorb(&mut self, outcome: &PaperOutcome) {
        self.papers += 1;
        if outcome.record_written {
            self.records += 1;
        }
        if outcome.abstract_written {
            self.abstracts += 1;
        }
        self.windows += outcome.windows as u64;
        self.segment_failures += outcome.segment_failures as u64;
    }
}

/// Progress events emitted while chunking a shard range.
#[derive(Debug, Clone)]
pub enum ChunkProgress {
    ShardStarted { shard: u32 },
    /// Output already exists; the shard was skipped (idempotent re-run).
    ShardSkipped { shard: u32 },
    /// Periodic paper count while a shard is being read.
    Papers { shard: u32, papers: u64 },
    ShardComplete { shard: u32, summary: ShardSummary },
    ShardFailed { shard: u32, message: String },
}

/// Progress events emitted while sampling training examples.
#[derive(Debug, Clone)]
pub enum SampleProgress {
    LoadingAbstracts { files: usize },
    AbstractsLoaded { entries: usize },
    /// A chunks file was opened for sampling.
    ChunkFile { name: String },
    /// Running example count, emitted periodically.
    Examples { count: u64 },
    ShardFlushed { shard_id: u64, examples: usize },
    Complete { examples: u64, shards: u64, discarded: u64 },
}
