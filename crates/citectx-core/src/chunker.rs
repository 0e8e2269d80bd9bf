//! Per-paper record building: inclusion gating plus JSONL emission of
//! chunk records and abstract records.

use std::io::Write;

use crate::window::{extract_windows, resolve_references};
use crate::{AbstractRecord, PaperRecord, PaperSource, PipelineError, SentenceSegmenter};

/// Eligibility filters for the chunk stage.
#[derive(Debug, Clone)]
pub struct InclusionFilters {
    /// Minimum number of bibliography entries with a resolved link.
    pub min_linked_bibs: u32,
    /// Restrict chunk records to papers carrying a DOI.
    pub require_doi: bool,
    /// Restrict chunk records to papers carrying an arXiv id.
    pub require_arxiv: bool,
}

impl Default for InclusionFilters {
    fn default() -> Self {
        Self {
            min_linked_bibs: 4,
            require_doi: false,
            require_arxiv: false,
        }
    }
}

/// What one paper contributed to the two output streams.
#[derive(Debug, Clone, Default)]
pub struct PaperOutcome {
    pub record_written: bool,
    pub abstract_written: bool,
    pub windows: usize,
    pub segment_failures: usize,
}

/// Process one paper: write its chunk record and/or abstract record to the
/// given streams when the respective inclusion criteria are met.
///
/// The two outputs are gated independently: a paper can contribute an
/// abstract without chunks (thin bibliography) or chunks without an
/// abstract (no inbound citations).
pub fn process_paper<W1: Write, W2: Write>(
    paper: &PaperSource,
    segmenter: &dyn SentenceSegmenter,
    filters: &InclusionFilters,
    chunks_out: &mut W1,
    abstracts_out: &mut W2,
) -> Result<PaperOutcome, PipelineError> {
    let mut outcome = PaperOutcome::default();

    if eligible_for_chunks(paper, filters) {
        let refs = resolve_references(&paper.bib_entries);

        let mut extraction = extract_windows(&paper.abstract_segments, &refs, segmenter);
        let body = extract_windows(&paper.body_segments, &refs, segmenter);
        extraction.windows.extend(body.windows);
        extraction.segment_failures += body.segment_failures;

        outcome.windows = extraction.windows.len();
        outcome.segment_failures = extraction.segment_failures;

        let record = PaperRecord {
            title: paper.title.clone(),
            paper_id: paper.paper_id.clone(),
            chunks: extraction.windows,
            references: refs.into_values().collect(),
        };
        serde_json::to_writer(&mut *chunks_out, &record)?;
        chunks_out.write_all(b"\n")?;
        outcome.record_written = true;
    }

    if let Some(abstract_text) = select_abstract(paper) {
        let record = AbstractRecord {
            paper_id: paper.paper_id.clone(),
            title: paper.title.clone(),
            abstract_text: Some(abstract_text),
        };
        serde_json::to_writer(&mut *abstracts_out, &record)?;
        abstracts_out.write_all(b"\n")?;
        outcome.abstract_written = true;
    }

    Ok(outcome)
}

fn eligible_for_chunks(paper: &PaperSource, filters: &InclusionFilters) -> bool {
    let meta = &paper.meta;
    if !meta.has_parse || !meta.has_parse_text {
        return false;
    }
    if meta.linked_bib_count < filters.min_linked_bibs {
        return false;
    }
    if filters.require_doi && !meta.has_doi {
        return false;
    }
    if filters.require_arxiv && !meta.has_arxiv_id {
        return false;
    }
    true
}

/// Pick the abstract for the abstracts stream, or `None` when the paper is
/// excluded. Only papers with inbound citation edges are worth recording.
/// The gold (metadata-supplied) abstract wins over the parsed one.
fn select_abstract(paper: &PaperSource) -> Option<String> {
    let meta = &paper.meta;
    if !meta.has_inbound_citations || !meta.has_parse || !meta.has_parse_text {
        return None;
    }

    if meta.has_gold_abstract
        && let Some(gold) = &paper.gold_abstract
        && !gold.is_empty()
    {
        return Some(gold.clone());
    }

    paper
        .abstract_segments
        .first()
        .map(|s| s.text.clone())
        .filter(|t| !t.is_empty())
}
