//! Reference resolution and citation-window extraction.
//!
//! A window is up to [`WINDOW_SENTENCES`] sentences of context around a
//! citing sentence, tagged with the external ids cited there. Markers are
//! attributed to the nearest sentence whose end offset lies strictly beyond
//! them; each marker is consumed exactly once.

use std::collections::BTreeMap;

use crate::{CitationMarker, ReferenceMap, Segment, SentenceSegmenter, Window};

/// Sentences per window.
pub const WINDOW_SENTENCES: usize = 4;
/// Sentences of lookback before the citing sentence.
pub const WINDOW_LOOKBACK: usize = 2;

/// Filter a paper's bibliography down to entries with a resolved external id.
///
/// Unresolved citations are invisible to the extractor: a marker whose key is
/// absent from the returned map can never produce a window.
pub fn resolve_references(bib_entries: &BTreeMap<String, Option<String>>) -> ReferenceMap {
    bib_entries
        .iter()
        .filter_map(|(key, link)| match link {
            Some(id) if !id.is_empty() => Some((key.clone(), id.clone())),
            _ => None,
        })
        .collect()
}

/// Result of extracting windows from one text block.
#[derive(Debug, Clone, Default)]
pub struct WindowExtraction {
    pub windows: Vec<Window>,
    /// Segments the segmenter rejected (recoverable, counted, not retried).
    pub segment_failures: usize,
}

/// Extract citation windows from a block of segments.
///
/// Per segment: markers are filtered to those resolvable through `refs`
/// (a segment with none is skipped without segmenting), the text is split
/// into sentences, and a single merge walk over sentence ends and marker
/// ends attributes each marker to the first sentence ending strictly after
/// it. Sentences that picked up at least one id emit a window of up to
/// [`WINDOW_SENTENCES`] sentences starting [`WINDOW_LOOKBACK`] before the
/// citing one, clipped at the segment start. The walk stops once all
/// markers are consumed.
pub fn extract_windows(
    segments: &[Segment],
    refs: &ReferenceMap,
    segmenter: &dyn SentenceSegmenter,
) -> WindowExtraction {
    let mut out = WindowExtraction::default();

    for segment in segments {
        let mut linked: Vec<&CitationMarker> = segment
            .markers
            .iter()
            .filter(|m| refs.contains_key(&m.ref_key))
            .collect();
        if linked.is_empty() {
            continue;
        }
        // Corpus order is nearly always already ascending; enforce the
        // invariant rather than assume it.
        linked.sort_by_key(|m| m.end);

        let sentences = match segmenter.segment(&segment.text) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(error = %e, "segmentation failed, skipping segment");
                out.segment_failures += 1;
                continue;
            }
        };

        let mut next = 0; // first unconsumed marker
        for (i, sentence) in sentences.iter().enumerate() {
            if next >= linked.len() {
                break;
            }

            let mut ids = Vec::new();
            while next < linked.len() && linked[next].end < sentence.end {
                ids.push(refs[&linked[next].ref_key].clone());
                next += 1;
            }
            if ids.is_empty() {
                continue;
            }

            let start = i.saturating_sub(WINDOW_LOOKBACK);
            let stop = (start + WINDOW_SENTENCES).min(sentences.len());
            let text = sentences[start..stop]
                .iter()
                .map(|s| s.text.as_str())
                .collect::<Vec<_>>()
                .join(" ");

            out.windows.push(Window {
                text,
                paper_ids: ids,
            });
        }
    }

    out
}
