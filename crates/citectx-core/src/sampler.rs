//! Contrastive example sampling.
//!
//! Per window: one positive drawn from the papers the window cites, one hard
//! negative drawn from the rest of the source paper's reference list. Both
//! draws are uniform, without replacement, against the abstract index; a
//! window whose candidates exhaust without a hit is discarded.

use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::index::{AbstractEntry, jsonl_files};
use crate::writer::ExampleWriter;
use crate::{
    AbstractIndex, Context, PaperRecord, PipelineError, SampleProgress, TrainingExample, Window,
};

/// Constant filler for the question/answers slots of every example.
pub const PLACEHOLDER: &str = "N/A";

/// Sample zero or one training example per window of `record`.
pub fn sample_examples(
    record: &PaperRecord,
    index: &AbstractIndex,
    rng: &mut fastrand::Rng,
) -> Vec<TrainingExample> {
    let references: BTreeSet<&str> = record.references.iter().map(String::as_str).collect();

    record
        .chunks
        .iter()
        .filter_map(|window| sample_window(record, window, &references, index, rng))
        .collect()
}

fn sample_window(
    record: &PaperRecord,
    window: &Window,
    references: &BTreeSet<&str>,
    index: &AbstractIndex,
    rng: &mut fastrand::Rng,
) -> Option<TrainingExample> {
    let positives: BTreeSet<&str> = window.paper_ids.iter().map(String::as_str).collect();

    // Only references of the whole paper that this window does NOT cite are
    // eligible negatives; a window citing the entire reference list cannot
    // yield a hard negative.
    let negatives: Vec<&str> = references
        .iter()
        .copied()
        .filter(|id| !positives.contains(id))
        .collect();
    if negatives.is_empty() {
        return None;
    }

    let positive = draw_resolvable(positives.into_iter().collect(), index, rng)?;
    let negative = draw_resolvable(negatives, index, rng)?;

    Some(TrainingExample {
        question: PLACEHOLDER.to_string(),
        answers: vec![PLACEHOLDER.to_string()],
        source_ctxs: vec![Context {
            title: record.title.clone(),
            text: window.text.clone(),
        }],
        positive_ctxs: vec![Context {
            title: positive.title.clone(),
            text: positive.abstract_text.clone(),
        }],
        negative_ctxs: vec![],
        hard_negative_ctxs: vec![Context {
            title: negative.title.clone(),
            text: negative.abstract_text.clone(),
        }],
    })
}

/// Uniform draws without replacement until one candidate resolves in the
/// index. Each candidate is tried at most once; `None` on exhaustion.
fn draw_resolvable<'a>(
    mut candidates: Vec<&str>,
    index: &'a AbstractIndex,
    rng: &mut fastrand::Rng,
) -> Option<&'a AbstractEntry> {
    while !candidates.is_empty() {
        let pick = rng.usize(..candidates.len());
        let id = candidates.swap_remove(pick);
        if let Some(entry) = index.get(id) {
            return Some(entry);
        }
    }
    None
}

/// Summary of one sampling run. Shard counts live on the writer: the final
/// partial shard is only flushed by [`ExampleWriter::finish`].
#[derive(Debug, Clone, Default)]
pub struct SampleSummary {
    pub records: u64,
    pub examples: u64,
    /// Windows that produced no example (no negatives, or index misses).
    pub discarded_windows: u64,
}

/// Stream every chunks file under `chunks_dir` through the sampler into a
/// sharded example writer. Files are visited in sorted order; malformed
/// record lines are skipped with a warning.
pub fn sample_corpus(
    chunks_dir: &Path,
    index: &AbstractIndex,
    writer: &mut ExampleWriter,
    rng: &mut fastrand::Rng,
    progress: &dyn Fn(SampleProgress),
) -> Result<SampleSummary, PipelineError> {
    let mut summary = SampleSummary::default();

    for path in jsonl_files(chunks_dir)? {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        progress(SampleProgress::ChunkFile { name });

        let reader = BufReader::new(File::open(&path)?);
        for (lineno, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record: PaperRecord = match serde_json::from_str(&line) {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        line = lineno + 1,
                        error = %e,
                        "skipping malformed chunk record"
                    );
                    continue;
                }
            };
            summary.records += 1;

            let windows = record.chunks.len() as u64;
            let examples = sample_examples(&record, index, rng);
            summary.discarded_windows += windows - examples.len() as u64;

            for example in examples {
                let shards_before = writer.shards_written();
                writer.push(example)?;
                summary.examples += 1;
                if writer.shards_written() > shards_before {
                    progress(SampleProgress::ShardFlushed {
                        shard_id: writer.current_shard_id(),
                        examples: writer.shard_size(),
                    });
                }
                if summary.examples % 1000 == 0 {
                    progress(SampleProgress::Examples {
                        count: summary.examples,
                    });
                }
            }
        }
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index_of(entries: &[(&str, &str)]) -> AbstractIndex {
        let mut index = AbstractIndex::new();
        for (id, text) in entries {
            index.insert(
                id.to_string(),
                AbstractEntry {
                    title: format!("Title {id}"),
                    abstract_text: text.to_string(),
                },
            );
        }
        index
    }

    fn record(window_ids: &[&str], references: &[&str]) -> PaperRecord {
        PaperRecord {
            title: "Source".to_string(),
            paper_id: "S".to_string(),
            chunks: vec![Window {
                text: "citing context".to_string(),
                paper_ids: window_ids.iter().map(|s| s.to_string()).collect(),
            }],
            references: references.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn hard_negative_never_comes_from_the_window() {
        let index = index_of(&[("P1", "a1"), ("P2", "a2"), ("P3", "a3")]);
        let record = record(&["P1"], &["P1", "P2", "P3"]);

        for seed in 0..50 {
            let mut rng = fastrand::Rng::with_seed(seed);
            let examples = sample_examples(&record, &index, &mut rng);
            assert_eq!(examples.len(), 1);
            let ex = &examples[0];
            assert_eq!(ex.positive_ctxs[0].title, "Title P1");
            assert_ne!(ex.hard_negative_ctxs[0].title, "Title P1");
            assert!(ex.negative_ctxs.is_empty());
            assert_eq!(ex.question, PLACEHOLDER);
            assert_eq!(ex.answers, vec![PLACEHOLDER]);
            assert_eq!(ex.source_ctxs[0].text, "citing context");
        }
    }

    #[test]
    fn window_exhausting_the_reference_list_is_discarded() {
        let index = index_of(&[("P1", "a1"), ("P2", "a2")]);
        let record = record(&["P1", "P2"], &["P1", "P2"]);

        let mut rng = fastrand::Rng::with_seed(7);
        assert!(sample_examples(&record, &index, &mut rng).is_empty());
    }

    #[test]
    fn positive_resolution_degrades_to_an_alternate() {
        // P1 has no abstract; the sampler must fall through to P2.
        let index = index_of(&[("P2", "a2"), ("P9", "a9")]);
        let record = record(&["P1", "P2"], &["P1", "P2", "P9"]);

        for seed in 0..50 {
            let mut rng = fastrand::Rng::with_seed(seed);
            let examples = sample_examples(&record, &index, &mut rng);
            assert_eq!(examples.len(), 1);
            assert_eq!(examples[0].positive_ctxs[0].title, "Title P2");
            assert_eq!(examples[0].hard_negative_ctxs[0].title, "Title P9");
        }
    }

    #[test]
    fn fully_unresolvable_window_yields_nothing() {
        // Index is missing every positive candidate.
        let index = index_of(&[("P9", "a9")]);
        let record = record(&["P1", "P2"], &["P1", "P2", "P9"]);

        let mut rng = fastrand::Rng::with_seed(3);
        assert!(sample_examples(&record, &index, &mut rng).is_empty());
    }

    #[test]
    fn unresolvable_negatives_discard_the_window() {
        let index = index_of(&[("P1", "a1")]);
        let record = record(&["P1"], &["P1", "P2"]);

        let mut rng = fastrand::Rng::with_seed(11);
        assert!(sample_examples(&record, &index, &mut rng).is_empty());
    }

    #[test]
    fn duplicate_window_ids_collapse_to_one_candidate() {
        let index = index_of(&[("P1", "a1"), ("P2", "a2")]);
        let record = record(&["P1", "P1"], &["P1", "P2"]);

        let mut rng = fastrand::Rng::with_seed(5);
        let examples = sample_examples(&record, &index, &mut rng);
        assert_eq!(examples.len(), 1);
        assert_eq!(examples[0].hard_negative_ctxs[0].title, "Title P2");
    }
}
