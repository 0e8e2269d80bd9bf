//! End-to-end: build chunk/abstract files from in-memory papers, load the
//! abstract index, sample training examples, and check the pipeline-level
//! invariants on the output shards.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::BufWriter;

use citectx_core::{
    AbstractIndex, CitationMarker, Context, ExampleWriter, InclusionFilters, PaperMeta,
    PaperRecord, PaperSource, Segment, SegmentError, Sentence, SentenceSegmenter, TrainingExample,
    process_paper,
    sampler::{PLACEHOLDER, sample_corpus},
};

/// Splits on ". " boundaries with char-accurate cumulative end offsets.
struct PeriodSegmenter;

impl SentenceSegmenter for PeriodSegmenter {
    fn segment(&self, text: &str) -> Result<Vec<Sentence>, SegmentError> {
        if text.trim().is_empty() {
            return Err(SegmentError::EmptyInput);
        }
        let chars: Vec<char> = text.chars().collect();
        let mut sentences = Vec::new();
        let mut start = 0usize;
        let mut i = 0usize;
        while i < chars.len() {
            if chars[i] == '.' {
                let mut end = i + 1;
                while end < chars.len() && chars[end].is_whitespace() {
                    end += 1;
                }
                let text: String = chars[start..i + 1].iter().collect();
                sentences.push(Sentence {
                    text: text.trim().to_string(),
                    end,
                });
                start = end;
                i = end;
            } else {
                i += 1;
            }
        }
        if start < chars.len() {
            let text: String = chars[start..].iter().collect();
            sentences.push(Sentence {
                text: text.trim().to_string(),
                end: chars.len(),
            });
        }
        Ok(sentences)
    }
}

fn bib(entries: &[(&str, Option<&str>)]) -> BTreeMap<String, Option<String>> {
    entries
        .iter()
        .map(|(k, v)| (k.to_string(), v.map(|s| s.to_string())))
        .collect()
}

fn meta() -> PaperMeta {
    PaperMeta {
        has_parse: true,
        has_parse_text: true,
        has_inbound_citations: true,
        has_gold_abstract: false,
        linked_bib_count: 4,
        has_doi: false,
        has_arxiv_id: false,
    }
}

/// A citing paper whose body cites P1 and P3 in separate sentences.
fn citing_paper() -> PaperSource {
    let text = "Dense retrieval has advanced recently. Early work used sparse methods. \
                Later systems added hard negatives. Evaluation remains difficult.";
    // "Dense retrieval has advanced recently. " ends at char 39;
    // "Early work used sparse methods. " ends at 71 (markers below sit
    // inside sentences 0 and 2).
    PaperSource {
        paper_id: "100".to_string(),
        title: "Citing Paper".to_string(),
        gold_abstract: None,
        abstract_segments: vec![],
        body_segments: vec![Segment {
            text: text.to_string(),
            markers: vec![
                CitationMarker {
                    ref_key: "b1".to_string(),
                    end: 30,
                },
                CitationMarker {
                    ref_key: "b3".to_string(),
                    end: 100,
                },
            ],
        }],
        bib_entries: bib(&[
            ("b1", Some("P1")),
            ("b2", Some("P2")),
            ("b3", Some("P3")),
            ("b4", Some("P4")),
        ]),
        meta: meta(),
    }
}

/// A cited paper contributing only an abstract record.
fn cited_paper(id: &str) -> PaperSource {
    PaperSource {
        paper_id: id.to_string(),
        title: format!("Cited {id}"),
        gold_abstract: Some(format!("Abstract of {id}.")),
        abstract_segments: vec![],
        body_segments: vec![],
        bib_entries: BTreeMap::new(),
        meta: PaperMeta {
            has_gold_abstract: true,
            linked_bib_count: 0,
            ..meta()
        },
    }
}

#[test]
fn chunk_then_sample_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let chunks_dir = dir.path().join("chunks");
    let abstracts_dir = dir.path().join("abstracts");
    let out_dir = dir.path().join("examples");
    std::fs::create_dir_all(&chunks_dir).unwrap();
    std::fs::create_dir_all(&abstracts_dir).unwrap();
    std::fs::create_dir_all(&out_dir).unwrap();

    // Chunk stage: one shard with the citing paper and its targets.
    let mut chunks_out = BufWriter::new(File::create(chunks_dir.join("0.jsonl")).unwrap());
    let mut abstracts_out = BufWriter::new(File::create(abstracts_dir.join("0.jsonl")).unwrap());

    let filters = InclusionFilters::default();
    let mut papers = vec![citing_paper()];
    for id in ["P1", "P2", "P3", "P4"] {
        papers.push(cited_paper(id));
    }
    for paper in &papers {
        process_paper(
            paper,
            &PeriodSegmenter,
            &filters,
            &mut chunks_out,
            &mut abstracts_out,
        )
        .unwrap();
    }
    drop(chunks_out);
    drop(abstracts_out);

    // The citing paper produced a record with two windows.
    let chunk_lines = std::fs::read_to_string(chunks_dir.join("0.jsonl")).unwrap();
    let records: Vec<PaperRecord> = chunk_lines
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].chunks.len(), 2);
    assert_eq!(records[0].chunks[0].paper_ids, vec!["P1"]);
    assert_eq!(records[0].chunks[1].paper_ids, vec!["P3"]);

    let refs: BTreeSet<&str> = records[0].references.iter().map(String::as_str).collect();
    for w in &records[0].chunks {
        for id in &w.paper_ids {
            assert!(refs.contains(id.as_str()), "references must cover {id}");
        }
    }

    // Sample stage.
    let index = AbstractIndex::load_dir(&abstracts_dir).unwrap();
    assert_eq!(index.len(), 4);

    let mut writer = ExampleWriter::new(&out_dir, 10);
    let mut rng = fastrand::Rng::with_seed(42);
    let summary = sample_corpus(&chunks_dir, &index, &mut writer, &mut rng, &|_| {}).unwrap();
    writer.finish().unwrap();

    assert_eq!(summary.records, 1);
    assert_eq!(summary.examples, 2);
    assert_eq!(summary.discarded_windows, 0);

    let shard: Vec<TrainingExample> =
        serde_json::from_str(&std::fs::read_to_string(out_dir.join("2.json")).unwrap()).unwrap();
    assert_eq!(shard.len(), 2);

    for (example, record_window) in shard.iter().zip(&records[0].chunks) {
        assert_eq!(example.question, PLACEHOLDER);
        assert_eq!(example.negative_ctxs, Vec::<Context>::new());
        assert_eq!(example.source_ctxs[0].title, "Citing Paper");
        assert_eq!(example.source_ctxs[0].text, record_window.text);

        // The hard negative must not be cited by this window.
        let window_titles: Vec<String> = record_window
            .paper_ids
            .iter()
            .map(|id| format!("Cited {id}"))
            .collect();
        assert!(window_titles.contains(&example.positive_ctxs[0].title));
        assert!(!window_titles.contains(&example.hard_negative_ctxs[0].title));
    }
}

#[test]
fn missing_abstracts_discard_windows_instead_of_failing() {
    let dir = tempfile::tempdir().unwrap();
    let chunks_dir = dir.path().join("chunks");
    let out_dir = dir.path().join("examples");
    std::fs::create_dir_all(&chunks_dir).unwrap();
    std::fs::create_dir_all(&out_dir).unwrap();

    let record = PaperRecord {
        title: "Citing Paper".to_string(),
        paper_id: "100".to_string(),
        chunks: vec![citectx_core::Window {
            text: "context".to_string(),
            paper_ids: vec!["P1".to_string()],
        }],
        references: vec!["P1".to_string(), "P2".to_string()],
    };
    std::fs::write(
        chunks_dir.join("0.jsonl"),
        format!("{}\n", serde_json::to_string(&record).unwrap()),
    )
    .unwrap();

    // Empty index: every resolution misses.
    let index = AbstractIndex::new();
    let mut writer = ExampleWriter::new(&out_dir, 10);
    let mut rng = fastrand::Rng::with_seed(1);
    let summary = sample_corpus(&chunks_dir, &index, &mut writer, &mut rng, &|_| {}).unwrap();
    writer.finish().unwrap();

    assert_eq!(summary.examples, 0);
    assert_eq!(summary.discarded_windows, 1);
    assert_eq!(std::fs::read_dir(&out_dir).unwrap().count(), 0);
}
