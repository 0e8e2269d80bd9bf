use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

mod output;

use citectx_core::{
    AbstractIndex, ChunkProgress, DEFAULT_SHARD_SIZE, ExampleWriter, InclusionFilters, PaperSource,
    SampleProgress, ShardJob, ShardPool, ShardSummary, config_file, process_paper, sample_corpus,
};
use citectx_corpus::{CorpusError, CorpusFormat};
use citectx_segment::RuleSegmenter;

/// Build contrastive citation-context training data for dense retrieval
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum FormatArg {
    Gorc,
    S2orc,
}

impl From<FormatArg> for CorpusFormat {
    fn from(value: FormatArg) -> Self {
        match value {
            FormatArg::Gorc => CorpusFormat::Gorc,
            FormatArg::S2orc => CorpusFormat::S2orc,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract citation windows and abstracts from a corpus shard range
    Chunk {
        /// Corpus root (metadata/ plus papers/ or pdf_parses/)
        in_dir: PathBuf,

        /// Output root (chunks/ and abstracts/ are created below it)
        out_dir: PathBuf,

        /// First shard index (inclusive)
        #[arg(long)]
        start: u32,

        /// Last shard index (exclusive)
        #[arg(long)]
        end: u32,

        /// On-disk corpus layout
        #[arg(long, value_enum, default_value_t = FormatArg::Gorc)]
        format: FormatArg,

        /// Minimum linked bibliography entries for a paper to contribute chunks
        #[arg(long)]
        min_linked_bibs: Option<u32>,

        /// Only chunk papers that carry a DOI
        #[arg(long)]
        require_doi: bool,

        /// Only chunk papers that carry an arXiv id
        #[arg(long)]
        require_arxiv: bool,

        /// Concurrent shard workers
        #[arg(long)]
        workers: Option<usize>,

        /// Disable colored output
        #[arg(long)]
        no_color: bool,
    },

    /// Sample contrastive training examples from extracted chunks
    Sample {
        /// Directory produced by `chunk` (contains chunks/ and abstracts/)
        in_dir: PathBuf,

        /// Directory for training-example shard files
        out_dir: PathBuf,

        /// Maximum examples per output shard
        #[arg(long)]
        shard_size: Option<usize>,

        /// Seed for reproducible sampling
        #[arg(long)]
        seed: Option<u64>,

        /// Disable colored output
        #[arg(long)]
        no_color: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = config_file::load_config();

    match cli.command {
        Command::Chunk {
            in_dir,
            out_dir,
            start,
            end,
            format,
            min_linked_bibs,
            require_doi,
            require_arxiv,
            workers,
            no_color,
        } => {
            // Resolve configuration: CLI flags > env vars > config file > defaults
            let filters = InclusionFilters {
                min_linked_bibs: min_linked_bibs
                    .or_else(|| env_parse("CITECTX_MIN_LINKED_BIBS"))
                    .or_else(|| config.filters.as_ref().and_then(|f| f.min_linked_bibs))
                    .unwrap_or_else(|| InclusionFilters::default().min_linked_bibs),
                require_doi: require_doi
                    || config
                        .filters
                        .as_ref()
                        .and_then(|f| f.require_doi)
                        .unwrap_or(false),
                require_arxiv: require_arxiv
                    || config
                        .filters
                        .as_ref()
                        .and_then(|f| f.require_arxiv)
                        .unwrap_or(false),
            };
            let workers = workers
                .or_else(|| env_parse("CITECTX_WORKERS"))
                .or_else(|| config.concurrency.as_ref().and_then(|c| c.workers))
                .unwrap_or(4);

            chunk(
                in_dir,
                out_dir,
                start,
                end,
                format.into(),
                filters,
                workers,
                no_color,
            )
            .await
        }
        Command::Sample {
            in_dir,
            out_dir,
            shard_size,
            seed,
            no_color,
        } => {
            let shard_size = shard_size
                .or_else(|| env_parse("CITECTX_SHARD_SIZE"))
                .or_else(|| config.sampling.as_ref().and_then(|s| s.shard_size))
                .unwrap_or(DEFAULT_SHARD_SIZE);
            let seed = seed.or_else(|| config.sampling.as_ref().and_then(|s| s.seed));

            sample(in_dir, out_dir, shard_size, seed, no_color).await
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

#[allow(clippy::too_many_arguments)]
async fn chunk(
    in_dir: PathBuf,
    out_dir: PathBuf,
    start: u32,
    end: u32,
    format: CorpusFormat,
    filters: InclusionFilters,
    workers: usize,
    no_color: bool,
) -> anyhow::Result<()> {
    if start >= end {
        anyhow::bail!("empty shard range: start {} >= end {}", start, end);
    }
    if !in_dir.exists() {
        anyhow::bail!("input directory not found: {}", in_dir.display());
    }
    std::fs::create_dir_all(out_dir.join("chunks"))?;
    std::fs::create_dir_all(out_dir.join("abstracts"))?;

    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel_clone.cancel();
        }
    });

    let total = (end - start) as u64;
    let bar = output::shard_bar(total);
    let progress: Arc<dyn Fn(ChunkProgress) + Send + Sync> = {
        let bar = bar.clone();
        Arc::new(move |event| output::render_chunk_progress(&bar, &event))
    };

    let segmenter = Arc::new(RuleSegmenter::new());
    // `Ok(None)` marks a shard skipped because its output already exists.
    let pool: ShardPool<Result<Option<ShardSummary>, String>> =
        ShardPool::new(workers, cancel.clone());

    for shard in start..end {
        let in_dir = in_dir.clone();
        let out_dir = out_dir.clone();
        let filters = filters.clone();
        let segmenter = Arc::clone(&segmenter);
        let progress = Arc::clone(&progress);
        pool.submit(ShardJob {
            shard,
            run: Box::new(move || {
                run_chunk_shard(
                    &in_dir,
                    &out_dir,
                    shard,
                    format,
                    &filters,
                    segmenter.as_ref(),
                    progress.as_ref(),
                )
                .map_err(|e| e.to_string())
            }),
        })
        .await;
    }

    let results = pool.results();
    let mut totals = ShardSummary::default();
    let mut skipped_shards = 0u64;
    let mut failed: Vec<(u32, String)> = Vec::new();
    let mut done = 0u64;
    let mut cancelled = false;

    while done < total {
        tokio::select! {
            result = results.recv() => match result {
                Ok((shard, Ok(Some(summary)))) => {
                    done += 1;
                    totals.papers += summary.papers;
                    totals.records += summary.records;
                    totals.windows += summary.windows;
                    totals.abstracts += summary.abstracts;
                    totals.segment_failures += summary.segment_failures;
                    totals.skipped_papers += summary.skipped_papers;
                    tracing::debug!(shard, "shard finished");
                }
                Ok((_, Ok(None))) => {
                    done += 1;
                    skipped_shards += 1;
                }
                Ok((shard, Err(message))) => {
                    done += 1;
                    failed.push((shard, message));
                }
                Err(_) => break,
            },
            _ = cancel.cancelled() => {
                cancelled = true;
                break;
            }
        }
    }
    pool.shutdown().await;
    bar.finish_and_clear();

    let mut writer: Box<dyn Write> = Box::new(std::io::stdout());
    output::print_chunk_summary(
        &mut writer,
        &totals,
        done,
        skipped_shards,
        &failed,
        !no_color,
    )?;

    if cancelled {
        anyhow::bail!("cancelled");
    }
    if !failed.is_empty() {
        anyhow::bail!("{} shard(s) failed", failed.len());
    }
    Ok(())
}

/// Process one corpus shard to `chunks/<shard>.jsonl` + `abstracts/<shard>.jsonl`.
///
/// Returns `Ok(None)` without touching anything when either output file
/// already exists, so interrupted runs can resume. Output goes to `.tmp`
/// siblings first and is renamed only on success.
fn run_chunk_shard(
    in_dir: &Path,
    out_dir: &Path,
    shard: u32,
    format: CorpusFormat,
    filters: &InclusionFilters,
    segmenter: &RuleSegmenter,
    progress: &(dyn Fn(ChunkProgress) + Send + Sync),
) -> anyhow::Result<Option<ShardSummary>> {
    let chunks_path = out_dir.join("chunks").join(format!("{shard}.jsonl"));
    let abstracts_path = out_dir.join("abstracts").join(format!("{shard}.jsonl"));

    if chunks_path.exists() || abstracts_path.exists() {
        tracing::info!(shard, "found existing chunks and abstracts, skipping shard");
        progress(ChunkProgress::ShardSkipped { shard });
        return Ok(None);
    }

    progress(ChunkProgress::ShardStarted { shard });

    let chunks_tmp = chunks_path.with_extension("jsonl.tmp");
    let abstracts_tmp = abstracts_path.with_extension("jsonl.tmp");

    let result = citectx_corpus::open_shard(format, in_dir, shard)
        .map_err(anyhow::Error::from)
        .and_then(|papers| {
            write_shard(
                papers,
                shard,
                filters,
                segmenter,
                &chunks_tmp,
                &abstracts_tmp,
                progress,
            )
        });

    match result {
        Ok(summary) => {
            std::fs::rename(&chunks_tmp, &chunks_path)?;
            std::fs::rename(&abstracts_tmp, &abstracts_path)?;
            progress(ChunkProgress::ShardComplete {
                shard,
                summary: summary.clone(),
            });
            Ok(Some(summary))
        }
        Err(e) => {
            let _ = std::fs::remove_file(&chunks_tmp);
            let _ = std::fs::remove_file(&abstracts_tmp);
            tracing::error!(shard, error = %e, "shard failed");
            progress(ChunkProgress::ShardFailed {
                shard,
                message: e.to_string(),
            });
            Err(e)
        }
    }
}

fn write_shard(
    papers: Box<dyn Iterator<Item = Result<PaperSource, CorpusError>> + Send>,
    shard: u32,
    filters: &InclusionFilters,
    segmenter: &RuleSegmenter,
    chunks_tmp: &Path,
    abstracts_tmp: &Path,
    progress: &(dyn Fn(ChunkProgress) + Send + Sync),
) -> anyhow::Result<ShardSummary> {
    let mut chunks_out = BufWriter::new(File::create(chunks_tmp)?);
    let mut abstracts_out = BufWriter::new(File::create(abstracts_tmp)?);
    let mut summary = ShardSummary::default();

    for paper in papers {
        match paper {
            Ok(paper) => {
                let outcome = process_paper(
                    &paper,
                    segmenter,
                    filters,
                    &mut chunks_out,
                    &mut abstracts_out,
                )?;
                summary.absorb(&outcome);
                if summary.papers % 500 == 0 {
                    progress(ChunkProgress::Papers {
                        shard,
                        papers: summary.papers,
                    });
                }
            }
            Err(e) if !e.is_fatal() => {
                tracing::warn!(shard, error = %e, "skipping paper");
                summary.skipped_papers += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }

    chunks_out.flush()?;
    abstracts_out.flush()?;
    Ok(summary)
}

async fn sample(
    in_dir: PathBuf,
    out_dir: PathBuf,
    shard_size: usize,
    seed: Option<u64>,
    no_color: bool,
) -> anyhow::Result<()> {
    let abstracts_dir = in_dir.join("abstracts");
    let chunks_dir = in_dir.join("chunks");
    if !abstracts_dir.exists() || !chunks_dir.exists() {
        anyhow::bail!(
            "{} does not look like a chunk-stage output directory (missing chunks/ or abstracts/)",
            in_dir.display()
        );
    }
    std::fs::create_dir_all(&out_dir)?;

    let bar = output::sample_spinner();
    let progress: Arc<dyn Fn(SampleProgress) + Send + Sync> = {
        let bar = bar.clone();
        Arc::new(move |event| output::render_sample_progress(&bar, &event))
    };

    let (entries, summary, examples, shards) = {
        let progress = Arc::clone(&progress);
        tokio::task::spawn_blocking(move || -> anyhow::Result<_> {
            let abstract_files = std::fs::read_dir(&abstracts_dir)?
                .filter_map(|e| e.ok())
                .filter(|e| e.path().extension().and_then(|x| x.to_str()) == Some("jsonl"))
                .count();
            progress(SampleProgress::LoadingAbstracts {
                files: abstract_files,
            });

            let index = AbstractIndex::load_dir(&abstracts_dir)?;
            progress(SampleProgress::AbstractsLoaded {
                entries: index.len(),
            });

            let mut writer = ExampleWriter::new(&out_dir, shard_size);
            let mut rng = seed.map_or_else(fastrand::Rng::new, fastrand::Rng::with_seed);
            let summary =
                sample_corpus(&chunks_dir, &index, &mut writer, &mut rng, &|event| {
                    progress(event)
                })?;
            let (examples, shards) = writer.finish()?;
            Ok((index.len(), summary, examples, shards))
        })
        .await??
    };

    progress(SampleProgress::Complete {
        examples,
        shards,
        discarded: summary.discarded_windows,
    });
    bar.finish_and_clear();

    let mut writer: Box<dyn Write> = Box::new(std::io::stdout());
    output::print_sample_summary(&mut writer, entries, &summary, examples, shards, !no_color)?;

    Ok(())
}
