use std::io::Write;
use std::time::Duration;

use indicatif::{HumanCount, ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;

use citectx_core::{ChunkProgress, SampleProgress, SampleSummary, ShardSummary};

/// Progress bar over a shard range for the chunk stage.
pub fn shard_bar(total: u64) -> ProgressBar {
    let bar = ProgressBar::new(total);
    bar.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{bar:40.cyan/dim}] {pos}/{len} shards {msg}",
        )
        .unwrap()
        .progress_chars("=> "),
    );
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}

/// Spinner for the single-pass sample stage.
pub fn sample_spinner() -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(ProgressStyle::with_template("{spinner:.green} {msg}").unwrap());
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}

pub fn render_chunk_progress(bar: &ProgressBar, event: &ChunkProgress) {
    match event {
        ChunkProgress::ShardStarted { shard } => {
            bar.set_message(format!("reading shard {shard}"));
        }
        ChunkProgress::ShardSkipped { shard } => {
            bar.inc(1);
            bar.set_message(format!("shard {shard} already done"));
        }
        ChunkProgress::Papers { shard, papers } => {
            bar.set_message(format!("shard {shard}: {} papers", HumanCount(*papers)));
        }
        ChunkProgress::ShardComplete { shard, summary } => {
            bar.inc(1);
            bar.set_message(format!(
                "shard {shard}: {} records, {} abstracts",
                HumanCount(summary.records),
                HumanCount(summary.abstracts)
            ));
        }
        ChunkProgress::ShardFailed { shard, .. } => {
            bar.inc(1);
            bar.set_message(format!("shard {shard} FAILED"));
        }
    }
}

pub fn render_sample_progress(bar: &ProgressBar, event: &SampleProgress) {
    match event {
        SampleProgress::LoadingAbstracts { files } => {
            bar.set_message(format!("loading abstracts from {files} file(s)..."));
        }
        SampleProgress::AbstractsLoaded { entries } => {
            bar.set_message(format!("{} abstracts indexed", HumanCount(*entries as u64)));
        }
        SampleProgress::ChunkFile { name } => {
            bar.set_message(format!("sampling {name}"));
        }
        SampleProgress::Examples { count } => {
            bar.set_message(format!("{} examples", HumanCount(*count)));
        }
        SampleProgress::ShardFlushed { shard_id, examples } => {
            bar.set_message(format!(
                "flushed {shard_id}.json ({} examples)",
                HumanCount(*examples as u64)
            ));
        }
        SampleProgress::Complete { .. } => {}
    }
}

/// Final report for the chunk stage.
pub fn print_chunk_summary(
    w: &mut dyn Write,
    totals: &ShardSummary,
    shards_done: u64,
    shards_skipped: u64,
    failed: &[(u32, String)],
    color: bool,
) -> std::io::Result<()> {
    writeln!(w)?;
    if color {
        writeln!(w, "{}", "Chunk extraction finished".bold())?;
    } else {
        writeln!(w, "Chunk extraction finished")?;
    }
    writeln!(
        w,
        "  shards:    {} processed, {} skipped (existing output)",
        shards_done - shards_skipped - failed.len() as u64,
        shards_skipped
    )?;
    writeln!(
        w,
        "  papers:    {} read, {} skipped as malformed",
        HumanCount(totals.papers),
        HumanCount(totals.skipped_papers)
    )?;
    writeln!(
        w,
        "  output:    {} chunk records ({} windows), {} abstracts",
        HumanCount(totals.records),
        HumanCount(totals.windows),
        HumanCount(totals.abstracts)
    )?;
    if totals.segment_failures > 0 {
        let msg = format!(
            "  segmenter: {} segment(s) rejected",
            HumanCount(totals.segment_failures)
        );
        if color {
            writeln!(w, "{}", msg.yellow())?;
        } else {
            writeln!(w, "{}", msg)?;
        }
    }
    for (shard, message) in failed {
        let msg = format!("  shard {shard} failed: {message}");
        if color {
            writeln!(w, "{}", msg.red())?;
        } else {
            writeln!(w, "{}", msg)?;
        }
    }
    Ok(())
}

/// Final report for the sample stage.
pub fn print_sample_summary(
    w: &mut dyn Write,
    index_entries: usize,
    summary: &SampleSummary,
    examples: u64,
    shards: u64,
    color: bool,
) -> std::io::Result<()> {
    writeln!(w)?;
    if color {
        writeln!(w, "{}", "Sampling finished".bold())?;
    } else {
        writeln!(w, "Sampling finished")?;
    }
    writeln!(
        w,
        "  abstracts: {} indexed",
        HumanCount(index_entries as u64)
    )?;
    writeln!(
        w,
        "  input:     {} paper records",
        HumanCount(summary.records)
    )?;
    writeln!(
        w,
        "  output:    {} examples in {} shard file(s)",
        HumanCount(examples),
        shards
    )?;
    writeln!(
        w,
        "  discarded: {} window(s) without a resolvable pair",
        HumanCount(summary.discarded_windows)
    )?;
    Ok(())
}
