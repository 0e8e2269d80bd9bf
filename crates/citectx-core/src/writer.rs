//! Sharded training-example output.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use crate::{PipelineError, TrainingExample};

/// Default maximum examples per shard file.
pub const DEFAULT_SHARD_SIZE: usize = 50_000;

/// Buffers examples and flushes a JSON array to `<cumulative-count>.json`
/// whenever the buffer reaches the shard size; a final partial shard is
/// flushed by [`finish`](ExampleWriter::finish). Cumulative-count naming
/// keeps shard ids unique and monotonically increasing.
pub struct ExampleWriter {
    out_dir: PathBuf,
    shard_size: usize,
    buf: Vec<TrainingExample>,
    written: u64,
    shards: u64,
}

impl ExampleWriter {
    pub fn new(out_dir: &Path, shard_size: usize) -> Self {
        Self {
            out_dir: out_dir.to_path_buf(),
            shard_size: shard_size.max(1),
            buf: Vec::new(),
            written: 0,
            shards: 0,
        }
    }

    /// Append one example, flushing a full shard when the threshold is hit.
    pub fn push(&mut self, example: TrainingExample) -> Result<(), PipelineError> {
        self.buf.push(example);
        self.written += 1;
        if self.buf.len() >= self.shard_size {
            self.flush()?;
        }
        Ok(())
    }

    /// Cumulative number of examples pushed so far.
    pub fn examples_written(&self) -> u64 {
        self.written
    }

    /// Configured maximum examples per shard.
    pub fn shard_size(&self) -> usize {
        self.shard_size
    }

    /// Number of shard files flushed so far.
    pub fn shards_written(&self) -> u64 {
        self.shards
    }

    /// Id the next flush would use (the cumulative example count).
    pub fn current_shard_id(&self) -> u64 {
        self.written
    }

    /// Flush any remaining partial shard. An empty buffer writes nothing.
    pub fn finish(mut self) -> Result<(u64, u64), PipelineError> {
        if !self.buf.is_empty() {
            self.flush()?;
        }
        Ok((self.written, self.shards))
    }

    fn flush(&mut self) -> Result<(), PipelineError> {
        let path = self.out_dir.join(format!("{}.json", self.written));
        // Write to a sibling tmp file and rename, so a failed run never
        // leaves a truncated shard under the final name.
        let tmp = path.with_extension("json.tmp");
        let file = BufWriter::new(File::create(&tmp)?);
        serde_json::to_writer(file, &self.buf)?;
        std::fs::rename(&tmp, &path)?;

        tracing::debug!(path = %path.display(), examples = self.buf.len(), "flushed shard");
        self.buf.clear();
        self.shards += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Context;

    fn example(n: usize) -> TrainingExample {
        TrainingExample {
            question: "N/A".to_string(),
            answers: vec!["N/A".to_string()],
            source_ctxs: vec![Context {
                title: format!("src {n}"),
                text: "text".to_string(),
            }],
            positive_ctxs: vec![],
            negative_ctxs: vec![],
            hard_negative_ctxs: vec![],
        }
    }

    fn read_shard(path: &Path) -> Vec<TrainingExample> {
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
    }

    #[test]
    fn flushes_on_the_shard_boundary_and_names_by_cumulative_count() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = ExampleWriter::new(dir.path(), 3);

        for n in 0..7 {
            writer.push(example(n)).unwrap();
        }
        let (written, shards) = writer.finish().unwrap();
        assert_eq!(written, 7);
        assert_eq!(shards, 3);

        assert_eq!(read_shard(&dir.path().join("3.json")).len(), 3);
        assert_eq!(read_shard(&dir.path().join("6.json")).len(), 3);
        assert_eq!(read_shard(&dir.path().join("7.json")).len(), 1);
        assert!(!dir.path().join("3.json.tmp").exists());
    }

    #[test]
    fn no_shard_exceeds_the_configured_size() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = ExampleWriter::new(dir.path(), 5);
        for n in 0..23 {
            writer.push(example(n)).unwrap();
        }
        writer.finish().unwrap();

        for entry in std::fs::read_dir(dir.path()).unwrap() {
            let shard = read_shard(&entry.unwrap().path());
            assert!(shard.len() <= 5);
        }
    }

    #[test]
    fn empty_run_writes_no_files() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ExampleWriter::new(dir.path(), 5);
        let (written, shards) = writer.finish().unwrap();
        assert_eq!(written, 0);
        assert_eq!(shards, 0);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn exact_multiple_leaves_no_partial_shard() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = ExampleWriter::new(dir.path(), 2);
        for n in 0..4 {
            writer.push(example(n)).unwrap();
        }
        let (_, shards) = writer.finish().unwrap();
        assert_eq!(shards, 2);
        assert!(dir.path().join("2.json").exists());
        assert!(dir.path().join("4.json").exists());
    }
}
